//! fanin-node - Trigger-driven panorama fusion node.
//!
//! This crate wires the [fanin-core](../fanin_core/index.html) orchestrator
//! to a transport session, driven by a YAML configuration file.
//!
//! # Configuration
//!
//! The node requires a YAML configuration file specifying:
//! - The realm and entity id every key is built from
//! - The trigger of the publish path (a subscribed feed or a fixed rate)
//! - The camera and point cloud sources gathered on each activation
//! - Optional output, queryable and transport settings
//! - Optional simulated sources
//!
//! See the `config/example.yaml` file for a complete example.

pub mod config;
pub mod sim;

pub use config::Config;
