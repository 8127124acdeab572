//! This library drives a trigger-based fusion node on a keyed
//! publish/subscribe network. Each activation, whether an inbound query,
//! a subscribed message or a timer tick, gathers upstream sensor payloads
//! with one scatter/gather round, hands them to a pluggable [Transform] and
//! delivers exactly one enclosed output: a reply for queries, a publication
//! otherwise.
//!
//! # Usage
//!
//! ```rust
//! use fanin_core::{
//!     LocalTransport, Orchestrator, OrchestratorConfig, PlaceholderTransform, Session,
//!     TriggerMode, key::{pub_sub_key, req_rep_key},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> eyre::Result<()> {
//! let session = Session::open(LocalTransport::default());
//!
//! let config = OrchestratorConfig::new(
//!     pub_sub_key("rise", "boat", "compressed_image", "panorama/0")?,
//!     req_rep_key("rise", "boat", "do_some_tracking", "panorama")?,
//!     TriggerMode::fixed_rate(2.0)?,
//!     "rise/@v0/boat/pubsub/compressed_image/camera/*".try_into()?,
//!     "rise/@v0/boat/pubsub/point_cloud/**".try_into()?,
//! );
//! let orchestrator = Orchestrator::new(&session, config, PlaceholderTransform)?;
//!
//! // Stop right away; a node would cancel on Ctrl-C instead.
//! let shutdown = CancellationToken::new();
//! shutdown.cancel();
//! orchestrator.serve(shutdown).await?;
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
mod config;
pub mod envelope;
mod error;
pub mod fetch;
pub mod key;
pub mod orchestrator;
pub mod payload;
pub mod respond;
pub mod session;
pub mod time;
pub mod transform;
pub mod transport;

pub use activation::Activation;
pub use config::{OrchestratorConfig, TriggerMode, period_from_rate};
pub use error::CodecError;
pub use fetch::{FetchResult, Fetcher, SensorRecord, Source};
pub use key::KeyExpr;
pub use orchestrator::{Orchestrator, TickPacer};
pub use payload::{ImageFormat, PayloadKind, SensorPayload, WithTimestamp};
pub use respond::{Delivery, Responder};
pub use session::{Publisher, Session};
pub use transform::{Artifact, PlaceholderTransform, Transform};
pub use transport::{LocalTransport, Transport};
