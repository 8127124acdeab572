//! Configuration parsing and validation for the fanin node.

use eyre::{Result, WrapErr, bail, ensure};
use fanin_core::{
    KeyExpr, OrchestratorConfig, PayloadKind, Source, TriggerMode,
    key::{pub_sub_key, req_rep_key},
    period_from_rate,
    respond::DEFAULT_FRAME_ID,
};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Network realm every key lives under.
    pub realm: String,

    /// Entity (platform) the node runs on.
    pub entity_id: String,

    /// Frame id stamped on every output.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Output publication.
    #[serde(default)]
    pub output: OutputConfig,

    /// Query endpoint.
    #[serde(default)]
    pub queryable: QueryableConfig,

    /// What drives the publish path.
    pub trigger: TriggerConfig,

    /// Upstream sources gathered on each activation.
    pub sources: SourcesConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Optional simulated sources.
    #[serde(default)]
    pub sim: Option<SimConfig>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.transport.query_timeout.is_zero(),
            "transport.query_timeout must be greater than zero"
        );

        if let Some(sim) = &self.sim {
            sim.validate()?;
        }

        // Resolving every key checks each component.
        self.to_orchestrator_config()?
            .validate()
            .wrap_err("Inconsistent key configuration")
    }

    /// Key the publish path publishes on.
    pub fn output_key(&self) -> Result<KeyExpr> {
        let source_id = format!("{}/{}", self.output.source, self.output.id);
        pub_sub_key(&self.realm, &self.entity_id, &self.output.subject, &source_id)
            .wrap_err("Invalid output key")
    }

    /// Key the query path answers on.
    pub fn queryable_key(&self) -> Result<KeyExpr> {
        req_rep_key(
            &self.realm,
            &self.entity_id,
            &self.queryable.procedure,
            &self.queryable.responder_id,
        )
        .wrap_err("Invalid queryable key")
    }

    pub fn trigger_mode(&self) -> Result<TriggerMode> {
        match (&self.trigger.subscribe, self.trigger.rate_hz) {
            (Some(subscribe), None) => {
                let kind = PayloadKind::from_subject(&subscribe.subject)
                    .wrap_err("Unsupported trigger subject")?;
                let key = pub_sub_key(
                    &self.realm,
                    &self.entity_id,
                    &subscribe.subject,
                    &subscribe.source_id,
                )
                .wrap_err("Invalid trigger key")?;
                Ok(TriggerMode::Subscribe(Source::new(key, kind)))
            }
            (None, Some(rate_hz)) => TriggerMode::fixed_rate(rate_hz),
            (Some(_), Some(_)) => bail!("trigger must set either 'subscribe' or 'rate_hz', not both"),
            (None, None) => bail!("trigger must set one of 'subscribe' or 'rate_hz'"),
        }
    }

    /// Convert to fanin-core OrchestratorConfig.
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let camera = KeyExpr::new(&self.sources.camera).wrap_err("Invalid camera source key")?;
        let point_cloud =
            KeyExpr::new(&self.sources.point_cloud).wrap_err("Invalid point cloud source key")?;

        Ok(OrchestratorConfig::new(
            self.output_key()?,
            self.queryable_key()?,
            self.trigger_mode()?,
            camera,
            point_cloud,
        )
        .with_frame_id(&self.frame_id))
    }
}

fn default_frame_id() -> String {
    DEFAULT_FRAME_ID.to_string()
}

/// Output publication. The published key is
/// `{realm}/@v0/{entity_id}/pubsub/{subject}/{source}/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_image_subject")]
    pub subject: String,

    #[serde(default = "default_output_source")]
    pub source: String,

    #[serde(default = "default_output_id")]
    pub id: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            subject: default_image_subject(),
            source: default_output_source(),
            id: default_output_id(),
        }
    }
}

fn default_image_subject() -> String {
    "compressed_image".to_string()
}

fn default_output_source() -> String {
    "panorama".to_string()
}

fn default_output_id() -> String {
    "0".to_string()
}

/// Query endpoint. The answered key is
/// `{realm}/@v0/{entity_id}/@rpc/{procedure}/{responder_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryableConfig {
    #[serde(default = "default_responder_id")]
    pub responder_id: String,

    #[serde(default = "default_procedure")]
    pub procedure: String,
}

impl Default for QueryableConfig {
    fn default() -> Self {
        Self {
            responder_id: default_responder_id(),
            procedure: default_procedure(),
        }
    }
}

fn default_responder_id() -> String {
    "panorama".to_string()
}

fn default_procedure() -> String {
    "do_some_tracking".to_string()
}

/// Trigger of the publish path. Exactly one of the two must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// Run once per message received on this feed.
    #[serde(default)]
    pub subscribe: Option<SubscribeConfig>,

    /// Run at a fixed rate.
    #[serde(default)]
    pub rate_hz: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeConfig {
    pub source_id: String,

    #[serde(default = "default_image_subject")]
    pub subject: String,
}

/// Full key expressions of the upstream sources. Wildcards are allowed.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Gathered on timer ticks.
    pub camera: String,

    /// Gathered on queries.
    pub point_cloud: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// How long a scatter/gather round waits for replies.
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub query_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            query_timeout: default_query_timeout(),
        }
    }
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Simulated sources, for running the node without sensors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    /// Source ids of simulated cameras answering queries.
    #[serde(default)]
    pub cameras: Vec<String>,

    /// Source ids of simulated lidars answering queries.
    #[serde(default)]
    pub lidars: Vec<String>,

    /// Delay before a simulated source answers.
    #[serde(with = "humantime_serde", default)]
    pub latency: Duration,

    /// Optional simulated camera publishing on a feed.
    #[serde(default)]
    pub feed: Option<SimFeedConfig>,
}

impl SimConfig {
    fn validate(&self) -> Result<()> {
        reject_duplicates("sim.cameras", &self.cameras)?;
        reject_duplicates("sim.lidars", &self.lidars)?;

        if let Some(feed) = &self.feed {
            period_from_rate(feed.rate_hz).wrap_err("Invalid sim.feed.rate_hz")?;
        }
        Ok(())
    }
}

/// Ids must be unique within one kind.
fn reject_duplicates(field: &str, ids: &[String]) -> Result<()> {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    for window in sorted.windows(2) {
        if window[0] == window[1] {
            bail!("Duplicate simulated source id in {}: {}", field, window[0]);
        }
    }
    Ok(())
}

/// A simulated camera publishing images at a fixed rate.
#[derive(Debug, Clone, Deserialize)]
pub struct SimFeedConfig {
    pub source_id: String,
    pub rate_hz: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_config() {
        let yaml = r#"
realm: rise
entity_id: boat

frame_id: panorama_frame

output:
  subject: compressed_image
  source: panorama
  id: "1"

queryable:
  responder_id: panorama
  procedure: do_some_tracking

trigger:
  rate_hz: 2.0

sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/**

transport:
  query_timeout: 500ms

sim:
  cameras: [camera/0, camera/1]
  lidars: [lidar/0]
  latency: 20ms
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.frame_id, "panorama_frame");
        assert_eq!(config.transport.query_timeout, Duration::from_millis(500));
        assert_eq!(
            config.output_key().unwrap().as_str(),
            "rise/@v0/boat/pubsub/compressed_image/panorama/1"
        );
        assert_eq!(
            config.queryable_key().unwrap().as_str(),
            "rise/@v0/boat/@rpc/do_some_tracking/panorama"
        );

        let orchestrator = config.to_orchestrator_config().unwrap();
        assert_eq!(orchestrator.trigger, TriggerMode::FixedRate { rate_hz: 2.0 });
        assert_eq!(orchestrator.frame_id, "panorama_frame");

        let sim = config.sim.as_ref().unwrap();
        assert_eq!(sim.cameras.len(), 2);
        assert_eq!(sim.latency, Duration::from_millis(20));
        assert!(sim.feed.is_none());
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
realm: rise
entity_id: boat
trigger:
  subscribe:
    source_id: camera/0
sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/lidar/*
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.frame_id, "foxglove_frame_id");
        assert_eq!(config.transport.query_timeout, Duration::from_secs(10));
        assert_eq!(
            config.output_key().unwrap().as_str(),
            "rise/@v0/boat/pubsub/compressed_image/panorama/0"
        );
        assert!(config.sim.is_none());

        match config.trigger_mode().unwrap() {
            TriggerMode::Subscribe(source) => {
                assert_eq!(
                    source.key.as_str(),
                    "rise/@v0/boat/pubsub/compressed_image/camera/0"
                );
                assert_eq!(source.kind, PayloadKind::CompressedImage);
            }
            other => panic!("unexpected trigger {:?}", other),
        }
    }

    #[test]
    fn test_reject_both_triggers() {
        let yaml = r#"
realm: rise
entity_id: boat
trigger:
  rate_hz: 1.0
  subscribe:
    source_id: camera/0
sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/*/*
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_missing_trigger() {
        let yaml = r#"
realm: rise
entity_id: boat
trigger: {}
sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/*/*
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_self_feedback() {
        let yaml = r#"
realm: rise
entity_id: boat
trigger:
  subscribe:
    source_id: panorama/0
sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/*/*
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_multi_chunk_realm() {
        let yaml = r#"
realm: rise/north
entity_id: boat
trigger:
  rate_hz: 1.0
sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/*/*
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    fn with_trigger_and_sim(trigger: &str, sim: &str) -> Config {
        let yaml = format!(
            r#"
realm: rise
entity_id: boat
trigger:
{}
sources:
  camera: rise/@v0/boat/pubsub/compressed_image/camera/*
  point_cloud: rise/@v0/boat/pubsub/point_cloud/*/*
{}
"#,
            trigger, sim
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_reject_duplicate_sim_ids() {
        let config = with_trigger_and_sim(
            "  rate_hz: 1.0",
            "sim:\n  cameras: [camera/0, camera/1, camera/0]",
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_sim_id_across_kinds() {
        // Cameras and lidars publish under different subjects.
        let config = with_trigger_and_sim(
            "  rate_hz: 1.0",
            "sim:\n  cameras: [sensor/0]\n  lidars: [sensor/0]",
        );
        config.validate().unwrap();

        let camera = pub_sub_key("rise", "boat", "compressed_image", "sensor/0").unwrap();
        let lidar = pub_sub_key("rise", "boat", "point_cloud", "sensor/0").unwrap();
        assert_ne!(camera, lidar);
    }

    #[test]
    fn test_reject_rates_without_period() {
        let config = with_trigger_and_sim("  rate_hz: 1.0e-300", "");
        assert!(config.validate().is_err());

        let config = with_trigger_and_sim(
            "  rate_hz: 1.0",
            "sim:\n  feed:\n    source_id: camera/feed\n    rate_hz: 1.0e-300",
        );
        assert!(config.validate().is_err());

        let config = with_trigger_and_sim(
            "  rate_hz: 1.0",
            "sim:\n  feed:\n    source_id: camera/feed\n    rate_hz: 0.0",
        );
        assert!(config.validate().is_err());
    }
}
