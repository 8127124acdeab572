use crate::{
    fetch::Source,
    key::KeyExpr,
    payload::PayloadKind,
    respond::DEFAULT_FRAME_ID,
    transport::{CongestionControl, Priority, PutOptions},
};
use eyre::{Result, ensure, eyre};
use std::time::Duration;

/// Convert a rate in Hz into the period between two runs.
///
/// The rate must be positive and finite, and its period must be
/// representable and non-zero.
pub fn period_from_rate(rate_hz: f64) -> Result<Duration> {
    ensure!(
        rate_hz.is_finite() && rate_hz > 0.0,
        "rate must be a positive number of Hz, got {}",
        rate_hz
    );
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .ok()
        .filter(|period| !period.is_zero())
        .ok_or_else(|| eyre!("rate of {} Hz has no usable period", rate_hz))
}

/// How the publish path of the orchestrator is driven.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerMode {
    /// Run once per message received on the trigger source.
    Subscribe(Source),
    /// Run at a fixed rate.
    FixedRate { rate_hz: f64 },
}

impl TriggerMode {
    /// Create a fixed-rate trigger. See [`period_from_rate`].
    pub fn fixed_rate(rate_hz: f64) -> Result<Self> {
        period_from_rate(rate_hz)?;
        Ok(TriggerMode::FixedRate { rate_hz })
    }

    /// Sleep between two ticks, `1 / rate_hz`. `None` for a subscription
    /// trigger or an unusable rate.
    pub fn period(&self) -> Option<Duration> {
        match self {
            TriggerMode::FixedRate { rate_hz } => period_from_rate(*rate_hz).ok(),
            TriggerMode::Subscribe(_) => None,
        }
    }
}

/// Configuration parameters that are passed to
/// [Orchestrator::new](crate::Orchestrator::new). Fixed for the lifetime of
/// the process.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Key the publish path publishes on.
    pub output_key: KeyExpr,
    /// Key the query path answers on.
    pub queryable_key: KeyExpr,
    /// Frame id stamped on every output.
    pub frame_id: String,
    pub trigger: TriggerMode,
    /// Source fetched on timer ticks.
    pub camera_source: Source,
    /// Source fetched on queries.
    pub point_cloud_source: Source,
    /// Quality of service of output publications.
    pub output_qos: PutOptions,
}

impl OrchestratorConfig {
    pub fn new(
        output_key: KeyExpr,
        queryable_key: KeyExpr,
        trigger: TriggerMode,
        camera: KeyExpr,
        point_cloud: KeyExpr,
    ) -> Self {
        Self {
            output_key,
            queryable_key,
            frame_id: DEFAULT_FRAME_ID.to_string(),
            trigger,
            camera_source: Source::new(camera, PayloadKind::CompressedImage),
            point_cloud_source: Source::new(point_cloud, PayloadKind::PointCloud),
            output_qos: PutOptions {
                congestion_control: CongestionControl::Drop,
                priority: Priority::InteractiveHigh,
            },
        }
    }

    pub fn with_output_qos(mut self, output_qos: PutOptions) -> Self {
        self.output_qos = output_qos;
        self
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    /// Check that the keys cannot feed the node its own output.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.frame_id.is_empty(), "frame_id cannot be empty");
        ensure!(
            !self.output_key.is_wild(),
            "output key '{}' cannot contain wildcards",
            self.output_key
        );
        ensure!(
            !self.queryable_key.is_wild(),
            "queryable key '{}' cannot contain wildcards",
            self.queryable_key
        );
        ensure!(
            self.output_key != self.queryable_key,
            "output key and queryable key are both '{}'",
            self.output_key
        );

        if let TriggerMode::Subscribe(trigger) = &self.trigger {
            ensure!(
                !trigger.key.intersects(&self.output_key),
                "trigger key '{}' would receive the node's own output on '{}'",
                trigger.key,
                self.output_key
            );
        }
        if let TriggerMode::FixedRate { rate_hz } = self.trigger {
            TriggerMode::fixed_rate(rate_hz)?;
        }

        for source in [&self.camera_source, &self.point_cloud_source] {
            ensure!(
                !source.key.intersects(&self.queryable_key),
                "source key '{}' would query the node itself on '{}'",
                source.key,
                self.queryable_key
            );
        }

        Ok(())
    }
}
