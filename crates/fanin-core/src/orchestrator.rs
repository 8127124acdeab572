//! Activation handling.
//!
//! Every trigger, whether a query, a subscribed message or a timer tick, is
//! turned into an [`Activation`] and run through the same pipeline:
//! fetch, transform, respond. Queries are answered in reply mode; messages
//! and ticks publish on the output key.

use crate::{
    activation::Activation,
    config::{OrchestratorConfig, TriggerMode, period_from_rate},
    error::CodecError,
    fetch::{FetchFailure, FetchResult, Fetcher},
    key::{KeyExpr, PubSubKey},
    payload::PayloadKind,
    respond::{Delivery, Responder},
    session::Session,
    time,
    transform::{Artifact, Transform},
    transport::{Query, Queryable, Sample, Subscriber, Transport},
};
use eyre::{Result, WrapErr};
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Computes the pause between two timer ticks.
///
/// The pause is measured from the end of a run, so the achieved rate
/// drops as runs get slower. A run lasting a whole period or longer is
/// followed immediately by the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPacer {
    period: Duration,
}

impl TickPacer {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn from_rate(rate_hz: f64) -> Result<Self> {
        Ok(Self::new(period_from_rate(rate_hz)?))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Pause to insert after a run that took `latency`.
    pub fn delay_after(&self, latency: Duration) -> Duration {
        if latency >= self.period {
            Duration::ZERO
        } else {
            self.period
        }
    }
}

/// Runs the fetch, transform and respond pipeline for every activation.
///
/// Holds no state between activations besides its configuration.
pub struct Orchestrator<T: Transport> {
    transport: Arc<T>,
    fetcher: Fetcher<T>,
    responder: Responder<T>,
    transform: Box<dyn Transform>,
    config: OrchestratorConfig,
}

impl<T: Transport> Orchestrator<T> {
    /// Create an orchestrator on `session` with the given fusion strategy.
    pub fn new(
        session: &Session<T>,
        config: OrchestratorConfig,
        transform: impl Transform,
    ) -> Result<Self> {
        config
            .validate()
            .wrap_err("Invalid orchestrator configuration")?;

        let publisher =
            session.declare_publisher_with(config.output_key.clone(), config.output_qos);
        let responder = Responder::new(publisher, config.frame_id.clone());
        let transport = Arc::clone(session.transport());
        let fetcher = Fetcher::new(Arc::clone(&transport));

        Ok(Self {
            transport,
            fetcher,
            responder,
            transform: Box::new(transform),
            config,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer a query. Exactly one reply is sent unless the querier is
    /// already gone.
    pub async fn handle_query(&self, query: Query) {
        let key = query.key().clone();
        if let Err(e) = self.run(Activation::query(query)).await {
            warn!(key = %key, error = %e, "Query activation failed");
        }
    }

    /// Run the pipeline on a subscribed message and publish the result.
    pub async fn handle_subscription_message(&self, sample: Sample) -> Result<()> {
        self.run(Activation::message(sample)).await
    }

    /// Run the pipeline on a timer tick and publish the result.
    pub async fn handle_timer_tick(&self, seq: u64) -> Result<()> {
        self.run(Activation::tick(seq)).await
    }

    /// Run one activation to completion.
    pub async fn run(&self, activation: Activation) -> Result<()> {
        let ingress = activation.ingress();
        let origin = activation.origin();

        let (input, delivery) = match activation {
            Activation::Query { query, .. } => {
                // Queries carry no argument yet.
                debug!(
                    key = %query.key(),
                    payload_bytes = query.payload().map_or(0, |p| p.len()),
                    "Received query"
                );
                let source = &self.config.point_cloud_source;
                let input = match self.fetcher.fetch(source).await {
                    Ok(input) => input,
                    Err(e) => {
                        warn!(error = %e, "Fetch failed, answering with an empty input");
                        FetchResult::empty(source.key.clone())
                    }
                };
                (input, Delivery::Reply(query))
            }
            Activation::Message { sample, .. } => {
                debug!(key = %sample.key, bytes = sample.payload.len(), "Received message");
                let input = match self.message_kind(&sample.key) {
                    Ok(kind) => FetchResult::from_sample(&sample, kind),
                    Err(error) => {
                        warn!(key = %sample.key, error = %error, "Cannot decode message");
                        FetchResult::from_failure(
                            sample.key.clone(),
                            FetchFailure::Decode {
                                key: sample.key,
                                error,
                            },
                        )
                    }
                };
                (input, Delivery::Publish)
            }
            Activation::Tick { seq, .. } => {
                debug!(seq, "Timer tick");
                let input = self
                    .fetcher
                    .fetch(&self.config.camera_source)
                    .await
                    .wrap_err_with(|| format!("Tick {} aborted", seq))?;
                (input, Delivery::Publish)
            }
        };

        let artifact = match self.transform.transform(&input, ingress) {
            Ok(artifact) => artifact,
            Err(e) if matches!(delivery, Delivery::Reply(_)) => {
                warn!(error = %e, "Transform failed, answering with a placeholder");
                Artifact::placeholder()
            }
            Err(e) => return Err(e.wrap_err(format!("Transform failed on {} activation", origin))),
        };

        debug!(
            origin = %origin,
            ingress = ?time::to_datetime(ingress),
            records = input.len(),
            failed = input.failed(),
            format = %artifact.format,
            "Transform complete"
        );

        self.responder
            .respond(delivery, artifact, ingress)
            .await
            .wrap_err_with(|| format!("Failed to deliver {} output", origin))
    }

    /// Schema of a subscribed message.
    fn message_kind(&self, key: &KeyExpr) -> Result<PayloadKind, CodecError> {
        match &self.config.trigger {
            TriggerMode::Subscribe(source) => Ok(source.kind),
            TriggerMode::FixedRate { .. } => match PubSubKey::parse(key) {
                Some(parsed) => PayloadKind::from_subject(&parsed.subject),
                None => Err(CodecError::UnsupportedSubject(key.to_string())),
            },
        }
    }

    /// Declare the queryable and the configured trigger, then serve
    /// activations until `shutdown` fires or the session closes.
    ///
    /// Failing to declare is fatal. Failures of single activations are
    /// logged and do not stop serving.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        let queryable = self
            .transport
            .declare_queryable(&self.config.queryable_key, true)
            .await
            .wrap_err_with(|| {
                format!(
                    "Failed to declare queryable on '{}'",
                    self.config.queryable_key
                )
            })?;
        info!(key = %queryable.key, "Created queryable");

        let trigger = async {
            match &self.config.trigger {
                TriggerMode::Subscribe(source) => {
                    let subscriber = self
                        .transport
                        .declare_subscriber(&source.key)
                        .await
                        .wrap_err_with(|| {
                            format!("Failed to subscribe to trigger '{}'", source.key)
                        })?;
                    info!(key = %source.key, kind = %source.kind, "Trigger subscribing");
                    self.message_loop(subscriber, &shutdown).await;
                }
                TriggerMode::FixedRate { rate_hz } => {
                    let pacer = TickPacer::from_rate(*rate_hz)?;
                    info!(rate_hz, period = ?pacer.period(), "Trigger at fixed rate");
                    self.tick_loop(pacer, &shutdown).await;
                }
            }
            eyre::Ok(())
        };

        let ((), trigger) = tokio::join!(self.query_loop(queryable, &shutdown), trigger);
        trigger?;

        info!("Orchestrator stopped");
        Ok(())
    }

    async fn query_loop(&self, queryable: Queryable, shutdown: &CancellationToken) {
        loop {
            let query = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                query = queryable.rx.recv_async() => match query {
                    Ok(query) => query,
                    Err(_) => {
                        debug!(key = %queryable.key, "Queryable closed");
                        break;
                    }
                },
            };
            self.handle_query(query).await;
        }
    }

    async fn message_loop(&self, subscriber: Subscriber, shutdown: &CancellationToken) {
        loop {
            let sample = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sample = subscriber.rx.recv_async() => match sample {
                    Ok(sample) => sample,
                    Err(_) => {
                        debug!(key = %subscriber.key, "Subscriber closed");
                        break;
                    }
                },
            };
            if let Err(e) = self.handle_subscription_message(sample).await {
                error!(error = %e, "Message activation failed");
            }
        }
    }

    async fn tick_loop(&self, pacer: TickPacer, shutdown: &CancellationToken) {
        let mut seq: u64 = 0;
        while !shutdown.is_cancelled() {
            if self.transport.is_closed() {
                debug!(seq, "Session closed, stopping ticks");
                break;
            }

            let started = Instant::now();
            if let Err(e) = self.handle_timer_tick(seq).await {
                if self.transport.is_closed() {
                    debug!(seq, error = %e, "Session closed during tick");
                    break;
                }
                error!(error = %e, seq, "Tick activation failed");
            }

            let latency = started.elapsed();
            let delay = pacer.delay_after(latency);
            if delay.is_zero() {
                debug!(seq, latency = ?latency, "Tick overran its period");
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
            seq += 1;
        }
    }
}
