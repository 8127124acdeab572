//! Simulated sensors for running the node without hardware.
//!
//! Simulated cameras and lidars are queryables answering every query with
//! an enclosed placeholder payload. An optional simulated camera feed
//! publishes images at a fixed rate, which can drive the subscription
//! trigger.

use crate::config::{Config, SimConfig};
use bytes::Bytes;
use eyre::{Result, WrapErr};
use fanin_core::{
    KeyExpr, PayloadKind, Publisher, Session, Transport, envelope,
    key::pub_sub_key, period_from_rate,
    payload::{CompressedImage, NumericType, PackedElementField, PointCloud},
    time::{self, duration_to_timestamp},
    transport::Queryable,
};
use prost::Message;
use std::time::Duration;
use tokio::{task::JoinSet, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Placeholder pixels carried by simulated images.
const SIM_IMAGE_DATA: &[u8] = b"sim_image_data";

/// Points per simulated cloud.
const SIM_POINTS: usize = 4;

/// An enclosed camera image stamped at `ts`.
pub fn sim_image(frame_id: &str, ts: Duration) -> Bytes {
    let image = CompressedImage {
        timestamp: Some(duration_to_timestamp(ts)),
        frame_id: frame_id.to_string(),
        data: Bytes::from_static(SIM_IMAGE_DATA),
        format: "jpeg".to_string(),
    };
    envelope::enclose(image.encode_to_vec())
}

/// An enclosed xyz point cloud of zeros stamped at `ts`.
pub fn sim_point_cloud(frame_id: &str, ts: Duration) -> Bytes {
    let fields = ["x", "y", "z"]
        .into_iter()
        .enumerate()
        .map(|(i, name)| PackedElementField {
            name: name.to_string(),
            offset: (i * 4) as u32,
            r#type: NumericType::Float32 as i32,
        })
        .collect();
    let stride = 12;
    let cloud = PointCloud {
        timestamp: Some(duration_to_timestamp(ts)),
        frame_id: frame_id.to_string(),
        pose: None,
        point_stride: stride,
        fields,
        data: Bytes::from(vec![0u8; stride as usize * SIM_POINTS]),
    };
    envelope::enclose(cloud.encode_to_vec())
}

fn sim_payload(kind: PayloadKind, frame_id: &str) -> Bytes {
    match kind {
        PayloadKind::CompressedImage => sim_image(frame_id, time::now()),
        PayloadKind::PointCloud => sim_point_cloud(frame_id, time::now()),
    }
}

/// Declare every simulated source in `sim` and spawn its task.
///
/// Tasks stop when `shutdown` fires or the session closes.
pub async fn spawn<T: Transport>(
    session: &Session<T>,
    config: &Config,
    sim: &SimConfig,
    shutdown: &CancellationToken,
) -> Result<JoinSet<()>> {
    let mut tasks = JoinSet::new();
    let sources = sim
        .cameras
        .iter()
        .map(|id| (id, PayloadKind::CompressedImage))
        .chain(sim.lidars.iter().map(|id| (id, PayloadKind::PointCloud)));

    for (source_id, kind) in sources {
        let key = pub_sub_key(&config.realm, &config.entity_id, kind.subject(), source_id)
            .wrap_err("Invalid simulated source id")?;
        let queryable = session
            .transport()
            .declare_queryable(&key, false)
            .await
            .wrap_err_with(|| format!("Failed to declare simulated source '{}'", key))?;
        info!(key = %key, kind = %kind, "Simulated source ready");

        tasks.spawn(answer_queries(
            queryable,
            kind,
            source_id.clone(),
            sim.latency,
            shutdown.clone(),
        ));
    }

    if let Some(feed) = &sim.feed {
        let key = feed_key(&config.realm, &config.entity_id, &feed.source_id)
            .wrap_err("Invalid simulated feed source id")?;
        let period = period_from_rate(feed.rate_hz).wrap_err("Invalid simulated feed rate")?;
        info!(key = %key, period = ?period, "Simulated camera feed ready");

        let publisher = session.declare_publisher(key);
        tasks.spawn(publish_feed(
            publisher,
            feed.source_id.clone(),
            period,
            shutdown.clone(),
        ));
    }

    Ok(tasks)
}

async fn answer_queries(
    queryable: Queryable,
    kind: PayloadKind,
    frame_id: String,
    latency: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let query = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            query = queryable.rx.recv_async() => match query {
                Ok(query) => query,
                Err(_) => break,
            },
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Err(e) = query.reply(sim_payload(kind, &frame_id)) {
            debug!(key = %queryable.key, error = %e, "Simulated reply dropped");
        }
    }
    debug!(key = %queryable.key, "Simulated source stopped");
}

async fn publish_feed<T: Transport>(
    publisher: Publisher<T>,
    frame_id: String,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let payload = sim_image(&frame_id, time::now());
        if let Err(e) = publisher.put(payload).await {
            warn!(key = %publisher.key(), error = %e, "Simulated feed stopped");
            break;
        }
    }
}

/// Key the simulated camera feed publishes on.
pub fn feed_key(realm: &str, entity_id: &str, source_id: &str) -> Result<KeyExpr> {
    pub_sub_key(
        realm,
        entity_id,
        PayloadKind::CompressedImage.subject(),
        source_id,
    )
}
