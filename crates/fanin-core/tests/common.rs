use bytes::Bytes;
use fanin_core::{
    Artifact, FetchResult, KeyExpr, LocalTransport, OrchestratorConfig, PayloadKind, Source,
    Transport, TriggerMode, envelope,
    key::{pub_sub_key, req_rep_key},
    payload::{CompressedImage, PointCloud},
    time::duration_to_timestamp,
    transport::Subscriber,
};
use parking_lot::Mutex;
use prost::Message;
use std::{sync::Arc, time::Duration};

pub const REALM: &str = "rise";
pub const ENTITY: &str = "boat";

/// What a simulated source answers with.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum SourceReply {
    Image { frame_id: String, ts: Duration },
    PointCloud { frame_id: String, ts: Duration },
    Garbage,
    Error,
}

impl SourceReply {
    #[allow(dead_code)]
    pub fn image(frame_id: &str, ts_ms: u64) -> Self {
        SourceReply::Image {
            frame_id: frame_id.to_string(),
            ts: Duration::from_millis(ts_ms),
        }
    }

    #[allow(dead_code)]
    pub fn point_cloud(frame_id: &str, ts_ms: u64) -> Self {
        SourceReply::PointCloud {
            frame_id: frame_id.to_string(),
            ts: Duration::from_millis(ts_ms),
        }
    }
}

#[allow(dead_code)]
pub fn output_key() -> KeyExpr {
    pub_sub_key(REALM, ENTITY, "compressed_image", "panorama/0").unwrap()
}

#[allow(dead_code)]
pub fn queryable_key() -> KeyExpr {
    req_rep_key(REALM, ENTITY, "do_some_tracking", "panorama").unwrap()
}

#[allow(dead_code)]
pub fn camera_key(id: &str) -> KeyExpr {
    pub_sub_key(REALM, ENTITY, "compressed_image", &format!("camera/{}", id)).unwrap()
}

#[allow(dead_code)]
pub fn lidar_key(id: &str) -> KeyExpr {
    pub_sub_key(REALM, ENTITY, "point_cloud", &format!("lidar/{}", id)).unwrap()
}

/// Subscription trigger on a dedicated camera feed.
#[allow(dead_code)]
pub fn subscribe_trigger() -> TriggerMode {
    TriggerMode::Subscribe(Source::new(
        pub_sub_key(REALM, ENTITY, "compressed_image", "trigger/0").unwrap(),
        PayloadKind::CompressedImage,
    ))
}

#[allow(dead_code)]
pub fn config(trigger: TriggerMode) -> OrchestratorConfig {
    OrchestratorConfig::new(
        output_key(),
        queryable_key(),
        trigger,
        KeyExpr::new("rise/@v0/boat/pubsub/compressed_image/camera/*").unwrap(),
        KeyExpr::new("rise/@v0/boat/pubsub/point_cloud/lidar/*").unwrap(),
    )
}

#[allow(dead_code)]
pub fn enclosed_image(frame_id: &str, ts: Duration) -> Bytes {
    let image = CompressedImage {
        timestamp: Some(duration_to_timestamp(ts)),
        frame_id: frame_id.to_string(),
        data: Bytes::from_static(b"camera_pixels"),
        format: "jpeg".to_string(),
    };
    envelope::enclose(image.encode_to_vec())
}

#[allow(dead_code)]
pub fn enclosed_point_cloud(frame_id: &str, ts: Duration) -> Bytes {
    let cloud = PointCloud {
        timestamp: Some(duration_to_timestamp(ts)),
        frame_id: frame_id.to_string(),
        pose: None,
        point_stride: 4,
        fields: Vec::new(),
        data: Bytes::from_static(&[0u8; 16]),
    };
    envelope::enclose(cloud.encode_to_vec())
}

/// Declare a queryable on `key` answering every query with `reply` after
/// `delay`.
#[allow(dead_code)]
pub async fn spawn_source(
    transport: &Arc<LocalTransport>,
    key: KeyExpr,
    reply: SourceReply,
    delay: Duration,
) {
    let queryable = transport.declare_queryable(&key, false).await.unwrap();
    tokio::spawn(async move {
        while let Ok(query) = queryable.rx.recv_async().await {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = match &reply {
                SourceReply::Image { frame_id, ts } => query.reply(enclosed_image(frame_id, *ts)),
                SourceReply::PointCloud { frame_id, ts } => {
                    query.reply(enclosed_point_cloud(frame_id, *ts))
                }
                SourceReply::Garbage => query.reply(Bytes::from_static(&[0xff, 0xff, 0xff])),
                SourceReply::Error => query.reply_err("sensor offline"),
            };
        }
    });
}

/// Decode an output payload back into the image it carries.
#[allow(dead_code)]
pub fn decode_output(payload: &[u8]) -> CompressedImage {
    let uncovered = envelope::uncover(payload).unwrap();
    CompressedImage::decode(uncovered.content.as_ref()).unwrap()
}

/// Drain every sample currently queued on a subscriber.
#[allow(dead_code)]
pub fn drain(subscriber: &Subscriber) -> Vec<fanin_core::transport::Sample> {
    subscriber.rx.try_iter().collect()
}

/// What a transform observed on one call.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub struct Observed {
    pub records: usize,
    pub failed: usize,
    pub timestamps: Vec<Duration>,
    pub ingress: Duration,
}

/// A deterministic transform recording its inputs.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingTransform {
    pub calls: Arc<Mutex<Vec<Observed>>>,
}

impl RecordingTransform {
    #[allow(dead_code)]
    pub fn transform_fn(
        &self,
    ) -> impl Fn(&FetchResult, Duration) -> eyre::Result<Artifact> + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        move |input: &FetchResult, ingress: Duration| {
            use fanin_core::WithTimestamp;
            calls.lock().push(Observed {
                records: input.len(),
                failed: input.failed(),
                timestamps: input.records.iter().map(|r| r.timestamp()).collect(),
                ingress,
            });
            Ok(Artifact::placeholder())
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<Observed> {
        self.calls.lock().clone()
    }
}
