mod common;

use common::{SourceReply, camera_key, lidar_key, spawn_source};
use fanin_core::{
    Fetcher, KeyExpr, LocalTransport, PayloadKind, Source, Transport, WithTimestamp,
    fetch::FetchFailure,
};
use std::{sync::Arc, time::Duration};

fn camera_source() -> Source {
    Source::new(
        KeyExpr::new("rise/@v0/boat/pubsub/compressed_image/camera/*").unwrap(),
        PayloadKind::CompressedImage,
    )
}

#[tokio::test]
async fn test_fetch_gathers_every_source() {
    let transport = Arc::new(LocalTransport::default());
    spawn_source(&transport, camera_key("0"), SourceReply::image("cam0", 100), Duration::ZERO).await;
    spawn_source(&transport, camera_key("1"), SourceReply::image("cam1", 200), Duration::ZERO).await;
    spawn_source(&transport, camera_key("2"), SourceReply::image("cam2", 300), Duration::ZERO).await;

    let fetcher = Fetcher::new(Arc::clone(&transport));
    let result = fetcher.fetch(&camera_source()).await.unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.failed(), 0);
    let mut timestamps: Vec<_> = result.records.iter().map(|r| r.timestamp()).collect();
    timestamps.sort();
    assert_eq!(
        timestamps,
        [100, 200, 300].map(Duration::from_millis).to_vec()
    );
}

#[tokio::test]
async fn test_fetch_excludes_failed_replies() {
    let transport = Arc::new(LocalTransport::default());
    spawn_source(&transport, camera_key("0"), SourceReply::image("cam0", 1), Duration::ZERO).await;
    spawn_source(&transport, camera_key("1"), SourceReply::Garbage, Duration::ZERO).await;
    spawn_source(&transport, camera_key("2"), SourceReply::image("cam2", 2), Duration::ZERO).await;
    spawn_source(&transport, camera_key("3"), SourceReply::Error, Duration::ZERO).await;
    // Wrong schema: the point cloud stride is a fixed32 on the image frame_id tag.
    spawn_source(&transport, camera_key("4"), SourceReply::point_cloud("lidar", 3), Duration::ZERO).await;

    let fetcher = Fetcher::new(Arc::clone(&transport));
    let result = fetcher.fetch(&camera_source()).await.unwrap();

    let k = 5;
    let e = 3;
    assert_eq!(result.failed(), e);
    assert_eq!(result.len(), k - e);
    assert_eq!(result.frame_ids().len(), "cam0,cam2".len());
    assert!(
        result
            .failures
            .iter()
            .any(|f| matches!(f, FetchFailure::ErrorReply { .. }))
    );
    assert!(
        result
            .failures
            .iter()
            .any(|f| matches!(f, FetchFailure::Decode { .. }))
    );
}

#[tokio::test]
async fn test_fetch_without_sources_is_empty() {
    let transport = Arc::new(LocalTransport::default());
    spawn_source(&transport, lidar_key("0"), SourceReply::point_cloud("lidar", 1), Duration::ZERO).await;

    let fetcher = Fetcher::new(Arc::clone(&transport));
    let result = fetcher.fetch(&camera_source()).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(result.failed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_round_closes_without_slow_source() {
    let transport = Arc::new(LocalTransport::new(Duration::from_millis(200)));
    spawn_source(&transport, camera_key("0"), SourceReply::image("fast", 1), Duration::from_millis(10)).await;
    spawn_source(&transport, camera_key("1"), SourceReply::image("slow", 2), Duration::from_secs(5)).await;

    let fetcher = Fetcher::new(Arc::clone(&transport));
    let result = fetcher.fetch(&camera_source()).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.frame_ids(), "fast");
}

#[tokio::test]
async fn test_fetch_on_closed_transport_fails() {
    let transport = Arc::new(LocalTransport::default());
    transport.close().unwrap();

    let fetcher = Fetcher::new(Arc::clone(&transport));
    assert!(fetcher.fetch(&camera_source()).await.is_err());
}
