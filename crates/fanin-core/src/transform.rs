//! The fusion extension point.

use crate::{fetch::FetchResult, payload::ImageFormat};
use bytes::Bytes;
use eyre::Result;
use std::time::Duration;
use tracing::debug;

/// The body of one output, produced by a [`Transform`].
///
/// Timestamp and frame are stamped later by the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub format: ImageFormat,
    pub data: Bytes,
}

impl Artifact {
    pub fn new(format: ImageFormat, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }

    /// Stand-in output used when no fused image is available.
    pub fn placeholder() -> Self {
        Self::new(ImageFormat::Jpeg, Bytes::from_static(b"binary_image_data"))
    }
}

/// Fuses the records gathered by one activation into one artifact.
///
/// Called exactly once per activation, after the fetch completes. The
/// input may be empty; implementations must still produce an artifact or
/// return an error.
pub trait Transform: Send + Sync + 'static {
    fn transform(&self, input: &FetchResult, ingress: Duration) -> Result<Artifact>;
}

impl<F> Transform for F
where
    F: Fn(&FetchResult, Duration) -> Result<Artifact> + Send + Sync + 'static,
{
    fn transform(&self, input: &FetchResult, ingress: Duration) -> Result<Artifact> {
        self(input, ingress)
    }
}

/// Ignores its input and emits [`Artifact::placeholder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTransform;

impl Transform for PlaceholderTransform {
    fn transform(&self, input: &FetchResult, ingress: Duration) -> Result<Artifact> {
        debug!(
            source = %input.source,
            records = input.len(),
            frames = %input.frame_ids(),
            ingress = ?ingress,
            "Placeholder transform"
        );
        Ok(Artifact::placeholder())
    }
}
