//! Packaging and delivery of transform output.

use crate::{
    envelope,
    key::KeyExpr,
    payload::CompressedImage,
    session::Publisher,
    time::duration_to_timestamp,
    transform::Artifact,
    transport::{Query, Transport},
};
use bytes::Bytes;
use eyre::{Result, WrapErr};
use prost::Message;
use std::time::Duration;
use tracing::debug;

/// Frame id stamped on outputs unless configured otherwise.
pub const DEFAULT_FRAME_ID: &str = "foxglove_frame_id";

/// Where an output goes.
#[derive(Debug)]
pub enum Delivery {
    /// Publish on the pre-declared output key.
    Publish,
    /// Answer the originating query.
    Reply(Query),
}

/// Wraps artifacts into enclosed payloads and delivers them.
///
/// The responder never alters the artifact body.
pub struct Responder<T: Transport> {
    publisher: Publisher<T>,
    frame_id: String,
}

impl<T: Transport> Responder<T> {
    pub fn new(publisher: Publisher<T>, frame_id: impl Into<String>) -> Self {
        Self {
            publisher,
            frame_id: frame_id.into(),
        }
    }

    pub fn output_key(&self) -> &KeyExpr {
        self.publisher.key()
    }

    /// Stamp, serialize and enclose an artifact.
    pub fn package(&self, artifact: Artifact, ingress: Duration) -> Bytes {
        let image = CompressedImage {
            timestamp: Some(duration_to_timestamp(ingress)),
            frame_id: self.frame_id.clone(),
            data: artifact.data,
            format: artifact.format.as_str().to_string(),
        };
        envelope::enclose(image.encode_to_vec())
    }

    /// Package `artifact` and deliver it once via `delivery`.
    pub async fn respond(
        &self,
        delivery: Delivery,
        artifact: Artifact,
        ingress: Duration,
    ) -> Result<()> {
        let envelope = self.package(artifact, ingress);
        let size = envelope.len();

        match delivery {
            Delivery::Publish => {
                self.publisher.put(envelope).await?;
                debug!(key = %self.publisher.key(), bytes = size, "Published output");
            }
            Delivery::Reply(query) => {
                let key = query.key().clone();
                query
                    .reply(envelope)
                    .wrap_err("Failed to reply to query")?;
                debug!(key = %key, bytes = size, "Replied to query");
            }
        }
        Ok(())
    }
}
