//! Timestamped envelope wrapping every payload on the wire.

use crate::{
    error::CodecError,
    payload::Timestamp,
    time::{self, duration_to_timestamp, timestamp_to_duration},
};
use bytes::Bytes;
use prost::Message;
use std::time::Duration;

/// Wire representation of an envelope.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(message, optional, tag = "1")]
    pub enclosed_at: Option<Timestamp>,
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,
}

/// The result of opening an envelope.
///
/// `enclosed_at` is stamped by the sender and `received_at` by the local
/// clock, so `enclosed_at <= received_at` does not hold under clock skew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uncovered {
    pub received_at: Duration,
    pub enclosed_at: Duration,
    pub content: Bytes,
}

/// Enclose `content`, stamping it with the current time.
pub fn enclose(content: impl Into<Bytes>) -> Bytes {
    enclose_at(content, time::now())
}

/// Enclose `content`, stamping it with `enclosed_at`.
pub fn enclose_at(content: impl Into<Bytes>, enclosed_at: Duration) -> Bytes {
    let envelope = Envelope {
        enclosed_at: Some(duration_to_timestamp(enclosed_at)),
        payload: content.into(),
    };
    Bytes::from(envelope.encode_to_vec())
}

/// Open an envelope, stamping it with the current time as `received_at`.
pub fn uncover(bytes: &[u8]) -> Result<Uncovered, CodecError> {
    let received_at = time::now();
    let envelope = Envelope::decode(bytes).map_err(CodecError::Envelope)?;
    let enclosed_at = envelope
        .enclosed_at
        .as_ref()
        .map(timestamp_to_duration)
        .ok_or(CodecError::MissingField {
            message: "Envelope",
            field: "enclosed_at",
        })?;

    Ok(Uncovered {
        received_at,
        enclosed_at,
        content: envelope.payload,
    })
}
