//! Scatter/gather fetching of upstream sensor payloads.
//!
//! A fetch issues one query round against a source key and decodes every
//! reply independently. A reply that fails to decode is recorded as a
//! failure and left out of the result; it never aborts the round.

use crate::{
    envelope::{self, Uncovered},
    error::CodecError,
    key::KeyExpr,
    payload::{PayloadKind, SensorPayload, WithTimestamp},
    transport::{ConsolidationMode, GetOptions, QueryTarget, Reply, Sample, Transport},
};
use bytes::Bytes;
use eyre::{Result, WrapErr};
use itertools::Itertools;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// An upstream resource and the schema it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub key: KeyExpr,
    pub kind: PayloadKind,
}

impl Source {
    pub fn new(key: KeyExpr, kind: PayloadKind) -> Self {
        Self { key, kind }
    }
}

/// A decoded sensor payload together with its envelope metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    /// Key the payload was received on.
    pub key: KeyExpr,
    pub received_at: Duration,
    pub enclosed_at: Duration,
    pub payload: SensorPayload,
}

impl SensorRecord {
    /// Open the envelope carried by `sample` and decode its content as `kind`.
    pub fn decode(sample: &Sample, kind: PayloadKind) -> Result<Self, CodecError> {
        let Uncovered {
            received_at,
            enclosed_at,
            content,
        } = envelope::uncover(&sample.payload)?;
        let payload = SensorPayload::decode(kind, &content)?;

        Ok(Self {
            key: sample.key.clone(),
            received_at,
            enclosed_at,
            payload,
        })
    }

    pub fn data(&self) -> &Bytes {
        self.payload.data()
    }
}

impl WithTimestamp for SensorRecord {
    fn timestamp(&self) -> Duration {
        self.payload.timestamp()
    }

    fn frame_id(&self) -> &str {
        self.payload.frame_id()
    }
}

/// Why a reply was left out of a fetch result.
#[derive(Debug)]
pub enum FetchFailure {
    /// The queryable answered with an error reply.
    ErrorReply { payload: Bytes },
    /// The reply could not be decoded.
    Decode { key: KeyExpr, error: CodecError },
}

/// The outcome of one fetch round.
///
/// An empty result is valid and not an error.
#[derive(Debug)]
pub struct FetchResult {
    pub source: KeyExpr,
    pub records: Vec<SensorRecord>,
    pub failures: Vec<FetchFailure>,
}

impl FetchResult {
    pub fn empty(source: KeyExpr) -> Self {
        Self {
            source,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Decode every reply of a round, keeping successes in arrival order.
    pub fn from_replies(source: &Source, replies: impl IntoIterator<Item = Reply>) -> Self {
        let mut result = Self::empty(source.key.clone());
        for reply in replies {
            result.push_reply(reply, source.kind);
        }
        result
    }

    /// Decode a single sample as the whole input, as done for subscribed
    /// messages.
    pub fn from_sample(sample: &Sample, kind: PayloadKind) -> Self {
        let mut result = Self::empty(sample.key.clone());
        result.push_reply(Ok(sample.clone()), kind);
        result
    }

    /// A result holding no records and a single failure.
    pub fn from_failure(source: KeyExpr, failure: FetchFailure) -> Self {
        let mut result = Self::empty(source);
        result.failures.push(failure);
        result
    }

    fn push_reply(&mut self, reply: Reply, kind: PayloadKind) {
        match reply {
            Ok(sample) => match SensorRecord::decode(&sample, kind) {
                Ok(record) => {
                    debug!(
                        key = %record.key,
                        frame_id = %record.frame_id(),
                        timestamp = ?record.timestamp(),
                        bytes = record.data().len(),
                        "Received record"
                    );
                    self.records.push(record);
                }
                Err(error) => {
                    warn!(key = %sample.key, error = %error, "Dropping undecodable reply");
                    self.failures.push(FetchFailure::Decode {
                        key: sample.key,
                        error,
                    });
                }
            },
            Err(err) => {
                warn!(
                    source = %self.source,
                    payload = %String::from_utf8_lossy(&err.payload),
                    "Received error reply"
                );
                self.failures.push(FetchFailure::ErrorReply {
                    payload: err.payload,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of replies left out of the result.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Frame ids of the records, comma separated, for logging.
    pub fn frame_ids(&self) -> String {
        self.records.iter().map(|r| r.frame_id()).join(",")
    }
}

/// Issues scatter/gather rounds on a shared transport.
pub struct Fetcher<T: Transport> {
    transport: Arc<T>,
    target: QueryTarget,
    consolidation: ConsolidationMode,
}

impl<T: Transport> Clone for Fetcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            target: self.target,
            consolidation: self.consolidation,
        }
    }
}

impl<T: Transport> Fetcher<T> {
    /// Create a fetcher using best-matching targets and no consolidation.
    ///
    /// Merging redundant or partial replies is left to the transform.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            target: QueryTarget::BestMatching,
            consolidation: ConsolidationMode::None,
        }
    }

    /// Run one round against `source`.
    ///
    /// Only a transport-level failure is returned as an error.
    pub async fn fetch(&self, source: &Source) -> Result<FetchResult> {
        let options = GetOptions {
            target: self.target,
            consolidation: self.consolidation,
            payload: None,
        };
        let replies = self
            .transport
            .get(&source.key, options)
            .await
            .wrap_err_with(|| format!("Query on '{}' failed", source.key))?;
        let num_replies = replies.len();

        let result = FetchResult::from_replies(source, replies);

        debug!(
            source = %source.key,
            replies = num_replies,
            records = result.len(),
            failed = result.failed(),
            "Fetch round closed"
        );

        Ok(result)
    }
}
