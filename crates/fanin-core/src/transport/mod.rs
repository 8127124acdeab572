//! The messaging layer seen by the fusion core.
//!
//! [`Transport`] is the only seam between the core and a concrete
//! middleware. Subscriptions and queryables deliver their traffic through
//! [`flume`] channels; the consumer decides how to schedule it.

mod local;

pub use local::LocalTransport;

use crate::key::KeyExpr;
use async_trait::async_trait;
use bytes::Bytes;
use eyre::{Result, eyre};
use tokio::sync::oneshot;

/// A keyed payload delivered by a publication or a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub key: KeyExpr,
    pub payload: Bytes,
}

impl Sample {
    pub fn new(key: KeyExpr, payload: impl Into<Bytes>) -> Self {
        Self {
            key,
            payload: payload.into(),
        }
    }
}

/// An error reply sent by a queryable instead of a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyError {
    pub payload: Bytes,
}

/// One reply of a scatter/gather round.
pub type Reply = std::result::Result<Sample, ReplyError>;

/// Which queryables receive a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryTarget {
    /// Prefer a single queryable declared complete for the key, falling
    /// back to every matching queryable.
    #[default]
    BestMatching,
    /// Every matching queryable.
    All,
    /// Only matching queryables declared complete.
    AllComplete,
}

/// How replies to the same key are merged before reaching the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsolidationMode {
    /// Every raw reply is delivered.
    #[default]
    None,
    /// Only the last reply received for each key is delivered.
    Latest,
}

/// Parameters of a scatter/gather round.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub target: QueryTarget,
    pub consolidation: ConsolidationMode,
    pub payload: Option<Bytes>,
}

/// What a publication does when a subscriber cannot keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CongestionControl {
    /// Drop the sample for that subscriber.
    #[default]
    Drop,
    /// Wait until the subscriber has room.
    Block,
}

/// Delivery priority of a publication, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    RealTime,
    InteractiveHigh,
    InteractiveLow,
    DataHigh,
    #[default]
    Data,
    DataLow,
    Background,
}

/// Quality of service of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutOptions {
    pub congestion_control: CongestionControl,
    pub priority: Priority,
}

/// An inbound query together with its reply handle.
///
/// Replying consumes the query, so at most one reply can be sent. The reply
/// key is always the query's own key.
#[derive(Debug)]
pub struct Query {
    key: KeyExpr,
    payload: Option<Bytes>,
    reply_tx: oneshot::Sender<Reply>,
}

impl Query {
    pub(crate) fn new(key: KeyExpr, payload: Option<Bytes>) -> (Self, oneshot::Receiver<Reply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let query = Self {
            key,
            payload,
            reply_tx,
        };
        (query, reply_rx)
    }

    /// The key expression the querier asked for.
    pub fn key(&self) -> &KeyExpr {
        &self.key
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Answer the query with a sample on the query's key.
    pub fn reply(self, payload: impl Into<Bytes>) -> Result<()> {
        let sample = Sample::new(self.key.clone(), payload);
        self.reply_tx
            .send(Ok(sample))
            .map_err(|_| eyre!("querier of '{}' is gone", self.key))
    }

    /// Answer the query with an error reply.
    pub fn reply_err(self, payload: impl Into<Bytes>) -> Result<()> {
        let err = ReplyError {
            payload: payload.into(),
        };
        self.reply_tx
            .send(Err(err))
            .map_err(|_| eyre!("querier of '{}' is gone", self.key))
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscriber {
    pub key: KeyExpr,
    pub rx: flume::Receiver<Sample>,
}

/// Receiving end of a queryable.
#[derive(Debug)]
pub struct Queryable {
    pub key: KeyExpr,
    pub rx: flume::Receiver<Query>,
}

/// A keyed publish/subscribe and request/reply middleware.
///
/// Implementations must be safe to call from concurrent activations.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish a payload on `key` with default quality of service.
    async fn put(&self, key: &KeyExpr, payload: Bytes) -> Result<()> {
        self.put_with(key, payload, PutOptions::default()).await
    }

    /// Publish a payload on `key`.
    async fn put_with(&self, key: &KeyExpr, payload: Bytes, options: PutOptions) -> Result<()>;

    /// Run one scatter/gather round on `key` and return every reply
    /// received before the round closed.
    async fn get(&self, key: &KeyExpr, options: GetOptions) -> Result<Vec<Reply>>;

    async fn declare_subscriber(&self, key: &KeyExpr) -> Result<Subscriber>;

    /// Declare a queryable on `key`. A `complete` queryable can answer
    /// every query intersecting its key.
    async fn declare_queryable(&self, key: &KeyExpr, complete: bool) -> Result<Queryable>;

    /// Release the session. Closes every subscriber and queryable channel.
    /// Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Whether [`Transport::close`] has been called.
    fn is_closed(&self) -> bool;
}
