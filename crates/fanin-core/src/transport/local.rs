//! In-process transport.
//!
//! Routes publications and queries between declarations made on the same
//! [`LocalTransport`] by key intersection. Used to run a node standalone and
//! to exercise the orchestration end to end in tests.

use super::{
    CongestionControl, ConsolidationMode, GetOptions, PutOptions, Query, QueryTarget, Queryable,
    Reply, Sample, Subscriber, Transport,
};
use crate::key::KeyExpr;
use async_trait::async_trait;
use bytes::Bytes;
use eyre::{Result, ensure};
use flume::TrySendError;
use futures::future;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

/// Default duration of a scatter/gather round.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of samples or queries a declaration can hold unread.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Routes {
    subscribers: Vec<(KeyExpr, flume::Sender<Sample>)>,
    queryables: Vec<QueryableRoute>,
}

#[derive(Debug)]
struct QueryableRoute {
    key: KeyExpr,
    complete: bool,
    tx: flume::Sender<Query>,
}

/// An in-process [`Transport`].
///
/// Every subscriber and queryable gets a bounded queue. A publication with
/// [`CongestionControl::Drop`] and a query reaching a full queue are
/// dropped for that declaration only.
#[derive(Debug)]
pub struct LocalTransport {
    routes: RwLock<Routes>,
    query_timeout: Duration,
    capacity: usize,
    closed: AtomicBool,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl LocalTransport {
    /// Create a transport whose query rounds close after `query_timeout`.
    pub fn new(query_timeout: Duration) -> Self {
        Self {
            routes: RwLock::new(Routes::default()),
            query_timeout,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            closed: AtomicBool::new(false),
        }
    }

    /// Set the queue length of declarations made from now on. At least one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.is_closed(), "transport session is closed");
        Ok(())
    }

    /// Select the queryables receiving a query on `key`.
    fn select_queryables(&self, key: &KeyExpr, target: QueryTarget) -> Vec<flume::Sender<Query>> {
        let mut routes = self.routes.write();
        routes.queryables.retain(|q| !q.tx.is_disconnected());

        let mut matching = routes.queryables.iter().filter(|q| q.key.intersects(key));
        match target {
            QueryTarget::All => matching.map(|q| q.tx.clone()).collect(),
            QueryTarget::AllComplete => matching
                .filter(|q| q.complete)
                .map(|q| q.tx.clone())
                .collect(),
            QueryTarget::BestMatching => {
                let candidates: Vec<_> = matching.by_ref().collect();
                match candidates.iter().find(|q| q.complete) {
                    Some(complete) => vec![complete.tx.clone()],
                    None => candidates.iter().map(|q| q.tx.clone()).collect(),
                }
            }
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn put_with(&self, key: &KeyExpr, payload: Bytes, options: PutOptions) -> Result<()> {
        self.ensure_open()?;

        // Snapshot the routes so no lock is held while delivering.
        let targets: Vec<flume::Sender<Sample>> = {
            let mut routes = self.routes.write();
            routes.subscribers.retain(|(_, tx)| !tx.is_disconnected());
            routes
                .subscribers
                .iter()
                .filter(|(sub_key, _)| sub_key.intersects(key))
                .map(|(_, tx)| tx.clone())
                .collect()
        };

        trace!(
            key = %key,
            subscribers = targets.len(),
            priority = ?options.priority,
            "put"
        );

        for tx in targets {
            let sample = Sample::new(key.clone(), payload.clone());
            // A subscriber dropped since the snapshot is not an error.
            match options.congestion_control {
                CongestionControl::Drop => {
                    if let Err(TrySendError::Full(_)) = tx.try_send(sample) {
                        debug!(key = %key, "Subscriber queue full, dropping sample");
                    }
                }
                CongestionControl::Block => {
                    let _ = tx.send_async(sample).await;
                }
            }
        }
        Ok(())
    }

    async fn get(&self, key: &KeyExpr, options: GetOptions) -> Result<Vec<Reply>> {
        self.ensure_open()?;

        let targets = self.select_queryables(key, options.target);
        let deadline = Instant::now() + self.query_timeout;

        debug!(key = %key, queryables = targets.len(), target = ?options.target, "get");

        let pending: Vec<_> = targets
            .into_iter()
            .filter_map(|tx| {
                let (query, reply_rx) = Query::new(key.clone(), options.payload.clone());
                match tx.try_send(query) {
                    Ok(()) => Some(reply_rx),
                    Err(TrySendError::Full(_)) => {
                        debug!(key = %key, "Queryable queue full, dropping query");
                        None
                    }
                    Err(TrySendError::Disconnected(_)) => None,
                }
            })
            .collect();

        // A queryable that drops the query or misses the deadline simply
        // contributes no reply to the round.
        let replies = future::join_all(pending.into_iter().map(|rx| timeout_at(deadline, rx)))
            .await
            .into_iter()
            .filter_map(|res| res.ok()?.ok());

        let replies: Vec<Reply> = match options.consolidation {
            ConsolidationMode::None => replies.collect(),
            ConsolidationMode::Latest => {
                let mut latest: IndexMap<KeyExpr, Reply> = IndexMap::new();
                let mut errors = Vec::new();
                for reply in replies {
                    match &reply {
                        Ok(sample) => {
                            latest.insert(sample.key.clone(), reply);
                        }
                        Err(_) => errors.push(reply),
                    }
                }
                latest.into_values().chain(errors).collect()
            }
        };

        Ok(replies)
    }

    async fn declare_subscriber(&self, key: &KeyExpr) -> Result<Subscriber> {
        self.ensure_open()?;
        let (tx, rx) = flume::bounded(self.capacity);
        self.routes.write().subscribers.push((key.clone(), tx));
        debug!(key = %key, "declared subscriber");
        Ok(Subscriber {
            key: key.clone(),
            rx,
        })
    }

    async fn declare_queryable(&self, key: &KeyExpr, complete: bool) -> Result<Queryable> {
        self.ensure_open()?;
        let (tx, rx) = flume::bounded(self.capacity);
        self.routes.write().queryables.push(QueryableRoute {
            key: key.clone(),
            complete,
            tx,
        });
        debug!(key = %key, complete, "declared queryable");
        Ok(Queryable {
            key: key.clone(),
            rx,
        })
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut routes = self.routes.write();
        routes.subscribers.clear();
        routes.queryables.clear();
        debug!("local transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
