//! Process-wide transport session.

use crate::{
    key::KeyExpr,
    transport::{PutOptions, Transport},
};
use bytes::Bytes;
use eyre::{Result, WrapErr};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info, warn};

/// Owns the transport for the lifetime of the process.
///
/// The session is released exactly once, either by [`Session::close`] or
/// when the session is dropped.
pub struct Session<T: Transport> {
    transport: Arc<T>,
    closed: AtomicBool,
}

impl<T: Transport> Session<T> {
    /// Take ownership of a connected transport.
    pub fn open(transport: T) -> Self {
        info!("Transport session opened");
        Self {
            transport: Arc::new(transport),
            closed: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Declare a publisher on `key` with default quality of service.
    pub fn declare_publisher(&self, key: KeyExpr) -> Publisher<T> {
        self.declare_publisher_with(key, PutOptions::default())
    }

    /// Declare a publisher on `key` whose publications use `options`.
    pub fn declare_publisher_with(&self, key: KeyExpr, options: PutOptions) -> Publisher<T> {
        info!(
            key = %key,
            congestion_control = ?options.congestion_control,
            priority = ?options.priority,
            "Created publisher"
        );
        Publisher {
            key,
            options,
            transport: Arc::clone(&self.transport),
        }
    }

    /// Release the transport session.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing transport session");
        self.transport
            .close()
            .wrap_err("Failed to close transport session")
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            debug!("Session dropped without explicit close");
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to release transport session");
            }
        }
    }
}

/// A handle publishing on one pre-declared key.
///
/// Cloning is cheap and clones may publish concurrently.
pub struct Publisher<T: Transport> {
    key: KeyExpr,
    options: PutOptions,
    transport: Arc<T>,
}

impl<T: Transport> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            options: self.options,
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> Publisher<T> {
    pub fn key(&self) -> &KeyExpr {
        &self.key
    }

    pub fn options(&self) -> PutOptions {
        self.options
    }

    pub async fn put(&self, payload: Bytes) -> Result<()> {
        self.transport
            .put_with(&self.key, payload, self.options)
            .await
            .wrap_err_with(|| format!("Failed to publish on '{}'", self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CongestionControl, LocalTransport, Priority};

    #[tokio::test]
    async fn test_drop_releases_transport() {
        let session = Session::open(LocalTransport::default());
        let transport = Arc::clone(session.transport());
        drop(session);
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_publish_fails_after_close() {
        let session = Session::open(LocalTransport::default());
        let key = KeyExpr::new("a/b").unwrap();
        let publisher = session.declare_publisher(key);

        publisher.put(Bytes::from_static(b"x")).await.unwrap();
        session.close().unwrap();
        assert!(publisher.put(Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn test_publisher_options_reach_transport() {
        let session = Session::open(LocalTransport::default().with_capacity(1));
        let key = KeyExpr::new("a/b").unwrap();
        let sub = session.transport().declare_subscriber(&key).await.unwrap();
        let options = PutOptions {
            congestion_control: CongestionControl::Drop,
            priority: Priority::InteractiveHigh,
        };
        let publisher = session.declare_publisher_with(key, options);
        assert_eq!(publisher.clone().options(), options);

        // The second sample finds the queue full and is dropped.
        publisher.put(Bytes::from_static(b"1")).await.unwrap();
        publisher.put(Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(sub.rx.len(), 1);
    }
}
