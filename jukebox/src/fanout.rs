//! Snapshot fanout to long-lived subscribers
//!
//! Each subscriber owns a bounded queue. A full queue makes the publisher wait
//! (back-pressure); snapshots are never dropped for a connected subscriber. A
//! subscriber still full after the publish timeout is disconnected: its stream ends
//! after the snapshots already queued.

use crate::queue::QueueSnapshot;
use futures::future::join_all;
use futures::stream::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Item in a subscriber queue
#[derive(Debug, Clone)]
enum Delivery {
    Snapshot(Arc<QueueSnapshot>),
    /// Terminal marker: no more updates
    Closed,
}

struct Registry {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Delivery>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Registry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::Sender<Delivery>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unregister(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            debug!("Subscriber {} left", id);
        }
    }
}

/// Fanout hub
///
/// Cheap to clone; clones share the subscriber set.
#[derive(Clone)]
pub struct Fanout {
    registry: Arc<Registry>,
    capacity: usize,
    publish_timeout: Duration,
}

impl Fanout {
    /// Create a fanout
    ///
    /// # Arguments
    ///
    /// * `capacity` - Snapshots buffered per subscriber
    /// * `publish_timeout` - Longest wait on one full subscriber before disconnecting it
    pub fn new(capacity: usize, publish_timeout: Duration) -> Self {
        info!(
            "Snapshot fanout initialized (capacity {}, publish timeout {:?})",
            capacity, publish_timeout
        );
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
            capacity: capacity.max(1),
            publish_timeout,
        }
    }

    /// Register a new subscriber
    ///
    /// After [`Fanout::shutdown`] the handle only yields the terminal marker.
    pub fn subscribe(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut subscribers = self.registry.lock();
        if self.registry.closed.load(Ordering::Acquire) {
            // Fresh channel with room for one item
            let _ = tx.try_send(Delivery::Closed);
        } else {
            subscribers.insert(id, tx);
            debug!("Subscriber {} joined, total subscribers: {}", id, subscribers.len());
        }
        drop(subscribers);

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
            finished: false,
            shut_down: false,
        }
    }

    /// Current number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Deliver a snapshot to every registered subscriber
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, snapshot: Arc<QueueSnapshot>) -> usize {
        let targets: Vec<(u64, mpsc::Sender<Delivery>)> = {
            let subscribers = self.registry.lock();
            if self.registry.closed.load(Ordering::Acquire) {
                return 0;
            }
            subscribers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        if targets.is_empty() {
            return 0;
        }

        let timeout = self.publish_timeout;
        let sends = targets.into_iter().map(|(id, tx)| {
            let delivery = Delivery::Snapshot(snapshot.clone());
            async move { (id, tokio::time::timeout(timeout, tx.send(delivery)).await) }
        });

        let mut delivered = 0;
        for (id, result) in join_all(sends).await {
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(_)) => self.registry.unregister(id),
                Err(_) => {
                    warn!(
                        "Subscriber {} did not drain within {:?}, disconnecting",
                        id, timeout
                    );
                    self.registry.unregister(id);
                }
            }
        }

        debug!("Published version {} to {} subscribers", snapshot.version, delivered);
        delivered
    }

    /// Send the terminal marker to every subscriber and close the fanout
    pub async fn shutdown(&self) {
        let targets: Vec<(u64, mpsc::Sender<Delivery>)> = {
            let mut subscribers = self.registry.lock();
            self.registry.closed.store(true, Ordering::Release);
            subscribers.drain().collect()
        };

        info!("Closing fanout for {} subscribers", targets.len());

        let timeout = self.publish_timeout;
        let sends = targets.into_iter().map(|(id, tx)| async move {
            if tokio::time::timeout(timeout, tx.send(Delivery::Closed))
                .await
                .is_err()
            {
                warn!("Subscriber {} did not accept the close marker", id);
            }
        });
        join_all(sends).await;
    }
}

/// Subscriber handle
///
/// Dropping it unregisters the subscriber.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Delivery>,
    registry: Weak<Registry>,
    finished: bool,
    shut_down: bool,
}

impl Subscription {
    /// Next snapshot in publish order
    ///
    /// Returns None once the fanout shut down or disconnected this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<QueueSnapshot>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(Delivery::Snapshot(snapshot)) => Some(snapshot),
            Some(Delivery::Closed) => {
                self.finished = true;
                self.shut_down = true;
                None
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Snapshot already queued, without waiting
    pub fn try_recv(&mut self) -> Option<Arc<QueueSnapshot>> {
        if self.finished {
            return None;
        }
        match self.rx.try_recv() {
            Ok(Delivery::Snapshot(snapshot)) => Some(snapshot),
            Ok(Delivery::Closed) => {
                self.finished = true;
                self.shut_down = true;
                None
            }
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.finished = true;
                None
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
        }
    }

    /// True once the terminal marker (or disconnect) has been observed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True when the subscription ended because the fanout shut down
    ///
    /// False for subscribers disconnected for not keeping up.
    pub fn was_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Convert into a stream that ends with the subscription
    pub fn into_stream(mut self) -> impl Stream<Item = Arc<QueueSnapshot>> + Send + 'static {
        async_stream::stream! {
            while let Some(snapshot) = self.recv().await {
                yield snapshot;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}
