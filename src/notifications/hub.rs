//! Progress hub
//!
//! Registry of publisher and subscriber channels keyed by client key. Every
//! publisher gets a forwarding task that copies each snapshot to the subscriber
//! registered under the same key and to the wildcard subscriber. Delivery is a
//! blocking send, so a subscriber that stops reading stalls its publisher once
//! its buffer is full.
//!
//! The hub keeps only weak handles to both ends it hands out. A publisher
//! channel closes when the last strong sender (held by the progress reporter)
//! drops; the forwarding task then removes the publisher entry and the key's
//! subscriber entry. A subscription closes when its last [`ProgressSubscriber`]
//! handle drops: its entry is removed and pending deliveries to it fail, which
//! releases a stalled publisher. The wildcard subscriber is never removed by a
//! publisher.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::mpsc::{self, Receiver, Sender, WeakSender};
use tokio::sync::{watch, Mutex};

use crate::core::config::HubConfig;
use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::notifications::error::{HubError, HubResult};
use crate::notifications::event::Progress;

/// Subscriber key that receives every publisher's snapshots
pub const WILDCARD_KEY: &str = "*";

struct PublisherEntry {
    sender: WeakSender<Progress>,
    generation: u64,
}

struct SubscriberEntry {
    sender: Sender<Progress>,
    subscription: Weak<Subscription>,
    generation: u64,
}

#[derive(Default)]
struct Registry {
    publishers: HashMap<String, PublisherEntry>,
    subscribers: HashMap<String, SubscriberEntry>,
    next_generation: u64,
}

impl Registry {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct HubInner {
    registry: RwLock<Registry>,
    publisher_capacity: usize,
    subscriber_capacity: usize,
    open_publishers: watch::Sender<usize>,
}

impl HubInner {
    fn forget_subscriber(&self, key: &str, generation: u64) {
        let mut registry = match handle_rwlock_write(self.registry.write(), poisoned) {
            Ok(registry) => registry,
            Err(e) => {
                log::error!("Cannot remove progress subscriber '{}': {}", key, e);
                return;
            }
        };
        if registry
            .subscribers
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            registry.subscribers.remove(key);
            log::debug!("Progress subscriber '{}' dropped", key);
        }
    }
}

/// Shared handle to the hub; clones refer to the same registry
#[derive(Clone)]
pub struct ProgressHub {
    inner: Arc<HubInner>,
}

struct Subscription {
    key: String,
    generation: u64,
    receiver: Mutex<Receiver<Progress>>,
    hub: Weak<HubInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.forget_subscriber(&self.key, self.generation);
        }
    }
}

/// Receiving end of a subscription
///
/// Handles returned for the same key share one underlying channel, so each
/// snapshot is observed by exactly one of them. Dropping the last handle ends
/// the subscription.
#[derive(Clone)]
pub struct ProgressSubscriber {
    subscription: Arc<Subscription>,
}

impl ProgressSubscriber {
    pub fn key(&self) -> &str {
        &self.subscription.key
    }

    /// Next snapshot, or `None` once the subscription has been closed and drained
    pub async fn recv(&self) -> Option<Progress> {
        self.subscription.receiver.lock().await.recv().await
    }
}

fn poisoned(what: String) -> HubError {
    HubError::Poisoned { what }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(&HubConfig::default())
    }
}

impl ProgressHub {
    pub fn new(config: &HubConfig) -> Self {
        let (open_publishers, _) = watch::channel(0);
        Self {
            inner: Arc::new(HubInner {
                registry: RwLock::new(Registry::default()),
                publisher_capacity: config.publisher_capacity.max(1),
                subscriber_capacity: config.subscriber_capacity.max(1),
                open_publishers,
            }),
        }
    }

    /// Sender for snapshots published under `key`
    ///
    /// Returns the live channel if one exists, otherwise creates one and spawns
    /// its forwarding task. Must be called from within a Tokio runtime.
    pub fn get_publisher(&self, key: &str) -> HubResult<Sender<Progress>> {
        {
            let registry = handle_rwlock_read(self.inner.registry.read(), poisoned)?;
            if let Some(sender) = registry.publishers.get(key).and_then(|p| p.sender.upgrade()) {
                return Ok(sender);
            }
        }

        let mut registry = handle_rwlock_write(self.inner.registry.write(), poisoned)?;
        // Another caller may have won the race between the two locks
        if let Some(sender) = registry.publishers.get(key).and_then(|p| p.sender.upgrade()) {
            return Ok(sender);
        }

        let (sender, receiver) = mpsc::channel(self.inner.publisher_capacity);
        let generation = registry.next_generation();
        registry.publishers.insert(
            key.to_string(),
            PublisherEntry {
                sender: sender.downgrade(),
                generation,
            },
        );
        self.inner.open_publishers.send_replace(registry.publishers.len());
        drop(registry);

        log::debug!("Progress publisher '{}' created (generation {})", key, generation);
        tokio::spawn(self.clone().forward(key.to_string(), generation, receiver));
        Ok(sender)
    }

    /// Subscription for `key`; use [`WILDCARD_KEY`] to observe every publisher
    pub fn get_subscriber(&self, key: &str) -> HubResult<ProgressSubscriber> {
        {
            let registry = handle_rwlock_read(self.inner.registry.read(), poisoned)?;
            if let Some(subscription) = registry
                .subscribers
                .get(key)
                .and_then(|entry| entry.subscription.upgrade())
            {
                return Ok(ProgressSubscriber { subscription });
            }
        }

        let mut registry = handle_rwlock_write(self.inner.registry.write(), poisoned)?;
        if let Some(subscription) = registry
            .subscribers
            .get(key)
            .and_then(|entry| entry.subscription.upgrade())
        {
            return Ok(ProgressSubscriber { subscription });
        }

        let (sender, receiver) = mpsc::channel(self.inner.subscriber_capacity);
        let generation = registry.next_generation();
        let subscription = Arc::new(Subscription {
            key: key.to_string(),
            generation,
            receiver: Mutex::new(receiver),
            hub: Arc::downgrade(&self.inner),
        });
        // Replaces an entry whose last handle is mid-drop
        registry.subscribers.insert(
            key.to_string(),
            SubscriberEntry {
                sender,
                subscription: Arc::downgrade(&subscription),
                generation,
            },
        );
        log::debug!("Progress subscriber '{}' created", key);
        Ok(ProgressSubscriber { subscription })
    }

    /// Drop the subscriber entry for `key`
    ///
    /// The subscription ends once any in-flight delivery finishes and the
    /// buffered snapshots are read. Returns whether an entry existed.
    pub fn remove_subscriber(&self, key: &str) -> HubResult<bool> {
        let mut registry = handle_rwlock_write(self.inner.registry.write(), poisoned)?;
        Ok(registry.subscribers.remove(key).is_some())
    }

    pub fn publisher_count(&self) -> HubResult<usize> {
        let registry = handle_rwlock_read(self.inner.registry.read(), poisoned)?;
        Ok(registry.publishers.len())
    }

    pub fn subscriber_count(&self) -> HubResult<usize> {
        let registry = handle_rwlock_read(self.inner.registry.read(), poisoned)?;
        Ok(registry.subscribers.len())
    }

    pub fn has_subscriber(&self, key: &str) -> HubResult<bool> {
        let registry = handle_rwlock_read(self.inner.registry.read(), poisoned)?;
        Ok(registry.subscribers.contains_key(key))
    }

    /// Resolve once no publisher is open
    ///
    /// Every snapshot published before that point has been handed to its
    /// subscribers (or dropped for lack of one).
    pub async fn publishers_closed(&self) {
        let mut open = self.inner.open_publishers.subscribe();
        // The hub owns the sender, so the watch cannot close while `self` lives
        let _ = open.wait_for(|count| *count == 0).await;
    }

    fn subscriber_sender(&self, key: &str) -> HubResult<Option<Sender<Progress>>> {
        let registry = handle_rwlock_read(self.inner.registry.read(), poisoned)?;
        Ok(registry.subscribers.get(key).map(|entry| entry.sender.clone()))
    }

    async fn forward(self, key: String, generation: u64, mut receiver: Receiver<Progress>) {
        let mut forwarded = 0u64;
        while let Some(progress) = receiver.recv().await {
            let mut targets = Vec::with_capacity(2);
            match self.subscriber_sender(&key) {
                Ok(Some(sender)) => targets.push(sender),
                Ok(None) => {}
                Err(e) => {
                    log::error!("Progress publisher '{}' stopping: {}", key, e);
                    break;
                }
            }
            if key != WILDCARD_KEY {
                if let Ok(Some(sender)) = self.subscriber_sender(WILDCARD_KEY) {
                    targets.push(sender);
                }
            }

            for target in targets {
                // Fails once the subscription's last handle has dropped
                let _ = target.send(progress.clone()).await;
            }
            forwarded += 1;
        }

        log::debug!(
            "Progress publisher '{}' closed after {} snapshots",
            key,
            forwarded
        );
        self.release(&key, generation);
    }

    fn release(&self, key: &str, generation: u64) {
        let mut registry = match handle_rwlock_write(self.inner.registry.write(), poisoned) {
            Ok(registry) => registry,
            Err(e) => {
                log::error!("Cannot release progress publisher '{}': {}", key, e);
                return;
            }
        };
        // A newer publisher for the same key owns both entries now
        if registry
            .publishers
            .get(key)
            .is_some_and(|entry| entry.generation != generation)
        {
            return;
        }
        registry.publishers.remove(key);
        if key != WILDCARD_KEY {
            registry.subscribers.remove(key);
        }
        self.inner.open_publishers.send_replace(registry.publishers.len());
    }
}
