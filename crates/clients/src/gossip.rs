use std::sync::Arc;

use async_trait::async_trait;
use opseq_primitives::{engine::ExecutionPayloadEnvelope, summary::Summary};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of the queue of payloads waiting to be published.
const GOSSIP_QUEUE_CAPACITY: usize = 16;

/// Error returned by a [`PayloadPublisher`].
pub type PublishError = Box<dyn std::error::Error + Send + Sync>;

/// Publishes a payload to the peer-to-peer network.
#[async_trait]
pub trait PayloadPublisher: Send + Sync + 'static {
    /// Publishes the payload to peers.
    async fn publish(&self, envelope: &ExecutionPayloadEnvelope) -> Result<(), PublishError>;
}

/// A [`PayloadPublisher`] for nodes whose peer-to-peer transport runs out of process.
///
/// Payloads are only logged. They stay observable through [`PayloadGossiper::subscribe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl PayloadPublisher for LogPublisher {
    async fn publish(&self, envelope: &ExecutionPayloadEnvelope) -> Result<(), PublishError> {
        info!(hash = %envelope.block_hash(), number = envelope.block_number(), "New unsafe payload");
        Ok(())
    }
}

/// A background gossiper holding the most recent built-but-not-yet-canonical payload.
///
/// The held payload survives across confirmation attempts so that a retry can skip the
/// retrieval of the payload and the announcement to peers.
pub trait AsyncGossiper: Send + Sync + 'static {
    /// Caches the payload and schedules its publication. Never blocks.
    fn gossip(&self, envelope: ExecutionPayloadEnvelope);

    /// Returns the cached payload, if any.
    fn get(&self) -> Option<ExecutionPayloadEnvelope>;

    /// Clears the cached payload.
    fn clear(&self);
}

impl<G: AsyncGossiper> AsyncGossiper for Arc<G> {
    fn gossip(&self, envelope: ExecutionPayloadEnvelope) {
        (**self).gossip(envelope);
    }

    fn get(&self) -> Option<ExecutionPayloadEnvelope> {
        (**self).get()
    }

    fn clear(&self) {
        (**self).clear();
    }
}

/// The default [`AsyncGossiper`].
///
/// Publication happens on a [`GossipTask`] fed through a bounded queue. The cache is a
/// [`watch`] channel so that other components can observe the pending payload.
#[derive(Debug, Clone)]
pub struct PayloadGossiper {
    cache: Arc<watch::Sender<Option<ExecutionPayloadEnvelope>>>,
    queue: mpsc::Sender<ExecutionPayloadEnvelope>,
}

impl PayloadGossiper {
    /// Creates a new gossiper and the task publishing its payloads with `publisher`.
    ///
    /// The returned task must be spawned for payloads to reach the network.
    pub fn new<P: PayloadPublisher>(publisher: P) -> (Self, GossipTask<P>) {
        let (cache, _) = watch::channel(None);
        let (queue, rx) = mpsc::channel(GOSSIP_QUEUE_CAPACITY);

        (Self { cache: Arc::new(cache), queue }, GossipTask { publisher, rx })
    }

    /// Subscribes to changes of the cached payload.
    pub fn subscribe(&self) -> watch::Receiver<Option<ExecutionPayloadEnvelope>> {
        self.cache.subscribe()
    }
}

impl AsyncGossiper for PayloadGossiper {
    fn gossip(&self, envelope: ExecutionPayloadEnvelope) {
        self.cache.send_replace(Some(envelope.clone()));

        match self.queue.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                warn!(hash = %envelope.block_hash(), "Gossip queue full, payload will not be published");
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                warn!(hash = %envelope.block_hash(), "Gossip task stopped, payload will not be published");
            }
        }
    }

    fn get(&self) -> Option<ExecutionPayloadEnvelope> {
        self.cache.borrow().clone()
    }

    fn clear(&self) {
        self.cache.send_replace(None);
    }
}

/// Publishes the payloads handed to a [`PayloadGossiper`].
#[derive(Debug)]
pub struct GossipTask<P> {
    publisher: P,
    rx: mpsc::Receiver<ExecutionPayloadEnvelope>,
}

impl<P: PayloadPublisher> GossipTask<P> {
    /// Runs until every [`PayloadGossiper`] handle is dropped.
    pub async fn run(mut self) {
        while let Some(envelope) = self.rx.recv().await {
            match self.publisher.publish(&envelope).await {
                Ok(()) => debug!(payload = %envelope.summary(), "Published payload"),
                Err(err) => {
                    warn!(hash = %envelope.block_hash(), %err, "Failed to publish payload")
                }
            }
        }

        debug!("Gossip task stopped");
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use opseq_primitives::test_utils::envelope;

    use super::*;

    struct RecordingPublisher {
        tx: mpsc::UnboundedSender<B256>,
    }

    #[async_trait]
    impl PayloadPublisher for RecordingPublisher {
        async fn publish(&self, envelope: &ExecutionPayloadEnvelope) -> Result<(), PublishError> {
            self.tx.send(envelope.block_hash())?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn gossip_caches_and_publishes() {
        let (tx, mut published) = mpsc::unbounded_channel();
        let (gossiper, task) = PayloadGossiper::new(RecordingPublisher { tx });
        tokio::spawn(task.run());

        let payload = envelope(7);
        gossiper.gossip(payload.clone());

        assert_eq!(gossiper.get(), Some(payload.clone()));
        assert_eq!(published.recv().await, Some(payload.block_hash()));
    }

    #[tokio::test]
    async fn log_publisher_drains_queue() {
        let (gossiper, task) = PayloadGossiper::new(LogPublisher);
        let handle = tokio::spawn(task.run());

        gossiper.gossip(envelope(1));
        gossiper.gossip(envelope(2));
        drop(gossiper);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let (tx, _published) = mpsc::unbounded_channel();
        let (gossiper, _task) = PayloadGossiper::new(RecordingPublisher { tx });

        gossiper.gossip(envelope(1));
        gossiper.clear();
        assert_eq!(gossiper.get(), None);
    }

    #[tokio::test]
    async fn newer_payload_replaces_cached_one() {
        let (tx, _published) = mpsc::unbounded_channel();
        let (gossiper, _task) = PayloadGossiper::new(RecordingPublisher { tx });
        let mut updates = gossiper.subscribe();

        gossiper.gossip(envelope(1));
        gossiper.gossip(envelope(2));

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().as_ref().map(|e| e.block_number()), Some(2));
    }

    #[tokio::test]
    async fn gossip_does_not_block_when_task_is_gone() {
        let (tx, _published) = mpsc::unbounded_channel();
        let (gossiper, task) = PayloadGossiper::new(RecordingPublisher { tx });
        drop(task);

        for n in 0..(GOSSIP_QUEUE_CAPACITY as u64 + 4) {
            gossiper.gossip(envelope(n));
        }
        assert_eq!(gossiper.get().map(|e| e.block_number()), Some(GOSSIP_QUEUE_CAPACITY as u64 + 3));
    }
}
