//! The broker-agnostic queue adapter trait (§4.5, §9).
//!
//! The crate ships one implementation, an in-process channel adapter
//! suitable for tests and single-process deployments. Real brokers (Kafka,
//! SQS, Service Bus) plug in against the same trait without dispatcher
//! changes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::QueueMessage;

#[async_trait]
pub trait QueueAdapter: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Blocks until a message is available, or returns `None` once the
    /// underlying channel is closed and drained.
    async fn receive(&self) -> Option<QueueMessage>;

    async fn complete(&self, msg: &QueueMessage) -> anyhow::Result<()>;
    async fn abandon(&self, msg: &QueueMessage) -> anyhow::Result<()>;
}

/// An in-process, channel-backed adapter. `send` is the producer half used by
/// tests and by any in-process code that wants to enqueue work without a
/// real broker; `complete`/`abandon` are no-ops since there is no broker
/// acknowledgement to perform.
pub struct ChannelQueueAdapter {
    receiver: tokio::sync::Mutex<mpsc::Receiver<QueueMessage>>,
}

impl ChannelQueueAdapter {
    /// Builds a connected pair: the adapter, and a sender producers use to
    /// push messages into it.
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<QueueMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                receiver: tokio::sync::Mutex::new(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl QueueAdapter for ChannelQueueAdapter {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn receive(&self) -> Option<QueueMessage> {
        self.receiver.lock().await.recv().await
    }

    async fn complete(&self, _msg: &QueueMessage) -> anyhow::Result<()> {
        Ok(())
    }

    async fn abandon(&self, _msg: &QueueMessage) -> anyhow::Result<()> {
        Ok(())
    }
}
