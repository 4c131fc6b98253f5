//! Fire-and-forget event delivery.
//!
//! The engine publishes every event exactly once, after the transition
//! that produced it has been persisted. Publish failures are logged by the
//! caller and never undo the transition.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

use crate::{
    errors::{EngineError, EngineResult},
    events::EventEnvelope,
};

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish `event` on `channel`. Must not block on slow consumers.
    async fn publish(&self, channel: &str, event: &EventEnvelope) -> EngineResult<()>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn publish(&self, _channel: &str, _event: &EventEnvelope) -> EngineResult<()> {
        Ok(())
    }
}

/// In-process fan-out over bounded mpsc channels.
///
/// Subscribers that are full or gone are dropped rather than waited on.
pub struct ChannelBroadcaster {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<EventEnvelope>>>>,
    buffer: usize,
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChannelBroadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Receive every event subsequently published on `channel`.
    pub async fn subscribe(&self, channel: &str) -> mpsc::Receiver<EventEnvelope> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .lock()
            .await
            .get(channel)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, channel: &str, event: &EventEnvelope) -> EngineResult<()> {
        let mut subscribers = self.subscribers.lock().await;
        let Some(senders) = subscribers.get_mut(channel) else {
            return Ok(());
        };
        let before = senders.len();
        senders.retain(|tx| tx.try_send(event.clone()).is_ok());
        let dropped = before - senders.len();
        if senders.is_empty() {
            subscribers.remove(channel);
        }
        if dropped > 0 {
            return Err(EngineError::ChannelClosed);
        }
        Ok(())
    }
}
