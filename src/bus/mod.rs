//! In-process topic queue.
//!
//! Each topic owns one bounded FIFO buffer created lazily on first publish or
//! subscribe. Delivery is at-most-once to a single consumer: every
//! [`Subscription`] on a topic drains the same buffer, so a second subscriber
//! splits traffic instead of receiving a copy. Nothing survives a restart.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::BusError;

/// Carries "booking ready to match" signals.
pub const TOPIC_DRIVER_MATCHING: &str = "DRIVER_MATCHING";

struct Topic {
    sender: mpsc::Sender<Value>,
    receiver: Arc<Mutex<mpsc::Receiver<Value>>>,
}

pub struct EventBus {
    topics: DashMap<String, Topic>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueues `message` on `topic`, waiting for space while the buffer is full.
    ///
    /// Returns [`BusError::Cancelled`] if `cancel` fires before the message is
    /// accepted; the message is then dropped.
    pub async fn publish(
        &self,
        topic: &str,
        message: Value,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        let sender = self.sender(topic);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BusError::Cancelled {
                topic: topic.to_string(),
            }),
            // The topic keeps its receiver alive, so the channel never closes.
            sent = sender.send(message) => sent.map_err(|_| BusError::Cancelled {
                topic: topic.to_string(),
            }),
        }
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| self.new_topic())
            .receiver
            .clone();

        Subscription {
            topic: topic.to_string(),
            receiver,
        }
    }

    /// Messages currently buffered on `topic`.
    pub fn depth(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|t| t.sender.max_capacity() - t.sender.capacity())
            .unwrap_or(0)
    }

    fn sender(&self, topic: &str) -> mpsc::Sender<Value> {
        if let Some(existing) = self.topics.get(topic) {
            return existing.sender.clone();
        }

        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| self.new_topic())
            .sender
            .clone()
    }

    fn new_topic(&self) -> Topic {
        let (sender, receiver) = mpsc::channel(self.capacity);
        Topic {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

/// Read handle onto a topic's buffer.
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    receiver: Arc<Mutex<mpsc::Receiver<Value>>>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next message. Cancel-safe.
    pub async fn recv(&self) -> Option<Value> {
        self.receiver.lock().await.recv().await
    }
}
