//! Per-subscriber FIFO queue

use std::collections::VecDeque;

use parking_lot::Mutex;
use publine_types::{ClientId, Error, Item, Result};

/// One subscriber's private queue against one topic
#[derive(Debug)]
pub struct Subscription {
    subscriber: ClientId,
    topic: String,
    queue: Mutex<VecDeque<Item>>,
}

impl Subscription {
    pub fn new(subscriber: ClientId, topic: impl Into<String>) -> Self {
        Self {
            subscriber,
            topic: topic.into(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn subscriber(&self) -> ClientId {
        self.subscriber
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append to the tail
    pub fn push(&self, item: Item) {
        self.queue.lock().push_back(item);
    }

    /// Remove and return the head
    pub fn pop(&self) -> Result<Item> {
        self.queue
            .lock()
            .pop_front()
            .ok_or_else(|| Error::QueueEmpty(self.topic.clone()))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
