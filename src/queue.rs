//! Bounded FIFO handing file paths from the directory walker to the entry
//! source.
//!
//! Built on a `crossbeam_channel` bounded channel: [`QueueProducer::push`]
//! blocks while the queue is at capacity and [`QueueConsumer::recv`] blocks
//! until an item arrives or the producer is gone. Dropping the producer is the
//! completion signal, so there is no separately polled "finished" flag.
//!
//! One producer and one consumer are expected. Items arrive in push order and
//! are delivered exactly once.

use crossbeam_channel::{Receiver, RecvError, Sender, bounded};
use thiserror::Error;

/// Capacity of the file queue between walker and entry source.
pub const QUEUE_CAPACITY: usize = 100;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("queue consumer has been dropped")]
pub struct QueueClosed;

/// Create a queue holding at most `capacity` pending items.
pub fn bounded_queue<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (sender, receiver) = bounded(capacity);
    (
        QueueProducer { sender },
        QueueConsumer { receiver, capacity },
    )
}

/// Sending half. Dropping it marks the queue as finished.
#[derive(Debug)]
pub struct QueueProducer<T> {
    sender: Sender<T>,
}

impl<T> QueueProducer<T> {
    /// Enqueue an item, blocking while the queue is full.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.sender.send(item).map_err(|_| QueueClosed)
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct QueueConsumer<T> {
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> QueueConsumer<T> {
    /// Non-blocking pop; `None` when nothing is queued right now.
    pub fn pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Blocking pop; `None` once the producer is gone and the queue drained.
    pub fn recv(&self) -> Option<T> {
        match self.receiver.recv() {
            Ok(item) => Some(item),
            Err(RecvError) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
