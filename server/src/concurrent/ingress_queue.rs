// world_server/server/src/concurrent/ingress_queue.rs
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Multi-producer, single-consumer FIFO feeding one actor loop.
///
/// Pushes wake the consumer through a `Notify`, which holds at most one stored
/// permit, so a burst of pushes collapses into a single wake-up and the
/// consumer is expected to `drain` everything queued.
pub struct IngressQueue<T> {
    queue: SegQueue<T>,
    len: AtomicUsize,
    capacity: usize,
    wake: Notify,
}

impl<T> IngressQueue<T> {
    pub fn new(capacity: usize) -> Self {
        IngressQueue {
            queue: SegQueue::new(),
            len: AtomicUsize::new(0),
            capacity,
            wake: Notify::new(),
        }
    }

    /// Appends `item`, handing it back when the queue is at capacity.
    pub fn push(&self, item: T) -> Result<(), T> {
        if self.len.fetch_add(1, Ordering::AcqRel) >= self.capacity {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return Err(item);
        }
        self.queue.push(item);
        self.wake.notify_one();
        Ok(())
    }

    /// Removes everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let mut batch = Vec::with_capacity(self.len());
        while let Some(item) = self.queue.pop() {
            self.len.fetch_sub(1, Ordering::AcqRel);
            batch.push(item);
        }
        batch
    }

    /// Resolves once at least one push happened since the last wake-up.
    pub async fn notified(&self) {
        self.wake.notified().await
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
