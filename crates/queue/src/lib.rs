//! Bounded FIFO hand-off between pipeline stages.
//!
//! Producers await on [`BoundedQueue::push`] when the queue is full and
//! consumers await on [`BoundedQueue::pop`] when it is empty; that blocking is
//! the pipeline's backpressure. Any number of workers may produce and consume
//! concurrently. Closing the queue wakes everyone: pending pops drain what is
//! left and then see `None`, pending pushes fail.

use async_channel::{Receiver, Sender, TrySendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Enqueue, waiting while the queue is at capacity.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    /// Enqueue without waiting. `Err(Some(item))` hands the item back when the
    /// queue is full; `Err(None)` means the queue is closed.
    pub fn try_push(&self, item: T) -> Result<(), Option<T>> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => Err(Some(item)),
            Err(TrySendError::Closed(_)) => Err(None),
        }
    }

    /// Dequeue, waiting while the queue is empty. Returns `None` once the
    /// queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    /// Close the queue. Items already enqueued remain poppable.
    pub fn close(&self) {
        self.rx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let q = BoundedQueue::new(4);
        q.push(1).await.unwrap();
        q.push(2).await.unwrap();
        q.push(3).await.unwrap();
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, Some(2));
        assert_eq!(q.pop().await, Some(3));
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let q = BoundedQueue::new(1);
        q.push("a").await.unwrap();
        assert_eq!(q.try_push("b"), Err(Some("b")));
        assert_eq!(q.pop().await, Some("a"));
        assert_eq!(q.try_push("b"), Ok(()));
    }

    #[tokio::test]
    async fn blocked_producer_resumes_after_pop() {
        let q = BoundedQueue::new(1);
        q.push(1u32).await.unwrap();

        let producer = {
            let q = q.clone();
            tokio::spawn(async move { q.push(2).await })
        };
        // The producer cannot complete until a slot frees up.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(q.pop().await, Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(q.pop().await, Some(2));
    }

    #[tokio::test]
    async fn multiple_consumers_share_items() {
        let q = BoundedQueue::new(8);
        for i in 0..8u32 {
            q.push(i).await.unwrap();
        }
        let a = {
            let q = q.clone();
            tokio::spawn(async move {
                let mut got = vec![];
                while let Some(v) = q.pop().await {
                    got.push(v);
                }
                got
            })
        };
        let b = {
            let q = q.clone();
            tokio::spawn(async move {
                let mut got = vec![];
                while let Some(v) = q.pop().await {
                    got.push(v);
                }
                got
            })
        };
        q.close();
        let mut all = a.await.unwrap();
        all.extend(b.await.unwrap());
        all.sort_unstable();
        assert_eq!(all, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let q = BoundedQueue::new(4);
        q.push(1).await.unwrap();
        q.close();
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, None);
        assert_eq!(q.push(2).await, Err(QueueClosed));
    }
}
