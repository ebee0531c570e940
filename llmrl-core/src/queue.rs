//! Bounded, priority-ordered admission queue.
//!
//! Items are ordered by `(priority, arrival_seq)` so that within a
//! priority band, first-in is first-out. Each enqueued item gets its own
//! `oneshot` completion channel, so a caller's `enqueue` future can be
//! raced against its own timeout without any other coordination.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::time::{timeout, timeout_at, Instant};

use llmrl_common::{RateLimitError, Result};

use crate::config::Priority;

struct HeapEntry<Req> {
    priority: Priority,
    arrival_seq: u64,
    id: u64,
    request: Req,
}

impl<Req> PartialEq for HeapEntry<Req> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.arrival_seq == other.arrival_seq
    }
}
impl<Req> Eq for HeapEntry<Req> {}

impl<Req> PartialOrd for HeapEntry<Req> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Req> Ord for HeapEntry<Req> {
    // Reversed so `BinaryHeap` (a max-heap) pops the smallest
    // (priority, arrival_seq) pair first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.arrival_seq.cmp(&self.arrival_seq))
    }
}

/// An item pulled off the queue by a consumer, ready to be dispatched.
pub struct QueueItem<Req> {
    pub id: u64,
    pub priority: Priority,
    pub arrival_seq: u64,
    pub request: Req,
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub size: usize,
    pub capacity: usize,
    pub is_full: bool,
    pub total_enqueued: u64,
    pub by_priority: HashMap<Priority, usize>,
}

/// A bounded priority queue shared between producers calling
/// [`PriorityQueue::enqueue`] and a single consumer loop calling
/// [`PriorityQueue::wait_for_item`] then eventually
/// [`PriorityQueue::complete`] or [`PriorityQueue::fail`].
pub struct PriorityQueue<Req, Out> {
    heap: Mutex<BinaryHeap<HeapEntry<Req>>>,
    completions: Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Out, RateLimitError>>>>,
    notify: Notify,
    capacity: usize,
    counter: AtomicU64,
}

impl<Req, Out> PriorityQueue<Req, Out> {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            completions: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            capacity,
            counter: AtomicU64::new(0),
        }
    }

    /// Admits `request` at `priority` and waits up to `wait_timeout` for
    /// it to be completed or failed by a consumer. Returns
    /// [`RateLimitError::QueueFull`] immediately if the queue is at
    /// capacity, or [`RateLimitError::QueueTimeout`] if nothing drained it
    /// in time.
    pub async fn enqueue(
        &self,
        request: Req,
        priority: Priority,
        wait_timeout: Duration,
    ) -> std::result::Result<Out, RateLimitError> {
        let id = self.counter.fetch_add(1, AtomicOrdering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut heap = self.heap.lock().unwrap();
            if heap.len() >= self.capacity {
                return Err(RateLimitError::QueueFull { capacity: self.capacity });
            }
            heap.push(HeapEntry { priority, arrival_seq: id, id, request });
            self.completions.lock().unwrap().insert(id, tx);
        }
        self.notify.notify_one();

        match timeout(wait_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RateLimitError::QueueTimeout(wait_timeout)),
            Err(_) => {
                self.remove(id);
                Err(RateLimitError::QueueTimeout(wait_timeout))
            }
        }
    }

    /// Pops the highest-priority, earliest-arrived item, if any, without
    /// waiting.
    pub fn dequeue(&self) -> Option<QueueItem<Req>> {
        self.heap.lock().unwrap().pop().map(|entry| QueueItem {
            id: entry.id,
            priority: entry.priority,
            arrival_seq: entry.arrival_seq,
            request: entry.request,
        })
    }

    /// Like [`Self::dequeue`], but waits up to `wait_timeout` for an item
    /// to appear if the queue is currently empty.
    pub async fn wait_for_item(&self, wait_timeout: Duration) -> Option<QueueItem<Req>> {
        let deadline = Instant::now() + wait_timeout;
        loop {
            if let Some(item) = self.dequeue() {
                return Some(item);
            }
            if Instant::now() >= deadline {
                return None;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            if timeout_at(deadline, &mut notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn complete(&self, id: u64, value: Out) {
        if let Some(tx) = self.completions.lock().unwrap().remove(&id) {
            let _ = tx.send(Ok(value));
        }
    }

    pub fn fail(&self, id: u64, error: RateLimitError) {
        if let Some(tx) = self.completions.lock().unwrap().remove(&id) {
            let _ = tx.send(Err(error));
        }
    }

    fn remove(&self, id: u64) {
        let mut heap = self.heap.lock().unwrap();
        let remaining: Vec<_> = std::mem::take(&mut *heap).into_iter().filter(|e| e.id != id).collect();
        *heap = remaining.into_iter().collect();
        drop(heap);
        self.completions.lock().unwrap().remove(&id);
    }

    /// Drops every pending completion without resolving it (producers
    /// waiting in [`Self::enqueue`] see a [`RateLimitError::QueueTimeout`]
    /// once their receiver is dropped) and empties the queue. Returns the
    /// number of items cleared.
    pub fn clear(&self) -> usize {
        let mut heap = self.heap.lock().unwrap();
        let n = heap.len();
        heap.clear();
        self.completions.lock().unwrap().clear();
        n
    }

    pub fn stats(&self) -> QueueStats {
        let heap = self.heap.lock().unwrap();
        let mut by_priority = HashMap::new();
        for entry in heap.iter() {
            *by_priority.entry(entry.priority).or_insert(0) += 1;
        }
        QueueStats {
            size: heap.len(),
            capacity: self.capacity,
            is_full: heap.len() >= self.capacity,
            total_enqueued: self.counter.load(AtomicOrdering::SeqCst),
            by_priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let queue: PriorityQueue<&'static str, ()> = PriorityQueue::new(10);
        let q = std::sync::Arc::new(queue);
        let q1 = q.clone();
        let low = tokio::spawn(async move { q1.enqueue("low", Priority::Bulk, Duration::from_secs(5)).await });
        tokio::task::yield_now().await;
        let q2 = q.clone();
        let high = tokio::spawn(async move { q2.enqueue("high", Priority::Critical, Duration::from_secs(5)).await });
        tokio::task::yield_now().await;

        let first = q.dequeue().unwrap();
        assert_eq!(first.priority, Priority::Critical);
        q.complete(first.id, ());

        let second = q.dequeue().unwrap();
        assert_eq!(second.priority, Priority::Bulk);
        q.complete(second.id, ());

        high.await.unwrap().unwrap();
        low.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_queue_rejects_immediately() {
        let queue: PriorityQueue<(), ()> = PriorityQueue::new(1);
        let q = std::sync::Arc::new(queue);
        let q1 = q.clone();
        let held = tokio::spawn(async move { q1.enqueue((), Priority::Normal, Duration::from_secs(5)).await });
        tokio::task::yield_now().await;

        let err = q.enqueue((), Priority::Normal, Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, RateLimitError::QueueFull { capacity: 1 }));

        let item = q.dequeue().unwrap();
        q.complete(item.id, ());
        held.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn timeout_without_a_consumer() {
        let queue: PriorityQueue<(), ()> = PriorityQueue::new(10);
        let err = queue.enqueue((), Priority::Normal, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, RateLimitError::QueueTimeout(_)));
        assert_eq!(queue.stats().size, 0);
    }

    #[test]
    fn stats_report_counts_by_band() {
        let queue: PriorityQueue<(), ()> = PriorityQueue::new(10);
        queue.heap.lock().unwrap().push(HeapEntry { priority: Priority::High, arrival_seq: 0, id: 0, request: () });
        let stats = queue.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.by_priority.get(&Priority::High), Some(&1));
    }
}
