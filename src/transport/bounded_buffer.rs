//! Fixed-capacity FIFO with blocking, non-blocking and timed access
//!
//! Hands asynchronous messages (burst acks, underflows, ...) from a packet
//! servicing thread to the application. The "haste" variants never block so
//! the servicing thread can always get back to the hardware.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounded FIFO guarded by one lock and two condition variables
pub struct BoundedBuffer<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
    /// Elements dropped by `push_with_pop_on_full`
    evicted_count: AtomicUsize,
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer holding at most `capacity` elements
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            evicted_count: AtomicUsize::new(0),
        }
    }

    /// Push if there is room. Returns false and leaves the buffer unchanged
    /// when full.
    pub fn push_with_haste(&self, elem: T) -> bool {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(elem);
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    /// Push, evicting the oldest element when full. Never blocks.
    /// Returns false when an element was evicted.
    pub fn push_with_pop_on_full(&self, elem: T) -> bool {
        let mut queue = self.queue.lock();
        let evicted = if queue.len() >= self.capacity {
            queue.pop_front();
            self.evicted_count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };
        queue.push_back(elem);
        drop(queue);
        self.not_empty.notify_one();
        !evicted
    }

    /// Push, blocking until there is room
    pub fn push_with_wait(&self, elem: T) {
        let mut queue = self.queue.lock();
        while queue.len() >= self.capacity {
            self.not_full.wait(&mut queue);
        }
        queue.push_back(elem);
        drop(queue);
        self.not_empty.notify_one();
    }

    /// Push, blocking up to `timeout` for room. Returns false on timeout
    /// without inserting.
    pub fn push_with_timed_wait(&self, elem: T, timeout: Duration) -> bool {
        let deadline = crate::deadline_after(timeout);
        let mut queue = self.queue.lock();
        while queue.len() >= self.capacity {
            if self.not_full.wait_until(&mut queue, deadline).timed_out() && queue.len() >= self.capacity {
                return false;
            }
        }
        queue.push_back(elem);
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    /// Pop the oldest element if any
    pub fn pop_with_haste(&self) -> Option<T> {
        let mut queue = self.queue.lock();
        let elem = queue.pop_front();
        drop(queue);
        if elem.is_some() {
            self.not_full.notify_one();
        }
        elem
    }

    /// Pop, blocking until an element arrives
    pub fn pop_with_wait(&self) -> T {
        let mut queue = self.queue.lock();
        loop {
            if let Some(elem) = queue.pop_front() {
                drop(queue);
                self.not_full.notify_one();
                return elem;
            }
            self.not_empty.wait(&mut queue);
        }
    }

    /// Pop, blocking up to `timeout`
    pub fn pop_with_timed_wait(&self, timeout: Duration) -> Option<T> {
        let deadline = crate::deadline_after(timeout);
        let mut queue = self.queue.lock();
        loop {
            if let Some(elem) = queue.pop_front() {
                drop(queue);
                self.not_full.notify_one();
                return Some(elem);
            }
            if self.not_empty.wait_until(&mut queue, deadline).timed_out() {
                let elem = queue.pop_front();
                drop(queue);
                if elem.is_some() {
                    self.not_full.notify_one();
                }
                return elem;
            }
        }
    }

    /// Drop every queued element
    pub fn clear(&self) {
        self.queue.lock().clear();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.lock().len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements dropped by `push_with_pop_on_full`
    pub fn evicted_count(&self) -> usize {
        self.evicted_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a bounded buffer
pub type SharedBoundedBuffer<T> = Arc<BoundedBuffer<T>>;

/// Create a new shared bounded buffer
pub fn create_shared_buffer<T>(capacity: usize) -> SharedBoundedBuffer<T> {
    Arc::new(BoundedBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let buffer = BoundedBuffer::new(4);
        assert!(buffer.push_with_haste(1));
        assert!(buffer.push_with_haste(2));
        assert!(buffer.push_with_haste(3));
        assert_eq!(buffer.len(), 3);

        assert_eq!(buffer.pop_with_haste(), Some(1));
        assert_eq!(buffer.pop_with_haste(), Some(2));
        assert_eq!(buffer.pop_with_haste(), Some(3));
        assert_eq!(buffer.pop_with_haste(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_with_haste_on_full() {
        let buffer = BoundedBuffer::new(2);
        assert!(buffer.push_with_haste(10));
        assert!(buffer.push_with_haste(11));
        assert!(buffer.is_full());

        assert!(!buffer.push_with_haste(12));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop_with_haste(), Some(10));
        assert_eq!(buffer.pop_with_haste(), Some(11));
    }

    #[test]
    fn test_push_with_pop_on_full_keeps_newest() {
        let capacity = 5;
        let buffer = BoundedBuffer::new(capacity);
        for n in 0..capacity {
            assert!(buffer.push_with_pop_on_full(n));
        }
        assert!(!buffer.push_with_pop_on_full(capacity));
        assert_eq!(buffer.evicted_count(), 1);

        let drained: Vec<usize> = std::iter::from_fn(|| buffer.pop_with_haste()).collect();
        assert_eq!(drained, (1..=capacity).collect::<Vec<_>>());
    }

    #[test]
    fn test_timed_waits_expire() {
        let buffer = BoundedBuffer::new(1);
        let start = Instant::now();
        assert_eq!(buffer.pop_with_timed_wait(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));

        assert!(buffer.push_with_timed_wait(1, Duration::from_millis(30)));
        let start = Instant::now();
        assert!(!buffer.push_with_timed_wait(2, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_unbounded_timeouts_do_not_overflow() {
        let buffer = BoundedBuffer::new(2);
        assert!(buffer.push_with_timed_wait(7, Duration::MAX));
        assert_eq!(buffer.pop_with_timed_wait(Duration::MAX), Some(7));

        let shared = create_shared_buffer(1);
        let producer = {
            let shared = shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                shared.push_with_haste(9)
            })
        };
        assert_eq!(shared.pop_with_timed_wait(Duration::MAX), Some(9));
        assert!(producer.join().unwrap());
    }

    #[test]
    fn test_blocking_handoff() {
        let buffer = create_shared_buffer(1);
        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for n in 0..100u32 {
                    buffer.push_with_wait(n);
                }
            })
        };

        let received: Vec<u32> = (0..100).map(|_| buffer.pop_with_wait()).collect();
        producer.join().unwrap();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_timed_pop_wakes_on_push() {
        let buffer = create_shared_buffer(4);
        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                buffer.push_with_haste("ack");
            })
        };

        assert_eq!(buffer.pop_with_timed_wait(Duration::from_secs(5)), Some("ack"));
        producer.join().unwrap();
    }
}
