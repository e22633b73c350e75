// Bounded receive queue - bridges the demodulator worker thread and
// `Modem::recv`. Single producer (the demodulator), any number of
// consumers may call `dequeue`, though in practice the modem only ever
// has one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use log::warn;

use crate::codec::RawMessage;
use crate::error::SofiError;

pub const DEFAULT_CAPACITY: usize = 32;

pub struct RecvQueue {
    capacity: usize,
    messages: Mutex<VecDeque<RawMessage>>,
    not_empty: Condvar,
    cancelled: AtomicBool,
    overflow_count: AtomicU64,
}

impl RecvQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(DEFAULT_CAPACITY);
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            cancelled: AtomicBool::new(false),
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Push a decoded message. Never blocks: if the queue is already at
    /// capacity, the new message is dropped and a warning logged, matching
    /// the original's `recv_queue_enqueue` newest-drop behavior.
    pub fn enqueue(&self, message: RawMessage) {
        let mut guard = self.messages.lock().expect("recv queue mutex poisoned");
        if guard.len() >= self.capacity {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                "receive queue full at capacity {}, dropping newest message",
                self.capacity
            );
            return;
        }
        guard.push_back(message);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Total messages dropped to overflow since this queue was created.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Block until a message is available or the queue is cancelled.
    pub fn dequeue(&self) -> Result<RawMessage, SofiError> {
        let mut guard = self.messages.lock().expect("recv queue mutex poisoned");
        loop {
            if let Some(message) = guard.pop_front() {
                return Ok(message);
            }
            if self.cancelled.load(Ordering::Acquire) {
                return Err(SofiError::Cancelled);
            }
            guard = self
                .not_empty
                .wait(guard)
                .expect("recv queue condvar poisoned");
        }
    }

    /// Wake any blocked `dequeue` call, which will then return
    /// `SofiError::Cancelled`. Idempotent; called from `Modem::destroy`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.not_empty.notify_all();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.lock().expect("recv queue mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn sample_message(tag: u8) -> RawMessage {
        let mut m = RawMessage::empty();
        m.push(tag);
        m
    }

    #[test]
    fn enqueue_then_dequeue_preserves_fifo_order() {
        let queue = RecvQueue::new(4);
        queue.enqueue(sample_message(1));
        queue.enqueue(sample_message(2));
        assert_eq!(queue.dequeue().unwrap(), sample_message(1));
        assert_eq!(queue.dequeue().unwrap(), sample_message(2));
    }

    #[test]
    fn overflow_drops_newest_and_keeps_capacity() {
        let queue = RecvQueue::new(2);
        queue.enqueue(sample_message(1));
        queue.enqueue(sample_message(2));
        queue.enqueue(sample_message(3)); // dropped
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.overflow_count(), 1);
        assert_eq!(queue.dequeue().unwrap(), sample_message(1));
        assert_eq!(queue.dequeue().unwrap(), sample_message(2));
    }

    #[test]
    fn capacity_is_raised_to_the_default_minimum() {
        let queue = RecvQueue::new(1);
        for i in 0..DEFAULT_CAPACITY as u8 {
            queue.enqueue(sample_message(i));
        }
        assert_eq!(queue.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn dequeue_blocks_until_a_message_arrives() {
        let queue = Arc::new(RecvQueue::new(4));
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue())
        };
        thread::sleep(Duration::from_millis(20));
        queue.enqueue(sample_message(9));
        let result = reader.join().unwrap();
        assert_eq!(result.unwrap(), sample_message(9));
    }

    #[test]
    fn cancel_unblocks_a_waiting_dequeue() {
        let queue = Arc::new(RecvQueue::new(4));
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue())
        };
        thread::sleep(Duration::from_millis(20));
        queue.cancel();
        let result = reader.join().unwrap();
        assert_eq!(result, Err(SofiError::Cancelled));
    }

    #[test]
    fn dequeue_after_cancel_with_pending_message_still_drains_it_first() {
        let queue = RecvQueue::new(4);
        queue.enqueue(sample_message(5));
        queue.cancel();
        assert_eq!(queue.dequeue().unwrap(), sample_message(5));
        assert_eq!(queue.dequeue(), Err(SofiError::Cancelled));
    }
}
