//! 流水线 → 显示线程的有界队列

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

use crate::frame_pipeline::cancel::CancelToken;

/// How long a blocked push waits before re-checking the cancel token.
pub const PUSH_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
pub enum PushOutcome<T> {
    Delivered,
    /// The run is cancelled; the item comes back undelivered.
    Cancelled(T),
    /// The consumer is gone; the item comes back undelivered.
    Disconnected(T),
}

#[derive(Debug)]
pub enum Popped<T> {
    Item(T),
    Empty,
    /// Every sender is gone and nothing is left.
    Closed,
}

/// Create a queue holding at most `capacity` items.
pub fn handoff_queue<T>(capacity: usize) -> (HandoffSender<T>, HandoffQueue<T>) {
    let (sender, receiver) = bounded(capacity);
    (HandoffSender { sender }, HandoffQueue { receiver, capacity })
}

#[derive(Debug)]
pub struct HandoffSender<T> {
    sender: Sender<T>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Nothing is delivered once `cancel` is set. Otherwise a non-blocking
    /// push first; when full, waits for room in short slices so a
    /// cancellation is still noticed.
    pub fn push(&self, item: T, cancel: &CancelToken) -> PushOutcome<T> {
        if cancel.is_cancelled() {
            return PushOutcome::Cancelled(item);
        }
        let mut item = match self.sender.try_send(item) {
            Ok(()) => return PushOutcome::Delivered,
            Err(TrySendError::Full(item)) => item,
            Err(TrySendError::Disconnected(item)) => return PushOutcome::Disconnected(item),
        };

        loop {
            if cancel.is_cancelled() {
                return PushOutcome::Cancelled(item);
            }
            match self.sender.send_timeout(item, PUSH_POLL_INTERVAL) {
                Ok(()) => return PushOutcome::Delivered,
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(back)) => {
                    return PushOutcome::Disconnected(back)
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct HandoffQueue<T> {
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> HandoffQueue<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Popped<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Popped::Item(item),
            Err(RecvTimeoutError::Timeout) => Popped::Empty,
            Err(RecvTimeoutError::Disconnected) => Popped::Closed,
        }
    }

    /// Hands every queued item to `discard`, returns how many there were.
    pub fn drain_with<F: FnMut(T)>(&self, mut discard: F) -> usize {
        let mut count = 0;
        while let Some(item) = self.try_pop() {
            discard(item);
            count += 1;
        }
        count
    }

    pub fn drain(&self) -> usize {
        self.drain_with(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_never_exceeds_capacity_and_keeps_order() {
        let (sender, queue) = handoff_queue::<u32>(2);
        let cancel = CancelToken::new();

        let producer = thread::spawn(move || {
            for i in 0..20 {
                assert!(matches!(sender.push(i, &cancel), PushOutcome::Delivered));
            }
        });

        let mut received = Vec::new();
        loop {
            assert!(queue.len() <= queue.capacity());
            match queue.pop_timeout(Duration::from_millis(50)) {
                Popped::Item(item) => {
                    received.push(item);
                    thread::sleep(Duration::from_millis(1));
                }
                Popped::Empty => {}
                Popped::Closed => break,
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_returns_item_on_cancel() {
        let (sender, queue) = handoff_queue::<u32>(2);
        let cancel = CancelToken::new();
        sender.push(1, &cancel);
        sender.push(2, &cancel);
        assert_eq!(queue.len(), 2);

        let canceller = cancel.clone();
        let waiter = thread::spawn(move || sender.push(3, &cancel));
        thread::sleep(Duration::from_millis(20));
        canceller.cancel();

        match waiter.join().unwrap() {
            PushOutcome::Cancelled(item) => assert_eq!(item, 3),
            other => panic!("expected a cancelled push, got {:?}", other),
        }
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_without_consumer_returns_item() {
        let (sender, queue) = handoff_queue::<u32>(2);
        drop(queue);
        assert!(matches!(
            sender.push(1, &CancelToken::new()),
            PushOutcome::Disconnected(1)
        ));
    }

    #[test]
    fn test_nothing_delivered_after_cancel() {
        let (sender, queue) = handoff_queue::<u32>(2);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(sender.push(1, &cancel), PushOutcome::Cancelled(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_frees_everything() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (sender, queue) = handoff_queue(2);
        let cancel = CancelToken::new();
        sender.push(DropCounter(drops.clone()), &cancel);
        sender.push(DropCounter(drops.clone()), &cancel);

        assert_eq!(queue.drain(), 2);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closed_after_sender_dropped() {
        let (sender, queue) = handoff_queue::<u32>(2);
        sender.push(7, &CancelToken::new());
        drop(sender);

        assert!(matches!(queue.pop_timeout(Duration::from_millis(1)), Popped::Item(7)));
        assert!(matches!(queue.pop_timeout(Duration::from_millis(1)), Popped::Closed));
    }
}
