//! Bounded channel that never blocks its producer.
//!
//! When the queue is full, the oldest queued element is evicted to make room for the
//! new one. The producer keeps its own receiver handle for eviction, which is why the
//! queue is backed by a multi-consumer `flume` channel.
use flume::TrySendError;

#[derive(Debug)]
pub struct RingBuffer<T> {
    tx: Option<flume::Sender<T>>,
    evict: flume::Receiver<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` elements (at least one) and the
    /// receiver its consumer reads from.
    pub fn new(capacity: usize) -> (Self, flume::Receiver<T>) {
        let capacity = capacity.max(1);
        let (tx, rx) = flume::bounded(capacity);
        let buffer = Self {
            tx: Some(tx),
            evict: rx.clone(),
            capacity,
            dropped: 0,
        };
        (buffer, rx)
    }

    /// Enqueues `item`, evicting the oldest element if the buffer is full.
    ///
    /// Returns `false` if the buffer has been closed; the item is discarded.
    pub fn push(&mut self, item: T) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        let item = match tx.try_send(item) {
            Ok(()) => return true,
            Err(TrySendError::Full(item)) => item,
            // unreachable while `evict` is alive
            Err(TrySendError::Disconnected(_)) => return false,
        };

        // the consumer may have drained an element in the meantime, either way there is room now
        if self.evict.try_recv().is_ok() {
            self.dropped += 1;
            log::warn!(
                target: "ring buffer",
                "buffer full, dropped oldest element: capacity={}, dropped_total={}",
                self.capacity,
                self.dropped
            );
        }

        match tx.try_send(item) {
            Ok(()) => true,
            Err(err) => {
                log::error!(target: "ring buffer", "failed to enqueue after eviction: {err}");
                false
            }
        }
    }

    /// Closes the buffer. Queued elements remain readable; the consumer observes the
    /// close once they are drained.
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.evict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evict.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_keeps_most_recent() {
        let (mut buffer, rx) = RingBuffer::new(3);
        for i in 1..=4 {
            assert!(buffer.push(i));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 1);

        buffer.close();
        let retained: Vec<i32> = rx.drain().collect();
        assert_eq!(retained, vec![2, 3, 4]);
    }

    #[test]
    fn test_many_overflows() {
        let (mut buffer, rx) = RingBuffer::new(2);
        for i in 0..100 {
            buffer.push(i);
        }

        assert_eq!(buffer.dropped(), 98);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![98, 99]);
    }

    #[test]
    fn test_consumer_draining_avoids_drops() {
        let (mut buffer, rx) = RingBuffer::new(1);
        buffer.push("a");
        assert_eq!(rx.try_recv().unwrap(), "a");
        buffer.push("b");

        assert_eq!(buffer.dropped(), 0);
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let (mut buffer, rx) = RingBuffer::new(0);
        buffer.push(1);
        buffer.push(2);

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(rx.try_recv().unwrap(), 2);
    }

    #[test]
    fn test_close_disconnects_consumer_after_drain() {
        let (mut buffer, rx) = RingBuffer::new(4);
        buffer.push(7);
        buffer.close();

        assert!(buffer.is_closed());
        assert!(!buffer.push(8));
        assert_eq!(rx.recv().unwrap(), 7);
        assert!(matches!(rx.recv(), Err(flume::RecvError::Disconnected)));
    }
}
