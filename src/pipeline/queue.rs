//! Bounded drop-oldest frame buffer

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::capture::Frame;

/// Fixed-capacity FIFO of frames. Pushing into a full queue overwrites the
/// oldest entry and hands it back to the caller.
pub struct FrameQueue {
    ring: HeapRb<Frame>,
}

impl FrameQueue {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
        }
    }

    /// Append at the tail, returning the evicted head when the queue was full.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        self.ring.push_overwrite(frame)
    }

    /// Remove and return the oldest frame.
    pub fn pop(&mut self) -> Option<Frame> {
        self.ring.try_pop()
    }

    /// Remove the frame with `id`, keeping the order of the others.
    pub fn remove(&mut self, id: u64) -> Option<Frame> {
        if !self.contains(id) {
            return None;
        }

        // Rotate once through the ring; capacity is small so this stays cheap
        let mut removed = None;
        for _ in 0..self.ring.occupied_len() {
            let Some(frame) = self.ring.try_pop() else {
                break;
            };
            if removed.is_none() && frame.id() == id {
                removed = Some(frame);
            } else {
                // A slot was just freed, nothing gets overwritten
                self.ring.push_overwrite(frame);
            }
        }
        removed
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ring.iter().any(|frame| frame.id() == id)
    }

    pub fn ids(&self) -> Vec<u64> {
        self.ring.iter().map(Frame::id).collect()
    }

    /// Drop every frame, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        Consumer::clear(&mut self.ring)
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{EncodedImage, TransferEncoding};
    use bytes::Bytes;
    use tokio::time::Instant;

    fn frame(id: u64) -> Frame {
        let image = EncodedImage {
            data: Bytes::new(),
            width: 1,
            height: 1,
            encoding: TransferEncoding::Raw,
        };
        Frame::new(id, 0, image, None, Instant::now())
    }

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut queue = FrameQueue::new(3);
        for id in 0..3 {
            assert!(queue.push(frame(id)).is_none());
        }

        let evicted = queue.push(frame(3)).expect("head should be evicted");
        assert_eq!(evicted.id(), 0);
        assert_eq!(queue.ids(), vec![1, 2, 3]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut queue = FrameQueue::new(4);
        for id in 0..50 {
            queue.push(frame(id));
            assert!(queue.len() <= queue.capacity());
        }
        assert_eq!(queue.ids(), vec![46, 47, 48, 49]);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut queue = FrameQueue::new(5);
        for id in 0..5 {
            queue.push(frame(id));
        }

        assert_eq!(queue.remove(2).map(|f| f.id()), Some(2));
        assert_eq!(queue.ids(), vec![0, 1, 3, 4]);
        assert!(queue.remove(2).is_none());
        assert_eq!(queue.ids(), vec![0, 1, 3, 4]);

        assert_eq!(queue.pop().map(|f| f.id()), Some(0));
        assert_eq!(queue.ids(), vec![1, 3, 4]);
    }

    #[test]
    fn test_clear() {
        let mut queue = FrameQueue::new(2);
        queue.push(frame(0));
        queue.push(frame(1));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut queue = FrameQueue::new(0);
        queue.push(frame(0));
        queue.push(frame(1));
        assert_eq!(queue.ids(), vec![1]);
    }
}
