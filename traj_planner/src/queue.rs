//! Bounded segment FIFO.
//!
//! A thin layer over `heapless::Deque`: fixed capacity chosen at
//! construction, no allocation, random access by index from the head, and
//! a split mutable borrow of the first two entries for the executor's
//! head/successor work.

use heapless::Deque;

use crate::error::TpError;
use crate::segment::Segment;

/// Fixed-capacity segment queue.
pub struct SegmentQueue<const N: usize> {
    inner: Deque<Segment, N>,
}

impl<const N: usize> Default for SegmentQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SegmentQueue<N> {
    pub const fn new() -> Self {
        Self { inner: Deque::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// Append a segment at the tail.
    pub fn push(&mut self, seg: Segment) -> Result<(), TpError> {
        self.inner.push_back(seg).map_err(|_| TpError::QueueFull)
    }

    /// Remove and return the head segment.
    pub fn pop_front(&mut self) -> Option<Segment> {
        self.inner.pop_front()
    }

    /// Remove and return the tail segment.
    pub fn pop_back(&mut self) -> Option<Segment> {
        self.inner.pop_back()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Segment at `index`, counted from the head.
    pub fn item(&self, index: usize) -> Option<&Segment> {
        let (front, back) = self.inner.as_slices();
        if index < front.len() {
            front.get(index)
        } else {
            back.get(index - front.len())
        }
    }

    /// Mutable segment at `index`, counted from the head.
    pub fn item_mut(&mut self, index: usize) -> Option<&mut Segment> {
        let (front, back) = self.inner.as_mut_slices();
        let front_len = front.len();
        if index < front_len {
            front.get_mut(index)
        } else {
            back.get_mut(index - front_len)
        }
    }

    /// The most recently queued segment.
    pub fn last(&self) -> Option<&Segment> {
        self.inner.back()
    }

    /// Mutable reference to the most recently queued segment.
    pub fn last_mut(&mut self) -> Option<&mut Segment> {
        self.inner.back_mut()
    }

    /// Simultaneous mutable borrows of the head segment and its successor.
    pub fn first_two_mut(&mut self) -> (Option<&mut Segment>, Option<&mut Segment>) {
        let (front, back) = self.inner.as_mut_slices();
        match front.split_first_mut() {
            None => (None, None),
            Some((head, rest)) => {
                let second = rest.first_mut().or_else(|| back.first_mut());
                (Some(head), second)
            }
        }
    }
}
