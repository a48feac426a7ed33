use super::addr::{Addr, AddrOps as _};
use crate::paging::PAGE_SIZE;
use core::fmt;

/// A range of addresses.
///
/// The range is defined by two addresses, `start` and `end` and is inclusive
/// on the start and exclusive on the end.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AddrRange<A: Addr> {
    start: A,
    end: A,
}

impl<A: Addr> From<A> for AddrRange<A> {
    fn from(addr: A) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }
}

impl<A: Addr> AddrRange<A> {
    /// Creates a new `AddrRange` with the given start and end addresses.
    ///
    /// # Panics
    /// Panics if the start address is greater than the end address.
    pub fn new(start: A, end: A) -> Self {
        assert!(start <= end);
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Extend the end of the range by `count` bytes.
    pub fn grow(&self, count: usize) -> Self {
        Self::new(self.start, self.end + count)
    }

    /// Iterate over the start addresses of every page touched by the range.
    pub fn pages(&self) -> PageIter<A> {
        let first = self.start.floor();
        let count = if self.is_empty() {
            0
        } else {
            (self.end.ceil() - first) / PAGE_SIZE
        };

        PageIter {
            first,
            front: 0,
            back: count,
        }
    }
}

pub struct PageIter<A> {
    first: A,
    front: usize,
    back: usize,
}

impl<A: Addr> Iterator for PageIter<A> {
    type Item = A;

    fn next(&mut self) -> Option<A> {
        if self.front == self.back {
            return None;
        }

        let addr = self.first + self.front * PAGE_SIZE;
        self.front += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl<A: Addr> DoubleEndedIterator for PageIter<A> {
    fn next_back(&mut self) -> Option<A> {
        if self.front == self.back {
            return None;
        }

        self.back -= 1;
        Some(self.first + self.back * PAGE_SIZE)
    }
}

impl<A: Addr + fmt::Debug> fmt::Debug for AddrRange<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}, {:?})", self.start, self.end)
    }
}
