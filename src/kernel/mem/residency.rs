use crate::prelude::*;

/// Admission ordered ring of the metadata indices of resident pages.
///
/// The capacity is the resident threshold. Membership is tracked per index
/// so `contains()` doesn't scan the ring. The clock hand used by the second
/// chance policy is a position in admission order and stays on the same page
/// when pages in front of it leave the queue.
#[derive(Clone)]
pub struct ResidencyQueue {
    ring: Box<[usize]>,
    head: usize,
    len: usize,
    hand: usize,
    members: Box<[bool]>,
}

impl ResidencyQueue {
    /// A queue of `capacity` pages for indices below `nr_indices`.
    pub fn new(capacity: usize, nr_indices: usize) -> Self {
        Self {
            ring: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            hand: 0,
            members: vec![false; nr_indices].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members[index]
    }

    fn slot(&self, pos: usize) -> usize {
        (self.head + pos) % self.capacity()
    }

    /// The index at position `pos`, counted from the earliest admission.
    pub fn get(&self, pos: usize) -> usize {
        assert!(pos < self.len, "Queue position {} out of bounds", pos);
        self.ring[self.slot(pos)]
    }

    pub fn push_back(&mut self, index: usize) {
        assert!(self.len < self.capacity(), "Residency queue overflow");
        assert!(!self.members[index], "Index {} queued twice", index);

        let tail = self.slot(self.len);
        self.ring[tail] = index;
        self.members[index] = true;
        self.len += 1;
    }

    /// Remove `index` from the queue, keeping the order of the others.
    ///
    /// Returns whether the index was queued.
    pub fn remove(&mut self, index: usize) -> bool {
        if !self.members[index] {
            return false;
        }

        let pos = (0..self.len)
            .find(|&pos| self.get(pos) == index)
            .expect("Queue members should be in the ring");

        if pos == 0 {
            self.head = self.slot(1);
        } else {
            for pos in pos..self.len - 1 {
                let (to, from) = (self.slot(pos), self.slot(pos + 1));
                self.ring[to] = self.ring[from];
            }
        }

        self.len -= 1;
        self.members[index] = false;
        if pos < self.hand {
            self.hand -= 1;
        }

        true
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).map(|pos| self.get(pos))
    }

    pub fn hand(&self) -> usize {
        self.hand
    }

    pub fn set_hand(&mut self, pos: usize) {
        self.hand = pos;
    }
}
