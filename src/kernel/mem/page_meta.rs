use eonix_mm::address::VAddr;

use super::{ResidencyQueue, SwapSlot};
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Free,
    Resident,
    Swapped,
}

/// Where the data of one user page lives.
#[derive(Debug, Clone)]
pub struct PageMetadata {
    vaddr: VAddr,
    state: PageState,
    swap: Option<SwapSlot>,
    index: usize,
    /// Access history, most recent tick in the top bit.
    age: u32,
}

/// Fixed array of page metadata, one entry per page of the budget.
#[derive(Clone)]
pub struct PageMetadataTable {
    entries: Box<[PageMetadata]>,
    resident: usize,
    swapped: usize,
}

impl PageMetadata {
    const fn free(index: usize) -> Self {
        Self {
            vaddr: VAddr::NULL,
            state: PageState::Free,
            swap: None,
            index,
            age: 0,
        }
    }

    pub fn vaddr(&self) -> VAddr {
        self.vaddr
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn swap_slot(&self) -> Option<&SwapSlot> {
        self.swap.as_ref()
    }
}

impl PageMetadataTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(PageMetadata::free).collect(),
            resident: 0,
            swapped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn resident(&self) -> usize {
        self.resident
    }

    pub fn swapped(&self) -> usize {
        self.swapped
    }

    pub fn in_use(&self) -> usize {
        self.resident + self.swapped
    }

    pub fn get(&self, index: usize) -> &PageMetadata {
        &self.entries[index]
    }

    pub fn set_age(&mut self, index: usize, age: u32) {
        self.entries[index].age = age;
    }

    /// Take the first free entry for a new resident page at `vaddr`.
    pub fn allocate(&mut self, vaddr: VAddr) -> Option<usize> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.state == PageState::Free)?;

        entry.vaddr = vaddr;
        entry.state = PageState::Resident;
        entry.age = 0;
        self.resident += 1;

        Some(entry.index)
    }

    pub fn find_by_address(&self, vaddr: VAddr) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.state != PageState::Free && entry.vaddr == vaddr)
            .map(|entry| entry.index)
    }

    /// The page went out to `slot`.
    pub fn mark_swapped(&mut self, index: usize, slot: SwapSlot) {
        let entry = &mut self.entries[index];
        assert_eq!(entry.state, PageState::Resident, "Swapping out {:?}", entry);

        entry.state = PageState::Swapped;
        entry.swap = Some(slot);
        self.resident -= 1;
        self.swapped += 1;
    }

    /// The page came back, hand out the slot it was read from.
    pub fn mark_resident(&mut self, index: usize) -> SwapSlot {
        let entry = &mut self.entries[index];
        assert_eq!(entry.state, PageState::Swapped, "Swapping in {:?}", entry);

        let slot = entry
            .swap
            .take()
            .expect("Swapped pages should own a swap slot");

        entry.state = PageState::Resident;
        entry.age = 0;
        self.swapped -= 1;
        self.resident += 1;

        slot
    }

    /// Forget about the page, dropping its swap slot and queue membership.
    pub fn reset(&mut self, index: usize, queue: &mut ResidencyQueue) {
        let entry = &mut self.entries[index];
        match entry.state {
            PageState::Free => panic!("Resetting free page metadata {}", index),
            PageState::Resident => self.resident -= 1,
            PageState::Swapped => self.swapped -= 1,
        }

        queue.remove(index);
        *entry = PageMetadata::free(index);
    }
}
