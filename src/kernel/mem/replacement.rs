use eonix_mm::address::VAddr;
use itertools::Itertools as _;

use super::{PageMetadataTable, ResidencyQueue};

const AGE_ACCESSED_BIT: u32 = 1 << 31;

/// Which resident page to give up when the resident budget is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementPolicy {
    /// No demand paging, running into the resident threshold is an error.
    None,
    /// Not frequently used with aging: smallest access history goes first.
    #[default]
    NfuAging,
    /// Least accessed page: fewest set bits in the access history goes first.
    Lapa,
    /// Clock over the residency queue.
    SecondChanceFifo,
}

/// Live view of the hardware accessed bits.
pub trait AccessedBits {
    /// Whether the page at `vaddr` was accessed since the last call. Clears the bit.
    fn test_and_clear_accessed(&mut self, vaddr: VAddr) -> bool;
}

impl ReplacementPolicy {
    pub fn evicts(self) -> bool {
        self != Self::None
    }

    pub fn uses_aging(self) -> bool {
        matches!(self, Self::NfuAging | Self::Lapa)
    }

    /// One aging pass: shift every access history right and record the
    /// accessed bit in the top bit.
    pub fn age(
        self,
        pages: &mut PageMetadataTable,
        queue: &ResidencyQueue,
        bits: &mut impl AccessedBits,
    ) {
        if !self.uses_aging() {
            return;
        }

        for index in queue.iter() {
            let page = pages.get(index);
            let mut age = page.age() >> 1;
            if bits.test_and_clear_accessed(page.vaddr()) {
                age |= AGE_ACCESSED_BIT;
            }

            pages.set_age(index, age);
        }
    }

    /// Record accesses since the last aging pass without decaying the history.
    fn fold_accessed(
        pages: &mut PageMetadataTable,
        queue: &ResidencyQueue,
        bits: &mut impl AccessedBits,
    ) {
        for index in queue.iter() {
            let page = pages.get(index);
            if bits.test_and_clear_accessed(page.vaddr()) {
                let age = page.age() | AGE_ACCESSED_BIT;
                pages.set_age(index, age);
            }
        }
    }

    /// Pick the resident page to evict. The page stays in the queue.
    ///
    /// Returns `None` if the policy never evicts or the queue is empty.
    pub fn select_victim(
        self,
        pages: &mut PageMetadataTable,
        queue: &mut ResidencyQueue,
        bits: &mut impl AccessedBits,
    ) -> Option<usize> {
        if queue.is_empty() {
            return None;
        }

        let position = match self {
            Self::None => return None,
            Self::NfuAging => {
                Self::fold_accessed(pages, queue, bits);
                queue
                    .iter()
                    .position_min_by_key(|&index| pages.get(index).age())
            }
            Self::Lapa => {
                Self::fold_accessed(pages, queue, bits);
                queue.iter().position_min_by_key(|&index| {
                    let age = pages.get(index).age();
                    (age.count_ones(), age)
                })
            }
            Self::SecondChanceFifo => Some(second_chance(pages, queue, bits)),
        };

        position.map(|pos| queue.get(pos))
    }
}

fn second_chance(
    pages: &PageMetadataTable,
    queue: &mut ResidencyQueue,
    bits: &mut impl AccessedBits,
) -> usize {
    let len = queue.len();
    let mut pos = queue.hand() % len;

    // One full round clears every bit, the next candidate can't be accessed.
    for _ in 0..=len {
        let index = queue.get(pos);
        if !bits.test_and_clear_accessed(pages.get(index).vaddr()) {
            queue.set_hand(pos);
            return pos;
        }

        pos = (pos + 1) % len;
    }

    unreachable!("Accessed bits should have been cleared by the first round")
}
