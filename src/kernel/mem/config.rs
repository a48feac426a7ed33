use super::{ReplacementPolicy, VmError};
use crate::prelude::*;

/// Paging parameters of an address space, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    pub policy: ReplacementPolicy,
    /// Maximum number of resident plus swapped pages.
    pub total_budget: usize,
    /// Maximum number of resident pages. Reaching it triggers eviction.
    pub resident_threshold: usize,
    /// Number of page sized slots in the swap store.
    pub swap_slots: usize,
    /// Timer ticks between two aging passes.
    pub aging_interval: usize,
    /// Map pages without budget, metadata or eviction.
    pub unmanaged: bool,
}

impl PagingConfig {
    pub const MAX_TOTAL_PAGES: usize = 32;
    pub const MAX_RESIDENT_PAGES: usize = 16;
    pub const MAX_SWAP_SLOTS: usize = 16;
    /// Processes with a pid up to this one (init and the first shell) are
    /// never paged.
    pub const BOOTSTRAP_PIDS: usize = 2;

    pub const fn new(policy: ReplacementPolicy) -> Self {
        Self {
            policy,
            total_budget: Self::MAX_TOTAL_PAGES,
            resident_threshold: Self::MAX_RESIDENT_PAGES,
            swap_slots: Self::MAX_SWAP_SLOTS,
            aging_interval: 1,
            unmanaged: false,
        }
    }

    /// The configuration for the process `pid`.
    pub const fn for_pid(pid: usize, policy: ReplacementPolicy) -> Self {
        Self {
            unmanaged: pid <= Self::BOOTSTRAP_PIDS,
            ..Self::new(policy)
        }
    }

    pub fn validate(&self) -> KResult<()> {
        if self.resident_threshold == 0 || self.resident_threshold > self.total_budget {
            return Err(VmError::InvalidArgument);
        }

        if self.aging_interval == 0 {
            return Err(VmError::InvalidArgument);
        }

        Ok(())
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self::new(ReplacementPolicy::default())
    }
}
