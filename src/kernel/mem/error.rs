use core::fmt;

use eonix_mm::page_table::PageTableError;
use posix_types::result::PosixError;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The frame allocator is exhausted.
    OutOfMemory,
    /// Resident plus swapped pages already fill the budget.
    OutOfQuota,
    /// Every slot of the swap store is taken.
    NoSwapSpace,
    /// The swap device failed to transfer a page.
    Io,
    /// A user copy touched a page that is neither resident nor paged out.
    BadAddress,
    InvalidArgument,
    TranslationUnavailable,
    AlreadyMapped,
    CorruptMapping,
    /// Eviction was requested with no resident page to evict.
    NoVictim,
    /// The resident limit is reached and the policy doesn't evict.
    PagingDisabled,
}

impl VmError {
    /// Fatal errors are reported on the console when they happen.
    ///
    /// All but `PagingDisabled` mean that the kernel structures are
    /// inconsistent.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::AlreadyMapped | Self::CorruptMapping | Self::NoVictim | Self::PagingDisabled
        )
    }

    pub fn errno(self) -> PosixError {
        match self {
            Self::OutOfMemory | Self::OutOfQuota | Self::PagingDisabled => PosixError::ENOMEM,
            Self::NoSwapSpace => PosixError::ENOSPC,
            Self::Io => PosixError::EIO,
            Self::InvalidArgument => PosixError::EINVAL,
            Self::AlreadyMapped => PosixError::EEXIST,
            Self::BadAddress
            | Self::TranslationUnavailable
            | Self::CorruptMapping
            | Self::NoVictim => PosixError::EFAULT,
        }
    }

    /// Print a diagnostic for fatal errors and hand the error back.
    pub(super) fn report(self) -> Self {
        if self.is_fatal() {
            println_fatal!("{}", self);
        }
        self
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::OutOfMemory => "out of physical frames",
            Self::OutOfQuota => "page budget exhausted",
            Self::NoSwapSpace => "no free swap slot",
            Self::Io => "swap i/o failed",
            Self::BadAddress => "bad user address",
            Self::InvalidArgument => "invalid argument",
            Self::TranslationUnavailable => "translation unavailable",
            Self::AlreadyMapped => "remapping a mapped page",
            Self::CorruptMapping => "corrupted page table entry",
            Self::NoVictim => "no resident page to evict",
            Self::PagingDisabled => "resident limit reached with paging disabled",
        };

        f.write_str(message)
    }
}

impl From<PageTableError> for VmError {
    fn from(err: PageTableError) -> Self {
        match err {
            PageTableError::TranslationUnavailable => Self::TranslationUnavailable,
            PageTableError::AlreadyMapped => Self::AlreadyMapped,
            PageTableError::CorruptMapping => Self::CorruptMapping,
            PageTableError::OutOfMemory => Self::OutOfMemory,
        }
    }
}

impl From<VmError> for PosixError {
    fn from(err: VmError) -> Self {
        err.errno()
    }
}

impl From<VmError> for u32 {
    fn from(err: VmError) -> Self {
        err.errno().into()
    }
}
