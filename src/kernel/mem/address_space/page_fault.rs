use bitflags::bitflags;
use eonix_mm::address::{AddrOps as _, VAddr};
use eonix_mm::page_table::{PageAttribute, PTE};
use posix_types::signal::Signal;

use super::AddressSpace;
use crate::kernel::mem::MAX_USER_VA;
use crate::prelude::*;

bitflags! {
    /// The access that caused a page fault.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultKind: u32 {
        const LOAD = 1 << 0;
        const STORE = 1 << 1;
        const INSTRUCTION_FETCH = 1 << 2;
    }
}

impl FaultKind {
    fn permitted_by(self, attr: PageAttribute) -> bool {
        if !attr.contains(PageAttribute::USER) {
            return false;
        }

        let needed = [
            (Self::LOAD, PageAttribute::READ),
            (Self::STORE, PageAttribute::WRITE),
            (Self::INSTRUCTION_FETCH, PageAttribute::EXECUTE),
        ];

        needed
            .into_iter()
            .all(|(kind, perm)| !self.contains(kind) || attr.contains(perm))
    }
}

impl AddressSpace {
    /// Resolve a user page fault at `vaddr`.
    ///
    /// Faults on paged out pages bring the page back in. Returns the signal
    /// that should terminate the process if the fault can't be resolved.
    ///
    /// # Panics
    /// Panics if a paged out page has no metadata.
    pub fn handle_page_fault(&mut self, vaddr: VAddr, kind: FaultKind) -> Result<(), Signal> {
        println_trace!(
            "trace_paging",
            "pid {}: {:?} fault at {:?}",
            self.pid,
            kind,
            vaddr
        );

        if vaddr >= MAX_USER_VA {
            return Err(Signal::SIGSEGV);
        }

        let page = vaddr.floor();
        let Some(attr) = self.page_table.entry(page).map(|entry| entry.get_attr()) else {
            return Err(Signal::SIGSEGV);
        };

        if attr.is_paged_out() {
            return self.page_in(page).map_err(|err| {
                println_warn!(
                    "pid {}: failed to page in {:?}: {}",
                    self.pid,
                    page,
                    err.report()
                );
                Signal::SIGBUS
            });
        }

        if !attr.is_resident() || !kind.permitted_by(attr) {
            return Err(Signal::SIGSEGV);
        }

        // Another path brought the page in before us.
        Ok(())
    }
}
