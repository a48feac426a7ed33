use super::addr::addr_type;
use crate::paging::{PAGE_SIZE_BITS, PFN};

addr_type!(
    /// A physical address.
    PAddr
);

impl From<PFN> for PAddr {
    fn from(pfn: PFN) -> Self {
        Self(usize::from(pfn) << PAGE_SIZE_BITS)
    }
}
