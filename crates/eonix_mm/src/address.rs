mod addr;
mod addr_range;
mod paddr;
mod vaddr;

pub use addr::{Addr, AddrOps};
pub use addr_range::{AddrRange, PageIter};
pub use paddr::PAddr;
pub use vaddr::VAddr;

pub type VRange = AddrRange<VAddr>;
