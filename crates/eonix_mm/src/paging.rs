mod page;
mod page_alloc;
mod pfn;

pub use page::{PageAccess, PageBlock, PAGE_SIZE, PAGE_SIZE_BITS};
pub use page_alloc::FrameAlloc;
pub use pfn::PFN;
