mod error;
mod page_table;
mod paging_mode;
mod pte;

pub use error::PageTableError;
pub use page_table::{PageTable, RawPageTable};
pub use paging_mode::{PageTableLevel, PagingMode};
pub use pte::{PageAttribute, PTE};
