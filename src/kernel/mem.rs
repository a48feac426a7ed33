mod address_space;
mod config;
mod error;
mod page_alloc;
mod page_meta;
mod page_table;
mod replacement;
mod residency;
mod swap;

pub use address_space::{AddressSpace, FaultKind};
pub use config::PagingConfig;
pub use error::VmError;
pub use page_alloc::FramePool;
pub use page_meta::{PageMetadata, PageMetadataTable, PageState};
pub use page_table::{PagingModeSv39, UserPageTable, MAX_USER_VA, PTE64};
pub use replacement::{AccessedBits, ReplacementPolicy};
pub use residency::ResidencyQueue;
pub use swap::{MemSwapDevice, SwapDevice, SwapFile, SwapSlot, SwapStore};
