#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod kernel;
mod prelude;

pub use kernel::mem::{
    AddressSpace, FaultKind, FramePool, MemSwapDevice, PageState, PagingConfig,
    ReplacementPolicy, SwapDevice, SwapFile, VmError,
};
