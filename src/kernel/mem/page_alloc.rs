use core::cell::UnsafeCell;
use core::ptr::NonNull;

use eonix_mm::paging::{FrameAlloc, PageAccess, PageBlock, PFN};
use spin::Mutex;

use crate::prelude::*;

/// Frame number of the first frame of every pool, right above the kernel image.
const POOL_BASE_PFN: usize = 0x80200;

struct FrameArena {
    frames: Box<[UnsafeCell<PageBlock>]>,
    /// `true` for frames that are handed out.
    in_use: Mutex<Box<[bool]>>,
}

// SAFETY: Frame contents are only reached through `PageAccess`, whose callers
//         guarantee exclusive access. The allocation map is locked.
unsafe impl Sync for FrameArena {}

/// A bounded pool of physical frames.
///
/// Frames are numbered from `0x80200` on, as if the pool started at the
/// physical address `0x80200000`. Freed frames are not cleared, so the content
/// of a newly allocated frame is whatever its last user left there.
#[derive(Clone)]
pub struct FramePool(Arc<FrameArena>);

impl FramePool {
    pub fn new(nr_frames: usize) -> Self {
        let frames = (0..nr_frames)
            .map(|_| UnsafeCell::new(PageBlock::zeroed()))
            .collect();

        Self(Arc::new(FrameArena {
            frames,
            in_use: Mutex::new(vec![false; nr_frames].into_boxed_slice()),
        }))
    }

    pub fn total_frames(&self) -> usize {
        self.0.frames.len()
    }

    pub fn free_frames(&self) -> usize {
        self.0.in_use.lock().iter().filter(|&&used| !used).count()
    }

    fn index_of(&self, pfn: PFN) -> Option<usize> {
        let index = usize::from(pfn).checked_sub(POOL_BASE_PFN)?;
        (index < self.total_frames()).then_some(index)
    }
}

impl FrameAlloc for FramePool {
    fn alloc(&self) -> Option<PFN> {
        let mut in_use = self.0.in_use.lock();
        let index = in_use.iter().position(|&used| !used)?;
        in_use[index] = true;

        Some(PFN::from_val(POOL_BASE_PFN + index))
    }

    unsafe fn dealloc(&self, pfn: PFN) {
        let index = self
            .index_of(pfn)
            .unwrap_or_else(|| panic!("Freeing {:?} not owned by the pool", pfn));

        let mut in_use = self.0.in_use.lock();
        assert!(in_use[index], "Double free of {:?}", pfn);
        in_use[index] = false;
    }

    fn has_management_over(&self, pfn: PFN) -> bool {
        self.index_of(pfn)
            .is_some_and(|index| self.0.in_use.lock()[index])
    }
}

impl PageAccess for FramePool {
    unsafe fn get_ptr_for_pfn(&self, pfn: PFN) -> NonNull<PageBlock> {
        let index = self
            .index_of(pfn)
            .unwrap_or_else(|| panic!("{:?} is outside of the pool", pfn));

        // SAFETY: `UnsafeCell::get()` never returns null.
        unsafe { NonNull::new_unchecked(self.0.frames[index].get()) }
    }
}
