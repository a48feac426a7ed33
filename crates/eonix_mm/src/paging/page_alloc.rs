use super::PFN;

/// A trait for allocating and deallocating physical frames.
///
/// Note that the instances of this trait should provide pointer-like or reference-like
/// behavior, meaning that the allocators are to be passed around by value and stored in
/// managed data structures. This is because the allocator may be used to deallocate the
/// frames it allocates.
pub trait FrameAlloc: Clone {
    /// Allocate exactly one frame. The content of the frame is unspecified.
    fn alloc(&self) -> Option<PFN>;

    /// Deallocate a frame.
    ///
    /// # Safety
    /// This function is unsafe because it assumes that the caller MUST ensure that
    /// `pfn` is allocated in this allocator and never used after this call.
    unsafe fn dealloc(&self, pfn: PFN);

    /// Check whether the frame is allocated and managed by the allocator.
    fn has_management_over(&self, pfn: PFN) -> bool;
}
