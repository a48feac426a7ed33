use super::PFN;
use core::ptr::NonNull;

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SIZE_BITS: u32 = PAGE_SIZE.trailing_zeros();

/// A block of memory that is aligned to the page size and can be used for
/// page-aligned allocations.
///
/// This is used to ensure that the memory is properly aligned to the page size.
#[repr(C, align(4096))]
pub struct PageBlock([u8; PAGE_SIZE]);

impl PageBlock {
    pub const fn zeroed() -> Self {
        Self([0; PAGE_SIZE])
    }
}

/// A trait that provides the kernel access to the page.
///
/// Implementations are handed around by value like the allocators, so they
/// should be cheap to clone.
pub trait PageAccess: Clone {
    /// Returns a kernel-accessible pointer to the page referenced by the given
    /// physical frame number.
    ///
    /// # Safety
    /// This function is unsafe because calling this function on some non-existing
    /// pfn will cause undefined behavior.
    unsafe fn get_ptr_for_pfn(&self, pfn: PFN) -> NonNull<PageBlock>;

    /// Returns the content of the frame as a byte slice.
    ///
    /// # Safety
    /// `pfn` must be a valid frame and nobody may write to it while the returned
    /// slice is alive.
    unsafe fn frame_bytes<'a>(&self, pfn: PFN) -> &'a [u8] {
        unsafe {
            // SAFETY: The caller guarantees that the frame exists and is not
            //         mutated during `'a`.
            let ptr = self.get_ptr_for_pfn(pfn);
            core::slice::from_raw_parts(ptr.cast::<u8>().as_ptr(), PAGE_SIZE)
        }
    }

    /// Returns the content of the frame as a mutable byte slice.
    ///
    /// # Safety
    /// `pfn` must be a valid frame and the returned slice must be the only
    /// reference to it while alive.
    unsafe fn frame_bytes_mut<'a>(&self, pfn: PFN) -> &'a mut [u8] {
        unsafe {
            // SAFETY: The caller guarantees exclusive access to the frame.
            let ptr = self.get_ptr_for_pfn(pfn);
            core::slice::from_raw_parts_mut(ptr.cast::<u8>().as_ptr(), PAGE_SIZE)
        }
    }

    /// Fill the frame with zeros.
    ///
    /// # Safety
    /// Same as `frame_bytes_mut()`.
    unsafe fn zero_frame(&self, pfn: PFN) {
        unsafe {
            // SAFETY: `ptr` is good for writing and properly aligned.
            self.get_ptr_for_pfn(pfn).write_bytes(0, 1);
        }
    }

    /// Copy the whole content of frame `src` into frame `dst`.
    ///
    /// # Safety
    /// Both frames must be valid and **different**.
    unsafe fn copy_frame(&self, dst: PFN, src: PFN) {
        unsafe {
            // SAFETY: The caller guarantees that `dst` and `src` don't overlap.
            let src = self.get_ptr_for_pfn(src);
            self.get_ptr_for_pfn(dst).copy_from_nonoverlapping(src, 1);
        }
    }
}
