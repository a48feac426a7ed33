use core::marker::PhantomData;
use core::ptr::NonNull;

use super::{PageAttribute, PageTableError, PageTableLevel, PagingMode, PTE};
use crate::address::{AddrOps as _, VAddr, VRange};
use crate::paging::{FrameAlloc, PageAccess, PageBlock, PAGE_SIZE, PFN};

pub trait RawPageTable<'a>: 'a {
    type Entry: PTE + 'a;

    /// Return the entry at the given index.
    fn index(&self, index: u16) -> &'a Self::Entry;

    /// Return a mutable reference to the entry at the given index.
    fn index_mut(&mut self, index: u16) -> &'a mut Self::Entry;

    /// Get the page table pointed to by raw pointer `ptr`.
    unsafe fn from_ptr(ptr: NonNull<PageBlock>) -> Self;
}

/// A multi-level page table whose root and interior tables are allocated in `A`.
///
/// The page table owns its interior tables only. Frames referenced by leaf
/// entries belong to whoever mapped them and are released through `unmap()`.
pub struct PageTable<M, A, X>
where
    M: PagingMode,
    A: FrameAlloc,
    X: PageAccess,
{
    root_table: PFN,
    alloc: A,
    access: X,
    phantom: PhantomData<M>,
}

impl<M, A, X> PageTable<M, A, X>
where
    M: PagingMode,
    A: FrameAlloc,
    X: PageAccess,
{
    /// Allocate an empty root table.
    pub fn new(alloc: A, access: X) -> Result<Self, PageTableError> {
        let root_table = alloc.alloc().ok_or(PageTableError::OutOfMemory)?;

        unsafe {
            // SAFETY: We've just allocated the frame, nobody else references it.
            access.zero_frame(root_table);
        }

        Ok(Self {
            root_table,
            alloc,
            access,
            phantom: PhantomData,
        })
    }

    fn table_levels() -> &'static [PageTableLevel] {
        &M::LEVELS[..M::LEVELS.len() - 1]
    }

    fn leaf_level() -> PageTableLevel {
        M::LEVELS[M::LEVELS.len() - 1]
    }

    fn raw_table<'a>(&self, pfn: PFN) -> M::RawTable<'a> {
        unsafe {
            // SAFETY: `pfn` is either our root table or was read from a table entry
            //         of ours, so it refers to a live page table.
            M::RawTable::from_ptr(self.access.get_ptr_for_pfn(pfn))
        }
    }

    fn find_leaf_table<'a>(&self, vaddr: VAddr) -> Result<M::RawTable<'a>, PageTableError> {
        if vaddr >= M::vaddr_limit() {
            return Err(PageTableError::TranslationUnavailable);
        }

        let mut table = self.raw_table(self.root_table);
        for level in Self::table_levels() {
            let (pfn, attr) = table.index(level.index_of(vaddr)).get();

            if attr.is_table() {
                table = self.raw_table(pfn);
            } else if attr.contains(PageAttribute::VALID) {
                // Huge pages are never created, a leaf here is garbage.
                return Err(PageTableError::CorruptMapping);
            } else {
                return Err(PageTableError::TranslationUnavailable);
            }
        }

        Ok(table)
    }

    /// Walk the table down to the leaf entry of `vaddr`.
    ///
    /// Missing interior tables are allocated and zeroed if `allocate` is set.
    pub fn translate(
        &mut self,
        vaddr: VAddr,
        allocate: bool,
    ) -> Result<&mut M::Entry, PageTableError> {
        if !allocate {
            let mut table = self.find_leaf_table(vaddr)?;
            return Ok(table.index_mut(Self::leaf_level().index_of(vaddr)));
        }

        if vaddr >= M::vaddr_limit() {
            return Err(PageTableError::TranslationUnavailable);
        }

        let mut table = self.raw_table(self.root_table);
        for level in Self::table_levels() {
            let entry = table.index_mut(level.index_of(vaddr));
            let (pfn, attr) = entry.get();

            let next_table = if attr.is_table() {
                pfn
            } else if attr.contains(PageAttribute::VALID) {
                return Err(PageTableError::CorruptMapping);
            } else {
                let pfn = self
                    .alloc
                    .alloc()
                    .ok_or(PageTableError::TranslationUnavailable)?;

                unsafe {
                    // SAFETY: Freshly allocated, exclusively ours.
                    self.access.zero_frame(pfn);
                }

                entry.set(pfn, PageAttribute::VALID);
                pfn
            };

            table = self.raw_table(next_table);
        }

        Ok(table.index_mut(Self::leaf_level().index_of(vaddr)))
    }

    /// Look up the leaf entry of `vaddr` without allocating anything.
    pub fn entry(&self, vaddr: VAddr) -> Option<&M::Entry> {
        let table = self.find_leaf_table(vaddr).ok()?;
        Some(table.index(Self::leaf_level().index_of(vaddr)))
    }

    /// Frame backing `vaddr` if the page is resident.
    pub fn lookup(&self, vaddr: VAddr) -> Option<PFN> {
        let (pfn, attr) = self.entry(vaddr)?.get();
        attr.is_resident().then_some(pfn)
    }

    /// Map `len` bytes starting at `vaddr` to consecutive frames starting at `pfn`.
    ///
    /// `vaddr` and `len` need not be page aligned, every page touched is mapped.
    pub fn map(
        &mut self,
        vaddr: VAddr,
        len: usize,
        pfn: PFN,
        attr: PageAttribute,
    ) -> Result<(), PageTableError> {
        assert_ne!(len, 0, "map: zero length");

        let range = VRange::new(vaddr.floor(), vaddr + len);
        for (idx, page) in range.pages().enumerate() {
            let entry = self.translate(page, true)?;
            if entry.get_attr().contains(PageAttribute::VALID) {
                return Err(PageTableError::AlreadyMapped);
            }

            entry.set(pfn + idx, attr | PageAttribute::VALID);
        }

        Ok(())
    }

    /// Remove `count` leaf mappings starting at the page aligned `vaddr`.
    ///
    /// Every entry must be either resident or paged out. Resident frames are
    /// given back to the allocator if `free_frames` is set.
    pub fn unmap(
        &mut self,
        vaddr: VAddr,
        count: usize,
        free_frames: bool,
    ) -> Result<(), PageTableError> {
        assert!(vaddr.is_page_aligned(), "unmap: not aligned");

        for page in VRange::from(vaddr).grow(count * PAGE_SIZE).pages() {
            let entry = self
                .translate(page, false)
                .map_err(|_| PageTableError::CorruptMapping)?;

            let (pfn, attr) = entry.get();
            if attr.contains(PageAttribute::VALID) && !attr.is_leaf() {
                return Err(PageTableError::CorruptMapping);
            }
            if attr.is_unmapped() {
                return Err(PageTableError::CorruptMapping);
            }

            entry.take();

            if free_frames && attr.contains(PageAttribute::VALID) {
                unsafe {
                    // SAFETY: The entry was the only reference to the frame and is gone now.
                    self.alloc.dealloc(pfn);
                }
            }
        }

        Ok(())
    }

    fn copy_page_to(&self, dest: &mut Self, page: VAddr) -> Result<(), PageTableError> {
        let (pfn, attr) = self
            .entry(page)
            .ok_or(PageTableError::CorruptMapping)?
            .get();

        if attr.is_resident() {
            let new_frame = dest.alloc.alloc().ok_or(PageTableError::OutOfMemory)?;

            unsafe {
                // SAFETY: `new_frame` is freshly allocated, so it can't overlap `pfn`.
                dest.access.copy_frame(new_frame, pfn);
            }

            if let Err(err) = dest.map(page, PAGE_SIZE, new_frame, attr) {
                unsafe {
                    // SAFETY: The frame never made it into the table.
                    dest.alloc.dealloc(new_frame);
                }
                return Err(out_of_memory_on_walk(err));
            }
        } else if attr.is_paged_out() {
            dest.translate(page, true)
                .map_err(out_of_memory_on_walk)?
                .set(PFN::from_val(0), attr);
        } else {
            return Err(PageTableError::CorruptMapping);
        }

        Ok(())
    }

    /// Duplicate the mappings below `size` into `dest`.
    ///
    /// Resident pages get a private copy of their frame. Paged out entries are
    /// copied as is, the owner of `dest` decides what to do with the swap slot.
    /// On failure every page copied by this call is unmapped from `dest` again.
    pub fn copy_to(&self, dest: &mut Self, size: usize) -> Result<(), PageTableError> {
        let range = VRange::new(VAddr::NULL, VAddr::from(size));

        for (copied, page) in range.pages().enumerate() {
            if let Err(err) = self.copy_page_to(dest, page) {
                dest.unmap(VAddr::NULL, copied, true)
                    .expect("Pages copied before should be unmappable");
                return Err(err);
            }
        }

        Ok(())
    }

    fn check_no_leaves(&self, pfn: PFN, levels: &[PageTableLevel]) -> Result<(), PageTableError> {
        let [level, remaining_levels @ ..] = levels else {
            return Ok(());
        };

        let table = self.raw_table(pfn);
        for idx in 0..=level.max_index() {
            let (child, attr) = table.index(idx).get();

            if remaining_levels.is_empty() || !attr.is_table() {
                if !attr.is_unmapped() {
                    return Err(PageTableError::CorruptMapping);
                }
                continue;
            }

            self.check_no_leaves(child, remaining_levels)?;
        }

        Ok(())
    }

    /// Check that no leaf mapping is left.
    pub fn check_empty(&self) -> Result<(), PageTableError> {
        self.check_no_leaves(self.root_table, M::LEVELS)
    }

    /// Release the page table. All leaf mappings must have been removed before.
    ///
    /// The interior tables are freed even if a leaf is found, but the frames
    /// referenced by the leftover leaves are lost.
    pub fn destroy(self) -> Result<(), PageTableError> {
        self.check_empty()
    }

    fn drop_page_table_recursive(&self, pfn: PFN, levels: &[PageTableLevel]) {
        let [level, remaining_levels @ ..] = levels else {
            return;
        };
        if remaining_levels.is_empty() {
            // We reached the last level, no need to go deeper.
            return;
        }

        let mut table = self.raw_table(pfn);
        for idx in 0..=level.max_index() {
            let entry = table.index_mut(idx);
            if !entry.get_attr().is_table() {
                continue;
            }

            let (child, _) = entry.take();
            self.drop_page_table_recursive(child, remaining_levels);

            unsafe {
                // SAFETY: The entry was the only reference to the child table.
                self.alloc.dealloc(child);
            }
        }
    }
}

fn out_of_memory_on_walk(err: PageTableError) -> PageTableError {
    match err {
        PageTableError::TranslationUnavailable => PageTableError::OutOfMemory,
        err => err,
    }
}

impl<M, A, X> Drop for PageTable<M, A, X>
where
    M: PagingMode,
    A: FrameAlloc,
    X: PageAccess,
{
    fn drop(&mut self) {
        self.drop_page_table_recursive(self.root_table, M::LEVELS);

        unsafe {
            // SAFETY: Nobody references the root table after we are gone.
            self.alloc.dealloc(self.root_table);
        }
    }
}
