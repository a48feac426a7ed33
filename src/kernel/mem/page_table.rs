use core::marker::PhantomData;
use core::ptr::NonNull;

use eonix_mm::address::VAddr;
use eonix_mm::page_table::{
    PageAttribute, PageTable, PageTableLevel, PagingMode, RawPageTable, PTE,
};
use eonix_mm::paging::{FrameAlloc, PageAccess, PageBlock, PFN};

use super::replacement::AccessedBits;

pub const PA_V: u64 = 0b1 << 0;
pub const PA_R: u64 = 0b1 << 1;
pub const PA_W: u64 = 0b1 << 2;
pub const PA_X: u64 = 0b1 << 3;
pub const PA_U: u64 = 0b1 << 4;
pub const PA_G: u64 = 0b1 << 5;
pub const PA_A: u64 = 0b1 << 6;
pub const PA_D: u64 = 0b1 << 7;

// in RSW
pub const PA_PG: u64 = 0b1 << 8;

pub const PA_SHIFT: u64 = 10;
// Bit 0-9 (V, R, W, X, U, G, A, D, RSW)
pub const PA_FLAGS_MASK: u64 = 0x3FF; // 0b11_1111_1111
const PA_PPN_MASK: u64 = (1 << 44) - 1;

/// One beyond the highest user virtual address.
///
/// Sv39 could go up to 1 << 39, but we keep the top bit clear so that user
/// addresses never need sign extension.
pub const MAX_USER_VA: VAddr = VAddr::from(1 << 38);

#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct PTE64(pub u64);

pub struct RawPageTableSv39<'a>(NonNull<PTE64>, PhantomData<&'a ()>);

pub struct PagingModeSv39;

pub type UserPageTable<A, X> = PageTable<PagingModeSv39, A, X>;

impl PTE for PTE64 {
    fn set(&mut self, pfn: PFN, attr: PageAttribute) {
        self.0 = ((usize::from(pfn) as u64 & PA_PPN_MASK) << PA_SHIFT) | raw_attr(attr);
    }

    fn get(&self) -> (PFN, PageAttribute) {
        let pfn = PFN::from(((self.0 >> PA_SHIFT) & PA_PPN_MASK) as usize);
        (pfn, page_attr(self.0 & PA_FLAGS_MASK))
    }
}

impl PagingMode for PagingModeSv39 {
    type Entry = PTE64;
    type RawTable<'a> = RawPageTableSv39<'a>;
    const LEVELS: &'static [PageTableLevel] = &[
        PageTableLevel::new(30, 9),
        PageTableLevel::new(21, 9),
        PageTableLevel::new(12, 9),
    ];
}

impl<'a> RawPageTable<'a> for RawPageTableSv39<'a> {
    type Entry = PTE64;

    fn index(&self, index: u16) -> &'a Self::Entry {
        unsafe { self.0.add(index as usize).as_ref() }
    }

    fn index_mut(&mut self, index: u16) -> &'a mut Self::Entry {
        unsafe { self.0.add(index as usize).as_mut() }
    }

    unsafe fn from_ptr(ptr: NonNull<PageBlock>) -> Self {
        Self(ptr.cast(), PhantomData)
    }
}

fn raw_attr(page_attr: PageAttribute) -> u64 {
    let mut raw_attr = 0;

    for attr in page_attr.iter() {
        match attr {
            PageAttribute::VALID => raw_attr |= PA_V,
            PageAttribute::READ => raw_attr |= PA_R,
            PageAttribute::WRITE => raw_attr |= PA_W,
            PageAttribute::EXECUTE => raw_attr |= PA_X,
            PageAttribute::USER => raw_attr |= PA_U,
            PageAttribute::GLOBAL => raw_attr |= PA_G,
            PageAttribute::ACCESSED => raw_attr |= PA_A,
            PageAttribute::DIRTY => raw_attr |= PA_D,
            PageAttribute::PAGED_OUT => raw_attr |= PA_PG,
            _ => unreachable!("Invalid page attribute"),
        }
    }

    raw_attr
}

fn page_attr(raw_attr: u64) -> PageAttribute {
    let mut page_attr = PageAttribute::empty();

    if raw_attr & PA_V != 0 {
        page_attr |= PageAttribute::VALID;
    }
    if raw_attr & PA_R != 0 {
        page_attr |= PageAttribute::READ;
    }
    if raw_attr & PA_W != 0 {
        page_attr |= PageAttribute::WRITE;
    }
    if raw_attr & PA_X != 0 {
        page_attr |= PageAttribute::EXECUTE;
    }
    if raw_attr & PA_U != 0 {
        page_attr |= PageAttribute::USER;
    }
    if raw_attr & PA_G != 0 {
        page_attr |= PageAttribute::GLOBAL;
    }
    if raw_attr & PA_A != 0 {
        page_attr |= PageAttribute::ACCESSED;
    }
    if raw_attr & PA_D != 0 {
        page_attr |= PageAttribute::DIRTY;
    }
    if raw_attr & PA_PG != 0 {
        page_attr |= PageAttribute::PAGED_OUT;
    }

    page_attr
}

impl<A, X> AccessedBits for UserPageTable<A, X>
where
    A: FrameAlloc,
    X: PageAccess,
{
    fn test_and_clear_accessed(&mut self, vaddr: VAddr) -> bool {
        let entry = self
            .translate(vaddr, false)
            .expect("Resident pages should have a leaf entry");

        let attr = entry.get_attr();
        if attr.contains(PageAttribute::ACCESSED) {
            entry.set_attr(attr - PageAttribute::ACCESSED);
            true
        } else {
            false
        }
    }
}
