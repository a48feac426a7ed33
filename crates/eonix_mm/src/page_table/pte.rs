use crate::paging::PFN;
use bitflags::bitflags;

bitflags! {
    /// Architecture independent view of the attributes of a page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageAttribute: u32 {
        const VALID = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const EXECUTE = 1 << 3;
        const USER = 1 << 4;
        const GLOBAL = 1 << 5;
        const ACCESSED = 1 << 6;
        const DIRTY = 1 << 7;
        /// The page content lives in the owner's swap store.
        const PAGED_OUT = 1 << 8;
    }
}

impl PageAttribute {
    pub const LEAF: Self = Self::READ.union(Self::WRITE).union(Self::EXECUTE);

    /// Entries that point to the next level of table have none of R, W, X.
    pub fn is_table(self) -> bool {
        self.contains(Self::VALID) && !self.intersects(Self::LEAF)
    }

    pub fn is_leaf(self) -> bool {
        self.intersects(Self::LEAF)
    }

    pub fn is_resident(self) -> bool {
        self.contains(Self::VALID) && self.is_leaf()
    }

    pub fn is_paged_out(self) -> bool {
        !self.contains(Self::VALID) && self.contains(Self::PAGED_OUT)
    }

    /// Neither resident nor paged out.
    pub fn is_unmapped(self) -> bool {
        !self.intersects(Self::VALID | Self::PAGED_OUT)
    }
}

pub trait PTE: Sized {
    fn set(&mut self, pfn: PFN, attr: PageAttribute);
    fn get(&self) -> (PFN, PageAttribute);

    fn take(&mut self) -> (PFN, PageAttribute) {
        let old = self.get();
        self.set(PFN::from_val(0), PageAttribute::empty());
        old
    }

    fn set_pfn(&mut self, pfn: PFN) {
        self.set(pfn, self.get_attr());
    }

    fn set_attr(&mut self, attr: PageAttribute) {
        self.set(self.get_pfn(), attr);
    }

    fn get_pfn(&self) -> PFN {
        self.get().0
    }

    fn get_attr(&self) -> PageAttribute {
        self.get().1
    }
}
