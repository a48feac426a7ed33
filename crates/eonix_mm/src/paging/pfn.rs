use core::fmt;
use core::ops::Add;

/// Number of a physical page frame.
#[repr(transparent)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct PFN(usize);

impl PFN {
    pub const fn from_val(pfn: usize) -> Self {
        Self(pfn)
    }
}

impl From<PFN> for usize {
    fn from(pfn: PFN) -> Self {
        pfn.0
    }
}

impl From<usize> for PFN {
    fn from(pfn: usize) -> Self {
        Self(pfn)
    }
}

impl Add<usize> for PFN {
    type Output = Self;

    fn add(self, rhs: usize) -> Self {
        Self(self.0 + rhs)
    }
}

impl fmt::Debug for PFN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PFN({:#x})", self.0)
    }
}
