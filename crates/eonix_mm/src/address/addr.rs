use crate::paging::PAGE_SIZE;
use core::ops::{Add, Sub};

pub trait Addr:
    Sized
    + Copy
    + Clone
    + Ord
    + PartialOrd
    + Eq
    + PartialEq
    + Sub<Output = usize>
    + Sub<usize, Output = Self>
    + Add<usize, Output = Self>
    + From<usize>
{
    fn addr(self) -> usize;
}

pub trait AddrOps: Sized {
    fn offset_in(self, size: usize) -> usize;

    /// Aligns the address to the nearest lower multiple of `size`.
    fn floor_to(self, size: usize) -> Self;

    /// Aligns the address to the nearest higher multiple of `size`.
    fn ceil_to(self, size: usize) -> Self;

    fn page_offset(self) -> usize {
        self.offset_in(PAGE_SIZE)
    }

    fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    fn floor(self) -> Self {
        self.floor_to(PAGE_SIZE)
    }

    fn ceil(self) -> Self {
        self.ceil_to(PAGE_SIZE)
    }
}

impl<A: Addr> AddrOps for A {
    fn offset_in(self, size: usize) -> usize {
        self.addr() % size
    }

    fn floor_to(self, size: usize) -> Self {
        Self::from(self.addr() / size * size)
    }

    fn ceil_to(self, size: usize) -> Self {
        Self::from(self.addr().div_ceil(size) * size)
    }
}

/// Define an address newtype over `usize` implementing [`Addr`].
macro_rules! addr_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
        pub struct $name(usize);

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self(v)
            }
        }

        impl core::ops::Sub for $name {
            type Output = usize;

            fn sub(self, rhs: Self) -> usize {
                self.0 - rhs.0
            }
        }

        impl core::ops::Sub<usize> for $name {
            type Output = Self;

            fn sub(self, rhs: usize) -> Self {
                Self(self.0 - rhs)
            }
        }

        impl core::ops::Add<usize> for $name {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }

        impl $crate::address::Addr for $name {
            fn addr(self) -> usize {
                self.0
            }
        }
    };
}

pub(super) use addr_type;
