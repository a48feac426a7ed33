use super::addr::addr_type;

addr_type!(
    /// A virtual address.
    VAddr
);

impl VAddr {
    pub const NULL: Self = Self(0);

    pub const fn from(v: usize) -> Self {
        Self(v)
    }
}
