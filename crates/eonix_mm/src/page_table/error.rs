use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PageTableError {
    /// The walk needed an intermediate table that is missing and we were not
    /// allowed to (or failed to) allocate one.
    TranslationUnavailable,
    /// The target entry is already valid.
    AlreadyMapped,
    /// An entry is in a state it must never be in.
    CorruptMapping,
    /// A data frame could not be allocated.
    OutOfMemory,
}

impl fmt::Debug for PageTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TranslationUnavailable => write!(f, "TranslationUnavailable"),
            Self::AlreadyMapped => write!(f, "AlreadyMapped"),
            Self::CorruptMapping => write!(f, "CorruptMapping"),
            Self::OutOfMemory => write!(f, "OutOfMemory"),
        }
    }
}
