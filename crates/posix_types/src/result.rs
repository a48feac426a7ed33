#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PosixError {
    EIO = 5,
    ENOMEM = 12,
    EFAULT = 14,
    EEXIST = 17,
    EINVAL = 22,
    ENOSPC = 28,
}

impl From<PosixError> for u32 {
    fn from(error: PosixError) -> Self {
        match error {
            PosixError::EIO => 5,
            PosixError::ENOMEM => 12,
            PosixError::EFAULT => 14,
            PosixError::EEXIST => 17,
            PosixError::EINVAL => 22,
            PosixError::ENOSPC => 28,
        }
    }
}

impl core::fmt::Debug for PosixError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EIO => write!(f, "EIO"),
            Self::ENOMEM => write!(f, "ENOMEM"),
            Self::EFAULT => write!(f, "EFAULT"),
            Self::EEXIST => write!(f, "EEXIST"),
            Self::EINVAL => write!(f, "EINVAL"),
            Self::ENOSPC => write!(f, "ENOSPC"),
        }
    }
}
