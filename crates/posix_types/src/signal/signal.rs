use crate::result::PosixError;
use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Signal(u32);

impl Signal {
    pub const SIGILL: Signal = Signal(4);
    pub const SIGBUS: Signal = Signal(7);
    pub const SIGKILL: Signal = Signal(9);
    pub const SIGSEGV: Signal = Signal(11);

    pub const SIGNUM_MIN: u32 = 1;
    pub const SIGNUM_MAX: u32 = 64;

    pub fn into_raw(self) -> u32 {
        self.0
    }

    pub fn try_from_raw(signo: u32) -> Result<Self, PosixError> {
        match signo {
            Self::SIGNUM_MIN..=Self::SIGNUM_MAX => Ok(Signal(signo)),
            _ => Err(PosixError::EINVAL),
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Signal::SIGILL => write!(f, "SIGILL"),
            &Signal::SIGBUS => write!(f, "SIGBUS"),
            &Signal::SIGKILL => write!(f, "SIGKILL"),
            &Signal::SIGSEGV => write!(f, "SIGSEGV"),
            &Signal(signo @ ..=Signal::SIGNUM_MAX) => write!(f, "Signal({})", signo),
            &Signal(signo) => write!(f, "Signal::UNKNOWN({})", signo),
        }
    }
}
