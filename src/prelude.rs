pub type KResult<T> = Result<T, crate::kernel::mem::VmError>;

#[allow(unused_imports)]
pub(crate) use eonix_log::{println_debug, println_fatal, println_info, println_trace, println_warn};

#[allow(unused_imports)]
pub(crate) use alloc::{boxed::Box, string::String, sync::Arc, vec, vec::Vec};
