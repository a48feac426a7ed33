#![cfg_attr(not(test), no_std)]

use core::fmt::{self, Write};

use alloc::sync::Arc;
use spin::Mutex;

extern crate alloc;

pub trait ConsoleWrite: Send + Sync {
    fn write(&self, s: &str);
}

/// Severity of a message, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Fatal,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Fatal => "fatal",
            Level::Warn => " warn",
            Level::Info => " info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

struct Console {
    console: Option<Arc<dyn ConsoleWrite>>,
    max_level: Level,
}

static CONSOLE: Mutex<Console> = Mutex::new(Console {
    console: None,
    max_level: Level::Trace,
});

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(console) = self.console.as_ref() {
            console.write(s);
        }
        Ok(())
    }
}

/// Install `console` as the sink of every message and return the old one.
pub fn set_console(console: Arc<dyn ConsoleWrite>) -> Option<Arc<dyn ConsoleWrite>> {
    CONSOLE.lock().console.replace(console)
}

/// Detach the current console. Messages logged afterwards are dropped.
pub fn take_console() -> Option<Arc<dyn ConsoleWrite>> {
    CONSOLE.lock().console.take()
}

/// Drop messages less severe than `level` and return the previous limit.
pub fn set_max_level(level: Level) -> Level {
    core::mem::replace(&mut CONSOLE.lock().max_level, level)
}

#[doc(hidden)]
pub fn do_log(level: Level, args: fmt::Arguments) {
    let mut console = CONSOLE.lock();
    if level <= console.max_level {
        let _ = writeln!(console, "[vm:{}] {}", level.tag(), args);
    }
}

#[macro_export]
macro_rules! println_warn {
    ($($arg:tt)*) => {
        $crate::do_log($crate::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_debug {
    ($($arg:tt)*) => {
        $crate::do_log($crate::Level::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_info {
    ($($arg:tt)*) => {
        $crate::do_log($crate::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_fatal {
    ($($arg:tt)*) => {
        $crate::do_log($crate::Level::Fatal, format_args!($($arg)*))
    };
}

/// Log only if feature `$feat` of the calling crate is enabled.
#[macro_export]
macro_rules! println_trace {
    ($feat:literal, $($arg:tt)*) => {{
        #[deny(unexpected_cfgs)]
        {
            #[cfg(feature = $feat)]
            $crate::do_log($crate::Level::Trace, format_args!($($arg)*));
        };
    }};
}
