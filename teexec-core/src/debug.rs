//! Diagnostic sink used by the interposition layer itself.
//!
//! This deliberately does not go through `log`/`env_logger`: the hot path
//! must not allocate or take a global logger lock, and a
//! write(2) to fd 2 from inside an interposed syscall must not recurse back
//! into the write/writev hooks — `write` is not one of the instrumented
//! calls, so a direct libc write is safe here.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
pub(crate) static DEBUG_MORE_ENABLED: AtomicBool = AtomicBool::new(false);

pub(crate) fn enable() {
    DEBUG_ENABLED.store(true, Ordering::Relaxed);
}

pub(crate) fn enable_more() {
    DEBUG_MORE_ENABLED.store(true, Ordering::Relaxed);
}

#[inline]
pub(crate) fn enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

#[inline]
#[allow(dead_code)]
pub(crate) fn enabled_more() -> bool {
    DEBUG_MORE_ENABLED.load(Ordering::Relaxed)
}

/// Writes one line to stderr without touching Rust's buffered, mutex-guarded
/// `Stderr`. Formats into a fixed stack buffer so a busy tracer doesn't grow
/// the heap just to log a line; truncates rather than allocating if the line
/// doesn't fit.
pub(crate) fn write_line(args: std::fmt::Arguments) {
    let mut buf = [0u8; 512];
    let mut cursor = Cursor { buf: &mut buf, len: 0 };
    let _ = cursor.write_fmt(format_args!("{:>10}:\t", unsafe { libc::getpid() }));
    let _ = cursor.write_fmt(args);
    let _ = cursor.write_all(b"\n");
    let line = cursor.as_slice();
    unsafe {
        libc::write(2, line.as_ptr() as *const libc::c_void, line.len());
    }
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Cursor<'a> {
    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<'a> Write for Cursor<'a> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let space = self.buf.len() - self.len;
        let n = data.len().min(space);
        self.buf[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

macro_rules! debug {
    ($($arg:tt)*) => {
        if $crate::debug::enabled() {
            $crate::debug::write_line(format_args!($($arg)*));
        }
    };
}

macro_rules! debug_more {
    ($($arg:tt)*) => {
        if $crate::debug::enabled_more() {
            $crate::debug::write_line(format_args!($($arg)*));
        }
    };
}

pub(crate) use debug;
#[allow(unused_imports)]
pub(crate) use debug_more;
