//! Uninstrumented `accept`/`close` used internally by the tracer itself.
//!
//! Grounded on `original_source/src/util.h`'s `retry()` (the
//! `TEMP_FAILURE_RETRY` wrapper) and the bypass calls `trace.c` makes when
//! opening or tearing down trace connections without re-entering its own
//! hooks. These always go through `resolve::real_*` rather than `libc::`
//! directly, since under `LD_PRELOAD` a direct call to `libc::accept`/
//! `libc::close` from within this library would re-resolve to our own
//! exported symbol and recurse.

use std::os::unix::io::RawFd;

use crate::resolve;

pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn retry<F: FnMut() -> i32>(mut f: F) -> i32 {
    loop {
        let rc = f();
        if rc == -1 && errno() == libc::EINTR {
            continue;
        }
        return rc;
    }
}

pub(crate) fn xclose(fd: RawFd) -> i32 {
    retry(|| unsafe { resolve::real_close()(fd) })
}

/// Accepts a new connection without going through our own `accept`/`accept4`
/// hook, used when the tracer itself opens a connection to a trace listener.
/// Always close-on-exec, so a trace connection never leaks into children the
/// traced program itself forks and execs.
#[cfg(target_os = "linux")]
pub(crate) fn xaccept(listen_fd: RawFd) -> RawFd {
    if let Some(accept4) = resolve::real_accept4() {
        return retry(|| unsafe {
            accept4(listen_fd, std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_CLOEXEC)
        });
    }
    accept_and_set_cloexec(listen_fd)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn xaccept(listen_fd: RawFd) -> RawFd {
    accept_and_set_cloexec(listen_fd)
}

fn accept_and_set_cloexec(listen_fd: RawFd) -> RawFd {
    let fd = retry(|| unsafe {
        resolve::real_accept()(listen_fd, std::ptr::null_mut(), std::ptr::null_mut())
    });
    if fd >= 0 {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD, 0);
            if flags >= 0 {
                libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
            }
        }
    }
    fd
}
