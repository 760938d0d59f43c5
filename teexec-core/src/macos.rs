//! Apple `__DATA,__interpose` strategy — the alternate resolution path to
//! the `dlsym(RTLD_NEXT, …)` one used everywhere else (`hooks.rs`).
//!
//! Grounded directly on `original_source/src/hoist.c`'s `__APPLE__` branch
//! of the `hoist()` macro: each wrapper is exported under a `hoist_`-
//! prefixed name and paired with the original symbol in a `(new, old)`
//! struct placed in the `__DATA,__interpose` section; dyld rewrites other
//! images' calls to the original name to land on the `hoist_` function
//! instead. Unlike the dlsym strategy, calling the plain libc symbol name
//! from inside this same wrapper is safe and does not recurse: interpose
//! only rebinds references resolved *outside* the image that carries the
//! `__interpose` section, so `libc::accept(...)` called from `hoist_accept`
//! still reaches the real implementation. `original_source` relies on
//! exactly this property (`#define libc(name) name` under `__APPLE__`,
//! with no `dlsym` call at all), so this module mirrors that rather than
//! reusing `resolve.rs`.
//!
//! accept4/`__read_chk`/`__recv_chk`/`__recvfrom_chk`/`recvmmsg` have no
//! counterpart in Apple's libc and are not interposed here, matching the
//! `#if HAS_ACCEPT4` / fortify-only conditionals in the original.

use std::os::raw::{c_int, c_void};
use std::os::unix::io::RawFd;
use std::slice;

use crate::iovec::gather as gather_iovecs;
use crate::{quick_inert_check, trace, trace_start, trace_stop, tracev};

#[repr(C)]
struct Interpose {
    new: *const c_void,
    old: *const c_void,
}

// Safety: these statics are only ever read by dyld at load time; they hold
// plain function pointers and are never mutated.
unsafe impl Sync for Interpose {}

macro_rules! interpose {
    ($table_static:ident, $hoist_fn:expr, $original_fn:expr) => {
        #[used]
        #[link_section = "__DATA,__interpose"]
        static $table_static: Interpose =
            Interpose { new: $hoist_fn as *const c_void, old: $original_fn as *const c_void };
    };
}

#[no_mangle]
pub unsafe extern "C" fn hoist_close(fd: c_int) -> c_int {
    if !quick_inert_check() {
        trace_stop(fd as RawFd);
    }
    libc::close(fd)
}
interpose!(INTERPOSE_CLOSE, hoist_close, libc::close);

#[no_mangle]
pub unsafe extern "C" fn hoist_accept(
    sockfd: c_int,
    addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> c_int {
    let n = libc::accept(sockfd, addr, addrlen);
    if n >= 0 && !quick_inert_check() {
        trace_start(n as RawFd, sockfd as RawFd);
    }
    n
}
interpose!(INTERPOSE_ACCEPT, hoist_accept, libc::accept);

#[no_mangle]
pub unsafe extern "C" fn hoist_read(
    fd: c_int,
    buf: *mut c_void,
    count: libc::size_t,
) -> libc::ssize_t {
    let n = libc::read(fd, buf, count);
    if n > 0 && !quick_inert_check() {
        trace(fd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}
interpose!(INTERPOSE_READ, hoist_read, libc::read);

#[no_mangle]
pub unsafe extern "C" fn hoist_readv(
    fd: c_int,
    iov: *const libc::iovec,
    iovcnt: c_int,
) -> libc::ssize_t {
    let n = libc::readv(fd, iov, iovcnt);
    if n > 0 && !quick_inert_check() {
        tracev(fd as RawFd, &gather_iovecs(iov, iovcnt, n as usize));
    }
    n
}
interpose!(INTERPOSE_READV, hoist_readv, libc::readv);

#[no_mangle]
pub unsafe extern "C" fn hoist_recv(
    sockfd: c_int,
    buf: *mut c_void,
    len: libc::size_t,
    flags: c_int,
) -> libc::ssize_t {
    let n = libc::recv(sockfd, buf, len, flags);
    if n > 0 && !quick_inert_check() {
        trace(sockfd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}
interpose!(INTERPOSE_RECV, hoist_recv, libc::recv);

#[no_mangle]
pub unsafe extern "C" fn hoist_recvfrom(
    sockfd: c_int,
    buf: *mut c_void,
    len: libc::size_t,
    flags: c_int,
    src_addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> libc::ssize_t {
    let n = libc::recvfrom(sockfd, buf, len, flags, src_addr, addrlen);
    if n > 0 && !quick_inert_check() {
        trace(sockfd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}
interpose!(INTERPOSE_RECVFROM, hoist_recvfrom, libc::recvfrom);

#[no_mangle]
pub unsafe extern "C" fn hoist_recvmsg(
    sockfd: c_int,
    msg: *mut libc::msghdr,
    flags: c_int,
) -> libc::ssize_t {
    let n = libc::recvmsg(sockfd, msg, flags);
    if n > 0 && !quick_inert_check() {
        let iov = (*msg).msg_iov;
        let iovlen = (*msg).msg_iovlen as c_int;
        tracev(sockfd as RawFd, &gather_iovecs(iov, iovlen, n as usize));
    }
    n
}
interpose!(INTERPOSE_RECVMSG, hoist_recvmsg, libc::recvmsg);
