//! Exported `extern "C"` wrappers the dynamic loader binds in place of libc's
//! `accept`/`accept4`/the `read`/`recv` family/`close`.
//!
//! Grounded on `original_source/src/hoist.c`'s `hoist()`-generated wrappers.
//! Each wrapper here does exactly three things: forward to the real syscall
//! (found via `resolve.rs`), run the corresponding pre/post hook from
//! `lib.rs` on success, and return the real result untouched. None of them
//! touch `errno` beyond what the real call already set.

#[cfg(target_os = "linux")]
use std::os::raw::c_uint;
use std::os::raw::{c_int, c_void};
use std::os::unix::io::RawFd;
use std::slice;

use crate::iovec::gather as gather_iovecs;
use crate::{quick_inert_check, resolve, trace, trace_start, trace_stop, tracev};

#[no_mangle]
pub unsafe extern "C" fn accept(
    sockfd: c_int,
    addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> c_int {
    let rc = (resolve::real_accept())(sockfd, addr, addrlen);
    if rc >= 0 && !quick_inert_check() {
        trace_start(rc as RawFd, sockfd as RawFd);
    }
    rc
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn accept4(
    sockfd: c_int,
    addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
    flags: c_int,
) -> c_int {
    let rc = match resolve::real_accept4() {
        Some(real) => real(sockfd, addr, addrlen, flags),
        None => -1,
    };
    if rc >= 0 && !quick_inert_check() {
        trace_start(rc as RawFd, sockfd as RawFd);
    }
    rc
}

#[no_mangle]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: libc::size_t) -> libc::ssize_t {
    let n = (resolve::real_read())(fd, buf, count);
    if n > 0 && !quick_inert_check() {
        trace(fd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __read_chk(
    fd: c_int,
    buf: *mut c_void,
    count: libc::size_t,
    buflen: libc::size_t,
) -> libc::ssize_t {
    let n = match resolve::real_read_chk() {
        Some(real) => real(fd, buf, count, buflen),
        None => (resolve::real_read())(fd, buf, count),
    };
    if n > 0 && !quick_inert_check() {
        trace(fd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}

#[no_mangle]
pub unsafe extern "C" fn readv(
    fd: c_int,
    iov: *const libc::iovec,
    iovcnt: c_int,
) -> libc::ssize_t {
    let n = (resolve::real_readv())(fd, iov, iovcnt);
    if n > 0 && !quick_inert_check() {
        tracev(fd as RawFd, &gather_iovecs(iov, iovcnt, n as usize));
    }
    n
}

#[no_mangle]
pub unsafe extern "C" fn recv(
    sockfd: c_int,
    buf: *mut c_void,
    len: libc::size_t,
    flags: c_int,
) -> libc::ssize_t {
    let n = (resolve::real_recv())(sockfd, buf, len, flags);
    if n > 0 && !quick_inert_check() {
        trace(sockfd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}

#[no_mangle]
pub unsafe extern "C" fn recvfrom(
    sockfd: c_int,
    buf: *mut c_void,
    len: libc::size_t,
    flags: c_int,
    src_addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> libc::ssize_t {
    let n = (resolve::real_recvfrom())(sockfd, buf, len, flags, src_addr, addrlen);
    if n > 0 && !quick_inert_check() {
        trace(sockfd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __recv_chk(
    sockfd: c_int,
    buf: *mut c_void,
    len: libc::size_t,
    buflen: libc::size_t,
    flags: c_int,
) -> libc::ssize_t {
    let n = match resolve::real_recv_chk() {
        Some(real) => real(sockfd, buf, len, buflen, flags),
        None => (resolve::real_recv())(sockfd, buf, len, flags),
    };
    if n > 0 && !quick_inert_check() {
        trace(sockfd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __recvfrom_chk(
    sockfd: c_int,
    buf: *mut c_void,
    len: libc::size_t,
    buflen: libc::size_t,
    flags: c_int,
    src_addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> libc::ssize_t {
    let n = match resolve::real_recvfrom_chk() {
        Some(real) => real(sockfd, buf, len, buflen, flags, src_addr, addrlen),
        None => (resolve::real_recvfrom())(sockfd, buf, len, flags, src_addr, addrlen),
    };
    if n > 0 && !quick_inert_check() {
        trace(sockfd as RawFd, slice::from_raw_parts(buf as *const u8, n as usize));
    }
    n
}

#[no_mangle]
pub unsafe extern "C" fn recvmsg(
    sockfd: c_int,
    msg: *mut libc::msghdr,
    flags: c_int,
) -> libc::ssize_t {
    let n = (resolve::real_recvmsg())(sockfd, msg, flags);
    if n > 0 && !quick_inert_check() {
        let iov = (*msg).msg_iov;
        let iovlen = (*msg).msg_iovlen as c_int;
        tracev(sockfd as RawFd, &gather_iovecs(iov, iovlen, n as usize));
    }
    n
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn recvmmsg(
    sockfd: c_int,
    msgvec: *mut libc::mmsghdr,
    vlen: c_uint,
    flags: c_int,
    timeout: *mut libc::timespec,
) -> c_int {
    let real = match resolve::real_recvmmsg() {
        Some(real) => real,
        None => return -1,
    };
    let n = real(sockfd, msgvec, vlen, flags, timeout);
    if n > 0 && !quick_inert_check() {
        // One wrapper call produces one frame, even though recvmmsg can
        // batch several datagrams: flatten them all into one gathered copy.
        let mut chunks: Vec<&[u8]> = Vec::new();
        for i in 0..n as usize {
            let hdr = &(*msgvec.add(i)).msg_hdr;
            let received = (*msgvec.add(i)).msg_len as usize;
            chunks.extend(gather_iovecs(hdr.msg_iov, hdr.msg_iovlen as c_int, received));
        }
        tracev(sockfd as RawFd, &chunks);
    }
    n
}

#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    if !quick_inert_check() {
        trace_stop(fd as RawFd);
    }
    (resolve::real_close())(fd)
}
