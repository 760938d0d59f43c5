//! Lazy resolution of the real libc entry points this library shadows.
//!
//! On the dlsym strategy (the default everywhere this crate builds a
//! cdylib), each wrapped symbol looks up `RTLD_NEXT` the first time it's
//! needed and caches the pointer in a `OnceLock`, the same pattern used for
//! `os_unfair_lock_lock_with_flags` elsewhere in this tree. This mirrors
//! `original_source/src/hoist.c`'s `init_##name` constructors, but traded for
//! lazy `OnceLock::get_or_init` rather than `__attribute__((constructor))`:
//! Rust has no portable constructor attribute without an extra crate, and
//! resolving on first use is just as correct here since nothing calls into
//! any hook before the dynamic linker has finished binding `RTLD_NEXT`.
//!
//! A failed lookup is not treated as fatal: `original_source` never checks
//! for a null `dlsym` result either, so a hook that can't find its real
//! counterpart would crash the same way here as there. The one case this
//! crate does guard is fortify/glibc-only symbols (`__read_chk` and
//! friends) which may legitimately not exist; those resolve to `None`.

use std::ffi::CStr;
#[cfg(target_os = "linux")]
use std::os::raw::c_uint;
use std::os::raw::{c_int, c_void};
use std::sync::OnceLock;

pub(crate) type AcceptFn =
    unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> c_int;
pub(crate) type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, libc::size_t) -> libc::ssize_t;
pub(crate) type ReadvFn = unsafe extern "C" fn(c_int, *const libc::iovec, c_int) -> libc::ssize_t;
pub(crate) type RecvFn =
    unsafe extern "C" fn(c_int, *mut c_void, libc::size_t, c_int) -> libc::ssize_t;
pub(crate) type RecvfromFn = unsafe extern "C" fn(
    c_int,
    *mut c_void,
    libc::size_t,
    c_int,
    *mut libc::sockaddr,
    *mut libc::socklen_t,
) -> libc::ssize_t;
pub(crate) type RecvmsgFn = unsafe extern "C" fn(c_int, *mut libc::msghdr, c_int) -> libc::ssize_t;
pub(crate) type CloseFn = unsafe extern "C" fn(c_int) -> c_int;

#[cfg(target_os = "linux")]
pub(crate) type Accept4Fn =
    unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t, c_int) -> c_int;
#[cfg(target_os = "linux")]
pub(crate) type ReadChkFn =
    unsafe extern "C" fn(c_int, *mut c_void, libc::size_t, libc::size_t) -> libc::ssize_t;
#[cfg(target_os = "linux")]
pub(crate) type RecvChkFn =
    unsafe extern "C" fn(c_int, *mut c_void, libc::size_t, libc::size_t, c_int) -> libc::ssize_t;
#[cfg(target_os = "linux")]
pub(crate) type RecvfromChkFn = unsafe extern "C" fn(
    c_int,
    *mut c_void,
    libc::size_t,
    libc::size_t,
    c_int,
    *mut libc::sockaddr,
    *mut libc::socklen_t,
) -> libc::ssize_t;
#[cfg(target_os = "linux")]
pub(crate) type RecvmmsgFn = unsafe extern "C" fn(
    c_int,
    *mut libc::mmsghdr,
    c_uint,
    c_int,
    *mut libc::timespec,
) -> c_int;

unsafe fn dlsym_next(name: &CStr) -> *mut c_void {
    libc::dlsym(libc::RTLD_NEXT, name.as_ptr())
}

macro_rules! required {
    ($fn_name:ident, $ty:ty, $sym:expr) => {
        pub(crate) fn $fn_name() -> $ty {
            static CACHE: OnceLock<usize> = OnceLock::new();
            let addr = *CACHE.get_or_init(|| unsafe { dlsym_next($sym) as usize });
            unsafe { std::mem::transmute::<usize, $ty>(addr) }
        }
    };
}

macro_rules! optional {
    ($fn_name:ident, $ty:ty, $sym:expr) => {
        #[cfg(target_os = "linux")]
        pub(crate) fn $fn_name() -> Option<$ty> {
            static CACHE: OnceLock<usize> = OnceLock::new();
            let addr = *CACHE.get_or_init(|| unsafe { dlsym_next($sym) as usize });
            if addr == 0 {
                None
            } else {
                Some(unsafe { std::mem::transmute::<usize, $ty>(addr) })
            }
        }
    };
}

required!(real_accept, AcceptFn, c"accept");
required!(real_read, ReadFn, c"read");
required!(real_readv, ReadvFn, c"readv");
required!(real_recv, RecvFn, c"recv");
required!(real_recvfrom, RecvfromFn, c"recvfrom");
required!(real_recvmsg, RecvmsgFn, c"recvmsg");
required!(real_close, CloseFn, c"close");

optional!(real_accept4, Accept4Fn, c"accept4");
optional!(real_read_chk, ReadChkFn, c"__read_chk");
optional!(real_recv_chk, RecvChkFn, c"__recv_chk");
optional!(real_recvfrom_chk, RecvfromChkFn, c"__recvfrom_chk");
optional!(real_recvmmsg, RecvmmsgFn, c"recvmmsg");
