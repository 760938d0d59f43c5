//! Trace listener setup: a non-blocking, not-close-on-exec passive stream
//! socket that survives the launcher's own `execve` into the target, so the
//! core can accept consumers on it after the process image has been
//! replaced.
//!
//! Built on raw `libc::socket`/`bind`/`listen` rather than `nix`'s socket
//! address wrappers, where a thin, exact match to the underlying syscall
//! reads more plainly than an abstraction.

use std::ffi::CString;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::error::{Error, Result};

const LISTEN_BACKLOG: i32 = 16;

/// Binds the trace listener named by `--trace`. `spec` is tried as a TCP
/// `host:port` address first; anything else is treated as a filesystem path
/// for an `AF_UNIX` socket (an existing file at that path is removed first,
/// the same way a Unix-domain server conventionally reclaims its path).
pub fn bind_trace_listener(spec: &str) -> Result<RawFd> {
    match spec.parse::<SocketAddr>() {
        Ok(addr) => bind_tcp(addr),
        Err(_) => bind_unix(Path::new(spec)),
    }
}

fn raw_socket(domain: i32) -> Result<RawFd> {
    let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    set_nonblocking(fd)?;
    Ok(fd)
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

fn finish_listener(fd: RawFd) -> Result<RawFd> {
    let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
    if rc < 0 {
        let err = Error::Io(std::io::Error::last_os_error());
        unsafe { libc::close(fd) };
        return Err(err);
    }
    Ok(fd)
}

fn bind_unix(path: &Path) -> Result<RawFd> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| Error::InvalidTraceAddress(path.display().to_string()))?;
    let bytes = c_path.as_bytes_with_nul();
    if bytes.len() > mem::size_of::<libc::sockaddr_un>().saturating_sub(mem::size_of::<libc::sa_family_t>()) {
        return Err(Error::InvalidTraceAddress(path.display().to_string()));
    }

    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, &b) in addr.sun_path.iter_mut().zip(bytes.iter()) {
        *dst = b as libc::c_char;
    }

    let fd = raw_socket(libc::AF_UNIX)?;
    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = Error::Io(std::io::Error::last_os_error());
        unsafe { libc::close(fd) };
        return Err(err);
    }
    finish_listener(fd)
}

fn bind_tcp(addr: SocketAddr) -> Result<RawFd> {
    match addr {
        SocketAddr::V4(v4) => {
            let fd = raw_socket(libc::AF_INET)?;
            let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
            sa.sin_family = libc::AF_INET as libc::sa_family_t;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            let rc = unsafe {
                libc::bind(
                    fd,
                    &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                let err = Error::Io(std::io::Error::last_os_error());
                unsafe { libc::close(fd) };
                return Err(err);
            }
            finish_listener(fd)
        }
        SocketAddr::V6(v6) => {
            let fd = raw_socket(libc::AF_INET6)?;
            let mut sa: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            let rc = unsafe {
                libc::bind(
                    fd,
                    &sa as *const libc::sockaddr_in6 as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                let err = Error::Io(std::io::Error::last_os_error());
                unsafe { libc::close(fd) };
                return Err(err);
            }
            finish_listener(fd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_listener_binds_nonblocking_and_not_cloexec() {
        let path = std::env::temp_dir().join(format!("teexec-test-{}.sock", unsafe { libc::getpid() }));
        let fd = bind_unix(&path).unwrap();

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);

        let fdflags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
        assert_eq!(fdflags & libc::FD_CLOEXEC, 0);

        unsafe { libc::close(fd) };
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rebinding_the_same_path_reclaims_a_stale_socket_file() {
        let path = std::env::temp_dir().join(format!("teexec-test-rebind-{}.sock", unsafe { libc::getpid() }));
        let first = bind_unix(&path).unwrap();
        unsafe { libc::close(first) };
        let second = bind_unix(&path).unwrap();
        unsafe { libc::close(second) };
        let _ = std::fs::remove_file(&path);
    }
}
