//! Tracing core loaded into a target process via `LD_PRELOAD` /
//! `DYLD_INSERT_LIBRARIES`.
//!
//! This crate builds both as a `cdylib` (the thing the dynamic loader
//! preloads) and as an `rlib`, so the pairing table, reclaim ring and copy
//! engine can be unit tested in-process without actually interposing on a
//! running program, in the spirit of `rpc_protocol`'s `pipe` test module
//! feeding a real `socketpair` through otherwise-private logic.
//!
//! Process-wide state is deliberately a single `OnceLock<Mutex<TraceState>>`
//! rather than a C `__attribute__((constructor))` — see `resolve.rs` for why
//! lazy `OnceLock` initialization stands in for the original's load-time
//! constructors throughout this crate.

mod debug;
use debug::debug;

mod bypass;
mod copy;
mod env;
#[cfg(not(target_os = "macos"))]
mod hooks;
mod iovec;
#[cfg(target_os = "macos")]
mod macos;
mod resolve;
mod ring;
mod table;

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use ring::ReclaimRing;
use table::PairTable;

const MODE_DEBUG: u32 = env::MODE_DEBUG;
const MODE_DEBUG_MORE: u32 = env::MODE_DEBUG_MORE;
const MODE_MULTIPLEX: u32 = env::MODE_MULTIPLEX;

/// Cheap, lock-free mirror of `TraceState::mode`. Lets a hook decide "is the
/// tracer configured at all" before paying for the mutex.
static MODE: AtomicU32 = AtomicU32::new(0);

struct TraceState {
    listener_fd: RawFd,
    max_fd: RawFd,
    table: PairTable,
    ring: ReclaimRing,
    next_id: u32,
    scan_cursor: usize,
}

impl TraceState {
    fn uninitialized() -> Self {
        Self {
            listener_fd: -1,
            max_fd: RawFd::MAX,
            table: PairTable::new(),
            ring: ReclaimRing::new(),
            next_id: 0,
            scan_cursor: 0,
        }
    }

    fn from_env() -> Self {
        let mut state = Self::uninitialized();
        let Some(init) = env::parse_teexec_init() else {
            return state;
        };

        if init.mode & MODE_DEBUG != 0 {
            debug::enable();
        }
        if init.mode & MODE_DEBUG_MORE != 0 {
            debug::enable_more();
        }
        state.listener_fd = init.listener_fd;
        state.max_fd = max_fd_limit();
        MODE.store(init.mode, Ordering::Relaxed);
        debug!("teexec core initialized: listener_fd={} mode={:#x}", init.listener_fd, init.mode);
        state
    }

    fn multiplexed(&self) -> bool {
        MODE.load(Ordering::Relaxed) & MODE_MULTIPLEX != 0
    }

    fn configured(&self) -> bool {
        self.listener_fd >= 0
    }
}

fn max_fd_limit() -> RawFd {
    let mut lim = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) };
    if rc != 0 {
        return RawFd::MAX;
    }
    lim.rlim_max.min(RawFd::MAX as u64) as RawFd
}

static STATE: OnceLock<Mutex<TraceState>> = OnceLock::new();

fn state() -> MutexGuard<'static, TraceState> {
    STATE
        .get_or_init(|| Mutex::new(TraceState::from_env()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Quick, lock-free check so hot-path hooks can skip entirely when nothing
/// is configured and debug output is off — the only state a hook needs to
/// inspect without the mutex.
#[inline]
fn quick_inert_check() -> bool {
    MODE.load(Ordering::Relaxed) == 0 && !debug::enabled()
}

/// Called on `accept`/`accept4` success. `_server_fd` is part of the
/// contract for future filtering by listening socket; unused today.
fn trace_start(client_fd: RawFd, _server_fd: RawFd) {
    let mut st = state();
    trace_start_locked(&mut st, client_fd);
}

fn trace_start_locked(st: &mut TraceState, client_fd: RawFd) {
    if client_fd < 0 || !st.configured() || client_fd > st.max_fd {
        return;
    }

    let mut trace_fd = st.ring.pop_writable();
    if trace_fd.is_none() {
        let fd = bypass::xaccept(st.listener_fd);
        if fd >= 0 {
            trace_fd = Some(fd);
        }
    }
    if trace_fd.is_none() && st.multiplexed() {
        trace_fd = st.table.scan_any(&mut st.scan_cursor);
    }

    if let Some(trace_fd) = trace_fd {
        let mut next_id = st.next_id;
        st.table.pair(client_fd, trace_fd, &mut next_id);
        st.next_id = next_id;
        debug!("trace_start: client={} trace_fd={}", client_fd, trace_fd);
    }
}

/// Called as `close`'s pre-hook, before the real `close` runs.
fn trace_stop(client_fd: RawFd) {
    let mut st = state();
    trace_stop_locked(&mut st, client_fd);
}

fn trace_stop_locked(st: &mut TraceState, client_fd: RawFd) {
    if client_fd < 0 {
        return;
    }
    let Some(id) = st.table.get_id(client_fd) else {
        return;
    };
    if let Some(trace_fd) = st.table.get_pair(client_fd) {
        if st.multiplexed() {
            let _ = copy::send_copy(trace_fd, Some(id), &[]);
        }
    }
    release_pairing(st, client_fd, false);
}

/// Copies one already-completed read's worth of bytes to the paired
/// consumer. No-op if `buf` is empty or `client_fd` isn't paired.
fn trace(client_fd: RawFd, buf: &[u8]) {
    let mut st = state();
    trace_locked(&mut st, client_fd, buf);
}

fn trace_locked(st: &mut TraceState, client_fd: RawFd, buf: &[u8]) {
    if buf.is_empty() || client_fd < 0 {
        return;
    }
    let Some(id) = st.table.get_id(client_fd) else {
        return;
    };
    let trace_fd = st.table.get_pair(client_fd).expect("id implies a live pairing");
    let multiplexed = st.multiplexed();
    let outcome = copy::send_copy(trace_fd, if multiplexed { Some(id) } else { None }, buf);
    if matches!(outcome, copy::SendOutcome::Lost) {
        release_pairing(st, client_fd, true);
    }
}

/// Same as `trace`, but for the scatter/gather read family (`readv`,
/// `recvmsg`, flattened `recvmmsg`). `iov` is the data actually read, in
/// order; concatenation order matters, total length does not need to be
/// precomputed by the caller.
fn tracev(client_fd: RawFd, iov: &[&[u8]]) {
    let mut st = state();
    tracev_locked(&mut st, client_fd, iov);
}

fn tracev_locked(st: &mut TraceState, client_fd: RawFd, iov: &[&[u8]]) {
    if client_fd < 0 {
        return;
    }
    let total: usize = iov.iter().map(|b| b.len()).sum();
    if total == 0 {
        return;
    }
    let Some(id) = st.table.get_id(client_fd) else {
        return;
    };
    let trace_fd = st.table.get_pair(client_fd).expect("id implies a live pairing");
    let multiplexed = st.multiplexed();

    // send_copy wants one contiguous payload slice; readv/recvmsg results
    // are scattered across the caller's iovecs, so gather them here. This
    // is the one allocation on this path, bounded by what the target
    // itself already read into its own buffers this call.
    let mut gathered = Vec::with_capacity(total);
    for chunk in iov {
        gathered.extend_from_slice(chunk);
    }

    let outcome = copy::send_copy(trace_fd, if multiplexed { Some(id) } else { None }, &gathered);
    if matches!(outcome, copy::SendOutcome::Lost) {
        release_pairing(st, client_fd, true);
    }
}

fn release_pairing(st: &mut TraceState, client_fd: RawFd, eof: bool) {
    if let Some(trace_fd) = st.table.unpair(client_fd) {
        if eof || !st.ring.push(trace_fd) {
            bypass::xclose(trace_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
    use std::ffi::CString;
    use std::os::unix::io::IntoRawFd;

    fn fresh_state(listener_fd: RawFd) -> TraceState {
        TraceState {
            listener_fd,
            max_fd: RawFd::MAX,
            table: PairTable::new(),
            ring: ReclaimRing::new(),
            next_id: 0,
            scan_cursor: 0,
        }
    }

    fn connected_pair() -> (RawFd, RawFd) {
        let (a, b) =
            socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::SOCK_NONBLOCK).unwrap();
        (a.into_raw_fd(), b.into_raw_fd())
    }

    /// A harmless, never-dereferenced placeholder for `TraceState::listener_fd`
    /// in tests where the ring is expected to satisfy `trace_start` before
    /// `accept` would ever be tried on it.
    fn dummy_fd() -> RawFd {
        let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
        assert!(fd >= 0);
        fd
    }

    /// Binds a real `AF_UNIX` listener and connects a peer to it, leaving one
    /// pending connection in its accept queue so `trace_start`'s accept path
    /// can be exercised end to end.
    fn unix_listener_with_pending_connection() -> (RawFd, RawFd) {
        let path = std::env::temp_dir()
            .join(format!("teexec-core-lib-test-{}.sock", unsafe { libc::getpid() }));
        let _ = std::fs::remove_file(&path);
        let c_path = CString::new(path.as_os_str().as_encoded_bytes()).unwrap();
        let bytes = c_path.as_bytes_with_nul();

        let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
        for (dst, &b) in addr.sun_path.iter_mut().zip(bytes.iter()) {
            *dst = b as libc::c_char;
        }

        let listener = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
        assert!(listener >= 0);
        let rc = unsafe {
            libc::bind(
                listener,
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0);
        assert_eq!(unsafe { libc::listen(listener, 1) }, 0);

        let connector = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
        assert!(connector >= 0);
        let rc = unsafe {
            libc::connect(
                connector,
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0);

        let _ = std::fs::remove_file(&path);
        (listener, connector)
    }

    fn read_some(fd: RawFd, buf: &mut [u8]) -> usize {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        n.max(0) as usize
    }

    #[test]
    fn trace_start_reuses_a_ring_fd_before_accepting() {
        let (consumer, trace_fd) = connected_pair();
        let mut st = fresh_state(dummy_fd());
        st.ring.push(trace_fd);

        trace_start_locked(&mut st, 10);

        assert_eq!(st.table.get_pair(10), Some(trace_fd));
        assert_eq!(st.ring.occupied_count(), 0);

        trace_locked(&mut st, 10, b"hello");
        let mut buf = [0u8; 16];
        let n = read_some(consumer, &mut buf);
        assert_eq!(&buf[..n], b"hello");

        unsafe {
            libc::close(consumer);
        }
        unsafe { libc::close(st.listener_fd) };
    }

    #[test]
    fn trace_start_accepts_from_the_listener_when_the_ring_is_empty() {
        let (listener, connector) = unix_listener_with_pending_connection();
        let mut st = fresh_state(listener);

        trace_start_locked(&mut st, 11);

        let trace_fd = st.table.get_pair(11).expect("accept should have produced a pairing");
        assert!(trace_fd >= 0);

        unsafe {
            libc::close(connector);
            libc::close(listener);
        }
    }

    #[test]
    fn trace_stop_recycles_the_trace_fd_into_the_ring_in_default_mode() {
        let (consumer, trace_fd) = connected_pair();
        let mut st = fresh_state(dummy_fd());
        st.ring.push(trace_fd);
        trace_start_locked(&mut st, 12);

        trace_stop_locked(&mut st, 12);

        assert_eq!(st.table.get_pair(12), None);
        assert_eq!(st.ring.occupied_count(), 1);

        // default mode never sends a close marker
        let n = unsafe {
            let mut buf = [0u8; 16];
            libc::recv(consumer, buf.as_mut_ptr() as *mut _, buf.len(), libc::MSG_DONTWAIT)
        };
        assert!(n < 0);

        unsafe {
            libc::close(consumer);
            libc::close(st.listener_fd);
        }
    }

    #[test]
    fn release_pairing_closes_rather_than_recycles_a_lost_trace_fd() {
        let (consumer, trace_fd) = connected_pair();
        let mut st = fresh_state(dummy_fd());
        st.ring.push(trace_fd);
        trace_start_locked(&mut st, 13);
        // close the consumer so the next send is classified Lost
        unsafe { libc::close(consumer) };

        trace_locked(&mut st, 13, b"x");

        assert_eq!(st.table.get_pair(13), None);
        assert_eq!(st.ring.occupied_count(), 0);

        unsafe { libc::close(st.listener_fd) };
    }

    #[test]
    fn multiplex_mode_frames_trace_and_sends_a_close_marker_on_stop() {
        let (consumer, trace_fd) = connected_pair();
        let mut st = fresh_state(dummy_fd());
        st.ring.push(trace_fd);

        // MODE is process-global; this is the only test touching it, and it
        // restores the prior value before returning.
        let previous_mode = MODE.load(Ordering::Relaxed);
        MODE.store(MODE_MULTIPLEX, Ordering::Relaxed);

        trace_start_locked(&mut st, 14);
        let id = st.table.get_id(14).unwrap();
        tracev_locked(&mut st, 14, &[b"AB", b"CD"]);

        let mut buf = [0u8; 64];
        let n = read_some(consumer, &mut buf);
        assert_eq!(&buf[..n], format!("@{}#4\r\nABCD", id).as_bytes());

        trace_stop_locked(&mut st, 14);
        let n = read_some(consumer, &mut buf);
        assert_eq!(&buf[..n], format!("@{}#0\r\n", id).as_bytes());

        MODE.store(previous_mode, Ordering::Relaxed);
        unsafe {
            libc::close(consumer);
            libc::close(st.listener_fd);
        }
    }
}
