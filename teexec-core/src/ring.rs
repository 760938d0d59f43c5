//! Bounded reclaim ring for trace fds that have lost their client pairing.
//!
//! Grounded on `original_source/src/trace.c`'s `reuse[]`/`fd_trash`/
//! `fd_restore`, which poll a fixed 64-entry `pollfd` array built from the
//! `POLLFD_1`..`POLLFD_64` macro expansion. `libc::poll` with `timeout = 0`
//! gives the same non-blocking readiness check without the macro-generated
//! boilerplate.

use std::os::unix::io::RawFd;

use crate::bypass;

pub(crate) const CAPACITY: usize = 64;

pub(crate) struct ReclaimRing {
    slots: [RawFd; CAPACITY],
}

impl ReclaimRing {
    pub(crate) fn new() -> Self {
        Self { slots: [-1; CAPACITY] }
    }

    /// Stashes a trace fd that lost its client pairing. Returns `false` (and
    /// leaves the fd unowned by the ring) if every slot is occupied; the
    /// caller is expected to close it itself in that case.
    pub(crate) fn push(&mut self, fd: RawFd) -> bool {
        for slot in self.slots.iter_mut() {
            if *slot < 0 {
                *slot = fd;
                return true;
            }
        }
        false
    }

    /// Polls every occupied slot once. Slots that became unusable are closed
    /// and freed; the first slot observed writable is removed from the ring
    /// and handed back for reuse as a fresh pairing.
    pub(crate) fn pop_writable(&mut self) -> Option<RawFd> {
        let mut pfds: Vec<libc::pollfd> = self
            .slots
            .iter()
            .map(|&fd| libc::pollfd { fd, events: libc::POLLOUT, revents: 0 })
            .collect();

        let n = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, 0) };
        if n <= 0 {
            return None;
        }

        let mut reclaimed = None;
        for (slot, pfd) in self.slots.iter_mut().zip(pfds.iter()) {
            if *slot < 0 {
                continue;
            }
            if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                bypass::xclose(*slot);
                *slot = -1;
            } else if reclaimed.is_none() && pfd.revents & libc::POLLOUT != 0 {
                reclaimed = Some(*slot);
                *slot = -1;
            }
        }
        reclaimed
    }

    #[cfg(test)]
    pub(crate) fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|&&fd| fd >= 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
    use std::os::unix::io::{AsRawFd, IntoRawFd};

    #[test]
    fn push_fills_slots_then_reports_full() {
        let mut ring = ReclaimRing::new();
        let mut fds = Vec::new();
        for _ in 0..CAPACITY {
            let (a, b) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty()).unwrap();
            fds.push(b);
            assert!(ring.push(a.into_raw_fd()));
        }
        assert_eq!(ring.occupied_count(), CAPACITY);

        let (extra, _keep) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty()).unwrap();
        assert!(!ring.push(extra.into_raw_fd()));
    }

    #[test]
    fn pop_writable_returns_a_connected_socket() {
        let mut ring = ReclaimRing::new();
        let (a, b) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty()).unwrap();
        let a_fd = a.as_raw_fd();
        ring.push(a.into_raw_fd());
        let popped = ring.pop_writable();
        assert_eq!(popped, Some(a_fd));
        drop(b);
        unsafe { libc::close(a_fd) };
    }

    #[test]
    fn pop_writable_reclaims_closed_peer_slots() {
        let mut ring = ReclaimRing::new();
        let (a, b) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty()).unwrap();
        let a_fd = a.into_raw_fd();
        drop(b); // peer gone: `a` should show up as HUP, not writable-and-healthy
        ring.push(a_fd);
        // draining may take one poll to observe the hangup depending on platform timing,
        // but either the ring reclaims it as writable or the slot is closed outright.
        let _ = ring.pop_writable();
        assert!(ring.occupied_count() <= 1);
    }
}
