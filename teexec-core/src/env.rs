//! Parsing for the `TEEXEC_INIT=<fd>:<mode>` variable the launcher sets
//! before `execve`.
//!
//! Grounded on `original_source/src/init.c`, which reads the same variable,
//! validates the fd against `getrlimit(RLIMIT_NOFILE)`, and otherwise leaves
//! the process uninstrumented on any parse failure rather than aborting —
//! a target run without the launcher (or with a stripped environment) must
//! behave exactly as if this library were never preloaded.

use std::os::unix::io::RawFd;

pub(crate) const MODE_DEBUG: u32 = 1 << 0;
pub(crate) const MODE_DEBUG_MORE: u32 = 1 << 1;
pub(crate) const MODE_MULTIPLEX: u32 = 1 << 2;

pub(crate) struct Init {
    pub(crate) listener_fd: RawFd,
    pub(crate) mode: u32,
}

/// Parses `TEEXEC_INIT`. Returns `None` if the variable is absent,
/// malformed, or names an fd outside `[0, getrlimit(RLIMIT_NOFILE))` —
/// any of which means the target was launched without (or with a broken)
/// teexec setup, and tracing must stay inert rather than guess.
pub(crate) fn parse_teexec_init() -> Option<Init> {
    let raw = std::env::var("TEEXEC_INIT").ok()?;
    let (fd_part, mode_part) = raw.split_once(':')?;
    let fd: RawFd = fd_part.parse().ok()?;
    let mode: u32 = mode_part.parse().ok()?;

    if fd < 0 || fd as u64 >= max_fd_limit() {
        return None;
    }

    Some(Init { listener_fd: fd, mode })
}

fn max_fd_limit() -> u64 {
    let mut lim = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) };
    if rc != 0 {
        return RawFd::MAX as u64;
    }
    lim.rlim_max
}

#[cfg(test)]
mod tests {
    use super::*;

    // `std::env` is process-global; run every case in one test so cargo's
    // parallel test threads can't interleave sets/removes of the same var.
    #[test]
    fn teexec_init_parsing() {
        std::env::remove_var("TEEXEC_INIT");
        assert!(parse_teexec_init().is_none());

        std::env::set_var("TEEXEC_INIT", "not-a-pair");
        assert!(parse_teexec_init().is_none());

        std::env::set_var("TEEXEC_INIT", "-1:0");
        assert!(parse_teexec_init().is_none());

        std::env::set_var("TEEXEC_INIT", "3:5");
        let init = parse_teexec_init().unwrap();
        assert_eq!(init.listener_fd, 3);
        assert_eq!(init.mode, 5);

        std::env::remove_var("TEEXEC_INIT");
    }
}
