//! Scatter/gather send of captured bytes to a paired trace fd.
//!
//! Grounded on `original_source/src/trace.c`'s `trace_copy`, which builds the
//! same two-iovec message (optional multiplex header + payload) and sends it
//! with one `sendmsg`. The outcome classification below is transcribed
//! directly from that function's `switch` on the `sendmsg` return value.

use std::io::Write as _;
use std::os::unix::io::RawFd;

/// Hard cap on the multiplex header; an overflow silently drops the header
/// and sends raw payload instead (the only realistic overflow path is a
/// huge `recvmmsg` flattening, which is tolerable to send unframed).
const HEADER_CAP: usize = 64;

/// Darwin has no `MSG_NOSIGNAL`; SIGPIPE suppression there comes from the
/// `SO_NOSIGPIPE` socket option instead, so the flag is simply a no-op bit
/// on that platform rather than something to set on the socket here.
#[cfg(target_os = "macos")]
const MSG_NOSIGNAL: libc::c_int = 0;
#[cfg(not(target_os = "macos"))]
const MSG_NOSIGNAL: libc::c_int = libc::MSG_NOSIGNAL;

pub(crate) enum SendOutcome {
    /// Full frame accepted by the kernel; pairing stays live.
    Ok,
    /// Consumer is gone, too slow, or the write desynchronized the stream;
    /// caller must unpair and close the trace fd.
    Lost,
}

/// Sends `payload` to `trace_fd`, framed with a `"@<id>#<len>\r\n"` header
/// when `id` is `Some` (multiplex mode). `id` is `None` in default mode.
pub(crate) fn send_copy(trace_fd: RawFd, id: Option<u32>, payload: &[u8]) -> SendOutcome {
    let mut header_buf = [0u8; HEADER_CAP];
    let header = id.and_then(|id| format_header(&mut header_buf, id, payload.len()));

    let mut iovecs = [libc::iovec { iov_base: std::ptr::null_mut(), iov_len: 0 }; 2];
    let mut iov_count = 0usize;
    let mut expected_len = 0usize;

    if let Some(header) = header {
        iovecs[iov_count] = libc::iovec { iov_base: header.as_ptr() as *mut _, iov_len: header.len() };
        iov_count += 1;
        expected_len += header.len();
    }
    iovecs[iov_count] = libc::iovec { iov_base: payload.as_ptr() as *mut _, iov_len: payload.len() };
    iov_count += 1;
    expected_len += payload.len();

    let msg = libc::msghdr {
        msg_name: std::ptr::null_mut(),
        msg_namelen: 0,
        msg_iov: iovecs.as_mut_ptr(),
        msg_iovlen: iov_count as _,
        msg_control: std::ptr::null_mut(),
        msg_controllen: 0,
        msg_flags: 0,
    };

    let n = unsafe { libc::sendmsg(trace_fd, &msg, MSG_NOSIGNAL | libc::MSG_DONTWAIT) };

    if n < 0 {
        // EAGAIN (slow consumer) and any other send error both drop the pairing.
        SendOutcome::Lost
    } else if n as usize == expected_len {
        SendOutcome::Ok
    } else {
        // n == 0 (consumer closed) or 0 < n < expected_len (partial write):
        // both are treated as a desynchronizing slow consumer.
        SendOutcome::Lost
    }
}

/// Writes the multiplex frame header into `buf`, returning `None` (caller
/// falls back to raw payload) if it would overflow `HEADER_CAP`.
fn format_header(buf: &mut [u8; HEADER_CAP], id: u32, payload_len: usize) -> Option<&[u8]> {
    let mut cursor: &mut [u8] = buf.as_mut_slice();
    let budget = cursor.len();
    write!(cursor, "@{}#{}\r\n", id, payload_len).ok()?;
    let written = budget - cursor.len();
    Some(&buf[..written])
}
