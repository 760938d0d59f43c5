//! Shared helper for the two interposition strategies (`hooks.rs` and
//! `macos.rs`): turns a raw `iovec` array plus the real call's "bytes
//! actually received" count into borrowed slices suitable for `tracev`.

use std::os::raw::c_int;
use std::slice;

/// # Safety
/// `iov` must point to `iovcnt.max(0)` valid, initialized `iovec` entries,
/// and their `iov_base` buffers must together hold at least
/// `total_received` readable bytes.
pub(crate) unsafe fn gather<'a>(
    iov: *const libc::iovec,
    iovcnt: c_int,
    total_received: usize,
) -> Vec<&'a [u8]> {
    let mut remaining = total_received;
    let mut chunks = Vec::with_capacity(iovcnt.max(0) as usize);
    for i in 0..iovcnt.max(0) {
        if remaining == 0 {
            break;
        }
        let v = &*iov.add(i as usize);
        let take = v.iov_len.min(remaining);
        chunks.push(slice::from_raw_parts(v.iov_base as *const u8, take));
        remaining -= take;
    }
    chunks
}
