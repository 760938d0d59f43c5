//! Direct-indexed client-fd -> (trace-fd, connection id) pairing table.
//!
//! Grounded on `original_source/src/trace.c`'s `fd_pair`/`fd_unpair`/
//! `fd_get_pair`/`fd_get_id`/`fd_multi`. The C version encodes "empty" as an
//! unsigned fd of 0 by storing `fd + 1` and treats the stored 0 as absence;
//! the public surface here keeps that bias internal and exposes
//! `Option<RawFd>` instead, since that is how absence is idiomatically
//! expressed in Rust.

use std::os::unix::io::RawFd;

pub(crate) const MIN_CAPACITY: usize = 1024;

#[derive(Clone, Copy)]
struct Entry {
    trace_fd_biased: u32,
    id: u32,
}

impl Entry {
    const EMPTY: Entry = Entry { trace_fd_biased: 0, id: 0 };

    fn trace_fd(&self) -> Option<RawFd> {
        if self.trace_fd_biased == 0 {
            None
        } else {
            Some((self.trace_fd_biased - 1) as RawFd)
        }
    }
}

pub(crate) struct PairTable {
    entries: Vec<Entry>,
}

impl PairTable {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get_pair(&self, client_fd: RawFd) -> Option<RawFd> {
        self.slot(client_fd).and_then(Entry::trace_fd)
    }

    pub(crate) fn get_id(&self, client_fd: RawFd) -> Option<u32> {
        self.slot(client_fd).filter(|e| e.trace_fd().is_some()).map(|e| e.id)
    }

    /// Records a pairing, growing the table if needed. `next_id` is the
    /// caller's monotonic id counter; it is advanced and never handed out as
    /// zero, so `get_id` returning `Some` is never ambiguous with "no id".
    pub(crate) fn pair(&mut self, client_fd: RawFd, trace_fd: RawFd, next_id: &mut u32) {
        debug_assert!(client_fd >= 0);
        let idx = client_fd as usize;
        if idx >= self.entries.len() {
            self.grow_to(idx);
        }
        *next_id = next_id.wrapping_add(1);
        if *next_id == 0 {
            *next_id = 1;
        }
        self.entries[idx] = Entry { trace_fd_biased: (trace_fd as u32).wrapping_add(1), id: *next_id };
    }

    pub(crate) fn unpair(&mut self, client_fd: RawFd) -> Option<RawFd> {
        if client_fd < 0 {
            return None;
        }
        let idx = client_fd as usize;
        let entry = self.entries.get_mut(idx)?;
        let trace_fd = entry.trace_fd();
        *entry = Entry::EMPTY;
        trace_fd
    }

    /// Round-robins from `*cursor` through the table looking for any paired
    /// entry, advancing `*cursor` past whatever it examined. Used when a
    /// multiplexed listener needs any live trace connection and the client
    /// fd that triggered the read isn't itself paired.
    pub(crate) fn scan_any(&self, cursor: &mut usize) -> Option<RawFd> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        for _ in 0..len {
            let idx = *cursor % len;
            *cursor = cursor.wrapping_add(1);
            if let Some(fd) = self.entries[idx].trace_fd() {
                return Some(fd);
            }
        }
        None
    }

    fn slot(&self, client_fd: RawFd) -> Option<&Entry> {
        if client_fd < 0 {
            return None;
        }
        self.entries.get(client_fd as usize)
    }

    fn grow_to(&mut self, at_least_index: usize) {
        let needed = at_least_index + 1;
        let size = needed.next_power_of_two().max(MIN_CAPACITY);
        self.entries.resize(size, Entry::EMPTY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_has_no_pairs() {
        let t = PairTable::new();
        assert_eq!(t.get_pair(3), None);
        assert_eq!(t.get_id(3), None);
    }

    #[test]
    fn pair_then_lookup_round_trips() {
        let mut t = PairTable::new();
        let mut next_id = 0u32;
        t.pair(5, 42, &mut next_id);
        assert_eq!(t.get_pair(5), Some(42));
        assert_eq!(t.get_id(5), Some(1));
        assert_eq!(next_id, 1);
    }

    #[test]
    fn unpair_clears_entry() {
        let mut t = PairTable::new();
        let mut next_id = 0u32;
        t.pair(5, 42, &mut next_id);
        assert_eq!(t.unpair(5), Some(42));
        assert_eq!(t.get_pair(5), None);
        assert_eq!(t.unpair(5), None);
    }

    #[test]
    fn growth_is_power_of_two_and_at_least_min_capacity() {
        let mut t = PairTable::new();
        let mut next_id = 0u32;
        t.pair(0, 1, &mut next_id);
        assert_eq!(t.capacity(), MIN_CAPACITY);

        t.pair(1024, 2, &mut next_id);
        assert_eq!(t.capacity(), 2048);
        assert_eq!(t.get_pair(1024), Some(2));
        // earlier entries survive growth
        assert_eq!(t.get_pair(0), Some(1));
    }

    #[test]
    fn trace_fd_zero_is_representable() {
        let mut t = PairTable::new();
        let mut next_id = 0u32;
        t.pair(7, 0, &mut next_id);
        assert_eq!(t.get_pair(7), Some(0));
    }

    #[test]
    fn id_counter_never_hands_out_zero_even_after_wrap() {
        let mut t = PairTable::new();
        let mut next_id = u32::MAX;
        t.pair(1, 10, &mut next_id);
        assert_eq!(next_id, 1);
        assert_eq!(t.get_id(1), Some(1));
    }

    #[test]
    fn scan_any_round_robins_and_advances_cursor() {
        let mut t = PairTable::new();
        let mut next_id = 0u32;
        t.pair(2, 20, &mut next_id);
        t.pair(9, 90, &mut next_id);
        let mut cursor = 0usize;
        let first = t.scan_any(&mut cursor).unwrap();
        assert!(first == 20 || first == 90);
        assert!(cursor > 0);
    }

    #[test]
    fn scan_any_on_all_empty_returns_none() {
        let mut t = PairTable::new();
        t.grow_to(10);
        let mut cursor = 0usize;
        assert_eq!(t.scan_any(&mut cursor), None);
    }
}
