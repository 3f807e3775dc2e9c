#![forbid(unsafe_code)]

use super::{LongQueryBuffer, LongRead};

/// Ranges narrower than this are scanned linearly instead of bisected.
pub const LINEAR_SEARCH_CUTOFF: u64 = 32;

/// Encodes a miss whose insertion point is `insertion_point`.
#[inline]
pub fn encode_search_miss(insertion_point: u64) -> i64 {
    -1 - insertion_point as i64
}

/// Recovers the insertion point from a negative search result.
#[inline]
pub fn decode_search_miss(encoded: i64) -> u64 {
    debug_assert!(encoded < 0);
    (-1 - encoded) as u64
}

/// Searches and filters over sorted word sequences.
///
/// The `_n` variants treat the range as records of `sz` words keyed on their
/// first word; offsets they return are word offsets of a record start.
/// Results are the matching offset, or [`encode_search_miss`] of the
/// insertion point.
pub trait LongArraySearch: LongRead {
    /// Scans `[from, to)` for `key`.
    fn linear_search(&self, key: u64, from: u64, to: u64) -> i64 {
        self.linear_search_n(1, key, from, to)
    }

    /// Scans the records in `[from, to)` for `key`.
    fn linear_search_n(&self, sz: u64, key: u64, from: u64, to: u64) -> i64 {
        let mut pos = from;
        while pos < to {
            let value = self.get(pos);
            if value == key {
                return pos as i64;
            }
            if value > key {
                return encode_search_miss(pos);
            }
            pos += sz;
        }
        encode_search_miss(to)
    }

    /// Bisects `[from, to)` for `key`, finishing narrow ranges linearly.
    fn binary_search(&self, key: u64, from: u64, to: u64) -> i64 {
        self.binary_search_n(1, key, from, to)
    }

    /// Bisects the records in `[from, to)` for `key`.
    fn binary_search_n(&self, sz: u64, key: u64, from: u64, to: u64) -> i64 {
        let mut low = 0u64;
        let mut high = (to - from) / sz;
        while high - low >= LINEAR_SEARCH_CUTOFF {
            let mid = low + (high - low) / 2;
            let value = self.get(from + mid * sz);
            if value < key {
                low = mid + 1;
            } else if value > key {
                high = mid;
            } else {
                return (from + mid * sz) as i64;
            }
        }
        self.linear_search_n(sz, key, from + low * sz, from + high * sz)
    }

    /// First index in `[from, to)` holding a value `>= key`, or `to`.
    fn binary_search_upper_bound(&self, key: u64, from: u64, to: u64) -> u64 {
        let mut low = from;
        let mut high = to;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.get(mid) < key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    /// True when `[start, end)` is ascending.
    fn is_sorted(&self, start: u64, end: u64) -> bool {
        self.is_sorted_n(1, start, end)
    }

    /// True when the records in `[start, end)` are ascending on their keys.
    fn is_sorted_n(&self, sz: u64, start: u64, end: u64) -> bool {
        if end <= start + sz {
            return true;
        }
        let mut previous = self.get(start);
        let mut pos = start + sz;
        while pos < end {
            let value = self.get(pos);
            if value < previous {
                return false;
            }
            previous = value;
            pos += sz;
        }
        true
    }

    /// Keeps buffer values present in `[search_start, search_end)`, stopping
    /// at the first buffer value above `boundary` or when the range runs out.
    fn retain(&self, buffer: &mut LongQueryBuffer, boundary: u64, search_start: u64, search_end: u64) {
        self.retain_n(buffer, 1, boundary, search_start, search_end)
    }

    /// Record-strided form of [`LongArraySearch::retain`].
    fn retain_n(
        &self,
        buffer: &mut LongQueryBuffer,
        sz: u64,
        boundary: u64,
        search_start: u64,
        search_end: u64,
    ) {
        let mut pos = search_start;
        while pos < search_end && buffer.has_more() {
            let wanted = buffer.current_value();
            if wanted > boundary {
                break;
            }
            let present = self.get(pos);
            if wanted < present {
                buffer.reject_and_advance();
            } else if wanted == present {
                buffer.retain_and_advance();
            } else {
                pos += sz;
            }
        }
    }

    /// Drops buffer values present in `[search_start, search_end)`; the
    /// mirror image of [`LongArraySearch::retain`].
    fn reject(&self, buffer: &mut LongQueryBuffer, boundary: u64, search_start: u64, search_end: u64) {
        self.reject_n(buffer, 1, boundary, search_start, search_end)
    }

    /// Record-strided form of [`LongArraySearch::reject`].
    fn reject_n(
        &self,
        buffer: &mut LongQueryBuffer,
        sz: u64,
        boundary: u64,
        search_start: u64,
        search_end: u64,
    ) {
        let mut pos = search_start;
        while pos < search_end && buffer.has_more() {
            let wanted = buffer.current_value();
            if wanted > boundary {
                break;
            }
            let present = self.get(pos);
            if wanted < present {
                buffer.retain_and_advance();
            } else if wanted == present {
                buffer.reject_and_advance();
            } else {
                pos += sz;
            }
        }
    }
}

impl<T: LongRead + ?Sized> LongArraySearch for T {}
