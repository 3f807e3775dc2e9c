#![forbid(unsafe_code)]

//! Operations over two sorted arrays.

use std::ops::Range;

use super::{LongRead, LongWrite};

/// Merges two sorted ranges into `out` starting at `out_start`, writing each
/// distinct value once. Returns the number of words written.
pub fn merge_arrays<O, A, B>(
    out: &mut O,
    out_start: u64,
    a: &A,
    a_range: Range<u64>,
    b: &B,
    b_range: Range<u64>,
) -> u64
where
    O: LongWrite + ?Sized,
    A: LongRead + ?Sized,
    B: LongRead + ?Sized,
{
    let mut pos = out_start;
    let mut last = None;
    let mut emit = |value: u64| {
        if last != Some(value) {
            out.set(pos, value);
            pos += 1;
            last = Some(value);
        }
    };

    let (mut ai, mut bi) = (a_range.start, b_range.start);
    while ai < a_range.end && bi < b_range.end {
        let (av, bv) = (a.get(ai), b.get(bi));
        if av < bv {
            emit(av);
            ai += 1;
        } else if bv < av {
            emit(bv);
            bi += 1;
        } else {
            emit(av);
            ai += 1;
            bi += 1;
        }
    }
    for i in ai..a_range.end {
        emit(a.get(i));
    }
    for i in bi..b_range.end {
        emit(b.get(i));
    }
    pos - out_start
}

/// Record-strided merge: records of `sz` words keyed on their first word.
/// When both inputs hold a key, the record from `a` is kept. Returns the
/// number of words written.
pub fn merge_arrays_n<O, A, B>(
    sz: u64,
    out: &mut O,
    out_start: u64,
    a: &A,
    a_range: Range<u64>,
    b: &B,
    b_range: Range<u64>,
) -> u64
where
    O: LongWrite + ?Sized,
    A: LongRead + ?Sized,
    B: LongRead + ?Sized,
{
    let mut pos = out_start;
    let mut last = None;
    let mut emit = |src: &dyn Fn(u64) -> u64, at: u64| {
        let key = src(at);
        if last != Some(key) {
            for i in 0..sz {
                out.set(pos + i, src(at + i));
            }
            pos += sz;
            last = Some(key);
        }
    };
    let read_a = |i: u64| a.get(i);
    let read_b = |i: u64| b.get(i);

    let (mut ai, mut bi) = (a_range.start, b_range.start);
    while ai < a_range.end && bi < b_range.end {
        let (av, bv) = (a.get(ai), b.get(bi));
        if av < bv {
            emit(&read_a, ai);
            ai += sz;
        } else if bv < av {
            emit(&read_b, bi);
            bi += sz;
        } else {
            emit(&read_a, ai);
            ai += sz;
            bi += sz;
        }
    }
    while ai < a_range.end {
        emit(&read_a, ai);
        ai += sz;
    }
    while bi < b_range.end {
        emit(&read_b, bi);
        bi += sz;
    }
    pos - out_start
}

/// Number of distinct values in the union of two sorted ranges; the exact
/// output length of [`merge_arrays`].
pub fn count_distinct_elements<A, B>(a: &A, a_range: Range<u64>, b: &B, b_range: Range<u64>) -> u64
where
    A: LongRead + ?Sized,
    B: LongRead + ?Sized,
{
    count_distinct_elements_n(1, a, a_range, b, b_range)
}

/// Number of distinct keys in the union of two sorted record ranges.
pub fn count_distinct_elements_n<A, B>(
    sz: u64,
    a: &A,
    a_range: Range<u64>,
    b: &B,
    b_range: Range<u64>,
) -> u64
where
    A: LongRead + ?Sized,
    B: LongRead + ?Sized,
{
    let mut count = 0u64;
    let mut last = None;
    let mut see = |key: u64| {
        if last != Some(key) {
            count += 1;
            last = Some(key);
        }
    };

    let (mut ai, mut bi) = (a_range.start, b_range.start);
    while ai < a_range.end && bi < b_range.end {
        let (av, bv) = (a.get(ai), b.get(bi));
        if av < bv {
            see(av);
            ai += sz;
        } else if bv < av {
            see(bv);
            bi += sz;
        } else {
            see(av);
            ai += sz;
            bi += sz;
        }
    }
    while ai < a_range.end {
        see(a.get(ai));
        ai += sz;
    }
    while bi < b_range.end {
        see(b.get(bi));
        bi += sz;
    }
    count
}
