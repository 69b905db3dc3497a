//! Eytzinger layout: the breadth-first array encoding of a complete binary
//! search tree. Laying a sorted array out this way lets a search walk node
//! `k -> 2k` / `2k+1` with no data-dependent branches beyond the terminal
//! comparison, touching at most `ceil(log2(n)+1)` cache lines.
//!
//! Free functions over a flat packed byte buffer (stride-sized slots), not
//! an intrusive container — see "Array Layouts for Comparison-Based
//! Searching" for the index arithmetic this mirrors.
//!
//! Node numbers are 1-indexed (the root is node 1); node `k` lives at
//! physical byte offset `(k - 1) * stride`.

use core::cmp::Ordering;

fn slot(buf: &[u8], k: usize, stride: usize) -> &[u8] {
    let start = (k - 1) * stride;
    &buf[start..start + stride]
}

fn slot_mut(buf: &mut [u8], k: usize, stride: usize) -> &mut [u8] {
    let start = (k - 1) * stride;
    &mut buf[start..start + stride]
}

/// Recursively copies `src` (`n` stride-sized slots, sorted ascending) into
/// `dst` in Eytzinger order. `dst` must be the same size as `src`.
pub(crate) fn build(src: &[u8], dst: &mut [u8], n: usize, stride: usize) {
    debug_assert_eq!(src.len(), n * stride);
    debug_assert_eq!(dst.len(), n * stride);
    let mut next = 0usize;
    build_rec(src, dst, n, stride, 1, &mut next);
    debug_assert_eq!(next, n);
}

fn build_rec(src: &[u8], dst: &mut [u8], n: usize, stride: usize, k: usize, next: &mut usize) {
    if k > n {
        return;
    }
    build_rec(src, dst, n, stride, 2 * k, next);
    let i = *next;
    *next += 1;
    slot_mut(dst, k, stride).copy_from_slice(slot(src, i + 1, stride));
    build_rec(src, dst, n, stride, 2 * k + 1, next);
}

/// Inverse of [`build`]: recovers ascending sorted order from an Eytzinger
/// buffer, appending each slot's bytes to `out` in order.
pub(crate) fn inorder_collect(buf: &[u8], n: usize, stride: usize, out: &mut alloc::vec::Vec<u8>) {
    inorder_rec(buf, n, stride, 1, out);
}

fn inorder_rec(buf: &[u8], n: usize, stride: usize, k: usize, out: &mut alloc::vec::Vec<u8>) {
    if k > n {
        return;
    }
    inorder_rec(buf, n, stride, 2 * k, out);
    out.extend_from_slice(slot(buf, k, stride));
    inorder_rec(buf, n, stride, 2 * k + 1, out);
}

/// Branch-light membership search: `probe` must already be zero-padded out
/// to `stride` bytes. Returns `true` iff some slot compares byte-equal.
pub(crate) fn contains(buf: &[u8], n: usize, stride: usize, probe: &[u8]) -> bool {
    debug_assert_eq!(probe.len(), stride);
    let mut k = 1usize;
    while k <= n {
        let candidate = slot(buf, k, stride);
        match candidate.cmp(probe) {
            Ordering::Equal => return true,
            Ordering::Less => k = 2 * k + 1,
            Ordering::Greater => k = 2 * k,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_sorted(entries: &[&[u8]], stride: usize) -> alloc::vec::Vec<u8> {
        let mut buf = alloc::vec![0u8; entries.len() * stride];
        for (i, e) in entries.iter().enumerate() {
            buf[i * stride..i * stride + e.len()].copy_from_slice(e);
        }
        buf
    }

    #[test]
    fn round_trips_through_build_and_inorder() {
        let stride = 3;
        let entries: &[&[u8]] = &[&[1, 0, 0], &[3, 0, 0], &[5, 0, 0], &[7, 0, 0], &[9, 0, 0]];
        let n = entries.len();
        let src = flat_sorted(entries, stride);

        let mut eytz = alloc::vec![0u8; n * stride];
        build(&src, &mut eytz, n, stride);

        let mut back = alloc::vec::Vec::new();
        inorder_collect(&eytz, n, stride, &mut back);
        assert_eq!(back, src);
    }

    #[test]
    fn finds_every_inserted_key() {
        let stride = 1;
        let keys: alloc::vec::Vec<u8> = (0..31).collect();
        let src: alloc::vec::Vec<u8> = keys.clone();
        let n = keys.len();
        let mut eytz = alloc::vec![0u8; n * stride];
        build(&src, &mut eytz, n, stride);

        for k in &keys {
            assert!(contains(&eytz, n, stride, &[*k]), "missing {k}");
        }
        assert!(!contains(&eytz, n, stride, &[31]));
        assert!(!contains(&eytz, n, stride, &[200]));
    }
}
