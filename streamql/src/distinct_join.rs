//! Nested-loop-style join over two distinct-table synopses (`spec.md`
//! §4.7), grounded on the original sandbox's `distinct_join.bpf.h`:
//! count-first (to pre-size the output), then a second pass to materialize.
//!
//! Per `spec.md` §9 Open Question #4, the traversal always iterates the
//! left side; no cardinality probe selects the smaller side.

use std::hash::Hash;

use crate::distinct::Distinct;

/// Counts how many `(left, right)` pairs share a key, for pre-sizing an
/// output buffer before [`materialize`].
pub fn count<K, L, R, const NL: usize, const NR: usize>(
    left: &Distinct<K, L, NL>,
    right: &Distinct<K, R, NR>,
) -> usize
where
    K: Copy + Eq + Hash,
    L: Copy,
    R: Copy,
{
    left.iter().filter(|(k, _)| right.contains_key(k)).count()
}

/// Materializes every matching `(left, right)` pair via `compose`, writing
/// up to `out.len()` results. Returns the number written and whether the
/// join had more matches than fit (truncation, logged by the caller).
pub fn materialize<K, L, R, Out, const NL: usize, const NR: usize>(
    left: &Distinct<K, L, NL>,
    right: &Distinct<K, R, NR>,
    compose: impl Fn(&L, &R) -> Out,
    out: &mut [Out],
) -> (usize, bool)
where
    K: Copy + Eq + Hash,
    L: Copy,
    R: Copy,
{
    let mut n = 0;
    let mut truncated = false;
    for (k, l) in left.iter() {
        if let Some(r) = right.get(k) {
            if n >= out.len() {
                truncated = true;
                break;
            }
            out[n] = compose(l, r);
            n += 1;
        }
    }
    (n, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_matches_materialize_cardinality_up_to_truncation() {
        let mut left: Distinct<u32, char, 8> = Distinct::new();
        let mut right: Distinct<u32, u8, 8> = Distinct::new();
        for (k, c) in [(1, 'a'), (2, 'b'), (3, 'c')] {
            left.insert(k, c).unwrap();
        }
        for (k, v) in [(1, 10u8), (3, 30)] {
            right.insert(k, v).unwrap();
        }
        let n = count(&left, &right);
        assert_eq!(n, 2);

        let mut out = vec![(' ', 0u8); n];
        let (written, truncated) = materialize(&left, &right, |l, r| (*l, *r), &mut out);
        assert_eq!(written, n);
        assert!(!truncated);

        let mut small = vec![(' ', 0u8); 1];
        let (written, truncated) = materialize(&left, &right, |l, r| (*l, *r), &mut small);
        assert_eq!(written, 1);
        assert!(truncated);
    }

    #[test]
    fn single_row_scenario_from_spec() {
        // scenario #4: one distinct row per side, joined on pid = 7.
        let mut left: Distinct<i32, (i32, u64), 8> = Distinct::new();
        let mut right: Distinct<i32, (i32, u64), 8> = Distinct::new();
        left.insert(7, (7, 100)).unwrap(); // (pid, pfn)
        right.insert(7, (7, 3)).unwrap(); // (pid, fd)
        assert_eq!(count(&left, &right), 1);
        let mut out = vec![((0, 0), (0, 0)); 1];
        let (written, truncated) = materialize(&left, &right, |l, r| (*l, *r), &mut out);
        assert_eq!(written, 1);
        assert!(!truncated);
        assert_eq!(out[0], ((7, 100), (7, 3)));
    }
}
