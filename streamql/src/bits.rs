//! Branchless integer bit-math: `log2` on 32/64-bit values and overflow-free
//! averaging of two signed 32-bit integers.
//!
//! Grounded on the `bcc`/`libbpf-tools` branchless `log2` used by the original
//! sandboxed implementation (`math.bpf.h`) — a shift-and-or reduction rather than
//! a loop, since the original environment has no `__builtin_clz` worth trusting
//! through the verifier. Kept in that shape here, rather than swapped for
//! `u32::leading_zeros`, since the shape is the point: every step is a compile-time
//! bounded, branch-free integer op.

/// Floor `log2` of a 32-bit value. Returns `0` for `v == 0` by convention (not
/// mathematically defined, but matches every caller's clamping behavior).
pub const fn log2_u32(v: u32) -> u32 {
    let r = ((v > 0xFFFF) as u32) << 4;
    let v = v >> r;
    let shift = ((v > 0xFF) as u32) << 3;
    let v = v >> shift;
    let r = r | shift;
    let shift = ((v > 0xF) as u32) << 2;
    let v = v >> shift;
    let r = r | shift;
    let shift = ((v > 0x3) as u32) << 1;
    let v = v >> shift;
    let r = r | shift;
    r | (v >> 1)
}

/// Floor `log2` of a 64-bit value, built from [`log2_u32`] on the high/low halves.
pub const fn log2_u64(v: u64) -> u32 {
    let hi = (v >> 32) as u32;
    if hi != 0 {
        32 + log2_u32(hi)
    } else {
        log2_u32(v as u32)
    }
}

/// Average of two signed 32-bit integers without intermediate overflow:
/// `(a & b) + ((a ^ b) >> 1)`.
pub const fn avg2(a: i32, b: i32) -> i32 {
    (a & b) + ((a ^ b) >> 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_u32_matches_naive() {
        fn naive(mut v: u32) -> u32 {
            if v == 0 {
                return 0;
            }
            let mut r = 0;
            while v > 1 {
                v >>= 1;
                r += 1;
            }
            r
        }
        for v in [0u32, 1, 2, 3, 4, 7, 8, 255, 256, 65535, 65536, u32::MAX] {
            assert_eq!(log2_u32(v), naive(v), "v={v}");
        }
    }

    #[test]
    fn log2_u64_spans_both_halves() {
        assert_eq!(log2_u64(0), 0);
        assert_eq!(log2_u64(1), 0);
        assert_eq!(log2_u64(1 << 40), 40);
        assert_eq!(log2_u64(u64::MAX), 63);
    }

    #[test]
    fn avg2_never_overflows_and_matches_checked_mean() {
        let pairs = [
            (i32::MAX, i32::MAX),
            (i32::MIN, i32::MIN),
            (i32::MAX, i32::MIN),
            (7, 3),
            (-7, 3),
            (0, 0),
        ];
        for (a, b) in pairs {
            let expected = ((a as i64 + b as i64) / 2) as i32;
            // avg2 rounds toward the bitwise-floor mean, which for the (even-sum)
            // cases above coincides with integer division; spot-check the formula
            // directly for the general case instead of the rounded mean.
            let got = avg2(a, b);
            let via_wide = (((a as i64) + (b as i64)) >> 1) as i32;
            assert_eq!(got, via_wide, "a={a} b={b} expected~{expected}");
        }
    }
}
