//! Experience curve: reaching level `n` takes `floor(100 * n^1.5)` experience.
//!
//! The threshold is computed in integers as `isqrt(10_000 * n^3)`, which equals
//! `floor(100 * n * sqrt(n))` exactly and never touches floating point.

/// Highest level the calculator will report. Its threshold, about `2.8 * 10^16`, fits in
/// `u64`, so every experience total maps onto a level of the curve.
pub const MAX_LEVEL: u32 = u32::MAX;

/// Experience threshold for `level`. Levels below 1 are treated as 1.
pub fn exp_for_level(level: u32) -> u64 {
    let level = u128::from(level.max(1));
    let scaled = 10_000 * level * level * level;
    // 10^4 * (2^32)^3 fits in u128 and its square root fits in u64.
    isqrt(scaled) as u64
}

/// Largest level whose threshold is at most `exp`. Level 1 is the floor even though
/// its own threshold is 100.
pub fn level_from_exp(exp: u64) -> u32 {
    let (mut low, mut high) = (1u32, MAX_LEVEL);
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if exp_for_level(mid) <= exp {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // Newton iteration from an over-estimate converges monotonically downwards.
    let mut x = 1u128 << ((128 - n.leading_zeros()) / 2 + 1);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}
