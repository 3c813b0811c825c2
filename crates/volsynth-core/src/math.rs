/// Map `x` from [lo, hi] onto [new_lo, new_hi] linearly.
///
/// A degenerate domain (`hi == lo`) maps every input to `new_lo`, so a
/// volume with a single cluster gets the minimum of the target range
/// instead of NaN.
pub fn linear_interp(x: f64, lo: f64, hi: f64, new_lo: f64, new_hi: f64) -> f64 {
    let span = hi - lo;
    if span == 0.0 {
        return new_lo;
    }
    (x - lo) * (new_hi - new_lo) / span + new_lo
}

/// Map `x` from [lo, hi] onto [new_lo, new_hi] through a power scale:
/// the domain is transformed by `sign(t)·|t|^exponent` before the linear
/// mapping. Monotone in `x` for any positive exponent.
pub fn power_interp(x: f64, lo: f64, hi: f64, new_lo: f64, new_hi: f64, exponent: f64) -> f64 {
    let raise = |t: f64| t.signum() * t.abs().powf(exponent);
    linear_interp(raise(x), raise(lo), raise(hi), new_lo, new_hi)
}

/// Sturges' rule: `⌈log2(n)⌉ + 1` bins for `n` samples. Zero samples gives
/// zero bins.
pub fn sturges(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let ceil_log2 = if n == 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    };
    ceil_log2 + 1
}

/// Wrap a hue into [0, 1).
pub fn wrap_unit(h: f64) -> f64 {
    let wrapped = h.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Draw `base + U(-range/2, range/2)` from a unit-interval sample.
pub fn jitter(base: f64, range: f64, unit: f64) -> f64 {
    base + unit * range - range / 2.0
}
