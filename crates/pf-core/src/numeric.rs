use crate::PfError;

/// Scalar type of every potential, flow and quantity.
pub type Real = f64;

/// Allowed drift of a set of volume fractions away from 1.0.
pub const FRACTION_TOLERANCE: Real = 1e-6;

/// Magnitudes below this are treated as exactly zero when cleaning up
/// transported amounts.
pub const ZERO_APPROX: Real = 1e-10;

/// Absolute and relative closeness bounds for [`nearly_equal`].
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

/// True when `a` and `b` agree within either bound. Equal infinities
/// agree; NaN agrees with nothing.
pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// Pass `v` through, or name it in a fatal `PfError::NonFinite`.
pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, PfError> {
    if v.is_finite() {
        return Ok(v);
    }
    Err(PfError::NonFinite { what, value: v })
}

/// Clamp `v` into `[lo, hi]`, reporting whether clamping happened.
pub fn clamp_reported(v: Real, lo: Real, hi: Real) -> (Real, bool) {
    let clamped = v.clamp(lo, hi);
    (clamped, clamped != v)
}
