//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Multiply an angle in degrees by this to get radians.
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// Multiply an angle in radians by this to get degrees.
pub const RAD2DEG: f64 = 180.0 / std::f64::consts::PI;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Saturate a value symmetrically into `[-abs(limit), abs(limit)]`.
pub fn saturate<T>(value: T, limit: T) -> T
where
    T: Float
{
    let limit = limit.abs();
    clamp(&value, &-limit, &limit)
}

/// Overflow-safe euclidian norm of a vector.
///
/// The sum of squares is accumulated relative to the largest magnitude seen
/// so far, so vectors mixing very large and very small components neither
/// overflow nor lose the small components to underflow. Zero entries are
/// skipped, and an all-zero vector has a norm of zero.
pub fn scaled_norm<T>(values: &[T]) -> T
where
    T: Float
{
    let mut scale = T::zero();
    let mut ssq = T::one();
    let mut any_non_zero = false;

    for v in values.iter() {
        if *v == T::zero() {
            continue
        }

        let a = v.abs();

        if !any_non_zero {
            scale = a;
            any_non_zero = true;
        }
        else if scale < a {
            let b = scale / a;
            ssq = T::one() + ssq * b * b;
            scale = a;
        }
        else {
            let b = a / scale;
            ssq = ssq + b * b;
        }
    }

    if any_non_zero {
        scale * ssq.sqrt()
    }
    else {
        T::zero()
    }
}

/// Returns true if every pair of entries differs by no more than the matching
/// tolerance.
///
/// Entries whose `check` flag is false are ignored.
pub fn all_within_tol(
    goal: &[f64], 
    current: &[f64], 
    check: &[bool], 
    tol: &[f64]
) -> bool {
    for i in 0..goal.len().min(current.len()) {
        let checked = check.get(i).copied().unwrap_or(false);
        let t = tol.get(i).copied().unwrap_or(0.0).abs();

        if checked && (goal[i] - current[i]).abs() > t {
            return false
        }
    }

    true
}
