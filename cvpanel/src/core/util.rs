use ahash::RandomState;
use std::any::Any;
use std::collections::{HashMap as StdHashMap, HashSet as StdHashSet};

pub type HashMap<K, V> = StdHashMap<K, V, RandomState>;
pub type HashSet<K> = StdHashSet<K, RandomState>;

/// Keeping values inside a range.
pub mod constrain {
    /// Clamp a value between min and max. Reversed bounds are normalized and
    /// NaN collapses to `min`.
    pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        if value.is_nan() {
            return lo;
        }
        value.clamp(lo, hi)
    }

    /// Folds `value` back into the range modulo its width. Used for
    /// phases: `wrap(1.2, 0.0, 1.0)` is `0.2`.
    pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
        if min == max {
            return min;
        }
        if value == max {
            return max;
        }

        let range = max - min;
        let value = value - min;

        let wrapped = value - (value / range).floor() * range;
        min + wrapped
    }
}

/// `t` = 0 yields `start`, `t` = 1 yields `end`. Not clamped.
pub fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + (end - start) * t
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_handles_reversed_bounds_and_nan() {
        assert_eq!(constrain::clamp(5.0, 10.0, 0.0), 5.0);
        assert_eq!(constrain::clamp(12.0, 10.0, 0.0), 10.0);
        assert_eq!(constrain::clamp(f32::NAN, 0.0, 127.0), 0.0);
    }

    #[test]
    fn wrap_enters_from_opposite_bound() {
        assert!((constrain::wrap(1.25, 0.0, 1.0) - 0.25).abs() < 1e-6);
        assert!((constrain::wrap(-0.25, 0.0, 1.0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn lerp_midpoint() {
        assert_eq!(lerp(0.0, 10.0, 0.5), 5.0);
    }
}
