//! Counter conversions backing `increment` / `decrement`.

use serde_json::Value;

/// A cache value that can be read and written as an integer counter.
pub trait Counter: Sized {
    /// Returns the integer view of the value, or None if it is not numeric.
    fn to_counter(&self) -> Option<i64>;

    /// Builds a value from a counter, or None if `n` does not fit.
    fn from_counter(n: i64) -> Option<Self>;
}

impl Counter for i64 {
    fn to_counter(&self) -> Option<i64> {
        Some(*self)
    }

    fn from_counter(n: i64) -> Option<Self> {
        Some(n)
    }
}

impl Counter for i32 {
    fn to_counter(&self) -> Option<i64> {
        Some(i64::from(*self))
    }

    fn from_counter(n: i64) -> Option<Self> {
        i32::try_from(n).ok()
    }
}

impl Counter for u64 {
    fn to_counter(&self) -> Option<i64> {
        i64::try_from(*self).ok()
    }

    fn from_counter(n: i64) -> Option<Self> {
        u64::try_from(n).ok()
    }
}

impl Counter for Value {
    fn to_counter(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            _ => None,
        }
    }

    fn from_counter(n: i64) -> Option<Self> {
        Some(Value::from(n))
    }
}
