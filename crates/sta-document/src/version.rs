//! Schema version numbers
//!
//! Migration versions are decimal numbers (`0.1`, `0.2`, ...) persisted as
//! plain JSON numbers. [`SchemaVersion`] wraps them with a total order so
//! steps can be sorted and compared without float pitfalls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Totally ordered schema version
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(f64);

impl SchemaVersion {
    /// Version zero, the floor of every world
    pub const ZERO: Self = Self(0.0);

    /// Wrap a raw version number
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// Raw version number
    #[inline]
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Whether this is version zero
    #[inline]
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    /// Read a stored version leniently
    ///
    /// Numbers and numeric strings are accepted. Zero, non-finite values and
    /// anything else read as "no version", matching how stamped records
    /// written by older releases are interpreted.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (raw.is_finite() && raw != 0.0).then_some(Self(raw))
    }

    /// JSON representation for persistence
    #[must_use]
    pub fn to_value(self) -> Value {
        serde_json::Number::from_f64(self.0).map_or(Value::Null, Value::Number)
    }

    fn normalized_bits(self) -> u64 {
        // -0.0 and 0.0 compare equal, so they must hash equal too
        if self.0 == 0.0 {
            0.0f64.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SchemaVersion {}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for SchemaVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_bits().hash(state);
    }
}

impl From<f64> for SchemaVersion {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
