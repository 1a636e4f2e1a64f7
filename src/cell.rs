//! The tagged-union primitive every property read or write flows through.

use crate::handle::Handle;

/// A single property value: exactly one of u64, f64, an owned string, or a
/// non-owning handle. Value-semantic: clone copies the string payload.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DataCell {
    U64(u64),
    F64(f64),
    Str(String),
    Handle(Handle),
}

impl DataCell {
    /// Resets to a zeroed u64, discarding whatever was previously stored.
    pub fn reset(&mut self) {
        *self = DataCell::U64(0);
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataCell::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataCell::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataCell::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            DataCell::Handle(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<u64> for DataCell {
    fn from(v: u64) -> Self {
        DataCell::U64(v)
    }
}

impl From<f64> for DataCell {
    fn from(v: f64) -> Self {
        DataCell::F64(v)
    }
}

impl From<String> for DataCell {
    fn from(v: String) -> Self {
        DataCell::Str(v)
    }
}

impl From<Handle> for DataCell {
    fn from(v: Handle) -> Self {
        DataCell::Handle(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_accessor_returns_none_not_panic() {
        let cell = DataCell::U64(42);
        assert_eq!(cell.as_u64(), Some(42));
        assert_eq!(cell.as_f64(), None);
        assert_eq!(cell.as_str(), None);
    }

    #[test]
    fn reset_discards_payload() {
        let mut cell = DataCell::Str("hello".to_owned());
        cell.reset();
        assert_eq!(cell, DataCell::U64(0));
    }
}
