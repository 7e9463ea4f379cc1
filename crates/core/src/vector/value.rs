//! Attribute values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// ISO-8601 date or date-time text
    Date(String),
}

impl AttributeValue {
    /// The empty-string value written into unmapped merged slots
    pub fn empty() -> Self {
        AttributeValue::String(String::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Hashable form used for raw-equality grouping.
    pub fn raw_key(&self) -> RawKey {
        match self {
            AttributeValue::Null => RawKey::Null,
            AttributeValue::Bool(b) => RawKey::Bool(*b),
            AttributeValue::Int(v) => RawKey::Int(*v),
            AttributeValue::Float(v) => RawKey::Float(canonical_bits(*v)),
            AttributeValue::String(s) => RawKey::String(s.clone()),
            AttributeValue::Date(s) => RawKey::Date(s.clone()),
        }
    }

    /// Raw equality: same variant and same value. Unlike `==`, NaN equals NaN.
    pub fn raw_eq(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Float(a), AttributeValue::Float(b)) => {
                canonical_bits(*a) == canonical_bits(*b)
            }
            _ => self == other,
        }
    }

    /// Display form with surrounding whitespace trimmed, as used in file names.
    pub fn display_trimmed(&self) -> String {
        self.to_string().trim().to_string()
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("NULL"),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(s) | AttributeValue::Date(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Hashable identity of an [`AttributeValue`] under raw equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(String),
    Date(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_equality_distinguishes_variants() {
        let int = AttributeValue::Int(1);
        let float = AttributeValue::Float(1.0);
        let text = AttributeValue::from("1");
        assert_eq!(int.to_string(), float.to_string());
        assert_eq!(int.to_string(), text.to_string());
        assert_ne!(int.raw_key(), float.raw_key());
        assert_ne!(int.raw_key(), text.raw_key());
        assert!(!int.raw_eq(&float));
    }

    #[test]
    fn test_raw_equality_for_floats() {
        let nan = AttributeValue::Float(f64::NAN);
        assert!(nan.raw_eq(&AttributeValue::Float(f64::NAN)));
        assert_eq!(nan.raw_key(), AttributeValue::Float(-f64::NAN).raw_key());
        assert!(AttributeValue::Float(0.0).raw_eq(&AttributeValue::Float(-0.0)));
    }

    #[test]
    fn test_whitespace_is_significant_for_raw_equality() {
        let a = AttributeValue::from("N");
        let b = AttributeValue::from(" N ");
        assert!(!a.raw_eq(&b));
        assert_eq!(a.display_trimmed(), b.display_trimmed());
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::Null.to_string(), "NULL");
        assert_eq!(AttributeValue::Float(2.5).to_string(), "2.5");
        assert_eq!(AttributeValue::empty().to_string(), "");
    }
}
