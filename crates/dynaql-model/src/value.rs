//! Typed values exchanged with the storage backend.
//!
//! [`Value`] is a tagged union where exactly one variant is present. The JSON
//! wire format uses single-key objects like `{"S": "hello"}`. Numbers are
//! backed by [`Number`], which keeps integers exact and falls back to an
//! arbitrary-precision decimal, never a binary float, so the textual
//! representation sent to the backend matches what was parsed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An item represented as a map of attribute names to values.
pub type Item = HashMap<String, Value>;

/// A primary key represented as a map of key attribute names to values.
pub type Key = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by value conversions and arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// A numeric literal could not be parsed.
    #[error("invalid number: '{text}'")]
    InvalidNumber {
        /// The offending literal text.
        text: String,
    },
    /// An arithmetic operation was applied to incompatible operands.
    #[error("cannot apply '{op}' to {left} and {right}")]
    InvalidArithmetic {
        /// The operator.
        op: char,
        /// Type descriptor of the left operand.
        left: &'static str,
        /// Type descriptor of the right operand.
        right: &'static str,
    },
    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------------

/// An exact numeric value.
///
/// Integers stay `i64` so counters round-trip exactly; anything with a
/// fractional part, an exponent, or beyond `i64` range is held as a
/// [`Decimal`]. Arithmetic promotes to decimal when either side requires it
/// or when an integer operation would overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Number {
    /// An exact integer.
    Int(i64),
    /// An arbitrary-precision decimal.
    Decimal(Decimal),
}

impl Number {
    /// Parse a numeric literal. Text without a `.` or exponent parses as an
    /// integer (decimal fallback on overflow); everything else parses as a
    /// decimal.
    pub fn parse(text: &str) -> Result<Self, ValueError> {
        let looks_integral = !text.contains('.') && !text.contains(['e', 'E']);
        if looks_integral {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Self::Int(n));
            }
        }
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map(Self::Decimal)
            .map_err(|_| ValueError::InvalidNumber {
                text: text.to_owned(),
            })
    }

    /// This number as a decimal.
    #[must_use]
    pub fn as_decimal(&self) -> Decimal {
        match self {
            Self::Int(n) => Decimal::from(*n),
            Self::Decimal(d) => *d,
        }
    }

    /// Returns the integer value if this number is integral.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Decimal(d) => {
                if d.fract().is_zero() {
                    d.to_i64()
                } else {
                    None
                }
            }
        }
    }

    /// Add two numbers, promoting to decimal on overflow.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        if let (Self::Int(a), Self::Int(b)) = (self, other) {
            if let Some(sum) = a.checked_add(*b) {
                return Self::Int(sum);
            }
        }
        Self::Decimal(self.as_decimal() + other.as_decimal()).normalized()
    }

    /// Subtract `other` from this number.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        if let (Self::Int(a), Self::Int(b)) = (self, other) {
            if let Some(diff) = a.checked_sub(*b) {
                return Self::Int(diff);
            }
        }
        Self::Decimal(self.as_decimal() - other.as_decimal()).normalized()
    }

    /// Multiply two numbers.
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        if let (Self::Int(a), Self::Int(b)) = (self, other) {
            if let Some(prod) = a.checked_mul(*b) {
                return Self::Int(prod);
            }
        }
        Self::Decimal(self.as_decimal() * other.as_decimal()).normalized()
    }

    /// Divide this number by `other`.
    pub fn div(&self, other: &Self) -> Result<Self, ValueError> {
        let divisor = other.as_decimal();
        if divisor.is_zero() {
            return Err(ValueError::DivisionByZero);
        }
        Ok(Self::Decimal(self.as_decimal() / divisor).normalized())
    }

    /// Negate this number.
    #[must_use]
    pub fn neg(&self) -> Self {
        match self {
            Self::Int(n) => n.checked_neg().map_or_else(
                || Self::Decimal(-Decimal::from(*n)),
                Self::Int,
            ),
            Self::Decimal(d) => Self::Decimal(-d),
        }
    }

    /// Collapse a decimal back to an integer when it has no fractional part
    /// and fits, so `2.5 * 2` renders as `5` rather than `5.0`.
    #[must_use]
    fn normalized(self) -> Self {
        match self {
            Self::Decimal(d) if d.fract().is_zero() => {
                d.to_i64().map_or(Self::Decimal(d), Self::Int)
            }
            other => other,
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            _ => self.as_decimal().cmp(&other.as_decimal()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{}", d.normalize()),
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<Decimal> for Number {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d).normalized()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A storage value.
///
/// Represented as a tagged union where exactly one variant is present.
/// Set variants keep their elements in insertion order; set semantics
/// (membership, union, difference) are applied by the update machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value.
    S(String),
    /// Number value.
    N(Number),
    /// Binary value (base64-encoded in JSON).
    B(bytes::Bytes),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null,
    /// String set.
    Ss(Vec<String>),
    /// Number set.
    Ns(Vec<Number>),
    /// Binary set.
    Bs(Vec<bytes::Bytes>),
    /// List of values.
    L(Vec<Value>),
    /// Map of values.
    M(HashMap<String, Value>),
}

impl Value {
    /// Returns `true` if this is the null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is any of the three set variants.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Ss(_) | Self::Ns(_) | Self::Bs(_))
    }

    /// Returns the string if this is an `S` variant.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is an `N` variant.
    #[must_use]
    pub fn as_n(&self) -> Option<&Number> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool` variant.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the type descriptor string used by `attribute_type()`
    /// (e.g. "S", "N", "BOOL").
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Coerce this value into a singleton set of the matching element type.
    /// Values that are already sets are returned unchanged; values that have
    /// no set form (bool, null, list, map) return `None`.
    #[must_use]
    pub fn into_set(self) -> Option<Value> {
        match self {
            Self::Ss(_) | Self::Ns(_) | Self::Bs(_) => Some(self),
            Self::S(s) => Some(Self::Ss(vec![s])),
            Self::N(n) => Some(Self::Ns(vec![n])),
            Self::B(b) => Some(Self::Bs(vec![b])),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "'{s}'"),
            Self::N(n) => write!(f, "{n}"),
            Self::B(b) => write!(f, "b'{} bytes'", b.len()),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Null => write!(f, "NULL"),
            Self::Ss(v) => {
                write!(f, "(")?;
                for (i, s) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{s}'")?;
                }
                write!(f, ")")
            }
            Self::Ns(v) => {
                write!(f, "(")?;
                for (i, n) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n}")?;
                }
                write!(f, ")")
            }
            Self::Bs(v) => write!(f, "({} binary items)", v.len()),
            Self::L(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::M(m) => {
                let mut keys: Vec<_> = m.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{k}': {}", m[*k])?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::S(s.to_owned())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::N(Number::Int(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Serde (single-key tagged wire shape)
// ---------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        let b64 = &base64::engine::general_purpose::STANDARD;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::S(s) => map.serialize_entry("S", s)?,
            Self::N(n) => map.serialize_entry("N", &n.to_string())?,
            Self::B(b) => map.serialize_entry("B", &b64.encode(b))?,
            Self::Bool(b) => map.serialize_entry("BOOL", b)?,
            Self::Null => map.serialize_entry("NULL", &true)?,
            Self::Ss(v) => map.serialize_entry("SS", v)?,
            Self::Ns(v) => {
                let encoded: Vec<String> = v.iter().map(ToString::to_string).collect();
                map.serialize_entry("NS", &encoded)?;
            }
            Self::Bs(v) => {
                let encoded: Vec<String> = v.iter().map(|b| b64.encode(b)).collect();
                map.serialize_entry("BS", &encoded)?;
            }
            Self::L(list) => map.serialize_entry("L", list)?,
            Self::M(m) => map.serialize_entry("M", m)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a value object with exactly one type key")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        use base64::Engine;
        let b64 = &base64::engine::general_purpose::STANDARD;

        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom("value must have exactly one type key"));
        };

        let parse_number = |text: String| {
            Number::parse(&text).map_err(|e| de::Error::custom(e.to_string()))
        };

        let value = match key.as_str() {
            "S" => Value::S(map.next_value()?),
            "N" => Value::N(parse_number(map.next_value()?)?),
            "B" => {
                let encoded: String = map.next_value()?;
                let decoded = b64.decode(&encoded).map_err(de::Error::custom)?;
                Value::B(bytes::Bytes::from(decoded))
            }
            "BOOL" => Value::Bool(map.next_value()?),
            "NULL" => {
                let _: bool = map.next_value()?;
                Value::Null
            }
            "SS" => Value::Ss(map.next_value()?),
            "NS" => {
                let encoded: Vec<String> = map.next_value()?;
                let decoded: Result<Vec<Number>, _> =
                    encoded.into_iter().map(parse_number).collect();
                Value::Ns(decoded?)
            }
            "BS" => {
                let encoded: Vec<String> = map.next_value()?;
                let decoded: Result<Vec<bytes::Bytes>, _> = encoded
                    .iter()
                    .map(|e| b64.decode(e).map(bytes::Bytes::from))
                    .collect();
                Value::Bs(decoded.map_err(de::Error::custom)?)
            }
            "L" => Value::L(map.next_value()?),
            "M" => Value::M(map.next_value()?),
            other => {
                return Err(de::Error::unknown_field(
                    other,
                    &["S", "N", "B", "BOOL", "NULL", "SS", "NS", "BS", "L", "M"],
                ));
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_integer_literal() {
        assert_eq!(Number::parse("42").unwrap(), Number::Int(42));
        assert_eq!(Number::parse("-7").unwrap(), Number::Int(-7));
    }

    #[test]
    fn test_should_parse_decimal_literal() {
        let n = Number::parse("3.25").unwrap();
        assert!(matches!(n, Number::Decimal(_)));
        assert_eq!(n.to_string(), "3.25");
    }

    #[test]
    fn test_should_fall_back_to_decimal_on_i64_overflow() {
        let n = Number::parse("99999999999999999999").unwrap();
        assert!(matches!(n, Number::Decimal(_)));
    }

    #[test]
    fn test_should_reject_garbage_number() {
        assert!(Number::parse("12abc").is_err());
    }

    #[test]
    fn test_should_add_integers_exactly() {
        let sum = Number::Int(40).add(&Number::Int(2));
        assert_eq!(sum, Number::Int(42));
    }

    #[test]
    fn test_should_promote_on_integer_overflow() {
        let sum = Number::Int(i64::MAX).add(&Number::Int(1));
        assert!(matches!(sum, Number::Decimal(_)));
    }

    #[test]
    fn test_should_normalize_integral_decimal_results() {
        let prod = Number::parse("2.5").unwrap().mul(&Number::Int(2));
        assert_eq!(prod, Number::Int(5));
    }

    #[test]
    fn test_should_error_on_division_by_zero() {
        let result = Number::Int(1).div(&Number::Int(0));
        assert!(matches!(result, Err(ValueError::DivisionByZero)));
    }

    #[test]
    fn test_should_order_mixed_numbers() {
        let half = Number::parse("0.5").unwrap();
        assert!(Number::Int(0) < half);
        assert!(half < Number::Int(1));
    }

    #[test]
    fn test_should_serialize_number_as_string() {
        let val = Value::N(Number::Int(42));
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"N":"42"}"#);
    }

    #[test]
    fn test_should_serialize_null_with_flag() {
        let json = serde_json::to_string(&Value::Null).unwrap();
        assert_eq!(json, r#"{"NULL":true}"#);
    }

    #[test]
    fn test_should_roundtrip_binary_value() {
        let val = Value::B(bytes::Bytes::from_static(b"raw data"));
        let json = serde_json::to_string(&val).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val, parsed);
    }

    #[test]
    fn test_should_roundtrip_number_set() {
        let val = Value::Ns(vec![Number::Int(1), Number::parse("2.5").unwrap()]);
        let json = serde_json::to_string(&val).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val, parsed);
    }

    #[test]
    fn test_should_coerce_scalar_into_singleton_set() {
        assert_eq!(
            Value::S("a".to_owned()).into_set(),
            Some(Value::Ss(vec!["a".to_owned()]))
        );
        assert_eq!(
            Value::from(3).into_set(),
            Some(Value::Ns(vec![Number::Int(3)]))
        );
        assert_eq!(Value::Bool(true).into_set(), None);
    }

    #[test]
    fn test_should_report_type_descriptors() {
        assert_eq!(Value::from("x").type_descriptor(), "S");
        assert_eq!(Value::from(1).type_descriptor(), "N");
        assert_eq!(Value::Null.type_descriptor(), "NULL");
        assert_eq!(Value::Ss(vec![]).type_descriptor(), "SS");
    }

    #[test]
    fn test_should_display_values_in_literal_syntax() {
        assert_eq!(Value::from("green").to_string(), "'green'");
        assert_eq!(Value::from(7).to_string(), "7");
        assert_eq!(
            Value::Ns(vec![Number::Int(1), Number::Int(2)]).to_string(),
            "(1, 2)"
        );
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
