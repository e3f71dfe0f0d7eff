//! The evaluator's value model.
//!
//! A closed sum over the types expressions can produce. Booleans are an
//! illusion: the engine likes `-1` for true and `0` for false, so logical
//! results are LONG values. The kind ordering matters: numeric promotion
//! picks the "larger" of two kinds, with `Long < Double < BigDec`.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use num_traits::{ToPrimitive, Zero};

use crate::number;
use crate::temporal::Temporal;
use crate::{EvalError, Result};

/// Type tag for a [`Value`]. The declaration order defines promotion
/// precedence and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    Null,
    Text,
    Date,
    Time,
    DateTime,
    Long,
    Double,
    BigDec,
}

impl ValueKind {
    pub fn is_temporal(self) -> bool {
        matches!(self, ValueKind::Date | ValueKind::Time | ValueKind::DateTime)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double | ValueKind::BigDec)
    }

    pub fn is_integral(self) -> bool {
        self == ValueKind::Long
    }

    /// The numeric kind a value of this kind becomes under general math.
    pub(crate) fn preferred_numeric_type(self) -> ValueKind {
        match self {
            ValueKind::Date | ValueKind::Time | ValueKind::DateTime => ValueKind::Double,
            other => other,
        }
    }

    /// The floating-point kind this kind widens to.
    pub(crate) fn preferred_fp_type(self) -> ValueKind {
        match self {
            ValueKind::BigDec => ValueKind::BigDec,
            _ => ValueKind::Double,
        }
    }
}

/// An immutable expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Date(Temporal),
    Time(Temporal),
    DateTime(Temporal),
    Long(i32),
    Double(f64),
    BigDec(BigDecimal),
}

/// True as the engine spells it.
pub const TRUE_VAL: Value = Value::Long(-1);
/// False as the engine spells it.
pub const FALSE_VAL: Value = Value::Long(0);

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Text(_) => ValueKind::Text,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::BigDec(_) => ValueKind::BigDec,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn from_bool(b: bool) -> Value {
        if b {
            TRUE_VAL
        } else {
            FALSE_VAL
        }
    }

    /// Wrap a decimal, normalizing to the minimal non-negative scale.
    pub fn from_big_decimal(bd: BigDecimal) -> Value {
        Value::BigDec(number::normalize(bd))
    }

    pub(crate) fn temporal(&self) -> Option<&Temporal> {
        match self {
            Value::Date(t) | Value::Time(t) | Value::DateTime(t) => Some(t),
            _ => None,
        }
    }

    /// Boolean coercion: any non-zero number is true; the strings "true"
    /// and "false" are recognised, other strings must parse as numbers.
    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Value::Long(v) => Ok(*v != 0),
            Value::Double(v) => Ok(*v != 0.0),
            Value::BigDec(v) => Ok(!v.is_zero()),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    return Ok(true);
                }
                if trimmed.eq_ignore_ascii_case("false") {
                    return Ok(false);
                }
                let parsed = number::parse_big_decimal(trimmed)
                    .map_err(|_| EvalError::Type(format!("invalid boolean value '{s}'")))?;
                Ok(!parsed.is_zero())
            }
            Value::Null => Err(EvalError::Type("invalid boolean value 'Null'".into())),
            _ => Err(EvalError::Type(format!(
                "invalid boolean value of type {:?}",
                self.kind()
            ))),
        }
    }

    /// 32-bit integer coercion; rounds half-even, fails on overflow and on
    /// strings that do not parse as numbers.
    pub fn as_long(&self) -> Result<i32> {
        match self {
            Value::Long(v) => Ok(*v),
            Value::Double(v) => double_to_long(*v),
            Value::BigDec(v) => number::to_long(v),
            Value::Text(s) => number::to_long(&number::parse_big_decimal(s)?),
            Value::Date(t) | Value::Time(t) | Value::DateTime(t) => {
                double_to_long(t.date_double())
            }
            Value::Null => Err(EvalError::Type("invalid long value 'Null'".into())),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::Long(v) => Ok(f64::from(*v)),
            Value::Double(v) => Ok(*v),
            Value::BigDec(v) => v.to_f64().ok_or_else(|| {
                EvalError::Arithmetic(format!("value '{v}' out of range for double"))
            }),
            Value::Text(s) => {
                let parsed = number::parse_big_decimal(s)?;
                parsed.to_f64().ok_or_else(|| {
                    EvalError::Arithmetic(format!("value '{s}' out of range for double"))
                })
            }
            Value::Date(t) | Value::Time(t) | Value::DateTime(t) => Ok(t.date_double()),
            Value::Null => Err(EvalError::Type("invalid double value 'Null'".into())),
        }
    }

    pub fn as_big_decimal(&self) -> Result<BigDecimal> {
        match self {
            Value::Long(v) => Ok(BigDecimal::from(*v)),
            Value::Double(v) => number::f64_to_big_decimal(*v),
            Value::BigDec(v) => Ok(v.clone()),
            Value::Text(s) => number::parse_big_decimal(s),
            Value::Date(t) | Value::Time(t) | Value::DateTime(t) => {
                number::f64_to_big_decimal(t.date_double())
            }
            Value::Null => Err(EvalError::Type("invalid decimal value 'Null'".into())),
        }
    }

    pub fn as_string(&self) -> Result<String> {
        match self {
            Value::Text(s) => Ok(s.clone()),
            Value::Long(v) => Ok(v.to_string()),
            Value::Double(v) => Ok(number::format_double(*v)),
            Value::BigDec(v) => Ok(number::format_big_decimal(v)),
            Value::Date(t) | Value::Time(t) | Value::DateTime(t) => Ok(t.render()),
            Value::Null => Err(EvalError::Type("invalid string value 'Null'".into())),
        }
    }
}

fn double_to_long(v: f64) -> Result<i32> {
    number::to_long(&number::f64_to_big_decimal(v)?)
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<BigDecimal> for Value {
    fn from(value: BigDecimal) -> Self {
        Value::from_big_decimal(value)
    }
}

/// Case-insensitive string ordering used by comparisons and `StrComp`.
///
/// ASCII gets a fast path; other text compares by Unicode uppercasing so
/// ligature-style foldings behave the same in both directions.
pub(crate) fn cmp_case_insensitive(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        let mut a_iter = a.bytes().map(|c| c.to_ascii_uppercase());
        let mut b_iter = b.bytes().map(|c| c.to_ascii_uppercase());
        loop {
            match (a_iter.next(), b_iter.next()) {
                (Some(ac), Some(bc)) => match ac.cmp(&bc) {
                    Ordering::Equal => continue,
                    ord => return ord,
                },
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (None, None) => return Ordering::Equal,
            }
        }
    }

    let mut a_iter = a.chars().flat_map(char::to_uppercase);
    let mut b_iter = b.chars().flat_map(char::to_uppercase);
    loop {
        match (a_iter.next(), b_iter.next()) {
            (Some(ac), Some(bc)) => match ac.cmp(&bc) {
                Ordering::Equal => continue,
                ord => return ord,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_ordering_drives_promotion() {
        assert!(ValueKind::Long < ValueKind::Double);
        assert!(ValueKind::Double < ValueKind::BigDec);
        assert_eq!(ValueKind::Date.preferred_numeric_type(), ValueKind::Double);
        assert_eq!(ValueKind::Long.preferred_fp_type(), ValueKind::Double);
        assert_eq!(ValueKind::BigDec.preferred_fp_type(), ValueKind::BigDec);
    }

    #[test]
    fn boolean_coercions() {
        assert!(Value::Long(-1).as_boolean().unwrap());
        assert!(!Value::Long(0).as_boolean().unwrap());
        assert!(Value::Double(0.5).as_boolean().unwrap());
        assert!(Value::Text("TRUE".into()).as_boolean().unwrap());
        assert!(!Value::Text("false".into()).as_boolean().unwrap());
        assert!(Value::Text("2".into()).as_boolean().unwrap());
        assert!(Value::Text("maybe".into()).as_boolean().is_err());
        assert!(Value::Null.as_boolean().is_err());
    }

    #[test]
    fn long_coercion_rounds_half_even() {
        assert_eq!(Value::Double(2.5).as_long().unwrap(), 2);
        assert_eq!(Value::Double(3.5).as_long().unwrap(), 4);
        assert_eq!(Value::Text(" 5 ".into()).as_long().unwrap(), 5);
        assert!(Value::Double(3e9).as_long().is_err());
        assert!(Value::Text("abc".into()).as_long().is_err());
    }

    #[test]
    fn string_renderings() {
        assert_eq!(Value::Long(-37).as_string().unwrap(), "-37");
        assert_eq!(Value::Double(42.0).as_string().unwrap(), "42");
        assert_eq!(
            Value::BigDec(BigDecimal::from_str("83333.3333").unwrap())
                .as_string()
                .unwrap(),
            "83333.3333"
        );
    }

    #[test]
    fn from_big_decimal_normalizes() {
        let v = Value::from(BigDecimal::from_str("1.2300").unwrap());
        assert_eq!(v, Value::BigDec(BigDecimal::from_str("1.23").unwrap()));
    }

    #[test]
    fn case_insensitive_ordering() {
        assert_eq!(cmp_case_insensitive("Foo", "fOO"), Ordering::Equal);
        assert_eq!(cmp_case_insensitive("abc", "ABD"), Ordering::Less);
        assert_eq!(cmp_case_insensitive("straße", "STRASSE"), Ordering::Equal);
    }
}
