//! Built-in operators: type precedence, numeric promotion and null
//! propagation.
//!
//! Null propagates through every operator except the four documented
//! exceptions: `And` can decide false, `Or` can decide true, `Imp` is null
//! only when the truth value is genuinely unknown, and `&` coerces null
//! operands to the empty string.
//!
//! Arithmetic picks an operating type from the operand kinds under one of
//! three coercion modes: simple math (`+`, `-`) keeps temporal types,
//! general math demotes them to their numeric form, and comparison
//! additionally refuses to coerce strings to numbers.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;

use crate::number;
use crate::temporal::Temporal;
use crate::value::{cmp_case_insensitive, FALSE_VAL, TRUE_VAL};
use crate::{EvalContext, EvalError, LikePattern, Result, Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoercionMode {
    Simple,
    General,
    Compare,
}

impl CoercionMode {
    fn prefer_temporal(self) -> bool {
        self == CoercionMode::Simple
    }

    fn allow_coerce_string_to_num(self) -> bool {
        self != CoercionMode::Compare
    }
}

pub fn negate(ctx: &dyn EvalContext, value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match value.kind() {
        kind if kind.is_temporal() => {
            let result = -value.as_double()?;
            to_date_value(ctx, kind, result, value, None)
        }
        ValueKind::Long => value
            .as_long()?
            .checked_neg()
            .map(Value::Long)
            .ok_or_else(|| EvalError::Arithmetic("long overflow".into())),
        ValueKind::Double => Ok(Value::Double(-value.as_double()?)),
        ValueKind::Text | ValueKind::BigDec => Ok(Value::from_big_decimal(-value.as_big_decimal()?)),
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

pub fn add(ctx: &dyn EvalContext, a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match math_type_precedence(a, b, CoercionMode::Simple)? {
        // String '+' is a null-propagating concatenation.
        ValueKind::Text => Ok(Value::Text(format!("{}{}", a.as_string()?, b.as_string()?))),
        kind if kind.is_temporal() => {
            let result = a.as_double()? + b.as_double()?;
            to_date_value(ctx, kind, result, a, Some(b))
        }
        ValueKind::Long => checked_long(i64::from(a.as_long()?) + i64::from(b.as_long()?)),
        ValueKind::Double => Ok(Value::Double(a.as_double()? + b.as_double()?)),
        ValueKind::BigDec => Ok(Value::from_big_decimal(
            a.as_big_decimal()? + b.as_big_decimal()?,
        )),
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

pub fn subtract(ctx: &dyn EvalContext, a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match math_type_precedence(a, b, CoercionMode::Simple)? {
        kind if kind.is_temporal() => {
            let result = a.as_double()? - b.as_double()?;
            to_date_value(ctx, kind, result, a, Some(b))
        }
        ValueKind::Long => checked_long(i64::from(a.as_long()?) - i64::from(b.as_long()?)),
        ValueKind::Double => Ok(Value::Double(a.as_double()? - b.as_double()?)),
        ValueKind::BigDec => Ok(Value::from_big_decimal(
            a.as_big_decimal()? - b.as_big_decimal()?,
        )),
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

pub fn multiply(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match math_type_precedence(a, b, CoercionMode::General)? {
        ValueKind::Long => checked_long(i64::from(a.as_long()?) * i64::from(b.as_long()?)),
        ValueKind::Double => Ok(Value::Double(a.as_double()? * b.as_double()?)),
        ValueKind::BigDec => Ok(Value::from_big_decimal(
            a.as_big_decimal()? * b.as_big_decimal()?,
        )),
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

pub fn divide(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match math_type_precedence(a, b, CoercionMode::General)? {
        ValueKind::Long => {
            let n = a.as_long()?;
            let d = b.as_long()?;
            if d == 0 {
                return Err(EvalError::Arithmetic("division by zero".into()));
            }
            if n % d == 0 {
                Ok(Value::Long(n / d))
            } else {
                Ok(Value::Double(f64::from(n) / f64::from(d)))
            }
        }
        ValueKind::Double => {
            let d = b.as_double()?;
            if d == 0.0 {
                return Err(EvalError::Arithmetic("division by zero".into()));
            }
            Ok(Value::Double(a.as_double()? / d))
        }
        ValueKind::BigDec => Ok(Value::from_big_decimal(number::divide(
            &a.as_big_decimal()?,
            &b.as_big_decimal()?,
        )?)),
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

pub fn int_divide(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let kind = math_type_precedence(a, b, CoercionMode::General)?;
    if kind == ValueKind::Text {
        return Err(EvalError::Type(format!("unexpected type {kind:?}")));
    }
    let d = b.as_long()?;
    if d == 0 {
        return Err(EvalError::Arithmetic("division by zero".into()));
    }
    a.as_long()?
        .checked_div(d)
        .map(Value::Long)
        .ok_or_else(|| EvalError::Arithmetic("long overflow".into()))
}

pub fn modulo(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let kind = math_type_precedence(a, b, CoercionMode::General)?;
    if kind == ValueKind::Text {
        return Err(EvalError::Type(format!("unexpected type {kind:?}")));
    }
    let d = b.as_long()?;
    if d == 0 {
        return Err(EvalError::Arithmetic("division by zero".into()));
    }
    a.as_long()?
        .checked_rem(d)
        .map(Value::Long)
        .ok_or_else(|| EvalError::Arithmetic("long overflow".into()))
}

/// `^`. Decimal bases with exact non-negative integer exponents are
/// computed exactly; everything else goes through double `powf`. Long
/// inputs with an integral in-range result come back as LONG.
pub fn exp(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let kind = math_type_precedence(a, b, CoercionMode::General)?;

    if kind == ValueKind::BigDec {
        if let Some(power) = exact_non_negative_exponent(b)? {
            let (unscaled, scale) = a.as_big_decimal()?.as_bigint_and_exponent();
            let result = BigDecimal::new(
                unscaled.pow(power),
                scale.checked_mul(i64::from(power)).ok_or_else(|| {
                    EvalError::Arithmetic("exponent out of range".into())
                })?,
            );
            return Ok(Value::from_big_decimal(result));
        }
    }

    let result = a.as_double()?.powf(b.as_double()?);
    if kind == ValueKind::Long && is_integral(result) {
        return Ok(Value::Long(result as i32));
    }
    Ok(Value::Double(result))
}

fn exact_non_negative_exponent(value: &Value) -> Result<Option<u32>> {
    let bd = value.as_big_decimal()?;
    let normalized = number::normalize(bd);
    if normalized.fractional_digit_count() > 0 {
        return Ok(None);
    }
    let (unscaled, _) = normalized.with_scale(0).as_bigint_and_exponent();
    Ok(u32::try_from(unscaled).ok().filter(|p| *p <= 999_999_999))
}

/// `&`: null operands become empty strings before concatenation.
pub fn concat(a: &Value, b: &Value) -> Result<Value> {
    let left = if a.is_null() {
        String::new()
    } else {
        a.as_string()?
    };
    let right = if b.is_null() {
        String::new()
    } else {
        b.as_string()?
    };
    Ok(Value::Text(format!("{left}{right}")))
}

pub fn not(value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::from_bool(!value.as_boolean()?))
}

pub fn less_than(a: &Value, b: &Value) -> Result<Value> {
    null_or_compare(a, b, |ord| ord == Ordering::Less)
}

pub fn greater_than(a: &Value, b: &Value) -> Result<Value> {
    null_or_compare(a, b, |ord| ord == Ordering::Greater)
}

pub fn less_than_eq(a: &Value, b: &Value) -> Result<Value> {
    null_or_compare(a, b, |ord| ord != Ordering::Greater)
}

pub fn greater_than_eq(a: &Value, b: &Value) -> Result<Value> {
    null_or_compare(a, b, |ord| ord != Ordering::Less)
}

pub fn equals(a: &Value, b: &Value) -> Result<Value> {
    null_or_compare(a, b, |ord| ord == Ordering::Equal)
}

pub fn not_equals(a: &Value, b: &Value) -> Result<Value> {
    null_or_compare(a, b, |ord| ord != Ordering::Equal)
}

fn null_or_compare(a: &Value, b: &Value, decide: fn(Ordering) -> bool) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::from_bool(decide(compare_values(a, b)?)))
}

/// Three-way comparison without string-to-number coercion.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
    match math_type_precedence(a, b, CoercionMode::Compare)? {
        ValueKind::Text => {
            // String comparison is only valid when both sides are strings.
            if a.kind() != b.kind() {
                return Err(EvalError::Type("unexpected type Text".into()));
            }
            Ok(cmp_case_insensitive(&a.as_string()?, &b.as_string()?))
        }
        ValueKind::Long => Ok(a.as_long()?.cmp(&b.as_long()?)),
        ValueKind::Double => a
            .as_double()?
            .partial_cmp(&b.as_double()?)
            .ok_or_else(|| EvalError::Arithmetic("NaN is not comparable".into())),
        ValueKind::BigDec => Ok(a.as_big_decimal()?.cmp(&b.as_big_decimal()?)),
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

fn bool_or_null(value: &Value) -> Result<Option<bool>> {
    if value.is_null() {
        Ok(None)
    } else {
        value.as_boolean().map(Some)
    }
}

/// `And`: false wins over null.
pub fn and(a: &Value, b: &Value) -> Result<Value> {
    let (left, right) = (bool_or_null(a)?, bool_or_null(b)?);
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Ok(FALSE_VAL),
        (Some(true), Some(true)) => Ok(TRUE_VAL),
        _ => Ok(Value::Null),
    }
}

/// `Or`: true wins over null.
pub fn or(a: &Value, b: &Value) -> Result<Value> {
    let (left, right) = (bool_or_null(a)?, bool_or_null(b)?);
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Ok(TRUE_VAL),
        (Some(false), Some(false)) => Ok(FALSE_VAL),
        _ => Ok(Value::Null),
    }
}

/// `Eqv`: plain null propagation, then boolean equivalence.
pub fn eqv(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::from_bool(a.as_boolean()? == b.as_boolean()?))
}

pub fn xor(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::from_bool(a.as_boolean()? != b.as_boolean()?))
}

/// `Imp`: null only when the implication cannot be decided.
pub fn imp(a: &Value, b: &Value) -> Result<Value> {
    let (left, right) = (bool_or_null(a)?, bool_or_null(b)?);
    match (left, right) {
        (Some(false), _) | (_, Some(true)) => Ok(TRUE_VAL),
        (Some(true), Some(false)) => Ok(FALSE_VAL),
        _ => Ok(Value::Null),
    }
}

pub fn is_null(value: &Value) -> Value {
    Value::from_bool(value.is_null())
}

pub fn is_not_null(value: &Value) -> Value {
    Value::from_bool(!value.is_null())
}

/// `Like`: match the whole string against a pre-compiled pattern.
pub fn like(value: &Value, pattern: &LikePattern) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::from_bool(pattern.matches(&value.as_string()?)))
}

pub fn not_like(value: &Value, pattern: &LikePattern) -> Result<Value> {
    not(&like(value, pattern)?)
}

/// `Between`: bounds may arrive in either order.
pub fn between(value: &Value, low: &Value, high: &Value) -> Result<Value> {
    if value.is_null() || low.is_null() || high.is_null() {
        return Ok(Value::Null);
    }
    let (min, max) = if compare_values(low, high)? == Ordering::Greater {
        (high, low)
    } else {
        (low, high)
    };
    Ok(Value::from_bool(
        compare_values(value, min)? != Ordering::Less
            && compare_values(value, max)? != Ordering::Greater,
    ))
}

pub fn not_between(value: &Value, low: &Value, high: &Value) -> Result<Value> {
    not(&between(value, low, high)?)
}

/// `In`: nulls in the list are skipped; a null needle stays null.
pub fn in_values(value: &Value, candidates: &[Value]) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    for candidate in candidates {
        if candidate.is_null() {
            continue;
        }
        if compare_values(value, candidate)? == Ordering::Equal {
            return Ok(TRUE_VAL);
        }
    }
    Ok(FALSE_VAL)
}

pub fn not_in(value: &Value, candidates: &[Value]) -> Result<Value> {
    not(&in_values(value, candidates)?)
}

fn checked_long(value: i64) -> Result<Value> {
    i32::try_from(value)
        .map(Value::Long)
        .map_err(|_| EvalError::Arithmetic("long overflow".into()))
}

pub(crate) fn is_integral(d: f64) -> bool {
    d.is_finite() && d == d.trunc() && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&d)
}

/// Build a temporal result of `kind` from a date-double, inheriting the
/// render format from an operand of the same kind when one exists.
pub(crate) fn to_date_value(
    ctx: &dyn EvalContext,
    kind: ValueKind,
    date_double: f64,
    a: &Value,
    b: Option<&Value>,
) -> Result<Value> {
    let format = [Some(a), b]
        .into_iter()
        .flatten()
        .find(|v| v.kind() == kind)
        .and_then(|v| v.temporal())
        .map(|t| t.format_pattern().to_string())
        .unwrap_or_else(|| ctx.temporal_config().default_format_for(kind));

    let temporal = Temporal::new(date_double, format);
    Ok(match kind {
        ValueKind::Date => Value::Date(temporal),
        ValueKind::Time => Value::Time(temporal),
        ValueKind::DateTime => Value::DateTime(temporal),
        other => return Err(EvalError::Type(format!("unexpected date/time type {other:?}"))),
    })
}

/// Resolve the operating type for a pair of operands under a coercion
/// mode. Strings coerce to numbers (outside comparisons) when exactly one
/// side is a string and it parses as a number; the parsed literal's shape
/// feeds back into the promotion.
fn math_type_precedence(a: &Value, b: &Value, mode: CoercionMode) -> Result<ValueKind> {
    let t1 = a.kind();
    let t2 = b.kind();

    if t1 == t2 {
        if !mode.prefer_temporal() && t1.is_temporal() {
            return Ok(t1.preferred_numeric_type());
        }
        return Ok(t1);
    }

    if t1 == ValueKind::Text || t2 == ValueKind::Text {
        if mode.allow_coerce_string_to_num() {
            if let Some(numeric) = coerce_string_to_numeric(a, b, mode) {
                return Ok(numeric);
            }
        }
        // String always wins otherwise.
        return Ok(ValueKind::Text);
    }

    if mode.prefer_temporal() && (t1.is_temporal() || t2.is_temporal()) {
        return Ok(if t1.is_temporal() {
            if t2.is_temporal() {
                // Mixed temporal types always widen to a full timestamp.
                ValueKind::DateTime
            } else {
                t1
            }
        } else {
            t2
        });
    }

    Ok(preferred_numeric_type(
        t1.preferred_numeric_type(),
        t2.preferred_numeric_type(),
    ))
}

fn preferred_numeric_type(t1: ValueKind, t2: ValueKind) -> ValueKind {
    if t1.is_integral() && t2.is_integral() {
        return t1.max(t2);
    }
    t1.preferred_fp_type().max(t2.preferred_fp_type())
}

fn coerce_string_to_numeric(a: &Value, b: &Value, mode: CoercionMode) -> Option<ValueKind> {
    let t1 = a.kind();
    let t2 = b.kind();

    let (mut preferred, string_side) = if t1.is_numeric() {
        (t1, b)
    } else if t2.is_numeric() {
        (t2, a)
    } else if t1.is_temporal() {
        let pref = if mode.prefer_temporal() {
            t1
        } else {
            t1.preferred_numeric_type()
        };
        (pref, b)
    } else if t2.is_temporal() {
        let pref = if mode.prefer_temporal() {
            t2
        } else {
            t2.preferred_numeric_type()
        };
        (pref, a)
    } else {
        return None;
    };

    let parsed = string_side.as_big_decimal().ok()?;
    if preferred.is_numeric() {
        // Re-evaluate based on the shape of the parsed literal.
        let literal_kind = if parsed.fractional_digit_count() > 0 {
            ValueKind::BigDec
        } else {
            ValueKind::Long
        };
        preferred = preferred_numeric_type(literal_kind, preferred);
    }
    Some(preferred)
}
