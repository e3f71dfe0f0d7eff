//! Numeric functions.

use bigdecimal::RoundingMode;
use num_traits::Signed;

use crate::functions::FunctionSpec;
use crate::ops;
use crate::{EvalContext, EvalError, Result, Value};

inventory::submit! {
    FunctionSpec {
        name: "Abs",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: abs,
    }
}

fn abs(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Null);
    }
    match value.kind() {
        kind if kind.is_temporal() => {
            ops::to_date_value(ctx, kind, value.as_double()?.abs(), value, None)
        }
        crate::ValueKind::Long => value
            .as_long()?
            .checked_abs()
            .map(Value::Long)
            .ok_or_else(|| EvalError::Arithmetic("long overflow".into())),
        crate::ValueKind::Double => Ok(Value::Double(value.as_double()?.abs())),
        crate::ValueKind::Text | crate::ValueKind::BigDec => {
            Ok(Value::from_big_decimal(value.as_big_decimal()?.abs()))
        }
        kind => Err(EvalError::Type(format!("unexpected type {kind:?}"))),
    }
}

inventory::submit! {
    FunctionSpec {
        name: "Atan",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: atan,
    }
}

fn atan(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?.atan()))
}

inventory::submit! {
    FunctionSpec {
        name: "Cos",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cos,
    }
}

fn cos(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?.cos()))
}

inventory::submit! {
    FunctionSpec {
        name: "Exp",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: exp,
    }
}

fn exp(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?.exp()))
}

inventory::submit! {
    FunctionSpec {
        name: "Fix",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: fix,
    }
}

/// Truncates toward zero.
fn fix(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.kind().is_integral() {
        return Ok(value.clone());
    }
    double_to_long_checked(value.as_double()?.trunc())
}

inventory::submit! {
    FunctionSpec {
        name: "Int",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: int,
    }
}

/// Floors.
fn int(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.kind().is_integral() {
        return Ok(value.clone());
    }
    double_to_long_checked(value.as_double()?.floor())
}

fn double_to_long_checked(value: f64) -> Result<Value> {
    if !ops::is_integral(value) {
        return Err(EvalError::Arithmetic(format!(
            "value '{value}' out of range for long"
        )));
    }
    Ok(Value::Long(value as i32))
}

inventory::submit! {
    FunctionSpec {
        name: "Log",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: log,
    }
}

fn log(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?.ln()))
}

inventory::submit! {
    FunctionSpec {
        name: "Rnd",
        aliases: &[],
        min_args: 0,
        max_args: 1,
        pure: false,
        string_alias: false,
        implementation: rnd,
    }
}

fn rnd(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let seed = match args.first() {
        Some(value) => Some(value.as_long()?),
        None => None,
    };
    Ok(Value::Double(f64::from(ctx.random(seed))))
}

inventory::submit! {
    FunctionSpec {
        name: "Round",
        aliases: &[],
        min_args: 1,
        max_args: 2,
        pure: true,
        string_alias: false,
        implementation: round,
    }
}

/// Banker's rounding, default zero decimal places.
fn round(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.kind().is_integral() {
        return Ok(value.clone());
    }
    let scale = match args.get(1) {
        Some(v) => v.as_long()?,
        None => 0,
    };
    let bd = value
        .as_big_decimal()?
        .with_scale_round(i64::from(scale), RoundingMode::HalfEven);
    Ok(Value::from_big_decimal(bd))
}

inventory::submit! {
    FunctionSpec {
        name: "Sgn",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: sgn,
    }
}

fn sgn(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Null);
    }
    let signum = if value.kind().is_integral() {
        value.as_long()?.signum()
    } else {
        let bd = value.as_big_decimal()?;
        if bd.is_positive() {
            1
        } else if bd.is_negative() {
            -1
        } else {
            0
        }
    };
    Ok(Value::Long(signum))
}

inventory::submit! {
    FunctionSpec {
        name: "Sqr",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: sqr,
    }
}

fn sqr(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = args[0].as_double()?;
    if value < 0.0 {
        return Err(EvalError::Argument(format!("invalid value '{value}'")));
    }
    Ok(Value::Double(value.sqrt()))
}

inventory::submit! {
    FunctionSpec {
        name: "Sin",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: sin,
    }
}

fn sin(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?.sin()))
}

inventory::submit! {
    FunctionSpec {
        name: "Tan",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: tan,
    }
}

fn tan(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?.tan()))
}
