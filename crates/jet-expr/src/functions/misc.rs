//! Control flow, null coalescing, type tests and the `C*` converters.

use bigdecimal::RoundingMode;

use crate::functions::{non_null_to_temporal, FunctionSpec, VAR_ARGS};
use crate::value::{FALSE_VAL, TRUE_VAL};
use crate::{EvalContext, EvalError, Result, Value, ValueKind};

inventory::submit! {
    FunctionSpec {
        name: "IIf",
        aliases: &[],
        min_args: 3,
        max_args: 3,
        pure: true,
        string_alias: false,
        implementation: iif,
    }
}

// Both branches were already evaluated by the caller's eager model; a null
// condition selects the false branch.
fn iif(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let chosen = if !args[0].is_null() && args[0].as_boolean()? {
        &args[1]
    } else {
        &args[2]
    };
    Ok(chosen.clone())
}

inventory::submit! {
    FunctionSpec {
        name: "Choose",
        aliases: &[],
        min_args: 1,
        max_args: VAR_ARGS,
        pure: true,
        string_alias: false,
        implementation: choose,
    }
}

fn choose(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let index = args[0].as_long()?;
    if index < 1 || index as usize >= args.len() {
        return Ok(Value::Null);
    }
    Ok(args[index as usize].clone())
}

inventory::submit! {
    FunctionSpec {
        name: "Switch",
        aliases: &[],
        min_args: 0,
        max_args: VAR_ARGS,
        pure: true,
        string_alias: false,
        implementation: switch,
    }
}

fn switch(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args.len() % 2 != 0 {
        return Err(EvalError::Argument("odd number of parameters".into()));
    }
    for pair in args.chunks(2) {
        if pair[0].as_boolean()? {
            return Ok(pair[1].clone());
        }
    }
    Ok(Value::Null)
}

inventory::submit! {
    FunctionSpec {
        name: "Nz",
        aliases: &[],
        min_args: 1,
        max_args: 2,
        pure: true,
        string_alias: false,
        implementation: nz,
    }
}

fn nz(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if !args[0].is_null() {
        return Ok(args[0].clone());
    }
    if args.len() > 1 {
        return Ok(args[1].clone());
    }
    // With no default, the replacement depends on the expression's
    // requested result type; anything non-string (temporal included)
    // falls back to zero.
    Ok(match ctx.result_type() {
        None | Some(ValueKind::Text) => Value::Text(String::new()),
        _ => Value::Long(0),
    })
}

inventory::submit! {
    FunctionSpec {
        name: "CBool",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cbool,
    }
}

fn cbool(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(args[0].as_boolean()?))
}

inventory::submit! {
    FunctionSpec {
        name: "CByte",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cbyte,
    }
}

fn cbyte(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = args[0].as_long()?;
    if !(0..=255).contains(&value) {
        return Err(EvalError::Arithmetic(format!(
            "byte value '{value}' out of range"
        )));
    }
    Ok(Value::Long(value))
}

inventory::submit! {
    FunctionSpec {
        name: "CCur",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: ccur,
    }
}

fn ccur(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let bd = args[0]
        .as_big_decimal()?
        .with_scale_round(4, RoundingMode::HalfEven);
    Ok(Value::from_big_decimal(bd))
}

inventory::submit! {
    FunctionSpec {
        name: "CDate",
        aliases: &["CVDate"],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cdate,
    }
}

fn cdate(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    non_null_to_temporal(ctx, &args[0])
}

inventory::submit! {
    FunctionSpec {
        name: "CDbl",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cdbl,
    }
}

fn cdbl(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(args[0].as_double()?))
}

inventory::submit! {
    FunctionSpec {
        name: "CDec",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cdec,
    }
}

fn cdec(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::from_big_decimal(args[0].as_big_decimal()?))
}

inventory::submit! {
    FunctionSpec {
        name: "CInt",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cint,
    }
}

fn cint(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = args[0].as_long()?;
    if !(i32::from(i16::MIN)..=i32::from(i16::MAX)).contains(&value) {
        return Err(EvalError::Arithmetic(format!(
            "int value '{value}' out of range"
        )));
    }
    Ok(Value::Long(value))
}

inventory::submit! {
    FunctionSpec {
        name: "CLng",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: clng,
    }
}

fn clng(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Long(args[0].as_long()?))
}

inventory::submit! {
    FunctionSpec {
        name: "CSng",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: csng,
    }
}

fn csng(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = args[0].as_double()?;
    if value.is_finite() && value.abs() > f64::from(f32::MAX) {
        return Err(EvalError::Arithmetic(format!(
            "single value '{value}' out of range"
        )));
    }
    Ok(Value::Double(f64::from(value as f32)))
}

inventory::submit! {
    FunctionSpec {
        name: "CStr",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cstr,
    }
}

fn cstr(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::Text(args[0].as_string()?))
}

inventory::submit! {
    FunctionSpec {
        name: "CVar",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: cvar,
    }
}

fn cvar(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(args[0].clone())
}

inventory::submit! {
    FunctionSpec {
        name: "IsNull",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: isnull,
    }
}

fn isnull(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(args[0].is_null()))
}

inventory::submit! {
    FunctionSpec {
        name: "IsDate",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: isdate,
    }
}

fn isdate(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(
        !args[0].is_null() && non_null_to_temporal(ctx, &args[0]).is_ok(),
    ))
}

inventory::submit! {
    FunctionSpec {
        name: "IsNumeric",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: isnumeric,
    }
}

fn isnumeric(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].kind().is_numeric() {
        return Ok(TRUE_VAL);
    }
    if args[0].kind() == ValueKind::Text && args[0].as_big_decimal().is_ok() {
        return Ok(TRUE_VAL);
    }
    Ok(FALSE_VAL)
}

inventory::submit! {
    FunctionSpec {
        name: "VarType",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: vartype,
    }
}

fn vartype(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    // VBA's VarType constants.
    let code = match args[0].kind() {
        ValueKind::Null => 1,
        ValueKind::Long => 3,
        ValueKind::Double => 5,
        ValueKind::Date | ValueKind::Time | ValueKind::DateTime => 7,
        ValueKind::Text => 8,
        ValueKind::BigDec => 14,
    };
    Ok(Value::Long(code))
}

inventory::submit! {
    FunctionSpec {
        name: "TypeName",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: typename,
    }
}

fn typename(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let name = match args[0].kind() {
        ValueKind::Null => "Null",
        ValueKind::Text => "String",
        ValueKind::Date | ValueKind::Time | ValueKind::DateTime => "Date",
        ValueKind::Long => "Long",
        ValueKind::Double => "Double",
        ValueKind::BigDec => "Decimal",
    };
    Ok(Value::Text(name.to_string()))
}

inventory::submit! {
    FunctionSpec {
        name: "Hex",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: hex,
    }
}

fn hex(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    if let Value::Text(s) = &args[0] {
        if s.is_empty() {
            return Ok(Value::Long(0));
        }
    }
    let value = args[0].as_long()?;
    Ok(Value::Text(format!("{:X}", value as u32)))
}

inventory::submit! {
    FunctionSpec {
        name: "Oct",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: oct,
    }
}

fn oct(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    if let Value::Text(s) = &args[0] {
        if s.is_empty() {
            return Ok(Value::Long(0));
        }
    }
    let value = args[0].as_long()?;
    Ok(Value::Text(format!("{:o}", value as u32)))
}
