//! Text functions.
//!
//! Position arguments are 1-based and character-oriented, as in the
//! original engine. Functions whose string arguments are null yield null;
//! their `$` variants substitute the empty string at dispatch.

use bigdecimal::RoundingMode;

use crate::functions::{non_null_to_temporal, FunctionSpec};
use crate::temporal::format_datetime;
use crate::value::cmp_case_insensitive;
use crate::{EvalContext, EvalError, Result, Value};

inventory::submit! {
    FunctionSpec {
        name: "Len",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: len,
    }
}

fn len(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Long(args[0].as_string()?.chars().count() as i32))
}

inventory::submit! {
    FunctionSpec {
        name: "Left",
        aliases: &[],
        min_args: 2,
        max_args: 2,
        pure: true,
        string_alias: true,
        implementation: left,
    }
}

fn left(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let count = non_negative(args[1].as_long()?)?;
    let text = args[0].as_string()?;
    Ok(Value::Text(text.chars().take(count).collect()))
}

inventory::submit! {
    FunctionSpec {
        name: "Right",
        aliases: &[],
        min_args: 2,
        max_args: 2,
        pure: true,
        string_alias: true,
        implementation: right,
    }
}

fn right(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let count = non_negative(args[1].as_long()?)?;
    let chars: Vec<char> = args[0].as_string()?.chars().collect();
    let skip = chars.len().saturating_sub(count);
    Ok(Value::Text(chars[skip..].iter().collect()))
}

inventory::submit! {
    FunctionSpec {
        name: "Mid",
        aliases: &[],
        min_args: 2,
        max_args: 3,
        pure: true,
        string_alias: true,
        implementation: mid,
    }
}

fn mid(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let start = args[1].as_long()?;
    if start < 1 {
        return Err(EvalError::Argument(format!("invalid start position {start}")));
    }
    let chars: Vec<char> = args[0].as_string()?.chars().collect();
    let from = (start as usize - 1).min(chars.len());
    let count = match args.get(2) {
        Some(v) => non_negative(v.as_long()?)?,
        None => chars.len(),
    };
    let to = (from + count).min(chars.len());
    Ok(Value::Text(chars[from..to].iter().collect()))
}

fn non_negative(value: i32) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| EvalError::Argument(format!("invalid character count {value}")))
}

inventory::submit! {
    FunctionSpec {
        name: "LCase",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: lcase,
    }
}

fn lcase(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Text(args[0].as_string()?.to_lowercase()))
}

inventory::submit! {
    FunctionSpec {
        name: "UCase",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: ucase,
    }
}

fn ucase(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Text(args[0].as_string()?.to_uppercase()))
}

inventory::submit! {
    FunctionSpec {
        name: "Trim",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: trim,
    }
}

fn trim(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Text(
        args[0].as_string()?.trim_matches(' ').to_string(),
    ))
}

inventory::submit! {
    FunctionSpec {
        name: "LTrim",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: ltrim,
    }
}

fn ltrim(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Text(
        args[0].as_string()?.trim_start_matches(' ').to_string(),
    ))
}

inventory::submit! {
    FunctionSpec {
        name: "RTrim",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: rtrim,
    }
}

fn rtrim(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Text(
        args[0].as_string()?.trim_end_matches(' ').to_string(),
    ))
}

inventory::submit! {
    FunctionSpec {
        name: "InStr",
        aliases: &[],
        min_args: 2,
        max_args: 4,
        pure: true,
        string_alias: false,
        implementation: instr,
    }
}

// InStr([start], string1, string2, [compare]); with two arguments the
// search starts at 1.
fn instr(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let (start_arg, s1_arg, s2_arg, compare_arg) = if args.len() >= 3 {
        (Some(&args[0]), &args[1], &args[2], args.get(3))
    } else {
        (None, &args[0], &args[1], None)
    };
    if s1_arg.is_null() || s2_arg.is_null() {
        return Ok(Value::Null);
    }
    let start = match start_arg {
        Some(v) => v.as_long()?,
        None => 1,
    };
    if start < 1 {
        return Err(EvalError::Argument(format!("invalid start position {start}")));
    }
    let ignore_case = compare_mode(compare_arg)?;

    let haystack: Vec<char> = args_chars(&s1_arg.as_string()?, ignore_case);
    let needle: Vec<char> = args_chars(&s2_arg.as_string()?, ignore_case);
    let from = start as usize - 1;
    if from > haystack.len() {
        return Ok(Value::Long(0));
    }
    if needle.is_empty() {
        return Ok(Value::Long(start));
    }
    if needle.len() > haystack.len() {
        return Ok(Value::Long(0));
    }
    for pos in from..=haystack.len() - needle.len() {
        if haystack[pos..pos + needle.len()] == needle[..] {
            return Ok(Value::Long(pos as i32 + 1));
        }
    }
    Ok(Value::Long(0))
}

inventory::submit! {
    FunctionSpec {
        name: "InStrRev",
        aliases: &[],
        min_args: 2,
        max_args: 4,
        pure: true,
        string_alias: false,
        implementation: instrrev,
    }
}

// InStrRev(stringcheck, stringmatch, [start], [compare]); -1 starts at
// the end.
fn instrrev(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::Null);
    }
    let ignore_case = compare_mode(args.get(3))?;
    let haystack: Vec<char> = args_chars(&args[0].as_string()?, ignore_case);
    let needle: Vec<char> = args_chars(&args[1].as_string()?, ignore_case);

    let start = match args.get(2) {
        Some(v) => v.as_long()?,
        None => -1,
    };
    let end = if start == -1 {
        haystack.len()
    } else if start < 1 {
        return Err(EvalError::Argument(format!("invalid start position {start}")));
    } else {
        (start as usize).min(haystack.len())
    };

    if needle.is_empty() {
        return Ok(Value::Long(end as i32));
    }
    if needle.len() > end {
        return Ok(Value::Long(0));
    }
    for pos in (0..=end - needle.len()).rev() {
        if haystack[pos..pos + needle.len()] == needle[..] {
            return Ok(Value::Long(pos as i32 + 1));
        }
    }
    Ok(Value::Long(0))
}

fn compare_mode(arg: Option<&Value>) -> Result<bool> {
    // Text (case-insensitive) comparison is the database default; 0
    // selects binary comparison.
    match arg {
        Some(v) => Ok(v.as_long()? != 0),
        None => Ok(true),
    }
}

fn args_chars(text: &str, ignore_case: bool) -> Vec<char> {
    if ignore_case {
        text.chars().flat_map(char::to_uppercase).collect()
    } else {
        text.chars().collect()
    }
}

inventory::submit! {
    FunctionSpec {
        name: "Replace",
        aliases: &[],
        min_args: 3,
        max_args: 6,
        pure: true,
        string_alias: false,
        implementation: replace,
    }
}

// Replace(expression, find, replacement, [start], [count], [compare]).
fn replace(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() || args[2].is_null() {
        return Ok(Value::Null);
    }
    let start = match args.get(3) {
        Some(v) => v.as_long()?,
        None => 1,
    };
    if start < 1 {
        return Err(EvalError::Argument(format!("invalid start position {start}")));
    }
    let max_replacements = match args.get(4) {
        Some(v) => v.as_long()?,
        None => -1,
    };
    let ignore_case = compare_mode(args.get(5))?;

    let text: Vec<char> = args[0].as_string()?.chars().collect();
    let find: Vec<char> = args[1].as_string()?.chars().collect();
    let replacement = args[2].as_string()?;

    let from = (start as usize - 1).min(text.len());
    if find.is_empty() {
        return Ok(Value::Text(text[from..].iter().collect()));
    }

    let matches_at = |pos: usize| -> bool {
        pos + find.len() <= text.len()
            && text[pos..pos + find.len()]
                .iter()
                .zip(&find)
                .all(|(a, b)| chars_equal(*a, *b, ignore_case))
    };

    let mut out = String::new();
    let mut pos = from;
    let mut replaced = 0;
    while pos < text.len() {
        if (max_replacements < 0 || replaced < max_replacements) && matches_at(pos) {
            out.push_str(&replacement);
            pos += find.len();
            replaced += 1;
        } else {
            out.push(text[pos]);
            pos += 1;
        }
    }
    Ok(Value::Text(out))
}

fn chars_equal(a: char, b: char, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_uppercase().eq(b.to_uppercase())
    } else {
        a == b
    }
}

inventory::submit! {
    FunctionSpec {
        name: "Space",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: space,
    }
}

fn space(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let count = non_negative(args[0].as_long()?)?;
    Ok(Value::Text(" ".repeat(count)))
}

inventory::submit! {
    FunctionSpec {
        name: "String",
        aliases: &[],
        min_args: 2,
        max_args: 2,
        pure: true,
        string_alias: true,
        implementation: string_of,
    }
}

// String(number, character): a numeric second argument is a character
// code; a string contributes its first character.
fn string_of(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::Null);
    }
    let count = non_negative(args[0].as_long()?)?;
    let c = match &args[1] {
        Value::Text(s) => s
            .chars()
            .next()
            .ok_or_else(|| EvalError::Argument("empty character argument".into()))?,
        other => char_from_code(other.as_long()?)?,
    };
    Ok(Value::Text(std::iter::repeat(c).take(count).collect()))
}

inventory::submit! {
    FunctionSpec {
        name: "StrComp",
        aliases: &[],
        min_args: 2,
        max_args: 3,
        pure: true,
        string_alias: false,
        implementation: strcomp,
    }
}

fn strcomp(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::Null);
    }
    let ignore_case = compare_mode(args.get(2))?;
    let s1 = args[0].as_string()?;
    let s2 = args[1].as_string()?;
    let ordering = if ignore_case {
        cmp_case_insensitive(&s1, &s2)
    } else {
        s1.cmp(&s2)
    };
    Ok(Value::Long(match ordering {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

inventory::submit! {
    FunctionSpec {
        name: "StrReverse",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: strreverse,
    }
}

fn strreverse(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Text(args[0].as_string()?.chars().rev().collect()))
}

inventory::submit! {
    FunctionSpec {
        name: "Asc",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: asc,
    }
}

fn asc(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let text = args[0].as_string()?;
    let c = text
        .chars()
        .next()
        .ok_or_else(|| EvalError::Argument("empty string".into()))?;
    Ok(Value::Long(c as i32))
}

inventory::submit! {
    FunctionSpec {
        name: "Chr",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: true,
        implementation: chr,
    }
}

fn chr(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let c = char_from_code(args[0].as_long()?)?;
    Ok(Value::Text(c.to_string()))
}

fn char_from_code(code: i32) -> Result<char> {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| EvalError::Argument(format!("invalid character code {code}")))
}

inventory::submit! {
    FunctionSpec {
        name: "Format",
        aliases: &[],
        min_args: 1,
        max_args: 2,
        pure: true,
        string_alias: true,
        implementation: format,
    }
}

// Named numeric and date/time formats plus custom date/time patterns.
// Freeform digit masks are not supported.
fn format(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    if args.len() == 1 {
        return Ok(match value {
            Value::Null => Value::Text(String::new()),
            other => Value::Text(other.as_string()?),
        });
    }
    let pattern = args[1].as_string()?;
    if value.is_null() {
        return Ok(Value::Text(String::new()));
    }

    let formatted = match pattern.to_ascii_lowercase().as_str() {
        "general number" => value.as_string()?,
        "currency" => format!("${}", grouped_fixed(value, 2)?),
        "fixed" => fixed(value, 2)?,
        "standard" => grouped_fixed(value, 2)?,
        "percent" => {
            let scaled = value.as_double()? * 100.0;
            format!("{}%", fixed(&Value::Double(scaled), 2)?)
        }
        "scientific" => scientific(value.as_double()?),
        "yes/no" => yes_no(value, "Yes", "No")?,
        "true/false" => yes_no(value, "True", "False")?,
        "on/off" => yes_no(value, "On", "Off")?,
        "general date" => general_date(ctx, value)?,
        "short date" => render_with(ctx, value, &ctx.temporal_config().date_format.clone())?,
        "long time" => render_with(ctx, value, &ctx.temporal_config().time_format_12.clone())?,
        "medium time" => render_with(ctx, value, "hh:mm a")?,
        "short time" => render_with(ctx, value, "HH:mm")?,
        _ if value.kind().is_temporal() => {
            format_datetime(temporal_of(ctx, value)?, &pattern)
        }
        _ => value.as_string()?,
    };
    Ok(Value::Text(formatted))
}

fn fixed(value: &Value, decimals: i64) -> Result<String> {
    let bd = value
        .as_big_decimal()?
        .with_scale_round(decimals, RoundingMode::HalfEven);
    Ok(bd.to_string())
}

fn grouped_fixed(value: &Value, decimals: i64) -> Result<String> {
    let plain = fixed(value, decimals)?;
    let (sign, digits) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    Ok(match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    })
}

fn scientific(value: f64) -> String {
    if value == 0.0 {
        return "0.00E+00".to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    let mantissa = value / 10f64.powi(exponent);
    if exponent < 0 {
        format!("{mantissa:.2}E-{:02}", -exponent)
    } else {
        format!("{mantissa:.2}E+{exponent:02}")
    }
}

fn yes_no(value: &Value, yes: &str, no: &str) -> Result<String> {
    Ok(if value.as_boolean()? { yes } else { no }.to_string())
}

fn temporal_of(ctx: &dyn EvalContext, value: &Value) -> Result<chrono::NaiveDateTime> {
    let temporal = non_null_to_temporal(ctx, value)?;
    match temporal.temporal() {
        Some(t) => Ok(t.to_datetime()),
        None => Err(EvalError::Type("expected a date/time value".into())),
    }
}

fn render_with(ctx: &dyn EvalContext, value: &Value, pattern: &str) -> Result<String> {
    Ok(format_datetime(temporal_of(ctx, value)?, pattern))
}

fn general_date(ctx: &dyn EvalContext, value: &Value) -> Result<String> {
    let dt = temporal_of(ctx, value)?;
    let temporal = non_null_to_temporal(ctx, value)?;
    let dd = temporal.as_double()?;
    let cfg = ctx.temporal_config();
    let pattern = if dd.fract() == 0.0 {
        cfg.date_format.clone()
    } else if dd.abs() < 1.0 {
        cfg.time_format_12.clone()
    } else {
        cfg.default_date_time_format()
    };
    Ok(format_datetime(dt, &pattern))
}
