//! Date/time functions.
//!
//! All arithmetic runs on the date-double; calendar math (month and year
//! intervals) goes through the calendar so day-of-month clamping behaves
//! like the original engine.

use chrono::{Datelike, Timelike};

use crate::functions::{opt_i32, FunctionSpec};
use crate::ops::to_date_value;
use crate::temporal::{
    date_double_to_datetime, date_from_serial_parts, datetime_to_date_double, parse_temporal,
    time_fraction,
};
use crate::{EvalContext, EvalError, Result, Value, ValueKind};

/// Convert a non-null value to a temporal value: temporals pass through,
/// numbers are interpreted as date-doubles, strings are parsed with the
/// context's temporal configuration.
pub(crate) fn non_null_to_temporal(ctx: &dyn EvalContext, value: &Value) -> Result<Value> {
    match value {
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) => Ok(value.clone()),
        Value::Long(_) | Value::Double(_) | Value::BigDec(_) => {
            let dd = value.as_double()?;
            let kind = if dd.fract() == 0.0 {
                ValueKind::Date
            } else if dd.abs() < 1.0 {
                ValueKind::Time
            } else {
                ValueKind::DateTime
            };
            to_date_value(ctx, kind, dd, value, None)
        }
        Value::Text(text) => {
            let (dd, parsed) = parse_temporal(text, ctx.temporal_config())?;
            to_date_value(ctx, parsed.value_kind(), dd, value, None)
        }
        Value::Null => Err(EvalError::Type("invalid date/time value 'Null'".into())),
    }
}

fn to_datetime(ctx: &dyn EvalContext, value: &Value) -> Result<chrono::NaiveDateTime> {
    let temporal = non_null_to_temporal(ctx, value)?;
    Ok(date_double_to_datetime(temporal.as_double()?))
}

inventory::submit! {
    FunctionSpec {
        name: "Now",
        aliases: &[],
        min_args: 0,
        max_args: 0,
        pure: false,
        string_alias: false,
        implementation: now,
    }
}

fn now(ctx: &dyn EvalContext, _args: &[Value]) -> Result<Value> {
    let dd = datetime_to_date_double(ctx.now());
    to_date_value(ctx, ValueKind::DateTime, dd, &Value::Null, None)
}

inventory::submit! {
    FunctionSpec {
        name: "Date",
        aliases: &[],
        min_args: 0,
        max_args: 0,
        pure: false,
        string_alias: false,
        implementation: today,
    }
}

fn today(ctx: &dyn EvalContext, _args: &[Value]) -> Result<Value> {
    let dd = datetime_to_date_double(ctx.now()).trunc();
    to_date_value(ctx, ValueKind::Date, dd, &Value::Null, None)
}

inventory::submit! {
    FunctionSpec {
        name: "Time",
        aliases: &[],
        min_args: 0,
        max_args: 0,
        pure: false,
        string_alias: false,
        implementation: time_now,
    }
}

fn time_now(ctx: &dyn EvalContext, _args: &[Value]) -> Result<Value> {
    let dd = datetime_to_date_double(ctx.now()).fract();
    to_date_value(ctx, ValueKind::Time, dd, &Value::Null, None)
}

inventory::submit! {
    FunctionSpec {
        name: "DateValue",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: datevalue,
    }
}

fn datevalue(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let temporal = non_null_to_temporal(ctx, &args[0])?;
    to_date_value(ctx, ValueKind::Date, temporal.as_double()?.trunc(), &args[0], None)
}

inventory::submit! {
    FunctionSpec {
        name: "TimeValue",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        pure: true,
        string_alias: false,
        implementation: timevalue,
    }
}

fn timevalue(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let temporal = non_null_to_temporal(ctx, &args[0])?;
    to_date_value(ctx, ValueKind::Time, temporal.as_double()?.fract(), &args[0], None)
}

inventory::submit! {
    FunctionSpec {
        name: "DateSerial",
        aliases: &[],
        min_args: 3,
        max_args: 3,
        pure: true,
        string_alias: false,
        implementation: dateserial,
    }
}

fn dateserial(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let year = args[0].as_long()?;
    let month = args[1].as_long()?;
    let day = args[2].as_long()?;
    let date = date_from_serial_parts(year, month, day)?;
    let dd = datetime_to_date_double(
        date.and_hms_opt(0, 0, 0)
            .ok_or_else(|| EvalError::Arithmetic("invalid date".into()))?,
    );
    to_date_value(ctx, ValueKind::Date, dd, &Value::Null, None)
}

inventory::submit! {
    FunctionSpec {
        name: "TimeSerial",
        aliases: &[],
        min_args: 3,
        max_args: 3,
        pure: true,
        string_alias: false,
        implementation: timeserial,
    }
}

fn timeserial(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let fraction = time_fraction(
        args[0].as_long()?,
        args[1].as_long()?,
        args[2].as_long()?,
    );
    to_date_value(ctx, ValueKind::Time, fraction, &Value::Null, None)
}

macro_rules! component_fn {
    ($fn_name:ident, $name:literal, $extract:expr) => {
        inventory::submit! {
            FunctionSpec {
                name: $name,
                aliases: &[],
                min_args: 1,
                max_args: 1,
                pure: true,
                string_alias: false,
                implementation: $fn_name,
            }
        }

        fn $fn_name(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
            if args[0].is_null() {
                return Ok(Value::Null);
            }
            let dt = to_datetime(ctx, &args[0])?;
            let extract: fn(chrono::NaiveDateTime) -> i32 = $extract;
            Ok(Value::Long(extract(dt)))
        }
    };
}

component_fn!(year_of, "Year", |dt| dt.year());
component_fn!(month_of, "Month", |dt| dt.month() as i32);
component_fn!(day_of, "Day", |dt| dt.day() as i32);
component_fn!(hour_of, "Hour", |dt| dt.hour() as i32);
component_fn!(minute_of, "Minute", |dt| dt.minute() as i32);
component_fn!(second_of, "Second", |dt| dt.second() as i32);

inventory::submit! {
    FunctionSpec {
        name: "Weekday",
        aliases: &[],
        min_args: 1,
        max_args: 2,
        pure: true,
        string_alias: false,
        implementation: weekday,
    }
}

fn weekday(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let first_day = opt_i32(args, 1, 1)?;
    let dt = to_datetime(ctx, &args[0])?;
    Ok(Value::Long(weekday_number(dt.date(), first_day)?))
}

/// 1-based weekday with a configurable week start (1 = Sunday).
fn weekday_number(date: chrono::NaiveDate, first_day: i32) -> Result<i32> {
    if !(1..=7).contains(&first_day) {
        return Err(EvalError::Argument(format!(
            "invalid first day of week {first_day}"
        )));
    }
    let from_sunday = date.weekday().num_days_from_sunday() as i32;
    Ok((from_sunday + 7 - (first_day - 1)) % 7 + 1)
}

inventory::submit! {
    FunctionSpec {
        name: "DatePart",
        aliases: &[],
        min_args: 2,
        max_args: 4,
        pure: true,
        string_alias: false,
        implementation: datepart,
    }
}

fn datepart(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[1].is_null() {
        return Ok(Value::Null);
    }
    let interval = args[0].as_string()?;
    let first_day = opt_i32(args, 2, 1)?;
    let dt = to_datetime(ctx, &args[1])?;

    let part = match interval.to_ascii_lowercase().as_str() {
        "yyyy" => dt.year(),
        "q" => (dt.month() as i32 - 1) / 3 + 1,
        "m" => dt.month() as i32,
        "y" => dt.ordinal() as i32,
        "d" => dt.day() as i32,
        "w" => weekday_number(dt.date(), first_day)?,
        "ww" => week_of_year(dt.date(), first_day)?,
        "h" => dt.hour() as i32,
        "n" => dt.minute() as i32,
        "s" => dt.second() as i32,
        other => {
            return Err(EvalError::Argument(format!(
                "invalid interval '{other}'"
            )))
        }
    };
    Ok(Value::Long(part))
}

/// Week containing January 1st is week 1; weeks begin on `first_day`.
fn week_of_year(date: chrono::NaiveDate, first_day: i32) -> Result<i32> {
    let jan1 = chrono::NaiveDate::from_ymd_opt(date.year(), 1, 1)
        .ok_or_else(|| EvalError::Arithmetic("invalid year".into()))?;
    let offset = weekday_number(jan1, first_day)? - 1;
    Ok((date.ordinal0() as i32 + offset) / 7 + 1)
}

inventory::submit! {
    FunctionSpec {
        name: "DateAdd",
        aliases: &[],
        min_args: 3,
        max_args: 3,
        pure: true,
        string_alias: false,
        implementation: dateadd,
    }
}

fn dateadd(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[2].is_null() {
        return Ok(Value::Null);
    }
    let interval = args[0].as_string()?;
    let amount = args[1].as_long()?;
    let temporal = non_null_to_temporal(ctx, &args[2])?;
    let dd = temporal.as_double()?;

    let new_dd = match interval.to_ascii_lowercase().as_str() {
        "yyyy" => add_months(dd, amount.checked_mul(12).ok_or_else(overflow)?)?,
        "q" => add_months(dd, amount.checked_mul(3).ok_or_else(overflow)?)?,
        "m" => add_months(dd, amount)?,
        "d" | "y" | "w" => dd + f64::from(amount),
        "ww" => dd + f64::from(amount) * 7.0,
        "h" => dd + f64::from(amount) / 24.0,
        "n" => dd + f64::from(amount) / 1_440.0,
        "s" => dd + f64::from(amount) / 86_400.0,
        other => {
            return Err(EvalError::Argument(format!(
                "invalid interval '{other}'"
            )))
        }
    };
    to_date_value(ctx, temporal.kind(), new_dd, &temporal, None)
}

fn overflow() -> EvalError {
    EvalError::Arithmetic("interval amount out of range".into())
}

/// Month arithmetic with day-of-month clamping (Jan 31 + 1 month is the
/// last day of February).
fn add_months(dd: f64, months: i32) -> Result<f64> {
    let dt = date_double_to_datetime(dd);
    let total = i64::from(dt.year()) * 12 + i64::from(dt.month0()) + i64::from(months);
    let year = total.div_euclid(12) as i32;
    let month = total.rem_euclid(12) as u32 + 1;
    let last_day = days_in_month(year, month)?;
    let day = dt.day().min(last_day);
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EvalError::Arithmetic("date out of range".into()))?;
    let base = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| EvalError::Arithmetic("date out of range".into()))?;
    Ok(datetime_to_date_double(base) + dd.fract())
}

fn days_in_month(year: i32, month: u32) -> Result<u32> {
    let first = chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EvalError::Arithmetic("date out of range".into()))?;
    let next = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| EvalError::Arithmetic("date out of range".into()))?;
    Ok(next.signed_duration_since(first).num_days() as u32)
}

inventory::submit! {
    FunctionSpec {
        name: "DateDiff",
        aliases: &[],
        min_args: 3,
        max_args: 5,
        pure: true,
        string_alias: false,
        implementation: datediff,
    }
}

fn datediff(ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    if args[1].is_null() || args[2].is_null() {
        return Ok(Value::Null);
    }
    let interval = args[0].as_string()?;
    let first_day = opt_i32(args, 3, 1)?;

    let t1 = non_null_to_temporal(ctx, &args[1])?;
    let t2 = non_null_to_temporal(ctx, &args[2])?;
    let dd1 = t1.as_double()?;
    let dd2 = t2.as_double()?;
    let dt1 = date_double_to_datetime(dd1);
    let dt2 = date_double_to_datetime(dd2);

    let diff: i64 = match interval.to_ascii_lowercase().as_str() {
        "yyyy" => i64::from(dt2.year() - dt1.year()),
        "q" => {
            let q1 = i64::from(dt1.year()) * 4 + i64::from((dt1.month() - 1) / 3);
            let q2 = i64::from(dt2.year()) * 4 + i64::from((dt2.month() - 1) / 3);
            q2 - q1
        }
        "m" => {
            let m1 = i64::from(dt1.year()) * 12 + i64::from(dt1.month0());
            let m2 = i64::from(dt2.year()) * 12 + i64::from(dt2.month0());
            m2 - m1
        }
        "d" | "y" => day_index(dd2) - day_index(dd1),
        "w" => (day_index(dd2) - day_index(dd1)) / 7,
        "ww" => {
            let start1 = day_index(dd1) - i64::from(weekday_number(dt1.date(), first_day)? - 1);
            let start2 = day_index(dd2) - i64::from(weekday_number(dt2.date(), first_day)? - 1);
            (start2 - start1) / 7
        }
        "h" => second_index(dd2).div_euclid(3600) - second_index(dd1).div_euclid(3600),
        "n" => second_index(dd2).div_euclid(60) - second_index(dd1).div_euclid(60),
        "s" => second_index(dd2) - second_index(dd1),
        other => {
            return Err(EvalError::Argument(format!(
                "invalid interval '{other}'"
            )))
        }
    };
    i32::try_from(diff)
        .map(Value::Long)
        .map_err(|_| EvalError::Arithmetic("interval difference out of range".into()))
}

fn day_index(dd: f64) -> i64 {
    dd.floor() as i64
}

fn second_index(dd: f64) -> i64 {
    (dd * 86_400.0).round() as i64
}
