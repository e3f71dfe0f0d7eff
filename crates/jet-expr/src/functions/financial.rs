//! Financial functions: the annuity family plus depreciation.
//!
//! Sign conventions follow the engine: money paid out is negative. The
//! `due` flag (0 = payments at period end, 1 = at period start) scales the
//! payment stream by `(1 + rate * due)`.

use crate::functions::{opt_f64, FunctionSpec};
use crate::{EvalContext, EvalError, Result, Value};

const RATE_TOLERANCE: f64 = 1.0e-7;
const RATE_MAX_ITERATIONS: usize = 100;

/// Future value after `nper` periods.
fn fv_value(rate: f64, nper: f64, pmt: f64, pv: f64, due: f64) -> f64 {
    if rate == 0.0 {
        return -(pv + pmt * nper);
    }
    let growth = (1.0 + rate).powf(nper);
    -(pv * growth + pmt * (1.0 + rate * due) * (growth - 1.0) / rate)
}

fn pmt_value(rate: f64, nper: f64, pv: f64, fv: f64, due: f64) -> Result<f64> {
    if nper == 0.0 {
        return Err(EvalError::Arithmetic("division by zero".into()));
    }
    if rate == 0.0 {
        return Ok(-(pv + fv) / nper);
    }
    let growth = (1.0 + rate).powf(nper);
    Ok(-(fv + pv * growth) * rate / ((1.0 + rate * due) * (growth - 1.0)))
}

inventory::submit! {
    FunctionSpec {
        name: "FV",
        aliases: &[],
        min_args: 3,
        max_args: 5,
        pure: true,
        string_alias: false,
        implementation: fv,
    }
}

fn fv(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let rate = args[0].as_double()?;
    let nper = args[1].as_double()?;
    let pmt = args[2].as_double()?;
    let pv = opt_f64(args, 3, 0.0)?;
    let due = opt_f64(args, 4, 0.0)?;
    Ok(Value::Double(fv_value(rate, nper, pmt, pv, due)))
}

inventory::submit! {
    FunctionSpec {
        name: "PV",
        aliases: &[],
        min_args: 3,
        max_args: 5,
        pure: true,
        string_alias: false,
        implementation: pv,
    }
}

fn pv(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let rate = args[0].as_double()?;
    let nper = args[1].as_double()?;
    let pmt = args[2].as_double()?;
    let fv = opt_f64(args, 3, 0.0)?;
    let due = opt_f64(args, 4, 0.0)?;

    let result = if rate == 0.0 {
        -(fv + pmt * nper)
    } else {
        let growth = (1.0 + rate).powf(nper);
        -(fv + pmt * (1.0 + rate * due) * (growth - 1.0) / rate) / growth
    };
    Ok(Value::Double(result))
}

inventory::submit! {
    FunctionSpec {
        name: "Pmt",
        aliases: &[],
        min_args: 3,
        max_args: 5,
        pure: true,
        string_alias: false,
        implementation: pmt,
    }
}

fn pmt(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let rate = args[0].as_double()?;
    let nper = args[1].as_double()?;
    let pv = args[2].as_double()?;
    let fv = opt_f64(args, 3, 0.0)?;
    let due = opt_f64(args, 4, 0.0)?;
    Ok(Value::Double(pmt_value(rate, nper, pv, fv, due)?))
}

inventory::submit! {
    FunctionSpec {
        name: "NPer",
        aliases: &[],
        min_args: 3,
        max_args: 5,
        pure: true,
        string_alias: false,
        implementation: nper,
    }
}

fn nper(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let rate = args[0].as_double()?;
    let pmt = args[1].as_double()?;
    let pv = args[2].as_double()?;
    let fv = opt_f64(args, 3, 0.0)?;
    let due = opt_f64(args, 4, 0.0)?;

    let result = if rate == 0.0 {
        if pmt == 0.0 {
            return Err(EvalError::Arithmetic("division by zero".into()));
        }
        -(pv + fv) / pmt
    } else {
        let adjusted = pmt * (1.0 + rate * due) / rate;
        let ratio = (adjusted - fv) / (adjusted + pv);
        if ratio <= 0.0 {
            return Err(EvalError::Arithmetic(format!(
                "unable to compute NPer for rate {rate}"
            )));
        }
        ratio.ln() / (1.0 + rate).ln()
    };
    Ok(Value::Double(result))
}

inventory::submit! {
    FunctionSpec {
        name: "IPmt",
        aliases: &[],
        min_args: 4,
        max_args: 6,
        pure: true,
        string_alias: false,
        implementation: ipmt,
    }
}

fn ipmt(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let rate = args[0].as_double()?;
    let per = args[1].as_double()?;
    let nper = args[2].as_double()?;
    let pv = args[3].as_double()?;
    let fv = opt_f64(args, 4, 0.0)?;
    let due = opt_f64(args, 5, 0.0)?;
    Ok(Value::Double(ipmt_value(rate, per, nper, pv, fv, due)?))
}

fn ipmt_value(rate: f64, per: f64, nper: f64, pv: f64, fv: f64, due: f64) -> Result<f64> {
    if per < 1.0 || per > nper {
        return Err(EvalError::Argument(format!("period {per} out of range")));
    }
    let payment = pmt_value(rate, nper, pv, fv, due)?;
    // Interest accrues on the balance after per-1 payments.
    let mut interest = fv_value(rate, per - 1.0, payment, pv, due) * rate;
    if due != 0.0 {
        if per == 1.0 {
            return Ok(0.0);
        }
        interest /= 1.0 + rate;
    }
    Ok(interest)
}

inventory::submit! {
    FunctionSpec {
        name: "PPmt",
        aliases: &[],
        min_args: 4,
        max_args: 6,
        pure: true,
        string_alias: false,
        implementation: ppmt,
    }
}

fn ppmt(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let rate = args[0].as_double()?;
    let per = args[1].as_double()?;
    let nper = args[2].as_double()?;
    let pv = args[3].as_double()?;
    let fv = opt_f64(args, 4, 0.0)?;
    let due = opt_f64(args, 5, 0.0)?;

    let payment = pmt_value(rate, nper, pv, fv, due)?;
    let interest = ipmt_value(rate, per, nper, pv, fv, due)?;
    Ok(Value::Double(payment - interest))
}

inventory::submit! {
    FunctionSpec {
        name: "Rate",
        aliases: &[],
        min_args: 3,
        max_args: 6,
        pure: true,
        string_alias: false,
        implementation: rate,
    }
}

// Secant iteration on the future-value balance; there is no closed form.
fn rate(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let nper = args[0].as_double()?;
    let pmt = args[1].as_double()?;
    let pv = args[2].as_double()?;
    let fv = opt_f64(args, 3, 0.0)?;
    let due = opt_f64(args, 4, 0.0)?;
    let guess = opt_f64(args, 5, 0.1)?;

    let balance = |rate: f64| -> f64 {
        if rate == 0.0 {
            pv + pmt * nper + fv
        } else {
            let growth = (1.0 + rate).powf(nper);
            pv * growth + pmt * (1.0 + rate * due) * (growth - 1.0) / rate + fv
        }
    };

    let mut x0 = guess;
    let mut x1 = guess + 0.01;
    let mut y0 = balance(x0);
    let mut y1 = balance(x1);
    for _ in 0..RATE_MAX_ITERATIONS {
        let denominator = y1 - y0;
        if denominator == 0.0 || !denominator.is_finite() {
            break;
        }
        let next = x1 - y1 * (x1 - x0) / denominator;
        if !next.is_finite() {
            break;
        }
        if (next - x1).abs() <= RATE_TOLERANCE {
            return Ok(Value::Double(next));
        }
        x0 = x1;
        y0 = y1;
        x1 = next;
        y1 = balance(x1);
    }
    Err(EvalError::Argument(
        "unable to find a rate for the given terms".into(),
    ))
}

inventory::submit! {
    FunctionSpec {
        name: "SLN",
        aliases: &[],
        min_args: 3,
        max_args: 3,
        pure: true,
        string_alias: false,
        implementation: sln,
    }
}

/// Straight-line depreciation.
fn sln(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let cost = args[0].as_double()?;
    let salvage = args[1].as_double()?;
    let life = args[2].as_double()?;
    if life == 0.0 {
        return Err(EvalError::Arithmetic("division by zero".into()));
    }
    Ok(Value::Double((cost - salvage) / life))
}

inventory::submit! {
    FunctionSpec {
        name: "SYD",
        aliases: &[],
        min_args: 4,
        max_args: 4,
        pure: true,
        string_alias: false,
        implementation: syd,
    }
}

/// Sum-of-years'-digits depreciation.
fn syd(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let cost = args[0].as_double()?;
    let salvage = args[1].as_double()?;
    let life = args[2].as_double()?;
    let per = args[3].as_double()?;
    if life <= 0.0 || per <= 0.0 || per > life {
        return Err(EvalError::Argument(format!("period {per} out of range")));
    }
    let sum = life * (life + 1.0) / 2.0;
    Ok(Value::Double((cost - salvage) * (life - per + 1.0) / sum))
}

inventory::submit! {
    FunctionSpec {
        name: "DDB",
        aliases: &[],
        min_args: 4,
        max_args: 5,
        pure: true,
        string_alias: false,
        implementation: ddb,
    }
}

/// Double-declining-balance depreciation with an optional factor.
fn ddb(_ctx: &dyn EvalContext, args: &[Value]) -> Result<Value> {
    let cost = args[0].as_double()?;
    let salvage = args[1].as_double()?;
    let life = args[2].as_double()?;
    let period = args[3].as_double()?;
    let factor = opt_f64(args, 4, 2.0)?;

    if life <= 0.0 || period <= 0.0 || period > life || factor <= 0.0 {
        return Err(EvalError::Argument(format!("period {period} out of range")));
    }

    let mut accumulated = 0.0;
    let target = period.floor() as i32;
    for _ in 1..target {
        accumulated += depreciation_step(cost, salvage, life, factor, accumulated);
    }
    Ok(Value::Double(depreciation_step(
        cost,
        salvage,
        life,
        factor,
        accumulated,
    )))
}

fn depreciation_step(cost: f64, salvage: f64, life: f64, factor: f64, accumulated: f64) -> f64 {
    let remaining = cost - accumulated;
    if remaining <= salvage {
        return 0.0;
    }
    let step = (remaining * factor / life).min(remaining - salvage);
    step.max(0.0)
}
