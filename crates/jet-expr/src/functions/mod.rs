//! The built-in function library.
//!
//! Functions register themselves with `inventory` and are frozen into a
//! process-wide map keyed by lowercased canonical name on first lookup.
//! Per-context resolution goes through the pluggable
//! [`FunctionLookup`](crate::FunctionLookup) trait; the default
//! implementation is backed by this registry.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::{EvalContext, EvalError, FunctionLookup, Result, Value};

mod datetime;
mod financial;
mod math;
mod misc;
mod text;

pub(crate) use datetime::non_null_to_temporal;

/// Marker for "any number of arguments".
pub const VAR_ARGS: usize = 255;

pub type FunctionImpl = fn(&dyn EvalContext, &[Value]) -> Result<Value>;

/// A built-in function: canonical name, arity range and implementation.
pub struct FunctionSpec {
    pub name: &'static str,
    /// Alternate names resolving to the same function (e.g. `CVDate`).
    pub aliases: &'static [&'static str],
    pub min_args: usize,
    pub max_args: usize,
    /// False for the clock- and randomness-reading functions.
    pub pure: bool,
    /// Also register a `Name$` variant that yields `""` where the plain
    /// function would yield Null.
    pub string_alias: bool,
    pub implementation: FunctionImpl,
}

inventory::collect!(FunctionSpec);

fn registry() -> &'static HashMap<String, &'static FunctionSpec> {
    static REGISTRY: OnceLock<HashMap<String, &'static FunctionSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in inventory::iter::<FunctionSpec> {
            register(&mut map, spec.name, spec);
            for alias in spec.aliases {
                register(&mut map, alias, spec);
            }
            if spec.string_alias {
                let dollar = format!("{}$", spec.name.to_ascii_lowercase());
                assert!(
                    map.insert(dollar, spec).is_none(),
                    "duplicate function {}$",
                    spec.name
                );
            }
        }
        map
    })
}

fn register(
    map: &mut HashMap<String, &'static FunctionSpec>,
    name: &str,
    spec: &'static FunctionSpec,
) {
    let previous = map.insert(name.to_ascii_lowercase(), spec);
    assert!(previous.is_none(), "duplicate function {name}");
}

/// Registry-backed [`FunctionLookup`].
pub struct DefaultFunctionLookup;

impl FunctionLookup for DefaultFunctionLookup {
    fn function(&self, name: &str) -> Option<&'static FunctionSpec> {
        registry().get(&name.to_ascii_lowercase()).copied()
    }
}

/// Resolve `name` through the context's lookup, check arity, and invoke.
///
/// The `$`-suffixed string variants substitute the empty string for a null
/// result.
pub fn call_function(ctx: &dyn EvalContext, name: &str, args: &[Value]) -> Result<Value> {
    let spec = ctx
        .function_lookup()
        .function(name)
        .ok_or_else(|| EvalError::Argument(format!("unknown function '{name}'")))?;
    if args.len() < spec.min_args || args.len() > spec.max_args {
        return Err(EvalError::Argument(format!(
            "invalid number of arguments for {}: {}",
            spec.name,
            args.len()
        )));
    }
    let result = (spec.implementation)(ctx, args)?;
    if result.is_null() && name.ends_with('$') {
        return Ok(Value::Text(String::new()));
    }
    Ok(result)
}

/// Optional numeric argument with a default.
pub(crate) fn opt_f64(args: &[Value], index: usize, default: f64) -> Result<f64> {
    match args.get(index) {
        Some(value) => value.as_double(),
        None => Ok(default),
    }
}

pub(crate) fn opt_i32(args: &[Value], index: usize, default: i32) -> Result<i32> {
    match args.get(index) {
        Some(value) => value.as_long(),
        None => Ok(default),
    }
}
