#![forbid(unsafe_code)]

//! Evaluator core for the VBA-style expressions stored in Jet/ACE
//! databases (calculated columns, default values, validation rules).
//!
//! The tokenizer and parser live elsewhere; this crate supplies what a
//! parsed expression tree is evaluated against:
//!
//! - the [`Value`] model: a tagged sum over NULL, LONG, DOUBLE, an
//!   arbitrary-precision decimal, STRING and the three temporal types,
//!   with the engine's coercion rules;
//! - the operator kernel in [`ops`], implementing the engine's type
//!   precedence and null-propagation semantics;
//! - the built-in function library in [`functions`], dispatched through a
//!   case-insensitive, pluggable [`FunctionLookup`];
//! - the evaluation context: temporal configuration, named bindings, the
//!   clock, and the VBA-compatible random sequence.
//!
//! Booleans are not a distinct type: `-1` is true and `0` is false, as in
//! the original engine.

mod context;
mod error;
pub mod functions;
mod like;
mod number;
pub mod ops;
mod temporal;
mod value;

pub use context::{Bindings, DbEvalContext, EvalContext, FunctionLookup, RandomContext};
pub use error::{EvalError, Result};
pub use functions::{call_function, DefaultFunctionLookup, FunctionSpec};
pub use like::LikePattern;
pub use temporal::{Temporal, TemporalConfig};
pub use value::{Value, ValueKind, FALSE_VAL, TRUE_VAL};
