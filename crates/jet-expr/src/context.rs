//! Evaluation context: configuration, bindings, clock and randomness.

use std::cell::Cell;
use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::functions::FunctionSpec;
use crate::temporal::TemporalConfig;
use crate::{Value, ValueKind};

/// Pluggable resolver from (case-insensitive) function name to function.
pub trait FunctionLookup {
    fn function(&self, name: &str) -> Option<&'static FunctionSpec>;
}

/// Named values exposed to function evaluation for user bindings.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Bindings {
        Bindings::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What expression evaluation reads from its surroundings.
///
/// Everything is single-threaded; the only mutability is the random
/// sequence, which uses interior mutability so evaluation can stay `&self`.
pub trait EvalContext {
    fn temporal_config(&self) -> &TemporalConfig;

    fn function_lookup(&self) -> &dyn FunctionLookup;

    fn bindings(&self) -> &Bindings;

    /// The requested output type of the whole expression, when known
    /// (affects `Nz` and `CDate`).
    fn result_type(&self) -> Option<ValueKind>;

    /// Current wall-clock instant (local time).
    fn now(&self) -> NaiveDateTime;

    /// Next value of the VBA-compatible random sequence; see
    /// [`RandomContext::random`] for the seed contract.
    fn random(&self, seed: Option<i32>) -> f32;
}

/// The VBA `Rnd` generator: a 24-bit LCG,
/// `x <- (x * 1140671485 + 12820163) mod 2^24`, yielding `x / 2^24`.
#[derive(Debug)]
pub struct RandomContext {
    state: Cell<u32>,
    last: Cell<f32>,
}

const RND_MULTIPLIER: u32 = 1_140_671_485;
const RND_INCREMENT: u32 = 12_820_163;
const RND_MASK: u32 = 0x00FF_FFFF;
const RND_SEED: u32 = 0x0005_0000;

impl Default for RandomContext {
    fn default() -> Self {
        RandomContext {
            state: Cell::new(RND_SEED),
            last: Cell::new(RND_SEED as f32 / 16_777_216.0),
        }
    }
}

impl RandomContext {
    pub fn new() -> RandomContext {
        RandomContext::default()
    }

    /// - `None` or a positive seed: next number in the sequence.
    /// - Zero: the most recently generated number again.
    /// - Negative: reseed deterministically from the seed's single-float
    ///   bit pattern, then return the first number of the new sequence.
    pub fn random(&self, seed: Option<i32>) -> f32 {
        match seed {
            Some(0) => self.last.get(),
            Some(s) if s < 0 => {
                let bits = (s as f32).to_bits();
                self.state
                    .set(bits.wrapping_add(bits >> 24) & RND_MASK);
                self.next_value()
            }
            _ => self.next_value(),
        }
    }

    fn next_value(&self) -> f32 {
        let next = self
            .state
            .get()
            .wrapping_mul(RND_MULTIPLIER)
            .wrapping_add(RND_INCREMENT)
            & RND_MASK;
        self.state.set(next);
        let value = next as f32 / 16_777_216.0;
        self.last.set(value);
        value
    }
}

/// Default [`EvalContext`] implementation backed by the built-in function
/// registry, with setters for every pluggable piece.
pub struct DbEvalContext {
    temporal: TemporalConfig,
    lookup: Box<dyn FunctionLookup>,
    bindings: Bindings,
    result_type: Option<ValueKind>,
    random: RandomContext,
}

impl Default for DbEvalContext {
    fn default() -> Self {
        DbEvalContext {
            temporal: TemporalConfig::default(),
            lookup: Box::new(crate::functions::DefaultFunctionLookup),
            bindings: Bindings::new(),
            result_type: None,
            random: RandomContext::new(),
        }
    }
}

impl DbEvalContext {
    pub fn new() -> DbEvalContext {
        DbEvalContext::default()
    }

    pub fn set_temporal_config(&mut self, config: TemporalConfig) {
        self.temporal = config;
    }

    pub fn set_function_lookup(&mut self, lookup: Box<dyn FunctionLookup>) {
        self.lookup = lookup;
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    pub fn set_result_type(&mut self, result_type: Option<ValueKind>) {
        self.result_type = result_type;
    }
}

impl EvalContext for DbEvalContext {
    fn temporal_config(&self) -> &TemporalConfig {
        &self.temporal
    }

    fn function_lookup(&self) -> &dyn FunctionLookup {
        self.lookup.as_ref()
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn result_type(&self) -> Option<ValueKind> {
        self.result_type
    }

    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn random(&self, seed: Option<i32>) -> f32 {
        self.random.random(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rnd_sequence_is_the_vba_lcg() {
        let ctx = RandomContext::new();
        // First values of the untouched VBA sequence.
        let first = ctx.random(None);
        let second = ctx.random(None);
        let third = ctx.random(None);
        assert!((first - 0.705_547_5).abs() < 1e-6, "got {first}");
        assert!((second - 0.533_424_0).abs() < 1e-6, "got {second}");
        assert!((third - 0.579_518_6).abs() < 1e-6, "got {third}");
    }

    #[test]
    fn rnd_zero_repeats_the_last_number() {
        let ctx = RandomContext::new();
        let value = ctx.random(None);
        assert_eq!(ctx.random(Some(0)), value);
        assert_eq!(ctx.random(Some(0)), value);
    }

    #[test]
    fn rnd_negative_seed_restarts_deterministically() {
        let a = RandomContext::new();
        let b = RandomContext::new();
        // Scramble one sequence before reseeding.
        a.random(None);
        a.random(None);
        let ra = a.random(Some(-7));
        let rb = b.random(Some(-7));
        assert_eq!(ra, rb);
        assert_eq!(a.random(None), b.random(None));
    }

    #[test]
    fn rnd_values_are_in_unit_interval() {
        let ctx = RandomContext::new();
        for _ in 0..1000 {
            let v = ctx.random(None);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
