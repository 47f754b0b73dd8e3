//! A worked `DslProvider`: signed integers, booleans, division that can
//! raise `zero_division`, and a polymorphic identity — one each of the
//! shapes the pruner's own scenarios exercise.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dfta_prune::dsl::{Callable, DslProvider, EqualityPredicate, ExceptionKind, Sampler, Value};

struct One;
impl Callable for One {
    fn arity(&self) -> usize {
        0
    }
    fn call(&self, _args: &[Value]) -> Result<Value, ExceptionKind> {
        Ok(Value::Int(1))
    }
}

struct Plus;
impl Callable for Plus {
    fn arity(&self) -> usize {
        2
    }
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
        match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            _ => Err(ExceptionKind::new("type_error")),
        }
    }
}

struct Div;
impl Callable for Div {
    fn arity(&self) -> usize {
        2
    }
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
        match (&args[0], &args[1]) {
            (Value::Int(_), Value::Int(0)) => Err(ExceptionKind::new("zero_division")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            _ => Err(ExceptionKind::new("type_error")),
        }
    }
}

struct True;
impl Callable for True {
    fn arity(&self) -> usize {
        0
    }
    fn call(&self, _args: &[Value]) -> Result<Value, ExceptionKind> {
        Ok(Value::Bool(true))
    }
}

struct False;
impl Callable for False {
    fn arity(&self) -> usize {
        0
    }
    fn call(&self, _args: &[Value]) -> Result<Value, ExceptionKind> {
        Ok(Value::Bool(false))
    }
}

struct And;
impl Callable for And {
    fn arity(&self) -> usize {
        2
    }
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
        match (&args[0], &args[1]) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            _ => Err(ExceptionKind::new("type_error")),
        }
    }
}

struct Or;
impl Callable for Or {
    fn arity(&self) -> usize {
        2
    }
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
        match (&args[0], &args[1]) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            _ => Err(ExceptionKind::new("type_error")),
        }
    }
}

struct Identity;
impl Callable for Identity {
    fn arity(&self) -> usize {
        1
    }
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
        Ok(args[0].clone())
    }
}

/// A sampler over a small, fixed sequence of ints, wrapping around —
/// deterministic enough for a worked example, unlike a real provider's RNG.
struct CyclingIntSampler {
    values: &'static [i64],
    cursor: AtomicI64,
}

impl Sampler for CyclingIntSampler {
    fn sample(&self) -> Value {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) as usize % self.values.len();
        Value::Int(self.values[i])
    }
}

struct AlternatingBoolSampler(AtomicI64);
impl Sampler for AlternatingBoolSampler {
    fn sample(&self) -> Value {
        let i = self.0.fetch_add(1, Ordering::Relaxed);
        Value::Bool(i % 2 == 0)
    }
}

struct IntEquality;
impl EqualityPredicate for IntEquality {
    fn equal(&self, a: &Value, b: &Value) -> bool {
        matches!((a, b), (Value::Int(x), Value::Int(y)) if x == y)
    }
}

pub struct ArithmeticDsl {
    dsl: BTreeMap<String, (String, Arc<dyn Callable>)>,
    sample_dict: BTreeMap<String, Arc<dyn Sampler>>,
    equal_dict: BTreeMap<String, Arc<dyn EqualityPredicate>>,
    skip_exceptions: BTreeSet<ExceptionKind>,
}

impl Default for ArithmeticDsl {
    fn default() -> Self {
        let mut dsl: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
        dsl.insert("1".to_string(), ("int".to_string(), Arc::new(One)));
        dsl.insert("+".to_string(), ("int -> int -> int".to_string(), Arc::new(Plus)));
        dsl.insert("/".to_string(), ("int -> int -> int".to_string(), Arc::new(Div)));
        dsl.insert("true".to_string(), ("bool".to_string(), Arc::new(True)));
        dsl.insert("false".to_string(), ("bool".to_string(), Arc::new(False)));
        dsl.insert("and".to_string(), ("bool -> bool -> bool".to_string(), Arc::new(And)));
        dsl.insert("or".to_string(), ("bool -> bool -> bool".to_string(), Arc::new(Or)));
        dsl.insert("id".to_string(), ("'a[int|bool] -> 'a".to_string(), Arc::new(Identity)));

        let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
        sample_dict.insert(
            "int".to_string(),
            Arc::new(CyclingIntSampler {
                values: &[0, 1, -1, 2, -3, 5, -8, 13],
                cursor: AtomicI64::new(0),
            }),
        );
        sample_dict.insert("bool".to_string(), Arc::new(AlternatingBoolSampler(AtomicI64::new(0))));

        let mut equal_dict: BTreeMap<String, Arc<dyn EqualityPredicate>> = BTreeMap::new();
        equal_dict.insert("int".to_string(), Arc::new(IntEquality));

        Self {
            dsl,
            sample_dict,
            equal_dict,
            skip_exceptions: BTreeSet::from([ExceptionKind::new("zero_division")]),
        }
    }
}

impl DslProvider for ArithmeticDsl {
    fn dsl(&self) -> &BTreeMap<String, (String, Arc<dyn Callable>)> {
        &self.dsl
    }
    fn sample_dict(&self) -> &BTreeMap<String, Arc<dyn Sampler>> {
        &self.sample_dict
    }
    fn equal_dict(&self) -> &BTreeMap<String, Arc<dyn EqualityPredicate>> {
        &self.equal_dict
    }
    fn target_type(&self) -> Option<&str> {
        Some("int -> int")
    }
    fn skip_exceptions(&self) -> &BTreeSet<ExceptionKind> {
        &self.skip_exceptions
    }
}

/// The symbol [`dfta_prune::dsl_loader::load_provider`] looks for in a
/// compiled `cdylib`.
///
/// # Safety
///
/// Called only by the loader across the FFI boundary; the returned pointer
/// is immediately reclaimed into a `Box` on the other side.
#[unsafe(no_mangle)]
pub extern "C" fn dfta_prune_dsl_provider() -> *mut Box<dyn DslProvider> {
    let provider: Box<dyn DslProvider> = Box::new(ArithmeticDsl::default());
    Box::into_raw(Box::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_needed_type_has_a_sampler() {
        let provider = ArithmeticDsl::default();
        let dsl = dfta_prune::dsl::Dsl::from_provider(&provider).unwrap();
        assert!(dsl.sample_dict.contains_key("int"));
        assert!(dsl.sample_dict.contains_key("bool"));
    }

    #[test]
    fn identity_expands_into_one_variant_per_branch() {
        let provider = ArithmeticDsl::default();
        let dsl = dfta_prune::dsl::Dsl::from_provider(&provider).unwrap();
        assert!(dsl.entries.keys().any(|k| k.starts_with("id")));
        assert_eq!(dsl.merge_back.values().filter(|v| *v == "id").count(), 2);
    }
}
