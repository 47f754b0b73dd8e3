//! Executing a candidate program on a fixed input suite and producing the
//! behavior signature the pruner buckets equivalence classes by (spec.md
//! §4.E).

use std::collections::BTreeMap;

use crate::dsl::{Dsl, EqualityPredicate, StructuralEquality, Value};
use crate::errors::EvaluatorFatalError;
use crate::sampling::sample_inputs;
use crate::term::Term;

/// One input's result: either the value produced, or "undefined" because
/// the callable raised an exception the provider declared skippable.
#[derive(Clone, Debug)]
pub enum Outcome {
    Value(Value),
    Undefined,
}

impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        matches!((self, other), (Outcome::Undefined, Outcome::Undefined))
    }
}

/// A candidate's behavior across the whole input suite: the unit the
/// pruner compares two programs by (spec.md §4.G, "behaviorally equal").
#[derive(Clone, Debug)]
pub struct Signature(pub Vec<Outcome>);

impl Signature {
    /// `true` iff every input position agrees, using `equality` (the
    /// provider's predicate for the program's return type, or structural
    /// equality as the default).
    #[must_use]
    pub fn equals(&self, other: &Signature, equality: &dyn EqualityPredicate) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| match (a, b) {
                    (Outcome::Undefined, Outcome::Undefined) => true,
                    (Outcome::Value(a), Outcome::Value(b)) => equality.equal(a, b),
                    _ => false,
                })
    }
}

/// Evaluates candidate programs against a fixed sample-input suite.
pub struct Evaluator<'a> {
    dsl: &'a Dsl,
    /// type -> `num_samples` pre-sampled values of that type.
    samples: BTreeMap<String, Vec<Value>>,
    num_samples: usize,
}

impl<'a> Evaluator<'a> {
    /// Draws `num_samples` values for every type in `needed_types`, using
    /// `dsl.sample_dict` (see [`crate::sampling::sample_inputs`] for the
    /// duplicate-avoidance policy).
    #[must_use]
    pub fn new(dsl: &'a Dsl, needed_types: &[String], num_samples: usize) -> Self {
        let samples = sample_inputs(dsl, needed_types, num_samples);
        Self { dsl, samples, num_samples }
    }

    /// Runs `term` (whose free variables have types `arg_types`) on every
    /// row of the sample suite, returning one [`Outcome`] per row.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorFatalError`] the first time a callable raises an
    /// exception kind absent from the provider's `skip_exceptions` — this
    /// is treated as an author error, not a sampled runtime condition
    /// (spec.md §7, "a contract with the DSL author").
    pub fn evaluate(&self, term: &Term, arg_types: &[String]) -> Result<Signature, EvaluatorFatalError> {
        let mut outcomes = Vec::with_capacity(self.num_samples);
        for row in 0..self.num_samples {
            let bindings: Vec<Value> = arg_types
                .iter()
                .map(|ty| self.samples.get(ty).map(|v| v[row].clone()).unwrap_or(Value::Int(0)))
                .collect();
            let outcome = match self.eval_term(term, &bindings) {
                Ok(v) => Outcome::Value(v),
                Err(kind) if self.dsl.skip_exceptions.contains(&kind) => Outcome::Undefined,
                Err(kind) => {
                    return Err(EvaluatorFatalError {
                        program: term.to_string(),
                        input_type: arg_types.join(" -> "),
                        input_index: row,
                        message: kind.0,
                    });
                }
            };
            outcomes.push(outcome);
        }
        Ok(Signature(outcomes))
    }

    fn eval_term(&self, term: &Term, bindings: &[Value]) -> Result<Value, crate::dsl::ExceptionKind> {
        match term {
            Term::Variable(n) => Ok(bindings[*n as usize].clone()),
            Term::Primitive(name) => {
                let (_, callable) = self
                    .dsl
                    .entries
                    .get(name.as_ref())
                    .unwrap_or_else(|| panic!("primitive `{name}` not in DSL"));
                callable.call(&[])
            }
            Term::Application(head, args) => {
                let name = head.head_name();
                let (_, callable) = self
                    .dsl
                    .entries
                    .get(&name)
                    .unwrap_or_else(|| panic!("primitive `{name}` not in DSL"));
                let evaluated: Result<Vec<Value>, _> =
                    args.iter().map(|a| self.eval_term(a, bindings)).collect();
                callable.call(&evaluated?)
            }
        }
    }

    /// The equality predicate to compare two signatures of return type
    /// `return_type` with, falling back to structural equality.
    #[must_use]
    pub fn equality_for(&self, return_type: &str) -> &dyn EqualityPredicate {
        static FALLBACK: StructuralEquality = StructuralEquality;
        self.dsl.equal_for(return_type, &FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{Callable, ExceptionKind, Sampler};
    use std::sync::Arc;

    struct Add;
    impl Callable for Add {
        fn arity(&self) -> usize {
            2
        }
        fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
            match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
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
    struct ConstSampler(i64);
    impl Sampler for ConstSampler {
        fn sample(&self) -> Value {
            Value::Int(self.0)
        }
    }

    fn dsl_with(name: &str, ty: &str, callable: Arc<dyn Callable>, skip: &[&str]) -> Dsl {
        let mut entries: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
        entries.insert(name.to_string(), (ty.to_string(), callable));
        let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
        sample_dict.insert("int".to_string(), Arc::new(ConstSampler(0)));
        Dsl {
            entries,
            merge_back: BTreeMap::new(),
            sample_dict,
            equal_dict: BTreeMap::new(),
            target_type: Some("int".to_string()),
            skip_exceptions: skip.iter().map(|s| ExceptionKind::new(*s)).collect(),
        }
    }

    #[test]
    fn evaluates_application_over_variables() {
        let dsl = dsl_with("+", "int -> int -> int", Arc::new(Add), &[]);
        let evaluator = Evaluator::new(&dsl, &["int".to_string()], 3);
        let term = Term::apply(Term::Primitive(Arc::from("+")), vec![Term::Variable(0), Term::Variable(0)]);
        let sig = evaluator
            .evaluate(&term, &["int".to_string(), "int".to_string()])
            .unwrap();
        assert_eq!(sig.0.len(), 3);
    }

    #[test]
    fn skip_exceptions_become_undefined() {
        let dsl = dsl_with("/", "int -> int -> int", Arc::new(Div), &["zero_division"]);
        let evaluator = Evaluator::new(&dsl, &["int".to_string()], 2);
        let term = Term::apply(Term::Primitive(Arc::from("/")), vec![Term::Variable(0), Term::Variable(0)]);
        let sig = evaluator
            .evaluate(&term, &["int".to_string(), "int".to_string()])
            .unwrap();
        assert!(matches!(sig.0[0], Outcome::Undefined));
    }

    #[test]
    fn unskipped_exception_is_fatal() {
        let dsl = dsl_with("/", "int -> int -> int", Arc::new(Div), &[]);
        let evaluator = Evaluator::new(&dsl, &["int".to_string()], 2);
        let term = Term::apply(Term::Primitive(Arc::from("/")), vec![Term::Variable(0), Term::Variable(0)]);
        let result = evaluator.evaluate(&term, &["int".to_string(), "int".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn signature_equality_uses_structural_default() {
        let a = Signature(vec![Outcome::Value(Value::Int(1))]);
        let b = Signature(vec![Outcome::Value(Value::Int(1))]);
        let eq = StructuralEquality;
        assert!(a.equals(&b, &eq));
    }
}
