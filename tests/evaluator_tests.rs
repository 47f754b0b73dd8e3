use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dfta_prune::dsl::{Callable, Dsl, ExceptionKind, Sampler, Value};
use dfta_prune::evaluator::{Evaluator, Outcome};
use dfta_prune::term::Term;

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
struct CyclingSampler(std::sync::atomic::AtomicI64);
impl Sampler for CyclingSampler {
    fn sample(&self) -> Value {
        let i = self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Value::Int(i % 2)
    }
}

fn div_dsl(skip: &[&str]) -> Dsl {
    let mut entries: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
    entries.insert("/".to_string(), ("int -> int -> int".to_string(), Arc::new(Div)));
    let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
    sample_dict.insert("int".to_string(), Arc::new(CyclingSampler(std::sync::atomic::AtomicI64::new(0))));
    Dsl {
        entries,
        merge_back: BTreeMap::new(),
        sample_dict,
        equal_dict: BTreeMap::new(),
        target_type: Some("int -> int -> int".to_string()),
        skip_exceptions: skip.iter().map(|s| ExceptionKind::new(*s)).collect::<BTreeSet<_>>(),
    }
}

#[test]
fn division_by_a_sampled_zero_becomes_undefined_when_skippable() {
    let dsl = div_dsl(&["zero_division"]);
    let evaluator = Evaluator::new(&dsl, &["int".to_string()], 4);
    let term = Term::apply(Term::Primitive(Arc::from("/")), vec![Term::Variable(0), Term::Variable(1)]);
    let sig = evaluator
        .evaluate(&term, &["int".to_string(), "int".to_string()])
        .unwrap();
    assert!(sig.0.iter().any(|o| matches!(o, Outcome::Undefined)));
}

#[test]
fn an_undeclared_exception_kind_aborts_the_run() {
    let dsl = div_dsl(&[]);
    let evaluator = Evaluator::new(&dsl, &["int".to_string()], 4);
    let term = Term::apply(Term::Primitive(Arc::from("/")), vec![Term::Variable(0), Term::Variable(1)]);
    let result = evaluator.evaluate(&term, &["int".to_string(), "int".to_string()]);
    let err = result.unwrap_err();
    assert_eq!(err.input_type, "int -> int");
}

#[test]
fn two_terms_with_the_same_outcomes_compare_equal_under_structural_equality() {
    let dsl = div_dsl(&["zero_division"]);
    let evaluator = Evaluator::new(&dsl, &["int".to_string()], 4);
    let term = Term::apply(Term::Primitive(Arc::from("/")), vec![Term::Variable(0), Term::Variable(1)]);
    let a = evaluator.evaluate(&term, &["int".to_string(), "int".to_string()]).unwrap();
    let b = evaluator.evaluate(&term, &["int".to_string(), "int".to_string()]).unwrap();
    let equality = evaluator.equality_for("int");
    assert!(a.equals(&b, equality));
}
