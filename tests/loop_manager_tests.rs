use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dfta_prune::dsl::{Callable, Dsl, DslProvider, EqualityPredicate, ExceptionKind, Sampler, Value};
use dfta_prune::loop_manager::{add_loops, LoopingAlgorithm};
use dfta_prune::pruner::prune;

struct Succ;
impl Callable for Succ {
    fn arity(&self) -> usize {
        1
    }
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind> {
        match &args[0] {
            Value::Int(a) => Ok(Value::Int(a + 1)),
            _ => Err(ExceptionKind::new("type_error")),
        }
    }
}
struct IntSampler(AtomicI64);
impl Sampler for IntSampler {
    fn sample(&self) -> Value {
        Value::Int(self.0.fetch_add(1, Ordering::Relaxed))
    }
}
struct Provider {
    dsl: BTreeMap<String, (String, Arc<dyn Callable>)>,
    sample_dict: BTreeMap<String, Arc<dyn Sampler>>,
}
impl DslProvider for Provider {
    fn dsl(&self) -> &BTreeMap<String, (String, Arc<dyn Callable>)> {
        &self.dsl
    }
    fn sample_dict(&self) -> &BTreeMap<String, Arc<dyn Sampler>> {
        &self.sample_dict
    }
    fn equal_dict(&self) -> &BTreeMap<String, Arc<dyn EqualityPredicate>> {
        static EMPTY: std::sync::OnceLock<BTreeMap<String, Arc<dyn EqualityPredicate>>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(BTreeMap::new)
    }
    fn target_type(&self) -> Option<&str> {
        Some("int -> int")
    }
    fn skip_exceptions(&self) -> &BTreeSet<ExceptionKind> {
        static EMPTY: std::sync::OnceLock<BTreeSet<ExceptionKind>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(BTreeSet::new)
    }
}

/// Scenario 4 — after loop closure, the automaton accepts strictly more
/// size-10 trees than the finite pre-closure grammar could, and every
/// program it still accepts at small sizes evaluates the same as before.
#[test]
fn closing_the_loop_makes_the_automaton_accept_larger_programs() {
    let mut dsl: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
    dsl.insert("succ".to_string(), ("int -> int".to_string(), Arc::new(Succ)));
    let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
    sample_dict.insert("int".to_string(), Arc::new(IntSampler(AtomicI64::new(0))));
    let provider = Provider { dsl, sample_dict };
    let dsl = Dsl::from_provider(&provider).unwrap();

    let pruned = prune(&dsl, 3, 2).unwrap();
    let pre_closure_at_ten = pruned.dfta.trees_at_size(10);
    assert_eq!(pre_closure_at_ten, 0, "size 3 grammar has no size-10 derivation yet");

    let closed = add_loops(
        &pruned.dfta,
        &dsl,
        &pruned.state_to_type,
        LoopingAlgorithm::ObservationalEquivalence,
    )
    .unwrap();
    assert!(closed.is_unbounded());
    assert!(closed.trees_at_size(10) > 0);
}

#[test]
fn loop_closure_refuses_an_unspecialized_automaton() {
    use dfta_prune::automaton::{Dfta, Symbol};
    let mut rules = BTreeMap::new();
    rules.insert((Symbol::Primitive("a".into()), vec![]), "q0".to_string());
    rules.insert((Symbol::Primitive("b".into()), vec![]), "q0".to_string());
    let dfta = Dfta::new(rules, BTreeSet::from(["q0".to_string()]));

    let mut dsl: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
    dsl.insert("succ".to_string(), ("int -> int".to_string(), Arc::new(Succ)));
    let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
    sample_dict.insert("int".to_string(), Arc::new(IntSampler(AtomicI64::new(0))));
    let provider = Provider { dsl, sample_dict };
    let dsl = Dsl::from_provider(&provider).unwrap();

    let state_to_type: std::collections::HashMap<String, String> =
        std::collections::HashMap::from([("q0".to_string(), "int".to_string())]);
    let result = add_loops(&dfta, &dsl, &state_to_type, LoopingAlgorithm::Grape);
    assert!(result.is_err());
}
