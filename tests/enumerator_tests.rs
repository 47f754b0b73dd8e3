use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dfta_prune::dsl::{Callable, Dsl, ExceptionKind, Sampler, Value};
use dfta_prune::enumerator::{Enumerator, Verdict};

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
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => Err(ExceptionKind::new("type_error")),
        }
    }
}
struct IntSampler;
impl Sampler for IntSampler {
    fn sample(&self) -> Value {
        Value::Int(0)
    }
}

fn arithmetic_dsl() -> Dsl {
    let mut entries: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
    entries.insert("1".to_string(), ("int".to_string(), Arc::new(One)));
    entries.insert("+".to_string(), ("int -> int -> int".to_string(), Arc::new(Plus)));
    let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
    sample_dict.insert("int".to_string(), Arc::new(IntSampler));
    Dsl {
        entries,
        merge_back: BTreeMap::new(),
        sample_dict,
        equal_dict: BTreeMap::new(),
        target_type: Some("int".to_string()),
        skip_exceptions: BTreeSet::new(),
    }
}

#[test]
fn enumeration_is_strictly_size_ordered() {
    let dsl = arithmetic_dsl();
    let mut enumerator = Enumerator::new(&dsl, 4, &[]);
    let mut last_size = 0;
    while let Some(candidate) = enumerator.poll() {
        assert!(candidate.size >= last_size);
        last_size = candidate.size;
        let term = candidate.term.clone();
        let state = format!("q{}", term.size());
        enumerator.reply(candidate, Verdict::Accepted { state });
    }
}

#[test]
#[should_panic(expected = "reply() must be called before the next poll()")]
fn polling_twice_without_a_reply_panics() {
    let dsl = arithmetic_dsl();
    let mut enumerator = Enumerator::new(&dsl, 4, &[]);
    enumerator.poll();
    enumerator.poll();
}

#[test]
fn a_rejected_candidate_never_becomes_a_building_block() {
    let dsl = arithmetic_dsl();
    let mut enumerator = Enumerator::new(&dsl, 3, &[]);
    while let Some(candidate) = enumerator.poll() {
        if candidate.term.to_string() == "1" {
            enumerator.reply(candidate, Verdict::Rejected);
        } else {
            let state = format!("q{}", candidate.term);
            enumerator.reply(candidate, Verdict::Accepted { state });
        }
    }
    assert!(enumerator.classes_of("int").iter().all(|(_, term, _)| term.to_string() != "1"));
}
