//! The main driver (spec.md §4.G): runs the enumerator to exhaustion,
//! classifies every candidate by observed behavior, and assembles the
//! accepted representatives into a [`Dfta`].

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use crate::approx_constraints::ApproxConstraintFinder;
use crate::automaton::{Dfta, Symbol};
use crate::dsl::Dsl;
use crate::enumerator::{Candidate, Enumerator, Verdict};
use crate::errors::PruneError;
use crate::evaluator::{Evaluator, Signature};
use crate::term::Term;
use crate::types;

/// One observational-equivalence class: every accepted program is the sole
/// survivor of its class, but [`EquivalenceClass::members`] retains the
/// rejected siblings for the `--classes` diagnostic dump (spec.md §6).
#[derive(Debug, Clone)]
pub struct EquivalenceClass {
    pub type_name: String,
    pub state: String,
    pub representative: Term,
    pub members: Vec<Term>,
}

/// Tracks every equivalence class discovered during pruning, independent of
/// the automaton's own bookkeeping — this is the structure serialized by
/// `--classes` (spec.md §6, `EquivalenceClassManager`).
#[derive(Debug, Clone, Default)]
pub struct EquivalenceClassManager {
    classes: Vec<EquivalenceClass>,
}

impl EquivalenceClassManager {
    #[must_use]
    pub fn classes(&self) -> &[EquivalenceClass] {
        &self.classes
    }

    /// A state -> type lookup covering every accepted class, for callers
    /// (e.g. [`crate::loop_manager`]) that need DSL type information but
    /// only have the bare automaton.
    #[must_use]
    pub fn state_types(&self) -> HashMap<String, String> {
        self.classes
            .iter()
            .map(|c| (c.state.clone(), c.type_name.clone()))
            .collect()
    }

    fn new_class(&mut self, type_name: String, state: String, representative: Term) -> usize {
        self.classes.push(EquivalenceClass {
            type_name,
            state,
            representative,
            members: Vec::new(),
        });
        self.classes.len() - 1
    }

    fn record_rejected(&mut self, class_index: usize, member: Term) {
        self.classes[class_index].members.push(member);
    }
}

/// The outcome of a full pruning run.
pub struct PruneResult {
    pub dfta: Dfta,
    pub classes: EquivalenceClassManager,
    /// Every state's DSL type, including the bound-variable states the
    /// equivalence classes alone don't cover — the input
    /// [`crate::loop_manager::add_loops`] needs.
    pub state_to_type: HashMap<String, String>,
}

/// Runs the full pipeline: enumerate, evaluate, bucket by behavior,
/// accept one representative per class, assemble the automaton.
///
/// # Errors
///
/// Returns [`PruneError::EvaluatorFatal`] the first time a candidate raises
/// an exception kind the DSL provider did not declare skippable.
pub fn prune(dsl: &Dsl, max_size: usize, num_samples: usize) -> Result<PruneResult, PruneError> {
    let target_type = dsl
        .target_type
        .clone()
        .unwrap_or_else(|| "_".to_string());
    let variable_types = types::arguments(&target_type);
    let return_type = if dsl.target_type.is_some() {
        types::return_type(&target_type).to_string()
    } else {
        target_type.clone()
    };

    let mut needed_types: Vec<String> = variable_types.clone();
    for (ty, _) in dsl.entries.values() {
        let (args, ret) = types::parse(ty);
        needed_types.extend(args);
        needed_types.push(ret);
    }
    needed_types.sort();
    needed_types.dedup();

    let evaluator = Evaluator::new(dsl, &needed_types, num_samples);
    let mut enumerator = Enumerator::new(dsl, max_size, &variable_types);
    let mut finder = ApproxConstraintFinder::new();
    let mut manager = EquivalenceClassManager::default();

    // type -> [(Signature, class_index)]
    let mut buckets: BTreeMap<String, Vec<(Signature, usize)>> = BTreeMap::new();
    let mut term_to_state: HashMap<Term, String> = HashMap::new();
    let mut rules: BTreeMap<(Symbol, Vec<String>), String> = BTreeMap::new();

    // Bound variables are axioms the enumerator never offers to the pruner
    // (they're definitionally distinct building blocks), but they still
    // need a bucket entry: a later primitive application observationally
    // equal to a bare variable (e.g. `(+ var0 1)` collapsing onto `var0`
    // once `1` samples to 0) must be able to find it, and a variable whose
    // type is the program's return type must be eligible to become a
    // final state in its own right.
    for (i, ty) in variable_types.iter().enumerate() {
        let state = format!("var{i}");
        let term = Term::Variable(i as u32);
        term_to_state.insert(term.clone(), state.clone());
        rules.insert((Symbol::Variable(i as u32), Vec::new()), state.clone());

        let signature = evaluator.evaluate(&term, &variable_types)?;
        let class_index = manager.new_class(ty.clone(), state, term);
        buckets.entry(ty.clone()).or_default().push((signature, class_index));
    }

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    let mut next_state = 0usize;

    while let Some(candidate) = enumerator.poll() {
        let Candidate { term, type_name, size: _ } = candidate.clone();

        if let Some(repr) = finder.find_representative(&term) {
            debug!("approx constraint short-circuited `{term}` to `{repr}`");
            rejected += 1;
            enumerator.reply(candidate, Verdict::Rejected);
            continue;
        }

        let signature = evaluator.evaluate(&term, &variable_types)?;
        let equality = evaluator.equality_for(&type_name);
        let bucket = buckets.entry(type_name.clone()).or_default();

        if let Some((_, class_index)) = bucket.iter().find(|(sig, _)| sig.equals(&signature, equality)) {
            let representative = manager.classes()[*class_index].representative.clone();
            finder.learn(&term, &representative);
            manager.record_rejected(*class_index, term.clone());
            rejected += 1;
            enumerator.reply(candidate, Verdict::Rejected);
            continue;
        }

        let state = format!("q{next_state}");
        next_state += 1;
        let class_index = manager.new_class(type_name.clone(), state.clone(), term.clone());
        bucket.push((signature, class_index));

        let letter = match &term {
            Term::Variable(n) => Symbol::Variable(*n),
            Term::Primitive(name) => Symbol::Primitive(name.clone()),
            Term::Application(head, _) => Symbol::Primitive(head.head_name().into()),
        };
        let arg_states: Vec<String> = match &term {
            Term::Application(_, args) => args
                .iter()
                .map(|a| {
                    term_to_state
                        .get(a)
                        .cloned()
                        .unwrap_or_else(|| panic!("argument `{a}` has no assigned state"))
                })
                .collect(),
            _ => Vec::new(),
        };
        rules.insert((letter, arg_states), state.clone());
        term_to_state.insert(term.clone(), state.clone());

        accepted += 1;
        enumerator.reply(candidate, Verdict::Accepted { state });
    }

    let finals = buckets
        .get(&return_type)
        .into_iter()
        .flatten()
        .map(|(_, idx)| manager.classes()[*idx].state.clone())
        .collect();

    let mut dfta = Dfta::new(rules, finals);
    dfta.reduce();

    info!("pruning finished: {accepted} accepted, {rejected} rejected, {} states", dfta.rules.len());

    let present: std::collections::BTreeSet<String> = dfta
        .alphabet()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    for missing in dsl.missing_primitives(&present) {
        warn!("primitive `{missing}` never appears in the pruned grammar");
    }

    let mut state_to_type = manager.state_types();
    for (i, ty) in variable_types.iter().enumerate() {
        state_to_type.insert(format!("var{i}"), ty.clone());
    }

    Ok(PruneResult { dfta, classes: manager, state_to_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{Callable, ExceptionKind, Sampler, Value};
    use std::sync::Arc;

    struct ConstCallable(Value);
    impl Callable for ConstCallable {
        fn arity(&self) -> usize {
            0
        }
        fn call(&self, _args: &[Value]) -> Result<Value, ExceptionKind> {
            Ok(self.0.clone())
        }
    }
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
    struct IntSampler(std::sync::atomic::AtomicI64);
    impl Sampler for IntSampler {
        fn sample(&self) -> Value {
            Value::Int(self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
        }
    }

    fn arithmetic_dsl() -> Dsl {
        let mut entries: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
        entries.insert("0".to_string(), ("int".to_string(), Arc::new(ConstCallable(Value::Int(0)))));
        entries.insert("1".to_string(), ("int".to_string(), Arc::new(ConstCallable(Value::Int(1)))));
        entries.insert("+".to_string(), ("int -> int -> int".to_string(), Arc::new(Add)));
        let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
        sample_dict.insert("int".to_string(), Arc::new(IntSampler(std::sync::atomic::AtomicI64::new(1))));
        Dsl {
            entries,
            merge_back: BTreeMap::new(),
            sample_dict,
            equal_dict: BTreeMap::new(),
            target_type: Some("int".to_string()),
            skip_exceptions: Default::default(),
        }
    }

    #[test]
    fn commutative_redundancy_is_pruned() {
        let dsl = arithmetic_dsl();
        let result = prune(&dsl, 3, 5).unwrap();
        // "(+ 0 1)" and "(+ 1 0)" evaluate identically under a deterministic
        // sample suite (no variables involved); only one survives.
        let count = result
            .classes
            .classes()
            .iter()
            .filter(|c| c.type_name == "int" && c.representative.size() == 3)
            .count();
        assert!(count <= 1);
    }

    #[test]
    fn finals_are_drawn_from_the_target_return_type() {
        let dsl = arithmetic_dsl();
        let result = prune(&dsl, 1, 3).unwrap();
        assert!(!result.dfta.finals.is_empty());
    }

    #[test]
    fn zero_and_one_are_not_observationally_equal() {
        let dsl = arithmetic_dsl();
        let result = prune(&dsl, 1, 3).unwrap();
        let size_one: Vec<_> = result
            .classes
            .classes()
            .iter()
            .filter(|c| c.representative.size() == 1)
            .collect();
        assert_eq!(size_one.len(), 2);
    }
}
