//! GRAPE loop closure (spec.md §4.H): redirects derivations that would
//! exceed the enumeration size bound onto an existing smaller "mergeable"
//! state, so the resulting automaton accepts arbitrarily large trees while
//! staying finite.
//!
//! Ported from `grape/automaton/loop_manager.py`'s `add_loops`, with one
//! deliberate correction: that source's `__get_largest_merges__` appends
//! the state being queried instead of the smaller `candidate` it just
//! proved mergeable — evidently a transcription slip, since the whole
//! point of the function is to collect merge *candidates*. We collect
//! `candidate` here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::automaton::{Dfta, Symbol};
use crate::dsl::Dsl;
use crate::errors::LoopContradictionError;
use crate::types;

/// Which notion of "safe to close a loop here" governs redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopingAlgorithm {
    /// Every over-size derivation may be redirected; relies entirely on
    /// the pruner's own observational-equivalence check having already
    /// run over the size budget.
    ObservationalEquivalence,
    /// Only redirect when every "one step smaller" instantiation of the
    /// same primitive is already a rule in the grammar being built,
    /// guarding against closing a loop the pruner never actually
    /// justified at a reachable smaller size.
    Grape,
}

fn cartesian_product(pools: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut combos: Vec<Vec<String>> = vec![Vec::new()];
    for pool in pools {
        let mut next = Vec::with_capacity(combos.len() * pool.len());
        for prefix in &combos {
            for item in pool {
                let mut v = prefix.clone();
                v.push(item.clone());
                next.push(v);
            }
        }
        combos = next;
    }
    combos
}

fn reversed_of(
    rules: &std::collections::BTreeMap<(Symbol, Vec<String>), String>,
) -> HashMap<String, Vec<(Symbol, Vec<String>)>> {
    let mut reversed: HashMap<String, Vec<(Symbol, Vec<String>)>> = HashMap::new();
    for ((letter, args), dst) in rules {
        reversed.entry(dst.clone()).or_default().push((letter.clone(), args.clone()));
    }
    reversed
}

fn compute_sizes(reversed: &HashMap<String, Vec<(Symbol, Vec<String>)>>) -> HashMap<String, usize> {
    let mut sizes = HashMap::new();
    fn visit(
        state: &str,
        reversed: &HashMap<String, Vec<(Symbol, Vec<String>)>>,
        sizes: &mut HashMap<String, usize>,
    ) -> usize {
        if let Some(&s) = sizes.get(state) {
            return s;
        }
        let empty = Vec::new();
        let derivations = reversed.get(state).unwrap_or(&empty);
        let size = if let Some((_, args)) = derivations.first() {
            1 + args.iter().map(|a| visit(a, reversed, sizes)).sum::<usize>()
        } else {
            1
        };
        sizes.insert(state.to_string(), size);
        size
    }
    let states: Vec<String> = reversed.keys().cloned().collect();
    for s in states {
        visit(&s, reversed, &mut sizes);
    }
    sizes
}

/// Coinductive mergeability check: `candidate` can stand in for `original`
/// if every derivation of `original` has a same-letter derivation of
/// `candidate` whose pairwise-differing argument states are themselves
/// mergeable. Variables merge into any letter. Argument lists are paired up
/// to the shorter one's length, not required to match arity — a nullary
/// variable candidate therefore matches any original arity vacuously, which
/// is exactly how an oversized chain eventually collapses onto a type's
/// variable state. Memoized in `merge_memory` since the argument-state
/// graph is acyclic at this point (the automaton was checked not to be
/// unbounded before loop closure began).
fn can_states_merge(
    reversed_rules: &HashMap<String, Vec<(Symbol, Vec<String>)>>,
    original: &str,
    candidate: &str,
    merge_memory: &mut HashMap<(String, String), bool>,
    state_to_letter: &HashMap<String, (Symbol, bool)>,
) -> bool {
    if let Some(&res) = merge_memory.get(&(original.to_string(), candidate.to_string())) {
        return res;
    }
    let (candidate_letter, candidate_is_var) = &state_to_letter[candidate];
    let (original_letter, _) = &state_to_letter[original];
    if candidate_letter != original_letter && !candidate_is_var {
        merge_memory.insert((original.to_string(), candidate.to_string()), false);
        merge_memory.insert((candidate.to_string(), original.to_string()), false);
        return false;
    }
    let empty = Vec::new();
    for (_, args1) in reversed_rules.get(original).unwrap_or(&empty) {
        let mut has_equivalent = false;
        for (_, args2) in reversed_rules.get(candidate).unwrap_or(&empty) {
            // Mirrors the zip-based comparison of the original: positions are
            // paired up to the shorter argument list's length (no arity
            // equality check), and an equal pair needs no recursive check.
            // A nullary candidate (a bare variable) therefore vacuously
            // matches any arity — the mechanism that lets an oversized
            // derivation collapse onto a type's variable state.
            if args1.iter().zip(args2.iter()).filter(|(a1, a2)| a1 != a2).all(|(a1, a2)| {
                can_states_merge(reversed_rules, a1, a2, merge_memory, state_to_letter)
            }) {
                has_equivalent = true;
                break;
            }
        }
        if !has_equivalent {
            merge_memory.insert((original.to_string(), candidate.to_string()), false);
            merge_memory.insert((candidate.to_string(), original.to_string()), false);
            return false;
        }
    }
    merge_memory.insert((original.to_string(), candidate.to_string()), true);
    merge_memory.insert((candidate.to_string(), original.to_string()), true);
    true
}

/// The largest-to-smallest chain of states strictly smaller than `state`
/// that `state` could be redirected onto, in descending size order.
fn get_largest_merges(
    state: &str,
    reversed_rules: &HashMap<String, Vec<(Symbol, Vec<String>)>>,
    state_to_letter: &HashMap<String, (Symbol, bool)>,
    state_to_size: &HashMap<String, usize>,
    state_to_type: &HashMap<String, String>,
    merge_memory: &mut HashMap<(String, String), bool>,
    largest_merge: &mut HashMap<String, Vec<String>>,
    states_by_types_and_letter: &HashMap<(String, Symbol), Vec<String>>,
) -> Vec<String> {
    if let Some(v) = largest_merge.get(state) {
        return v.clone();
    }
    let ty = state_to_type.get(state).cloned().unwrap_or_default();
    let letter = state_to_letter[state].0.clone();
    let candidates = states_by_types_and_letter
        .get(&(ty, letter))
        .cloned()
        .unwrap_or_default();
    let my_size = state_to_size[state];
    let mut out = Vec::new();
    let mut size_bound: i64 = -1;
    for candidate in &candidates {
        let cs = state_to_size[candidate] as i64;
        if cs < size_bound {
            break;
        }
        if cs as usize >= my_size {
            continue;
        }
        if can_states_merge(reversed_rules, state, candidate, merge_memory, state_to_letter) {
            out.push(candidate.clone());
            size_bound = cs;
        }
    }
    largest_merge.insert(state.to_string(), out.clone());
    out
}

fn all_sub_args(
    combi: &[String],
    reversed_rules: &HashMap<String, Vec<(Symbol, Vec<String>)>>,
    state_to_letter: &HashMap<String, (Symbol, bool)>,
    state_to_size: &HashMap<String, usize>,
    state_to_type: &HashMap<String, String>,
    merge_memory: &mut HashMap<(String, String), bool>,
    largest_merge: &mut HashMap<String, Vec<String>>,
    states_by_types_and_letter: &HashMap<(String, Symbol), Vec<String>>,
) -> Vec<Vec<String>> {
    let possibles: Vec<Vec<String>> = combi
        .iter()
        .map(|s| {
            get_largest_merges(
                s,
                reversed_rules,
                state_to_letter,
                state_to_size,
                state_to_type,
                merge_memory,
                largest_merge,
                states_by_types_and_letter,
            )
        })
        .collect();
    cartesian_product(&possibles)
}

/// Finds the largest existing state of `candidates` (descending by size)
/// that `combi`'s derivation may be safely redirected onto.
fn find_merge(
    reversed_rules: &HashMap<String, Vec<(Symbol, Vec<String>)>>,
    letter: &Symbol,
    args: &[String],
    candidates: &[String],
    merge_memory: &mut HashMap<(String, String), bool>,
    state_to_letter: &HashMap<String, (Symbol, bool)>,
) -> Option<String> {
    let mut best: Option<String> = None;
    let empty = Vec::new();
    // `candidates` is expected pre-sorted descending by size by the caller
    // (it comes straight from a `states_by_types_and_letter` list), so the
    // first admissible candidate found is the largest one.
    for candidate in candidates {
        let (candidate_letter, candidate_is_var) = &state_to_letter[candidate];
        if candidate_letter != letter && !candidate_is_var {
            continue;
        }
        let mut has_equivalent = false;
        for (_, args2) in reversed_rules.get(candidate).unwrap_or(&empty) {
            if args.iter().zip(args2.iter()).filter(|(a1, a2)| a1 != a2).all(|(a1, a2)| {
                can_states_merge(reversed_rules, a1, a2, merge_memory, state_to_letter)
            }) {
                has_equivalent = true;
                break;
            }
        }
        if has_equivalent {
            best = Some(candidate.clone());
            break;
        }
    }
    best
}

/// Redirects every derivation that would exceed the automaton's current
/// maximum accepted size onto a smaller mergeable state, closing loops so
/// the automaton can derive unboundedly large trees (spec.md §4.H).
///
/// # Errors
///
/// [`LoopContradictionError::AlreadyUnbounded`] / `NotSpecialized` if the
/// preconditions don't hold; `NoMergeTarget` if some over-size derivation
/// has no admissible redirect target.
pub fn add_loops(
    dfta: &Dfta,
    dsl: &Dsl,
    state_to_type: &HashMap<String, String>,
    algorithm: LoopingAlgorithm,
) -> Result<Dfta, LoopContradictionError> {
    if dfta.is_unbounded() {
        return Err(LoopContradictionError::AlreadyUnbounded);
    }
    if !dfta.is_specialized() {
        return Err(LoopContradictionError::NotSpecialized);
    }

    let reversed = dfta.reversed_rules();
    let all_states = dfta.reachable_states();
    let orig_reversed_map: HashMap<String, Vec<(Symbol, Vec<String>)>> =
        reversed.into_iter().collect();

    let mut state_to_size = compute_sizes(&orig_reversed_map);

    let mut state_to_letter: HashMap<String, (Symbol, bool)> = HashMap::new();
    for s in &all_states {
        if let Some(derivations) = orig_reversed_map.get(s) {
            if let Some((letter, _)) = derivations.first() {
                state_to_letter.insert(s.clone(), (letter.clone(), letter.is_variable()));
            }
        }
    }

    let max_size = *state_to_size.values().max().unwrap_or(&1);

    let mut states_by_types: HashMap<String, Vec<String>> = HashMap::new();
    for s in &all_states {
        if let Some(ty) = state_to_type.get(s) {
            states_by_types.entry(ty.clone()).or_default().push(s.clone());
        }
    }
    for states in states_by_types.values_mut() {
        states.sort_by(|a, b| state_to_size[b].cmp(&state_to_size[a]));
    }

    let mut new_rules = dfta.rules.clone();
    let mut max_varno: u32 = state_to_letter
        .values()
        .filter_map(|(l, is_var)| match l {
            Symbol::Variable(n) if *is_var => Some(*n),
            _ => None,
        })
        .max()
        .map_or(0, |m| m + 1);

    let types_without_variable: Vec<String> = states_by_types
        .iter()
        .filter(|(_, states)| states.iter().all(|s| !state_to_letter[s].1))
        .map(|(t, _)| t.clone())
        .collect();
    let mut virtual_vars: Vec<u32> = Vec::new();
    for t in types_without_variable {
        let n = max_varno;
        max_varno += 1;
        let var_state = format!("var{n}");
        new_rules.insert((Symbol::Variable(n), Vec::new()), var_state.clone());
        state_to_letter.insert(var_state.clone(), (Symbol::Variable(n), true));
        state_to_size.insert(var_state.clone(), 1);
        states_by_types.get_mut(&t).unwrap().push(var_state.clone());
        virtual_vars.push(n);
    }

    // Snapshot reversed rules *after* the virtual-variable bootstrap so a
    // bare wildcard state has its own nullary derivation visible to
    // `can_states_merge`/`find_merge` below — mirrors the Python source
    // refreshing `reversed_rules` only once the bootstrap rules are in
    // `new_dfta.rules`.
    let reversed_map = reversed_of(&new_rules);

    let mut states_by_types_and_letter: HashMap<(String, Symbol), Vec<String>> = HashMap::new();
    for (t, states) in &states_by_types {
        let mut later: Vec<String> = Vec::new();
        for s in states {
            let (letter, is_var) = &state_to_letter[s];
            if *is_var {
                later.push(s.clone());
            } else {
                states_by_types_and_letter
                    .entry((t.clone(), letter.clone()))
                    .or_default()
                    .push(s.clone());
            }
        }
        let keys: Vec<(String, Symbol)> = states_by_types_and_letter
            .keys()
            .filter(|(tt, _)| tt == t)
            .cloned()
            .collect();
        for key in keys {
            states_by_types_and_letter.get_mut(&key).unwrap().extend(later.iter().cloned());
        }
    }

    let mut merge_memory: HashMap<(String, String), bool> = HashMap::new();
    let mut largest_merge: HashMap<String, Vec<String>> = HashMap::new();

    for (name, (type_str, _)) in &dsl.entries {
        let (arg_types, ret_type) = types::parse(type_str);
        if arg_types.is_empty() {
            continue;
        }
        let pools: Vec<Vec<String>> = arg_types
            .iter()
            .map(|t| states_by_types.get(t).cloned().unwrap_or_default())
            .collect();
        if pools.iter().any(Vec::is_empty) {
            continue;
        }
        let letter = Symbol::Primitive(Arc::from(name.as_str()));

        for combi in cartesian_product(&pools) {
            let dst_size: usize = combi.iter().map(|s| state_to_size[s]).sum::<usize>() + 1;
            if dst_size <= max_size {
                continue;
            }
            let allowed = match algorithm {
                LoopingAlgorithm::ObservationalEquivalence => true,
                LoopingAlgorithm::Grape => all_sub_args(
                    &combi,
                    &reversed_map,
                    &state_to_letter,
                    &state_to_size,
                    state_to_type,
                    &mut merge_memory,
                    &mut largest_merge,
                    &states_by_types_and_letter,
                )
                .into_iter()
                .filter(|sub_args| {
                    sub_args.iter().map(|s| state_to_size[s]).sum::<usize>() + 1 <= max_size
                })
                .all(|sub_args| new_rules.contains_key(&(letter.clone(), sub_args))),
            };
            if !allowed {
                continue;
            }

            let key = (letter.clone(), combi.clone());
            if new_rules.contains_key(&key) {
                return Err(LoopContradictionError::KeyAlreadyExists {
                    letter: letter.to_string(),
                    args: combi,
                });
            }

            let candidates = states_by_types_and_letter
                .get(&(ret_type.clone(), letter.clone()))
                .cloned()
                .unwrap_or_default();
            let merge_target = find_merge(&reversed_map, &letter, &combi, &candidates, &mut merge_memory, &state_to_letter);
            match merge_target {
                Some(target) => {
                    new_rules.insert(key, target);
                }
                None => {
                    return Err(LoopContradictionError::NoMergeTarget {
                        letter: letter.to_string(),
                        args: combi,
                        result_type: ret_type,
                    });
                }
            }
        }
    }

    for n in &virtual_vars {
        new_rules.remove(&(Symbol::Variable(*n), Vec::new()));
    }

    let mut result = Dfta::new(new_rules, dfta.finals.clone());
    result.reduce();
    let minimized = result.minimize(None);
    Ok(minimized.renumber_states())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{Callable, ExceptionKind, Sampler, Value};
    use std::collections::BTreeMap;

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
    struct IntSampler(std::sync::atomic::AtomicI64);
    impl Sampler for IntSampler {
        fn sample(&self) -> Value {
            Value::Int(self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
        }
    }

    /// `int -> int` with only `succ` in scope: the one free variable is the
    /// sole base case, so every accepted program is a chain of `succ`
    /// applications over it (no separate nullary constructor to get stuck
    /// behind when closing the loop).
    fn succ_dsl() -> Dsl {
        let mut entries: BTreeMap<String, (String, Arc<dyn Callable>)> = BTreeMap::new();
        entries.insert("succ".to_string(), ("int -> int".to_string(), Arc::new(Succ)));
        let mut sample_dict: BTreeMap<String, Arc<dyn Sampler>> = BTreeMap::new();
        sample_dict.insert("int".to_string(), Arc::new(IntSampler(std::sync::atomic::AtomicI64::new(0))));
        Dsl {
            entries,
            merge_back: BTreeMap::new(),
            sample_dict,
            equal_dict: BTreeMap::new(),
            target_type: Some("int -> int".to_string()),
            skip_exceptions: Default::default(),
        }
    }

    #[test]
    fn rejects_an_already_unbounded_automaton() {
        let mut rules = std::collections::BTreeMap::new();
        rules.insert((Symbol::Primitive(Arc::from("0")), vec![]), "int".to_string());
        rules.insert(
            (Symbol::Primitive(Arc::from("succ")), vec!["int".to_string()]),
            "int".to_string(),
        );
        let finals = std::collections::BTreeSet::from(["int".to_string()]);
        let dfta = Dfta::new(rules, finals);
        let dsl = succ_dsl();
        let mut state_to_type = HashMap::new();
        state_to_type.insert("int".to_string(), "int".to_string());
        let result = add_loops(&dfta, &dsl, &state_to_type, LoopingAlgorithm::ObservationalEquivalence);
        assert!(matches!(result, Err(LoopContradictionError::AlreadyUnbounded)));
    }

    #[test]
    fn closes_a_loop_on_a_bounded_successor_chain() {
        use crate::pruner::prune;
        let dsl = succ_dsl();
        let pruned = prune(&dsl, 3, 2).unwrap();
        let closed = add_loops(
            &pruned.dfta,
            &dsl,
            &pruned.state_to_type,
            LoopingAlgorithm::ObservationalEquivalence,
        )
        .unwrap();
        assert!(closed.is_unbounded());
    }
}
