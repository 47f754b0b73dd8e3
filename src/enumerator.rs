//! Cooperative bottom-up program enumeration (spec.md §4.D).
//!
//! Rust has no stable generators, so the `yield`/`send` protocol of the
//! original source (`gpoe/enumerator.py`) is realized as an explicit
//! `poll`/`reply` state machine: [`Enumerator::poll`] returns the next
//! [`Candidate`] and [`Enumerator::reply`] tells the enumerator whether the
//! pruner kept it (and under what state name) before the next candidate is
//! produced. The one-reply-per-emission contract is enforced by an
//! `awaiting` flag that panics on protocol violations, the same role
//! `send`'s generator-resumption order plays in the original.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::dsl::Dsl;
use crate::term::Term;
use crate::types;

/// A program offered to the pruner for an accept/reject decision.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub term: Term,
    pub type_name: String,
    pub size: usize,
}

/// The pruner's verdict on a [`Candidate`], fed back via [`Enumerator::reply`].
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Kept: usable as a building block for larger candidates under `state`.
    Accepted { state: String },
    /// Observationally redundant, or otherwise dropped.
    Rejected,
}

/// A bottom-up enumerator over one DSL's monomorphic entries, up to a fixed
/// total size (spec.md §4.D, "Size bound").
pub struct Enumerator<'a> {
    dsl: &'a Dsl,
    max_size: usize,
    /// type -> accepted (state, term, size) building blocks, seeded with the
    /// bound variables of the type request and grown by accepted candidates.
    classes: BTreeMap<String, Vec<(String, Term, usize)>>,
    queue: VecDeque<Candidate>,
    size: usize,
    awaiting: bool,
}

impl<'a> Enumerator<'a> {
    /// `variable_types[i]` is the type of `vari`, the i-th argument of the
    /// program being synthesized. Variables are seeded directly as accepted
    /// size-1 classes: each is definitionally distinct from every other, so
    /// the pruner never needs to rule on them (spec.md §4.D, "Variables are
    /// never offered to the pruner").
    #[must_use]
    pub fn new(dsl: &'a Dsl, max_size: usize, variable_types: &[String]) -> Self {
        let mut classes: BTreeMap<String, Vec<(String, Term, usize)>> = BTreeMap::new();
        for (i, ty) in variable_types.iter().enumerate() {
            classes
                .entry(ty.clone())
                .or_default()
                .push((format!("var{i}"), Term::Variable(i as u32), 1));
        }
        Self {
            dsl,
            max_size,
            classes,
            queue: VecDeque::new(),
            size: 0,
            awaiting: false,
        }
    }

    /// Returns the next candidate to rule on, advancing to the next size
    /// class as the current one is exhausted, or `None` once `max_size` is
    /// reached with nothing left to emit.
    pub fn poll(&mut self) -> Option<Candidate> {
        assert!(!self.awaiting, "reply() must be called before the next poll()");
        loop {
            if let Some(c) = self.queue.pop_front() {
                self.awaiting = true;
                return Some(c);
            }
            if self.size >= self.max_size {
                return None;
            }
            self.size += 1;
            self.generate_size(self.size);
        }
    }

    /// Records the pruner's verdict on the candidate most recently returned
    /// by [`Enumerator::poll`].
    pub fn reply(&mut self, candidate: Candidate, verdict: Verdict) {
        assert!(self.awaiting, "reply() called without a pending poll()");
        self.awaiting = false;
        if let Verdict::Accepted { state } = verdict {
            self.classes
                .entry(candidate.type_name)
                .or_default()
                .push((state, candidate.term, candidate.size));
        }
    }

    /// The accepted building blocks of `type_name`, for callers that need to
    /// inspect the grammar built so far (e.g. to seed the target-type final
    /// states once enumeration is exhausted).
    #[must_use]
    pub fn classes_of(&self, type_name: &str) -> &[(String, Term, usize)] {
        self.classes.get(type_name).map_or(&[], Vec::as_slice)
    }

    fn generate_size(&mut self, size: usize) {
        for (name, (type_str, _)) in &self.dsl.entries {
            let (arg_types, ret_type) = types::parse(type_str);
            if arg_types.is_empty() {
                if size == 1 {
                    self.queue.push_back(Candidate {
                        term: Term::Primitive(Arc::from(name.as_str())),
                        type_name: ret_type,
                        size: 1,
                    });
                }
                continue;
            }
            let k = arg_types.len();
            if size < k + 1 {
                continue;
            }
            for sizes in compositions(k, size - 1) {
                self.emit_applications(name, &arg_types, &ret_type, &sizes, size);
            }
        }
    }

    /// For one fixed per-position size assignment, emits one candidate per
    /// combination of accepted building blocks matching those sizes.
    fn emit_applications(
        &mut self,
        name: &str,
        arg_types: &[String],
        ret_type: &str,
        sizes: &[usize],
        total_size: usize,
    ) {
        let mut pools: Vec<Vec<Term>> = Vec::with_capacity(arg_types.len());
        for (ty, &sz) in arg_types.iter().zip(sizes) {
            let pool: Vec<Term> = self
                .classes
                .get(ty)
                .into_iter()
                .flatten()
                .filter(|(_, _, s)| *s == sz)
                .map(|(_, t, _)| t.clone())
                .collect();
            if pool.is_empty() {
                return;
            }
            pools.push(pool);
        }

        let mut combos: Vec<Vec<Term>> = vec![Vec::new()];
        for pool in &pools {
            let mut next = Vec::with_capacity(combos.len() * pool.len());
            for prefix in &combos {
                for t in pool {
                    let mut v = prefix.clone();
                    v.push(t.clone());
                    next.push(v);
                }
            }
            combos = next;
        }

        for args in combos {
            let term = Term::apply(Term::Primitive(Arc::from(name)), args);
            self.queue.push_back(Candidate {
                term,
                type_name: ret_type.to_string(),
                size: total_size,
            });
        }
    }
}

/// Every ordered tuple of `k` positive integers summing to `n`. Argument
/// positions of an application are not interchangeable (subtraction is not
/// commutative), so unlike [`crate::automaton::integer_partitions`]'s
/// combinations-with-replacement this yields every permutation of sizes
/// across positions.
fn compositions(k: usize, n: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 {
        if n == 0 {
            out.push(Vec::new());
        }
        return out;
    }
    if n < k {
        return out;
    }
    let mut combo = vec![0usize; k];
    fn recurse(pos: usize, k: usize, remaining: usize, combo: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if pos == k {
            if remaining == 0 {
                out.push(combo.clone());
            }
            return;
        }
        let slots_left = k - pos - 1;
        for choice in 1..=(remaining.saturating_sub(slots_left)) {
            combo[pos] = choice;
            recurse(pos + 1, k, remaining - choice, combo, out);
        }
    }
    recurse(0, k, n, &mut combo, &mut out);
    out
}
