//! Approximate-constraint finder (spec.md §4.F): a syntactic
//! over-approximation of observational equivalence, learned from redundancy
//! the evaluator has already confirmed, that lets the pruner skip the
//! evaluator entirely for candidates matching a previously-seen shape.
//!
//! A pattern like `(f var0 var0)` reducing to `var0` is anti-unified from a
//! concrete `(f t t)` once the evaluator confirms it behaves exactly like
//! `t`. Any later candidate matching that pattern — with both wildcard
//! occurrences bound to the *same* subterm — is rejected without running
//! the evaluator at all. This is an approximation, not ground truth: it
//! never contradicts the evaluator (every pattern was itself learned from a
//! confirmed equivalence), but it also cannot discover new equivalences on
//! its own; [`crate::pruner`] still owns the authoritative check.

use std::collections::HashMap;

use crate::term::Term;

/// Replaces every occurrence of `target` inside `term` with a shared
/// wildcard variable, recording the binding so callers can recover which
/// fresh variable id stands for `target`.
fn generalize_against(
    term: &Term,
    target: &Term,
    next_id: &mut u32,
    bindings: &mut Vec<(Term, u32)>,
) -> Term {
    if term == target {
        if let Some((_, id)) = bindings.iter().find(|(t, _)| t == term) {
            return Term::Variable(*id);
        }
        let id = *next_id;
        *next_id += 1;
        bindings.push((term.clone(), id));
        return Term::Variable(id);
    }
    match term {
        Term::Application(head, args) => {
            let new_args: Vec<Term> = args
                .iter()
                .map(|a| generalize_against(a, target, next_id, bindings))
                .collect();
            Term::apply((**head).clone(), new_args)
        }
        _ => term.clone(),
    }
}

/// Matches `pattern` against `concrete`, requiring every occurrence of a
/// given wildcard id to bind to the same (structurally-equal) subterm.
fn match_pattern(pattern: &Term, concrete: &Term, bindings: &mut HashMap<u32, Term>) -> bool {
    match pattern {
        Term::Variable(id) => match bindings.get(id) {
            Some(bound) => bound == concrete,
            None => {
                bindings.insert(*id, concrete.clone());
                true
            }
        },
        Term::Primitive(_) => pattern == concrete,
        Term::Application(phead, pargs) => match concrete {
            Term::Application(chead, cargs) => {
                pargs.len() == cargs.len()
                    && match_pattern(phead, chead, bindings)
                    && pargs.iter().zip(cargs.iter()).all(|(p, c)| match_pattern(p, c, bindings))
            }
            _ => false,
        },
    }
}

/// A single learned redundancy: `pattern` always evaluates the same as the
/// subterm bound to `replacement_binding`.
struct RedundancyPattern {
    pattern: Term,
    replacement_binding: u32,
}

/// Accumulates redundancy patterns as the pruner confirms equivalences.
#[derive(Default)]
pub struct ApproxConstraintFinder {
    patterns: Vec<RedundancyPattern>,
}

impl ApproxConstraintFinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Learns from one confirmed equivalence: `term` behaves exactly like
    /// `representative`, a strictly smaller program. Only single-wildcard
    /// generalizations are retained — anything that would need to abstract
    /// more than one independent subterm is left to the evaluator, since a
    /// coincidental match on two unrelated positions is not evidence of a
    /// general rewrite.
    pub fn learn(&mut self, term: &Term, representative: &Term) {
        if term == representative {
            return;
        }
        let mut bindings = Vec::new();
        let mut next_id = 0u32;
        let pattern = generalize_against(term, representative, &mut next_id, &mut bindings);
        if matches!(pattern, Term::Variable(_)) || bindings.len() != 1 {
            return;
        }
        self.patterns.push(RedundancyPattern {
            pattern,
            replacement_binding: bindings[0].1,
        });
    }

    /// If `candidate` matches a learned pattern, returns the subterm it is
    /// known to be redundant with, sparing the caller an evaluator call.
    #[must_use]
    pub fn find_representative(&self, candidate: &Term) -> Option<Term> {
        for rp in &self.patterns {
            let mut bindings = HashMap::new();
            if match_pattern(&rp.pattern, candidate, &mut bindings) {
                if let Some(repl) = bindings.get(&rp.replacement_binding) {
                    return Some(repl.clone());
                }
            }
        }
        None
    }
}
