//! The deterministic finite tree automaton (DFTA): states, an alphabet of
//! [`Symbol`]s, a deterministic transition table, a final-state set, and the
//! reduction/minimization operations of spec.md §4.C.
//!
//! States are interned as plain `String` identifiers (dense `q0`, `q1`, …
//! after [`Dfta::renumber_states`], or descriptive names such as `var0:int`
//! while the pruner is still seeding the grammar). This mirrors how the
//! looping extension's original source (`grape/automaton/loop_manager.py`)
//! already treats automaton states as opaque strings rather than as a
//! generic type parameter — there is exactly one alphabet (DSL letters) and
//! one state representation this crate ever needs, so keeping `Dfta`
//! concrete avoids generic machinery with no second instantiation to earn it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::errors::{TermParseError, TermParseErrorKind};

/// A transition letter: a DSL primitive name or a bound variable index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Variable(u32),
    Primitive(Arc<str>),
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Variable(n) => write!(f, "var{n}"),
            Symbol::Primitive(name) => write!(f, "{name}"),
        }
    }
}

impl Symbol {
    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self, Symbol::Variable(_))
    }

    #[must_use]
    pub fn parse(s: &str) -> Symbol {
        if let Some(digits) = s.strip_prefix("var") {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = digits.parse() {
                    return Symbol::Variable(n);
                }
            }
        }
        Symbol::Primitive(Arc::from(s))
    }
}

/// A rule's left-hand side: a letter applied to an ordered tuple of
/// argument states. Nullary rules have an empty `args`.
pub type RuleKey = (Symbol, Vec<String>);

/// A deterministic finite tree automaton over [`Symbol`]-labeled trees.
#[derive(Debug, Clone, Default)]
pub struct Dfta {
    pub rules: BTreeMap<RuleKey, String>,
    pub finals: BTreeSet<String>,
}

impl Dfta {
    #[must_use]
    pub fn new(rules: BTreeMap<RuleKey, String>, finals: BTreeSet<String>) -> Self {
        Self { rules, finals }
    }

    /// Inserts or overwrites `(letter, args) -> dst`. The caller is
    /// responsible for determinism (spec.md §4.C, "add/update rule").
    pub fn add_rule(&mut self, letter: Symbol, args: Vec<String>, dst: String) {
        self.rules.insert((letter, args), dst);
    }

    #[must_use]
    pub fn read(&self, letter: &Symbol, args: &[String]) -> Option<&String> {
        self.rules.get(&(letter.clone(), args.to_vec()))
    }

    /// Letters appearing in any rule.
    #[must_use]
    pub fn alphabet(&self) -> BTreeSet<Symbol> {
        self.rules.keys().map(|(l, _)| l.clone()).collect()
    }

    /// `reversed_rules[q]`: every `(letter, args)` whose rule lands in `q`.
    #[must_use]
    pub fn reversed_rules(&self) -> BTreeMap<String, Vec<(Symbol, Vec<String>)>> {
        let mut out: BTreeMap<String, Vec<(Symbol, Vec<String>)>> = BTreeMap::new();
        for (k, dst) in &self.rules {
            out.entry(dst.clone()).or_default().push(k.clone());
        }
        out
    }

    /// The reachable states: a state is reachable if some rule with all
    /// reachable argument states lands in it, seeded by nullary rules.
    #[must_use]
    pub fn reachable_states(&self) -> BTreeSet<String> {
        let mut reachable: BTreeSet<String> = BTreeSet::new();
        let mut by_dst: HashMap<&String, Vec<&Vec<String>>> = HashMap::new();
        for ((_, args), dst) in &self.rules {
            by_dst.entry(dst).or_default().push(args);
        }
        let mut added = true;
        while added {
            added = false;
            for (dst, all_args) in &by_dst {
                if reachable.contains(*dst) {
                    continue;
                }
                if all_args
                    .iter()
                    .any(|args| args.iter().all(|s| reachable.contains(s)))
                {
                    reachable.insert((*dst).clone());
                    added = true;
                }
            }
        }
        reachable
    }

    /// States consumed by a surviving derivation: finals, plus transitively
    /// every state appearing as the argument of a rule landing in a
    /// consumed state.
    fn consumed_states(&self) -> HashSet<String> {
        let mut consumed: HashSet<String> = self.finals.iter().cloned().collect();
        let mut stack: Vec<String> = consumed.iter().cloned().collect();
        while let Some(dst) = stack.pop() {
            for ((_, args), pot_dst) in &self.rules {
                if *pot_dst == dst {
                    for arg in args {
                        if consumed.insert(arg.clone()) {
                            stack.push(arg.clone());
                        }
                    }
                }
            }
        }
        consumed
    }

    /// Removes unreachable and unproductive states, iterating to a
    /// fixpoint (spec.md §4.C, "reduce").
    pub fn reduce(&mut self) {
        loop {
            let before = self.rules.len();
            let reachable = self.reachable_states();
            self.rules
                .retain(|(_, args), dst| reachable.contains(dst) && args.iter().all(|s| reachable.contains(s)));
            self.finals.retain(|s| reachable.contains(s));

            let consumed = self.consumed_states();
            self.rules.retain(|_, dst| consumed.contains(dst));

            if self.rules.len() == before {
                break;
            }
        }
    }

    /// Brainerd's minimization algorithm, optionally restricted by a
    /// user-supplied mergeability predicate. Assumes `self` is reduced.
    /// Returns a fresh automaton whose states are `q0`, `q1`, … in class
    /// order (spec.md §4.C, "New classes get fresh integer ids").
    #[must_use]
    pub fn minimize(&self, can_be_merged: Option<&dyn Fn(&str, &str) -> bool>) -> Dfta {
        let states = self.reachable_states();
        let reversed = self.reversed_rules();

        // consumer_of[q] = list of (rule, position) where q is the k-th argument
        let mut consumer_of: HashMap<&str, Vec<(&RuleKey, usize)>> =
            states.iter().map(|s| (s.as_str(), Vec::new())).collect();
        for key @ (_, args) in self.rules.keys() {
            for (k, arg) in args.iter().enumerate() {
                consumer_of.entry(arg.as_str()).or_default().push((key, k));
            }
        }

        let mut state2cls: HashMap<String, usize> = states
            .iter()
            .map(|s| (s.clone(), usize::from(self.finals.contains(s))))
            .collect();
        let mut cls2states: HashMap<usize, Vec<String>> = HashMap::new();
        for j in [0usize, 1usize] {
            cls2states.insert(
                j,
                state2cls
                    .iter()
                    .filter(|&(_, &c)| c == j)
                    .map(|(s, _)| s.clone())
                    .collect(),
            );
        }

        let are_equivalent = |a: &str,
                               b: &str,
                               state2cls: &HashMap<String, usize>|
         -> bool {
            if let Some(pred) = can_be_merged {
                if !pred(a, b) {
                    return false;
                }
            }
            let check = |x: &str, y: &str| -> bool {
                for (rule_key, k) in consumer_of.get(x).into_iter().flatten() {
                    let (letter, args) = rule_key;
                    let mut new_args = args.clone();
                    new_args[*k] = y.to_string();
                    let dst_cls = state2cls[&self.rules[*rule_key]];
                    match self.rules.get(&(letter.clone(), new_args)) {
                        Some(out) if state2cls.get(out) == Some(&dst_cls) => {}
                        _ => return false,
                    }
                }
                true
            };
            check(a, b) && check(b, a)
        };

        let mut n = 1usize;
        let mut finished = false;
        while !finished {
            finished = true;
            for i in 0..=n {
                let mut cls: Vec<String> = cls2states.get(&i).cloned().unwrap_or_default();
                while let Some(representative) = cls.pop() {
                    let mut new_cls = vec![representative.clone()];
                    let mut next_cls = Vec::new();
                    for q in cls {
                        if are_equivalent(&representative, &q, &state2cls) {
                            new_cls.push(q);
                        } else {
                            next_cls.push(q);
                        }
                    }
                    cls = next_cls;
                    if !cls.is_empty() {
                        n += 1;
                        for q in &new_cls {
                            state2cls.insert(q.clone(), n);
                        }
                        cls2states.insert(n, new_cls);
                        finished = false;
                    } else {
                        cls2states.insert(i, new_cls);
                    }
                }
            }
        }

        // Fresh dense ids in ascending original-class order.
        let mut class_ids: Vec<usize> = cls2states.keys().copied().filter(|c| !cls2states[c].is_empty()).collect();
        class_ids.sort_unstable();
        let mut class_name: HashMap<usize, String> = HashMap::new();
        for (fresh, cls) in class_ids.iter().enumerate() {
            class_name.insert(*cls, format!("q{fresh}"));
        }
        let rename = |q: &str| class_name[&state2cls[q]].clone();

        let mut new_rules = BTreeMap::new();
        for ((letter, args), dst) in &self.rules {
            let new_args: Vec<String> = args.iter().map(|a| rename(a)).collect();
            new_rules.insert((letter.clone(), new_args), rename(dst));
        }
        let new_finals = self.finals.iter().map(|s| rename(s)).collect();
        let _ = reversed;
        Dfta::new(new_rules, new_finals)
    }

    /// Functorial rewrite of every state, preserving determinism.
    #[must_use]
    pub fn map_states(&self, f: impl Fn(&str) -> String) -> Dfta {
        let mut rules = BTreeMap::new();
        for ((letter, args), dst) in &self.rules {
            let new_args: Vec<String> = args.iter().map(|a| f(a)).collect();
            rules.insert((letter.clone(), new_args), f(dst));
        }
        let finals = self.finals.iter().map(|s| f(s)).collect();
        Dfta::new(rules, finals)
    }

    /// Functorial rewrite of every letter, e.g. merging monomorphic
    /// variants `f|@>int` back onto their polymorphic name `f`.
    #[must_use]
    pub fn map_alphabet(&self, f: impl Fn(&Symbol) -> Symbol) -> Dfta {
        let mut rules = BTreeMap::new();
        for ((letter, args), dst) in &self.rules {
            rules.insert((f(letter), args.clone()), dst.clone());
        }
        Dfta::new(rules, self.finals.clone())
    }

    /// Renumbers states to `q0`, `q1`, … in sorted order of their current
    /// name (the `classic_state_renaming` step after loop closure).
    #[must_use]
    pub fn renumber_states(&self) -> Dfta {
        let states = self.reachable_states();
        let mapping: HashMap<String, String> = states
            .into_iter()
            .enumerate()
            .map(|(i, s)| (s, format!("q{i}")))
            .collect();
        self.map_states(|s| mapping.get(s).cloned().unwrap_or_else(|| s.to_string()))
    }

    /// Number of trees of each size in `1..=size` accepted by this
    /// automaton, via the DP of spec.md §4.C ("count trees").
    #[must_use]
    pub fn trees_by_size(&self, size: usize) -> BTreeMap<usize, u128> {
        let states = self.reachable_states();
        let reversed = self.reversed_rules();
        let empty = Vec::new();
        let mut count: HashMap<&str, Vec<u128>> =
            states.iter().map(|s| (s.as_str(), vec![0u128; size + 1])).collect();

        for csize in 1..=size {
            for state in &states {
                let derivations = reversed.get(state).unwrap_or(&empty);
                let mut total = 0u128;
                for (_, args) in derivations {
                    if args.is_empty() {
                        if csize == 1 {
                            total += 1;
                        }
                    } else {
                        for partition in integer_partitions(args.len(), csize - 1) {
                            let mut product = 1u128;
                            for (arg_size, arg) in partition.iter().zip(args.iter()) {
                                product *= count[arg.as_str()][*arg_size];
                            }
                            total += product;
                        }
                    }
                }
                count.get_mut(state.as_str()).unwrap()[csize] = total;
            }
        }

        (1..=size)
            .map(|s| (s, self.finals.iter().map(|f| count.get(f.as_str()).map_or(0, |v| v[s])).sum()))
            .collect()
    }

    #[must_use]
    pub fn trees_at_size(&self, size: usize) -> u128 {
        self.trees_by_size(size).get(&size).copied().unwrap_or(0)
    }

    /// `true` iff a state reachable from a nullary rule can reach a final
    /// state via a cycle — equivalently, counts keep strictly growing
    /// without bound (spec.md §4.C, "An automaton is unbounded iff…").
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        let states = self.reachable_states();
        let reversed = self.reversed_rules();
        let empty = Vec::new();

        // Restrict the successor graph to argument edges of states that can
        // themselves reach a final state.
        let can_reach_final = {
            let mut reach: HashSet<String> = self.finals.iter().cloned().collect();
            let mut changed = true;
            while changed {
                changed = false;
                for (dst, derivations) in &reversed {
                    if reach.contains(dst) {
                        continue;
                    }
                    if derivations.iter().any(|(_, args)| args.iter().any(|a| reach.contains(a))) {
                        reach.insert(dst.clone());
                        changed = true;
                    }
                }
            }
            reach
        };

        // DFS-based cycle detection over state -> argument-state edges,
        // restricted to states in `can_reach_final`.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        fn visit<'a>(
            state: &'a str,
            reversed: &'a BTreeMap<String, Vec<(Symbol, Vec<String>)>>,
            empty: &'a Vec<(Symbol, Vec<String>)>,
            can_reach_final: &HashSet<String>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> bool {
            if let Some(Mark::InProgress) = marks.get(state) {
                return true;
            }
            if marks.get(state) == Some(&Mark::Done) {
                return false;
            }
            marks.insert(state, Mark::InProgress);
            let derivations = reversed.get(state).unwrap_or(empty);
            for (_, args) in derivations {
                for arg in args {
                    if can_reach_final.contains(arg)
                        && visit(arg, reversed, empty, can_reach_final, marks)
                    {
                        return true;
                    }
                }
            }
            marks.insert(state, Mark::Done);
            false
        }
        for s in &states {
            if can_reach_final.contains(s) && visit(s, &reversed, &empty, &can_reach_final, &mut marks) {
                return true;
            }
        }
        false
    }

    /// `true` iff every state corresponds to exactly one head letter — the
    /// precondition for loop closure (spec.md §6.H, "specialized automaton").
    #[must_use]
    pub fn is_specialized(&self) -> bool {
        for derivations in self.reversed_rules().values() {
            let mut letters: HashSet<&Symbol> = HashSet::new();
            for (letter, _) in derivations {
                letters.insert(letter);
            }
            if letters.len() > 1 {
                return false;
            }
        }
        true
    }

    /// Canonical text representation (spec.md §6, "Grammar file format").
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        let finals: Vec<String> = self.finals.iter().cloned().collect();
        let alphabet: BTreeSet<String> = self.alphabet().iter().map(|s| s.to_string()).collect();
        let states = self.reachable_states();

        let mut lines: Vec<String> = self
            .rules
            .iter()
            .map(|((letter, args), dst)| {
                if args.is_empty() {
                    format!("{dst},{letter}")
                } else {
                    format!("{dst},{letter},{}", args.join(","))
                }
            })
            .collect();
        lines.sort();

        format!(
            "finals:{}\nterminals:{}\nnonterminals:{}\n{}",
            finals.join(","),
            alphabet.into_iter().collect::<Vec<_>>().join(","),
            states.into_iter().collect::<Vec<_>>().join(","),
            lines.join("\n")
        )
    }

    /// Parses the canonical text representation produced by
    /// [`Dfta::to_canonical_string`].
    pub fn parse(text: &str) -> Result<Dfta, TermParseError> {
        let mut lines = text.lines();
        let finals_line = lines
            .next()
            .ok_or_else(|| TermParseError::new(0, TermParseErrorKind::UnexpectedEos))?;
        let _terminals_line = lines
            .next()
            .ok_or_else(|| TermParseError::new(0, TermParseErrorKind::UnexpectedEos))?;
        let _nonterminals_line = lines
            .next()
            .ok_or_else(|| TermParseError::new(0, TermParseErrorKind::UnexpectedEos))?;

        let finals: BTreeSet<String> = finals_line
            .strip_prefix("finals:")
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let mut rules = BTreeMap::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split(',');
            let dst = parts
                .next()
                .ok_or_else(|| TermParseError::new(0, TermParseErrorKind::UnexpectedEos))?
                .to_string();
            let letter_str = parts
                .next()
                .ok_or_else(|| TermParseError::new(0, TermParseErrorKind::UnexpectedEos))?;
            let letter = Symbol::parse(letter_str);
            let args: Vec<String> = parts.map(|s| s.to_string()).collect();
            rules.insert((letter, args), dst);
        }
        Ok(Dfta::new(rules, finals))
    }
}

impl Display for Dfta {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl PartialEq for Dfta {
    fn eq(&self, other: &Self) -> bool {
        self.to_canonical_string() == other.to_canonical_string()
    }
}

/// Yields every tuple of `k` positive integers summing to `n`, in
/// non-decreasing (combinations-with-replacement) order, as spec.md §4.D
/// requires for deterministic enumeration ordering.
pub fn integer_partitions(k: usize, n: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 {
        if n == 0 {
            out.push(Vec::new());
        }
        return out;
    }
    let max_choice = n.saturating_sub(k) + 1;
    let mut combo = vec![1usize; k];
    fn recurse(
        pos: usize,
        start: usize,
        max_choice: usize,
        k: usize,
        remaining: usize,
        combo: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
    ) {
        if pos == k {
            if remaining == 0 {
                out.push(combo.clone());
            }
            return;
        }
        for choice in start..=max_choice {
            if choice > remaining {
                break;
            }
            combo[pos] = choice;
            recurse(pos + 1, choice, max_choice, k, remaining - choice, combo, out);
        }
    }
    recurse(0, 1, max_choice, k, n, &mut combo, &mut out);
    out
}
