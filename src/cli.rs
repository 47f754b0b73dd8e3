//! Command-line surface for the `prune` binary (spec.md §6, "CLI surface").

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::loop_manager::LoopingAlgorithm;

/// Which loop-closure strategy to run after pruning, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Grape,
    ObservationalEquivalence,
    None,
}

impl Strategy {
    /// The [`LoopingAlgorithm`] this strategy selects, or `None` for
    /// "`--no-loop`"/`--strategy none`.
    #[must_use]
    pub fn algorithm(self) -> Option<LoopingAlgorithm> {
        match self {
            Strategy::Grape => Some(LoopingAlgorithm::Grape),
            Strategy::ObservationalEquivalence => Some(LoopingAlgorithm::ObservationalEquivalence),
            Strategy::None => None,
        }
    }
}

/// Observational-equivalence pruning of a typed DSL's program grammar into
/// a minimal deterministic finite tree automaton.
#[derive(Debug, Parser)]
#[command(name = "prune", version, about)]
pub struct Cli {
    /// Path to the compiled DSL provider (a `cdylib` plugin).
    pub dsl: PathBuf,

    /// Maximum program size to enumerate.
    #[arg(long, default_value_t = 7)]
    pub size: usize,

    /// Input suite size per type.
    #[arg(long, default_value_t = 1000)]
    pub samples: usize,

    /// Pruned grammar destination.
    #[arg(short, long, default_value = "grammar.txt")]
    pub output: PathBuf,

    /// CSV of `program,type_request` for every canonical representative.
    #[arg(long, default_value = "allowed.csv")]
    pub allowed: PathBuf,

    /// Enable the post-hoc optimization pass.
    #[arg(long, default_value_t = false)]
    pub optimize: bool,

    /// Skip loop closure entirely, equivalent to `--strategy none`.
    #[arg(long, default_value_t = false, conflicts_with = "strategy")]
    pub no_loop: bool,

    /// Loop-closure strategy to run after pruning.
    #[arg(long, value_enum, default_value_t = Strategy::Grape)]
    pub strategy: Strategy,

    /// A seed automaton to refine instead of building from scratch.
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Optional JSON dump of the equivalence class registry.
    #[arg(long)]
    pub classes: Option<PathBuf>,
}

impl Cli {
    /// The loop-closure strategy to run, honoring `--no-loop` over
    /// `--strategy` when both somehow apply.
    #[must_use]
    pub fn looping_algorithm(&self) -> Option<LoopingAlgorithm> {
        if self.no_loop {
            None
        } else {
            self.strategy.algorithm()
        }
    }
}
