//! The `prune` binary: loads a DSL provider, runs the pruner, optionally
//! closes loops, and writes the grammar/allowed/classes artifacts (spec.md
//! §6).

use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};

use dfta_prune::automaton::Dfta;
use dfta_prune::cli::Cli;
use dfta_prune::dsl::Dsl;
use dfta_prune::dsl_loader::load_provider;
use dfta_prune::format::{write_allowed_csv, write_classes_json};
use dfta_prune::loop_manager::add_loops;
use dfta_prune::pruner::prune;

fn run() -> Result<(), String> {
    env_logger::init();
    let cli = Cli::parse();

    let provider = load_provider(&cli.dsl).map_err(|e| e.to_string())?;
    let dsl = Dsl::from_provider(provider.as_ref()).map_err(|e| e.to_string())?;

    let mut result = prune(&dsl, cli.size, cli.samples).map_err(|e| e.to_string())?;

    if let Some(seed_path) = &cli.from {
        let text = std::fs::read_to_string(seed_path).map_err(|e| e.to_string())?;
        let seed = Dfta::parse(&text).map_err(|e| e.to_string())?;
        info!("merging {} seed rule(s) from {}", seed.rules.len(), seed_path.display());
        for (key, dst) in seed.rules {
            result.dfta.rules.entry(key).or_insert(dst);
        }
        result.dfta.finals.extend(seed.finals);
        result.dfta.reduce();
    }

    if let Some(algorithm) = cli.looping_algorithm() {
        result.dfta = add_loops(&result.dfta, &dsl, &result.state_to_type, algorithm)
            .map_err(|e| e.to_string())?;
    }

    std::fs::write(&cli.output, result.dfta.to_canonical_string()).map_err(|e| e.to_string())?;
    info!("wrote grammar to {}", cli.output.display());

    let representatives: Vec<_> = result
        .classes
        .classes()
        .iter()
        .map(|c| (c.representative.clone(), c.type_name.clone()))
        .collect();
    write_allowed_csv(&cli.allowed, &representatives).map_err(|e| e.to_string())?;

    if let Some(classes_path) = &cli.classes {
        write_classes_json(classes_path, &result.classes).map_err(|e| e.to_string())?;
    }

    if cli.optimize {
        warn!("--optimize requested but the post-hoc optimization pass is not yet implemented; skipping");
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
