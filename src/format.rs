//! The two serialization formats sitting on top of the automaton's own
//! canonical text form (spec.md §6): the `allowed.csv` list of surviving
//! representatives, and the optional `--classes` JSON dump of the full
//! equivalence-class registry. Grounded directly on `gpoe/__main__.py`'s
//! `--allowed` writer, which the Python source does not route through any
//! CSV library — it writes `program,type_request` by hand, one plain
//! concatenation per line, since program text (an S-expression, space
//! separated) never contains a comma. We do the same rather than pull in a
//! `csv` dependency the rest of the crate has no other use for.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::errors::PruneError;
use crate::pruner::EquivalenceClassManager;
use crate::term::Term;

fn io_err(path: &Path, source: std::io::Error) -> PruneError {
    PruneError::Io { path: path.display().to_string(), source }
}

/// Writes the `program,type_request` CSV of every canonical representative
/// (spec.md §6, "Allowed CSV").
pub fn write_allowed_csv(path: &Path, representatives: &[(Term, String)]) -> Result<(), PruneError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "program,type_request").map_err(|e| io_err(path, e))?;
    for (program, type_request) in representatives {
        writeln!(out, "{program},{type_request}").map_err(|e| io_err(path, e))?;
    }
    out.flush().map_err(|e| io_err(path, e))
}

#[derive(Serialize)]
struct ClassesDump {
    classes: Vec<ClassDump>,
}

#[derive(Serialize)]
struct ClassDump {
    /// The class's automaton state — its identity within the DFTA, and the
    /// closest analogue to a behavior "signature" this registry retains
    /// once the raw per-input `Signature` itself has been discarded.
    signature: String,
    #[serde(rename = "type")]
    type_name: String,
    representative: String,
    members: Vec<String>,
}

/// Serializes the full equivalence-class registry to the shape spec.md §6
/// names `--classes` (`{ "classes": [ { "signature", "representative",
/// "members" }, ... ] }`).
pub fn write_classes_json(path: &Path, manager: &EquivalenceClassManager) -> Result<(), PruneError> {
    let dump = ClassesDump {
        classes: manager
            .classes()
            .iter()
            .map(|c| ClassDump {
                signature: c.state.clone(),
                type_name: c.type_name.clone(),
                representative: c.representative.to_string(),
                members: c.members.iter().map(std::string::ToString::to_string).collect(),
            })
            .collect(),
    };
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &dump).map_err(|e| PruneError::Io {
        path: path.display().to_string(),
        source: std::io::Error::other(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn allowed_csv_has_header_and_rows() {
        let dir = std::env::temp_dir().join("dfta_prune_format_test_allowed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("allowed.csv");
        let reps = vec![
            (Term::Variable(0), "int".to_string()),
            (
                Term::apply(Term::Primitive(Arc::from("succ")), vec![Term::Variable(0)]),
                "int".to_string(),
            ),
        ];
        write_allowed_csv(&path, &reps).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "program,type_request");
        assert_eq!(lines.next().unwrap(), "var0,int");
        assert_eq!(lines.next().unwrap(), "(succ var0),int");
    }

    #[test]
    fn classes_json_round_trips_through_serde_value() {
        let dir = std::env::temp_dir().join("dfta_prune_format_test_classes");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("classes.json");
        let mut manager = EquivalenceClassManager::default();
        write_classes_json(&path, &manager).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["classes"].as_array().unwrap().is_empty());
        let _ = &mut manager;
    }
}
