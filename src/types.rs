//! The arrow-type language: `t1 -> t2 -> ... -> tn -> r`, where each `ti` is
//! an atomic name, a sum `a|b|c`, or a polymorphic placeholder
//! (`'name[a|b|c]` on declaration, `'name` on reuse).
//!
//! Expansion ([`all_variants`]) turns one polymorphic/sum-typed schema into
//! the cross product of its monomorphic instantiations, consistently
//! substituting every placeholder with the same choice across the arrow.

use std::collections::BTreeMap;

use crate::errors::{TypeParseError, TypeParseErrorKind};

/// Splits `t1 -> t2 -> ... -> r` into its trimmed, `->`-separated segments.
fn segments(type_req: &str) -> Vec<&str> {
    type_req.split("->").map(str::trim).collect()
}

/// The final segment of an arrow type: its return type.
#[must_use]
pub fn return_type(type_req: &str) -> &str {
    segments(type_req).last().copied().unwrap_or("")
}

/// All but the final segment of an arrow type: its argument types, in
/// left-to-right order.
#[must_use]
pub fn arguments(type_req: &str) -> Vec<String> {
    let segs = segments(type_req);
    segs[..segs.len().saturating_sub(1)]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// Splits an arrow type into `(arguments, return_type)`.
#[must_use]
pub fn parse(type_req: &str) -> (Vec<String>, String) {
    (arguments(type_req), return_type(type_req).to_string())
}

/// A single arrow-position entry while expanding variants: either a fixed
/// concrete name, or a named choice among several possibilities that must
/// be substituted consistently at every reuse site.
enum Slot<'a> {
    /// A plain atomic segment: contributes one fixed name to every variant.
    Fixed(&'a str),
    /// A sum or polymorphic-declaration segment: contributes a named choice
    /// that must agree with every other segment sharing the same name.
    Choice(String),
}

/// Expands a type expression's polymorphic placeholders and sum types into
/// the Cartesian product of monomorphic variants, substituted consistently.
///
/// `all_variants("'a[int|bool] -> 'a -> 'a")` yields
/// `["int -> int -> int", "bool -> bool -> bool"]` (order unspecified).
pub fn all_variants(type_req: &str) -> Result<Vec<String>, TypeParseError> {
    if type_req.trim().is_empty() {
        return Err(TypeParseError::new(type_req, TypeParseErrorKind::Empty));
    }
    let segs = segments(type_req);
    let mut slots: Vec<Slot> = Vec::with_capacity(segs.len());
    // name -> ordered list of possible substitutions
    let mut choices: BTreeMap<String, Vec<String>> = BTreeMap::new();
    // preserves first-seen order of choice names for deterministic product order
    let mut choice_order: Vec<String> = Vec::new();

    for (i, seg) in segs.iter().enumerate() {
        if let Some(rest) = seg.strip_prefix('\'') {
            if let Some(bracket) = rest.find('[') {
                if !rest.ends_with(']') {
                    return Err(TypeParseError::new(
                        type_req,
                        TypeParseErrorKind::MissingSumDeclaration {
                            name: rest[..bracket].trim().to_string(),
                        },
                    ));
                }
                let name = rest[..bracket].trim().to_string();
                let inner = &rest[bracket + 1..rest.len() - 1];
                let possibles: Vec<String> = inner.split('|').map(|s| s.trim().to_string()).collect();
                if !choices.contains_key(&name) {
                    choice_order.push(name.clone());
                }
                choices.insert(name.clone(), possibles);
                slots.push(Slot::Choice(name));
            } else {
                let name = rest.trim().to_string();
                if !choices.contains_key(&name) {
                    return Err(TypeParseError::new(
                        type_req,
                        TypeParseErrorKind::UndeclaredPolymorphicName {
                            name: name.clone(),
                            declared: choice_order.join(", "),
                        },
                    ));
                }
                slots.push(Slot::Choice(name));
            }
        } else if seg.contains('|') {
            let name = format!("#sum{i}");
            let possibles: Vec<String> = seg.split('|').map(|s| s.trim().to_string()).collect();
            choice_order.push(name.clone());
            choices.insert(name.clone(), possibles);
            slots.push(Slot::Choice(name));
        } else {
            slots.push(Slot::Fixed(seg));
        }
    }

    let mut variants = vec![String::new()];
    for name in &choice_order {
        let possibles = &choices[name];
        let mut next = Vec::with_capacity(variants.len() * possibles.len());
        for prefix in &variants {
            for p in possibles {
                let mut assignment = prefix.clone();
                if !assignment.is_empty() {
                    assignment.push('\u{1}');
                }
                assignment.push_str(name);
                assignment.push('=');
                assignment.push_str(p);
                next.push(assignment);
            }
        }
        variants = next;
    }

    let mut out = Vec::with_capacity(variants.len().max(1));
    for assignment in &variants {
        let mut bound: BTreeMap<&str, &str> = BTreeMap::new();
        for pair in assignment.split('\u{1}').filter(|s| !s.is_empty()) {
            let (k, v) = pair.split_once('=').expect("assignment always has '='");
            bound.insert(k, v);
        }
        let rendered: Vec<&str> = slots
            .iter()
            .map(|slot| match slot {
                Slot::Fixed(s) => *s,
                Slot::Choice(name) => bound[name.as_str()],
            })
            .collect();
        out.push(rendered.join(" -> "));
    }
    if out.is_empty() {
        // No choice segments at all: the single fixed-name variant.
        let rendered: Vec<&str> = slots
            .iter()
            .map(|slot| match slot {
                Slot::Fixed(s) => *s,
                Slot::Choice(_) => unreachable!("no choices collected"),
            })
            .collect();
        out.push(rendered.join(" -> "));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_type_is_last_segment() {
        assert_eq!(return_type("int -> int -> int"), "int");
    }

    #[test]
    fn arguments_are_all_but_last() {
        assert_eq!(
            arguments("int -> bool -> int"),
            vec!["int".to_string(), "bool".to_string()]
        );
    }

    #[test]
    fn monomorphic_type_has_single_variant() {
        let variants = all_variants("int -> int -> int").unwrap();
        assert_eq!(variants, vec!["int -> int -> int".to_string()]);
    }

    #[test]
    fn polymorphic_placeholder_expands_consistently() {
        let mut variants = all_variants("'a[int|bool] -> 'a -> 'a").unwrap();
        variants.sort();
        let mut expected = vec![
            "int -> int -> int".to_string(),
            "bool -> bool -> bool".to_string(),
        ];
        expected.sort();
        assert_eq!(variants, expected);
    }

    #[test]
    fn sum_type_without_polymorphism_expands_independently() {
        let mut variants = all_variants("int|bool -> int").unwrap();
        variants.sort();
        let mut expected = vec!["int -> int".to_string(), "bool -> int".to_string()];
        expected.sort();
        assert_eq!(variants, expected);
    }

    #[test]
    fn reuse_before_declaration_is_an_error() {
        let result = all_variants("'a -> int");
        assert!(result.is_err());
    }

    #[test]
    fn two_independent_placeholders_cross_product() {
        let mut variants = all_variants("'a[int|bool] -> 'b[x|y] -> 'a").unwrap();
        variants.sort();
        assert_eq!(variants.len(), 4);
    }
}
