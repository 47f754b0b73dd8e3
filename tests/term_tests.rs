use dfta_prune::term::Term;

#[test]
fn parses_applications_variables_and_bare_primitives() {
    let term = Term::parse("(+ var0 (succ var1))").unwrap();
    assert_eq!(term.to_string(), "(+ var0 (succ var1))");
    assert_eq!(term.size(), 4);
}

#[test]
fn a_bare_primitive_has_size_one() {
    assert_eq!(Term::parse("1").unwrap().size(), 1);
}

#[test]
fn an_unbalanced_application_is_a_parse_error() {
    assert!(Term::parse("(+ var0 var1").is_err());
}

#[test]
fn linearity_checks_for_repeated_variables() {
    assert!(Term::parse("(+ var0 var1)").unwrap().is_linear());
    assert!(!Term::parse("(+ var0 var0)").unwrap().is_linear());
}

#[test]
fn embedding_requires_matching_primitives_and_arity() {
    let pattern = Term::parse("(+ var0 var0)").unwrap();
    assert!(pattern.embeds_into(&Term::parse("(+ 1 2)").unwrap()));
    assert!(!pattern.embeds_into(&Term::parse("(- 1 2)").unwrap()));
    assert!(!pattern.embeds_into(&Term::parse("(+ 1 2 3)").unwrap()));
}

#[test]
fn structurally_equal_terms_hash_the_same() {
    use std::collections::HashSet;
    let mut set = HashSet::new();
    set.insert(Term::parse("(+ var0 1)").unwrap());
    assert!(set.contains(&Term::parse("(+ var0 1)").unwrap()));
}
