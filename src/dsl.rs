//! The DSL provider contract (spec.md §6) and the monomorphization
//! preprocessing step that expands every polymorphic/sum-typed entry into
//! its cross product of concrete variants (spec.md §3, "DSL").

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::DslSchemaError;
use crate::types;

/// The separator the original source (`gpoe/__main__.py`) uses between a
/// polymorphic primitive's base name and its monomorphic variant's type.
pub const TYPE_SEP: &str = "|@>";

/// A type-erased DSL value. The built-in variants cover the scalar types
/// the spec's own scenarios use (`int`, `bool`); anything richer is carried
/// as [`Value::Opaque`] and compared via a provider-supplied
/// [`EqualityPredicate`] rather than this enum's own `PartialEq`.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(Arc<str>),
    Opaque(Arc<dyn std::any::Any + Send + Sync>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

/// A named category of exception a DSL callable may raise, to be compared
/// against a provider's `skip_exceptions` set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExceptionKind(pub String);

impl ExceptionKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A DSL entry's callable: applies the entry to already-evaluated argument
/// values, or reports the exception kind it raised.
pub trait Callable: Send + Sync {
    fn arity(&self) -> usize;
    fn call(&self, args: &[Value]) -> Result<Value, ExceptionKind>;
}

/// A zero-argument value generator for a sampled type.
pub trait Sampler: Send + Sync {
    fn sample(&self) -> Value;
}

/// A per-type equality predicate used both to deduplicate sampled inputs
/// and to compare behavior signatures.
pub trait EqualityPredicate: Send + Sync {
    fn equal(&self, a: &Value, b: &Value) -> bool;
}

/// Default structural equality, used for any type without an explicit
/// entry in `equal_dict`.
pub struct StructuralEquality;

impl EqualityPredicate for StructuralEquality {
    fn equal(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// The external collaborator described in spec.md §6: a loaded DSL
/// definition. Implementers build a `cdylib` exposing one of these (see
/// [`crate::dsl_loader`]).
pub trait DslProvider {
    /// Ordered mapping of primitive name to (type string, callable).
    fn dsl(&self) -> &BTreeMap<String, (String, Arc<dyn Callable>)>;
    /// Mapping of type string to a zero-arg sampler for that type.
    fn sample_dict(&self) -> &BTreeMap<String, Arc<dyn Sampler>>;
    /// Mapping of type string to a two-arg equality predicate. Types absent
    /// here use [`StructuralEquality`].
    fn equal_dict(&self) -> &BTreeMap<String, Arc<dyn EqualityPredicate>> {
        static EMPTY: std::sync::OnceLock<BTreeMap<String, Arc<dyn EqualityPredicate>>> =
            std::sync::OnceLock::new();
        EMPTY.get_or_init(BTreeMap::new)
    }
    /// The type of the top-level programs to generate, if any.
    fn target_type(&self) -> Option<&str> {
        None
    }
    /// Exception kinds the evaluator may silently catch as "undefined".
    fn skip_exceptions(&self) -> &BTreeSet<ExceptionKind> {
        static EMPTY: std::sync::OnceLock<BTreeSet<ExceptionKind>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(BTreeSet::new)
    }
}

/// The preprocessed DSL: every polymorphic/sum-typed entry replaced by its
/// monomorphic clones, with the merge-back relation retained for the final
/// output step.
pub struct Dsl {
    /// name -> (monomorphic type, callable)
    pub entries: BTreeMap<String, (String, Arc<dyn Callable>)>,
    /// monomorphic variant name -> original polymorphic name
    pub merge_back: BTreeMap<String, String>,
    pub sample_dict: BTreeMap<String, Arc<dyn Sampler>>,
    pub equal_dict: BTreeMap<String, Arc<dyn EqualityPredicate>>,
    pub target_type: Option<String>,
    pub skip_exceptions: BTreeSet<ExceptionKind>,
}

impl std::fmt::Debug for Dsl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dsl")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("merge_back", &self.merge_back)
            .field("target_type", &self.target_type)
            .field("skip_exceptions", &self.skip_exceptions)
            .finish()
    }
}

impl Dsl {
    /// Expands every polymorphic/sum-typed entry into its monomorphic
    /// variants (spec.md §3) and validates the schema invariants of
    /// spec.md §7 ("DSL schema error").
    pub fn from_provider(provider: &dyn DslProvider) -> Result<Dsl, DslSchemaError> {
        let mut entries = BTreeMap::new();
        let mut merge_back = BTreeMap::new();

        for (name, (type_str, callable)) in provider.dsl() {
            let variants = types::all_variants(type_str).map_err(|e| DslSchemaError {
                detail: format!("primitive `{name}`: {e}"),
            })?;
            if variants.len() == 1 {
                entries.insert(name.clone(), (variants[0].clone(), callable.clone()));
            } else {
                for variant in variants {
                    let new_name = format!("{name}{TYPE_SEP}{variant}");
                    merge_back.insert(new_name.clone(), name.clone());
                    entries.insert(new_name, (variant, callable.clone()));
                }
            }
        }

        if provider.sample_dict().is_empty() && !provider.dsl().is_empty() {
            return Err(DslSchemaError::missing_attribute("sample_dict"));
        }

        let dsl = Dsl {
            entries,
            merge_back,
            sample_dict: provider.sample_dict().clone(),
            equal_dict: provider.equal_dict().clone(),
            target_type: provider.target_type().map(str::to_string),
            skip_exceptions: provider.skip_exceptions().clone(),
        };
        dsl.validate_samplers()?;
        Ok(dsl)
    }

    /// Every type that appears as a primitive's argument or return type, or
    /// as the target type, must have a sampler — otherwise the evaluator
    /// has no input suite to run candidate programs on.
    fn validate_samplers(&self) -> Result<(), DslSchemaError> {
        let mut needed: BTreeSet<String> = BTreeSet::new();
        for (ty, _) in self.entries.values() {
            let (args, ret) = types::parse(ty);
            needed.extend(args);
            needed.insert(ret);
        }
        if let Some(t) = &self.target_type {
            needed.extend(types::arguments(t));
        }
        for ty in needed {
            if !self.sample_dict.contains_key(&ty) {
                return Err(DslSchemaError {
                    detail: format!("no sample_dict entry for type `{ty}`"),
                });
            }
        }
        Ok(())
    }

    /// The equality predicate registered for `type_name`, or structural
    /// equality if none was supplied.
    #[must_use]
    pub fn equal_for<'a>(&'a self, type_name: &str, fallback: &'a dyn EqualityPredicate) -> &'a dyn EqualityPredicate {
        self.equal_dict
            .get(type_name)
            .map(|p| p.as_ref() as &dyn EqualityPredicate)
            .unwrap_or(fallback)
    }

    /// Primitives present in the pruned grammar's merged alphabet that are
    /// absent from the original (pre-expansion) DSL, or vice versa — used
    /// for the "grammar drop warning" diagnostics of spec.md §7.
    #[must_use]
    pub fn missing_primitives(&self, present: &BTreeSet<String>) -> BTreeSet<String> {
        let original: BTreeSet<String> = self
            .entries
            .keys()
            .map(|n| self.merge_back.get(n).cloned().unwrap_or_else(|| n.clone()))
            .collect();
        original.difference(present).cloned().collect()
    }
}
