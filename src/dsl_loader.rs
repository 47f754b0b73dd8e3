//! Dynamic DSL provider loading (spec.md §6, "the loader that reads a user
//! file") via a compiled `cdylib` plugin (SPEC_FULL.md §N).
//!
//! A provider ships as a shared object exporting one symbol:
//!
//! ```c
//! extern "C" fn dfta_prune_dsl_provider() -> *mut Box<dyn DslProvider>
//! ```
//!
//! The loader calls it, reclaims the box, and leaks the [`Library`] itself
//! for the rest of the process — there is no unload step, matching the
//! one-shot lifetime of the `prune` CLI run.

use std::path::Path;

use libloading::{Library, Symbol};

use crate::dsl::DslProvider;
use crate::errors::PruneError;

const ENTRY_POINT: &[u8] = b"dfta_prune_dsl_provider";

type ConstructorFn = unsafe extern "C" fn() -> *mut Box<dyn DslProvider>;

fn load_error(path: &Path, message: impl std::fmt::Display) -> PruneError {
    PruneError::ProviderLoad { path: path.display().to_string(), message: message.to_string() }
}

/// Loads a DSL provider from the `cdylib` at `path`.
///
/// # Errors
///
/// Returns [`PruneError::ProviderLoad`] if `path` can't be opened as a
/// shared library, doesn't export `dfta_prune_dsl_provider`, or that
/// constructor returns a null pointer.
///
/// # Safety contract
///
/// `path` is trusted to be a `cdylib` built against this crate's
/// [`DslProvider`] trait with an ABI-compatible `rustc` — dynamic loading
/// of a trait object across a shared-object boundary has no language-level
/// stability guarantee beyond "same compiler, same crate version", and the
/// constructor runs arbitrary code on the caller's behalf.
pub fn load_provider(path: &Path) -> Result<Box<dyn DslProvider>, PruneError> {
    let library = unsafe { Library::new(path) }.map_err(|e| load_error(path, e))?;
    let constructor: Symbol<ConstructorFn> =
        unsafe { library.get(ENTRY_POINT) }.map_err(|e| load_error(path, e))?;
    let raw = unsafe { constructor() };
    if raw.is_null() {
        return Err(load_error(path, "provider constructor returned a null pointer"));
    }
    let provider = unsafe { *Box::from_raw(raw) };
    // The library must outlive `provider` (its vtable lives in the mapped
    // .so); since this CLI never loads a second provider, leaking it for
    // the rest of the process is simpler than threading a lifetime through
    // every caller.
    std::mem::forget(library);
    Ok(provider)
}
