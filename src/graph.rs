//! Require graph construction.
//!
//! Orchestrates the recursive resolution of module references into the
//! session's flat, deduplicated module set. Each resolved file is pushed on
//! the context stack, transformed (which may recurse back in here through
//! the rewriting pass), popped and recorded. A file already on the stack is
//! a circular require; a key already recorded is returned from cache without
//! re-transforming. Keys are sequenced before their file is transformed, so
//! emission order is first-resolved (pre-order) over the reference graph.

use tracing::{debug, info, warn};

use crate::error::{CompileError, Result};
use crate::extname;
use crate::resolve::{self, ResolvedModule};
use crate::session::{Frame, Session};
use crate::transform;

/// Resolve a module reference from the current context, compiling and
/// registering the module on first sight. Returns the module's stable key,
/// or `None` on a tolerated miss (the caller leaves the reference text
/// untouched).
pub fn resolve_reference(session: &mut Session, reference: &str) -> Result<Option<String>> {
  let current_dir = session.current_dir();
  let current_library = session.current_library();
  let resolved = resolve::resolve_module(
    reference,
    &current_dir,
    &current_library,
    &session.libraries,
    &session.search,
  )?;

  // A miss here is always tolerated: the build entry is resolved up front
  // in `compile`, so by the time a reference reaches this point there is a
  // file on the stack whose text can keep the reference verbatim.
  let Some(resolved) = resolved else {
    if session.project.is_internal(reference) {
      info!(reference, "engine-provided reference left for the runtime");
    } else {
      warn!(reference, "unresolved reference left untouched");
    }
    return Ok(None);
  };

  register(session, &resolved).map(Some)
}

/// Transform the build's root file. The root gets a stack frame like any
/// other file (so a module requiring the root back is a cycle) but is never
/// added to the accumulated module set.
pub fn compile_root(session: &mut Session, resolved: &ResolvedModule) -> Result<String> {
  transform_file(session, resolved)
}

/// Register a resolved module, transforming it on first sight.
fn register(session: &mut Session, resolved: &ResolvedModule) -> Result<String> {
  if session.on_stack(&resolved.path) {
    return Err(CompileError::Cycle {
      file: resolved.path.display().to_string(),
      chain: session.stack_chain(),
    });
  }

  let key = module_key(session, resolved)?;

  if session.is_complete(&key) {
    debug!(key, "module already compiled, reusing");
    return Ok(key);
  }

  session.sequence_key(&key);
  let source = transform_file(session, resolved)?;
  session.attach_source(&key, source);
  debug!(key, path = %resolved.path.display(), "module compiled");
  Ok(key)
}

/// The stable cross-library key for a resolved file: `library:relative/name`
/// inside the project boundary, a synthetic hash key outside it.
fn module_key(session: &mut Session, resolved: &ResolvedModule) -> Result<String> {
  if resolved.in_bounds {
    let library = resolved.spec.library.as_deref().unwrap_or(resolved.library.id.as_str());
    Ok(format!("{}:{}", library, resolved.spec.filename))
  } else {
    let key = extname::synthetic_key(&resolved.path);
    session.register_external(&key, &resolved.path)?;
    info!(key = %key, path = %resolved.path.display(), "out-of-tree file renamed");
    Ok(key)
  }
}

/// Read, push a frame, transform, pop. The pop runs on every exit path.
fn transform_file(session: &mut Session, resolved: &ResolvedModule) -> Result<String> {
  let raw = std::fs::read_to_string(&resolved.path).map_err(|e| CompileError::Io {
    path: resolved.path.display().to_string(),
    source: e,
  })?;

  session.push(Frame::for_file(resolved.path.clone(), resolved.library.clone()));
  let transformed = transform::transform(session, &raw, &resolved.path);
  session.pop();
  transformed
}
