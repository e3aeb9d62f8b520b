//! Module reference resolution.
//!
//! Turns a `Library:File` or bare `File` reference plus the current context
//! into a canonical absolute path, or signals "not found". The extension is
//! optional in the reference; the resolver appends it before testing
//! existence. A bare reference resolves against the referencing file's own
//! directory first, then the current library's root, then the search path.
//! An explicitly named library that is not loaded is a configuration error,
//! not a soft miss.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::consts::{LUA_EXT, SEARCH_PATH_MARK, SEARCH_PATH_SEP};
use crate::project::Library;

/// Errors raised during reference resolution. A plain miss is not an error;
/// it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("library '{name}' (referenced as '{reference}') is not loaded")]
  UnknownLibrary { name: String, reference: String },

  #[error("failed to canonicalize '{path}': {source}")]
  Canonicalize {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// A parsed module reference: optional library plus filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
  pub library: Option<String>,
  pub filename: String,
}

impl ModuleSpec {
  /// Split a reference string on its first `:`.
  pub fn parse(reference: &str) -> Self {
    match reference.split_once(':') {
      Some((library, filename)) => Self {
        library: Some(library.to_string()),
        filename: filename.to_string(),
      },
      None => Self {
        library: None,
        filename: reference.to_string(),
      },
    }
  }
}

/// A successfully resolved reference.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
  /// Canonical absolute path of the file.
  pub path: PathBuf,
  /// Canonicalized spec: library always set, filename relative to the
  /// library root with forward slashes and no extension (in-bounds only).
  pub spec: ModuleSpec,
  /// The library the file was resolved under.
  pub library: Library,
  /// Whether the file sits inside the owning library's root.
  pub in_bounds: bool,
}

/// Ordered search path templates, parsed from a semicolon-delimited string.
/// Each template carries one `?` placeholder for the module name.
#[derive(Debug, Default)]
pub struct SearchPath {
  templates: Vec<String>,
}

impl SearchPath {
  pub fn parse(raw: Option<&str>) -> Self {
    let templates = raw
      .map(|r| {
        r.split(SEARCH_PATH_SEP)
          .map(str::trim)
          .filter(|t| !t.is_empty())
          .map(String::from)
          .collect()
      })
      .unwrap_or_default();
    Self { templates }
  }

  /// Candidate paths for a module name (extension stripped; templates carry
  /// their own), in declared order.
  fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    self
      .templates
      .iter()
      .map(move |t| PathBuf::from(t.replace(SEARCH_PATH_MARK, name)))
  }
}

/// Resolve `reference` from the given context. `Ok(None)` means not found;
/// callers decide severity.
pub fn resolve_module(
  reference: &str,
  current_dir: &Path,
  current_library: &Library,
  libraries: &BTreeMap<String, Library>,
  search: &SearchPath,
) -> Result<Option<ResolvedModule>, ResolveError> {
  let spec = ModuleSpec::parse(reference);

  let library = match &spec.library {
    Some(id) => libraries
      .get(id)
      .cloned()
      .ok_or_else(|| ResolveError::UnknownLibrary {
        name: id.clone(),
        reference: reference.to_string(),
      })?,
    None => current_library.clone(),
  };

  let with_ext = ensure_extension(&spec.filename);
  let name = strip_extension(&spec.filename);

  let mut candidates: Vec<PathBuf> = Vec::new();
  if spec.library.is_some() {
    candidates.push(library.root.join(&with_ext));
  } else {
    candidates.push(current_dir.join(&with_ext));
    candidates.push(library.root.join(&with_ext));
  }
  candidates.extend(search.candidates(name));

  for candidate in candidates {
    trace!(candidate = %candidate.display(), reference, "testing candidate");
    if !candidate.is_file() {
      continue;
    }

    let path = dunce::canonicalize(&candidate).map_err(|e| ResolveError::Canonicalize {
      path: candidate.display().to_string(),
      source: e,
    })?;

    // The library root may itself be unnormalized (symlinked temp dirs);
    // compare canonical to canonical.
    let root = dunce::canonicalize(&library.root).unwrap_or_else(|_| library.root.clone());
    let (in_bounds, filename) = match path.strip_prefix(&root) {
      Ok(rel) => (true, module_name(rel)),
      Err(_) => (false, strip_extension(&spec.filename).to_string()),
    };

    return Ok(Some(ResolvedModule {
      path,
      spec: ModuleSpec {
        library: Some(library.id.clone()),
        filename,
      },
      library,
      in_bounds,
    }));
  }

  Ok(None)
}

fn ensure_extension(filename: &str) -> String {
  if filename.ends_with(LUA_EXT) {
    filename.to_string()
  } else {
    format!("{filename}{LUA_EXT}")
  }
}

fn strip_extension(filename: &str) -> &str {
  filename.strip_suffix(LUA_EXT).unwrap_or(filename)
}

/// Library-relative module name: forward slashes, no extension. The same
/// file is named identically regardless of how it was referenced.
fn module_name(rel: &Path) -> String {
  let mut parts: Vec<String> = rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  if let Some(last) = parts.last_mut()
    && let Some(stripped) = last.strip_suffix(LUA_EXT)
  {
    *last = stripped.to_string();
  }
  parts.join("/")
}
