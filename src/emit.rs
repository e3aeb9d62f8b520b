//! Final output assembly.
//!
//! Serializes the finished session: the root body verbatim plus, for every
//! accumulated module, a wrapped preload fragment (preload mode only). The
//! preload-vs-inline decision was already baked into the rewriting; this
//! component only serializes accumulated state.

use crate::consts::PRELOAD_TABLE;
use crate::project::Build;
use crate::session::Session;

/// One accumulated module in emission order.
#[derive(Debug, Clone)]
pub struct ModuleOutput {
  /// Stable cross-library key.
  pub key: String,
  /// Fully transformed source body.
  pub source: String,
  /// Wrapped preload fragment; `None` in inline mode.
  pub fragment: Option<String>,
}

/// Build options the core carries through for external collaborators.
#[derive(Debug, Clone, Copy)]
pub struct BuildFlags {
  pub helpers: bool,
  pub event_helpers: bool,
  pub compress: bool,
}

impl BuildFlags {
  fn from_build(build: &Build) -> Self {
    Self {
      helpers: build.helpers,
      event_helpers: build.event_helpers,
      compress: build.compress,
    }
  }
}

/// The finished product of one compilation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
  /// Transformed root script body.
  pub root: String,
  /// Accumulated modules in first-resolved order.
  pub modules: Vec<ModuleOutput>,
  pub flags: BuildFlags,
}

impl CompileOutput {
  /// The wrapped preload fragments, in emission order.
  pub fn preload_fragments(&self) -> impl Iterator<Item = &str> {
    self.modules.iter().filter_map(|m| m.fragment.as_deref())
  }

  /// Convenience concatenation: preload fragments first, then the root body.
  pub fn to_script(&self) -> String {
    let mut script = String::new();
    for fragment in self.preload_fragments() {
      script.push_str(fragment);
      script.push('\n');
    }
    script.push_str(&self.root);
    script
  }
}

/// Serialize the accumulated session state into the final output.
pub fn assemble(session: &Session, root: String) -> CompileOutput {
  let preload = session.build.preload;
  let modules = session
    .entries()
    .map(|entry| {
      let fragment = preload.then(|| wrap(&entry.key, &entry.source));
      ModuleOutput {
        key: entry.key,
        source: entry.source,
        fragment,
      }
    })
    .collect();

  CompileOutput {
    root,
    modules,
    flags: BuildFlags::from_build(session.build),
  }
}

fn wrap(key: &str, source: &str) -> String {
  format!("{PRELOAD_TABLE}['{key}'] = (function (...)\n{source}\nend);")
}
