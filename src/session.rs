//! Per-compilation state.
//!
//! A [`Session`] owns everything one compilation mutates: the context stack,
//! the accumulated module set, the external-name registry and the Lua state
//! used for syntax validation. It is threaded through the recursion instead
//! of living in shared instance fields, so independent compilations are
//! fully isolated from one another.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mlua::Lua;
use serde_json::Value;

use crate::error::CompileError;
use crate::project::{Build, BuildTarget, Library, Project};
use crate::resolve::SearchPath;

/// One level of the module-resolution recursion: the file being transformed,
/// its directory, and the library it belongs to. An empty stack means the
/// build's root file is being resolved.
#[derive(Debug, Clone)]
pub struct Frame {
  pub file: PathBuf,
  pub dir: PathBuf,
  pub library: Library,
}

impl Frame {
  pub fn for_file(file: PathBuf, library: Library) -> Self {
    let dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    Self { file, dir, library }
  }
}

/// A resolved, fully transformed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireEntry {
  /// Stable cross-library key (`library:relative/name` or synthetic).
  pub key: String,
  /// Fully transformed source body.
  pub source: String,
}

/// All mutable state of one (project, build, target) compilation.
pub struct Session<'p> {
  pub project: &'p Project,
  pub build: &'p Build,
  /// Target variables merged with caller overrides.
  pub variables: BTreeMap<String, Value>,
  /// Resolution scope: the implicit own library plus external libraries.
  pub libraries: BTreeMap<String, Library>,
  pub search: SearchPath,

  stack: Vec<Frame>,
  /// Keys in first-resolved (pre-order) sequence.
  order: Vec<String>,
  /// Transformed bodies, attached once a module finishes.
  bodies: BTreeMap<String, String>,
  /// Synthetic key to absolute path, for truncation-clash detection.
  external: BTreeMap<String, PathBuf>,
  lua: Lua,
}

impl<'p> Session<'p> {
  pub fn new(
    project: &'p Project,
    build: &'p Build,
    target: &BuildTarget,
    overrides: &BTreeMap<String, Value>,
  ) -> Self {
    let mut libraries: BTreeMap<String, Library> = project
      .libraries
      .iter()
      .map(|(id, root)| {
        (
          id.clone(),
          Library {
            id: id.clone(),
            root: root.clone(),
          },
        )
      })
      .collect();
    // The project's own tree always wins its own name.
    let own = project.own_library();
    libraries.insert(own.id.clone(), own);

    Self {
      project,
      build,
      variables: target.variables_with(overrides),
      libraries,
      search: SearchPath::parse(project.search_path.as_deref()),
      stack: Vec::new(),
      order: Vec::new(),
      bodies: BTreeMap::new(),
      external: BTreeMap::new(),
      lua: Lua::new(),
    }
  }

  // Context stack --------------------------------------------------------

  pub fn push(&mut self, frame: Frame) {
    self.stack.push(frame);
  }

  pub fn pop(&mut self) {
    self.stack.pop();
  }

  pub fn current(&self) -> Option<&Frame> {
    self.stack.last()
  }

  /// Whether `path` is already being transformed somewhere up the stack.
  pub fn on_stack(&self, path: &Path) -> bool {
    self.stack.iter().any(|f| f.file == path)
  }

  /// The active chain of files, outermost first, for cycle diagnostics.
  pub fn stack_chain(&self) -> String {
    self
      .stack
      .iter()
      .map(|f| f.file.display().to_string())
      .collect::<Vec<_>>()
      .join(" -> ")
  }

  /// Directory resolution happens relative to right now.
  pub fn current_dir(&self) -> PathBuf {
    self
      .current()
      .map(|f| f.dir.clone())
      .unwrap_or_else(|| self.project.source_root.clone())
  }

  /// The library owning the file being transformed right now.
  pub fn current_library(&self) -> Library {
    self
      .current()
      .map(|f| f.library.clone())
      .unwrap_or_else(|| self.project.own_library())
  }

  // Module accumulator ---------------------------------------------------

  /// Whether a module with this key has already been fully transformed.
  pub fn is_complete(&self, key: &str) -> bool {
    self.bodies.contains_key(key)
  }

  /// Record a key in emission order, before its file is transformed.
  pub fn sequence_key(&mut self, key: &str) {
    self.order.push(key.to_string());
  }

  /// Attach the transformed body of a sequenced key.
  pub fn attach_source(&mut self, key: &str, source: String) {
    self.bodies.insert(key.to_string(), source);
  }

  /// Accumulated modules in first-resolved order.
  pub fn entries(&self) -> impl Iterator<Item = RequireEntry> + '_ {
    self.order.iter().filter_map(|key| {
      self.bodies.get(key).map(|source| RequireEntry {
        key: key.clone(),
        source: source.clone(),
      })
    })
  }

  /// Register a synthetic key; a second distinct path under the same key is
  /// a truncation collision and fatal.
  pub fn register_external(&mut self, key: &str, path: &Path) -> Result<(), CompileError> {
    match self.external.get(key) {
      Some(existing) if existing.as_path() != path => Err(CompileError::ExternalNameClash {
        key: key.to_string(),
        existing: existing.display().to_string(),
        path: path.display().to_string(),
      }),
      Some(_) => Ok(()),
      None => {
        self.external.insert(key.to_string(), path.to_path_buf());
        Ok(())
      }
    }
  }

  /// Lua state reused for chunk validation.
  pub fn lua(&self) -> &Lua {
    &self.lua
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn fixture() -> (Project, Build, BuildTarget) {
    let project = Project {
      name: "demo".to_string(),
      source_root: PathBuf::from("/proj/src"),
      output_root: PathBuf::from("/proj/out"),
      internal_prefixes: vec![],
      libraries: BTreeMap::from([("Vendor".to_string(), PathBuf::from("/libs/vendor"))]),
      search_path: None,
      builds: vec![],
      targets: vec![],
    };
    let build = Build {
      name: "main".to_string(),
      entry: "main".to_string(),
      preload: true,
      helpers: false,
      event_helpers: false,
      compress: false,
    };
    let target = BuildTarget {
      name: "dev".to_string(),
      variables: BTreeMap::from([("RELEASE".to_string(), json!(false))]),
    };
    (project, build, target)
  }

  #[test]
  fn scope_contains_own_and_external_libraries() {
    let (project, build, target) = fixture();
    let session = Session::new(&project, &build, &target, &BTreeMap::new());

    assert_eq!(session.libraries["demo"].root, PathBuf::from("/proj/src"));
    assert_eq!(session.libraries["Vendor"].root, PathBuf::from("/libs/vendor"));
  }

  #[test]
  fn empty_stack_falls_back_to_project_defaults() {
    let (project, build, target) = fixture();
    let session = Session::new(&project, &build, &target, &BTreeMap::new());

    assert!(session.current().is_none());
    assert_eq!(session.current_dir(), PathBuf::from("/proj/src"));
    assert_eq!(session.current_library().id, "demo");
  }

  #[test]
  fn stack_tracks_files_for_cycle_detection() {
    let (project, build, target) = fixture();
    let mut session = Session::new(&project, &build, &target, &BTreeMap::new());
    let lib = project.own_library();

    session.push(Frame::for_file(PathBuf::from("/proj/src/a.lua"), lib.clone()));
    session.push(Frame::for_file(PathBuf::from("/proj/src/b.lua"), lib));

    assert!(session.on_stack(Path::new("/proj/src/a.lua")));
    assert!(!session.on_stack(Path::new("/proj/src/c.lua")));
    assert_eq!(session.current_dir(), PathBuf::from("/proj/src"));

    session.pop();
    session.pop();
    assert!(session.current().is_none());
  }

  #[test]
  fn entries_preserve_sequence_order() {
    let (project, build, target) = fixture();
    let mut session = Session::new(&project, &build, &target, &BTreeMap::new());

    session.sequence_key("demo:a");
    session.sequence_key("demo:c");
    session.attach_source("demo:c", "cc".to_string());
    session.attach_source("demo:a", "aa".to_string());

    let keys: Vec<String> = session.entries().map(|e| e.key).collect();
    assert_eq!(keys, vec!["demo:a", "demo:c"]);
  }

  #[test]
  fn external_clash_is_fatal_but_repeat_registration_is_not() {
    let (project, build, target) = fixture();
    let mut session = Session::new(&project, &build, &target, &BTreeMap::new());

    session.register_external("abc:x", Path::new("/a/x.lua")).unwrap();
    session.register_external("abc:x", Path::new("/a/x.lua")).unwrap();
    let err = session.register_external("abc:x", Path::new("/b/x.lua")).unwrap_err();

    assert!(matches!(err, CompileError::ExternalNameClash { .. }));
  }

  #[test]
  fn overrides_reach_merged_variables() {
    let (project, build, target) = fixture();
    let overrides = BTreeMap::from([("RELEASE".to_string(), json!(true))]);
    let session = Session::new(&project, &build, &target, &overrides);

    assert_eq!(session.variables.get("RELEASE"), Some(&json!(true)));
  }
}
