//! Project configuration surface consumed by the compiler.
//!
//! These types are produced by an external config loader and consumed as-is;
//! the compiler never reads configuration files itself. A [`Project`] and its
//! [`Build`]/[`BuildTarget`] values are immutable for the duration of one
//! compilation call.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named root directory of source files.
///
/// Either the project's own tree (implicit, keyed by the project name) or an
/// externally supplied one (keyed by a user-chosen identifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
  /// Identifier unique within the project's resolution scope.
  pub id: String,
  /// Root directory of the library's source files.
  pub root: PathBuf,
}

/// A compilation project: one source tree plus its libraries, builds and
/// targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  /// Project name; doubles as the identifier of the implicit own library.
  pub name: String,
  /// Root directory of the project's own source files.
  pub source_root: PathBuf,
  /// Directory the external output writer places compiled scripts in.
  pub output_root: PathBuf,
  /// Reference prefixes provided by the runtime/engine; a miss on one of
  /// these is informational rather than a warning.
  #[serde(default)]
  pub internal_prefixes: Vec<String>,
  /// Externally supplied libraries: user-chosen identifier to materialized
  /// source directory.
  #[serde(default)]
  pub libraries: BTreeMap<String, PathBuf>,
  /// Semicolon-delimited list of path templates (one `?` placeholder each)
  /// consulted after the library/context directory.
  #[serde(default)]
  pub search_path: Option<String>,
  #[serde(default)]
  pub builds: Vec<Build>,
  #[serde(default)]
  pub targets: Vec<BuildTarget>,
}

impl Project {
  /// The project's own source tree, wrapped as the implicit library.
  pub fn own_library(&self) -> Library {
    Library {
      id: self.name.clone(),
      root: self.source_root.clone(),
    }
  }

  /// Whether a reference names something the engine provides at runtime.
  pub fn is_internal(&self, reference: &str) -> bool {
    self.internal_prefixes.iter().any(|p| reference.starts_with(p))
  }
}

/// One named compilation unit, corresponding 1:1 to a root source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
  pub name: String,
  /// Module reference to the build's root file, resolved like any other.
  pub entry: String,
  /// Emit a preload table (`true`) or rewrite requires to inline lookups.
  #[serde(default = "default_true")]
  pub preload: bool,
  /// Ask the output writer to append the link-lookup helper fragment.
  #[serde(default)]
  pub helpers: bool,
  /// Ask the output writer to append the event-handler helper fragment.
  #[serde(default)]
  pub event_helpers: bool,
  /// Ask the output writer to run minify-oriented compression.
  #[serde(default)]
  pub compress: bool,
}

fn default_true() -> bool {
  true
}

/// A named output variant ("development", "production", ...) carrying its
/// own variable bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTarget {
  pub name: String,
  #[serde(default)]
  pub variables: BTreeMap<String, Value>,
}

impl BuildTarget {
  /// Target variables merged with caller-supplied overrides; overrides win.
  pub fn variables_with(&self, overrides: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut merged = self.variables.clone();
    for (name, value) in overrides {
      merged.insert(name.clone(), value.clone());
    }
    merged
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn overrides_win_over_target_variables() {
    let target = BuildTarget {
      name: "dev".to_string(),
      variables: BTreeMap::from([
        ("RELEASE".to_string(), json!(false)),
        ("PORT".to_string(), json!(80)),
      ]),
    };
    let overrides = BTreeMap::from([("RELEASE".to_string(), json!(true))]);

    let merged = target.variables_with(&overrides);

    assert_eq!(merged.get("RELEASE"), Some(&json!(true)));
    assert_eq!(merged.get("PORT"), Some(&json!(80)));
  }

  #[test]
  fn internal_prefix_matches() {
    let project = Project {
      name: "demo".to_string(),
      source_root: PathBuf::from("src"),
      output_root: PathBuf::from("out"),
      internal_prefixes: vec!["engine.".to_string()],
      libraries: BTreeMap::new(),
      search_path: None,
      builds: vec![],
      targets: vec![],
    };

    assert!(project.is_internal("engine.graphics"));
    assert!(!project.is_internal("util"));
  }
}
