//! Compile-time conditional directives.
//!
//! A directive block selects one of two source bodies based on a build
//! variable:
//!
//! ```lua
//! ---@if RELEASE true
//! log_level = "error"
//! ---@else
//! log_level = "debug"
//! ---@end
//! ```
//!
//! Markers are whole lines. The literal after the variable name is parsed
//! once as a [`DirectiveValue`]; anything that is not a valid JSON scalar is
//! treated as a plain string. A missing literal means "truthy check": the
//! block holds when the variable is bound and is neither `false` nor `null`.
//! Blocks do not nest; an inner `---@if` is an error rather than a guess.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::consts::{DIRECTIVE_ELSE, DIRECTIVE_END, DIRECTIVE_IF};

/// Errors raised while expanding directive blocks.
#[derive(Debug, Error)]
pub enum DirectiveError {
  #[error("directive block opened at line {opened} is never closed with '{DIRECTIVE_END}'")]
  Unterminated { opened: usize },

  #[error("nested '{DIRECTIVE_IF}' at line {line} (blocks do not nest; outer block opened at line {opened})")]
  Nested { line: usize, opened: usize },

  #[error("'{marker}' at line {line} without an open '{DIRECTIVE_IF}' block")]
  Unopened { marker: String, line: usize },

  #[error("second '{DIRECTIVE_ELSE}' at line {line} in block opened at line {opened}")]
  DuplicateElse { line: usize, opened: usize },

  #[error("'{DIRECTIVE_IF}' at line {line} is missing a variable name")]
  MissingVariable { line: usize },
}

/// A directive comparison literal, parsed once per block.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveValue {
  Bool(bool),
  Number(f64),
  Str(String),
}

impl DirectiveValue {
  /// Parse a literal from directive text. JSON scalars keep their type;
  /// everything else (including malformed JSON) is a plain string.
  pub fn parse(literal: &str) -> Self {
    match serde_json::from_str::<Value>(literal) {
      Ok(Value::Bool(b)) => Self::Bool(b),
      Ok(Value::Number(n)) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
      Ok(Value::String(s)) => Self::Str(s),
      _ => Self::Str(literal.to_string()),
    }
  }

  /// View a build variable binding as a comparable directive value.
  fn from_binding(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(b) => Some(Self::Bool(*b)),
      Value::Number(n) => Some(Self::Number(n.as_f64()?)),
      Value::String(s) => Some(Self::Str(s.clone())),
      _ => None,
    }
  }
}

/// Expand every directive block in `text` against `variables`, returning the
/// text with each block replaced by its surviving body.
pub fn expand(text: &str, variables: &BTreeMap<String, Value>) -> Result<String, DirectiveError> {
  let lines: Vec<&str> = text.split('\n').collect();
  let mut out: Vec<&str> = Vec::with_capacity(lines.len());
  let mut i = 0;

  while i < lines.len() {
    let trimmed = lines[i].trim();

    if let Some(condition) = marker_rest(trimmed, DIRECTIVE_IF) {
      let opened = i + 1;
      let (name, literal) = parse_condition(condition, opened)?;
      let block = collect_block(&lines, i + 1, opened)?;

      let keep = if holds(&name, literal.as_ref(), variables) {
        block.true_branch
      } else {
        block.false_branch
      };
      out.extend(trim_blank_edges(keep).iter().copied());

      i = block.end + 1;
    } else if marker_rest(trimmed, DIRECTIVE_ELSE).is_some() || marker_rest(trimmed, DIRECTIVE_END).is_some() {
      return Err(DirectiveError::Unopened {
        marker: trimmed.split_whitespace().next().unwrap_or(trimmed).to_string(),
        line: i + 1,
      });
    } else {
      out.push(lines[i]);
      i += 1;
    }
  }

  Ok(out.join("\n"))
}

struct Block<'a> {
  true_branch: &'a [&'a str],
  false_branch: &'a [&'a str],
  /// Index of the `---@end` line.
  end: usize,
}

/// Collect the body of a block whose `---@if` sits just before `start`.
fn collect_block<'a>(lines: &'a [&'a str], start: usize, opened: usize) -> Result<Block<'a>, DirectiveError> {
  let mut else_at: Option<usize> = None;

  for (j, line) in lines.iter().enumerate().skip(start) {
    let trimmed = line.trim();
    if marker_rest(trimmed, DIRECTIVE_IF).is_some() {
      return Err(DirectiveError::Nested { line: j + 1, opened });
    }
    if marker_rest(trimmed, DIRECTIVE_ELSE).is_some() {
      if else_at.is_some() {
        return Err(DirectiveError::DuplicateElse { line: j + 1, opened });
      }
      else_at = Some(j);
      continue;
    }
    if marker_rest(trimmed, DIRECTIVE_END).is_some() {
      return Ok(match else_at {
        Some(e) => Block {
          true_branch: &lines[start..e],
          false_branch: &lines[e + 1..j],
          end: j,
        },
        None => Block {
          true_branch: &lines[start..j],
          false_branch: &[],
          end: j,
        },
      });
    }
  }

  Err(DirectiveError::Unterminated { opened })
}

/// Split a condition into variable name and optional parsed literal.
fn parse_condition(condition: &str, line: usize) -> Result<(String, Option<DirectiveValue>), DirectiveError> {
  let condition = condition.trim();
  let Some(name) = condition.split_whitespace().next() else {
    return Err(DirectiveError::MissingVariable { line });
  };
  let literal = condition[name.len()..].trim();
  let literal = (!literal.is_empty()).then(|| DirectiveValue::parse(literal));
  Ok((name.to_string(), literal))
}

/// Evaluate a directive condition against the build variables.
fn holds(name: &str, literal: Option<&DirectiveValue>, variables: &BTreeMap<String, Value>) -> bool {
  let bound = variables.get(name);
  match literal {
    None => matches!(bound, Some(v) if !matches!(v, Value::Null | Value::Bool(false))),
    Some(lit) => bound
      .and_then(DirectiveValue::from_binding)
      .is_some_and(|v| v == *lit),
  }
}

/// The text after a whole-line marker, or `None` if the line is not that
/// marker. Requires a word boundary so `---@end` never matches `---@endx`.
fn marker_rest<'a>(trimmed: &'a str, marker: &str) -> Option<&'a str> {
  let rest = trimmed.strip_prefix(marker)?;
  match rest.chars().next() {
    None => Some(rest),
    Some(c) if c.is_whitespace() => Some(rest),
    Some(_) => None,
  }
}

/// Strip leading and trailing blank lines from a surviving branch.
fn trim_blank_edges<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
  let start = lines.iter().position(|l| !l.trim().is_empty());
  let Some(start) = start else { return &[] };
  let end = lines.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(start);
  &lines[start..=end]
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
  }

  #[test]
  fn true_branch_survives() {
    let text = "a\n---@if RELEASE true\nrelease\n---@else\ndebug\n---@end\nb";
    let out = expand(text, &vars(&[("RELEASE", json!(true))])).unwrap();
    assert_eq!(out, "a\nrelease\nb");
  }

  #[test]
  fn false_branch_survives_when_unequal() {
    let text = "---@if RELEASE true\nrelease\n---@else\ndebug\n---@end";
    let out = expand(text, &vars(&[("RELEASE", json!(false))])).unwrap();
    assert_eq!(out, "debug");
  }

  #[test]
  fn missing_else_yields_empty_false_branch() {
    let text = "x\n---@if RELEASE true\nrelease\n---@end\ny";
    let out = expand(text, &vars(&[])).unwrap();
    assert_eq!(out, "x\ny");
  }

  #[test]
  fn absent_literal_is_truthy_check() {
    let text = "---@if DEBUG\nyes\n---@end";
    assert_eq!(expand(text, &vars(&[("DEBUG", json!(1))])).unwrap(), "yes");
    assert_eq!(expand(text, &vars(&[("DEBUG", json!(false))])).unwrap(), "");
    assert_eq!(expand(text, &vars(&[])).unwrap(), "");
  }

  #[test]
  fn non_json_literal_compares_as_plain_string() {
    // `fast` is not valid JSON, so it compares as the string "fast".
    let text = "---@if MODE fast\nyes\n---@end";
    assert_eq!(expand(text, &vars(&[("MODE", json!("fast"))])).unwrap(), "yes");
    assert_eq!(expand(text, &vars(&[("MODE", json!("slow"))])).unwrap(), "");
  }

  #[test]
  fn integer_and_float_bindings_compare_numerically() {
    let text = "---@if PORT 80\nyes\n---@end";
    assert_eq!(expand(text, &vars(&[("PORT", json!(80.0))])).unwrap(), "yes");
  }

  #[test]
  fn surviving_body_is_trimmed_of_blank_edges() {
    let text = "---@if ON\n\n  body\n\n---@end";
    let out = expand(text, &vars(&[("ON", json!(true))])).unwrap();
    assert_eq!(out, "  body");
  }

  #[test]
  fn nested_if_is_an_error() {
    let text = "---@if A\n---@if B\nx\n---@end\n---@end";
    let err = expand(text, &vars(&[])).unwrap_err();
    assert!(matches!(err, DirectiveError::Nested { line: 2, opened: 1 }));
  }

  #[test]
  fn unterminated_block_is_an_error() {
    let err = expand("---@if A\nx", &vars(&[])).unwrap_err();
    assert!(matches!(err, DirectiveError::Unterminated { opened: 1 }));
  }

  #[test]
  fn stray_end_is_an_error() {
    let err = expand("x\n---@end", &vars(&[])).unwrap_err();
    assert!(matches!(err, DirectiveError::Unopened { line: 2, .. }));
  }

  #[test]
  fn export_marker_is_not_mistaken_for_a_directive() {
    let text = "---@export foo";
    assert_eq!(expand(text, &vars(&[])).unwrap(), text);
  }
}
