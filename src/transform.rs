//! Source transformation pipeline.
//!
//! Raw text goes through, in order: line-ending normalization, conditional
//! directive expansion, the dangling-decimal guard, Lua syntax validation,
//! then a per-line rewrite pass (export markers, require rewriting,
//! compile-time helper expansion). Every rewriting step, the decimal guard
//! included, consults a span classification of the chunk, so markers and
//! references inside strings and comments are never touched.

use std::path::Path;

use mlua::Lua;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::consts::{EXPORT_MARKER, EXPORTS_TABLE, HELPER_BUILDVALUE, HELPER_EMBED, MODULES_TABLE};
use crate::directive::{self, DirectiveError};
use crate::error::Result;
use crate::graph;
use crate::lexer::CodeMap;
use crate::session::Session;

/// Errors raised while transforming one file.
#[derive(Debug, Error)]
pub enum TransformError {
  /// The expanded text is not valid Lua.
  #[error("syntax error at {file}:{line}:{column}: {message}\n  {source_line}")]
  Syntax {
    file: String,
    line: usize,
    column: usize,
    message: String,
    source_line: String,
  },

  #[error(transparent)]
  Directive(#[from] DirectiveError),

  /// Compile-time helpers expand before any expression evaluation exists,
  /// so their arguments must be source literals.
  #[error("{helper}() argument must be a string literal ({file}:{line})")]
  NonLiteralHelperArg { helper: String, file: String, line: usize },

  #[error("{helper}(\"{argument}\") in {file}: {source}")]
  HelperRead {
    helper: String,
    argument: String,
    file: String,
    #[source]
    source: std::io::Error,
  },
}

/// Transform one file's raw source under the session's active context.
pub fn transform(session: &mut Session, raw: &str, file: &Path) -> Result<String> {
  let text = normalize_line_endings(raw);
  let text = directive::expand(&text, &session.variables).map_err(TransformError::from)?;
  let text = patch_dangling_decimals(&text, file);
  validate_syntax(session.lua(), &text, file)?;

  let map = CodeMap::scan(&text);
  let lines: Vec<&str> = text.split('\n').collect();

  let mut out: Vec<String> = Vec::with_capacity(lines.len());
  let mut base = 0usize;
  for (i, line) in lines.iter().enumerate() {
    // A real marker line lexes as a comment; the same bytes inside a long
    // string are string content and must survive untouched.
    let indent = line.len() - line.trim_start().len();
    if map.is_comment(base + indent)
      && let Some(registration) = rewrite_export_marker(line, &lines[i + 1..])
    {
      out.push(registration);
      base += line.len() + 1;
      continue;
    }

    let rewritten = rewrite_line(session, line, base, &map, file, i + 1)?;

    // In inline mode a line reduced to a bare lookup is a meaningless
    // top-level expression; drop it.
    if !session.build.preload && is_bare_lookup(&rewritten) {
      out.push(String::new());
    } else {
      out.push(rewritten);
    }
    base += line.len() + 1;
  }

  Ok(out.join("\n"))
}

fn normalize_line_endings(raw: &str) -> String {
  raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Complete a bare trailing `?` after a numeric literal to `.0`.
///
/// Runs before validation: the unpatched form is not parseable Lua, it is a
/// formatting quirk of upstream tooling. The text is still lexable, so a
/// span scan keeps the guard away from string and comment content.
fn patch_dangling_decimals(text: &str, file: &Path) -> String {
  let map = CodeMap::scan(text);
  let mut out: Vec<String> = Vec::new();
  let mut base = 0usize;
  for (i, line) in text.split('\n').enumerate() {
    match line.strip_suffix('?') {
      Some(body)
        if body.chars().next_back().is_some_and(|c| c.is_ascii_digit())
          && map.is_code(base + line.len() - 1) =>
      {
        warn!(
          file = %file.display(),
          line = i + 1,
          "dangling '?' after numeric literal completed to '.0'"
        );
        out.push(format!("{body}.0"));
      }
      _ => out.push(line.to_string()),
    }
    base += line.len() + 1;
  }
  out.join("\n")
}

fn validate_syntax(lua: &Lua, text: &str, file: &Path) -> std::result::Result<(), TransformError> {
  let chunk_name = file.display().to_string();
  match lua.load(text).set_name(chunk_name).into_function() {
    Ok(_) => Ok(()),
    Err(err) => Err(syntax_error(&err.to_string(), text, file)),
  }
}

fn syntax_error(message: &str, text: &str, file: &Path) -> TransformError {
  let (line, parser_message) = parse_lua_location(message).unwrap_or((1, message.to_string()));
  let source_line = text.split('\n').nth(line.saturating_sub(1)).unwrap_or("").to_string();
  let column = near_token(&parser_message)
    .and_then(|token| source_line.find(token))
    .map(|i| i + 1)
    .unwrap_or(1);

  TransformError::Syntax {
    file: file.display().to_string(),
    line,
    column,
    message: parser_message,
    source_line,
  }
}

/// Pull the 1-based line and trailing message out of a Lua error string of
/// the shape `... [string "chunk"]:LINE: message`.
fn parse_lua_location(message: &str) -> Option<(usize, String)> {
  let idx = message.find("\"]:")?;
  let rest = &message[idx + 3..];
  let (line, msg) = rest.split_once(':')?;
  Some((line.trim().parse().ok()?, msg.trim().to_string()))
}

/// The token Lua names in a `... near 'token'` message.
fn near_token(message: &str) -> Option<&str> {
  let (_, tail) = message.rsplit_once("near '")?;
  tail.split('\'').next().filter(|t| !t.is_empty())
}

// Per-line rewriting -----------------------------------------------------

/// A call-shaped occurrence of a recognized name. `argument` is the single
/// string-literal argument, or `None` when the call is not literal-shaped.
#[derive(Debug, PartialEq, Eq)]
struct CallSite {
  start: usize,
  end: usize,
  argument: Option<String>,
}

/// Rewrite the require and compile-time-helper calls on one line. Call sites
/// are located against the pristine line first, then replacements are
/// applied back-to-front so offsets stay valid.
fn rewrite_line(
  session: &mut Session,
  line: &str,
  base: usize,
  map: &CodeMap,
  file: &Path,
  line_no: usize,
) -> Result<String> {
  let mut edits: Vec<(usize, usize, String)> = Vec::new();

  for site in scan_calls(line, "require") {
    if !map.is_code(base + site.start) {
      continue;
    }
    // Non-literal requires are not module references; leave them alone.
    let Some(reference) = site.argument else { continue };
    if let Some(key) = graph::resolve_reference(session, &reference)? {
      let replacement = if session.build.preload {
        format!("require('{key}')")
      } else {
        format!("{MODULES_TABLE}['{key}']")
      };
      edits.push((site.start, site.end, replacement));
    }
  }

  for helper in [HELPER_EMBED, HELPER_BUILDVALUE] {
    for site in scan_calls(line, helper) {
      if !map.is_code(base + site.start) {
        continue;
      }
      let Some(argument) = site.argument else {
        return Err(
          TransformError::NonLiteralHelperArg {
            helper: helper.to_string(),
            file: file.display().to_string(),
            line: line_no,
          }
          .into(),
        );
      };
      let replacement = if helper == HELPER_EMBED {
        embed_file(session, &argument, file)?
      } else {
        build_value(session, &argument)
      };
      edits.push((site.start, site.end, replacement));
    }
  }

  edits.sort_by_key(|(start, ..)| *start);
  let mut rewritten = line.to_string();
  for (start, end, replacement) in edits.into_iter().rev() {
    rewritten.replace_range(start..end, &replacement);
  }
  Ok(rewritten)
}

/// Locate every occurrence of `name` on the line that looks like a call.
fn scan_calls(line: &str, name: &str) -> Vec<CallSite> {
  let bytes = line.as_bytes();
  let mut sites = Vec::new();
  let mut from = 0;

  while let Some(found) = line[from..].find(name) {
    let start = from + found;
    from = start + name.len();

    let bounded_before = start == 0 || !is_ident_byte(bytes[start - 1]);
    let after = start + name.len();
    let bounded_after = bytes.get(after).is_none_or(|b| !is_ident_byte(*b));
    if !bounded_before || !bounded_after {
      continue;
    }

    let mut j = skip_spaces(bytes, after);
    if bytes.get(j) != Some(&b'(') {
      continue;
    }
    j = skip_spaces(bytes, j + 1);

    let Some(&quote @ (b'"' | b'\'')) = bytes.get(j) else {
      sites.push(CallSite {
        start,
        end: start,
        argument: None,
      });
      continue;
    };

    // Scan for the closing quote byte-wise so a backslash-escaped quote
    // inside the literal does not end it early.
    let lit_start = j + 1;
    let mut close = lit_start;
    while bytes.get(close).is_some_and(|b| *b != quote) {
      close += if bytes[close] == b'\\' { 2 } else { 1 };
    }
    if bytes.get(close) != Some(&quote) {
      sites.push(CallSite {
        start,
        end: start,
        argument: None,
      });
      continue;
    }

    let k = skip_spaces(bytes, close + 1);
    if bytes.get(k) == Some(&b')') {
      sites.push(CallSite {
        start,
        end: k + 1,
        argument: Some(line[lit_start..close].to_string()),
      });
      from = k + 1;
    } else {
      sites.push(CallSite {
        start,
        end: start,
        argument: None,
      });
    }
  }

  sites
}

fn is_ident_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
  while bytes.get(i).is_some_and(|b| *b == b' ' || *b == b'\t') {
    i += 1;
  }
  i
}

// Export markers ---------------------------------------------------------

/// Rewrite an `---@export [NAME]` marker line into a registration that keeps
/// the exported name alive as a string literal. With no explicit name, the
/// name is read from the next non-blank declaration line.
fn rewrite_export_marker(line: &str, following: &[&str]) -> Option<String> {
  let trimmed = line.trim_start();
  let rest = trimmed.strip_prefix(EXPORT_MARKER)?;
  if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
    return None;
  }

  let explicit = rest.trim();
  let name = if explicit.is_empty() {
    following
      .iter()
      .map(|l| l.trim())
      .find(|l| !l.is_empty())
      .and_then(declared_name)
  } else {
    is_ident(explicit).then(|| explicit.to_string())
  };

  match name {
    Some(name) => {
      let indent = &line[..line.len() - trimmed.len()];
      Some(format!("{indent}{EXPORTS_TABLE}[#{EXPORTS_TABLE} + 1] = \"{name}\""))
    }
    None => {
      warn!(marker = line.trim(), "export marker without a resolvable name, left untouched");
      None
    }
  }
}

/// The symbol a declaration line introduces, if recognizable.
fn declared_name(line: &str) -> Option<String> {
  if let Some(rest) = line.strip_prefix("local function ") {
    return ident_prefix(rest);
  }
  if let Some(rest) = line.strip_prefix("function ") {
    return ident_prefix(rest);
  }
  if let Some(rest) = line.strip_prefix("local ") {
    return ident_prefix(rest);
  }
  let name = ident_prefix(line)?;
  let after = line[name.len()..].trim_start();
  after.starts_with('=').then_some(name)
}

fn ident_prefix(s: &str) -> Option<String> {
  let end = s
    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .unwrap_or(s.len());
  let name = &s[..end];
  (!name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit())).then(|| name.to_string())
}

fn is_ident(s: &str) -> bool {
  !s.is_empty()
    && !s.starts_with(|c: char| c.is_ascii_digit())
    && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// Compile-time helpers ---------------------------------------------------

/// Splice a file's contents (relative to the current source directory) as a
/// Lua long-string literal.
fn embed_file(session: &Session, argument: &str, file: &Path) -> std::result::Result<String, TransformError> {
  let path = session.current_dir().join(argument);
  let content = std::fs::read_to_string(&path).map_err(|e| TransformError::HelperRead {
    helper: HELPER_EMBED.to_string(),
    argument: argument.to_string(),
    file: file.display().to_string(),
    source: e,
  })?;
  Ok(long_string_literal(&content))
}

/// Splice a build variable as a Lua literal; unbound variables become `nil`.
fn build_value(session: &Session, argument: &str) -> String {
  match session.variables.get(argument) {
    Some(Value::Bool(b)) => b.to_string(),
    Some(Value::Number(n)) => n.to_string(),
    Some(Value::String(s)) => quoted_lua_string(s),
    Some(_) => {
      warn!(variable = argument, "non-scalar build variable spliced as nil");
      "nil".to_string()
    }
    None => "nil".to_string(),
  }
}

/// Wrap content in a long-string whose bracket level does not occur in it.
/// The leading newline is swallowed by the Lua lexer, keeping the content
/// byte-exact.
fn long_string_literal(content: &str) -> String {
  let mut level = 0;
  loop {
    let eq = "=".repeat(level);
    let close = format!("]{eq}]");
    if !content.contains(&close) && !content.ends_with(&format!("]{eq}")) {
      return format!("[{eq}[\n{content}]{eq}]");
    }
    level += 1;
  }
}

fn quoted_lua_string(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      c => out.push(c),
    }
  }
  out.push('"');
  out
}

/// Whether a line is exactly one inline-mode module lookup and nothing else.
fn is_bare_lookup(line: &str) -> bool {
  let trimmed = line.trim();
  let Some(rest) = trimmed.strip_prefix(MODULES_TABLE) else {
    return false;
  };
  rest
    .strip_prefix("['")
    .and_then(|r| r.strip_suffix("']"))
    .is_some_and(|inner| !inner.contains('\''))
}
