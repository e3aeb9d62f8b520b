//! Span classification for Lua source text.
//!
//! Classifies every byte of a chunk as code, string, or comment so that the
//! rewriting passes only ever touch real code. Handles short strings with
//! escapes, long strings (`[==[ ... ]==]`), line comments and long-bracket
//! block comments. This replaces pattern-and-strip heuristics with a single
//! forward scan whose result is consulted by offset.

/// Classification of a single byte of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
  Code,
  Str,
  Comment,
}

/// Byte-granular classification of one chunk of Lua source.
#[derive(Debug)]
pub struct CodeMap {
  kinds: Vec<SpanKind>,
}

impl CodeMap {
  /// Scan `text` once and record the kind of every byte.
  pub fn scan(text: &str) -> Self {
    let bytes = text.as_bytes();
    let mut kinds = vec![SpanKind::Code; bytes.len()];
    let mut i = 0;

    while i < bytes.len() {
      match bytes[i] {
        b'\'' | b'"' => {
          let quote = bytes[i];
          let start = i;
          i += 1;
          // An unterminated short string ends at the line break; the parser
          // rejects it later, classification just has to stay in bounds.
          while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
            if bytes[i] == b'\\' {
              i += 1;
            }
            i += 1;
          }
          if i < bytes.len() && bytes[i] == quote {
            i += 1;
          }
          mark(&mut kinds, start, i, SpanKind::Str);
        }
        b'[' => {
          if let Some(level) = open_long_bracket(bytes, i) {
            let start = i;
            i = skip_long_bracket(bytes, i, level);
            mark(&mut kinds, start, i, SpanKind::Str);
          } else {
            i += 1;
          }
        }
        b'-' if bytes.get(i + 1) == Some(&b'-') => {
          let start = i;
          i += 2;
          if i < bytes.len()
            && bytes[i] == b'['
            && let Some(level) = open_long_bracket(bytes, i)
          {
            i = skip_long_bracket(bytes, i, level);
          } else {
            while i < bytes.len() && bytes[i] != b'\n' {
              i += 1;
            }
          }
          mark(&mut kinds, start, i, SpanKind::Comment);
        }
        _ => i += 1,
      }
    }

    Self { kinds }
  }

  /// Whether the byte at `offset` belongs to a code span.
  pub fn is_code(&self, offset: usize) -> bool {
    self.kinds.get(offset).copied() == Some(SpanKind::Code)
  }

  /// Whether the byte at `offset` belongs to a comment span.
  pub fn is_comment(&self, offset: usize) -> bool {
    self.kinds.get(offset).copied() == Some(SpanKind::Comment)
  }
}

fn mark(kinds: &mut [SpanKind], start: usize, end: usize, kind: SpanKind) {
  for slot in &mut kinds[start..end] {
    *slot = kind;
  }
}

/// At an opening `[`, return the bracket level if this starts a long bracket
/// (`[[`, `[=[`, `[==[`, ...).
fn open_long_bracket(bytes: &[u8], i: usize) -> Option<usize> {
  let mut j = i + 1;
  let mut level = 0;
  while bytes.get(j) == Some(&b'=') {
    level += 1;
    j += 1;
  }
  (bytes.get(j) == Some(&b'[')).then_some(level)
}

/// From the opening `[` of a long bracket, return the offset just past the
/// matching close. An unterminated bracket runs to the end of the chunk.
fn skip_long_bracket(bytes: &[u8], i: usize, level: usize) -> usize {
  let mut j = i + 2 + level;
  while j < bytes.len() {
    if bytes[j] == b']' {
      let mut k = j + 1;
      let mut eqs = 0;
      while bytes.get(k) == Some(&b'=') {
        eqs += 1;
        k += 1;
      }
      if eqs == level && bytes.get(k) == Some(&b']') {
        return k + 1;
      }
    }
    j += 1;
  }
  bytes.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds_at(text: &str, needle: &str) -> SpanKind {
    let offset = text.find(needle).unwrap();
    let map = CodeMap::scan(text);
    if map.is_code(offset) {
      SpanKind::Code
    } else {
      map.kinds[offset]
    }
  }

  #[test]
  fn plain_code_is_code() {
    assert_eq!(kinds_at("local x = require('a')", "require"), SpanKind::Code);
  }

  #[test]
  fn line_comment_is_comment() {
    assert_eq!(kinds_at("x = 1 -- require('a')", "require"), SpanKind::Comment);
  }

  #[test]
  fn block_comment_spans_lines() {
    let text = "--[[\nrequire('a')\n]]\nrequire('b')";
    assert_eq!(kinds_at(text, "require('a')"), SpanKind::Comment);
    let map = CodeMap::scan(text);
    assert!(map.is_code(text.find("require('b')").unwrap()));
  }

  #[test]
  fn short_string_is_string() {
    assert_eq!(kinds_at(r#"x = "require('a')""#, "require"), SpanKind::Str);
  }

  #[test]
  fn escaped_quote_does_not_end_string() {
    let text = r#"x = "a\"b require('c')""#;
    assert_eq!(kinds_at(text, "require"), SpanKind::Str);
  }

  #[test]
  fn long_string_is_string() {
    assert_eq!(kinds_at("x = [==[ require('a') ]==]", "require"), SpanKind::Str);
  }

  #[test]
  fn index_bracket_is_not_a_long_string() {
    let text = "t[a] = require('b')";
    let map = CodeMap::scan(text);
    assert!(map.is_code(text.find("require").unwrap()));
  }

  #[test]
  fn code_after_string_on_same_line_is_code() {
    let text = "local s = 'x'; require('a')";
    let map = CodeMap::scan(text);
    assert!(map.is_code(text.find("require").unwrap()));
  }

  #[test]
  fn offset_past_end_is_not_code() {
    let map = CodeMap::scan("x");
    assert!(!map.is_code(10));
    assert!(!map.is_comment(10));
  }

  #[test]
  fn comment_marker_inside_long_string_is_string() {
    let text = "local s = [==[\n---@export foo\n]==]\n-- trailer";
    let map = CodeMap::scan(text);
    assert!(!map.is_comment(text.find("---@export").unwrap()));
    assert!(map.is_comment(text.find("-- trailer").unwrap()));
  }
}
