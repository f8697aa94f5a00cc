//! Preprocessor directive gate.
//!
//! Every file written into a workspace from a project is scanned before the
//! toolchain runs, whatever its extension: any of them can be pulled into a
//! C translation unit by a quoted include. Inclusion directives that could
//! pull arbitrary files from the build host into the compiled output are
//! rejected:
//!
//! - `#include "/etc/passwd"` - absolute operand
//! - `#include "../../../../etc/passwd"` - resolves outside the workspace
//! - `#include <../../secret.h>` - angled operand climbing out of the include path
//! - `#include SECRET_PATH` - macro-expanded operand, unknowable before preprocessing
//!
//! The text is normalized the way the preprocessor sees it before scanning:
//! trigraphs are replaced, backslash-continued lines are joined and comments
//! are removed, so `#/**/include`, `??=include` and a directive split across
//! physical lines are all recognized. `%:` is accepted as `#`.

use std::path::{Component, Path};

use thiserror::Error;

use crate::util::is_within;

const INCLUDE_DIRECTIVES: &[&str] = &["include", "include_next", "import"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreprocessError {
  #[error("{file}:{line}: disallowed directive: {directive}")]
  DisallowedDirective { file: String, line: usize, directive: String },
}

/// Scan `content` (the text written to `file`, somewhere under `root`).
pub fn check_source(root: &Path, file: &Path, content: &str) -> Result<(), PreprocessError> {
  let dir = file.parent().unwrap_or(root);
  let content = replace_trigraphs(content);
  for (line, text) in strip_comments(logical_lines(&content)) {
    let Some((directive, operand)) = split_directive(&text) else {
      continue;
    };
    if !INCLUDE_DIRECTIVES.contains(&directive) {
      continue;
    }
    if !operand_allowed(root, dir, operand) {
      return Err(PreprocessError::DisallowedDirective {
        file: file.display().to_string(),
        line,
        directive: text.trim().to_string(),
      });
    }
  }
  Ok(())
}

/// `??=` is `#` and `??/` is a backslash. Both keep the line structure.
fn replace_trigraphs(content: &str) -> String {
  content.replace("??=", "#").replace("??/", "\\")
}

/// Physical lines joined across backslash continuations, tagged with the
/// 1-based number of the first physical line.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
  let mut lines = Vec::new();
  let mut pending: Option<(usize, String)> = None;

  for (idx, raw) in content.lines().enumerate() {
    let raw = raw.strip_suffix('\r').unwrap_or(raw);
    let (start, mut text) = pending.take().unwrap_or((idx + 1, String::new()));
    match raw.strip_suffix('\\') {
      Some(head) => {
        text.push_str(head);
        pending = Some((start, text));
      }
      None => {
        text.push_str(raw);
        lines.push((start, text));
      }
    }
  }
  if let Some(last) = pending {
    lines.push(last);
  }
  lines
}

/// Replace every comment with a single space.
///
/// A block comment that spans lines merges them into one, keeping the number
/// of the line it opened on. String and character literals are left alone.
fn strip_comments(lines: Vec<(usize, String)>) -> Vec<(usize, String)> {
  let mut stripped = Vec::new();
  let mut open: Option<(usize, String)> = None;

  for (number, text) in lines {
    let in_block = open.is_some();
    let (start, mut out) = open.take().unwrap_or((number, String::new()));
    if in_block && !out.ends_with(' ') {
      out.push(' ');
    }
    let mut in_block = in_block;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
      if in_block {
        if c == '*' && chars.peek() == Some(&'/') {
          chars.next();
          in_block = false;
        }
        continue;
      }
      if let Some(q) = quote {
        out.push(c);
        if c == '\\' {
          if let Some(escaped) = chars.next() {
            out.push(escaped);
          }
        } else if c == q {
          quote = None;
        }
        continue;
      }
      match c {
        '"' | '\'' => {
          quote = Some(c);
          out.push(c);
        }
        '/' if chars.peek() == Some(&'*') => {
          chars.next();
          in_block = true;
          out.push(' ');
        }
        '/' if chars.peek() == Some(&'/') => break,
        _ => out.push(c),
      }
    }

    if in_block {
      open = Some((start, out));
    } else {
      stripped.push((start, out));
    }
  }
  if let Some(last) = open {
    stripped.push(last);
  }
  stripped
}

/// `#  include  "x.h"` → `("include", "\"x.h\"")`.
fn split_directive(line: &str) -> Option<(&str, &str)> {
  let line = line.trim_start();
  let rest = line.strip_prefix('#').or_else(|| line.strip_prefix("%:"))?.trim_start();
  let end = rest
    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .unwrap_or(rest.len());
  let (name, operand) = rest.split_at(end);
  if name.is_empty() {
    return None;
  }
  Some((name, operand.trim()))
}

fn operand_allowed(root: &Path, dir: &Path, operand: &str) -> bool {
  if let Some(quoted) = operand.strip_prefix('"') {
    let Some(end) = quoted.find('"') else {
      return false;
    };
    let target = Path::new(&quoted[..end]);
    return !target.is_absolute() && is_within(root, &dir.join(target));
  }

  if let Some(angled) = operand.strip_prefix('<') {
    let Some(end) = angled.find('>') else {
      return false;
    };
    // Searched on the toolchain include path, so no directory to resolve against.
    let target = Path::new(&angled[..end]);
    return !target.is_absolute() && !target.components().any(|c| c == Component::ParentDir);
  }

  false
}

#[cfg(test)]
mod tests {
  use super::*;

  fn check(content: &str) -> Result<(), PreprocessError> {
    check_source(Path::new("/work/app"), Path::new("/work/app/src/main.c"), content)
  }

  fn rejected_line(content: &str) -> usize {
    let PreprocessError::DisallowedDirective { line, .. } = check(content).unwrap_err();
    line
  }

  #[test]
  fn ordinary_includes_pass() {
    let source = "#include <pebble.h>\n#include \"util/strings.h\"\n# include \"../src/main.h\"\n\nint main(void) { return 0; }\n";
    assert!(check(source).is_ok());
  }

  #[test]
  fn absolute_include_is_rejected() {
    let err = check("int x;\n#include \"/etc/passwd\"\n").unwrap_err();
    let PreprocessError::DisallowedDirective { line, directive, .. } = err;
    assert_eq!(line, 2);
    assert_eq!(directive, "#include \"/etc/passwd\"");
  }

  #[test]
  fn include_escaping_workspace_is_rejected() {
    assert!(check("#include \"../../../etc/passwd\"\n").is_err());
    assert!(check("#include <../../etc/shadow>\n").is_err());
    assert!(check("#include </etc/passwd>\n").is_err());
    assert!(check("#include_next \"../../x.h\"\n").is_err());
    assert!(check("#import \"/etc/hosts\"\n").is_err());
  }

  #[test]
  fn macro_operand_is_rejected() {
    assert!(check("#define P \"/etc/passwd\"\n#include P\n").is_err());
    assert!(check("#include \"unterminated.h\n").is_err());
  }

  #[test]
  fn continued_directive_is_joined() {
    assert_eq!(rejected_line("int a;\n#inc\\\nlude \"/etc/passwd\"\n"), 2);
  }

  #[test]
  fn comment_between_hash_and_name_is_seen_through() {
    assert_eq!(rejected_line("int a;\n#/**/include \"/etc/passwd\"\n"), 2);
    assert!(check("# /* note */ include /* x */ \"/etc/passwd\"\n").is_err());
    assert!(check("/* banner */ #include \"/etc/passwd\"\n").is_err());
  }

  #[test]
  fn block_comment_spanning_lines_is_joined() {
    assert_eq!(rejected_line("int a;\n#/*\n  */include \"/etc/passwd\"\n"), 2);
    assert_eq!(rejected_line("/* one\n two */ #include \"/etc/passwd\"\n"), 1);
  }

  #[test]
  fn alternative_spellings_of_hash_are_recognized() {
    assert!(check("%:include \"/etc/passwd\"\n").is_err());
    assert!(check("  %: include </etc/passwd>\n").is_err());
    assert!(check("??=include \"/etc/passwd\"\n").is_err());
    assert!(check("#inc??/\nlude \"/etc/passwd\"\n").is_err());
  }

  #[test]
  fn comments_and_literals_do_not_confuse_the_scan() {
    let source = "#include \"util.h\" // helpers\n#include <pebble.h> /* sdk */\nconst char *url = \"http://example.com/*\";\n#include \"main.h\"\n// #include \"/etc/passwd\"\n/* #include \"/etc/passwd\" */\n";
    assert!(check(source).is_ok());
  }

  #[test]
  fn every_extension_is_scanned() {
    let root = Path::new("/work/app");
    for file in ["src/evil.txt", "src/x.inc", "src/js/app.js", "resources/data/blob", "src/util.h"] {
      assert!(
        check_source(root, &root.join(file), "#include \"/etc/passwd\"").is_err(),
        "{}",
        file
      );
    }
    assert!(check_source(root, &root.join("src/js/app.js"), "var x = 1; // #include </etc/passwd>\n").is_ok());
  }

  #[test]
  fn other_directives_are_ignored() {
    assert!(check("#pragma once\n#define X 1\n#if X\n#endif\n#!/usr/bin/env node\n").is_ok());
  }
}
