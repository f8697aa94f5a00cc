//! Parsers for objdump's decoded line table and symbol table.

use std::collections::BTreeMap;

use super::{DebugMap, FunctionRange, LineRange};

/// One row of `objdump --dwarf=decodedline`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LineRow {
  file: String,
  /// `None` marks the end of a sequence.
  line: Option<u32>,
  address: u64,
}

fn parse_hex(token: &str) -> Option<u64> {
  let digits = token.strip_prefix("0x").unwrap_or(token);
  u64::from_str_radix(digits, 16).ok()
}

/// Rows look like `main.c   42   0x1f4   x`, or `main.c   -   0x220` at the
/// end of a sequence. Headers and section banners are skipped.
fn parse_line_rows(text: &str) -> Vec<LineRow> {
  let mut rows = Vec::new();
  for raw in text.lines() {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < 3 || !tokens[2].starts_with("0x") {
      continue;
    }
    let Some(address) = parse_hex(tokens[2]) else {
      continue;
    };
    let line = match tokens[1] {
      "-" => None,
      other => match other.parse::<u32>() {
        Ok(line) => Some(line),
        Err(_) => continue,
      },
    };
    rows.push(LineRow {
      file: tokens[0].to_string(),
      line,
      address,
    });
  }
  rows
}

/// Build coalesced line ranges: each row covers up to the next row's address
/// and consecutive rows on the same file and line merge into one range.
pub(super) fn line_ranges(text: &str) -> (Vec<String>, Vec<LineRange>) {
  let rows = parse_line_rows(text);
  let mut files: Vec<String> = Vec::new();
  let mut file_index: BTreeMap<String, usize> = BTreeMap::new();
  let mut ranges: Vec<LineRange> = Vec::new();

  for (idx, row) in rows.iter().enumerate() {
    let Some(line) = row.line else {
      continue;
    };
    let end = rows.get(idx + 1).map(|next| next.address).unwrap_or(row.address);
    if end <= row.address {
      continue;
    }
    let file = *file_index.entry(row.file.clone()).or_insert_with(|| {
      files.push(row.file.clone());
      files.len() - 1
    });

    if let Some(last) = ranges.last_mut()
      && last.file == file
      && last.line == line
      && last.end == row.address
    {
      last.end = end;
      continue;
    }
    ranges.push(LineRange {
      start: row.address,
      end,
      file,
      line,
    });
  }

  ranges.sort_by_key(|r| r.start);
  (files, ranges)
}

/// Function symbols from `objdump --syms`:
/// `00000024 g     F .text	0000001c main`.
pub(super) fn function_ranges(text: &str) -> Vec<FunctionRange> {
  let mut functions = Vec::new();
  for raw in text.lines() {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < 4 || !tokens.contains(&"F") {
      continue;
    }
    let (Some(address), Some(size)) = (parse_hex(tokens[0]), parse_hex(tokens[tokens.len() - 2])) else {
      continue;
    };
    if size == 0 {
      continue;
    }
    // Thumb function symbols carry the mode bit.
    let start = address & !1;
    let Some(end) = start.checked_add(size) else {
      continue;
    };
    functions.push(FunctionRange {
      start,
      end,
      name: tokens[tokens.len() - 1].to_string(),
    });
  }
  functions.sort_by_key(|f| f.start);
  functions
}

pub(super) fn debug_map(lines_text: &str, syms_text: &str) -> DebugMap {
  let (files, lines) = line_ranges(lines_text);
  DebugMap {
    files,
    lines,
    functions: function_ranges(syms_text),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const DECODED: &str = "\
pebble-app.elf:     file format elf32-littlearm

Contents of the .debug_line section:

CU: ./src/main.c:
File name                            Line number    Starting address    View    Stmt
main.c                                        10              0x24               x
main.c                                        10              0x26
main.c                                        11              0x2a               x
util.c                                         3              0x30               x
main.c                                        11              0x34               x
main.c                                         -              0x40
";

  const SYMS: &str = "\
pebble-app.elf:     file format elf32-littlearm

SYMBOL TABLE:
00000000 l    df *ABS*\t00000000 main.c
00000025 g     F .text\t0000000c main
00000031 l     F .text\t00000010 helper
00000040 g     O .data\t00000004 counter
00000050 g     F .text\t00000000 empty
";

  #[test]
  fn coalesces_consecutive_rows() {
    let (files, ranges) = line_ranges(DECODED);

    assert_eq!(files, vec!["main.c", "util.c"]);
    assert_eq!(
      ranges,
      vec![
        LineRange { start: 0x24, end: 0x2a, file: 0, line: 10 },
        LineRange { start: 0x2a, end: 0x30, file: 0, line: 11 },
        LineRange { start: 0x30, end: 0x34, file: 1, line: 3 },
        LineRange { start: 0x34, end: 0x40, file: 0, line: 11 },
      ]
    );
  }

  #[test]
  fn function_symbols_only() {
    let functions = function_ranges(SYMS);
    assert_eq!(
      functions,
      vec![
        FunctionRange { start: 0x24, end: 0x30, name: "main".to_string() },
        FunctionRange { start: 0x30, end: 0x40, name: "helper".to_string() },
      ]
    );
  }

  #[test]
  fn symbol_running_past_address_space_is_skipped() {
    let syms = "ffffffffffffff01 g     F .text\t0000000000001000 evil\n00000025 g     F .text\t0000000c main\n";
    let functions = function_ranges(syms);
    assert_eq!(functions, vec![FunctionRange { start: 0x24, end: 0x30, name: "main".to_string() }]);
  }

  #[test]
  fn empty_output_gives_empty_map() {
    let map = debug_map("", "");
    assert!(map.files.is_empty());
    assert!(map.lines.is_empty());
    assert!(map.functions.is_empty());
  }
}
