//! Built-in stages.

use std::collections::BTreeMap;

use super::{LineMapping, Stage, StageFailure, StageInput, StageOutput};

type StageFn = dyn Fn(StageInput<'_>) -> Result<StageOutput, StageFailure> + Send + Sync;

/// A stage backed by a closure.
pub struct FnStage {
  name: String,
  f: Box<StageFn>,
}

impl FnStage {
  pub fn new(
    name: impl Into<String>,
    f: impl Fn(StageInput<'_>) -> Result<StageOutput, StageFailure> + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      f: Box::new(f),
    }
  }
}

impl Stage for FnStage {
  fn name(&self) -> &str {
    &self.name
  }

  fn apply(&self, input: StageInput<'_>) -> Result<StageOutput, StageFailure> {
    (self.f)(input)
  }
}

/// Compile-time constant substitution (e.g. `process.env.NODE_ENV`).
///
/// Keys only match at identifier boundaries. Longer keys are applied first so
/// `process.env.NODE_ENV` wins over a `process.env` define.
#[derive(Debug, Clone)]
pub struct ReplaceStage {
  replacements: Vec<(String, String)>,
}

impl ReplaceStage {
  pub fn new(defines: BTreeMap<String, String>) -> Self {
    let mut replacements: Vec<(String, String)> = defines.into_iter().filter(|(k, _)| !k.is_empty()).collect();
    replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    Self { replacements }
  }
}

impl Stage for ReplaceStage {
  fn name(&self) -> &str {
    "replace"
  }

  fn apply(&self, input: StageInput<'_>) -> Result<StageOutput, StageFailure> {
    let mut out_lines: Vec<String> = Vec::new();
    let mut mapping = Vec::new();

    for (line_no, line) in input.code.lines().enumerate() {
      let mut replaced = line.to_string();
      for (key, value) in &self.replacements {
        replaced = replace_bounded(&replaced, key, value);
      }
      // A replacement value may span lines; all of them come from this input line.
      for piece in replaced.split('\n') {
        out_lines.push(piece.to_string());
        mapping.push(line_no as u32);
      }
    }

    Ok(StageOutput {
      code: join_lines(&out_lines),
      mapping: LineMapping::new(mapping),
    })
  }
}

fn is_ident_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_' || c == '$'
}

fn replace_bounded(haystack: &str, key: &str, value: &str) -> String {
  let mut out = String::with_capacity(haystack.len());
  let mut last = 0;

  for (start, _) in haystack.match_indices(key) {
    if start < last {
      continue;
    }
    let end = start + key.len();
    let before_ok = haystack[..start].chars().next_back().is_none_or(|c| !is_ident_char(c));
    let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_ident_char(c));
    if before_ok && after_ok {
      out.push_str(&haystack[last..start]);
      out.push_str(value);
      last = end;
    }
  }

  out.push_str(&haystack[last..]);
  out
}

/// Whitespace and comment stripping.
///
/// Works on whole lines: indentation and blank lines go, as do lines that are
/// entirely `//` or `/* */` comments. Line structure of the kept code is
/// preserved so the mapping stays exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyStage;

impl Stage for MinifyStage {
  fn name(&self) -> &str {
    "minify"
  }

  fn apply(&self, input: StageInput<'_>) -> Result<StageOutput, StageFailure> {
    let mut kept: Vec<String> = Vec::new();
    let mut mapping = Vec::new();
    let mut in_block = false;

    for (line_no, line) in input.code.lines().enumerate() {
      let mut rest = line.trim();

      if in_block {
        match rest.find("*/") {
          Some(end) => {
            in_block = false;
            rest = rest[end + 2..].trim_start();
          }
          None => continue,
        }
      }

      if rest.starts_with("/*") {
        match rest[2..].find("*/") {
          Some(end) => rest = rest[end + 4..].trim_start(),
          None => {
            in_block = true;
            continue;
          }
        }
      }

      if rest.is_empty() || rest.starts_with("//") {
        continue;
      }

      kept.push(rest.to_string());
      mapping.push(line_no as u32);
    }

    if in_block {
      return Err(StageFailure::new("unterminated block comment"));
    }

    Ok(StageOutput {
      code: join_lines(&kept),
      mapping: LineMapping::new(mapping),
    })
  }
}

fn join_lines(lines: &[String]) -> String {
  if lines.is_empty() {
    return String::new();
  }
  let mut code = lines.join("\n");
  code.push('\n');
  code
}
