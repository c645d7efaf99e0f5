//! Line-granular source mapping records.

/// Maps each output line of one stage to the input line it came from.
///
/// `lines[out]` is the zero-based input line for output line `out`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMapping {
  lines: Vec<u32>,
}

impl LineMapping {
  pub fn new(lines: Vec<u32>) -> Self {
    Self { lines }
  }

  /// Every output line maps to the same input line.
  pub fn identity(line_count: usize) -> Self {
    Self {
      lines: (0..line_count as u32).collect(),
    }
  }

  /// Mapping for code whose line structure is unchanged.
  pub fn identity_for(code: &str) -> Self {
    Self::identity(line_count(code))
  }

  pub fn get(&self, output_line: u32) -> Option<u32> {
    self.lines.get(output_line as usize).copied()
  }

  pub fn len(&self) -> usize {
    self.lines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }
}

/// The mapping produced by one named stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMapping {
  pub stage: String,
  pub mapping: LineMapping,
}

/// Mappings of every stage a module went through, in stage order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingChain {
  pub records: Vec<StageMapping>,
}

impl MappingChain {
  pub fn push(&mut self, stage: impl Into<String>, mapping: LineMapping) {
    self.records.push(StageMapping {
      stage: stage.into(),
      mapping,
    });
  }

  /// Original source line for a line of the final output.
  ///
  /// Walks the chain from the last stage back to the first. An empty chain
  /// maps every line to itself.
  pub fn resolve(&self, output_line: u32) -> Option<u32> {
    self
      .records
      .iter()
      .rev()
      .try_fold(output_line, |line, record| record.mapping.get(line))
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// Number of lines in `code`, counting a trailing line without a newline.
pub fn line_count(code: &str) -> usize {
  code.lines().count()
}
