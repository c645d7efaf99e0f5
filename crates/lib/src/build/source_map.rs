//! Merged source maps for linked bundles.
//!
//! Mappings are line-granular: each generated line that came from a module
//! carries a single token at column zero pointing at the source line it was
//! produced from.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sourcemap::{SourceMap, SourceMapBuilder};

/// Where one generated line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOrigin {
  pub source: u32,
  pub line: u32,
}

/// Accumulates sources and per-line origins while the artifact is linked.
pub struct BundleMap {
  builder: SourceMapBuilder,
  next_line: u32,
}

impl BundleMap {
  pub fn new(file: &str) -> Self {
    Self {
      builder: SourceMapBuilder::new(Some(file)),
      next_line: 0,
    }
  }

  /// Register a source with its original content and return its index.
  pub fn add_source(&mut self, name: &str, content: &str) -> u32 {
    let id = self.builder.add_source(name);
    self.builder.set_source_contents(id, Some(content));
    id
  }

  /// Record the origin of the next generated line.
  pub fn push_line(&mut self, origin: Option<LineOrigin>) {
    if let Some(origin) = origin {
      self
        .builder
        .add_raw(self.next_line, 0, origin.line, 0, Some(origin.source), None, false);
    }
    self.next_line += 1;
  }

  pub fn finish(self) -> SourceMap {
    self.builder.into_sourcemap()
  }
}

impl std::fmt::Debug for BundleMap {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BundleMap").field("lines", &self.next_line).finish_non_exhaustive()
  }
}

/// Version 3 JSON for `map`.
pub fn to_json(map: &SourceMap) -> Result<Vec<u8>, sourcemap::Error> {
  let mut out = Vec::new();
  map.to_writer(&mut out)?;
  Ok(out)
}

/// `//# sourceMappingURL=` comment embedding `map` as a data URL.
pub fn inline_comment(map: &SourceMap) -> Result<String, sourcemap::Error> {
  let encoded = STANDARD.encode(to_json(map)?);
  Ok(format!(
    "//# sourceMappingURL=data:application/json;charset=utf-8;base64,{encoded}\n"
  ))
}

/// Comment referencing a map written next to the artifact.
pub fn url_comment(map_file_name: &str) -> String {
  format!("//# sourceMappingURL={map_file_name}\n")
}
