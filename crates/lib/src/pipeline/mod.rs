//! Transform pipeline.
//!
//! A pipeline is an ordered list of stages applied to one module's content.
//! Each stage receives the previous stage's output and returns new content
//! plus a [`LineMapping`] back to its input; the mappings are collected into a
//! [`MappingChain`] so the final output can be traced to original lines.
//!
//! Stages must be deterministic: identical input and configuration must give
//! byte-identical output, or fingerprint-based caching becomes unsound.
//!
//! # Failure
//!
//! The first failing stage aborts the module's transform with a
//! [`StageError`]; later stages do not run. Other modules are unaffected.

mod mapping;
pub mod stages;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::config::BuildConfig;
use crate::graph::ModuleId;

pub use mapping::{LineMapping, MappingChain, StageMapping, line_count};
pub use stages::{FnStage, MinifyStage, ReplaceStage};

/// Input handed to a stage.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
  pub module: &'a ModuleId,
  pub code: &'a str,
}

/// Output of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
  pub code: String,
  pub mapping: LineMapping,
}

impl StageOutput {
  /// Output whose lines correspond one-to-one with the input lines.
  pub fn identity(code: String) -> Self {
    let mapping = LineMapping::identity_for(&code);
    Self { code, mapping }
  }
}

/// Failure reported by a stage implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StageFailure {
  pub message: String,
}

impl StageFailure {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// A stage failed while transforming a module.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{module}: stage {stage_index} ({stage}) failed: {cause}")]
pub struct StageError {
  pub module: ModuleId,
  pub stage_index: usize,
  pub stage: String,
  #[source]
  pub cause: StageFailure,
}

/// One pluggable transform.
pub trait Stage: Send + Sync {
  /// Name used in mapping records and error messages.
  fn name(&self) -> &str;

  fn apply(&self, input: StageInput<'_>) -> Result<StageOutput, StageFailure>;
}

/// Result of running the whole pipeline over one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
  pub code: String,
  pub mappings: MappingChain,
}

#[derive(Clone, Default)]
pub struct Pipeline {
  stages: Vec<Arc<dyn Stage>>,
}

impl fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.stages.iter().map(|s| s.name())).finish()
  }
}

impl Pipeline {
  pub fn new() -> Self {
    Self::default()
  }

  /// The stages implied by a build configuration.
  ///
  /// Defines are substituted first so the minifier sees final code.
  pub fn from_config(config: &BuildConfig) -> Self {
    let mut pipeline = Self::new();
    if !config.defines.is_empty() {
      pipeline = pipeline.with_stage(ReplaceStage::new(config.defines.clone()));
    }
    if config.minify {
      pipeline = pipeline.with_stage(MinifyStage);
    }
    pipeline
  }

  /// Append a stage.
  pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
    self.stages.push(Arc::new(stage));
    self
  }

  pub fn len(&self) -> usize {
    self.stages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }

  pub fn stage_names(&self) -> Vec<&str> {
    self.stages.iter().map(|s| s.name()).collect()
  }

  /// Run every stage in order over `code`.
  pub fn run(&self, module: &ModuleId, code: &str) -> Result<Transformed, StageError> {
    let mut current = code.to_string();
    let mut mappings = MappingChain::default();

    for (stage_index, stage) in self.stages.iter().enumerate() {
      trace!(module = %module, stage = stage.name(), stage_index, "applying stage");
      let output = stage
        .apply(StageInput { module, code: &current })
        .map_err(|cause| StageError {
          module: module.clone(),
          stage_index,
          stage: stage.name().to_string(),
          cause,
        })?;
      mappings.push(stage.name(), output.mapping);
      current = output.code;
    }

    Ok(Transformed {
      code: current,
      mappings,
    })
  }
}
