//! Watch event types.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;

use crate::build::{BuildResult, BuildStatus};

/// One raw change notification from a [`ChangeSource`](super::ChangeSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
  pub path: PathBuf,
  pub at: SystemTime,
}

impl FileChange {
  pub fn now(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      at: SystemTime::now(),
    }
  }
}

/// Progress reported by the watch loop, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
  Started {
    entry: String,
    output: String,
  },
  /// A debounced batch of changed modules.
  Changed {
    modules: Vec<String>,
  },
  BuildStarted {
    generation: u64,
    forced: usize,
  },
  BuildFinished {
    generation: u64,
    status: BuildStatus,
    transformed: usize,
    cached: usize,
    errors: Vec<String>,
    artifact: Option<String>,
    duration_ms: u64,
  },
  BuildCancelled {
    generation: u64,
  },
  Error {
    message: String,
  },
  Stopped,
}

impl WatchEvent {
  pub fn finished(generation: u64, result: &BuildResult) -> Self {
    WatchEvent::BuildFinished {
      generation,
      status: result.status,
      transformed: result.transformed(),
      cached: result.cached(),
      errors: result.errors().iter().map(|e| e.to_string()).collect(),
      artifact: result.artifact.as_ref().map(|a| a.path.display().to_string()),
      duration_ms: result.duration.as_millis() as u64,
    }
  }

  /// Serialize as a single NDJSON line (without the newline).
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| r#"{"event":"error"}"#.to_string())
  }
}
