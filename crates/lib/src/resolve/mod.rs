//! Module resolution and graph loading.
//!
//! The orchestrator does not implement a resolution algorithm of its own. It
//! talks to two collaborators:
//!
//! - a [`SourceLoader`] that reads a module's raw bytes
//! - a [`Resolver`] that turns an import specifier, seen from a referring
//!   module, into a module identity or marks it external
//!
//! [`GraphLoader`] drives both to populate a [`ModuleGraph`](crate::graph::ModuleGraph),
//! calling the resolver once per discovered edge. The filesystem
//! implementations in [`fs`] cover relative imports with extension probing.

pub mod fs;
mod loader;
mod scan;

use std::path::Path;

use thiserror::Error;

use crate::graph::ModuleId;

pub use fs::{FsResolver, FsSource};
pub use loader::{GraphLoader, LoadReport};
pub use scan::scan_imports;

/// What an import specifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Module(ModuleId),
  External,
}

/// An import that could not be mapped to a module.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
  #[error("{referrer}: cannot resolve '{specifier}'")]
  NotFound { specifier: String, referrer: ModuleId },

  #[error("{referrer}: bare import '{specifier}' is not listed in externals")]
  Bare { specifier: String, referrer: ModuleId },

  #[error("{referrer}: '{specifier}' resolved to {module} which could not be read: {message}")]
  Unreadable {
    specifier: String,
    referrer: ModuleId,
    module: ModuleId,
    message: String,
  },
}

/// Failure to load the entry of a graph.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read {module}: {source}")]
  Read {
    module: ModuleId,
    #[source]
    source: std::io::Error,
  },
}

/// Maps import specifiers to module identities.
pub trait Resolver: Send + Sync {
  /// Identity of the build entry.
  fn resolve_entry(&self, path: &Path) -> ModuleId {
    ModuleId::from_path(path)
  }

  fn resolve(&self, specifier: &str, referrer: &ModuleId) -> Result<Resolution, ResolveError>;
}

/// Reads module content.
pub trait SourceLoader: Send + Sync {
  fn read(&self, id: &ModuleId) -> std::io::Result<Vec<u8>>;
}

/// Whether `specifier` names one of `externals` or a subpath of one.
pub fn is_external_specifier(externals: &[String], specifier: &str) -> bool {
  externals.iter().any(|ext| {
    specifier == ext
      || specifier
        .strip_prefix(ext.as_str())
        .is_some_and(|rest| rest.starts_with('/'))
  })
}
