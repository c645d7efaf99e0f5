//! Shared helpers for knit-lib integration tests.

use std::path::{Path, PathBuf};

use knit_lib::config::BuildConfig;
use knit_lib::graph::ModuleId;
use tempfile::TempDir;

/// Isolated project directory.
///
/// Sources live under `src/`, the artifact goes to `dist/bundle.js`.
pub struct TestProject {
  pub temp: TempDir,
}

impl TestProject {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    Self { temp }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn src(&self, name: &str) -> PathBuf {
    self.root().join("src").join(name)
  }

  /// Write a source file under `src/`, creating directories as needed.
  pub fn write(&self, name: &str, content: &str) -> PathBuf {
    let path = self.src(name);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn id(&self, name: &str) -> ModuleId {
    ModuleId::from_path(&self.src(name))
  }

  pub fn output(&self) -> PathBuf {
    self.root().join("dist").join("bundle.js")
  }

  pub fn bundle(&self) -> String {
    std::fs::read_to_string(self.output()).unwrap_or_else(|e| panic!("failed to read bundle: {e}"))
  }

  /// Config with `src/index.js` as entry and minification off.
  pub fn config(&self) -> BuildConfig {
    BuildConfig {
      entry: self.src("index.js"),
      output: self.output(),
      minify: false,
      ..BuildConfig::default()
    }
  }
}
