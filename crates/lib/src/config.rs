//! Build configuration.
//!
//! A [`BuildConfig`] is passed to the coordinator at construction and decides
//! whether to minify, how source maps are emitted, and whether to keep
//! watching. Nothing is read from environment variables.
//!
//! Configuration is read from a TOML file (`knit.toml` by convention):
//!
//! ```toml
//! entry = "src/client.tsx"
//! output = "dist/client.js"
//! minify = true
//! source_maps = "separate"
//! bundle_name = "app"
//! externals = ["react", "react-dom"]
//!
//! [globals]
//! react = "React"
//! react-dom = "ReactDOM"
//!
//! [defines]
//! "process.env.NODE_ENV" = '"production"'
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{CONFIG_FILENAME, DEFAULT_DEBOUNCE_MS, DEFAULT_EXTENSIONS};

/// How source-mapping metadata is emitted next to the artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
  /// Appended to the artifact as a base64 data URL.
  Inline,
  /// Written to `<output>.map` and referenced from the artifact.
  Separate,
  #[default]
  None,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid config: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
  /// Entry module path.
  pub entry: PathBuf,

  /// Artifact path.
  pub output: PathBuf,

  pub minify: bool,

  pub source_maps: SourceMapMode,

  /// Keep running and rebuild on change.
  pub watch: bool,

  /// Maximum number of modules transformed concurrently.
  pub parallelism: usize,

  /// When set, the artifact is wrapped in an IIFE assigned to this name.
  pub bundle_name: Option<String>,

  /// Bare specifiers left to the runtime.
  pub externals: Vec<String>,

  /// Global variable for each external, passed into the IIFE wrapper.
  pub globals: BTreeMap<String, String>,

  /// Compile-time substitutions.
  pub defines: BTreeMap<String, String>,

  /// Extensions tried for extensionless relative imports.
  pub extensions: Vec<String>,

  pub debounce_ms: u64,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      entry: PathBuf::from("src/index.js"),
      output: PathBuf::from("dist/bundle.js"),
      minify: true,
      source_maps: SourceMapMode::default(),
      watch: false,
      parallelism: num_cpus(),
      bundle_name: None,
      externals: Vec::new(),
      globals: BTreeMap::new(),
      defines: BTreeMap::new(),
      extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
      debounce_ms: DEFAULT_DEBOUNCE_MS,
    }
  }
}

impl BuildConfig {
  /// Load a config file.
  ///
  /// Relative `entry` and `output` paths are resolved against the directory
  /// containing the file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Self::from_toml(&content, base).map_err(|e| match e {
      ConfigError::Parse { source, .. } => ConfigError::Parse {
        path: path.display().to_string(),
        source,
      },
      other => other,
    })
  }

  /// Load `knit.toml` from `dir`.
  pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
    Self::load(&dir.join(CONFIG_FILENAME))
  }

  /// Parse config text, resolving relative paths against `base`.
  pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
    let mut config: BuildConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: "<inline>".to_string(),
      source,
    })?;
    config.entry = absolutize(base, &config.entry);
    config.output = absolutize(base, &config.output);
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.parallelism == 0 {
      return Err(ConfigError::Invalid("parallelism must be at least 1".to_string()));
    }
    if self.output.as_os_str().is_empty() || self.output.file_name().is_none() {
      return Err(ConfigError::Invalid("output must name a file".to_string()));
    }
    if let Some(name) = &self.bundle_name
      && !is_identifier(name)
    {
      return Err(ConfigError::Invalid(format!("bundle_name is not a valid identifier: {name}")));
    }
    for (external, global) in &self.globals {
      if !is_identifier(global) {
        return Err(ConfigError::Invalid(format!(
          "global for {external} is not a valid identifier: {global}"
        )));
      }
    }
    Ok(())
  }

  /// Path of the separate source map for this artifact.
  pub fn source_map_path(&self) -> PathBuf {
    let mut name = self.output.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(crate::consts::SOURCE_MAP_EXTENSION);
    self.output.with_file_name(name)
  }

  pub fn is_external(&self, specifier: &str) -> bool {
    crate::resolve::is_external_specifier(&self.externals, specifier)
  }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

pub(crate) fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
    _ => return false,
  }
  chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
