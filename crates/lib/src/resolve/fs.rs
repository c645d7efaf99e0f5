//! Filesystem collaborators.

use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::graph::ModuleId;

use super::{Resolution, ResolveError, Resolver, SourceLoader, is_external_specifier};

/// Reads modules straight from disk; identities are paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl SourceLoader for FsSource {
  fn read(&self, id: &ModuleId) -> std::io::Result<Vec<u8>> {
    std::fs::read(id.as_str())
  }
}

/// Relative-path resolver.
///
/// Relative and absolute specifiers are resolved against the referrer's
/// directory, trying the path as written, then each configured extension,
/// then `index` files inside a directory. Bare specifiers must be listed as
/// externals.
#[derive(Debug, Clone)]
pub struct FsResolver {
  extensions: Vec<String>,
  externals: Vec<String>,
}

impl FsResolver {
  pub fn new(extensions: Vec<String>, externals: Vec<String>) -> Self {
    Self { extensions, externals }
  }

  pub fn from_config(config: &BuildConfig) -> Self {
    Self::new(config.extensions.clone(), config.externals.clone())
  }

  fn probe(&self, candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
      return Some(candidate.to_path_buf());
    }

    let with_ext = self.extensions.iter().map(|ext| {
      let mut name = candidate.as_os_str().to_os_string();
      name.push(ext);
      PathBuf::from(name)
    });
    let index = self.extensions.iter().map(|ext| candidate.join(format!("index{ext}")));

    with_ext.chain(index).find(|p| p.is_file())
  }
}

fn is_path_specifier(specifier: &str) -> bool {
  matches!(specifier, "." | "..")
    || specifier.starts_with("./")
    || specifier.starts_with("../")
    || Path::new(specifier).is_absolute()
}

impl Resolver for FsResolver {
  fn resolve(&self, specifier: &str, referrer: &ModuleId) -> Result<Resolution, ResolveError> {
    if !is_path_specifier(specifier) {
      if is_external_specifier(&self.externals, specifier) {
        return Ok(Resolution::External);
      }
      return Err(ResolveError::Bare {
        specifier: specifier.to_string(),
        referrer: referrer.clone(),
      });
    }

    let base = Path::new(referrer.as_str()).parent().unwrap_or_else(|| Path::new("."));
    let candidate = base.join(specifier);

    self
      .probe(&candidate)
      .map(|found| Resolution::Module(ModuleId::from_path(&found)))
      .ok_or_else(|| ResolveError::NotFound {
        specifier: specifier.to_string(),
        referrer: referrer.clone(),
      })
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;

  fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src/components")).unwrap();
    fs::write(temp.path().join("src/main.ts"), "").unwrap();
    fs::write(temp.path().join("src/util.ts"), "").unwrap();
    fs::write(temp.path().join("src/data.json"), "").unwrap();
    fs::write(temp.path().join("src/components/index.tsx"), "").unwrap();
    temp
  }

  fn resolver() -> FsResolver {
    FsResolver::new(vec![".ts".to_string(), ".tsx".to_string()], vec!["react".to_string()])
  }

  fn main_id(temp: &TempDir) -> ModuleId {
    ModuleId::from_path(&temp.path().join("src/main.ts"))
  }

  #[test]
  fn resolves_with_extension_probing() {
    let temp = project();
    let res = resolver().resolve("./util", &main_id(&temp)).unwrap();
    assert_eq!(res, Resolution::Module(ModuleId::from_path(&temp.path().join("src/util.ts"))));
  }

  #[test]
  fn resolves_exact_file() {
    let temp = project();
    let res = resolver().resolve("./data.json", &main_id(&temp)).unwrap();
    assert_eq!(res, Resolution::Module(ModuleId::from_path(&temp.path().join("src/data.json"))));
  }

  #[test]
  fn resolves_directory_index() {
    let temp = project();
    let res = resolver().resolve("./components", &main_id(&temp)).unwrap();
    assert_eq!(
      res,
      Resolution::Module(ModuleId::from_path(&temp.path().join("src/components/index.tsx")))
    );
  }

  #[test]
  fn parent_relative_paths_are_canonical() {
    let temp = project();
    let referrer = ModuleId::from_path(&temp.path().join("src/components/index.tsx"));
    let res = resolver().resolve("../util", &referrer).unwrap();
    assert_eq!(res, Resolution::Module(ModuleId::from_path(&temp.path().join("src/util.ts"))));
  }

  #[test]
  fn externals_and_bare_specifiers() {
    let temp = project();
    let id = main_id(&temp);
    assert_eq!(resolver().resolve("react", &id).unwrap(), Resolution::External);
    assert!(matches!(resolver().resolve("lodash", &id), Err(ResolveError::Bare { .. })));
  }

  #[test]
  fn missing_relative_import() {
    let temp = project();
    let err = resolver().resolve("./missing", &main_id(&temp)).unwrap_err();
    assert!(err.to_string().contains("cannot resolve './missing'"));
  }

  #[test]
  fn fs_source_reads_by_identity() {
    let temp = project();
    fs::write(temp.path().join("src/util.ts"), "export {}").unwrap();
    let id = ModuleId::from_path(&temp.path().join("src/util.ts"));
    assert_eq!(FsSource.read(&id).unwrap(), b"export {}");
  }
}
