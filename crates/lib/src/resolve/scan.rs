//! Import specifier discovery.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"(?m)^\s*(?:import|export)\s+(?:type\s+)?(?:[\w$*{}\s,]+?\s+from\s+)?["']([^"'\n]+)["']|\bimport\s*\(\s*["']([^"'\n]+)["']\s*\)|\brequire\s*\(\s*["']([^"'\n]+)["']\s*\)"#,
  )
  .expect("import pattern is valid")
});

/// Import specifiers in `code`, in order of first appearance.
///
/// Recognizes static `import`/`export ... from`, side-effect imports,
/// dynamic `import("...")` and `require("...")` with literal specifiers.
/// This is a lexical scan: imports inside comments or strings are reported
/// too.
pub fn scan_imports(code: &str) -> Vec<String> {
  let mut seen = HashSet::new();
  IMPORT_RE
    .captures_iter(code)
    .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
    .map(|m| m.as_str().to_string())
    .filter(|spec| seen.insert(spec.clone()))
    .collect()
}
