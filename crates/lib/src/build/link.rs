//! Linking transformed modules into one artifact.

use std::collections::BTreeSet;

use crate::config::BuildConfig;
use crate::graph::{ModuleGraph, ModuleId};

use sourcemap::SourceMap;

use super::source_map::{BundleMap, LineOrigin};

/// Linked artifact text, before any source map reference is appended.
#[derive(Debug, Clone)]
pub struct Linked {
  pub code: String,
  pub map: Option<SourceMap>,
}

/// Concatenate the cached output of every module in `order`.
///
/// Every module must carry valid cached output; modules without one are
/// left out. Each module is preceded by a `// <id>` banner. With a
/// `bundle_name` the whole bundle is wrapped in an IIFE whose parameters are
/// the configured globals of the externals the bundle imports.
pub fn link(order: &[ModuleId], graph: &ModuleGraph, config: &BuildConfig, with_map: bool) -> Linked {
  let file = config
    .output
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let mut out = String::new();
  let mut map = with_map.then(|| BundleMap::new(&file));

  let params = iife_params(order, graph, config);
  if let Some(name) = &config.bundle_name {
    out.push_str(&format!("var {name} = (function ({params}) {{\n"));
    push_unmapped(&mut map, 1);
  }

  for id in order {
    let Some(module) = graph.get(id) else {
      continue;
    };
    let Some(output) = module.valid_output() else {
      continue;
    };

    out.push_str("// ");
    out.push_str(id.as_str());
    out.push('\n');
    push_unmapped(&mut map, 1);

    let source = map
      .as_mut()
      .map(|m| m.add_source(id.as_str(), &String::from_utf8_lossy(&module.content)));

    for (j, line) in output.code.lines().enumerate() {
      out.push_str(line);
      out.push('\n');
      if let Some(m) = map.as_mut() {
        let origin = source
          .zip(output.mappings.resolve(j as u32))
          .map(|(source, line)| LineOrigin { source, line });
        m.push_line(origin);
      }
    }
  }

  if config.bundle_name.is_some() {
    out.push_str(&format!("}})({params});\n"));
    push_unmapped(&mut map, 1);
  }

  Linked {
    code: out,
    map: map.map(BundleMap::finish),
  }
}

fn push_unmapped(map: &mut Option<BundleMap>, count: usize) {
  if let Some(m) = map.as_mut() {
    for _ in 0..count {
      m.push_line(None);
    }
  }
}

/// Comma-separated globals for the externals imported by `order`.
fn iife_params(order: &[ModuleId], graph: &ModuleGraph, config: &BuildConfig) -> String {
  let imported: BTreeSet<&str> = order
    .iter()
    .filter_map(|id| graph.get(id))
    .flat_map(|m| m.external_dependencies())
    .collect();

  let globals: BTreeSet<&str> = config
    .globals
    .iter()
    .filter(|(external, _)| imported.contains(external.as_str()))
    .map(|(_, global)| global.as_str())
    .collect();

  globals.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::graph::{CachedOutput, Dependency};
  use crate::pipeline::{LineMapping, MappingChain};

  fn add(graph: &mut ModuleGraph, name: &str, source: &str, output: &str, deps: Vec<Dependency>) {
    let id = ModuleId::from(name);
    graph.upsert(id.clone(), source.as_bytes().to_vec(), deps);
    let fingerprint = graph.get(&id).unwrap().fingerprint.clone();
    graph.set_output(
      &id,
      Arc::new(CachedOutput {
        fingerprint,
        code: output.to_string(),
        mappings: MappingChain::default(),
      }),
    );
  }

  fn mappings_json(linked: &Linked) -> serde_json::Value {
    let bytes = crate::build::source_map::to_json(linked.map.as_ref().unwrap()).unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn order(names: &[&str]) -> Vec<ModuleId> {
    names.iter().map(|n| ModuleId::from(*n)).collect()
  }

  #[test]
  fn concatenates_in_order_with_banners() {
    let mut graph = ModuleGraph::new();
    add(&mut graph, "b.js", "b", "let b;\n", vec![]);
    add(&mut graph, "a.js", "a", "let a;", vec![Dependency::Internal("b.js".into())]);

    let linked = link(&order(&["b.js", "a.js"]), &graph, &BuildConfig::default(), false);
    assert_eq!(linked.code, "// b.js\nlet b;\n// a.js\nlet a;\n");
    assert!(linked.map.is_none());
  }

  #[test]
  fn iife_takes_globals_of_imported_externals() {
    let mut graph = ModuleGraph::new();
    add(
      &mut graph,
      "a.js",
      "a",
      "run();\n",
      vec![
        Dependency::External("react".to_string()),
        Dependency::External("jquery".to_string()),
      ],
    );

    let mut config = BuildConfig::default();
    config.bundle_name = Some("app".to_string());
    config.globals.insert("react".to_string(), "React".to_string());
    config.globals.insert("jquery".to_string(), "jQuery".to_string());
    config.globals.insert("lodash".to_string(), "_".to_string());

    let linked = link(&order(&["a.js"]), &graph, &config, false);
    assert_eq!(
      linked.code,
      "var app = (function (React, jQuery) {\n// a.js\nrun();\n})(React, jQuery);\n"
    );
  }

  #[test]
  fn source_map_offsets_banners_and_wrapper() {
    let mut graph = ModuleGraph::new();
    add(&mut graph, "a.js", "x\ny\n", "x\ny\n", vec![]);

    let mut config = BuildConfig::default();
    config.bundle_name = Some("app".to_string());
    let linked = link(&order(&["a.js"]), &graph, &config, true);
    let map = mappings_json(&linked);

    assert_eq!(map["sources"][0], "a.js");
    assert_eq!(map["sourcesContent"][0], "x\ny\n");
    // wrapper, banner, two mapped lines; the closing wrapper line is unmapped
    assert_eq!(map["mappings"], ";;AAAA;AACA");
  }

  #[test]
  fn source_map_follows_mapping_chain() {
    let mut graph = ModuleGraph::new();
    let id = ModuleId::from("a.js");
    graph.upsert(id.clone(), b"// c\nx\n\ny\n".to_vec(), vec![]);
    let fingerprint = graph.get(&id).unwrap().fingerprint.clone();
    let mut mappings = MappingChain::default();
    mappings.push("minify", LineMapping::new(vec![1, 3]));
    graph.set_output(
      &id,
      Arc::new(CachedOutput {
        fingerprint,
        code: "x\ny\n".to_string(),
        mappings,
      }),
    );

    let linked = link(&order(&["a.js"]), &graph, &BuildConfig::default(), true);
    assert_eq!(mappings_json(&linked)["mappings"], ";AACA;AAEA");
  }
}
