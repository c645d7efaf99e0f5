use std::collections::BTreeSet;

use knit_lib::build::{BuildError, BuildRequest, BuildStatus, Coordinator, ModuleStatus};
use knit_lib::config::{BuildConfig, SourceMapMode};
use knit_lib::detect::{ChangeSet, affected};
use knit_lib::graph::ModuleError;
use knit_lib::resolve::ResolveError;
use tracing_test::traced_test;

use super::common::TestProject;

fn react_project() -> TestProject {
  let project = TestProject::new();
  project.write(
    "index.js",
    "import React from 'react';\nimport { greet } from './greet';\nimport './util';\n\ngreet(React);\n",
  );
  project.write("greet.ts", "import { pad } from './util';\nexport const greet = (r) => pad(r);\n");
  project.write("util/index.js", "export const pad = (s) => s;\n");
  project
}

#[tokio::test]
async fn resolves_extensions_and_index_files() {
  let project = react_project();
  let mut config = project.config();
  config.externals = vec!["react".to_string()];
  let mut coordinator = Coordinator::new(config);

  let result = coordinator.build(&coordinator.entry()).await.unwrap();

  assert!(result.is_success(), "{:?}", result.errors());
  let ids: Vec<_> = result.outcomes.iter().map(|o| o.id.clone()).collect();
  assert_eq!(ids, vec![project.id("util/index.js"), project.id("greet.ts"), project.id("index.js")]);

  let artifact = result.artifact.unwrap();
  assert_eq!(artifact.path, project.output());
  assert_eq!(artifact.size, project.bundle().len());
}

#[tokio::test]
async fn iife_bundle_receives_globals() {
  let project = react_project();
  let config = BuildConfig {
    externals: vec!["react".to_string(), "jquery".to_string()],
    bundle_name: Some("app".to_string()),
    globals: [("react", "React"), ("jquery", "jQuery")]
      .into_iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect(),
    ..project.config()
  };
  let mut coordinator = Coordinator::new(config);

  coordinator.build(&coordinator.entry()).await.unwrap();

  let bundle = project.bundle();
  assert!(bundle.starts_with("var app = (function (React) {\n"));
  assert!(bundle.ends_with("})(React);\n"));
}

#[tokio::test]
async fn defines_and_minify_apply_in_order() {
  let project = TestProject::new();
  project.write(
    "index.js",
    "// entry\nif (process.env.NODE_ENV !== \"production\") {\n    debug();\n}\n",
  );
  let config = BuildConfig {
    minify: true,
    defines: [("process.env.NODE_ENV".to_string(), "\"production\"".to_string())]
      .into_iter()
      .collect(),
    ..project.config()
  };
  let mut coordinator = Coordinator::new(config);

  coordinator.build(&coordinator.entry()).await.unwrap();

  let bundle = project.bundle();
  assert!(bundle.contains("if (\"production\" !== \"production\") {\ndebug();\n}\n"));
  assert!(!bundle.contains("// entry"));
}

#[tokio::test]
async fn separate_source_map_points_at_original_lines() {
  let project = TestProject::new();
  project.write("index.js", "// header\n\nrun();\n");
  let config = BuildConfig {
    minify: true,
    source_maps: SourceMapMode::Separate,
    ..project.config()
  };
  let mut coordinator = Coordinator::new(config);

  let result = coordinator.build(&coordinator.entry()).await.unwrap();

  let map_path = result.artifact.unwrap().map_path.unwrap();
  let map: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(map_path).unwrap()).unwrap();
  assert_eq!(map["version"], 3);
  assert_eq!(map["file"], "bundle.js");
  assert_eq!(map["sources"][0], project.id("index.js").as_str());
  assert_eq!(map["sourcesContent"][0], "// header\n\nrun();\n");
  // Banner unmapped; `run();` came from line 2.
  assert_eq!(map["mappings"], ";AAEA");
  assert!(project.bundle().ends_with("//# sourceMappingURL=bundle.js.map\n"));
}

#[tokio::test]
async fn inline_source_map_is_appended() {
  let project = TestProject::new();
  project.write("index.js", "run();\n");
  let config = BuildConfig {
    source_maps: SourceMapMode::Inline,
    ..project.config()
  };
  let mut coordinator = Coordinator::new(config);

  let result = coordinator.build(&coordinator.entry()).await.unwrap();

  assert!(result.artifact.unwrap().map_path.is_none());
  assert!(
    project
      .bundle()
      .contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,")
  );
}

#[tokio::test]
async fn incremental_rebuild_after_edit() {
  let project = TestProject::new();
  project.write("index.js", "import './a';\nmain();\n");
  project.write("a.js", "import './b';\na();\n");
  let b = project.write("b.js", "b();\n");
  project.write("other.js", "unrelated();\n");
  let mut coordinator = Coordinator::new(project.config());
  let entry = coordinator.entry();
  coordinator.build(&entry).await.unwrap();

  std::fs::write(&b, "b2();\n").unwrap();
  let changes = ChangeSet::from_paths([b]);
  let report = coordinator.refresh(&changes);
  assert_eq!(report.changed, BTreeSet::from([project.id("b.js")]));

  let force = affected(&changes, coordinator.graph());
  assert_eq!(
    force,
    BTreeSet::from([project.id("b.js"), project.id("a.js"), project.id("index.js")])
  );

  let result = coordinator
    .rebuild(BuildRequest::new(entry).force(force))
    .await
    .unwrap();
  assert_eq!(result.transformed(), 3);
  assert!(project.bundle().contains("b2();"));
}

#[tokio::test]
async fn deleted_file_fails_build_and_keeps_artifact() {
  let project = TestProject::new();
  project.write("index.js", "import './a';\n");
  let a = project.write("a.js", "a();\n");
  let mut coordinator = Coordinator::new(project.config());
  let entry = coordinator.entry();
  coordinator.build(&entry).await.unwrap();
  let before = project.bundle();

  let a_id = project.id("a.js");
  std::fs::remove_file(&a).unwrap();
  let report = coordinator.refresh(&ChangeSet::from_paths([a]));
  assert_eq!(report.removed, vec![a_id.clone()]);

  let result = coordinator.build(&entry).await.unwrap();
  assert_eq!(result.status, BuildStatus::Failed);
  assert!(matches!(
    result.outcome(&project.id("index.js")),
    Some(ModuleStatus::Failed(ModuleError::MissingDependency { dependency, .. })) if *dependency == a_id
  ));
  assert_eq!(project.bundle(), before);
}

#[tokio::test]
#[traced_test]
async fn bare_import_without_external_fails() {
  let project = TestProject::new();
  project.write("index.js", "import _ from 'lodash';\n");
  let mut coordinator = Coordinator::new(project.config());

  let result = coordinator.build(&coordinator.entry()).await.unwrap();

  assert_eq!(result.status, BuildStatus::Failed);
  assert!(matches!(
    result.errors().as_slice(),
    [ModuleError::Resolve(ResolveError::Bare { specifier, .. })] if specifier == "lodash"
  ));
  assert!(!project.output().exists());
  assert!(logs_contain("unresolved import"));
  assert!(logs_contain("module failed"));
}

#[tokio::test]
async fn cycle_aborts_build() {
  let project = TestProject::new();
  project.write("index.js", "import './a';\n");
  project.write("a.js", "import './b';\n");
  project.write("b.js", "import './a';\n");
  let mut coordinator = Coordinator::new(project.config());

  let err = coordinator.build(&coordinator.entry()).await.unwrap_err();

  let BuildError::Cycle(cycle) = err else {
    panic!("expected cycle, got {err}");
  };
  assert_eq!(cycle.members.len(), 2);
  assert!(!project.output().exists());
}

#[tokio::test]
async fn missing_entry_is_a_load_error() {
  let project = TestProject::new();
  let mut coordinator = Coordinator::new(project.config());

  let err = coordinator.build(&coordinator.entry()).await.unwrap_err();

  assert!(matches!(err, BuildError::Load(_)));
}
