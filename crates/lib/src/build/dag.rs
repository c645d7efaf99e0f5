//! Build DAG for parallel module transforms.
//!
//! Built from the topological order of one build, this DAG groups modules
//! into waves: every module in a wave has all of its dependencies in earlier
//! waves, so modules within a wave can transform concurrently.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::{ModuleGraph, ModuleId};

pub struct BuildDag {
  /// Edges run from dependency to dependent.
  graph: DiGraph<ModuleId, ()>,

  /// Map from module to node index.
  nodes: HashMap<ModuleId, NodeIndex>,

  /// Position of each module in the topological order.
  position: HashMap<ModuleId, usize>,
}

impl BuildDag {
  /// Build the DAG for `order`, which must be a topological order produced
  /// by [`ModuleGraph::topological_order`].
  pub fn from_order(order: &[ModuleId], modules: &ModuleGraph) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut position = HashMap::new();

    // First pass: create nodes
    for (i, id) in order.iter().enumerate() {
      let idx = graph.add_node(id.clone());
      nodes.insert(id.clone(), idx);
      position.insert(id.clone(), i);
    }

    // Second pass: edges from dependencies to dependents
    for id in order {
      let dependent_idx = nodes[id];
      let Some(module) = modules.get(id) else {
        continue;
      };
      for dep in module.internal_dependencies() {
        if let Some(&dep_idx) = nodes.get(dep) {
          graph.update_edge(dep_idx, dependent_idx, ());
        }
      }
    }

    Self { graph, nodes, position }
  }

  /// Modules organized into parallel execution waves.
  ///
  /// Within a wave, modules keep their topological order.
  pub fn waves(&self) -> Vec<Vec<ModuleId>> {
    let mut level: HashMap<NodeIndex, usize> = HashMap::new();

    // Process nodes in topological order: a node's level is one past the
    // deepest of its dependencies.
    let mut ordered: Vec<NodeIndex> = self.graph.node_indices().collect();
    ordered.sort_by_key(|idx| self.position[&self.graph[*idx]]);

    for idx in &ordered {
      let node_level = self
        .graph
        .neighbors_directed(*idx, Direction::Incoming)
        .filter_map(|dep| level.get(&dep))
        .map(|l| l + 1)
        .max()
        .unwrap_or(0);
      level.insert(*idx, node_level);
    }

    // Group modules by level
    let max_level = level.values().copied().max().map_or(0, |l| l + 1);
    let mut waves: Vec<Vec<ModuleId>> = vec![Vec::new(); max_level];
    for idx in ordered {
      waves[level[&idx]].push(self.graph[idx].clone());
    }

    waves
  }

  /// Direct dependencies of a module within this build.
  pub fn dependencies(&self, id: &ModuleId) -> Vec<ModuleId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };

    let mut deps: Vec<ModuleId> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep_idx| self.graph[dep_idx].clone())
      .collect();
    deps.sort_by_key(|d| self.position[d]);
    deps
  }

  pub fn module_count(&self) -> usize {
    self.nodes.len()
  }
}
