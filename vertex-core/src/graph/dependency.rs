//! Dependency Graph
//!
//! Records which vertex evaluations invoked which other vertices.
//!
//! The graph is kept at two granularities:
//!
//! - **Key level** ([`VertexKey`]): one node per `"Type.method"`. This is the
//!   view used for topological ordering, path enumeration, and export.
//!   Nodes are kept in first-discovery order so that every ordering the
//!   graph produces is deterministic.
//! - **Binding level** ([`BindingId`]): one node per vertex per instance.
//!   Invalidation walks this view, so that fixing a value on one instance
//!   never disturbs the memoized values of an unrelated instance.
//!
//! Edges are stored in both directions. "Dependencies" of a node are the
//! vertices it invoked; "dependents" are the vertices that invoked it.
//! Exports and paths follow the data-flow direction, dependency first.
//!
//! Edges accumulate for the lifetime of the process. The only removal is
//! [`DependencyGraph::forget_object`], which drops the binding-level edges of
//! an instance that no longer exists.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use smallvec::SmallVec;

use super::key::{BindingId, ObjectId, VertexKey};

type BindingList = SmallVec<[BindingId; 4]>;

/// A node in the key-level graph.
#[derive(Debug, Default, Clone)]
pub struct Node {
    /// Keys this node invoked while evaluating.
    dependencies: IndexSet<VertexKey>,

    /// Keys that invoked this node while evaluating.
    dependents: IndexSet<VertexKey>,
}

impl Node {
    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<VertexKey> {
        &self.dependencies
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<VertexKey> {
        &self.dependents
    }
}

/// Generic node/edge view of the key-level graph, for visualization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphExport {
    /// Node names in first-discovery order.
    pub nodes: Vec<String>,

    /// `(dependency, dependent)` pairs.
    pub edges: Vec<(String, String)>,
}

impl GraphExport {
    /// Check whether the export contains the given node.
    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n == name)
    }

    /// Check whether the export contains the edge `from -> to`.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|(a, b)| a == from && b == to)
    }

    /// Serialize the export as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render the export in Graphviz DOT syntax.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph vertices {\n");
        for node in &self.nodes {
            let _ = writeln!(out, "    \"{node}\";");
        }
        for (from, to) in &self.edges {
            let _ = writeln!(out, "    \"{from}\" -> \"{to}\";");
        }
        out.push('}');
        out
    }
}

/// Process-lifetime record of vertex dependencies.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Key-level nodes, in first-discovery order.
    nodes: IndexMap<VertexKey, Node>,

    /// Binding-level edges, callee -> callers.
    dependents: HashMap<BindingId, BindingList>,

    /// Binding-level edges, caller -> callees.
    dependencies: HashMap<BindingId, BindingList>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a node exists for the given key.
    pub fn add_node(&mut self, key: VertexKey) {
        self.nodes.entry(key).or_default();
    }

    /// Record that `caller` invoked `callee` during its evaluation.
    ///
    /// Idempotent. Returns `true` if the binding-level edge was new.
    pub fn record_edge(&mut self, caller: BindingId, callee: BindingId) -> bool {
        // Edges are recorded as the callee is read, before it evaluates.
        // A node is indexed when an edge first names it, callee ahead of
        // caller, so `c -> b -> a` is discovered as b, c, a.
        self.add_node(callee.key());
        self.add_node(caller.key());

        if let Some(node) = self.nodes.get_mut(&caller.key()) {
            node.dependencies.insert(callee.key());
        }
        if let Some(node) = self.nodes.get_mut(&callee.key()) {
            node.dependents.insert(caller.key());
        }

        let callers = self.dependents.entry(callee).or_default();
        if callers.contains(&caller) {
            return false;
        }
        callers.push(caller);
        self.dependencies.entry(caller).or_default().push(callee);
        true
    }

    /// Check whether the binding-level edge `caller -> callee` is known.
    pub fn contains_edge(&self, caller: BindingId, callee: BindingId) -> bool {
        self.dependents
            .get(&callee)
            .is_some_and(|callers| callers.contains(&caller))
    }

    /// Get a key-level node.
    pub fn get_node(&self, key: &VertexKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Check whether `dependent` has been seen invoking `dependency`.
    pub fn has_edge(&self, dependency: VertexKey, dependent: VertexKey) -> bool {
        self.nodes
            .get(&dependent)
            .is_some_and(|node| node.dependencies.contains(&dependency))
    }

    /// Get the total number of key-level nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the total number of key-level edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }

    /// All key-level nodes with dependencies before dependents.
    ///
    /// Unrelated nodes keep their first-discovery order. Nodes that sit on
    /// a key-level cycle (two instances of one type invoking each other)
    /// cannot be ordered and are appended at the end in discovery order.
    pub fn topological_order(&self) -> Vec<VertexKey> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .values()
            .map(|node| node.dependencies.len())
            .collect();

        // Ready set ordered by discovery index.
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut placed = vec![false; self.nodes.len()];
        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm
        while let Some(index) = ready.pop_first() {
            placed[index] = true;
            let Some((key, node)) = self.nodes.get_index(index) else {
                continue;
            };
            result.push(*key);

            for dependent in &node.dependents {
                if let Some(dep_index) = self.nodes.get_index_of(dependent) {
                    let degree = &mut in_degree[dep_index];
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 && !placed[dep_index] {
                        ready.insert(dep_index);
                    }
                }
            }
        }

        if result.len() < self.nodes.len() {
            tracing::debug!(
                unordered = self.nodes.len() - result.len(),
                "key-level cycle, appending remaining nodes in discovery order"
            );
            for (index, key) in self.nodes.keys().enumerate() {
                if !placed[index] {
                    result.push(*key);
                }
            }
        }

        result
    }

    /// Scan the whole key-level graph for a cycle.
    ///
    /// Returns the keys along the first cycle found, with the starting key
    /// repeated at the end. Diagnostic only: evaluation detects cycles on
    /// its own call stack.
    pub fn find_cycle(&self) -> Option<Vec<VertexKey>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            index: usize,
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Option<Vec<VertexKey>> {
            marks[index] = Mark::Active;
            path.push(index);

            let (_, node) = graph.nodes.get_index(index)?;
            for dependency in &node.dependencies {
                let Some(next) = graph.nodes.get_index_of(dependency) else {
                    continue;
                };
                match marks[next] {
                    Mark::Active => {
                        let start = path.iter().position(|&i| i == next)?;
                        let mut cycle: Vec<VertexKey> = path[start..]
                            .iter()
                            .filter_map(|&i| graph.nodes.get_index(i).map(|(k, _)| *k))
                            .collect();
                        cycle.push(*dependency);
                        return Some(cycle);
                    }
                    Mark::New => {
                        if let Some(cycle) = visit(graph, next, marks, path) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            path.pop();
            marks[index] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut path = Vec::new();
        for index in 0..self.nodes.len() {
            if marks[index] == Mark::New {
                if let Some(cycle) = visit(self, index, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Enumerate every simple path from `from` to `to`, following data flow
    /// (dependency to dependent).
    ///
    /// Exponential in pathological graphs. Intended for introspection.
    pub fn paths(&self, from: VertexKey, to: VertexKey) -> Vec<Vec<VertexKey>> {
        let mut found = Vec::new();
        if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return found;
        }

        let mut path = vec![from];
        let mut on_path = HashSet::from([from]);
        self.walk_paths(from, to, &mut path, &mut on_path, &mut found);
        found
    }

    fn walk_paths(
        &self,
        current: VertexKey,
        target: VertexKey,
        path: &mut Vec<VertexKey>,
        on_path: &mut HashSet<VertexKey>,
        found: &mut Vec<Vec<VertexKey>>,
    ) {
        if current == target && path.len() > 1 {
            found.push(path.clone());
            return;
        }
        let Some(node) = self.nodes.get(&current) else {
            return;
        };
        for &next in &node.dependents {
            if next == target || on_path.insert(next) {
                path.push(next);
                self.walk_paths(next, target, path, on_path, found);
                path.pop();
                if next != target {
                    on_path.remove(&next);
                }
            }
        }
    }

    /// Every binding that transitively depends on `binding`, excluding
    /// `binding` itself.
    pub fn dependents_of(&self, binding: BindingId) -> Vec<BindingId> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([binding]);
        let mut queue = VecDeque::from([binding]);

        // BFS along callee -> caller edges
        while let Some(current) = queue.pop_front() {
            if let Some(callers) = self.dependents.get(&current) {
                for &caller in callers {
                    if visited.insert(caller) {
                        result.push(caller);
                        queue.push_back(caller);
                    }
                }
            }
        }

        result
    }

    /// Drop all binding-level edges that touch the given instance.
    ///
    /// Key-level nodes and edges stay: they describe types, not instances.
    pub fn forget_object(&mut self, object: ObjectId) {
        let owned: Vec<BindingId> = self
            .dependents
            .keys()
            .chain(self.dependencies.keys())
            .filter(|b| b.object() == object)
            .copied()
            .collect();

        for binding in owned {
            if let Some(callers) = self.dependents.remove(&binding) {
                for caller in callers {
                    if let Some(list) = self.dependencies.get_mut(&caller) {
                        list.retain(|b| *b != binding);
                    }
                }
            }
            if let Some(callees) = self.dependencies.remove(&binding) {
                for callee in callees {
                    if let Some(list) = self.dependents.get_mut(&callee) {
                        list.retain(|b| *b != binding);
                    }
                }
            }
        }
    }

    /// Produce a generic node/edge representation of the key-level graph.
    pub fn export(&self) -> GraphExport {
        let nodes = self.nodes.keys().map(ToString::to_string).collect();
        let edges = self
            .nodes
            .iter()
            .flat_map(|(key, node)| {
                node.dependencies
                    .iter()
                    .map(move |dependency| (dependency.to_string(), key.to_string()))
            })
            .collect();
        GraphExport { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&'static str]) -> Vec<VertexKey> {
        names.iter().map(|n| VertexKey::new("Chain", n)).collect()
    }

    fn binding(object: ObjectId, method: &'static str) -> BindingId {
        BindingId::new(object, VertexKey::new("Chain", method))
    }

    /// Chain where c invokes b and b invokes a.
    fn chain() -> (DependencyGraph, ObjectId) {
        let mut graph = DependencyGraph::new();
        let obj = ObjectId::new();
        graph.record_edge(binding(obj, "b"), binding(obj, "a"));
        graph.record_edge(binding(obj, "c"), binding(obj, "b"));
        (graph, obj)
    }

    #[test]
    fn record_edge_is_idempotent() {
        let (mut graph, obj) = chain();
        assert!(!graph.record_edge(binding(obj, "b"), binding(obj, "a")));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let (graph, _) = chain();
        assert_eq!(graph.topological_order(), keys(&["a", "b", "c"]));
    }

    #[test]
    fn nodes_are_indexed_as_edges_name_them() {
        let mut graph = DependencyGraph::new();
        let obj = ObjectId::new();
        // Evaluating c reads b, which then reads a.
        graph.record_edge(binding(obj, "c"), binding(obj, "b"));
        graph.record_edge(binding(obj, "b"), binding(obj, "a"));
        assert_eq!(graph.export().nodes, ["Chain.b", "Chain.c", "Chain.a"]);
        assert_eq!(graph.topological_order(), keys(&["a", "b", "c"]));
    }

    #[test]
    fn topological_order_breaks_ties_by_discovery() {
        let mut graph = DependencyGraph::new();
        graph.add_node(VertexKey::new("Chain", "z"));
        graph.add_node(VertexKey::new("Chain", "y"));
        graph.add_node(VertexKey::new("Chain", "x"));
        assert_eq!(graph.topological_order(), keys(&["z", "y", "x"]));
    }

    #[test]
    fn topological_order_survives_key_level_cycles() {
        let mut graph = DependencyGraph::new();
        let first = ObjectId::new();
        let second = ObjectId::new();
        graph.record_edge(binding(first, "next"), binding(second, "next"));
        graph.record_edge(binding(second, "total"), binding(second, "next"));

        let order = graph.topological_order();
        assert_eq!(order.len(), 2);
        assert_eq!(graph.find_cycle(), Some(keys(&["next", "next"])));
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let (graph, _) = chain();
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn paths_follow_data_flow() {
        let (graph, _) = chain();
        let k = keys(&["a", "b", "c"]);
        assert_eq!(graph.paths(k[0], k[2]), vec![k.clone()]);
        assert!(graph.paths(k[2], k[0]).is_empty());
    }

    #[test]
    fn paths_enumerate_diamonds() {
        let mut graph = DependencyGraph::new();
        let obj = ObjectId::new();
        graph.record_edge(binding(obj, "left"), binding(obj, "root"));
        graph.record_edge(binding(obj, "right"), binding(obj, "root"));
        graph.record_edge(binding(obj, "top"), binding(obj, "left"));
        graph.record_edge(binding(obj, "top"), binding(obj, "right"));

        let [root, left, right, top] = [
            VertexKey::new("Chain", "root"),
            VertexKey::new("Chain", "left"),
            VertexKey::new("Chain", "right"),
            VertexKey::new("Chain", "top"),
        ];
        let paths = graph.paths(root, top);
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&vec![root, left, top]));
        assert!(paths.contains(&vec![root, right, top]));
    }

    #[test]
    fn dependents_are_transitive_and_per_instance() {
        let (mut graph, obj) = chain();
        let other = ObjectId::new();
        graph.record_edge(binding(other, "b"), binding(other, "a"));

        let dependents = graph.dependents_of(binding(obj, "a"));
        assert_eq!(dependents, vec![binding(obj, "b"), binding(obj, "c")]);
    }

    #[test]
    fn forget_object_drops_binding_edges() {
        let (mut graph, obj) = chain();
        graph.forget_object(obj);
        assert!(graph.dependents_of(binding(obj, "a")).is_empty());
        // Key-level view is unaffected.
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn export_lists_nodes_and_edges() {
        let (graph, _) = chain();
        let export = graph.export();
        assert!(export.contains_node("Chain.a"));
        assert!(export.has_edge("Chain.a", "Chain.b"));
        assert!(export.has_edge("Chain.b", "Chain.c"));
        assert!(!export.has_edge("Chain.b", "Chain.a"));

        let dot = export.to_dot();
        assert!(dot.contains("\"Chain.a\" -> \"Chain.b\";"));

        let json = export.to_json().unwrap();
        assert!(json.contains("Chain.c"));
    }
}
