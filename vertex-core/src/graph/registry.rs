//! Graph Registry
//!
//! [`Graph`] is the process-wide coordinator shared by every thread. It owns
//! the state that belongs to bindings rather than to threads:
//!
//! - the [`DependencyGraph`],
//! - fixed values,
//! - binding versions,
//! - timing samples and the debug/performance switches.
//!
//! # Invalidation
//!
//! Every binding has a version, starting at zero. Memoized values are
//! stamped with the version that was current when their evaluation started.
//! Changing a fixed value bumps the version of the binding and of every
//! transitive dependent in one sweep, so every thread's memoized copies of
//! those bindings go stale at once and are recomputed on their next read.
//!
//! # Thread Safety
//!
//! Fixed values and versions live in sharded maps, so the read path never
//! takes a global lock. Writers (`fix`, `unfix`) serialize on a single
//! mutex, which keeps the store and its invalidation sweep atomic with
//! respect to other writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::dependency::{DependencyGraph, GraphExport};
use super::key::{BindingId, ObjectId, VertexKey};
use crate::config::GraphConfig;
use crate::timing::{TimerGuard, Timings};
use crate::vertex::StoredValue;

/// Receives debug lines.
pub type DebugSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Process-wide registry of vertex bindings and their dependencies.
pub struct Graph {
    dependencies: RwLock<DependencyGraph>,
    fixed: DashMap<BindingId, StoredValue>,
    versions: DashMap<BindingId, u64>,
    writer: Mutex<()>,
    debug_mode: AtomicBool,
    sink: RwLock<Option<DebugSink>>,
    timings: Timings,
}

static GRAPH: OnceLock<Graph> = OnceLock::new();

impl Graph {
    fn new() -> Self {
        Self {
            dependencies: RwLock::new(DependencyGraph::new()),
            fixed: DashMap::new(),
            versions: DashMap::new(),
            writer: Mutex::new(()),
            debug_mode: AtomicBool::new(false),
            sink: RwLock::new(None),
            timings: Timings::new(),
        }
    }

    /// The process-wide graph.
    pub fn global() -> &'static Graph {
        GRAPH.get_or_init(Graph::new)
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Apply a configuration.
    pub fn configure(&self, config: &GraphConfig) {
        self.set_debug_mode(config.debug_mode);
        self.set_gather_performance(config.gather_performance);
    }

    /// The switches currently in effect.
    pub fn config(&self) -> GraphConfig {
        GraphConfig {
            debug_mode: self.is_debug_mode(),
            gather_performance: self.is_gathering_performance(),
        }
    }

    /// Check whether debug tracing is on for every thread.
    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    /// Turn debug tracing on or off for every thread.
    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug_mode.store(enabled, Ordering::Relaxed);
    }

    /// Route debug lines to `sink`, or back to standard output with `None`.
    pub fn set_debug_sink(&self, sink: Option<DebugSink>) {
        *self.sink.write() = sink;
    }

    /// Emit one debug line.
    pub fn emit_debug(&self, line: &str) {
        tracing::debug!(target: "vertex_core::debug", "{line}");
        let sink = self.sink.read().clone();
        match sink {
            Some(sink) => sink(line),
            None => println!("{line}"),
        }
    }

    // ------------------------------------------------------------------
    // Performance
    // ------------------------------------------------------------------

    /// Check whether evaluation timings are being gathered.
    pub fn is_gathering_performance(&self) -> bool {
        self.timings.is_enabled()
    }

    /// Turn timing collection on or off.
    pub fn set_gather_performance(&self, enabled: bool) {
        self.timings.set_enabled(enabled);
    }

    /// Time a span attributed to `binding`.
    ///
    /// No-op unless gathering is enabled.
    pub fn time_it(&self, binding: BindingId) -> TimerGuard<'_> {
        self.timings.start(binding)
    }

    /// Copy of all recorded timings.
    pub fn timings(&self) -> HashMap<BindingId, Vec<Duration>> {
        self.timings.snapshot()
    }

    /// Timings recorded for one binding.
    pub fn samples(&self, binding: &BindingId) -> Vec<Duration> {
        self.timings.samples(binding)
    }

    /// Drop all recorded timings.
    pub fn reset_timings(&self) {
        self.timings.reset();
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    /// Record that `caller` invoked `callee`.
    pub fn record_edge(&self, caller: BindingId, callee: BindingId) {
        // Re-confirmation is the common case; avoid the write lock for it.
        if self.dependencies.read().contains_edge(caller, callee) {
            return;
        }
        if self.dependencies.write().record_edge(caller, callee) {
            tracing::trace!(%caller, %callee, "recorded dependency");
        }
    }

    /// Make sure a key-level node exists for a vertex that was evaluated.
    pub fn note_evaluated(&self, key: VertexKey) {
        if self.dependencies.read().get_node(&key).is_none() {
            self.dependencies.write().add_node(key);
        }
    }

    /// Read access to the dependency graph.
    pub fn dependencies(&self) -> RwLockReadGuard<'_, DependencyGraph> {
        self.dependencies.read()
    }

    /// Every binding that transitively depends on `binding`.
    pub fn dependents_of(&self, binding: BindingId) -> Vec<BindingId> {
        self.dependencies.read().dependents_of(binding)
    }

    /// All known vertex keys, dependencies before dependents.
    pub fn topological_order(&self) -> Vec<VertexKey> {
        self.dependencies.read().topological_order()
    }

    /// All simple paths from `from` to `to` in data-flow direction.
    pub fn paths(&self, from: VertexKey, to: VertexKey) -> Vec<Vec<VertexKey>> {
        self.dependencies.read().paths(from, to)
    }

    /// Full-graph cycle scan, for diagnostics.
    pub fn find_cycle(&self) -> Option<Vec<VertexKey>> {
        self.dependencies.read().find_cycle()
    }

    /// Node/edge view of the graph for visualization.
    pub fn export(&self) -> GraphExport {
        self.dependencies.read().export()
    }

    // ------------------------------------------------------------------
    // Fixed values and versions
    // ------------------------------------------------------------------

    /// Current version of a binding.
    pub fn version(&self, binding: &BindingId) -> u64 {
        self.versions.get(binding).map_or(0, |version| *version)
    }

    /// Fixed value of a binding, if any.
    pub fn fixed_value(&self, binding: &BindingId) -> Option<StoredValue> {
        self.fixed.get(binding).map(|entry| Arc::clone(entry.value()))
    }

    /// Check whether a binding has a fixed value.
    pub fn is_fixed(&self, binding: &BindingId) -> bool {
        self.fixed.contains_key(binding)
    }

    /// Fix a binding's value and invalidate everything downstream.
    pub fn fix(&self, binding: BindingId, value: StoredValue) {
        let _writer = self.writer.lock();
        let previous = self.fixed.insert(binding, value);
        self.invalidate_downstream(binding);
        drop(previous);
    }

    /// Remove a binding's fixed value and invalidate everything downstream.
    ///
    /// Returns `true` if a value was fixed.
    pub fn unfix(&self, binding: BindingId) -> bool {
        let _writer = self.writer.lock();
        let previous = self.fixed.remove(&binding);
        self.invalidate_downstream(binding);
        previous.is_some()
    }

    /// Bump the version of `binding` and of every binding that transitively
    /// depends on it.
    ///
    /// Memoized values stamped with an older version are never served
    /// again, on any thread.
    pub fn invalidate_downstream(&self, binding: BindingId) -> usize {
        let dependents = self.dependents_of(binding);
        for id in std::iter::once(&binding).chain(&dependents) {
            *self.versions.entry(*id).or_insert(0) += 1;
        }
        tracing::debug!(%binding, dependents = dependents.len(), "invalidated downstream");
        dependents.len() + 1
    }

    /// Drop all shared state belonging to a dead instance.
    pub fn forget_object(&self, object: ObjectId) {
        let owned = |binding: &BindingId| binding.object() == object;

        let fixed: Vec<BindingId> = self
            .fixed
            .iter()
            .map(|entry| *entry.key())
            .filter(owned)
            .collect();
        // Removed values drop outside the shard locks; they may own objects.
        let removed: Vec<_> = fixed
            .iter()
            .filter_map(|binding| self.fixed.remove(binding))
            .collect();
        drop(removed);

        self.versions.retain(|binding, _| !owned(binding));
        self.timings.forget(owned);
        self.dependencies.write().forget_object(object);
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.dependencies.read().node_count())
            .field("fixed", &self.fixed.len())
            .field("debug_mode", &self.is_debug_mode())
            .field("gather_performance", &self.is_gathering_performance())
            .finish()
    }
}
