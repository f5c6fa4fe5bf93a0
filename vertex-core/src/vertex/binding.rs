//! Vertex Definitions and Bindings
//!
//! A [`Vertex`] turns a plain method `fn(&O) -> Result<T>` into a computed
//! property. Binding it to an instance yields a [`Binding`], which is what
//! callers invoke.
//!
//! # Reading a Binding
//!
//! [`Binding::get`] returns the first of:
//!
//! 1. the innermost diddle/set override open on this thread,
//! 2. the fixed value, where one written inside an open scope shadows the
//!    one shared by every thread,
//! 3. the memoized value in the innermost calculation state, if its
//!    version stamp is current,
//! 4. a fresh evaluation of the method.
//!
//! Every read made while another vertex is evaluating records a dependency
//! edge from the evaluating vertex to the one being read, so dependencies
//! never have to be declared.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Prices {
//!     node: GraphNode,
//! }
//!
//! impl Prices {
//!     const SPOT: Vertex<Self, f64> = Vertex::new("spot", |_| Ok(100.0));
//!     const DOUBLED: Vertex<Self, f64> = Vertex::new("doubled", |p| Ok(p.spot().get()? * 2.0));
//!
//!     fn spot(&self) -> Binding<'_, Self, f64> {
//!         Self::SPOT.bind(self)
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use super::context::{ActiveContext, OverrideWrite};
use super::object::GraphObject;
use super::state::{Fixing, StoredValue};
use crate::error::{GraphError, Result};
use crate::graph::{BindingId, Graph, VertexKey};

/// The computation behind a vertex.
pub type Compute<O, T> = fn(&O) -> Result<T>;

/// A computed property declared on `O`, producing `T`.
pub struct Vertex<O, T> {
    method: &'static str,
    compute: Compute<O, T>,
}

impl<O, T> Vertex<O, T> {
    /// Declare a vertex named `method` computed by `compute`.
    pub const fn new(method: &'static str, compute: Compute<O, T>) -> Self {
        Self { method, compute }
    }

    /// The method name.
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl<O, T> Vertex<O, T>
where
    O: GraphObject,
    T: Clone + Send + Sync + 'static,
{
    /// Type-level key, `"Type.method"`.
    pub fn key(&self) -> VertexKey {
        VertexKey::new(O::TYPE_NAME, self.method)
    }

    /// Pair this vertex with an instance.
    pub fn bind<'a>(&'a self, object: &'a O) -> Binding<'a, O, T> {
        Binding {
            vertex: self,
            object,
            id: BindingId::new(object.object_id(), self.key()),
        }
    }
}

impl<O, T> Clone for Vertex<O, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, T> Copy for Vertex<O, T> {}

impl<O, T> fmt::Debug for Vertex<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// One vertex on one instance.
pub struct Binding<'a, O, T> {
    vertex: &'a Vertex<O, T>,
    object: &'a O,
    id: BindingId,
}

impl<'a, O, T> Binding<'a, O, T>
where
    O: GraphObject,
    T: Clone + Send + Sync + 'static,
{
    /// Identity of this binding.
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Type-level key of this binding.
    pub fn key(&self) -> VertexKey {
        self.id.key()
    }

    /// The current authoritative value.
    ///
    /// Fails with [`GraphError::Cycle`] if evaluating this binding leads
    /// back to itself, and propagates any error raised by the method.
    pub fn get(&self) -> Result<T> {
        let graph = Graph::global();

        if let Some(path) = ActiveContext::reentry_path(self.id) {
            let path = path
                .iter()
                .map(|binding| binding.key().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            tracing::warn!(binding = %self.id, %path, "cycle detected");
            return Err(GraphError::Cycle { path });
        }

        if let Some(caller) = ActiveContext::current_caller() {
            graph.record_edge(caller, self.id);
        }

        let debug = graph.is_debug_mode() || ActiveContext::is_debugging();
        if debug {
            graph.emit_debug(&format!("get {}", self.key()));
        }

        if let Some(value) = ActiveContext::lookup_override(&self.id) {
            return self.downcast(value);
        }
        match ActiveContext::lookup_fixed(&self.id) {
            Some(Fixing::Set(value)) => return self.downcast(value),
            Some(Fixing::Cleared) => {}
            None => {
                if let Some(value) = graph.fixed_value(&self.id) {
                    return self.downcast(value);
                }
            }
        }

        let version = graph.version(&self.id);
        if let Some(value) = ActiveContext::lookup_cached(&self.id, version) {
            tracing::trace!(binding = %self.id, "cache hit");
            return self.downcast(value);
        }

        if debug {
            graph.emit_debug(&format!("eval {}", self.key()));
        }
        self.evaluate(graph, version)
    }

    fn evaluate(&self, graph: &Graph, version: u64) -> Result<T> {
        let _evaluating = ActiveContext::enter_evaluation(self.id);
        let value = {
            let _timer = graph.time_it(self.id);
            (self.vertex.compute)(self.object)?
        };

        graph.note_evaluated(self.key());
        ActiveContext::store_cached(self.id, Arc::new(value.clone()), version);
        tracing::trace!(binding = %self.id, version, "evaluated");
        Ok(value)
    }

    fn downcast(&self, value: StoredValue) -> Result<T> {
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| GraphError::TypeMismatch {
                binding: self.key().to_string(),
            })
    }

    fn ensure_idle(&self) -> Result<()> {
        if ActiveContext::is_calculating() {
            return Err(GraphError::MutationDuringCalculation {
                binding: self.key().to_string(),
            });
        }
        Ok(())
    }

    /// Fix the value until [`Binding::clear_value`] is called.
    ///
    /// With no scope open, the value is shared by every thread and every
    /// binding downstream recomputes on its next read, on every thread.
    /// Inside a diddle or set scope, the value belongs to the innermost
    /// frame on this thread and is discarded when that scope closes.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.ensure_idle()?;
        let value: StoredValue = Arc::new(value);
        if ActiveContext::has_override_scope() {
            tracing::debug!(binding = %self.id, "fixing value in scope");
            self.write_fixed(Fixing::Set(value));
        } else {
            tracing::debug!(binding = %self.id, "fixing value");
            Graph::global().fix(self.id, value);
        }
        Ok(())
    }

    /// Remove the fixed value; the next read recomputes from the method.
    ///
    /// Inside a scope this only hides the fixed value until the scope
    /// closes.
    pub fn clear_value(&self) -> Result<()> {
        self.ensure_idle()?;
        if ActiveContext::has_override_scope() {
            tracing::debug!(binding = %self.id, "clearing fixed value in scope");
            self.write_fixed(Fixing::Cleared);
        } else if Graph::global().unfix(self.id) {
            tracing::debug!(binding = %self.id, "cleared fixed value");
        }
        Ok(())
    }

    fn write_fixed(&self, fixing: Fixing) {
        let dependents = Graph::global().dependents_of(self.id);
        ActiveContext::write_fixed(self.id, fixing, &dependents);
    }

    /// Check whether a fixed value is visible on this thread. Diddles are
    /// ignored.
    pub fn is_fixed(&self) -> bool {
        match ActiveContext::lookup_fixed(&self.id) {
            Some(Fixing::Set(_)) => true,
            Some(Fixing::Cleared) => false,
            None => Graph::global().is_fixed(&self.id),
        }
    }

    /// Check whether an open scope on this thread overrides the binding.
    pub fn is_diddled(&self) -> bool {
        ActiveContext::is_overridden(&self.id)
    }

    /// Override the value inside the innermost open diddle scope.
    pub fn set_diddle(&self, value: T) -> Result<()> {
        self.write_override(Some(Arc::new(value)))
    }

    /// Remove this binding's override from the innermost open diddle scope.
    ///
    /// Overrides written by enclosing scopes become visible again.
    pub fn clear_diddle(&self) -> Result<()> {
        self.write_override(None)
    }

    fn write_override(&self, value: Option<StoredValue>) -> Result<()> {
        let graph = Graph::global();
        let dependents = graph.dependents_of(self.id);
        let setting = value.is_some();

        match ActiveContext::write_override(self.id, value, &dependents) {
            OverrideWrite::Applied(_) => {
                if graph.is_debug_mode() || ActiveContext::is_debugging() {
                    let verb = if setting { "diddle" } else { "undiddle" };
                    graph.emit_debug(&format!("{verb} {}", self.key()));
                }
                Ok(())
            }
            OverrideWrite::NoScope => Err(GraphError::InvalidScopeUsage {
                binding: self.key().to_string(),
            }),
            OverrideWrite::Calculating => Err(GraphError::MutationDuringCalculation {
                binding: self.key().to_string(),
            }),
        }
    }

    /// Time a span attributed to this binding.
    ///
    /// No-op unless performance gathering is enabled.
    pub fn time_it(&self) -> crate::timing::TimerGuard<'static> {
        Graph::global().time_it(self.id)
    }
}

impl<O, T> Clone for Binding<'_, O, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, T> Copy for Binding<'_, O, T> {}

impl<O, T> fmt::Debug for Binding<'_, O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").field("id", &self.id).finish()
    }
}

/// Check whether a binding has a fixed value.
pub fn is_fixed<O, T>(binding: &Binding<'_, O, T>) -> bool
where
    O: GraphObject,
    T: Clone + Send + Sync + 'static,
{
    binding.is_fixed()
}
