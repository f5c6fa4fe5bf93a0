//! Diddle and Set Scopes
//!
//! Scopes layer temporary overrides over the thread's calculation state.
//! Opening a scope pushes a frame; dropping the guard removes exactly that
//! frame, so every override and every fixed value written inside it
//! disappears and the values visible before the scope opened are visible
//! again. This also holds when the scope is left by `?` or by a panic
//! unwinding through it.
//!
//! - [`DiddleScope`] starts empty and is filled by
//!   [`Binding::set_diddle`](super::Binding::set_diddle).
//! - [`SetScope`] applies a prepared [`Overrides`] mapping on entry.
//!
//! Both are tied to the thread that opened them.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::binding::Binding;
use super::context::{ActiveContext, FrameKind, FrameToken};
use super::object::GraphObject;
use super::state::StoredValue;
use crate::graph::{BindingId, Graph};

/// A scope for temporary overrides set with `set_diddle`.
#[derive(Debug)]
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct DiddleScope {
    token: FrameToken,
    // Frames are thread-local; the guard must not move to another thread.
    _thread: PhantomData<*const ()>,
}

impl DiddleScope {
    /// Open an empty diddle scope.
    pub fn new() -> Self {
        Self::with_debug(false)
    }

    /// Open an empty diddle scope, optionally tracing every vertex read and
    /// diddle write while it is open.
    pub fn with_debug(debug_mode: bool) -> Self {
        let token = ActiveContext::enter_scope(FrameKind::Diddle, HashMap::new(), &[], debug_mode);
        tracing::trace!(debug_mode, "entered diddle scope");
        Self {
            token,
            _thread: PhantomData,
        }
    }
}

impl Default for DiddleScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiddleScope {
    fn drop(&mut self) {
        ActiveContext::exit_scope(self.token);
        tracing::trace!("left diddle scope");
    }
}

/// A prepared mapping of bindings to override values.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    values: HashMap<BindingId, StoredValue>,
}

impl Overrides {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override for `binding`. A later entry for the same binding
    /// replaces the earlier one.
    pub fn with<O, T>(mut self, binding: &Binding<'_, O, T>, value: T) -> Self
    where
        O: GraphObject,
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(binding.id(), Arc::new(value));
        self
    }

    /// Number of overridden bindings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A scope that applies a prepared set of overrides on entry.
#[derive(Debug)]
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct SetScope {
    token: FrameToken,
    _thread: PhantomData<*const ()>,
}

impl SetScope {
    /// Open a scope with every override in `overrides` applied at once.
    pub fn new(overrides: Overrides) -> Self {
        let graph = Graph::global();
        let mut stale = Vec::new();
        for binding in overrides.values.keys() {
            stale.push(*binding);
            stale.extend(graph.dependents_of(*binding));
        }

        if graph.is_debug_mode() {
            for binding in overrides.values.keys() {
                graph.emit_debug(&format!("set {}", binding.key()));
            }
        }

        let count = overrides.len();
        let token = ActiveContext::enter_scope(FrameKind::Set, overrides.values, &stale, false);
        tracing::trace!(overrides = count, "entered set scope");
        Self {
            token,
            _thread: PhantomData,
        }
    }
}

impl Drop for SetScope {
    fn drop(&mut self) {
        ActiveContext::exit_scope(self.token);
        tracing::trace!("left set scope");
    }
}
