//! Vertices
//!
//! This module implements computed properties and the scoped override model.
//!
//! # Concepts
//!
//! ## Vertices and Bindings
//!
//! A [`Vertex`] is a memoized computation declared on a [`GraphObject`]
//! type. Binding it to an instance gives a [`Binding`], which can be read,
//! fixed, cleared, and diddled.
//!
//! ## Fixed Values
//!
//! [`Binding::set_value`] overrides a binding on every thread until
//! [`Binding::clear_value`]. Everything downstream recomputes on its next
//! read.
//!
//! ## Diddles
//!
//! Inside a [`DiddleScope`] or [`SetScope`], overrides are visible only to
//! the current thread and only until the scope closes. Scopes nest; an inner
//! scope's overrides shadow the outer ones and vanish when it closes.
//!
//! # Implementation Notes
//!
//! The evaluation stack, the override frames, and the memoized values all
//! live in a thread-local [`ActiveContext`]. When a binding is read while
//! another is evaluating, the context supplies the caller so the dependency
//! edge can be recorded, and the same stack detects cycles.

mod binding;
mod context;
mod object;
mod scope;
mod state;

pub use binding::{is_fixed, Binding, Compute, Vertex};
pub use context::ActiveContext;
pub use object::{GraphNode, GraphObject};
pub use scope::{DiddleScope, Overrides, SetScope};
pub use state::{CalculationState, StoredValue};
