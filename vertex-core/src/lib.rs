//! Vertex Core
//!
//! This crate provides the core runtime for the Vertex incremental
//! computation engine. It implements:
//!
//! - Memoized computed properties (vertices) on ordinary Rust types
//! - Automatic dependency discovery at evaluation time
//! - Fixed values and nested, thread-local diddle/set overrides
//! - Cycle detection, topological ordering, and graph export
//! - Debug tracing and per-binding timing instrumentation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `vertex`: vertex definitions, bindings, scopes, and the thread-local
//!   active context
//! - `graph`: the process-wide dependency graph, fixed values, and versions
//! - `timing`: elapsed-time samples
//! - `config`: engine-wide switches
//!
//! # Example
//!
//! ```rust
//! use vertex_core::{Binding, DiddleScope, GraphNode, GraphObject, Vertex};
//!
//! struct Simple {
//!     node: GraphNode,
//! }
//!
//! impl GraphObject for Simple {
//!     const TYPE_NAME: &'static str = "Simple";
//!
//!     fn graph_node(&self) -> &GraphNode {
//!         &self.node
//!     }
//! }
//!
//! impl Simple {
//!     const A: Vertex<Self, i64> = Vertex::new("a", |_| Ok(5));
//!     const B: Vertex<Self, i64> = Vertex::new("b", |s| Ok(s.a().get()? * 2));
//!
//!     fn a(&self) -> Binding<'_, Self, i64> {
//!         Self::A.bind(self)
//!     }
//!
//!     fn b(&self) -> Binding<'_, Self, i64> {
//!         Self::B.bind(self)
//!     }
//! }
//!
//! let simple = Simple { node: GraphNode::new() };
//! assert_eq!(simple.b().get().unwrap(), 10);
//!
//! {
//!     let _scope = DiddleScope::new();
//!     simple.a().set_diddle(20).unwrap();
//!     assert_eq!(simple.b().get().unwrap(), 40);
//! }
//! assert_eq!(simple.b().get().unwrap(), 10);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod timing;
pub mod vertex;

pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use graph::{BindingId, Graph, GraphExport, ObjectId, VertexKey};
pub use vertex::{
    is_fixed, ActiveContext, Binding, CalculationState, DiddleScope, GraphNode, GraphObject,
    Overrides, SetScope, Vertex,
};

/// Check whether a vertex is being evaluated on the current thread.
pub fn is_calculating() -> bool {
    ActiveContext::is_calculating()
}
