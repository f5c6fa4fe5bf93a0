//! Dependency Graph
//!
//! This module implements the process-wide graph that records which vertex
//! evaluations invoked which other vertices.
//!
//! # Overview
//!
//! - Nodes are vertex keys (`"Type.method"`) at the type level, and bindings
//!   (one vertex on one instance) at the instance level.
//! - An edge from caller to callee is recorded every time a vertex reads
//!   another vertex while evaluating. Edges are never declared up front.
//!
//! When a fixed value changes, the [`Graph`] walks the binding-level edges
//! in the dependent direction and bumps the version of everything it
//! reaches. Memoized values stamped with an older version are recomputed on
//! their next read.
//!
//! # Design Decisions
//!
//! 1. One centralized graph rather than per-vertex subscriber lists:
//!    - topological ordering and path enumeration need the whole picture
//!    - invalidation is a single sweep under one writer lock
//!
//! 2. Key-level nodes are indexed in first-discovery order, which makes
//!    every ordering deterministic.
//!
//! 3. Both directions of every edge are stored, so walking towards
//!    dependencies and towards dependents are equally cheap.

mod dependency;
mod key;
mod registry;

pub use dependency::{DependencyGraph, GraphExport, Node};
pub use key::{BindingId, ObjectId, VertexKey};
pub use registry::{DebugSink, Graph};
