//! Graph Keys
//!
//! Identities used by the dependency graph and the calculation states.
//!
//! - [`VertexKey`] names a computed property at the type level
//!   (`"Type.method"`). The key-level graph is built from these.
//! - [`ObjectId`] names one participating instance.
//! - [`BindingId`] pairs the two: one vertex on one instance. Memoized
//!   values, fixed values, diddles, and invalidation all work on bindings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Type-level identity of a computed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VertexKey {
    owner: &'static str,
    method: &'static str,
}

impl VertexKey {
    /// Create a key from the owning type name and the method name.
    pub const fn new(owner: &'static str, method: &'static str) -> Self {
        Self { owner, method }
    }

    /// The owning type name.
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// The method name.
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl fmt::Display for VertexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.method)
    }
}

/// Unique identifier for a participating instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of one vertex on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BindingId {
    object: ObjectId,
    key: VertexKey,
}

impl BindingId {
    /// Pair an instance with a vertex key.
    pub fn new(object: ObjectId, key: VertexKey) -> Self {
        Self { object, key }
    }

    /// The owning instance.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// The type-level key.
    pub fn key(&self) -> VertexKey {
        self.key
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.object.0)
    }
}
