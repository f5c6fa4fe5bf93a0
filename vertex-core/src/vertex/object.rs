//! Graph Objects
//!
//! Types that expose vertices implement [`GraphObject`] and embed a
//! [`GraphNode`]. The node gives the instance its identity in the graph and
//! cleans up the instance's shared state when it is dropped.

use crate::graph::{Graph, ObjectId};

use super::context::ActiveContext;

/// A type whose instances own vertices.
///
/// ```rust,ignore
/// struct Portfolio {
///     node: GraphNode,
/// }
///
/// impl GraphObject for Portfolio {
///     const TYPE_NAME: &'static str = "Portfolio";
///
///     fn graph_node(&self) -> &GraphNode {
///         &self.node
///     }
/// }
/// ```
pub trait GraphObject {
    /// Owning type name used in every vertex key of this type.
    const TYPE_NAME: &'static str;

    /// The embedded node.
    fn graph_node(&self) -> &GraphNode;

    /// Identity of this instance.
    fn object_id(&self) -> ObjectId {
        self.graph_node().id()
    }
}

/// Per-instance graph identity.
#[derive(Debug)]
pub struct GraphNode {
    id: ObjectId,
}

impl GraphNode {
    /// Allocate a fresh identity.
    pub fn new() -> Self {
        Self { id: ObjectId::new() }
    }

    /// Identity of the owning instance.
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl Default for GraphNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GraphNode {
    fn drop(&mut self) {
        Graph::global().forget_object(self.id);
        ActiveContext::forget_object(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_have_distinct_ids() {
        let a = GraphNode::new();
        let b = GraphNode::default();
        assert_ne!(a.id(), b.id());
    }
}
