//! Debug Mode Tests
//!
//! Debug lines go to a process-wide sink; every test here shares one
//! collector and only looks for lines naming its own types.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use vertex_core::{Binding, DiddleScope, Graph, GraphNode, GraphObject, Vertex};

fn collected() -> &'static Arc<Mutex<Vec<String>>> {
    static LINES: OnceLock<Arc<Mutex<Vec<String>>>> = OnceLock::new();
    LINES.get_or_init(|| {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        Graph::global().set_debug_sink(Some(Arc::new(move |line: &str| {
            sink.lock().push(line.to_string());
        })));
        lines
    })
}

fn saw(needle: &str) -> bool {
    collected().lock().iter().any(|line| line.contains(needle))
}

struct DebugSimple {
    node: GraphNode,
}

impl GraphObject for DebugSimple {
    const TYPE_NAME: &'static str = "DebugSimple";

    fn graph_node(&self) -> &GraphNode {
        &self.node
    }
}

impl DebugSimple {
    const A: Vertex<Self, i64> = Vertex::new("a", |_| Ok(5));
    const C: Vertex<Self, i64> = Vertex::new("c", |s| Ok(s.a().get()? + 8));

    fn a(&self) -> Binding<'_, Self, i64> {
        Self::A.bind(self)
    }

    fn c(&self) -> Binding<'_, Self, i64> {
        Self::C.bind(self)
    }
}

struct DebugScoped {
    node: GraphNode,
}

impl GraphObject for DebugScoped {
    const TYPE_NAME: &'static str = "DebugScoped";

    fn graph_node(&self) -> &GraphNode {
        &self.node
    }
}

impl DebugScoped {
    const VALUE: Vertex<Self, i64> = Vertex::new("value", |_| Ok(42));

    fn value(&self) -> Binding<'_, Self, i64> {
        Self::VALUE.bind(self)
    }
}

/// Test that global debug mode traces every invocation without changing
/// results.
#[test]
fn debug_mode() {
    collected();
    let graph = Graph::global();
    let obj = DebugSimple {
        node: GraphNode::new(),
    };

    graph.set_debug_mode(true);
    assert!(graph.is_debug_mode());
    let result = obj.c().get().unwrap();
    graph.set_debug_mode(false);

    assert_eq!(result, 13);
    assert!(saw("get DebugSimple.c"));
    assert!(saw("eval DebugSimple.c"));
    assert!(saw("get DebugSimple.a"));
}

/// Test that a debug diddle scope traces only while it is open.
#[test]
fn diddle_debug_mode() {
    collected();
    let obj = DebugScoped {
        node: GraphNode::new(),
    };

    {
        let _scope = DiddleScope::with_debug(true);
        obj.value().set_diddle(10).unwrap();
        assert_eq!(obj.value().get().unwrap(), 10);
    }
    assert!(saw("diddle DebugScoped.value"));
    assert!(saw("get DebugScoped.value"));

    assert_eq!(obj.value().get().unwrap(), 42);
}
