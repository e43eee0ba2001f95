use petgraph::{algo::toposort, graphmap::GraphMap, Directed};

use super::{GraphEdgeIdx, GraphNodeIdx};

/// A directed graph, built node-by-node during pipeline assembly.
#[derive(Debug, Clone)]
pub struct Graph<NodeType, EdgeType> {
	/// Array of nodes in this graph
	nodes: Vec<NodeType>,

	/// Array of edges in this graph
	edges: Vec<(GraphNodeIdx, GraphNodeIdx, EdgeType)>,
}

impl<NodeType, EdgeType> Graph<NodeType, EdgeType> {
	/// Create an empty graph
	pub fn new() -> Self {
		Self {
			nodes: Vec::new(),
			edges: Vec::new(),
		}
	}

	/// Add a node to this graph.
	pub fn add_node(&mut self, node: NodeType) -> GraphNodeIdx {
		let i = self.nodes.len();
		self.nodes.push(node);
		GraphNodeIdx(i)
	}

	/// Add an edge to this graph
	pub fn add_edge(
		&mut self,
		from: GraphNodeIdx,
		to: GraphNodeIdx,
		edge_value: EdgeType,
	) -> GraphEdgeIdx {
		let i = self.edges.len();
		self.edges.push((from, to, edge_value));
		GraphEdgeIdx(i)
	}

	/// Does this graph already have an edge `from -> to`?
	/// Used to refuse duplicate edges between the same pair of nodes.
	pub fn has_edge(&self, from: GraphNodeIdx, to: GraphNodeIdx) -> bool {
		self.edges.iter().any(|(f, t, _)| *f == from && *t == to)
	}

	/// Iterate over all edges in this graph
	pub fn iter_edges(&self) -> impl Iterator<Item = (GraphNodeIdx, GraphNodeIdx, &EdgeType)> {
		self.edges.iter().map(|(f, t, v)| (*f, *t, v))
	}

	/// Returns `true` if this graph has a cycle.
	pub fn has_cycle(&self) -> bool {
		self.topo_order().is_none()
	}

	/// Sort this graph's node indices topologically.
	/// Returns `None` if the graph has a cycle.
	///
	/// Nodes with no edges at all are included, in insertion order.
	pub fn topo_order(&self) -> Option<Vec<GraphNodeIdx>> {
		let mut pg = GraphMap::<usize, (), Directed>::new();
		for i in 0..self.nodes.len() {
			pg.add_node(i);
		}
		for (from, to, _) in self.iter_edges() {
			pg.add_edge(from.into(), to.into(), ());
		}

		match toposort(&pg, None) {
			Ok(order) => Some(order.into_iter().map(GraphNodeIdx).collect()),
			Err(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cycle_detection() {
		let mut g = Graph::new();
		let a = g.add_node("a");
		let b = g.add_node("b");
		let c = g.add_node("c");
		g.add_edge(a, b, ());
		g.add_edge(b, c, ());
		assert!(!g.has_cycle());

		g.add_edge(c, a, ());
		assert!(g.has_cycle());
		assert!(g.topo_order().is_none());
	}

	#[test]
	fn topo_order_respects_edges() {
		let mut g = Graph::new();
		let store = g.add_node("store");
		let resource = g.add_node("resource");
		let action = g.add_node("action");
		let lonely = g.add_node("lonely");
		g.add_edge(resource, action, ());
		g.add_edge(store, resource, ());

		let order = g.topo_order().unwrap();
		assert_eq!(order.len(), 4);

		let pos = |idx: GraphNodeIdx| order.iter().position(|x| *x == idx).unwrap();
		assert!(pos(store) < pos(resource));
		assert!(pos(resource) < pos(action));
		let _ = pos(lonely);
	}

	#[test]
	fn duplicate_edges() {
		let mut g = Graph::new();
		let a = g.add_node("a");
		let b = g.add_node("b");
		assert!(!g.has_edge(a, b));
		g.add_edge(a, b, ());
		assert!(g.has_edge(a, b));
		assert!(!g.has_edge(b, a));
	}
}
