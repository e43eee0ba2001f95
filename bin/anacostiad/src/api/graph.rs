use anacostia_metadb::data::NodeKind;
use axum::{
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::RouterState;

/// One node, as the dashboard renders it
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(super) struct GraphNodeJson {
	pub id: String,
	pub label: String,

	/// Where this node's detail view lives
	pub endpoint: String,

	/// This node's SSE status stream
	pub status_endpoint: String,

	pub base_type: NodeKind,
}

/// One edge, as the dashboard renders it
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(super) struct GraphEdgeJson {
	pub id: String,
	pub source: String,
	pub target: String,
}

/// The whole local graph
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(super) struct GraphJson {
	pub nodes: Vec<GraphNodeJson>,
	pub edges: Vec<GraphEdgeJson>,
}

/// The pipeline's node graph, for the dashboard renderer
#[utoipa::path(
	get,
	path = "/graph",
	responses(
		(status = 200, description = "The pipeline graph", body = GraphJson),
	)
)]
pub(super) async fn get_graph(State(state): State<RouterState>) -> Response {
	let nodes = state
		.pipeline
		.nodes_summary()
		.into_iter()
		.map(|(name, kind)| GraphNodeJson {
			id: name.to_string(),
			label: name.to_string(),
			endpoint: format!("/node/{name}"),
			status_endpoint: format!("/node/{name}/status"),
			base_type: kind,
		})
		.collect();

	let edges = state
		.pipeline
		.edges_summary()
		.into_iter()
		.map(|(source, target)| GraphEdgeJson {
			id: format!("{source}->{target}"),
			source,
			target,
		})
		.collect();

	return (StatusCode::OK, Json(GraphJson { nodes, edges })).into_response();
}
