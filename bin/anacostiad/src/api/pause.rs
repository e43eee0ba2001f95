use axum::{
	extract::{OriginalUri, Path, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
};

use super::RouterState;

/// Pause one node.
///
/// The node parks in `PAUSED` at its next suspension point, keeping
/// its inbox, and resumes where it left off on unpause.
#[utoipa::path(
	post,
	path = "/node/{node_id}/pause",
	params(("node_id" = String, Path, description = "The node to pause")),
	responses(
		(status = 200, description = "Node paused"),
		(status = 404, description = "No such node"),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(super) async fn pause_node(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	if state.pipeline.set_node_paused(&node_id, true) {
		return StatusCode::OK.into_response();
	} else {
		return StatusCode::NOT_FOUND.into_response();
	}
}

/// Resume a paused node
#[utoipa::path(
	post,
	path = "/node/{node_id}/unpause",
	params(("node_id" = String, Path, description = "The node to resume")),
	responses(
		(status = 200, description = "Node resumed"),
		(status = 404, description = "No such node"),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(super) async fn unpause_node(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	if state.pipeline.set_node_paused(&node_id, false) {
		return StatusCode::OK.into_response();
	} else {
		return StatusCode::NOT_FOUND.into_response();
	}
}
