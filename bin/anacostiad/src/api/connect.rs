use anacostia_connector::wire::{ConnectRequest, ConnectResponse};
use axum::{
	extract::{OriginalUri, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	Json,
};

use super::RouterState;

/// Connector handshake.
/// A remote predecessor's sender introduces itself, once per launch.
#[utoipa::path(
	post,
	path = "/connect",
	responses(
		(status = 200, description = "Handshake response", body = ConnectResponse),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(super) async fn connect(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<ConnectRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let response = state.pipeline.handle_connect(&payload);
	return (StatusCode::OK, Json(response)).into_response();
}
