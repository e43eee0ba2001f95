use anacostia_connector::wire::SignalRequest;
use axum::{
	extract::{OriginalUri, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	Json,
};

use super::RouterState;

/// Deliver a signal into a node's inbox.
///
/// Idempotent by `(from, run_id)`: retried deliveries are absorbed by
/// the inbox.
#[utoipa::path(
	post,
	path = "/signal",
	responses(
		(status = 200, description = "Signal accepted"),
		(status = 404, description = "No such node", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(super) async fn signal(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<SignalRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let target = payload.to.clone();
	if state.pipeline.deliver_signal(payload.into_signal()).await {
		return StatusCode::OK.into_response();
	} else {
		return (
			StatusCode::NOT_FOUND,
			Json(format!("no node named `{target}`")),
		)
			.into_response();
	}
}
