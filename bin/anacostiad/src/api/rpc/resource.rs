//! Resource node proxies: artifact listings, fetches, and uploads.
//!
//! Artifact bytes are owned by the resource node that created them;
//! other pipelines read and write them through these endpoints only.

use anacostia_metadb::{
	data::{ArtifactEntry, ArtifactState},
	id::RunId,
};
use anacostia_connector::wire::{FetchArtifactResponse, PutArtifactRequest};
use axum::{
	extract::{OriginalUri, Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use base64::Engine;
use serde::Deserialize;
use std::path::{Component, Path as FsPath};
use tracing::warn;

use crate::api::RouterState;

pub(in crate::api) fn router() -> Router<RouterState> {
	Router::new()
		.route("/:node_id/artifacts", get(list_artifacts))
		.route("/:node_id/fetch", get(fetch_artifact))
		.route("/:node_id/put", post(put_artifact))
}

#[derive(Debug, Deserialize)]
pub(super) struct ArtifactsQuery {
	run_id: i64,
}

/// The artifact entries a run is consuming
#[utoipa::path(
	get,
	path = "/{node_id}/artifacts",
	params(("node_id" = String, Path, description = "A resource node")),
	responses(
		(status = 200, description = "This run's artifact entries", body = Vec<ArtifactEntry>),
		(status = 404, description = "No such resource node"),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn list_artifacts(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	Query(query): Query<ArtifactsQuery>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	if state.pipeline.artifact_root(&node_id).is_none() {
		return StatusCode::NOT_FOUND.into_response();
	}

	match state
		.pipeline
		.metadb
		.list_entries(Some(ArtifactState::Current), Some(RunId::from(query.run_id)))
		.await
	{
		Ok(entries) => return (StatusCode::OK, Json(entries)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

#[derive(Debug, Deserialize)]
pub(super) struct FetchQuery {
	/// The artifact's location (an absolute path inside the node's root)
	path: String,
}

/// Fetch one artifact's bytes
#[utoipa::path(
	get,
	path = "/{node_id}/fetch",
	params(("node_id" = String, Path, description = "A resource node")),
	responses(
		(status = 200, description = "The artifact's bytes, base64-encoded", body = FetchArtifactResponse),
		(status = 404, description = "No such node or artifact"),
		(status = 403, description = "Path is outside the node's root"),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn fetch_artifact(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	Query(query): Query<FetchQuery>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let root = match state.pipeline.artifact_root(&node_id) {
		None => return StatusCode::NOT_FOUND.into_response(),
		Some(root) => root,
	};

	// Canonicalize both ends so `..` can't escape the root
	let root = match root.canonicalize() {
		Ok(x) => x,
		Err(error) => {
			warn!(message = "Could not canonicalize artifact root", node = %node_id, %error);
			return StatusCode::INTERNAL_SERVER_ERROR.into_response();
		}
	};
	let target = match FsPath::new(&query.path).canonicalize() {
		Ok(x) => x,
		Err(_) => return StatusCode::NOT_FOUND.into_response(),
	};

	if !target.starts_with(&root) {
		return StatusCode::FORBIDDEN.into_response();
	}

	match tokio::fs::read(&target).await {
		Ok(data) => {
			return (
				StatusCode::OK,
				Json(FetchArtifactResponse {
					data: base64::engine::general_purpose::STANDARD.encode(data),
				}),
			)
				.into_response()
		}
		Err(_) => return StatusCode::NOT_FOUND.into_response(),
	}
}

/// Upload an artifact into the node's root.
/// The monitor picks it up like any other external change.
#[utoipa::path(
	post,
	path = "/{node_id}/put",
	params(("node_id" = String, Path, description = "A resource node")),
	responses(
		(status = 200, description = "Artifact written"),
		(status = 400, description = "Bad path or data", body = String),
		(status = 404, description = "No such resource node"),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn put_artifact(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	State(state): State<RouterState>,
	Json(payload): Json<PutArtifactRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let root = match state.pipeline.artifact_root(&node_id) {
		None => return StatusCode::NOT_FOUND.into_response(),
		Some(root) => root,
	};

	// Uploads name a path relative to the root, no escapes
	let relative = FsPath::new(&payload.path);
	let plain = relative
		.components()
		.all(|c| matches!(c, Component::Normal(_)));
	if relative.is_absolute() || !plain {
		return (
			StatusCode::BAD_REQUEST,
			Json("path must be relative, without `..`".to_owned()),
		)
			.into_response();
	}

	let data = match base64::engine::general_purpose::STANDARD.decode(&payload.data) {
		Ok(x) => x,
		Err(error) => {
			return (StatusCode::BAD_REQUEST, Json(format!("bad base64: {error}")))
				.into_response()
		}
	};

	let target = root.join(relative);
	if let Some(parent) = target.parent() {
		match tokio::fs::create_dir_all(parent).await {
			Ok(()) => {}
			Err(error) => {
				return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}")))
					.into_response()
			}
		}
	}

	match tokio::fs::write(&target, data).await {
		Ok(()) => return StatusCode::OK.into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}
