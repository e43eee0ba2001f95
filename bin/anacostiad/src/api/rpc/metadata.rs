//! The metadata store contract over HTTP.
//!
//! Routes mirror [`anacostia_metadb::base::client::MetadataClient`]
//! one-to-one; the connector's `HttpMetadataClient` is the matching
//! caller. Contract violations (active run, duplicate entry) map to
//! 409 so callers can tell them from transport failures.

use anacostia_metadb::{
	base::errors::{AddNodeError, CreateEntryError, EndRunError, StartRunError},
	data::{ArtifactEntry, ArtifactState, NodeDescriptor, RunInfo},
	id::RunId,
};
use anacostia_connector::wire::{
	CreateEntryRequest, EndRunRequest, LogMetricRequest, RecordEventRequest,
};
use axum::{
	extract::{OriginalUri, Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use serde::Deserialize;

use crate::api::RouterState;

pub(in crate::api) fn router() -> Router<RouterState> {
	Router::new()
		.route("/run/start", post(start_run))
		.route("/run/end", post(end_run))
		.route("/run/active", get(active_run))
		.route("/run/:run_id", get(get_run))
		.route("/entry", post(create_entry))
		.route("/entry/exists", get(entry_exists))
		.route("/entry/count", get(count_entries))
		.route("/entry/list", get(list_entries))
		.route("/metric", post(log_metric).get(get_metrics))
		.route("/node", post(add_node))
		.route("/event", post(record_event))
}

/// Entry filters shared by the read endpoints
#[derive(Debug, Deserialize)]
pub(super) struct EntryFilter {
	state: Option<String>,
	run_id: Option<i64>,
}

impl EntryFilter {
	fn state(&self) -> Result<Option<ArtifactState>, Response> {
		match &self.state {
			None => Ok(None),
			Some(s) => match ArtifactState::from_db_str(s) {
				Some(state) => Ok(Some(state)),
				None => Err((
					StatusCode::BAD_REQUEST,
					Json(format!("unknown artifact state `{s}`")),
				)
					.into_response()),
			},
		}
	}

	fn run(&self) -> Option<RunId> {
		self.run_id.map(RunId::from)
	}
}

/// Start a new run
#[utoipa::path(
	post,
	path = "/run/start",
	responses(
		(status = 200, description = "The new run's id", body = i64),
		(status = 409, description = "A run is already active"),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn start_run(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.start_run().await {
		Ok(run) => return (StatusCode::OK, Json(run)).into_response(),
		Err(StartRunError::RunActive) => return StatusCode::CONFLICT.into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// End a run
#[utoipa::path(
	post,
	path = "/run/end",
	responses(
		(status = 200, description = "Run ended"),
		(status = 409, description = "Run is not active"),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn end_run(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<EndRunRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.end_run(payload.run_id).await {
		Ok(()) => return StatusCode::OK.into_response(),
		Err(EndRunError::NotActive) => return StatusCode::CONFLICT.into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// The currently active run, if any
#[utoipa::path(
	get,
	path = "/run/active",
	responses(
		(status = 200, description = "The active run id, or null", body = Option<i64>),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn active_run(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.active_run().await {
		Ok(run) => return (StatusCode::OK, Json(run)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// One run's record, including node events
#[utoipa::path(
	get,
	path = "/run/{run_id}",
	params(("run_id" = i64, Path, description = "The run to fetch")),
	responses(
		(status = 200, description = "The run, or null", body = Option<RunInfo>),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn get_run(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Path(run_id): Path<i64>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.get_run(run_id.into()).await {
		Ok(run) => return (StatusCode::OK, Json(run)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// Create a `new` artifact entry
#[utoipa::path(
	post,
	path = "/entry",
	responses(
		(status = 200, description = "The new entry's id", body = i64),
		(status = 409, description = "An entry with this location already exists"),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn create_entry(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<CreateEntryRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.create_entry(&payload.location).await {
		Ok(entry) => return (StatusCode::OK, Json(entry)).into_response(),
		Err(CreateEntryError::AlreadyExists) => return StatusCode::CONFLICT.into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

#[derive(Debug, Deserialize)]
pub(super) struct ExistsQuery {
	location: String,
}

/// Does an entry with this location exist?
#[utoipa::path(
	get,
	path = "/entry/exists",
	responses(
		(status = 200, description = "Whether the entry exists", body = bool),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn entry_exists(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<ExistsQuery>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.entry_exists(&query.location).await {
		Ok(exists) => return (StatusCode::OK, Json(exists)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// Count artifact entries
#[utoipa::path(
	get,
	path = "/entry/count",
	responses(
		(status = 200, description = "Matching entry count", body = i64),
		(status = 400, description = "Bad filter", body = String),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn count_entries(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<EntryFilter>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let entry_state = match query.state() {
		Ok(x) => x,
		Err(response) => return response,
	};

	match state
		.pipeline
		.metadb
		.get_num_entries(entry_state, query.run())
		.await
	{
		Ok(n) => return (StatusCode::OK, Json(n)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// List artifact entries
#[utoipa::path(
	get,
	path = "/entry/list",
	responses(
		(status = 200, description = "Matching entries", body = Vec<ArtifactEntry>),
		(status = 400, description = "Bad filter", body = String),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn list_entries(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<EntryFilter>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let entry_state = match query.state() {
		Ok(x) => x,
		Err(response) => return response,
	};

	match state
		.pipeline
		.metadb
		.list_entries(entry_state, query.run())
		.await
	{
		Ok(entries) => return (StatusCode::OK, Json(entries)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// Log one metric value
#[utoipa::path(
	post,
	path = "/metric",
	responses(
		(status = 200, description = "Metric logged"),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn log_metric(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<LogMetricRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state
		.pipeline
		.metadb
		.log_metric(&payload.name, payload.value)
		.await
	{
		Ok(()) => return StatusCode::OK.into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

#[derive(Debug, Deserialize)]
pub(super) struct MetricsQuery {
	name: String,
	run_id: Option<i64>,
}

/// Get logged metric values.
/// Without `run_id`, returns values not yet claimed by any run.
#[utoipa::path(
	get,
	path = "/metric",
	responses(
		(status = 200, description = "Metric values", body = Vec<f64>),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn get_metrics(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<MetricsQuery>,
	State(state): State<RouterState>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state
		.pipeline
		.metadb
		.get_metrics(&query.name, query.run_id.map(RunId::from))
		.await
	{
		Ok(values) => return (StatusCode::OK, Json(values)).into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// Register a node
#[utoipa::path(
	post,
	path = "/node",
	responses(
		(status = 200, description = "Node registered"),
		(status = 400, description = "Bad node name", body = String),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn add_node(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<NodeDescriptor>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state.pipeline.metadb.add_node(&payload).await {
		Ok(()) => return StatusCode::OK.into_response(),
		Err(AddNodeError::NameError(error)) => {
			return (StatusCode::BAD_REQUEST, Json(format!("{error}"))).into_response()
		}
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}

/// Record a node lifecycle event
#[utoipa::path(
	post,
	path = "/event",
	responses(
		(status = 200, description = "Event recorded"),
		(status = 500, description = "Store error", body = String),
		(status = 401, description = "Unauthorized")
	),
	security(("bearer" = [])),
)]
pub(in crate::api) async fn record_event(
	headers: HeaderMap,
	OriginalUri(uri): OriginalUri,
	State(state): State<RouterState>,
	Json(payload): Json<RecordEventRequest>,
) -> Response {
	if !state.config.header_has_valid_auth(&uri, &headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	match state
		.pipeline
		.metadb
		.record_node_event(payload.run_id, &payload.node, &payload.status)
		.await
	{
		Ok(()) => return StatusCode::OK.into_response(),
		Err(error) => {
			return (StatusCode::INTERNAL_SERVER_ERROR, Json(format!("{error}"))).into_response()
		}
	}
}
