use anacostia_connector::wire::{
	ConnectRequest, ConnectResponse, CreateEntryRequest, EndRunRequest, FetchArtifactResponse,
	LogMetricRequest, PutArtifactRequest, RecordEventRequest, SignalRequest,
};
use anacostia_metadb::data::{ArtifactEntry, ArtifactState, NodeDescriptor, NodeKind, RunInfo};
use anacostia_node::{signal::SignalKind, status::NodeStatus};
use anacostia_pipeline::pipeline::Pipeline;
use axum::{
	extract::DefaultBodyLimit,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::{
	openapi::security::{Http, HttpAuthScheme, SecurityScheme},
	Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

mod connect;
mod graph;
mod pause;
mod rpc;
mod signal;
mod status;

use crate::config::AnacostiadConfig;

#[derive(Clone)]
pub struct RouterState {
	pub config: Arc<AnacostiadConfig>,
	pub pipeline: Arc<Pipeline>,
}

struct BearerSecurityAddon;
impl Modify for BearerSecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		if let Some(components) = openapi.components.as_mut() {
			components.add_security_scheme(
				"bearer",
				SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
			)
		}
	}
}

#[derive(OpenApi)]
#[openapi(
	modifiers(&BearerSecurityAddon),
	paths(
		connect::connect,
		signal::signal,
		graph::get_graph,
		status::node_status,
		pause::pause_node,
		pause::unpause_node,
		rpc::metadata::start_run,
		rpc::metadata::end_run,
		rpc::metadata::active_run,
		rpc::metadata::get_run,
		rpc::metadata::create_entry,
		rpc::metadata::entry_exists,
		rpc::metadata::count_entries,
		rpc::metadata::list_entries,
		rpc::metadata::log_metric,
		rpc::metadata::get_metrics,
		rpc::metadata::add_node,
		rpc::metadata::record_event,
		rpc::resource::list_artifacts,
		rpc::resource::fetch_artifact,
		rpc::resource::put_artifact,
	),
	tags(
		(name = "anacostiad", description = "Anacostia pipeline daemon")
	),
	components(schemas(
		ConnectRequest,
		ConnectResponse,
		SignalRequest,
		SignalKind,
		NodeStatus,
		NodeKind,
		ArtifactEntry,
		ArtifactState,
		RunInfo,
		NodeDescriptor,
		EndRunRequest,
		CreateEntryRequest,
		LogMetricRequest,
		RecordEventRequest,
		PutArtifactRequest,
		FetchArtifactResponse,
		graph::GraphJson,
		graph::GraphNodeJson,
		graph::GraphEdgeJson,
		status::NodeStatusJson,
	))
)]
struct ApiDoc;

pub(super) fn router(state: RouterState) -> Router {
	Router::new()
		.merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
		//
		.route("/connect", post(connect::connect))
		.route("/signal", post(signal::signal))
		.route("/graph", get(graph::get_graph))
		.route("/node/:node_id/status", get(status::node_status))
		.route("/node/:node_id/pause", post(pause::pause_node))
		.route("/node/:node_id/unpause", post(pause::unpause_node))
		//
		.nest("/rpc/metadata", rpc::metadata::router())
		.nest("/rpc/resource", rpc::resource::router())
		//
		.layer(TraceLayer::new_for_http())
		.layer(DefaultBodyLimit::max(
			state.config.anacostiad_request_body_limit,
		))
		.with_state(state)
}
