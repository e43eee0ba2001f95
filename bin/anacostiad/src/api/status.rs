use anacostia_node::status::NodeStatus;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{
		sse::{Event, KeepAlive, Sse},
		IntoResponse, Response,
	},
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use utoipa::ToSchema;

use super::RouterState;

/// One SSE status event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(super) struct NodeStatusJson {
	pub id: String,
	pub status: NodeStatus,
}

/// A node's live status stream.
///
/// Emits one event per status transition, primed with the current
/// status on subscribe. This is the only channel external UIs get;
/// dropping it affects nobody but them.
#[utoipa::path(
	get,
	path = "/node/{node_id}/status",
	params(("node_id" = String, Path, description = "The node to watch")),
	responses(
		(status = 200, description = "SSE stream of status transitions"),
		(status = 404, description = "No such node"),
	)
)]
pub(super) async fn node_status(
	Path(node_id): Path<String>,
	State(state): State<RouterState>,
) -> Response {
	let current = match state.pipeline.board.get_status(&node_id) {
		None => return StatusCode::NOT_FOUND.into_response(),
		Some((status, _)) => status,
	};

	let first = Event::default().json_data(&NodeStatusJson {
		id: node_id.clone(),
		status: current,
	});

	let rx = state.pipeline.board.subscribe();
	let updates = stream::unfold((rx, node_id), |(mut rx, node_id)| async move {
		loop {
			match rx.recv().await {
				Ok(event) => {
					if event.node != node_id.as_str() {
						continue;
					}

					let sse = Event::default().json_data(&NodeStatusJson {
						id: node_id.clone(),
						status: event.status,
					});
					match sse {
						Ok(sse) => return Some((Ok::<_, Infallible>(sse), (rx, node_id))),
						Err(_) => continue,
					}
				}

				// Missing a few transitions is fine; the next one
				// carries the current status anyway
				Err(RecvError::Lagged(_)) => continue,
				Err(RecvError::Closed) => return None,
			}
		}
	});

	let stream = stream::iter(first.into_iter().map(Ok::<_, Infallible>)).chain(updates);
	return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
}
