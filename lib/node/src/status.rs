//! Node statuses and the status fan-out channel

use anacostia_metadb::id::RunId;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::{
	collections::BTreeMap,
	fmt::Display,
	sync::{Arc, Mutex},
};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use utoipa::ToSchema;

/// Where a node is in its lifecycle.
///
/// This is a closed set; the dashboard and all wire formats use
/// exactly these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
	/// Setting up; possibly waiting for remote handshakes
	Initializing,

	/// Idle resource node, watching its backing store
	WaitingResource,

	/// Idle metadata store node, watching metric triggers
	WaitingMetrics,

	/// Run started; waiting for predecessor signals
	Queued,

	/// Parked by a pause request
	Paused,

	/// Kind-specific pre-execute work
	Preparation,

	/// Running the node body
	Executing,

	/// Signalling successors and recording the node's end
	Cleanup,

	/// Terminal: executed successfully this run
	Complete,

	/// A resource node's trigger condition fired
	Triggered,

	/// Terminal: skipped this run
	Skipped,

	/// Terminal: the node body failed this run
	Failure,

	/// Terminal: the node could not speak to a peer or the store
	Error,
}

impl NodeStatus {
	/// Is this status terminal for a run?
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Complete | Self::Skipped | Self::Failure | Self::Error)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Initializing => "INITIALIZING",
			Self::WaitingResource => "WAITING_RESOURCE",
			Self::WaitingMetrics => "WAITING_METRICS",
			Self::Queued => "QUEUED",
			Self::Paused => "PAUSED",
			Self::Preparation => "PREPARATION",
			Self::Executing => "EXECUTING",
			Self::Cleanup => "CLEANUP",
			Self::Complete => "COMPLETE",
			Self::Triggered => "TRIGGERED",
			Self::Skipped => "SKIPPED",
			Self::Failure => "FAILURE",
			Self::Error => "ERROR",
		}
	}
}

impl Display for NodeStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// One status transition, as published to the fan-out channel
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusEvent {
	/// The node that transitioned
	#[schema(value_type = String)]
	pub node: SmartString<LazyCompact>,

	pub status: NodeStatus,

	/// The run this transition belongs to, if any
	#[schema(value_type = Option<i64>)]
	pub run: Option<RunId>,

	#[schema(value_type = String)]
	pub at: OffsetDateTime,
}

/// The shared status table of one pipeline.
///
/// Every engine writes its own row; the coordinator and the SSE
/// endpoint read all of them. Each write is also published to a
/// broadcast channel. Dropping broadcast events is harmless: the
/// channel only feeds external UIs.
#[derive(Clone)]
pub struct StatusBoard {
	statuses: Arc<Mutex<BTreeMap<SmartString<LazyCompact>, (NodeStatus, Option<RunId>)>>>,
	events: broadcast::Sender<StatusEvent>,
}

impl StatusBoard {
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(256);
		Self {
			statuses: Arc::new(Mutex::new(BTreeMap::new())),
			events,
		}
	}

	/// Set a node's status, publishing the transition.
	pub fn set_status(&self, node: &SmartString<LazyCompact>, status: NodeStatus, run: Option<RunId>) {
		{
			let mut statuses = self.statuses.lock().unwrap();
			statuses.insert(node.clone(), (status, run));
		}

		// An error here just means there are no subscribers.
		let _ = self.events.send(StatusEvent {
			node: node.clone(),
			status,
			run,
			at: OffsetDateTime::now_utc(),
		});
	}

	/// Get a node's current status
	pub fn get_status(&self, node: &str) -> Option<(NodeStatus, Option<RunId>)> {
		self.statuses.lock().unwrap().get(node).copied()
	}

	/// Are all listed nodes terminal for the given run?
	///
	/// A node that never left its idle state counts as non-terminal:
	/// it has not yet observed the run.
	pub fn all_terminal(&self, nodes: &[SmartString<LazyCompact>], run: RunId) -> bool {
		let statuses = self.statuses.lock().unwrap();
		nodes.iter().all(|n| match statuses.get(n) {
			Some((status, Some(r))) => *r == run && status.is_terminal(),
			_ => false,
		})
	}

	/// Subscribe to status transitions
	pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
		self.events.subscribe()
	}
}
