//! Request and response bodies shared by senders and receivers

use anacostia_metadb::id::RunId;
use anacostia_node::signal::{Signal, SignalKind};
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// `POST /connect` — a sender introduces itself, once per launch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectRequest {
	/// The identity of the predecessor node this sender carries
	/// signals for, `{pipeline_id}/{node_name}`
	#[schema(value_type = String)]
	pub predecessor_id: SmartString<LazyCompact>,

	/// The sending pipeline's id
	#[schema(value_type = String)]
	pub pipeline_id: SmartString<LazyCompact>,

	/// The id of the root pipeline whose store issues run ids.
	/// A receiver only accepts peers from one run id space: run ids
	/// from two different roots cannot be ordered against each other.
	#[schema(value_type = String)]
	pub run_id_space: SmartString<LazyCompact>,
}

/// Response to `POST /connect`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectResponse {
	/// The receiving pipeline's id
	#[schema(value_type = String)]
	pub receiver_id: SmartString<LazyCompact>,

	pub accepted: bool,

	/// Where this federation's metadata store answers RPC.
	/// Set when the receiver knows one (it is the root, or it has
	/// already learned the root's url).
	pub metadata_store_url: Option<String>,
}

/// `POST /signal` — one signal, minus the receiver-local timestamp
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignalRequest {
	#[schema(value_type = String)]
	pub from: SmartString<LazyCompact>,

	#[schema(value_type = String)]
	pub to: SmartString<LazyCompact>,

	#[schema(value_type = i64)]
	pub run_id: RunId,

	pub kind: SignalKind,
}

impl SignalRequest {
	/// Stamp this request into an inbox-ready signal
	pub fn into_signal(self) -> Signal {
		Signal {
			from: self.from,
			to: self.to,
			run: self.run_id,
			kind: self.kind,
			sent_at: OffsetDateTime::now_utc(),
		}
	}
}

impl From<&Signal> for SignalRequest {
	fn from(value: &Signal) -> Self {
		Self {
			from: value.from.clone(),
			to: value.to.clone(),
			run_id: value.run,
			kind: value.kind,
		}
	}
}

/// `POST /rpc/metadata/run/end`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EndRunRequest {
	#[schema(value_type = i64)]
	pub run_id: RunId,
}

/// `POST /rpc/metadata/entry`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEntryRequest {
	pub location: String,
}

/// `POST /rpc/metadata/metric`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogMetricRequest {
	pub name: String,
	pub value: f64,
}

/// `POST /rpc/metadata/event`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordEventRequest {
	#[schema(value_type = i64)]
	pub run_id: RunId,

	#[schema(value_type = String)]
	pub node: SmartString<LazyCompact>,

	pub status: String,
}

/// `POST /rpc/resource/{node}/put`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PutArtifactRequest {
	/// Path relative to the resource node's artifact root
	pub path: String,

	/// Base64-encoded file contents
	pub data: String,
}

/// Response to `GET /rpc/resource/{node}/fetch`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FetchArtifactResponse {
	/// Base64-encoded file contents
	pub data: String,
}
