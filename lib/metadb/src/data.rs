//! Records stored by the metadata store

use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::id::{EntryId, RunId};

/// The base kind of a pipeline node, as registered in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
	/// The store node itself
	MetadataStore,

	/// A node that watches an external resource
	Resource,

	/// A node that runs a user-supplied body
	Action,
}

impl NodeKind {
	/// How this kind is written in the `nodes` table
	pub fn as_db_str(&self) -> &'static str {
		match self {
			Self::MetadataStore => "metadata_store",
			Self::Resource => "resource",
			Self::Action => "action",
		}
	}

	/// Inverse of [`NodeKind::as_db_str`]
	pub fn from_db_str(s: &str) -> Option<Self> {
		match s {
			"metadata_store" => Some(Self::MetadataStore),
			"resource" => Some(Self::Resource),
			"action" => Some(Self::Action),
			_ => None,
		}
	}
}

/// The state of an artifact entry.
///
/// Entries only ever move forward:
/// `new` (detected) -> `current` (claimed by a run) -> `old` (consumed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
	New,
	Current,
	Old,
}

impl ArtifactState {
	/// How this state is written in the `artifacts` table
	pub fn as_db_str(&self) -> &'static str {
		match self {
			Self::New => "new",
			Self::Current => "current",
			Self::Old => "old",
		}
	}

	/// Inverse of [`ArtifactState::as_db_str`]
	pub fn from_db_str(s: &str) -> Option<Self> {
		match s {
			"new" => Some(Self::New),
			"current" => Some(Self::Current),
			"old" => Some(Self::Old),
			_ => None,
		}
	}
}

/// One artifact entry: an external object the pipeline consumes or produces.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactEntry {
	#[schema(value_type = i64)]
	pub id: EntryId,

	/// A stable identifier for the external object
	/// (for filesystem resources, the absolute path)
	#[schema(value_type = String)]
	pub location: SmartString<LazyCompact>,

	pub state: ArtifactState,

	/// The run this entry was claimed by, if any
	#[schema(value_type = Option<i64>)]
	pub run_id: Option<RunId>,

	#[schema(value_type = String)]
	pub created_at: OffsetDateTime,
}

/// A node lifecycle event recorded for a run.
/// These are the run's per-node timings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeEvent {
	#[schema(value_type = String)]
	pub node: SmartString<LazyCompact>,

	/// The status the node transitioned to
	#[schema(value_type = String)]
	pub status: SmartString<LazyCompact>,

	#[schema(value_type = String)]
	pub at: OffsetDateTime,
}

/// One run of the full DAG
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunInfo {
	#[schema(value_type = i64)]
	pub run_id: RunId,

	#[schema(value_type = String)]
	pub start_time: OffsetDateTime,

	/// Set once every node reached a terminal state for this run
	#[schema(value_type = Option<String>)]
	pub end_time: Option<OffsetDateTime>,

	/// Node lifecycle events recorded during this run,
	/// ordered by timestamp
	pub events: Vec<NodeEvent>,
}

/// A node's one-time registration record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeDescriptor {
	#[schema(value_type = String)]
	pub name: SmartString<LazyCompact>,

	pub kind: NodeKind,

	/// The pipeline this node belongs to
	#[schema(value_type = String)]
	pub pipeline_id: SmartString<LazyCompact>,
}
