//! The metadata store client api

use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};

use crate::{
	data::{ArtifactEntry, ArtifactState, NodeDescriptor, RunInfo},
	id::{EntryId, RunId},
};

use super::errors::{
	AddNodeError, CreateEntryError, EndRunError, GetEntriesError, GetMetricsError, GetRunError,
	LogMetricError, RecordEventError, StartRunError,
};

/// A generic metadata store.
///
/// Implemented by the SQLite backend (root pipelines) and by the
/// connector's HTTP mirror (leaf pipelines), so nodes never care
/// where their store actually lives.
#[async_trait]
pub trait MetadataClient
where
	Self: Send + Sync,
{
	/// Start a new run.
	///
	/// Assigns the next run id, timestamps the start, and claims all
	/// unclaimed (`new`, no run) artifact entries and unclaimed metrics
	/// for the new run. Fails with [`StartRunError::RunActive`] if a run
	/// is already active.
	async fn start_run(&self) -> Result<RunId, StartRunError>;

	/// End the given run: timestamp the end and demote its `current`
	/// artifact entries to `old`.
	async fn end_run(&self, run: RunId) -> Result<(), EndRunError>;

	/// Get the currently active run, if any
	async fn active_run(&self) -> Result<Option<RunId>, GetRunError>;

	/// Get a run's record, including its node events
	async fn get_run(&self, run: RunId) -> Result<Option<RunInfo>, GetRunError>;

	/// Create a `new` artifact entry at the given location
	async fn create_entry(&self, location: &str) -> Result<EntryId, CreateEntryError>;

	/// Does an entry with this location exist, in any state?
	async fn entry_exists(&self, location: &str) -> Result<bool, GetEntriesError>;

	/// Count artifact entries, optionally filtered by state and run
	async fn get_num_entries(
		&self,
		state: Option<ArtifactState>,
		run: Option<RunId>,
	) -> Result<i64, GetEntriesError>;

	/// List artifact entries, optionally filtered by state and run
	async fn list_entries(
		&self,
		state: Option<ArtifactState>,
		run: Option<RunId>,
	) -> Result<Vec<ArtifactEntry>, GetEntriesError>;

	/// Log one value of the named metric.
	/// Metrics logged outside a run are claimed by the next run.
	async fn log_metric(&self, name: &str, value: f64) -> Result<(), LogMetricError>;

	/// Get all logged values of the named metric.
	/// `run = None` returns values not yet claimed by any run.
	async fn get_metrics(&self, name: &str, run: Option<RunId>)
		-> Result<Vec<f64>, GetMetricsError>;

	/// Register a node. Idempotent: re-registering a name
	/// overwrites its kind and pipeline.
	async fn add_node(&self, node: &NodeDescriptor) -> Result<(), AddNodeError>;

	/// Record a node lifecycle event for a run
	async fn record_node_event(
		&self,
		run: RunId,
		node: &SmartString<LazyCompact>,
		status: &str,
	) -> Result<(), RecordEventError>;
}
