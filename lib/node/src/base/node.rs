use anacostia_metadb::{base::client::MetadataClient, data::NodeKind, id::RunId};
use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use super::{NodeParameterValue, StepError};
use crate::PipelineId;

/// Everything a strategy may reach during a lifecycle step.
///
/// Cross-node state goes through the metadata store only; strategies
/// never see other nodes. Cloned between a node's engine and its
/// resource monitor.
#[derive(Clone)]
pub struct NodeContext {
	/// The pipeline this node runs in
	pub pipeline_id: PipelineId,

	/// This node's name
	pub node_name: SmartString<LazyCompact>,

	/// The pipeline's metadata store.
	/// On a leaf pipeline this speaks HTTP to the root's store.
	pub metadb: Arc<dyn MetadataClient>,

	/// This node's parameters, from the pipeline config
	pub params: BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
}

/// Kind-specific node behaviour.
///
/// The lifecycle engine drives every node the same way; a strategy
/// only fills in what happens inside each state. All methods take
/// `&self`: a strategy that keeps state manages its own interior
/// mutability.
#[async_trait]
pub trait NodeStrategy: Send + Sync {
	/// Which base kind this strategy implements
	fn kind(&self) -> NodeKind;

	/// One-time setup, run before the pipeline launches
	async fn setup(&self, _ctx: &NodeContext) -> Result<(), StepError> {
		Ok(())
	}

	/// Pre-execute work for a run.
	/// Must not block on anything but the metadata store.
	async fn prepare(&self, _ctx: &NodeContext, _run: RunId) -> Result<(), StepError> {
		Ok(())
	}

	/// The node body. Returning `Ok(false)` or `Err(_)` fails the
	/// node for this run.
	async fn execute(&self, ctx: &NodeContext, run: RunId) -> Result<bool, StepError>;

	/// Resource kinds: report currently visible artifact locations.
	/// Called by the resource monitor, never by the engine.
	async fn scan(&self, _ctx: &NodeContext) -> Result<Vec<SmartString<LazyCompact>>, StepError> {
		Ok(Vec::new())
	}

	/// Resource kinds: the directory artifact fetches are served from
	fn artifact_root(&self) -> Option<PathBuf> {
		None
	}

	/// One-time teardown
	async fn shutdown(&self, _ctx: &NodeContext) -> Result<(), StepError> {
		Ok(())
	}
}
