use anacostia_metadb::{data::NodeKind, id::RunId};
use anacostia_node::base::{
	NodeBuilder, NodeContext, NodeParameterValue, NodeStrategy, StepError,
};
use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;
use tracing::debug;

pub struct StoreBuilder {}

impl NodeBuilder for StoreBuilder {
	fn build(
		&self,
		_params: &BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
	) -> Result<Box<dyn NodeStrategy>, StepError> {
		Ok(Box::new(StoreNode {}))
	}
}

/// The metadata store's node-shaped face.
///
/// The store itself is a service every node reaches through its
/// context; this node represents it in the DAG so runs have a
/// well-defined origin. Its body persists the run's state, which the
/// SQLite backend does on every write, so there is nothing left to do
/// here.
pub struct StoreNode {}

#[async_trait]
impl NodeStrategy for StoreNode {
	fn kind(&self) -> NodeKind {
		NodeKind::MetadataStore
	}

	async fn execute(&self, ctx: &NodeContext, run: RunId) -> Result<bool, StepError> {
		debug!(message = "Store node checkpoint", node = %ctx.node_name, %run);
		Ok(true)
	}
}
