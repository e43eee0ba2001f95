use anacostia_metadb::{data::NodeKind, id::RunId};
use anacostia_node::base::{
	NodeBuilder, NodeContext, NodeParameterValue, NodeStrategy, StepError,
};
use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;

pub struct NoopBuilder {}

impl NodeBuilder for NoopBuilder {
	fn build(
		&self,
		_params: &BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
	) -> Result<Box<dyn NodeStrategy>, StepError> {
		Ok(Box::new(Noop {}))
	}
}

/// An action that does nothing, successfully.
/// Useful as a placeholder while sketching a pipeline, and in tests.
pub struct Noop {}

#[async_trait]
impl NodeStrategy for Noop {
	fn kind(&self) -> NodeKind {
		NodeKind::Action
	}

	async fn execute(&self, _ctx: &NodeContext, _run: RunId) -> Result<bool, StepError> {
		Ok(true)
	}
}
