use anacostia_metadb::{data::NodeKind, id::RunId};
use anacostia_node::base::{
	NodeBuilder, NodeContext, NodeParameterValue, NodeStrategy, StepError,
};
use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;
use tracing::debug;

pub struct LogMetricBuilder {}

impl NodeBuilder for LogMetricBuilder {
	fn build(
		&self,
		params: &BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
	) -> Result<Box<dyn NodeStrategy>, StepError> {
		let name = match params.get("name") {
			None => {
				return Err(StepError::MissingParameter {
					parameter: "name".into(),
				})
			}
			Some(p) => p.as_str().ok_or(StepError::BadParameterType {
				parameter: "name".into(),
			})?,
		};

		let value = match params.get("value") {
			None => {
				return Err(StepError::MissingParameter {
					parameter: "value".into(),
				})
			}
			Some(p) => p.as_float().ok_or(StepError::BadParameterType {
				parameter: "value".into(),
			})?,
		};

		Ok(Box::new(LogMetric {
			name: name.into(),
			value,
		}))
	}
}

/// An action that logs one fixed metric value each run.
///
/// Mostly a demonstration of an action talking to the store; real
/// deployments log metrics from their own action bodies.
pub struct LogMetric {
	name: SmartString<LazyCompact>,
	value: f64,
}

#[async_trait]
impl NodeStrategy for LogMetric {
	fn kind(&self) -> NodeKind {
		NodeKind::Action
	}

	async fn execute(&self, ctx: &NodeContext, run: RunId) -> Result<bool, StepError> {
		debug!(
			message = "Logging metric",
			node = %ctx.node_name,
			metric = %self.name,
			value = self.value,
			%run,
		);

		ctx.metadb
			.log_metric(&self.name, self.value)
			.await
			.map_err(StepError::metadata)?;

		Ok(true)
	}
}
