use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;
use thiserror::Error;

use super::{NodeParameterValue, NodeStrategy, StepError};

/// A method that constructs a strategy of one registered type
/// from its config parameters.
pub trait NodeBuilder: Send + Sync {
	fn build(
		&self,
		params: &BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
	) -> Result<Box<dyn NodeStrategy>, StepError>;
}

/// An error we encounter when trying to register a node type
#[derive(Debug, Error)]
pub enum RegisterNodeError {
	/// We tried to register a node type that already exists
	#[error("a node type with this name already exists")]
	AlreadyExists,
}

/// A factory struct that constructs node strategies from the
/// kind names used in pipeline configs.
pub struct NodeDispatcher {
	nodes: BTreeMap<SmartString<LazyCompact>, Box<dyn NodeBuilder>>,
}

impl NodeDispatcher {
	/// Create a new [`NodeDispatcher`]
	pub fn new() -> Self {
		return Self {
			nodes: BTreeMap::new(),
		};
	}

	/// Register a new node type.
	/// `type_name` must be new; we'll return an error if it already exists.
	pub fn register_node(
		&mut self,
		type_name: &str,
		builder: Box<dyn NodeBuilder>,
	) -> Result<(), RegisterNodeError> {
		if self.nodes.contains_key(type_name) {
			return Err(RegisterNodeError::AlreadyExists);
		}

		self.nodes.insert(type_name.into(), builder);
		return Ok(());
	}

	/// Construct a strategy of the given type
	pub fn init_node(
		&self,
		type_name: &str,
		params: &BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
	) -> Option<Result<Box<dyn NodeStrategy>, StepError>> {
		self.nodes.get(type_name).map(|b| b.build(params))
	}
}
