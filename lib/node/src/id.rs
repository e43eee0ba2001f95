#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::fmt::Display;

/// The id of a pipeline process
#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PipelineId(SmartString<LazyCompact>);

impl PipelineId {
	pub fn new(id: &str) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for PipelineId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

impl From<&str> for PipelineId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

/// A node's federation-wide identity.
///
/// Node names are unique within a pipeline; joined with the pipeline id
/// they are unique across a federation. This is the `from` field of
/// every signal.
pub fn identity(pipeline: &PipelineId, node: &str) -> SmartString<LazyCompact> {
	let mut out = SmartString::from(pipeline.as_str());
	out.push('/');
	out.push_str(node);
	out
}
