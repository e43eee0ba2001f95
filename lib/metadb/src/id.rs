#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use utoipa::ToSchema;

/// The id of one end-to-end traversal of the DAG.
///
/// Run ids are assigned by the root pipeline's metadata store and are
/// strictly monotonic: a larger id means a later run.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct RunId {
	id: i64,
}

impl RunId {
	pub fn as_i64(&self) -> i64 {
		self.id
	}
}

impl From<i64> for RunId {
	fn from(value: i64) -> Self {
		Self { id: value }
	}
}

impl From<RunId> for i64 {
	fn from(value: RunId) -> Self {
		value.id
	}
}

impl Display for RunId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.id.fmt(f)
	}
}

/// The id of an artifact entry in the metadata store.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct EntryId {
	id: i64,
}

impl From<i64> for EntryId {
	fn from(value: i64) -> Self {
		Self { id: value }
	}
}

impl From<EntryId> for i64 {
	fn from(value: EntryId) -> Self {
		value.id
	}
}

impl Display for EntryId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.id.fmt(f)
	}
}
