use smartstring::{LazyCompact, SmartString};
use std::error::Error;
use thiserror::Error;

/// An error a node strategy can return from any lifecycle step
#[derive(Debug, Error)]
pub enum StepError {
	/// A metadata store call failed
	#[error("metadata store error")]
	Metadata(#[source] Box<dyn Error + Send + Sync>),

	/// A generic I/O error
	#[error("i/o error")]
	IoError(#[from] std::io::Error),

	/// We expected a parameter, but it wasn't there
	#[error("missing parameter `{parameter}`")]
	MissingParameter { parameter: SmartString<LazyCompact> },

	/// A parameter had an unexpected type
	#[error("bad type for parameter `{parameter}`")]
	BadParameterType { parameter: SmartString<LazyCompact> },

	/// An arbitrary error from a user-supplied body
	#[error("node body error")]
	Other(#[from] Box<dyn Error + Send + Sync>),
}

impl StepError {
	/// Wrap a metadata store error
	pub fn metadata(err: impl Error + Send + Sync + 'static) -> Self {
		Self::Metadata(Box::new(err))
	}
}
