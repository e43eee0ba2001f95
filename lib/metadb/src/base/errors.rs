//! Errors we can encounter when operating on the metadata store.
//!
//! Each fallible operation group gets its own enum. All of them carry a
//! `DbError` variant (local backend) and a `Request` variant (the same
//! contract spoken over a connector), so one client trait serves both.

use std::error::Error;
use thiserror::Error;

/// A transport-level error from a remote metadata store
#[derive(Debug, Error)]
pub enum RequestError {
	/// The peer answered with a non-ok status code
	#[error("request failed with code {code}")]
	GenericHttp {
		code: u16,
		message: Option<String>,
	},

	/// Some other request error (connection refused, timeout, ...)
	#[error("request error")]
	Other(#[source] Box<dyn Error + Send + Sync>),
}

/// An error we can encounter when starting a run
#[derive(Debug, Error)]
pub enum StartRunError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),

	/// A run is already active. At most one run may be active
	/// per root pipeline at a time.
	#[error("a run is already active")]
	RunActive,
}

/// An error we can encounter when ending a run
#[derive(Debug, Error)]
pub enum EndRunError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),

	/// This run does not exist or has already ended
	#[error("run is not active")]
	NotActive,
}

/// An error we can encounter when reading runs
#[derive(Debug, Error)]
pub enum GetRunError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),
}

/// An error we can encounter when creating an artifact entry
#[derive(Debug, Error)]
pub enum CreateEntryError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),

	/// An entry with this location already exists.
	/// This is what makes concurrent detection of the same
	/// artifact idempotent.
	#[error("an entry with this location already exists")]
	AlreadyExists,
}

/// An error we can encounter when counting or listing artifact entries
#[derive(Debug, Error)]
pub enum GetEntriesError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),
}

/// An error we can encounter when logging a metric
#[derive(Debug, Error)]
pub enum LogMetricError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),
}

/// An error we can encounter when reading metrics
#[derive(Debug, Error)]
pub enum GetMetricsError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),
}

/// An error we can encounter when registering a node
#[derive(Debug, Error)]
pub enum AddNodeError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),

	/// The node's name failed validation
	#[error("invalid node name")]
	NameError(#[from] anacostia_util::names::NameError),
}

/// An error we can encounter when recording a node lifecycle event
#[derive(Debug, Error)]
pub enum RecordEventError {
	/// Database error
	#[error("database backend error")]
	DbError(#[from] sqlx::Error),

	/// Transport error
	#[error("request error")]
	Request(#[from] RequestError),
}
