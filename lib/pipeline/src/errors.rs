//! Errors from pipeline assembly and launch

use anacostia_metadb::base::errors::{AddNodeError, EndRunError, GetRunError};
use anacostia_node::base::StepError;
use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

/// An error we encounter while assembling a pipeline.
/// Any of these refuses the launch.
#[derive(Debug, Error)]
pub enum PipelineBuildError {
	/// Two nodes share a name
	#[error("duplicate node name `{name}`")]
	DuplicateNode { name: SmartString<LazyCompact> },

	/// A node's name failed validation
	#[error("invalid node name `{name}`")]
	BadName {
		name: SmartString<LazyCompact>,
		#[source]
		source: anacostia_util::names::NameError,
	},

	/// A node references a registered type that doesn't exist
	#[error("node `{node}` has unknown kind `{kind}`")]
	UnknownKind {
		node: SmartString<LazyCompact>,
		kind: SmartString<LazyCompact>,
	},

	/// A strategy builder rejected its parameters
	#[error("could not build node `{node}`")]
	BadStrategy {
		node: SmartString<LazyCompact>,
		#[source]
		source: StepError,
	},

	/// A predecessor reference doesn't resolve within this pipeline
	#[error("node `{node}` references unknown predecessor `{predecessor}`")]
	UnknownPredecessor {
		node: SmartString<LazyCompact>,
		predecessor: SmartString<LazyCompact>,
	},

	/// Two edges connect the same pair of nodes
	#[error("duplicate edge `{from}` -> `{to}`")]
	DuplicateEdge {
		from: SmartString<LazyCompact>,
		to: SmartString<LazyCompact>,
	},

	/// The local graph has a cycle
	#[error("this pipeline has a cycle")]
	HasCycle,

	/// Every pipeline needs exactly one metadata store node
	#[error("pipeline has no metadata store node")]
	NoMetadataStore,

	/// Every pipeline needs exactly one metadata store node
	#[error("pipeline has more than one metadata store node (`{first}`, `{second}`)")]
	MultipleMetadataStores {
		first: SmartString<LazyCompact>,
		second: SmartString<LazyCompact>,
	},

	/// A remote successor url did not parse
	#[error("node `{node}` has a bad remote successor url")]
	BadPeerUrl {
		node: SmartString<LazyCompact>,
		#[source]
		source: reqwest::Error,
	},

	/// `signal_retry_attempts` must be at least one
	#[error("signal_retry_attempts must be at least 1")]
	BadRetryConfig,
}

/// An error we encounter while setting up nodes
#[derive(Debug, Error)]
pub enum LaunchError {
	/// A strategy's setup step failed
	#[error("setup failed for node `{node}`")]
	SetupFailed {
		node: SmartString<LazyCompact>,
		#[source]
		source: StepError,
	},

	/// We could not register a node in the metadata store
	#[error("could not register node `{node}`")]
	RegisterFailed {
		node: SmartString<LazyCompact>,
		#[source]
		source: AddNodeError,
	},
}

/// An error that stops the coordinator.
///
/// The metadata store is the source of ordering truth; losing it
/// aborts the pipeline.
#[derive(Debug, Error)]
pub enum CoordinatorError {
	/// We could not read the active run
	#[error("metadata store failure while polling runs")]
	StorePoll(#[from] GetRunError),

	/// We could not end a run
	#[error("metadata store failure while ending a run")]
	StoreEnd(#[from] EndRunError),
}
