//! The per-pipeline TOML config.
//!
//! A few notes:
//!
//! - All config fields that *can* have a default *should* have a default
//! - Daemon-level settings (log level, shared secret) come from the
//!   environment instead; this file describes one pipeline's topology.

use anacostia_node::base::NodeParameterValue;
use serde::Deserialize;
use smartstring::{LazyCompact, SmartString};
use std::{collections::BTreeMap, error::Error, path::Path};

/// Whether a pipeline owns the run lifecycle or is a callee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineRole {
	Root,
	Leaf,
}

/// One pipeline's configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
	pub pipeline: PipelineSection,
	pub metadata: MetadataSection,

	#[serde(default, rename = "node")]
	pub nodes: Vec<NodeSection>,
}

impl PipelineConfig {
	/// Load a config from a file
	pub fn load_from_file(config_path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
		let config_string = std::fs::read_to_string(config_path)?;
		let config: Self = toml::from_str(&config_string)?;
		return Ok(config);
	}

	/// The address this pipeline's HTTP server binds to
	pub fn server_addr(&self) -> String {
		format!("{}:{}", self.pipeline.host, self.pipeline.port)
	}
}

/// Identity and network settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
	/// This pipeline's id. Must be unique across the federation.
	pub id: SmartString<LazyCompact>,

	pub role: PipelineRole,

	/// Ip to bind to, e.g. `127.0.0.1`
	pub host: SmartString<LazyCompact>,

	/// Port to bind to
	pub port: u16,

	/// The base url peers reach us at. Required when other pipelines
	/// read our metadata store or artifacts over RPC.
	#[serde(default)]
	pub public_url: Option<String>,

	/// TLS cert & key paths. Certificate provisioning and the TLS
	/// listener itself are delegated to a fronting proxy; these are
	/// carried for deployments that terminate TLS in-process.
	#[serde(default)]
	pub tls: Option<TlsSection>,

	/// A run that hasn't finished after this many milliseconds is
	/// forced to SKIPPED and ended. Zero or absent means unbounded.
	#[serde(default)]
	pub run_deadline_ms: Option<u64>,

	/// How many times to attempt a remote signal delivery
	#[serde(default = "PipelineSection::default_retry_attempts")]
	pub signal_retry_attempts: u32,

	/// Delay before the first signal retry, in milliseconds.
	/// Doubles each attempt.
	#[serde(default = "PipelineSection::default_retry_base_ms")]
	pub signal_retry_base_ms: u64,

	/// How often resource monitors poll their backing store,
	/// in milliseconds
	#[serde(default = "PipelineSection::default_monitor_poll_ms")]
	pub monitor_poll_ms: u64,
}

impl PipelineSection {
	fn default_retry_attempts() -> u32 {
		5
	}

	fn default_retry_base_ms() -> u64 {
		100
	}

	fn default_monitor_poll_ms() -> u64 {
		500
	}
}

/// TLS cert & key paths
#[derive(Debug, Clone, Deserialize)]
pub struct TlsSection {
	pub cert: String,
	pub key: String,
}

/// Where this pipeline's metadata store lives
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSection {
	/// Root pipelines: the SQLite database to open.
	/// Should look like `sqlite://meta.sqlite?mode=rwc`
	#[serde(default)]
	pub db_addr: Option<String>,

	/// Leaf pipelines: the root pipeline's base url.
	/// All store operations are proxied there.
	#[serde(default)]
	pub store_url: Option<String>,
}

/// A remote successor of one of our nodes
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSuccessor {
	/// The peer pipeline's base url
	pub url: String,

	/// The successor node's name on that pipeline
	pub node: SmartString<LazyCompact>,
}

/// The lifecycle state a node starts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitState {
	/// Idle, ready for the first run
	Normal,

	/// Parked in PAUSED until an unpause request arrives.
	/// Useful when a pipeline should launch cold.
	Paused,
}

impl Default for InitState {
	fn default() -> Self {
		Self::Normal
	}
}

/// A metric trigger on the metadata store node
#[derive(Debug, Clone, Deserialize)]
pub struct MetricTrigger {
	/// The metric to watch
	pub name: SmartString<LazyCompact>,

	/// Fire when the largest unclaimed value exceeds this
	pub threshold: f64,
}

/// One node
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
	/// This node's name. Unique within the pipeline.
	pub name: SmartString<LazyCompact>,

	/// The registered node type that implements this node
	pub kind: SmartString<LazyCompact>,

	/// Local predecessors, by node name
	#[serde(default)]
	pub predecessors: Vec<SmartString<LazyCompact>>,

	/// Remote predecessors, by federation-wide identity
	/// (`{pipeline_id}/{node_name}`)
	#[serde(default)]
	pub remote_predecessors: Vec<SmartString<LazyCompact>>,

	#[serde(default)]
	pub remote_successors: Vec<RemoteSuccessor>,

	/// Hold this node in INITIALIZING until every remote successor
	/// has completed its handshake
	#[serde(default)]
	pub wait_for_connection: bool,

	/// Resource nodes: fire a run once this many `new` artifact
	/// entries are waiting
	#[serde(default)]
	pub trigger_threshold: Option<i64>,

	/// Store nodes: fire a run on a metric threshold
	#[serde(default)]
	pub metric: Option<MetricTrigger>,

	/// The state this node starts in
	#[serde(default)]
	pub init_state: InitState,

	/// Kind-specific parameters
	#[serde(default)]
	pub params: BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_root_config() {
		let config: PipelineConfig = toml::from_str(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 8080
			public_url = "http://127.0.0.1:8080"
			run_deadline_ms = 60000

			[metadata]
			db_addr = "sqlite://meta.sqlite?mode=rwc"

			[[node]]
			name = "store"
			kind = "MetadataStore"
			metric = { name = "loss", threshold = 0.4 }

			[[node]]
			name = "watch"
			kind = "FilesystemResource"
			trigger_threshold = 1
			params = { path = "./data" }

			[[node]]
			name = "train"
			kind = "Noop"
			predecessors = ["watch"]
			wait_for_connection = true

			[[node.remote_successors]]
			url = "http://127.0.0.1:8081"
			node = "evaluate"
			"#,
		)
		.unwrap();

		assert_eq!(config.pipeline.id, "root");
		assert_eq!(config.pipeline.role, PipelineRole::Root);
		assert_eq!(config.server_addr(), "127.0.0.1:8080");
		assert_eq!(config.pipeline.run_deadline_ms, Some(60000));
		assert_eq!(config.pipeline.signal_retry_attempts, 5);
		assert_eq!(config.nodes.len(), 3);

		let store = &config.nodes[0];
		assert_eq!(store.metric.as_ref().unwrap().name, "loss");

		let watch = &config.nodes[1];
		assert_eq!(watch.trigger_threshold, Some(1));
		assert_eq!(watch.params.get("path").unwrap().as_str(), Some("./data"));

		let train = &config.nodes[2];
		assert!(train.wait_for_connection);
		assert_eq!(train.predecessors, vec!["watch"]);
		assert_eq!(train.remote_successors[0].node, "evaluate");
	}

	#[test]
	fn parse_leaf_config() {
		let config: PipelineConfig = toml::from_str(
			r#"
			[pipeline]
			id = "leaf"
			role = "leaf"
			host = "127.0.0.1"
			port = 8081

			[metadata]
			store_url = "http://127.0.0.1:8080"

			[[node]]
			name = "store"
			kind = "MetadataStore"

			[[node]]
			name = "evaluate"
			kind = "Noop"
			remote_predecessors = ["root/train"]
			init_state = "paused"
			"#,
		)
		.unwrap();

		assert_eq!(config.pipeline.role, PipelineRole::Leaf);
		assert_eq!(
			config.metadata.store_url.as_deref(),
			Some("http://127.0.0.1:8080")
		);
		assert_eq!(
			config.nodes[1].remote_predecessors,
			vec!["root/train"]
		);
		assert_eq!(config.nodes[0].init_state, InitState::Normal);
		assert_eq!(config.nodes[1].init_state, InitState::Paused);
	}
}
