//! Pipeline assembly and launch

use anacostia_connector::{ConnectorSender, PeerRegistry, RetryConfig};
use anacostia_metadb::{
	base::client::MetadataClient,
	data::{NodeDescriptor, NodeKind},
	id::RunId,
};
use anacostia_node::{
	base::{NodeContext, NodeDispatcher, NodeStrategy},
	engine::{LocalSuccessor, NodeEngine, NodeFlags, RemoteSignalSender},
	identity,
	signal::{Signal, SignalInbox, SignalKind},
	status::{NodeStatus, StatusBoard},
	PipelineId,
};
use anacostia_util::graph::Graph;
use smartstring::{LazyCompact, SmartString};
use std::{
	collections::{BTreeMap, BTreeSet},
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	time::{Duration, Instant},
};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
	config::{InitState, MetricTrigger, PipelineConfig, PipelineRole},
	errors::{LaunchError, PipelineBuildError},
	monitor,
};

/// How often the launcher re-checks pending handshakes, in milliseconds
const HANDSHAKE_POLL_AWAIT_MS: u64 = 250;

/// One assembled node, with everything its engine and monitor share
pub(crate) struct NodeSlot {
	pub name: SmartString<LazyCompact>,
	pub kind: NodeKind,
	pub strategy: Arc<dyn NodeStrategy>,
	pub ctx: NodeContext,
	pub inbox: Arc<tokio::sync::Mutex<SignalInbox>>,
	pub flags: NodeFlags,

	pub wait_for_connection: bool,

	/// Local predecessors, by name
	pub local_predecessors: Vec<SmartString<LazyCompact>>,

	/// Remote predecessors, by federation-wide identity
	pub remote_predecessors: Vec<SmartString<LazyCompact>>,

	/// Local successors, by name
	pub local_successors: Vec<SmartString<LazyCompact>>,

	/// One sender per remote successor
	pub senders: Vec<Arc<ConnectorSender>>,

	pub trigger_threshold: Option<i64>,
	pub metric: Option<MetricTrigger>,
}

/// The run this pipeline is currently participating in
#[derive(Clone, Copy)]
struct ActiveRun {
	run: RunId,
	observed_at: Instant,
}

/// A pipeline: a validated node graph plus everything needed to run it.
///
/// Owns its nodes. Engines, monitors, and the coordinator all borrow
/// through shared handles created at assembly.
pub struct Pipeline {
	pub id: PipelineId,
	pub role: PipelineRole,
	pub board: StatusBoard,
	pub registry: Arc<PeerRegistry>,
	pub metadb: Arc<dyn MetadataClient>,

	pub(crate) nodes: Vec<NodeSlot>,

	/// Node indices in setup order: the store first, then resources,
	/// then actions, topologically within each group.
	setup_order: Vec<usize>,

	pub(crate) run_deadline: Option<Duration>,
	monitor_poll: Duration,

	/// The url peers use for our store's RPC mirror, if we have one
	store_url: Option<String>,

	/// Stops monitors first at teardown
	pub(crate) monitors_stop: Arc<AtomicBool>,

	/// Stops the coordinator
	pub(crate) shutdown: Arc<AtomicBool>,

	/// Runs we have already announced locally and forwarded
	announced: Mutex<BTreeSet<RunId>>,

	/// The run currently in flight, from this pipeline's viewpoint
	active: Mutex<Option<ActiveRun>>,

	/// Engine, monitor, and handshake tasks, in spawn order
	tasks: Mutex<Vec<(SmartString<LazyCompact>, JoinHandle<()>)>>,
}

impl Pipeline {
	//
	// MARK: Assembly
	//

	/// Assemble a pipeline from its config.
	///
	/// Verifies the topology: exactly one metadata store node, all
	/// predecessor references resolve, no duplicate edges, and the
	/// local graph is acyclic.
	pub fn build(
		config: &PipelineConfig,
		dispatcher: &NodeDispatcher,
		metadb: Arc<dyn MetadataClient>,
		secret: &str,
	) -> Result<Self, PipelineBuildError> {
		if config.pipeline.signal_retry_attempts == 0 {
			return Err(PipelineBuildError::BadRetryConfig);
		}

		let pipeline_id = PipelineId::new(&config.pipeline.id);

		// The run id space names the store that issues run ids: the
		// root's public url. Every pipeline in a federation points at
		// the same store, so every sender carries the same space and
		// receivers can refuse senders from a second federation.
		let run_id_space: SmartString<LazyCompact> = match config.pipeline.role {
			PipelineRole::Root => config
				.pipeline
				.public_url
				.as_deref()
				.unwrap_or(config.pipeline.id.as_str())
				.into(),
			PipelineRole::Leaf => config
				.metadata
				.store_url
				.as_deref()
				.unwrap_or(config.pipeline.id.as_str())
				.into(),
		};

		let retry = RetryConfig {
			max_attempts: config.pipeline.signal_retry_attempts,
			base_delay_ms: config.pipeline.signal_retry_base_ms,
		};

		//
		// Build all node slots
		//

		let mut nodes: Vec<NodeSlot> = Vec::new();
		let mut name_to_idx: BTreeMap<SmartString<LazyCompact>, usize> = BTreeMap::new();

		for node in &config.nodes {
			match anacostia_util::names::check_name(&node.name) {
				Ok(()) => {}
				Err(source) => {
					return Err(PipelineBuildError::BadName {
						name: node.name.clone(),
						source,
					})
				}
			}

			if name_to_idx.contains_key(&node.name) {
				return Err(PipelineBuildError::DuplicateNode {
					name: node.name.clone(),
				});
			}

			let strategy = match dispatcher.init_node(&node.kind, &node.params) {
				None => {
					return Err(PipelineBuildError::UnknownKind {
						node: node.name.clone(),
						kind: node.kind.clone(),
					})
				}
				Some(Err(source)) => {
					return Err(PipelineBuildError::BadStrategy {
						node: node.name.clone(),
						source,
					})
				}
				Some(Ok(strategy)) => strategy,
			};
			let strategy: Arc<dyn NodeStrategy> = Arc::from(strategy);

			let mut senders = Vec::new();
			for succ in &node.remote_successors {
				let sender = ConnectorSender::new(
					succ.url.as_str(),
					secret,
					&succ.node,
					&identity(&pipeline_id, &node.name),
					pipeline_id.as_str(),
					&run_id_space,
					retry,
				)
				.map_err(|source| PipelineBuildError::BadPeerUrl {
					node: node.name.clone(),
					source,
				})?;
				senders.push(Arc::new(sender));
			}

			let flags = NodeFlags::new();
			if node.init_state == InitState::Paused {
				flags.pause();
			}

			name_to_idx.insert(node.name.clone(), nodes.len());
			nodes.push(NodeSlot {
				name: node.name.clone(),
				kind: strategy.kind(),
				ctx: NodeContext {
					pipeline_id: pipeline_id.clone(),
					node_name: node.name.clone(),
					metadb: metadb.clone(),
					params: node.params.clone(),
				},
				strategy,
				inbox: Arc::new(tokio::sync::Mutex::new(SignalInbox::new())),
				flags,
				wait_for_connection: node.wait_for_connection,
				local_predecessors: node.predecessors.clone(),
				remote_predecessors: node.remote_predecessors.clone(),
				local_successors: Vec::new(),
				senders,
				trigger_threshold: node.trigger_threshold,
				metric: node.metric.clone(),
			});
		}

		//
		// Exactly one metadata store node
		//

		let mut store = None;
		for slot in &nodes {
			if slot.kind == NodeKind::MetadataStore {
				match store {
					None => store = Some(slot.name.clone()),
					Some(ref first) => {
						return Err(PipelineBuildError::MultipleMetadataStores {
							first: first.clone(),
							second: slot.name.clone(),
						})
					}
				}
			}
		}
		if store.is_none() {
			return Err(PipelineBuildError::NoMetadataStore);
		}

		//
		// Local edges: resolvable, no duplicates, acyclic
		//

		let mut graph = Graph::new();
		let graph_idx: Vec<_> = nodes.iter().map(|n| graph.add_node(n.name.clone())).collect();

		for (idx, node) in config.nodes.iter().enumerate() {
			for pred in &node.predecessors {
				let pred_idx = match name_to_idx.get(pred) {
					None => {
						return Err(PipelineBuildError::UnknownPredecessor {
							node: node.name.clone(),
							predecessor: pred.clone(),
						})
					}
					Some(x) => *x,
				};

				if graph.has_edge(graph_idx[pred_idx], graph_idx[idx]) {
					return Err(PipelineBuildError::DuplicateEdge {
						from: pred.clone(),
						to: node.name.clone(),
					});
				}
				graph.add_edge(graph_idx[pred_idx], graph_idx[idx], ());
			}
		}

		let topo = match graph.topo_order() {
			None => return Err(PipelineBuildError::HasCycle),
			Some(x) => x,
		};

		// Fill local successor lists from the edges
		for (from, to, _) in graph.iter_edges() {
			let to_name = nodes[usize::from(to)].name.clone();
			nodes[usize::from(from)].local_successors.push(to_name);
		}

		// Setup order: the store first, then resources, then actions,
		// topologically within each group.
		let mut setup_order = Vec::new();
		for kind in [NodeKind::MetadataStore, NodeKind::Resource, NodeKind::Action] {
			for idx in &topo {
				let idx = usize::from(*idx);
				if nodes[idx].kind == kind {
					setup_order.push(idx);
				}
			}
		}

		let store_url = match config.pipeline.role {
			PipelineRole::Root => config.pipeline.public_url.clone(),
			PipelineRole::Leaf => config.metadata.store_url.clone(),
		};

		Ok(Self {
			id: pipeline_id,
			role: config.pipeline.role,
			board: StatusBoard::new(),
			registry: Arc::new(PeerRegistry::new()),
			metadb,
			nodes,
			setup_order,
			run_deadline: config
				.pipeline
				.run_deadline_ms
				.filter(|ms| *ms > 0)
				.map(Duration::from_millis),
			monitor_poll: Duration::from_millis(config.pipeline.monitor_poll_ms),
			store_url,
			monitors_stop: Arc::new(AtomicBool::new(false)),
			shutdown: Arc::new(AtomicBool::new(false)),
			announced: Mutex::new(BTreeSet::new()),
			active: Mutex::new(None),
			tasks: Mutex::new(Vec::new()),
		})
	}

	//
	// MARK: Setup
	//

	/// Set up every node, in setup order.
	///
	/// Handshake tasks for all senders start first; a node with
	/// `wait_for_connection` parks here until its own senders are
	/// live. With the required launch ordering (successor pipelines
	/// first) this terminates; otherwise it stalls until the peer
	/// becomes reachable.
	pub async fn setup_nodes(&self) -> Result<(), LaunchError> {
		// Everyone starts in INITIALIZING
		for slot in &self.nodes {
			self.board.set_status(&slot.name, NodeStatus::Initializing, None);
		}

		// Kick off all handshakes
		for slot in &self.nodes {
			for sender in &slot.senders {
				let sender = sender.clone();
				let stop = self.shutdown.clone();
				let handle = tokio::spawn(async move {
					while !stop.load(Ordering::SeqCst) {
						match sender.handshake().await {
							Ok(_) => return,
							Err(error) => {
								debug!(
									message = "Handshake attempt failed, will retry",
									peer = %sender.peer_url(),
									?error
								);
							}
						}
						tokio::time::sleep(Duration::from_millis(HANDSHAKE_POLL_AWAIT_MS)).await;
					}
				});

				self.tasks
					.lock()
					.unwrap()
					.push((slot.name.clone(), handle));
			}
		}

		for idx in &self.setup_order {
			let slot = &self.nodes[*idx];

			debug!(message = "Setting up node", node = %slot.name);
			match slot.strategy.setup(&slot.ctx).await {
				Ok(()) => {}
				Err(source) => {
					return Err(LaunchError::SetupFailed {
						node: slot.name.clone(),
						source,
					})
				}
			}

			match self
				.metadb
				.add_node(&NodeDescriptor {
					name: slot.name.clone(),
					kind: slot.kind,
					pipeline_id: self.id.as_str().into(),
				})
				.await
			{
				Ok(()) => {}
				Err(source) => {
					return Err(LaunchError::RegisterFailed {
						node: slot.name.clone(),
						source,
					})
				}
			}

			if slot.wait_for_connection {
				info!(
					message = "Waiting for remote successor handshakes",
					node = %slot.name,
				);
				while !slot.senders.iter().all(|s| s.is_live()) {
					if self.shutdown.load(Ordering::SeqCst) {
						return Ok(());
					}
					tokio::time::sleep(Duration::from_millis(HANDSHAKE_POLL_AWAIT_MS)).await;
				}
			}
		}

		info!(message = "Pipeline setup complete", pipeline = %self.id);
		return Ok(());
	}

	//
	// MARK: Launch
	//

	/// Spawn every node's engine and every resource monitor.
	pub fn launch_nodes(&self) {
		let mut tasks = self.tasks.lock().unwrap();

		for idx in &self.setup_order {
			let slot = &self.nodes[*idx];

			// Predecessor identities the engine waits on each run
			let mut predecessors: Vec<SmartString<LazyCompact>> = slot
				.local_predecessors
				.iter()
				.map(|name| identity(&self.id, name))
				.collect();
			predecessors.extend(slot.remote_predecessors.iter().cloned());

			let local_successors = slot
				.local_successors
				.iter()
				.map(|name| LocalSuccessor {
					node: name.clone(),
					inbox: self.inbox_of(name).unwrap(),
				})
				.collect();

			let remote_successors: Vec<Arc<dyn RemoteSignalSender>> = slot
				.senders
				.iter()
				.map(|s| s.clone() as Arc<dyn RemoteSignalSender>)
				.collect();

			// Nodes with remote predecessors wait for those peers
			// to handshake before going idle
			let connection_gate: Option<Box<dyn Fn() -> bool + Send + Sync>> =
				if slot.remote_predecessors.is_empty() {
					None
				} else {
					let registry = self.registry.clone();
					let peers = slot.remote_predecessors.clone();
					Some(Box::new(move || {
						peers.iter().all(|p| registry.is_connected(p))
					}))
				};

			let engine = NodeEngine {
				ctx: slot.ctx.clone(),
				strategy: slot.strategy.clone(),
				inbox: slot.inbox.clone(),
				board: self.board.clone(),
				flags: slot.flags.clone(),
				predecessors,
				local_successors,
				remote_successors,
				deadline: self.run_deadline,
				connection_gate,
			};

			debug!(message = "Launching node engine", node = %slot.name);
			tasks.push((slot.name.clone(), tokio::spawn(engine.run())));

			if slot.kind == NodeKind::Resource {
				let handle = tokio::spawn(monitor::resource_monitor(
					slot.ctx.clone(),
					slot.strategy.clone(),
					self.board.clone(),
					self.monitors_stop.clone(),
					slot.trigger_threshold.unwrap_or(1),
					self.monitor_poll,
				));
				tasks.push((slot.name.clone(), handle));
			}

			if let Some(metric) = &slot.metric {
				let handle = tokio::spawn(monitor::metric_watcher(
					slot.ctx.clone(),
					self.board.clone(),
					self.monitors_stop.clone(),
					metric.clone(),
					self.monitor_poll,
				));
				tasks.push((slot.name.clone(), handle));
			}
		}

		info!(
			message = "Pipeline launched",
			pipeline = %self.id,
			nodes = self.nodes.len(),
		);
	}

	//
	// MARK: Runs
	//

	/// Announce a run to this pipeline: deliver `run_start` to every
	/// local inbox and forward it through every sender, so connected
	/// successor pipelines hear about it too. Idempotent by run id.
	pub async fn announce_run(&self, run: RunId) {
		{
			let mut announced = self.announced.lock().unwrap();
			if !announced.insert(run) {
				return;
			}

			let mut active = self.active.lock().unwrap();
			if active.is_none() {
				*active = Some(ActiveRun {
					run,
					observed_at: Instant::now(),
				});
			}
		}

		info!(message = "Announcing run", pipeline = %self.id, %run);

		for slot in &self.nodes {
			slot.inbox.lock().await.deliver(Signal {
				from: self.id.as_str().into(),
				to: slot.name.clone(),
				run,
				kind: SignalKind::RunStart,
				sent_at: OffsetDateTime::now_utc(),
			});
		}

		for slot in &self.nodes {
			for sender in &slot.senders {
				let signal = Signal {
					from: self.id.as_str().into(),
					to: sender.target_node().into(),
					run,
					kind: SignalKind::RunStart,
					sent_at: OffsetDateTime::now_utc(),
				};
				match sender.deliver(&signal).await {
					Ok(()) => {}
					Err(error) => {
						warn!(
							message = "Could not forward run start to peer",
							peer = %sender.peer_url(),
							%run,
							?error
						);
					}
				}
			}
		}
	}

	/// The run this pipeline currently considers in flight
	pub(crate) fn active_run_view(&self) -> Option<(RunId, Instant)> {
		(*self.active.lock().unwrap()).map(|a| (a.run, a.observed_at))
	}

	/// Forget a finished run: clear inboxes through it and open the
	/// slot for the next one.
	pub(crate) async fn finish_run(&self, run: RunId) {
		for slot in &self.nodes {
			slot.inbox.lock().await.clear_through(run);
		}

		{
			// Same lock order as announce_run
			let mut announced = self.announced.lock().unwrap();
			let mut active = self.active.lock().unwrap();
			*announced = announced.split_off(&RunId::from(i64::from(run) + 1));
			*active = None;
		}

		debug!(message = "Run finished locally", pipeline = %self.id, %run);
	}

	/// Force every non-terminal node out of the given run
	pub(crate) fn cancel_run(&self, run: RunId) {
		for slot in &self.nodes {
			slot.flags.cancel_run(run);
		}
	}

	//
	// MARK: Handler plumbing
	//

	/// The inbox of a local node, if it exists
	pub fn inbox_of(&self, node: &str) -> Option<Arc<tokio::sync::Mutex<SignalInbox>>> {
		self.nodes
			.iter()
			.find(|slot| slot.name == node)
			.map(|slot| slot.inbox.clone())
	}

	/// Deliver a signal arriving over HTTP. Returns `false` if the
	/// target node doesn't exist here.
	pub async fn deliver_signal(&self, signal: Signal) -> bool {
		let inbox = match self.inbox_of(&signal.to) {
			None => return false,
			Some(x) => x,
		};

		let run = signal.run;
		let is_run_start = signal.kind == SignalKind::RunStart;

		let fresh = inbox.lock().await.deliver(signal);
		if fresh {
			debug!(message = "Signal delivered", %run, pipeline = %self.id);
		}

		// A run_start addressed to any of our nodes is news for the
		// whole pipeline: fan it out and pass it along.
		if is_run_start {
			self.announce_run(run).await;
		}

		return true;
	}

	/// Handle a connector handshake
	pub fn handle_connect(
		&self,
		request: &anacostia_connector::wire::ConnectRequest,
	) -> anacostia_connector::wire::ConnectResponse {
		let accepted = self.registry.register(request);
		anacostia_connector::wire::ConnectResponse {
			receiver_id: self.id.as_str().into(),
			accepted,
			metadata_store_url: self.store_url.clone(),
		}
	}

	/// Pause or unpause one node. Returns `false` if it doesn't exist.
	pub fn set_node_paused(&self, node: &str, paused: bool) -> bool {
		match self.nodes.iter().find(|slot| slot.name == node) {
			None => false,
			Some(slot) => {
				if paused {
					slot.flags.pause();
				} else {
					slot.flags.unpause();
				}
				true
			}
		}
	}

	/// Resource nodes: where artifact fetches are served from
	pub fn artifact_root(&self, node: &str) -> Option<PathBuf> {
		self.nodes
			.iter()
			.find(|slot| slot.name == node)
			.and_then(|slot| slot.strategy.artifact_root())
	}

	/// Every node's name, kind, and current status, for the dashboard
	pub fn nodes_summary(&self) -> Vec<(SmartString<LazyCompact>, NodeKind)> {
		self.nodes
			.iter()
			.map(|slot| (slot.name.clone(), slot.kind))
			.collect()
	}

	/// Every edge, local and remote, as `(source, target)` ids.
	/// Remote targets are `{peer_url}/{node}`.
	pub fn edges_summary(&self) -> Vec<(String, String)> {
		let mut out = Vec::new();
		for slot in &self.nodes {
			for succ in &slot.local_successors {
				out.push((slot.name.to_string(), succ.to_string()));
			}
			for sender in &slot.senders {
				out.push((
					slot.name.to_string(),
					format!("{}{}", sender.peer_url(), sender.target_node()),
				));
			}
		}
		out
	}

	/// The names of every local node
	pub fn node_names(&self) -> Vec<SmartString<LazyCompact>> {
		self.nodes.iter().map(|slot| slot.name.clone()).collect()
	}

	//
	// MARK: Teardown
	//

	/// Stop monitors, cancel the active run, shut every engine down,
	/// and drain tasks in reverse setup order.
	pub async fn teardown(&self) {
		info!(message = "Tearing down pipeline", pipeline = %self.id);

		self.monitors_stop.store(true, Ordering::SeqCst);

		if let Some((run, _)) = self.active_run_view() {
			self.cancel_run(run);
		}

		self.shutdown.store(true, Ordering::SeqCst);
		for slot in &self.nodes {
			slot.flags.request_shutdown();
		}

		let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
		tasks.reverse();
		for (node, handle) in tasks {
			match handle.await {
				Ok(()) => {}
				Err(error) => {
					warn!(message = "Task panicked during teardown", %node, ?error);
				}
			}
		}

		info!(message = "Pipeline teardown complete", pipeline = %self.id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::errors::PipelineBuildError;
	use anacostia_metadb::sqlite::SqliteMetadataClient;
	use std::path::PathBuf;

	async fn test_store(file: &str) -> Arc<dyn MetadataClient> {
		let file_path = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/")).join(file);
		if file_path.exists() {
			std::fs::remove_file(&file_path).unwrap();
		}

		Arc::new(
			SqliteMetadataClient::open(&format!("sqlite://{}?mode=rwc", file_path.display()))
				.await
				.unwrap(),
		)
	}

	fn dispatcher() -> NodeDispatcher {
		let mut dispatcher = NodeDispatcher::new();
		anacostia_nodes_basic::register(&mut dispatcher).unwrap();
		dispatcher
	}

	fn config(nodes_toml: &str) -> PipelineConfig {
		toml::from_str(&format!(
			r#"
			[pipeline]
			id = "root"
			role = "root"
			host = "127.0.0.1"
			port = 0

			[metadata]
			db_addr = "unused"

			{nodes_toml}
			"#,
		))
		.unwrap()
	}

	#[tokio::test]
	async fn build_valid_pipeline() {
		let store = test_store("test_build_valid.sqlite").await;
		let config = config(
			r#"
			[[node]]
			name = "train"
			kind = "Noop"
			predecessors = ["watch"]

			[[node]]
			name = "watch"
			kind = "FilesystemResource"
			params = { path = "./test_build_valid_data" }

			[[node]]
			name = "store"
			kind = "MetadataStore"
			"#,
		);

		let pipeline = Pipeline::build(&config, &dispatcher(), store, "secret").unwrap();

		// Setup order: store, then resources, then actions
		let order: Vec<_> = pipeline
			.setup_order
			.iter()
			.map(|i| pipeline.nodes[*i].name.as_str())
			.collect();
		assert_eq!(order, vec!["store", "watch", "train"]);

		// Edges were wired both ways
		assert_eq!(pipeline.edges_summary(), vec![("watch".to_owned(), "train".to_owned())]);
	}

	#[tokio::test]
	async fn refuse_cycle() {
		let store = test_store("test_build_cycle.sqlite").await;
		let config = config(
			r#"
			[[node]]
			name = "store"
			kind = "MetadataStore"

			[[node]]
			name = "a"
			kind = "Noop"
			predecessors = ["b"]

			[[node]]
			name = "b"
			kind = "Noop"
			predecessors = ["a"]
			"#,
		);

		assert!(matches!(
			Pipeline::build(&config, &dispatcher(), store, "secret"),
			Err(PipelineBuildError::HasCycle)
		));
	}

	#[tokio::test]
	async fn refuse_bad_store_counts() {
		let store = test_store("test_build_stores.sqlite").await;

		let none = config(
			r#"
			[[node]]
			name = "a"
			kind = "Noop"
			"#,
		);
		assert!(matches!(
			Pipeline::build(&none, &dispatcher(), store.clone(), "secret"),
			Err(PipelineBuildError::NoMetadataStore)
		));

		let two = config(
			r#"
			[[node]]
			name = "s1"
			kind = "MetadataStore"

			[[node]]
			name = "s2"
			kind = "MetadataStore"
			"#,
		);
		assert!(matches!(
			Pipeline::build(&two, &dispatcher(), store, "secret"),
			Err(PipelineBuildError::MultipleMetadataStores { .. })
		));
	}

	#[tokio::test]
	async fn refuse_bad_references() {
		let store = test_store("test_build_refs.sqlite").await;

		let unknown_pred = config(
			r#"
			[[node]]
			name = "store"
			kind = "MetadataStore"

			[[node]]
			name = "a"
			kind = "Noop"
			predecessors = ["ghost"]
			"#,
		);
		assert!(matches!(
			Pipeline::build(&unknown_pred, &dispatcher(), store.clone(), "secret"),
			Err(PipelineBuildError::UnknownPredecessor { .. })
		));

		let unknown_kind = config(
			r#"
			[[node]]
			name = "store"
			kind = "MetadataStore"

			[[node]]
			name = "a"
			kind = "Quantum"
			"#,
		);
		assert!(matches!(
			Pipeline::build(&unknown_kind, &dispatcher(), store.clone(), "secret"),
			Err(PipelineBuildError::UnknownKind { .. })
		));

		let duplicate_edge = config(
			r#"
			[[node]]
			name = "store"
			kind = "MetadataStore"

			[[node]]
			name = "a"
			kind = "Noop"

			[[node]]
			name = "b"
			kind = "Noop"
			predecessors = ["a", "a"]
			"#,
		);
		assert!(matches!(
			Pipeline::build(&duplicate_edge, &dispatcher(), store, "secret"),
			Err(PipelineBuildError::DuplicateEdge { .. })
		));
	}
}
