//! The per-node lifecycle engine.
//!
//! One engine task runs per node. The engine owns the node's state
//! machine; everything it shares with the outside world goes through
//! the signal inbox, the status board, or the metadata store.

use anacostia_metadb::id::RunId;
use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use std::{
	error::Error,
	sync::{
		atomic::{AtomicBool, AtomicI64, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
	base::{NodeContext, NodeStrategy},
	id::identity,
	signal::{Signal, SignalInbox, SignalKind},
	status::{NodeStatus, StatusBoard},
};

/// How often engines re-check their inbox and flags, in milliseconds.
/// Engines are single-threaded poll loops; this bounds their latency.
pub const ENGINE_POLL_AWAIT_MS: u64 = 10;

/// Control flags shared between an engine and its pipeline.
///
/// These are plain atomics: engines poll them at their loop cadence,
/// nothing waits on them.
#[derive(Clone)]
pub struct NodeFlags {
	paused: Arc<AtomicBool>,
	shutdown: Arc<AtomicBool>,

	/// The id of a run being cancelled, or zero.
	/// Run ids start at one, so zero is safe as "none".
	cancelled_run: Arc<AtomicI64>,
}

impl NodeFlags {
	pub fn new() -> Self {
		Self {
			paused: Arc::new(AtomicBool::new(false)),
			shutdown: Arc::new(AtomicBool::new(false)),
			cancelled_run: Arc::new(AtomicI64::new(0)),
		}
	}

	pub fn pause(&self) {
		self.paused.store(true, Ordering::SeqCst);
	}

	pub fn unpause(&self) {
		self.paused.store(false, Ordering::SeqCst);
	}

	pub fn is_paused(&self) -> bool {
		self.paused.load(Ordering::SeqCst)
	}

	pub fn request_shutdown(&self) {
		self.shutdown.store(true, Ordering::SeqCst);
	}

	pub fn shutdown_requested(&self) -> bool {
		self.shutdown.load(Ordering::SeqCst)
	}

	pub fn cancel_run(&self, run: RunId) {
		self.cancelled_run.store(run.into(), Ordering::SeqCst);
	}

	pub fn is_cancelled(&self, run: RunId) -> bool {
		self.cancelled_run.load(Ordering::SeqCst) == i64::from(run)
	}
}

/// A connector that delivers signals to one remote successor.
/// Implemented by the connector crate; the engine only needs
/// "send this, tell me if it stuck".
#[async_trait]
pub trait RemoteSignalSender: Send + Sync {
	/// The name of the node this sender delivers to
	fn target_node(&self) -> &str;

	/// Deliver a signal, retrying as configured.
	/// An error means the retry budget is exhausted.
	async fn send_signal(&self, signal: Signal) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// A successor on the same pipeline: we write its inbox directly.
pub struct LocalSuccessor {
	pub node: SmartString<LazyCompact>,
	pub inbox: Arc<Mutex<SignalInbox>>,
}

/// What the QUEUED wait decided
enum QueueDecision {
	/// All predecessors succeeded; run the body
	Proceed,

	/// Some predecessor failed or was skipped
	Skip,

	/// The run was cancelled, timed out, or the pipeline is
	/// shutting down. Skip without signalling anyone.
	Abandon,
}

/// One node's lifecycle engine
pub struct NodeEngine {
	pub ctx: NodeContext,

	/// Shared with the node's resource monitor, if it has one
	pub strategy: Arc<dyn NodeStrategy>,

	/// This node's inbox. Also written by the pipeline's HTTP
	/// handlers and by local predecessors' engines.
	pub inbox: Arc<Mutex<SignalInbox>>,

	pub board: StatusBoard,
	pub flags: NodeFlags,

	/// The identities of every predecessor (local and remote)
	/// whose signal we wait for each run
	pub predecessors: Vec<SmartString<LazyCompact>>,

	pub local_successors: Vec<LocalSuccessor>,
	pub remote_successors: Vec<Arc<dyn RemoteSignalSender>>,

	/// How long a run may sit in QUEUED before we give up on it.
	/// `None` means unbounded.
	pub deadline: Option<Duration>,

	/// Nodes with remote predecessors stay in `INITIALIZING` until
	/// this reports true (i.e. until every remote peer has
	/// handshaken). `None` skips the gate.
	pub connection_gate: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl NodeEngine {
	fn name(&self) -> &SmartString<LazyCompact> {
		&self.ctx.node_name
	}

	fn set_status(&self, status: NodeStatus, run: Option<RunId>) {
		self.board.set_status(self.name(), status, run);
	}

	/// The status this node idles in between runs, right after setup.
	fn idle_status(&self) -> NodeStatus {
		match self.strategy.kind() {
			anacostia_metadb::data::NodeKind::MetadataStore => NodeStatus::WaitingMetrics,
			anacostia_metadb::data::NodeKind::Resource => NodeStatus::WaitingResource,
			anacostia_metadb::data::NodeKind::Action => NodeStatus::Queued,
		}
	}

	/// Record a lifecycle event in the store. Event loss is logged
	/// but does not stop the engine: the store's ordering truth lives
	/// in `runs`, not here.
	async fn record_event(&self, run: RunId, status: NodeStatus) {
		match self
			.ctx
			.metadb
			.record_node_event(run, self.name(), status.as_str())
			.await
		{
			Ok(()) => {}
			Err(error) => {
				warn!(
					message = "Could not record node event",
					node = ?self.name(),
					?run,
					?error
				);
			}
		}
	}

	/// If paused, park in `PAUSED` until unpaused.
	/// The inbox is left untouched.
	async fn pause_point(&self, run: Option<RunId>) {
		if !self.flags.is_paused() {
			return;
		}

		let prev = self
			.board
			.get_status(self.name())
			.map(|(s, _)| s)
			.unwrap_or(NodeStatus::Initializing);

		info!(message = "Node paused", node = ?self.name());
		self.set_status(NodeStatus::Paused, run);

		while self.flags.is_paused() && !self.flags.shutdown_requested() {
			tokio::time::sleep(Duration::from_millis(ENGINE_POLL_AWAIT_MS)).await;
		}

		info!(message = "Node resumed", node = ?self.name());
		self.set_status(prev, run);
	}

	/// Send one signal to every successor, local and remote.
	/// Returns `false` if any remote delivery exhausted its retries.
	async fn emit(&self, run: RunId, kind: SignalKind) -> bool {
		let from = identity(&self.ctx.pipeline_id, self.name());
		let mut all_ok = true;

		for succ in &self.local_successors {
			let signal = Signal {
				from: from.clone(),
				to: succ.node.clone(),
				run,
				kind,
				sent_at: OffsetDateTime::now_utc(),
			};
			succ.inbox.lock().await.deliver(signal);
		}

		for sender in &self.remote_successors {
			let signal = Signal {
				from: from.clone(),
				to: sender.target_node().into(),
				run,
				kind,
				sent_at: OffsetDateTime::now_utc(),
			};

			match sender.send_signal(signal).await {
				Ok(()) => {}
				Err(error) => {
					warn!(
						message = "Could not deliver signal to remote successor",
						node = ?self.name(),
						target = sender.target_node(),
						?run,
						?error
					);
					all_ok = false;
				}
			}
		}

		return all_ok;
	}

	/// Wait in QUEUED until every predecessor has signalled for `run`,
	/// the run dies, or the deadline passes.
	async fn wait_queued(&self, run: RunId) -> QueueDecision {
		let queued_at = Instant::now();

		loop {
			if self.flags.shutdown_requested() || self.flags.is_cancelled(run) {
				return QueueDecision::Abandon;
			}

			if let Some(deadline) = self.deadline {
				if queued_at.elapsed() > deadline {
					debug!(
						message = "Run deadline passed while queued",
						node = ?self.name(),
						?run
					);
					return QueueDecision::Abandon;
				}
			}

			self.pause_point(Some(run)).await;

			{
				let inbox = self.inbox.lock().await;
				let mut complete = true;
				let mut all_success = true;

				for pred in &self.predecessors {
					match inbox.signal_from(run, pred) {
						None => {
							complete = false;
							break;
						}
						Some(s) => {
							if s.kind != SignalKind::Success {
								all_success = false;
							}
						}
					}
				}

				if complete {
					return if all_success {
						QueueDecision::Proceed
					} else {
						QueueDecision::Skip
					};
				}
			}

			tokio::time::sleep(Duration::from_millis(ENGINE_POLL_AWAIT_MS)).await;
		}
	}

	/// Drive one run to a terminal status.
	async fn drive_run(&self, run: RunId) {
		self.set_status(NodeStatus::Queued, Some(run));

		match self.wait_queued(run).await {
			QueueDecision::Abandon => {
				// Nobody downstream hears from us; they time out or
				// get cancelled themselves.
				self.record_event(run, NodeStatus::Skipped).await;
				self.set_status(NodeStatus::Skipped, Some(run));
				return;
			}

			QueueDecision::Skip => {
				debug!(
					message = "A predecessor failed or skipped, skipping node",
					node = ?self.name(),
					?run
				);
				self.emit(run, SignalKind::Skip).await;
				self.record_event(run, NodeStatus::Skipped).await;
				self.set_status(NodeStatus::Skipped, Some(run));
				return;
			}

			QueueDecision::Proceed => {}
		}

		//
		// MARK: Preparation
		//

		self.set_status(NodeStatus::Preparation, Some(run));

		let prepared = match self.strategy.prepare(&self.ctx, run).await {
			Ok(()) => true,
			Err(error) => {
				warn!(
					message = "Node preparation failed",
					node = ?self.name(),
					?run,
					?error
				);
				false
			}
		};

		//
		// MARK: Execute
		//

		let succeeded = if prepared {
			self.set_status(NodeStatus::Executing, Some(run));
			self.record_event(run, NodeStatus::Executing).await;

			match self.strategy.execute(&self.ctx, run).await {
				Ok(x) => x,
				Err(error) => {
					warn!(
						message = "Node execution failed",
						node = ?self.name(),
						?run,
						?error
					);
					false
				}
			}
		} else {
			false
		};

		// A cancel that landed while we were executing.
		// We can't interrupt a running body, but we can refuse to
		// propagate its result into a dead run.
		if self.flags.is_cancelled(run) || self.flags.shutdown_requested() {
			self.record_event(run, NodeStatus::Skipped).await;
			self.set_status(NodeStatus::Skipped, Some(run));
			return;
		}

		//
		// MARK: Cleanup
		//

		self.set_status(NodeStatus::Cleanup, Some(run));
		self.record_event(run, NodeStatus::Cleanup).await;

		let kind = if succeeded {
			SignalKind::Success
		} else {
			SignalKind::Failure
		};
		let delivered = self.emit(run, kind).await;

		let terminal = if !delivered {
			NodeStatus::Error
		} else if succeeded {
			NodeStatus::Complete
		} else {
			NodeStatus::Failure
		};

		self.record_event(run, terminal).await;
		self.set_status(terminal, Some(run));

		debug!(
			message = "Node finished run",
			node = ?self.name(),
			?run,
			status = terminal.as_str()
		);
	}

	/// The engine loop. Runs until shutdown is requested.
	///
	/// Setup has already happened by the time this is spawned; the
	/// engine starts in its idle status and waits for `run_start`.
	pub async fn run(self) {
		if let Some(gate) = &self.connection_gate {
			self.set_status(NodeStatus::Initializing, None);
			while !gate() {
				if self.flags.shutdown_requested() {
					return;
				}
				tokio::time::sleep(Duration::from_millis(ENGINE_POLL_AWAIT_MS)).await;
			}
		}

		self.set_status(self.idle_status(), None);

		let mut last_run: Option<RunId> = None;

		loop {
			if self.flags.shutdown_requested() {
				break;
			}

			self.pause_point(last_run).await;

			let next = {
				let inbox = self.inbox.lock().await;
				inbox.next_started_run(last_run)
			};

			let run = match next {
				Some(run) => run,
				None => {
					tokio::time::sleep(Duration::from_millis(ENGINE_POLL_AWAIT_MS)).await;
					continue;
				}
			};

			debug!(message = "Node observed run start", node = ?self.name(), ?run);
			last_run = Some(run);
			self.drive_run(run).await;
		}

		match self.strategy.shutdown(&self.ctx).await {
			Ok(()) => {}
			Err(error) => {
				warn!(
					message = "Node shutdown failed",
					node = ?self.name(),
					?error
				);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{base::StepError, PipelineId};
	use anacostia_metadb::{
		base::{
			client::MetadataClient,
			errors::{
				AddNodeError, CreateEntryError, EndRunError, GetEntriesError, GetMetricsError,
				GetRunError, LogMetricError, RecordEventError, StartRunError,
			},
		},
		data::{ArtifactEntry, ArtifactState, NodeDescriptor, NodeKind, RunInfo},
		id::{EntryId, RunId},
	};
	use std::collections::BTreeMap;

	/// A store that remembers nothing. Engine tests only exercise
	/// signalling and statuses.
	struct NullStore;

	#[async_trait]
	impl MetadataClient for NullStore {
		async fn start_run(&self) -> Result<RunId, StartRunError> {
			Ok(1.into())
		}
		async fn end_run(&self, _run: RunId) -> Result<(), EndRunError> {
			Ok(())
		}
		async fn active_run(&self) -> Result<Option<RunId>, GetRunError> {
			Ok(None)
		}
		async fn get_run(&self, _run: RunId) -> Result<Option<RunInfo>, GetRunError> {
			Ok(None)
		}
		async fn create_entry(&self, _location: &str) -> Result<EntryId, CreateEntryError> {
			Ok(1.into())
		}
		async fn entry_exists(&self, _location: &str) -> Result<bool, GetEntriesError> {
			Ok(false)
		}
		async fn get_num_entries(
			&self,
			_state: Option<ArtifactState>,
			_run: Option<RunId>,
		) -> Result<i64, GetEntriesError> {
			Ok(0)
		}
		async fn list_entries(
			&self,
			_state: Option<ArtifactState>,
			_run: Option<RunId>,
		) -> Result<Vec<ArtifactEntry>, GetEntriesError> {
			Ok(Vec::new())
		}
		async fn log_metric(&self, _name: &str, _value: f64) -> Result<(), LogMetricError> {
			Ok(())
		}
		async fn get_metrics(
			&self,
			_name: &str,
			_run: Option<RunId>,
		) -> Result<Vec<f64>, GetMetricsError> {
			Ok(Vec::new())
		}
		async fn add_node(&self, _node: &NodeDescriptor) -> Result<(), AddNodeError> {
			Ok(())
		}
		async fn record_node_event(
			&self,
			_run: RunId,
			_node: &SmartString<LazyCompact>,
			_status: &str,
		) -> Result<(), RecordEventError> {
			Ok(())
		}
	}

	struct StubAction {
		result: Result<bool, ()>,
	}

	#[async_trait]
	impl NodeStrategy for StubAction {
		fn kind(&self) -> NodeKind {
			NodeKind::Action
		}

		async fn execute(&self, _ctx: &NodeContext, _run: RunId) -> Result<bool, StepError> {
			match self.result {
				Ok(x) => Ok(x),
				Err(()) => Err(StepError::Other("stub failure".into())),
			}
		}
	}

	fn make_engine(
		name: &str,
		result: Result<bool, ()>,
		predecessors: Vec<SmartString<LazyCompact>>,
		successor: Option<(&str, Arc<Mutex<SignalInbox>>)>,
	) -> (NodeEngine, Arc<Mutex<SignalInbox>>, StatusBoard, NodeFlags) {
		let inbox = Arc::new(Mutex::new(SignalInbox::new()));
		let board = StatusBoard::new();
		let flags = NodeFlags::new();

		let engine = NodeEngine {
			ctx: NodeContext {
				pipeline_id: PipelineId::new("root"),
				node_name: name.into(),
				metadb: Arc::new(NullStore),
				params: BTreeMap::new(),
			},
			strategy: Arc::new(StubAction { result }),
			inbox: inbox.clone(),
			board: board.clone(),
			flags: flags.clone(),
			predecessors,
			local_successors: successor
				.into_iter()
				.map(|(node, inbox)| LocalSuccessor {
					node: node.into(),
					inbox,
				})
				.collect(),
			remote_successors: Vec::new(),
			deadline: None,
			connection_gate: None,
		};

		(engine, inbox, board, flags)
	}

	async fn deliver(inbox: &Arc<Mutex<SignalInbox>>, from: &str, run: i64, kind: SignalKind) {
		inbox.lock().await.deliver(Signal {
			from: from.into(),
			to: "ignored".into(),
			run: run.into(),
			kind,
			sent_at: OffsetDateTime::now_utc(),
		});
	}

	async fn wait_for_status(board: &StatusBoard, node: &str, want: NodeStatus) {
		for _ in 0..500 {
			if board.get_status(node).map(|(s, _)| s) == Some(want) {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!(
			"node `{node}` never reached {want}, last status: {:?}",
			board.get_status(node)
		);
	}

	#[tokio::test]
	async fn success_path() {
		let succ_inbox = Arc::new(Mutex::new(SignalInbox::new()));
		let (engine, inbox, board, flags) =
			make_engine("a", Ok(true), Vec::new(), Some(("b", succ_inbox.clone())));

		let mut events = board.subscribe();
		let task = tokio::spawn(engine.run());

		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		wait_for_status(&board, "a", NodeStatus::Complete).await;

		// The successor heard from us exactly once, with success
		let s = succ_inbox.lock().await;
		let sig = s.signal_from(1.into(), "root/a").unwrap();
		assert_eq!(sig.kind, SignalKind::Success);
		assert_eq!(sig.to, "b");
		drop(s);

		// Status events arrive in lifecycle order
		let mut seen = Vec::new();
		while let Ok(ev) = events.try_recv() {
			seen.push(ev.status);
		}
		assert_eq!(
			seen,
			vec![
				NodeStatus::Queued, // idle status for an action
				NodeStatus::Queued,
				NodeStatus::Preparation,
				NodeStatus::Executing,
				NodeStatus::Cleanup,
				NodeStatus::Complete,
			]
		);

		flags.request_shutdown();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn failure_propagates_failure_signal() {
		let succ_inbox = Arc::new(Mutex::new(SignalInbox::new()));
		let (engine, inbox, board, flags) =
			make_engine("a", Ok(false), Vec::new(), Some(("b", succ_inbox.clone())));

		let task = tokio::spawn(engine.run());
		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		wait_for_status(&board, "a", NodeStatus::Failure).await;

		let s = succ_inbox.lock().await;
		assert_eq!(
			s.signal_from(1.into(), "root/a").unwrap().kind,
			SignalKind::Failure
		);
		drop(s);

		flags.request_shutdown();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn skip_propagation() {
		let succ_inbox = Arc::new(Mutex::new(SignalInbox::new()));
		let (engine, inbox, board, flags) = make_engine(
			"b",
			Ok(true),
			vec!["root/a".into()],
			Some(("c", succ_inbox.clone())),
		);

		let task = tokio::spawn(engine.run());

		// Predecessor failed; we must skip, not complete
		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		deliver(&inbox, "root/a", 1, SignalKind::Failure).await;
		wait_for_status(&board, "b", NodeStatus::Skipped).await;

		let s = succ_inbox.lock().await;
		assert_eq!(
			s.signal_from(1.into(), "root/b").unwrap().kind,
			SignalKind::Skip
		);
		drop(s);

		flags.request_shutdown();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn waits_for_all_predecessors() {
		let (engine, inbox, board, flags) = make_engine(
			"c",
			Ok(true),
			vec!["root/a".into(), "leaf/b".into()],
			None,
		);

		let task = tokio::spawn(engine.run());
		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		deliver(&inbox, "root/a", 1, SignalKind::Success).await;

		// Only one of two predecessors has signalled
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(
			board.get_status("c").map(|(s, _)| s),
			Some(NodeStatus::Queued)
		);

		deliver(&inbox, "leaf/b", 1, SignalKind::Success).await;
		wait_for_status(&board, "c", NodeStatus::Complete).await;

		flags.request_shutdown();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn cancel_skips_without_signalling() {
		let succ_inbox = Arc::new(Mutex::new(SignalInbox::new()));
		let (engine, inbox, board, flags) = make_engine(
			"b",
			Ok(true),
			vec!["root/never".into()],
			Some(("c", succ_inbox.clone())),
		);

		let task = tokio::spawn(engine.run());
		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		wait_for_status(&board, "b", NodeStatus::Queued).await;

		flags.cancel_run(1.into());
		wait_for_status(&board, "b", NodeStatus::Skipped).await;

		// Cancelled nodes are silent
		let s = succ_inbox.lock().await;
		assert!(s.signal_from(1.into(), "root/b").is_none());
		drop(s);

		flags.request_shutdown();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn pause_and_resume() {
		let (engine, inbox, board, flags) = make_engine("a", Ok(true), Vec::new(), None);

		let task = tokio::spawn(engine.run());
		wait_for_status(&board, "a", NodeStatus::Queued).await;

		flags.pause();
		wait_for_status(&board, "a", NodeStatus::Paused).await;

		// Signals delivered while paused are retained
		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(
			board.get_status("a").map(|(s, _)| s),
			Some(NodeStatus::Paused)
		);

		flags.unpause();
		wait_for_status(&board, "a", NodeStatus::Complete).await;

		flags.request_shutdown();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn queued_deadline_abandons_run() {
		let succ_inbox = Arc::new(Mutex::new(SignalInbox::new()));
		let (mut engine, inbox, board, flags) = make_engine(
			"b",
			Ok(true),
			vec!["root/never".into()],
			Some(("c", succ_inbox.clone())),
		);
		engine.deadline = Some(Duration::from_millis(50));

		let task = tokio::spawn(engine.run());
		deliver(&inbox, "root", 1, SignalKind::RunStart).await;
		wait_for_status(&board, "b", NodeStatus::Skipped).await;

		flags.request_shutdown();
		task.await.unwrap();
	}
}
