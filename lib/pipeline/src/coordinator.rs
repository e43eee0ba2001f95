//! The per-run coordination loop.
//!
//! One coordinator runs per pipeline. On the root it watches the
//! metadata store for a newly started run (triggers call `start_run`
//! directly, locally or over RPC), announces it, and ends it once
//! every local node is terminal. On a leaf the announcement arrives
//! over `/signal` instead; the leaf only does local bookkeeping.

use anacostia_metadb::base::errors::EndRunError;
use std::{sync::atomic::Ordering, time::Duration};
use tracing::{info, warn};

use crate::{config::PipelineRole, errors::CoordinatorError, pipeline::Pipeline};

/// How often the coordinator re-checks run state, in milliseconds
const COORDINATOR_POLL_AWAIT_MS: u64 = 20;

impl Pipeline {
	/// Drive runs until shutdown.
	///
	/// Returns an error only on metadata store failure, which is
	/// fatal: the store is the source of ordering truth, so the
	/// caller is expected to tear the pipeline down and exit.
	pub async fn coordinate(&self) -> Result<(), CoordinatorError> {
		let node_names = self.node_names();

		loop {
			if self.shutdown.load(Ordering::SeqCst) {
				return Ok(());
			}

			match self.active_run_view() {
				None => {
					// Triggers start runs straight on the store; the
					// root's coordinator discovers them by polling.
					// This also covers runs started through the RPC
					// mirror by some other process.
					if self.role == PipelineRole::Root {
						match self.metadb.active_run().await {
							Ok(Some(run)) => self.announce_run(run).await,
							Ok(None) => {}
							Err(error) => return Err(error.into()),
						}
					}
				}

				Some((run, observed_at)) => {
					let deadline_passed = self
						.run_deadline
						.map(|d| observed_at.elapsed() > d)
						.unwrap_or(false);

					if deadline_passed {
						warn!(
							message = "Run deadline passed, cancelling",
							pipeline = %self.id,
							%run,
						);
						self.cancel_run(run);
						self.end_run_if_root(run).await?;
						self.finish_run(run).await;
						continue;
					}

					if self.board.all_terminal(&node_names, run) {
						info!(
							message = "All nodes terminal, run complete",
							pipeline = %self.id,
							%run,
						);
						self.end_run_if_root(run).await?;
						self.finish_run(run).await;
					}
				}
			}

			tokio::time::sleep(Duration::from_millis(COORDINATOR_POLL_AWAIT_MS)).await;
		}
	}

	/// Root pipelines own the run lifecycle; everyone else only
	/// observes it.
	async fn end_run_if_root(&self, run: anacostia_metadb::id::RunId) -> Result<(), CoordinatorError> {
		if self.role != PipelineRole::Root {
			return Ok(());
		}

		match self.metadb.end_run(run).await {
			Ok(()) => Ok(()),
			// Someone else already ended it; that's fine
			Err(EndRunError::NotActive) => {
				warn!(message = "Run was already ended", pipeline = %self.id, %run);
				Ok(())
			}
			Err(error) => Err(error.into()),
		}
	}
}
