//! Resource monitors and the metric watcher.
//!
//! Monitors run independently of their node's lifecycle loop; the two
//! share nothing but the metadata store.

use anacostia_metadb::{base::errors::StartRunError, data::ArtifactState};
use anacostia_node::{
	base::{NodeContext, NodeStrategy},
	status::{NodeStatus, StatusBoard},
};
use std::{
	sync::{atomic::AtomicBool, atomic::Ordering, Arc},
	time::Duration,
};
use tracing::{debug, info, warn};

use crate::config::MetricTrigger;

/// Start a run if none is active. Trigger requests that lose the
/// race (or arrive mid-run) are dropped; the monitor's next poll
/// re-fires them once the run ends.
async fn try_trigger(ctx: &NodeContext, board: &StatusBoard, reason: &str) {
	board.set_status(&ctx.node_name, NodeStatus::Triggered, None);

	match ctx.metadb.start_run().await {
		Ok(run) => {
			info!(
				message = "Trigger started a run",
				node = %ctx.node_name,
				%run,
				reason,
			);
		}
		Err(StartRunError::RunActive) => {
			debug!(
				message = "Trigger deferred, run already active",
				node = %ctx.node_name,
			);
		}
		Err(error) => {
			warn!(
				message = "Trigger could not start a run",
				node = %ctx.node_name,
				?error,
			);
		}
	}
}

/// One resource node's monitoring task.
///
/// Polls the node's backing store, records newly detected artifacts,
/// and fires the filesystem trigger condition.
pub(crate) async fn resource_monitor(
	ctx: NodeContext,
	strategy: Arc<dyn NodeStrategy>,
	board: StatusBoard,
	stop: Arc<AtomicBool>,
	threshold: i64,
	poll: Duration,
) {
	debug!(message = "Resource monitor started", node = %ctx.node_name);

	while !stop.load(Ordering::SeqCst) {
		// Record anything new the strategy can see
		match strategy.scan(&ctx).await {
			Ok(locations) => {
				for location in locations {
					match ctx.metadb.entry_exists(&location).await {
						Ok(true) => continue,
						Ok(false) => {}
						Err(error) => {
							warn!(
								message = "Could not check artifact entry",
								node = %ctx.node_name,
								%location,
								?error,
							);
							continue;
						}
					}

					use anacostia_metadb::base::errors::CreateEntryError;
					match ctx.metadb.create_entry(&location).await {
						Ok(entry) => {
							info!(
								message = "New artifact detected",
								node = %ctx.node_name,
								%location,
								%entry,
							);
						}
						// Raced another detector; the entry exists,
						// which is all we wanted
						Err(CreateEntryError::AlreadyExists) => {}
						Err(error) => {
							warn!(
								message = "Could not create artifact entry",
								node = %ctx.node_name,
								%location,
								?error,
							);
						}
					}
				}
			}
			Err(error) => {
				warn!(
					message = "Resource scan failed",
					node = %ctx.node_name,
					?error,
				);
			}
		}

		// Evaluate the trigger condition
		let should_trigger = match ctx.metadb.active_run().await {
			Ok(Some(_)) => false,
			Ok(None) => {
				match ctx
					.metadb
					.get_num_entries(Some(ArtifactState::New), None)
					.await
				{
					Ok(n) => n >= threshold,
					Err(error) => {
						warn!(
							message = "Could not evaluate trigger condition",
							node = %ctx.node_name,
							?error,
						);
						false
					}
				}
			}
			Err(error) => {
				warn!(
					message = "Could not read active run",
					node = %ctx.node_name,
					?error,
				);
				false
			}
		};

		if should_trigger {
			try_trigger(&ctx, &board, "new artifact entries reached threshold").await;
		}

		tokio::time::sleep(poll).await;
	}

	debug!(message = "Resource monitor stopped", node = %ctx.node_name);
}

/// The metadata store node's metric watcher.
///
/// Fires a run when the largest unclaimed value of the watched metric
/// exceeds the threshold.
pub(crate) async fn metric_watcher(
	ctx: NodeContext,
	board: StatusBoard,
	stop: Arc<AtomicBool>,
	trigger: MetricTrigger,
	poll: Duration,
) {
	debug!(
		message = "Metric watcher started",
		node = %ctx.node_name,
		metric = %trigger.name,
	);

	while !stop.load(Ordering::SeqCst) {
		let should_trigger = match ctx.metadb.active_run().await {
			Ok(Some(_)) => false,
			Ok(None) => match ctx.metadb.get_metrics(&trigger.name, None).await {
				Ok(values) => values.iter().any(|v| *v > trigger.threshold),
				Err(error) => {
					warn!(
						message = "Could not read metrics",
						node = %ctx.node_name,
						metric = %trigger.name,
						?error,
					);
					false
				}
			},
			Err(error) => {
				warn!(
					message = "Could not read active run",
					node = %ctx.node_name,
					?error,
				);
				false
			}
		};

		if should_trigger {
			try_trigger(&ctx, &board, "metric exceeded threshold").await;
		}

		tokio::time::sleep(poll).await;
	}

	debug!(message = "Metric watcher stopped", node = %ctx.node_name);
}
