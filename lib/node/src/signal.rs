//! Signals and the per-node signal inbox

use anacostia_metadb::id::RunId;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// What a signal says
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
	/// The coordinator announces a new run
	RunStart,

	/// The sender finished its body successfully
	Success,

	/// The sender's body failed
	Failure,

	/// The sender was skipped
	Skip,
}

/// A typed message from a node to a successor within a specific run.
///
/// Signals are transient: they live in the receiver's inbox until the
/// run ends and are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Signal {
	/// The sender's federation-wide identity, `{pipeline_id}/{node_name}`.
	/// `run_start` signals carry the announcing pipeline's id instead.
	#[schema(value_type = String)]
	pub from: SmartString<LazyCompact>,

	/// The receiving node's name
	#[schema(value_type = String)]
	pub to: SmartString<LazyCompact>,

	#[schema(value_type = i64)]
	pub run: RunId,

	pub kind: SignalKind,

	#[schema(value_type = String)]
	pub sent_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct RunInbox {
	/// Did we observe this run's `run_start` broadcast?
	run_start: bool,

	/// One signal per predecessor. First write wins.
	signals: BTreeMap<SmartString<LazyCompact>, Signal>,
}

/// One node's signal inbox.
///
/// Signals are keyed by run, then by sender. Within a run a
/// predecessor's signal is never overwritten, which makes delivery
/// idempotent; a predecessor signal that arrives before the run's
/// `run_start` broadcast is simply recorded under its run id and found
/// once the node observes the start.
#[derive(Debug, Default)]
pub struct SignalInbox {
	runs: BTreeMap<RunId, RunInbox>,
}

impl SignalInbox {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a signal. Returns `false` if it was already recorded
	/// (duplicate delivery has no effect).
	pub fn deliver(&mut self, signal: Signal) -> bool {
		let run = self.runs.entry(signal.run).or_default();

		match signal.kind {
			SignalKind::RunStart => {
				if run.run_start {
					return false;
				}
				run.run_start = true;
				return true;
			}
			_ => {
				if run.signals.contains_key(&signal.from) {
					return false;
				}
				run.signals.insert(signal.from.clone(), signal);
				return true;
			}
		}
	}

	/// Has this run's `run_start` been observed?
	pub fn run_started(&self, run: RunId) -> bool {
		self.runs.get(&run).is_some_and(|r| r.run_start)
	}

	/// The earliest started run after `after`, if any.
	/// This is how an idle node finds its next run.
	pub fn next_started_run(&self, after: Option<RunId>) -> Option<RunId> {
		self.runs
			.iter()
			.filter(|(run, inbox)| inbox.run_start && after.map_or(true, |a| **run > a))
			.map(|(run, _)| *run)
			.next()
	}

	/// Get the signal a sender delivered for a run, if any
	pub fn signal_from(&self, run: RunId, sender: &str) -> Option<&Signal> {
		self.runs.get(&run).and_then(|r| r.signals.get(sender))
	}

	/// Drop everything recorded for runs up to and including `run`.
	/// Called when a run ends.
	pub fn clear_through(&mut self, run: RunId) {
		self.runs = self.runs.split_off(&RunId::from(i64::from(run) + 1));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn signal(from: &str, run: i64, kind: SignalKind) -> Signal {
		Signal {
			from: from.into(),
			to: "target".into(),
			run: run.into(),
			kind,
			sent_at: OffsetDateTime::now_utc(),
		}
	}

	#[test]
	fn delivery_is_idempotent() {
		let mut inbox = SignalInbox::new();

		assert!(inbox.deliver(signal("root/a", 1, SignalKind::Success)));
		assert!(!inbox.deliver(signal("root/a", 1, SignalKind::Success)));

		// A second signal from the same sender in the same run
		// does not overwrite the first
		assert!(!inbox.deliver(signal("root/a", 1, SignalKind::Failure)));
		assert_eq!(
			inbox.signal_from(1.into(), "root/a").unwrap().kind,
			SignalKind::Success
		);

		// A new run is a clean slate
		assert!(inbox.deliver(signal("root/a", 2, SignalKind::Failure)));
	}

	#[test]
	fn early_signals_are_buffered() {
		let mut inbox = SignalInbox::new();

		// Predecessor signal arrives before the run_start broadcast
		assert!(inbox.deliver(signal("root/a", 3, SignalKind::Success)));
		assert!(!inbox.run_started(3.into()));
		assert_eq!(inbox.next_started_run(None), None);

		assert!(inbox.deliver(signal("root", 3, SignalKind::RunStart)));
		assert!(inbox.run_started(3.into()));
		assert_eq!(inbox.next_started_run(None), Some(3.into()));

		// The buffered signal is still there
		assert!(inbox.signal_from(3.into(), "root/a").is_some());
	}

	#[test]
	fn runs_are_consumed_in_order() {
		let mut inbox = SignalInbox::new();
		inbox.deliver(signal("root", 2, SignalKind::RunStart));
		inbox.deliver(signal("root", 1, SignalKind::RunStart));

		assert_eq!(inbox.next_started_run(None), Some(1.into()));
		assert_eq!(inbox.next_started_run(Some(1.into())), Some(2.into()));
		assert_eq!(inbox.next_started_run(Some(2.into())), None);

		inbox.clear_through(1.into());
		assert_eq!(inbox.next_started_run(None), Some(2.into()));

		inbox.clear_through(2.into());
		assert_eq!(inbox.next_started_run(None), None);
	}
}
