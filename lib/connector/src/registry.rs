use smartstring::{LazyCompact, SmartString};
use std::{
	collections::BTreeMap,
	sync::Mutex,
};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::wire::ConnectRequest;

/// A remote predecessor we have shaken hands with
#[derive(Debug, Clone)]
pub struct PeerInfo {
	pub pipeline_id: SmartString<LazyCompact>,
	pub connected_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct RegistryInner {
	/// The run id space every peer must agree on.
	/// Pinned by the first accepted handshake.
	run_id_space: Option<SmartString<LazyCompact>>,

	/// Accepted peers, keyed by predecessor identity
	peers: BTreeMap<SmartString<LazyCompact>, PeerInfo>,
}

/// The receiving half of this pipeline's connectors.
///
/// Records which remote predecessors have handshaken. Nodes with
/// remote predecessors stay in `INITIALIZING` until their peers
/// appear here.
#[derive(Debug, Default)]
pub struct PeerRegistry {
	inner: Mutex<RegistryInner>,
}

impl PeerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Handle a handshake. Returns `true` if the peer is accepted.
	///
	/// Re-handshakes from a known peer are accepted and refresh its
	/// record; a peer from a different run id space is refused.
	pub fn register(&self, request: &ConnectRequest) -> bool {
		let mut inner = self.inner.lock().unwrap();

		match &inner.run_id_space {
			None => {
				inner.run_id_space = Some(request.run_id_space.clone());
			}
			Some(space) => {
				if *space != request.run_id_space {
					warn!(
						message = "Refusing peer from a different run id space",
						peer = %request.predecessor_id,
						ours = %space,
						theirs = %request.run_id_space,
					);
					return false;
				}
			}
		}

		info!(
			message = "Accepted connector handshake",
			peer = %request.predecessor_id,
			pipeline = %request.pipeline_id,
		);
		inner.peers.insert(
			request.predecessor_id.clone(),
			PeerInfo {
				pipeline_id: request.pipeline_id.clone(),
				connected_at: OffsetDateTime::now_utc(),
			},
		);

		return true;
	}

	/// Has this predecessor identity handshaken?
	pub fn is_connected(&self, predecessor_id: &str) -> bool {
		self.inner.lock().unwrap().peers.contains_key(predecessor_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(pred: &str, pipeline: &str, space: &str) -> ConnectRequest {
		ConnectRequest {
			predecessor_id: pred.into(),
			pipeline_id: pipeline.into(),
			run_id_space: space.into(),
		}
	}

	#[test]
	fn accepts_and_rechecks_run_id_space() {
		let registry = PeerRegistry::new();

		assert!(registry.register(&request("root/train", "root", "root")));
		assert!(registry.is_connected("root/train"));
		assert!(!registry.is_connected("root/other"));

		// Re-handshake is idempotent
		assert!(registry.register(&request("root/train", "root", "root")));

		// Same space, different peer: fine
		assert!(registry.register(&request("root/other", "root", "root")));

		// A second root is refused
		assert!(!registry.register(&request("other/x", "other", "other-root")));
		assert!(!registry.is_connected("other/x"));
	}
}
