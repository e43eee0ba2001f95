use anacostia_metadb::{
	data::{ArtifactState, NodeKind},
	id::RunId,
};
use anacostia_node::base::{
	NodeBuilder, NodeContext, NodeParameterValue, NodeStrategy, StepError,
};
use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct FilesystemBuilder {}

impl NodeBuilder for FilesystemBuilder {
	fn build(
		&self,
		params: &BTreeMap<SmartString<LazyCompact>, NodeParameterValue>,
	) -> Result<Box<dyn NodeStrategy>, StepError> {
		let path = match params.get("path") {
			None => {
				return Err(StepError::MissingParameter {
					parameter: "path".into(),
				})
			}
			Some(p) => p.as_str().ok_or(StepError::BadParameterType {
				parameter: "path".into(),
			})?,
		};

		Ok(Box::new(FilesystemResource {
			root: PathBuf::from(path),
		}))
	}
}

/// A resource node watching one directory, recursively.
///
/// Artifact identity is the file's absolute path. The monitor calls
/// [`NodeStrategy::scan`] on a timer; new paths become `new` artifact
/// entries and count toward the node's trigger threshold.
pub struct FilesystemResource {
	root: PathBuf,
}

impl FilesystemResource {
	/// List every file under the watched directory, as absolute paths
	fn walk(&self) -> Result<Vec<SmartString<LazyCompact>>, StepError> {
		let root = self.root.canonicalize()?;

		let mut out = Vec::new();
		for entry in WalkDir::new(&root) {
			let entry = match entry {
				Ok(x) => x,
				Err(error) => {
					// A file vanishing mid-walk is business as usual
					// for a watched directory
					warn!(message = "Skipping unreadable dir entry", ?error);
					continue;
				}
			};

			if !entry.file_type().is_file() {
				continue;
			}

			match entry.path().to_str() {
				Some(path) => out.push(path.into()),
				None => {
					warn!(
						message = "Skipping file with non-utf8 path",
						path = ?entry.path(),
					);
				}
			}
		}

		return Ok(out);
	}
}

#[async_trait]
impl NodeStrategy for FilesystemResource {
	fn kind(&self) -> NodeKind {
		NodeKind::Resource
	}

	async fn setup(&self, ctx: &NodeContext) -> Result<(), StepError> {
		// Make sure the watched directory exists, so the first scan
		// doesn't fail on a fresh deployment
		std::fs::create_dir_all(&self.root)?;

		debug!(
			message = "Filesystem resource ready",
			node = %ctx.node_name,
			root = ?self.root,
		);
		return Ok(());
	}

	async fn scan(&self, _ctx: &NodeContext) -> Result<Vec<SmartString<LazyCompact>>, StepError> {
		self.walk()
	}

	/// Verify the artifact set this run locked in.
	/// The set was fixed by `start_run`; we only sanity-check that
	/// the files are still there.
	async fn prepare(&self, ctx: &NodeContext, run: RunId) -> Result<(), StepError> {
		let current = ctx
			.metadb
			.list_entries(Some(ArtifactState::Current), Some(run))
			.await
			.map_err(StepError::metadata)?;

		for entry in &current {
			if !Path::new(entry.location.as_str()).exists() {
				warn!(
					message = "Artifact file disappeared before execution",
					node = %ctx.node_name,
					location = %entry.location,
					%run,
				);
			}
		}

		debug!(
			message = "Artifact set locked",
			node = %ctx.node_name,
			%run,
			artifacts = current.len(),
		);
		return Ok(());
	}

	/// Record anything the monitor hasn't seen yet. Detection is
	/// idempotent, so double-recording with the monitor is harmless.
	async fn execute(&self, ctx: &NodeContext, _run: RunId) -> Result<bool, StepError> {
		use anacostia_metadb::base::errors::CreateEntryError;

		for location in self.walk()? {
			match ctx.metadb.create_entry(&location).await {
				Ok(_) => {}
				Err(CreateEntryError::AlreadyExists) => {}
				Err(error) => return Err(StepError::metadata(error)),
			}
		}

		return Ok(true);
	}

	fn artifact_root(&self) -> Option<PathBuf> {
		Some(self.root.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anacostia_node::PipelineId;
	use std::sync::Arc;

	// Engine tests have their own store stub; scan never touches the
	// store, so a panicking placeholder would also do. Reuse the
	// simplest thing that satisfies the context.
	use anacostia_metadb::base::client::MetadataClient;
	use anacostia_metadb::base::errors::*;
	use anacostia_metadb::data::*;
	use anacostia_metadb::id::*;

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

	#[tokio::test]
	async fn scan_finds_files_recursively() {
		let root = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/test_scan_dir"));
		if root.exists() {
			std::fs::remove_dir_all(&root).unwrap();
		}
		std::fs::create_dir_all(root.join("sub")).unwrap();
		std::fs::write(root.join("a.txt"), "a").unwrap();
		std::fs::write(root.join("sub/b.txt"), "b").unwrap();

		let ctx = NodeContext {
			pipeline_id: PipelineId::new("root"),
			node_name: "watch".into(),
			metadb: Arc::new(NullStore),
			params: BTreeMap::new(),
		};

		let node = FilesystemResource { root: root.clone() };
		let mut found = node.scan(&ctx).await.unwrap();
		found.sort();

		assert_eq!(found.len(), 2);
		// Locations are absolute
		assert!(found.iter().all(|p| Path::new(p.as_str()).is_absolute()));
		assert!(found[0].ends_with("a.txt"));
		assert!(found[1].ends_with("b.txt"));

		std::fs::remove_dir_all(&root).unwrap();
	}
}
