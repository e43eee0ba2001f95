use async_trait::async_trait;
use smartstring::{LazyCompact, SmartString};
use sqlx::{Connection, Row};
use time::OffsetDateTime;

use super::SqliteMetadataClient;
use crate::{
	base::{
		client::MetadataClient,
		errors::{
			AddNodeError, CreateEntryError, EndRunError, GetEntriesError, GetMetricsError,
			GetRunError, LogMetricError, RecordEventError, StartRunError,
		},
	},
	data::{ArtifactEntry, ArtifactState, NodeDescriptor, NodeEvent, RunInfo},
	id::{EntryId, RunId},
};

#[async_trait]
impl MetadataClient for SqliteMetadataClient {
	//
	// MARK: Runs
	//

	async fn start_run(&self) -> Result<RunId, StartRunError> {
		let mut conn = self.pool.acquire().await?;
		let mut t = conn.begin().await?;

		// At most one run may be active at a time
		let active = sqlx::query("SELECT run_id FROM runs WHERE end_time IS NULL;")
			.fetch_optional(&mut *t)
			.await?;
		if active.is_some() {
			return Err(StartRunError::RunActive);
		}

		// Run ids are strictly monotonic, starting at 1
		let res = sqlx::query("SELECT COALESCE(MAX(run_id), 0) AS max_run FROM runs;")
			.fetch_one(&mut *t)
			.await?;
		let new_run: i64 = res.get::<i64, _>("max_run") + 1;

		sqlx::query("INSERT INTO runs (run_id, start_time) VALUES (?, ?);")
			.bind(new_run)
			.bind(OffsetDateTime::now_utc())
			.execute(&mut *t)
			.await?;

		// Claim unclaimed artifact entries and metrics for this run
		sqlx::query("UPDATE artifacts SET state='current', run_id=? WHERE state='new' AND run_id IS NULL;")
			.bind(new_run)
			.execute(&mut *t)
			.await?;

		sqlx::query("UPDATE metrics SET run_id=? WHERE run_id IS NULL;")
			.bind(new_run)
			.execute(&mut *t)
			.await?;

		t.commit().await?;

		return Ok(new_run.into());
	}

	async fn end_run(&self, run: RunId) -> Result<(), EndRunError> {
		let mut conn = self.pool.acquire().await?;
		let mut t = conn.begin().await?;

		let res = sqlx::query("UPDATE runs SET end_time=? WHERE run_id=? AND end_time IS NULL;")
			.bind(OffsetDateTime::now_utc())
			.bind(i64::from(run))
			.execute(&mut *t)
			.await?;

		if res.rows_affected() == 0 {
			return Err(EndRunError::NotActive);
		}

		// This run's artifacts have been consumed
		sqlx::query("UPDATE artifacts SET state='old' WHERE run_id=? AND state='current';")
			.bind(i64::from(run))
			.execute(&mut *t)
			.await?;

		t.commit().await?;

		return Ok(());
	}

	async fn active_run(&self) -> Result<Option<RunId>, GetRunError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query("SELECT run_id FROM runs WHERE end_time IS NULL;")
			.fetch_optional(&mut *conn)
			.await?;

		return Ok(res.map(|row| row.get::<i64, _>("run_id").into()));
	}

	async fn get_run(&self, run: RunId) -> Result<Option<RunInfo>, GetRunError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query("SELECT run_id, start_time, end_time FROM runs WHERE run_id=?;")
			.bind(i64::from(run))
			.fetch_optional(&mut *conn)
			.await?;

		let row = match res {
			None => return Ok(None),
			Some(row) => row,
		};

		let events = sqlx::query(
			"
			SELECT node, status, at
			FROM node_events
			WHERE run_id=?
			ORDER BY at, id;
			",
		)
		.bind(i64::from(run))
		.fetch_all(&mut *conn)
		.await?;

		return Ok(Some(RunInfo {
			run_id: row.get::<i64, _>("run_id").into(),
			start_time: row.get("start_time"),
			end_time: row.get("end_time"),
			events: events
				.into_iter()
				.map(|r| NodeEvent {
					node: r.get::<&str, _>("node").into(),
					status: r.get::<&str, _>("status").into(),
					at: r.get("at"),
				})
				.collect(),
		}));
	}

	//
	// MARK: Artifact entries
	//

	async fn create_entry(&self, location: &str) -> Result<EntryId, CreateEntryError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query(
			"INSERT INTO artifacts (location, state, created_at) VALUES (?, 'new', ?);",
		)
		.bind(location)
		.bind(OffsetDateTime::now_utc())
		.execute(&mut *conn)
		.await;

		return match res {
			Err(sqlx::Error::Database(e)) => {
				if e.is_unique_violation() {
					Err(CreateEntryError::AlreadyExists)
				} else {
					Err(sqlx::Error::Database(e).into())
				}
			}
			Err(e) => Err(e.into()),
			Ok(res) => Ok(res.last_insert_rowid().into()),
		};
	}

	async fn entry_exists(&self, location: &str) -> Result<bool, GetEntriesError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query("SELECT id FROM artifacts WHERE location=?;")
			.bind(location)
			.fetch_optional(&mut *conn)
			.await?;

		return Ok(res.is_some());
	}

	async fn get_num_entries(
		&self,
		state: Option<ArtifactState>,
		run: Option<RunId>,
	) -> Result<i64, GetEntriesError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query(
			"
			SELECT COUNT(*) AS n FROM artifacts
			WHERE (?1 IS NULL OR state = ?1)
			AND (?2 IS NULL OR run_id = ?2);
			",
		)
		.bind(state.map(|s| s.as_db_str()))
		.bind(run.map(i64::from))
		.fetch_one(&mut *conn)
		.await?;

		return Ok(res.get("n"));
	}

	async fn list_entries(
		&self,
		state: Option<ArtifactState>,
		run: Option<RunId>,
	) -> Result<Vec<ArtifactEntry>, GetEntriesError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query(
			"
			SELECT id, location, state, run_id, created_at FROM artifacts
			WHERE (?1 IS NULL OR state = ?1)
			AND (?2 IS NULL OR run_id = ?2)
			ORDER BY id;
			",
		)
		.bind(state.map(|s| s.as_db_str()))
		.bind(run.map(i64::from))
		.fetch_all(&mut *conn)
		.await?;

		let mut out = Vec::new();
		for row in res {
			out.push(ArtifactEntry {
				id: row.get::<i64, _>("id").into(),
				location: row.get::<&str, _>("location").into(),
				// This column only ever holds values written by as_db_str
				state: ArtifactState::from_db_str(row.get("state")).unwrap(),
				run_id: row.get::<Option<i64>, _>("run_id").map(RunId::from),
				created_at: row.get("created_at"),
			});
		}

		return Ok(out);
	}

	//
	// MARK: Metrics
	//

	async fn log_metric(&self, name: &str, value: f64) -> Result<(), LogMetricError> {
		let mut conn = self.pool.acquire().await?;

		sqlx::query("INSERT INTO metrics (name, value, logged_at) VALUES (?, ?, ?);")
			.bind(name)
			.bind(value)
			.bind(OffsetDateTime::now_utc())
			.execute(&mut *conn)
			.await?;

		return Ok(());
	}

	async fn get_metrics(
		&self,
		name: &str,
		run: Option<RunId>,
	) -> Result<Vec<f64>, GetMetricsError> {
		let mut conn = self.pool.acquire().await?;

		let res = sqlx::query(
			"
			SELECT value FROM metrics
			WHERE name = ?1
			AND ((?2 IS NULL AND run_id IS NULL) OR run_id = ?2)
			ORDER BY id;
			",
		)
		.bind(name)
		.bind(run.map(i64::from))
		.fetch_all(&mut *conn)
		.await?;

		return Ok(res.into_iter().map(|row| row.get("value")).collect());
	}

	//
	// MARK: Nodes
	//

	async fn add_node(&self, node: &NodeDescriptor) -> Result<(), AddNodeError> {
		anacostia_util::names::check_name(&node.name)?;

		let mut conn = self.pool.acquire().await?;

		// Upsert: pipelines re-register their nodes on restart
		sqlx::query(
			"
			INSERT INTO nodes (name, kind, pipeline_id) VALUES (?, ?, ?)
			ON CONFLICT(name) DO UPDATE SET kind=excluded.kind, pipeline_id=excluded.pipeline_id;
			",
		)
		.bind(node.name.as_str())
		.bind(node.kind.as_db_str())
		.bind(node.pipeline_id.as_str())
		.execute(&mut *conn)
		.await?;

		return Ok(());
	}

	async fn record_node_event(
		&self,
		run: RunId,
		node: &SmartString<LazyCompact>,
		status: &str,
	) -> Result<(), RecordEventError> {
		let mut conn = self.pool.acquire().await?;

		sqlx::query("INSERT INTO node_events (run_id, node, status, at) VALUES (?, ?, ?, ?);")
			.bind(i64::from(run))
			.bind(node.as_str())
			.bind(status)
			.bind(OffsetDateTime::now_utc())
			.execute(&mut *conn)
			.await?;

		return Ok(());
	}
}
