use anacostia_migrate::Migration;
use sqlx::Connection;

pub(super) struct MigrationStep {}

#[async_trait::async_trait]
impl Migration for MigrationStep {
	fn name(&self) -> &str {
		"m_0_init"
	}

	async fn up(&self, conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
		let mut t = conn.begin().await?;

		sqlx::query(
			"
			CREATE TABLE runs (
				run_id INTEGER PRIMARY KEY NOT NULL,
				start_time TEXT NOT NULL,
				end_time TEXT
			);
			",
		)
		.execute(&mut *t)
		.await?;

		sqlx::query(
			"
			CREATE TABLE artifacts (
				id INTEGER PRIMARY KEY NOT NULL,
				location TEXT NOT NULL UNIQUE,
				state TEXT NOT NULL,
				run_id INTEGER,
				created_at TEXT NOT NULL
			);
			",
		)
		.execute(&mut *t)
		.await?;

		sqlx::query("CREATE INDEX idx_artifacts_state on artifacts(state);")
			.execute(&mut *t)
			.await?;

		sqlx::query(
			"
			CREATE TABLE metrics (
				id INTEGER PRIMARY KEY NOT NULL,
				name TEXT NOT NULL,
				value REAL NOT NULL,
				run_id INTEGER,
				logged_at TEXT NOT NULL
			);
			",
		)
		.execute(&mut *t)
		.await?;

		sqlx::query("CREATE INDEX idx_metrics_name on metrics(name);")
			.execute(&mut *t)
			.await?;

		sqlx::query(
			"
			CREATE TABLE nodes (
				name TEXT PRIMARY KEY NOT NULL,
				kind TEXT NOT NULL,
				pipeline_id TEXT NOT NULL
			);
			",
		)
		.execute(&mut *t)
		.await?;

		sqlx::query(
			"
			CREATE TABLE node_events (
				id INTEGER PRIMARY KEY NOT NULL,
				run_id INTEGER NOT NULL,
				node TEXT NOT NULL,
				status TEXT NOT NULL,
				at TEXT NOT NULL
			);
			",
		)
		.execute(&mut *t)
		.await?;

		sqlx::query("CREATE INDEX idx_node_events_run on node_events(run_id);")
			.execute(&mut *t)
			.await?;

		t.commit().await?;

		return Ok(());
	}
}
