//! The SQLite metadata store backend

use anacostia_migrate::{MigrationError, Migrator};
use sqlx::{
	sqlite::{SqliteConnectOptions, SqlitePool},
	Connection, SqliteConnection,
};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

mod client;
mod migrate;

/// An error we may encounter when opening a SQLite metadata store
#[derive(Debug, Error)]
pub enum SqliteOpenError {
	/// We encountered an internal database error
	#[error("sql error")]
	Database(#[from] sqlx::Error),

	/// We encountered an error while migrating
	#[error("migration error")]
	Migrate(#[from] MigrationError),
}

/// A metadata store client backed by a local SQLite database
pub struct SqliteMetadataClient {
	pool: SqlitePool,
}

impl SqliteMetadataClient {
	/// Open a store, applying migrations if needed.
	pub async fn open(db_addr: &str) -> Result<Self, SqliteOpenError> {
		info!(message = "Opening metadata store", store_type = "sqlite", ?db_addr);

		// Apply migrations
		let mut conn = SqliteConnection::connect(db_addr).await?;
		let mut mig = Migrator::new(&mut conn, db_addr, migrate::MIGRATE_STEPS).await?;
		mig.up().await?;

		drop(mig);
		drop(conn);

		let pool = SqlitePool::connect_with(
			SqliteConnectOptions::from_str(db_addr)?
				// Each connection in this pool has its own statement cache,
				// and stale cached statements misbehave across transactions.
				.statement_cache_capacity(0)
				.synchronous(sqlx::sqlite::SqliteSynchronous::Extra),
		)
		.await?;

		Ok(Self { pool })
	}
}
