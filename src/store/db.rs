mod mirrors;
mod settings;
mod sync_jobs;

pub use sync_jobs::INTERRUPTED_ERROR;

use super::Result;
use crate::error::StoreError;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqlitePooledConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas applied whenever the pool hands out a connection.
/// The database file is shared with the API process, so writers wait on
/// each other instead of failing with `SQLITE_BUSY`.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite-backed store for mirrors, sync jobs and settings
#[derive(Clone)]
pub struct StoreDb {
    pool: SqlitePool,
    path: PathBuf,
}

impl StoreDb {
    /// Create a pool for the database at `path`.
    ///
    /// No connection is opened here; reachability is established later by
    /// [`StoreDb::ping`] so startup can wait for the store with its own
    /// retry policy.
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_secs(5),
            }))
            .build_unchecked(manager);

        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> Result<SqlitePooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Round-trip a trivial statement to prove the store is reachable
    pub fn ping(&self) -> Result<()> {
        let mut conn = self.connection()?;
        conn.batch_execute("SELECT 1")?;
        Ok(())
    }

    /// Apply any pending embedded migrations, returning how many ran
    pub fn run_migrations(&self) -> Result<usize> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        for version in &applied {
            tracing::info!(target: "store", version = %version, "Applied migration");
        }

        Ok(applied.len())
    }

    /// Run blocking store work on the blocking thread pool
    pub async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StoreDb) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::migrated_store;
    use super::*;

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state").join("mirrors.db");

        let db = StoreDb::open(&path, 1).unwrap();
        db.ping().unwrap();

        assert!(path.parent().unwrap().exists());
        assert_eq!(db.path(), path.as_path());
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let (_dir, db) = migrated_store();
        assert_eq!(db.run_migrations().unwrap(), 0);
    }

    #[test]
    fn test_ping_fails_for_unreachable_location() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let db = StoreDb::open(dir.path(), 1).unwrap();
        assert!(db.ping().is_err());
    }

    #[tokio::test]
    async fn test_interact_runs_on_blocking_pool() {
        let (_dir, db) = migrated_store();
        let count = db.interact(|db| db.list_mirrors().map(|m| m.len())).await.unwrap();
        assert_eq!(count, 0);
    }
}
