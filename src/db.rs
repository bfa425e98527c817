use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::ffi::ErrorCode;
use rusqlite::{params, Connection, Error as SqliteError, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: PathBuf,
}

pub struct DatabaseBootstrap {
    pub context: DatabaseContext,
    pub recovered: bool,
}

pub fn bootstrap<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<DatabaseBootstrap> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(database_file);

    match establish_context(&db_path) {
        Ok(context) => {
            info!(
                target: "database_bootstrap",
                path = %db_path.display(),
                "session store opened"
            );
            Ok(DatabaseBootstrap {
                context,
                recovered: false,
            })
        }
        Err(AppError::Database(err)) if should_attempt_recovery(&err, &db_path) => {
            warn!(
                target: "database_bootstrap",
                path = %db_path.display(),
                error = %err,
                "session store failed to open, recreating it"
            );
            recover_store(&db_path)?;
            let context = establish_context(&db_path)?;
            Ok(DatabaseBootstrap {
                context,
                recovered: true,
            })
        }
        Err(err) => Err(err),
    }
}

fn establish_context(db_path: &Path) -> AppResult<DatabaseContext> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(db_path, flags)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    run_migrations(&connection)?;

    Ok(DatabaseContext {
        connection,
        path: db_path.to_path_buf(),
    })
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );
        "#,
    )?;
    Ok(())
}

fn should_attempt_recovery(err: &SqliteError, db_path: &Path) -> bool {
    if !db_path.exists() {
        return false;
    }

    match err {
        SqliteError::SqliteFailure(code, message) => {
            matches!(code.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
                || message
                    .as_deref()
                    .map(|msg| msg.contains("database disk image is malformed"))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn recover_store(db_path: &Path) -> AppResult<()> {
    remove_if_exists(db_path)?;
    remove_if_exists(&sidecar_path(db_path, "wal"))?;
    remove_if_exists(&sidecar_path(db_path, "shm"))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut buf = db_path.to_path_buf();
    let file_name = db_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    buf.set_file_name(format!("{file_name}-{suffix}"));
    buf
}

/// Key/value view over the session database, shared between owners.
#[derive(Clone)]
pub struct DurableStore {
    connection: Arc<Mutex<Connection>>,
}

impl DurableStore {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    pub fn in_memory() -> AppResult<Self> {
        let connection = Connection::open_in_memory()?;
        run_migrations(&connection)?;
        Ok(Self::new(connection))
    }

    pub fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.connection
            .lock()
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(AppError::from)
    }

    pub fn put(&self, key: &str, value: &str) -> AppResult<()> {
        self.connection.lock().execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, DATETIME('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> AppResult<bool> {
        let removed = self
            .connection
            .lock()
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> AppResult<()> {
        self.connection.lock().execute_batch(sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runs_migrations_and_creates_tables() {
        let dir = tempdir().unwrap();
        let bootstrap = bootstrap(dir.path(), "test.db").unwrap();
        let ctx = bootstrap.context;

        let tables: i64 = ctx
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'kv_store'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
        assert!(ctx.path.ends_with("test.db"));
        assert!(!bootstrap.recovered);
    }

    #[test]
    fn recovers_when_file_is_not_a_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let recovered = bootstrap(dir.path(), "broken.db").unwrap();
        assert!(recovered.recovered);
        assert!(recovered.context.path.exists());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let ctx = bootstrap(dir.path(), "kv.db").unwrap().context;
            let store = DurableStore::new(ctx.connection);
            store.put("greeting", "hello").unwrap();
            store.put("greeting", "hello again").unwrap();
        }

        let ctx = bootstrap(dir.path(), "kv.db").unwrap().context;
        let store = DurableStore::new(ctx.connection);
        assert_eq!(store.get("greeting").unwrap().as_deref(), Some("hello again"));
        assert!(store.remove("greeting").unwrap());
        assert!(!store.remove("greeting").unwrap());
        assert_eq!(store.get("greeting").unwrap(), None);
    }
}
