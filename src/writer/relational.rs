//! SQLite tables via sqlx.
//!
//! The writer thread is synchronous, so the backend drives sqlx on its own
//! current-thread runtime. Every write opens a connection, inserts the batch
//! in one transaction, commits, and closes; no connection outlives a call.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use super::schema::TableSchema;
use super::{Backend, Batch, OutputMode};
use crate::error::WriterError;

pub struct RelationalBackend {
    db_path: PathBuf,
    initialized: HashSet<String>,
    runtime: Runtime,
}

impl std::fmt::Debug for RelationalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalBackend")
            .field("db_path", &self.db_path)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl RelationalBackend {
    /// Prepares a backend for the database file at `db_path`. Nothing is
    /// opened until the first write.
    ///
    /// Must not be called from inside an async context.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Io`] if the runtime cannot be built.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, WriterError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            db_path: db_path.into(),
            initialized: HashSet::new(),
            runtime,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Creates `schema`'s table unless this backend already did so.
    ///
    /// Returns whether a `CREATE TABLE` statement was issued.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Sqlite`] if the database cannot be opened or
    /// the statement fails.
    pub fn create_table(&mut self, schema: &TableSchema) -> Result<bool, WriterError> {
        if self.initialized.contains(schema.name()) {
            return Ok(false);
        }

        let sql = schema.create_sql();
        let options = self.options();
        self.runtime.block_on(async {
            let mut conn = options.connect().await?;
            sqlx::query(&sql).execute(&mut conn).await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(())
        })?;

        self.initialized.insert(schema.name().to_string());
        info!(table = schema.name(), db = %self.db_path.display(), "Created table");
        Ok(true)
    }

    fn insert(&mut self, schema: &TableSchema, rows: &[Vec<String>]) -> Result<(), WriterError> {
        let sql = schema.insert_sql();
        let options = self.options();
        self.runtime.block_on(async {
            let mut conn: SqliteConnection = options.connect().await?;
            let mut tx = conn.begin().await?;
            for row in rows {
                let mut query = sqlx::query(&sql);
                for field in row {
                    query = query.bind(field.clone());
                }
                query.execute(&mut *tx).await?;
            }
            tx.commit().await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(())
        })?;
        Ok(())
    }

    fn options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true)
    }
}

impl Backend for RelationalBackend {
    fn mode(&self) -> OutputMode {
        OutputMode::Relational
    }

    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), WriterError> {
        self.create_table(batch.schema)?;
        self.insert(batch.schema, &batch.rows)
    }
}
