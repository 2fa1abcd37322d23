//! Append-only CSV files.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::schema::TableSchema;
use super::{Backend, Batch, BatchKind, OutputMode};
use crate::error::WriterError;

/// Writes `<dir>/<stem>.csv`, emitting the header only when the file is new.
#[derive(Debug, Clone)]
pub struct RowFileBackend {
    dir: PathBuf,
}

impl RowFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.csv"))
    }

    /// Appends `rows`, writing the header first if the file is empty.
    pub(crate) fn append(
        &self,
        stem: &str,
        schema: &TableSchema,
        rows: &[Vec<String>],
    ) -> Result<PathBuf, WriterError> {
        let path = self.path(stem);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let fresh = file.metadata()?.len() == 0;
        write_rows(file, fresh.then(|| schema.header()), rows)?;
        Ok(path)
    }

    /// Truncates the file and rewrites header plus `rows`.
    pub(crate) fn replace(
        &self,
        stem: &str,
        schema: &TableSchema,
        rows: &[Vec<String>],
    ) -> Result<PathBuf, WriterError> {
        let path = self.path(stem);
        let file = File::create(&path)?;
        write_rows(file, Some(schema.header()), rows)?;
        Ok(path)
    }
}

fn write_rows(file: File, header: Option<String>, rows: &[Vec<String>]) -> Result<(), WriterError> {
    let mut out = BufWriter::new(file);
    if let Some(header) = header {
        writeln!(out, "{header}")?;
    }
    for row in rows {
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()?;
    Ok(())
}

/// Reads back a file written by [`RowFileBackend`], skipping the header.
pub(crate) fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, WriterError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .skip(1)
        .filter(|line| !line.is_empty())
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect())
}

impl Backend for RowFileBackend {
    fn mode(&self) -> OutputMode {
        OutputMode::RowFile
    }

    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), WriterError> {
        match batch.kind {
            BatchKind::Replace => self.replace(batch.stem, batch.schema, &batch.rows)?,
            BatchKind::Append | BatchKind::Staged => {
                self.append(batch.stem, batch.schema, &batch.rows)?
            }
        };
        Ok(())
    }
}
