//! Parquet datasets: one directory per stream, one file per partition.
//!
//! Batch streams (ticks, trades) write each batch as a new partition. Book
//! lines are staged in the stream's CSV file and converted into a partition
//! once `convert_every` lines have accumulated for that file; the CSV is
//! then removed.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;
use uuid::Uuid;

use super::row_file::{RowFileBackend, read_rows};
use super::schema::{ColumnType, TableSchema};
use super::{Backend, Batch, BatchKind, OutputMode};
use crate::error::WriterError;

#[derive(Debug)]
pub struct ColumnarBackend {
    dir: PathBuf,
    staging: RowFileBackend,
    convert_every: usize,
    staged: HashMap<String, usize>,
}

impl ColumnarBackend {
    pub fn new(dir: impl Into<PathBuf>, convert_every: usize) -> Self {
        let dir = dir.into();
        Self {
            staging: RowFileBackend::new(dir.clone()),
            dir,
            convert_every: convert_every.max(1),
            staged: HashMap::new(),
        }
    }

    /// Dataset directory for `stem`.
    pub fn dataset_dir(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.parquet"))
    }

    /// Lines staged for `stem` since its last conversion.
    pub fn staged_lines(&self, stem: &str) -> usize {
        self.staged.get(stem).copied().unwrap_or(0)
    }

    fn stage(&mut self, stem: &str, schema: &TableSchema, rows: &[Vec<String>]) -> Result<(), WriterError> {
        let csv = self.staging.append(stem, schema, rows)?;
        let count = self.staged.entry(stem.to_string()).or_insert(0);
        *count += rows.len();
        if *count >= self.convert_every {
            *count = 0;
            let staged_rows = read_rows(&csv)?;
            let partition = write_partition(&self.dataset_dir(stem), schema, &staged_rows)?;
            std::fs::remove_file(&csv)?;
            debug!(stem, rows = staged_rows.len(), partition = %partition.display(), "Converted staged rows");
        }
        Ok(())
    }
}

impl Backend for ColumnarBackend {
    fn mode(&self) -> OutputMode {
        OutputMode::Columnar
    }

    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), WriterError> {
        match batch.kind {
            BatchKind::Staged => self.stage(batch.stem, batch.schema, &batch.rows),
            BatchKind::Append => {
                write_partition(&self.dataset_dir(batch.stem), batch.schema, &batch.rows)?;
                Ok(())
            }
            BatchKind::Replace => {
                let dir = self.dataset_dir(batch.stem);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
                write_partition(&dir, batch.schema, &batch.rows)?;
                Ok(())
            }
        }
    }
}

/// Writes `rows` as a new snappy-compressed partition under `dir`.
///
/// Numeric and integer cells that do not parse are stored as nulls.
pub(crate) fn write_partition(
    dir: &Path,
    schema: &TableSchema,
    rows: &[Vec<String>],
) -> Result<PathBuf, WriterError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("part-{}.parquet", Uuid::now_v7()));

    let arrow_schema = Arc::new(schema.arrow_schema());
    let columns = schema
        .columns()
        .iter()
        .enumerate()
        .map(|(i, column)| column_array(column.ty, rows, i))
        .collect::<Vec<_>>();
    let batch = RecordBatch::try_new(Arc::clone(&arrow_schema), columns)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(File::create(&path)?, arrow_schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(path)
}

fn column_array(ty: ColumnType, rows: &[Vec<String>], i: usize) -> ArrayRef {
    match ty {
        ColumnType::Text => Arc::new(rows.iter().map(|r| cell(r, i)).collect::<StringArray>()),
        ColumnType::Numeric => Arc::new(
            rows.iter()
                .map(|r| cell(r, i).and_then(|v| v.parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        ColumnType::Integer => Arc::new(
            rows.iter()
                .map(|r| cell(r, i).and_then(|v| v.parse::<i64>().ok()))
                .collect::<Int64Array>(),
        ),
    }
}

fn cell(row: &[String], i: usize) -> Option<&str> {
    row.get(i).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use arrow_array::Array;
    use parquet::file::reader::{FileReader, SerializedFileReader};

    use super::*;

    fn trade_row(id: u64) -> Vec<String> {
        vec![
            "2024-01-01T00:00:00Z".to_string(),
            "BTC/USD".to_string(),
            "65000.1".to_string(),
            "0.25".to_string(),
            "buy".to_string(),
            "limit".to_string(),
            id.to_string(),
        ]
    }

    #[test]
    fn partition_round_trips_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<_> = (0..5).map(trade_row).collect();
        let path = write_partition(&dir.path().join("trades.parquet"), &TableSchema::trades(), &rows)
            .unwrap();

        let reader = SerializedFileReader::new(File::open(path).unwrap()).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 5);
    }

    #[test]
    fn unparseable_numbers_become_null() {
        let mut row = trade_row(1);
        row[2] = "n/a".to_string();
        let array = column_array(ColumnType::Numeric, &[row], 2);
        assert_eq!(array.null_count(), 1);
    }
}
