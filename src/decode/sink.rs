// src/decode/sink.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

use super::fixed::DecodedRow;

/// Output encoding of the converted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    /// `.parquet` / `.pq` paths get Parquet, everything else CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("parquet") | Some("pq") => OutputFormat::Parquet,
            _ => OutputFormat::Csv,
        }
    }
}

/// Destination for decoded batches.
pub trait TableSink {
    fn write_batch(&mut self, rows: &[DecodedRow]) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Open a sink of `format` at `path` with `header` as its columns.
pub fn open_sink(format: OutputFormat, path: &Path, header: &[String]) -> Result<Box<dyn TableSink>> {
    Ok(match format {
        OutputFormat::Csv => Box::new(CsvSink::create(path, header)?),
        OutputFormat::Parquet => Box::new(ParquetSink::create(path, header)?),
    })
}

/// CSV output. The header goes out on creation and every batch is flushed,
/// so the file on disk is always a valid prefix of the full table.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvSink {
    pub fn create(path: &Path, header: &[String]) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(header)
            .with_context(|| format!("writing header to {:?}", path))?;
        writer.flush()?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }
}

impl TableSink for CsvSink {
    fn write_batch(&mut self, rows: &[DecodedRow]) -> Result<()> {
        for row in rows {
            self.writer
                .write_record(row.values())
                .with_context(|| format!("writing row to {:?}", self.path))?;
        }
        self.writer
            .flush()
            .with_context(|| format!("flushing {:?}", self.path))?;
        debug!(rows = rows.len(), "appended CSV batch");
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Parquet output, every column `Utf8`, one row group per batch.
///
/// Written to `<name>.tmp` and renamed into place by [`TableSink::finish`].
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    schema: Arc<Schema>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl ParquetSink {
    pub fn create(path: &Path, header: &[String]) -> Result<Self> {
        let schema = Arc::new(Schema::new(
            header
                .iter()
                .map(|n| Field::new(n, DataType::Utf8, false))
                .collect::<Vec<_>>(),
        ));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("parquet output path has no file name")?;
        let tmp_path = path.with_file_name(format!("{}.tmp", file_name));
        let file = File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))
            .context("creating Arrow writer")?;
        Ok(Self {
            writer,
            schema,
            tmp_path,
            final_path: path.to_path_buf(),
        })
    }

    fn to_record_batch(&self, rows: &[DecodedRow]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = (0..self.schema.fields().len())
            .map(|i| {
                let arr = StringArray::from_iter_values(
                    rows.iter()
                        .map(|r| r.values().get(i).map(String::as_str).unwrap_or("")),
                );
                Arc::new(arr) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(Arc::clone(&self.schema), columns).context("building record batch")
    }
}

impl TableSink for ParquetSink {
    fn write_batch(&mut self, rows: &[DecodedRow]) -> Result<()> {
        let batch = self.to_record_batch(rows)?;
        self.writer.write(&batch).context("writing batch to Parquet")?;
        self.writer.flush().context("flushing Parquet row group")?;
        debug!(rows = rows.len(), "wrote Parquet row group");
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ParquetSink {
            writer,
            tmp_path,
            final_path,
            ..
        } = *self;
        writer.close().context("closing Parquet writer")?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, final_path))?;
        Ok(())
    }
}
