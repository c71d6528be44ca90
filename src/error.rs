// src/error.rs

use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures reading a codebook or deriving a layout from it.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The codebook yielded zero `Column:` / `SAS Variable Name:` pairs.
    #[error("no column/variable matches found in codebook")]
    NoFields,

    #[error("reading codebook {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fetching codebook {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failures opening or streaming the fixed-width extract.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading source {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {path:?} contains no file entries")]
    EmptyArchive { path: PathBuf },
}

/// Errors surfaced by a [`WarehouseStore`](crate::warehouse::WarehouseStore).
///
/// Driver errors are classified so callers can branch on the two cases the
/// load cares about: a natural-key collision and a table that is not there.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {table}")]
    UniqueViolation { table: String },

    #[error("table {table} does not exist")]
    MissingTable { table: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The fact batch could not be written; nothing from it was kept.
#[derive(Debug, Error)]
#[error("bulk insert into {table} failed, {rows} rows rolled back: {source}")]
pub struct BulkLoadError {
    pub table: String,
    pub rows: usize,
    #[source]
    pub source: StoreError,
}
