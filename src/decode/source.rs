// src/decode/source.rs

use anyhow::Result;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::{debug, info};
use zip::ZipArchive;

use super::fixed::strip_line_ending;
use crate::error::SourceError;

const READ_BUFFER: usize = 1 << 20;

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Pick the entry to stream from an archive: the first `.asc` file, else
/// the first file of any name.
fn pick_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
) -> Result<(usize, String), SourceError> {
    let mut fallback = None;
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|source| SourceError::Archive {
            path: path.to_path_buf(),
            source,
        })?;
        if !entry.is_file() {
            continue;
        }
        let name = entry.name().to_string();
        if name.to_lowercase().ends_with(".asc") {
            return Ok((i, name));
        }
        if fallback.is_none() {
            fallback = Some((i, name));
        }
    }
    fallback.ok_or_else(|| SourceError::EmptyArchive {
        path: path.to_path_buf(),
    })
}

/// Open the extract at `path` and hand a buffered reader to `f`.
///
/// A `.zip` path is streamed from its extract entry without unpacking it
/// to disk; anything else is read as a plain file.
pub fn with_source<T, F>(path: &Path, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn BufRead) -> Result<T>,
{
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if !is_zip(path) {
        let mut reader = BufReader::with_capacity(READ_BUFFER, file);
        return f(&mut reader);
    }

    let mut archive = ZipArchive::new(file).map_err(|source| SourceError::Archive {
        path: path.to_path_buf(),
        source,
    })?;
    let (idx, name) = pick_entry(&mut archive, path)?;
    info!(entry = %name, "streaming archive entry");

    let entry = archive.by_index(idx).map_err(|source| SourceError::Archive {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, entry);
    f(&mut reader)
}

/// First record of the extract, line ending removed.
pub fn first_line(path: &Path) -> Result<Vec<u8>> {
    with_source(path, |reader| {
        let mut buf = Vec::new();
        reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let len = strip_line_ending(&buf).len();
        buf.truncate(len);
        debug!(len, "read first line");
        Ok(buf)
    })
}
