// src/layout/write.rs

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use super::FieldSpec;

/// Persist `specs` as pretty JSON at `path`.
///
/// Written to a sibling temp file first and renamed over `path`, so readers
/// never observe a half-written layout.
pub fn write_layout<P: AsRef<Path>>(path: P, specs: &[FieldSpec]) -> Result<()> {
    let path = path.as_ref();
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("layout path has no file name")?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let file =
        fs::File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;
    let mut tmp = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut tmp, specs).context("serializing layout")?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    drop(tmp);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;
    Ok(())
}
