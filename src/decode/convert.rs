// src/decode/convert.rs

use anyhow::{Context, Result};
use std::{
    fs,
    io::BufRead,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, instrument, warn};

use super::{
    batch::batched,
    fixed::decode,
    sink::{open_sink, OutputFormat, TableSink},
    source::{first_line, with_source},
};
use crate::error::SourceError;
use crate::layout::{load_layout, max_end, write_layout, FieldSpec};

/// Knobs for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub chunksize: usize,
    pub max_rows: Option<usize>,
    pub format: Option<OutputFormat>,
    pub layout_json: Option<PathBuf>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            chunksize: 50_000,
            max_rows: None,
            format: None,
            layout_json: None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub fields: usize,
    pub rows: u64,
    pub batches: u64,
    pub short_lines: u64,
}

/// Result of comparing the first record against the layout width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub first_line_len: usize,
    pub max_end: usize,
}

impl Preflight {
    pub fn is_consistent(&self) -> bool {
        self.first_line_len >= self.max_end
    }
}

/// Compare the first line's length with the layout's widest field end.
/// Advisory only: a short first line is logged, not rejected.
pub fn preflight(source: &Path, specs: &[FieldSpec]) -> Result<Preflight> {
    let line = first_line(source)?;
    let check = Preflight {
        first_line_len: line.len(),
        max_end: max_end(specs),
    };
    info!(
        first_line_len = check.first_line_len,
        max_end = check.max_end,
        "preflight"
    );
    if check.is_consistent() {
        info!("column specs and source line length look consistent");
    } else {
        warn!(
            "source line shorter than expected; file may be truncated or misaligned"
        );
    }
    Ok(check)
}

/// Decode `reader` against `specs` and push every batch into `sink`.
///
/// Read failures mid-stream are reported as [`SourceError::Io`] against
/// `origin`.
pub fn convert_reader(
    reader: &mut dyn BufRead,
    origin: &Path,
    specs: &[FieldSpec],
    sink: &mut dyn TableSink,
    chunksize: usize,
    max_rows: Option<usize>,
) -> Result<ConvertSummary> {
    let mut summary = ConvertSummary {
        fields: specs.len(),
        ..Default::default()
    };

    let mut batches = batched(decode(reader, specs), chunksize, max_rows);
    for batch in batches.by_ref() {
        let batch = batch.map_err(|source| SourceError::Io {
            path: origin.to_path_buf(),
            source,
        })?;
        sink.write_batch(&batch)?;
        summary.rows += batch.len() as u64;
        summary.batches += 1;
        info!(rows = summary.rows, "wrote {} rows so far", summary.rows);
    }
    summary.short_lines = batches.inner().short_lines();
    Ok(summary)
}

/// Convert the fixed-width extract at `source` into a table at `out`,
/// using the layout derived from `codebook` (path or URL).
#[instrument(level = "info", skip(source, out, opts), fields(source = %source.display(), out = %out.display()))]
pub fn convert(source: &Path, codebook: &str, out: &Path, opts: &ConvertOptions) -> Result<ConvertSummary> {
    let start = Instant::now();

    info!(codebook, "parsing codebook");
    let specs = load_layout(codebook).with_context(|| format!("extracting layout from {}", codebook))?;
    let first: Vec<&str> = specs.iter().take(5).map(|s| s.name.as_str()).collect();
    info!(fields = specs.len(), ?first, "found columns (some may overlap)");

    if let Some(layout_path) = &opts.layout_json {
        write_layout(layout_path, &specs)
            .with_context(|| format!("writing layout to {:?}", layout_path))?;
        info!(path = %layout_path.display(), "wrote layout");
    }

    preflight(source, &specs)?;

    if let Some(dir) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating output directory {:?}", dir))?;
    }

    let format = opts.format.unwrap_or_else(|| OutputFormat::from_path(out));
    let header: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
    let mut sink = open_sink(format, out, &header)?;

    let summary = with_source(source, |reader| {
        convert_reader(
            reader,
            source,
            &specs,
            sink.as_mut(),
            opts.chunksize,
            opts.max_rows,
        )
    })?;
    sink.finish()?;

    if summary.short_lines > 0 {
        warn!(
            short_lines = summary.short_lines,
            "records shorter than the layout were decoded with empty values"
        );
    }
    info!(
        rows = summary.rows,
        elapsed = ?start.elapsed(),
        "done, total rows written -> {}",
        out.display()
    );
    Ok(summary)
}
