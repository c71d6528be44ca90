// src/decode/fixed.rs

use std::{
    collections::HashMap,
    io::{self, BufRead},
    sync::Arc,
};
use tracing::trace;

use crate::layout::{max_end, FieldSpec};
use crate::record::FieldSource;

/// Column names shared by every row decoded with one layout.
#[derive(Debug)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn from_specs(specs: &[FieldSpec]) -> Self {
        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, n) in names.iter().enumerate() {
            // first declaration wins on a repeated name
            index.entry(n.clone()).or_insert(i);
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// One record: a trimmed string per field, in layout order.
#[derive(Debug, Clone)]
pub struct DecodedRow {
    header: Arc<Header>,
    values: Vec<String>,
}

impl DecodedRow {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.header
            .position(name)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names()
            .iter()
            .zip(&self.values)
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FieldSource for DecodedRow {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

/// Strip trailing `\n` / `\r` only; everything else on the line is data.
pub fn strip_line_ending(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

/// Slice every field out of `line` and trim it.
///
/// Bytes past the end of a short line read as empty, so a truncated record
/// yields truncated or empty values instead of an error.
pub fn decode_line(line: &[u8], specs: &[FieldSpec]) -> Vec<String> {
    specs
        .iter()
        .map(|spec| {
            let range = spec.byte_range();
            let start = range.start.min(line.len());
            let end = range.end.min(line.len());
            String::from_utf8_lossy(&line[start..end]).trim().to_string()
        })
        .collect()
}

/// Lazily decodes one row per line of `reader`.
pub struct FixedWidthDecoder<R> {
    reader: R,
    specs: Vec<FieldSpec>,
    header: Arc<Header>,
    width: usize,
    buf: Vec<u8>,
    lines: u64,
    short_lines: u64,
}

impl<R: BufRead> FixedWidthDecoder<R> {
    pub fn new(reader: R, specs: &[FieldSpec]) -> Self {
        Self {
            reader,
            specs: specs.to_vec(),
            header: Arc::new(Header::from_specs(specs)),
            width: max_end(specs),
            // grown by read_until; the layout width is untrusted input
            buf: Vec::new(),
            lines: 0,
            short_lines: 0,
        }
    }

    /// Lines read so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Lines shorter than the layout's widest field end.
    pub fn short_lines(&self) -> u64 {
        self.short_lines
    }
}

impl<R: BufRead> Iterator for FixedWidthDecoder<R> {
    type Item = io::Result<DecodedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.lines += 1;
                let line = strip_line_ending(&self.buf);
                if line.len() < self.width {
                    self.short_lines += 1;
                    trace!(
                        line = self.lines,
                        len = line.len(),
                        expected = self.width,
                        "short record"
                    );
                }
                Some(Ok(DecodedRow {
                    header: Arc::clone(&self.header),
                    values: decode_line(line, &self.specs),
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Decode `reader` line by line against `specs`.
pub fn decode<R: BufRead>(reader: R, specs: &[FieldSpec]) -> FixedWidthDecoder<R> {
    FixedWidthDecoder::new(reader, specs)
}
