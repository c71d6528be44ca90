// src/record.rs

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{collections::HashMap, io::Read, path::Path};

/// Anything the warehouse can project natural keys and measures out of.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<&str>;
}

/// A loosely-typed row keyed by column name, as read back from a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

}

impl FieldSource for Record {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Read every row of a headed CSV into memory.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers().context("reading CSV header")?.clone();

    let mut out = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("parsing CSV record {}", idx + 1))?;
        out.push(headers.iter().zip(record.iter()).collect());
    }
    Ok(out)
}

pub fn read_records_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening {:?}", path))?;
    read_records(file).with_context(|| format!("reading records from {:?}", path))
}
