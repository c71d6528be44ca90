// src/warehouse/dimension.rs

use anyhow::{Context, Result};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use tracing::{debug, error, info, instrument, warn};

use super::store::WarehouseStore;
use crate::error::StoreError;
use crate::record::FieldSource;

/// Store-assigned identity of a dimension row.
pub type SurrogateId = i64;

/// Business values identifying one dimension row, in key-column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Natural key to surrogate id for one dimension.
pub type DimensionMap = HashMap<NaturalKey, SurrogateId>;

/// Every dimension's map, by dimension name.
pub type DimensionMaps = HashMap<&'static str, DimensionMap>;

/// Where a key column's value comes from.
#[derive(Clone, Copy)]
pub enum ColumnSource {
    /// Copied verbatim from the row.
    Field(&'static str),
    /// Computed from the row. Resolution and fact loading both go through
    /// this function, so they cannot disagree on the value.
    Derived {
        name: &'static str,
        derive: fn(&dyn FieldSource) -> Option<String>,
    },
}

impl ColumnSource {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnSource::Field(name) => name,
            ColumnSource::Derived { name, .. } => name,
        }
    }

    fn value(&self, row: &dyn FieldSource) -> Option<String> {
        match self {
            ColumnSource::Field(name) => row.field(name).map(str::to_string),
            ColumnSource::Derived { derive, .. } => derive(row),
        }
    }
}

impl fmt::Debug for ColumnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSource::Field(name) => write!(f, "Field({})", name),
            ColumnSource::Derived { name, .. } => write!(f, "Derived({})", name),
        }
    }
}

/// One source column of a natural key and the stored column it lands in.
#[derive(Debug, Clone, Copy)]
pub struct KeyColumn {
    pub source: ColumnSource,
    pub stored: &'static str,
}

impl KeyColumn {
    pub const fn field(source: &'static str, stored: &'static str) -> Self {
        Self {
            source: ColumnSource::Field(source),
            stored,
        }
    }

    pub const fn derived(
        name: &'static str,
        derive: fn(&dyn FieldSource) -> Option<String>,
        stored: &'static str,
    ) -> Self {
        Self {
            source: ColumnSource::Derived { name, derive },
            stored,
        }
    }
}

/// A row lacked a column its dimension key needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub dimension: &'static str,
    pub column: &'static str,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} key column {} missing from row", self.dimension, self.column)
    }
}

/// Declarative description of one dimension table.
#[derive(Debug)]
pub struct DimensionDef {
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub columns: &'static [KeyColumn],
}

impl DimensionDef {
    pub fn stored_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.stored)
    }

    /// Project `row` onto this dimension's key columns.
    pub fn key_for<R: FieldSource>(&self, row: &R) -> Result<NaturalKey, MissingField> {
        let mut parts = Vec::with_capacity(self.columns.len());
        for col in self.columns {
            match col.source.value(row) {
                Some(v) => parts.push(v),
                None => {
                    return Err(MissingField {
                        dimension: self.name,
                        column: col.source.name(),
                    })
                }
            }
        }
        Ok(NaturalKey(parts))
    }
}

/// Counters for one dimension's resolution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DimensionStats {
    /// Rows already in the table before this run.
    pub seeded: usize,
    /// Distinct keys in the input.
    pub distinct: usize,
    pub inserted: usize,
    /// Inserts that hit a uniqueness violation.
    pub conflicts: usize,
    /// Conflicts resolved by looking the key up again.
    pub recovered: usize,
    /// Conflicts whose lookup found nothing.
    pub missed: usize,
    /// Keys dropped on any other store error.
    pub failed: usize,
    /// Input rows lacking a key column.
    pub incomplete_rows: usize,
}

#[derive(Debug)]
pub struct Resolution {
    pub map: DimensionMap,
    pub stats: DimensionStats,
}

/// Roll back the dimension's open transaction and wrap `err` for the caller.
fn abandon<S>(store: &mut S, err: StoreError, def: &DimensionDef, action: &str) -> anyhow::Error
where
    S: WarehouseStore + ?Sized,
{
    store.rollback().ok();
    anyhow::Error::new(err).context(format!("{} on {}", action, def.table))
}

/// Undo the current key's insert and drop its savepoint.
fn undo_key<S>(store: &mut S, def: &DimensionDef) -> Result<()>
where
    S: WarehouseStore + ?Sized,
{
    store
        .rollback_to_savepoint()
        .map_err(|e| abandon(store, e, def, "rolling back savepoint"))?;
    store
        .release_savepoint()
        .map_err(|e| abandon(store, e, def, "releasing savepoint"))
}

/// Build the natural-key → surrogate-id map for `def`, inserting keys the
/// table has not seen yet.
///
/// Existing rows seed the map; a missing table seeds nothing. Each new key
/// is inserted under its own savepoint, so a failed key is undone without
/// discarding earlier inserts of the same dimension. A uniqueness violation
/// means another writer got there first: the savepoint is rolled back and
/// the id is read back by natural key. All new rows commit together once
/// the dimension is done.
#[instrument(level = "info", skip(store, rows, def), fields(dimension = def.name, table = def.table))]
pub fn resolve<S, R>(store: &mut S, rows: &[R], def: &DimensionDef) -> Result<Resolution>
where
    S: WarehouseStore + ?Sized,
    R: FieldSource,
{
    let mut stats = DimensionStats::default();
    let mut map = DimensionMap::new();

    // 1) seed from the table
    match store.load_dimension(def) {
        Ok(Some(existing)) => {
            stats.seeded = existing.len();
            map.extend(existing);
            info!(existing = stats.seeded, "found existing records in {}", def.table);
        }
        Ok(None) => {
            info!("table {} not found, proceeding with fresh insert", def.table);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading existing rows of {}", def.table));
        }
    }

    // 2) distinct keys, first-seen order
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for row in rows {
        match def.key_for(row) {
            Ok(key) => {
                if seen.insert(key.clone()) {
                    distinct.push(key);
                }
            }
            Err(missing) => {
                if stats.incomplete_rows == 0 {
                    warn!("{}", missing);
                }
                stats.incomplete_rows += 1;
            }
        }
    }
    stats.distinct = distinct.len();
    if stats.incomplete_rows > 0 {
        warn!(rows = stats.incomplete_rows, "rows without a complete key were left out");
    }

    // 3) insert-or-reuse
    for key in distinct {
        if map.contains_key(&key) {
            continue;
        }

        store
            .savepoint()
            .map_err(|e| abandon(store, e, def, "opening savepoint"))?;
        match store.insert_dimension(def, &key) {
            Ok(id) => {
                store
                    .release_savepoint()
                    .map_err(|e| abandon(store, e, def, "releasing savepoint"))?;
                debug!(%key, id, "inserted");
                map.insert(key, id);
                stats.inserted += 1;
            }
            Err(StoreError::UniqueViolation { .. }) => {
                // 4) someone else inserted it first
                stats.conflicts += 1;
                warn!(
                    %key,
                    "integrity error (possible race condition) inserting into {}; retrieving existing id",
                    def.table
                );
                undo_key(store, def)?;
                match store.find_dimension(def, &key) {
                    Ok(Some(id)) => {
                        map.insert(key, id);
                        stats.recovered += 1;
                    }
                    Ok(None) => {
                        error!(%key, "failed to retrieve existing id after integrity error for {}", def.table);
                        stats.missed += 1;
                    }
                    Err(e) => {
                        error!(%key, "lookup after integrity error on {} failed: {}", def.table, e);
                        stats.failed += 1;
                    }
                }
            }
            Err(e) => {
                error!(%key, "error inserting into {}: {}", def.table, e);
                undo_key(store, def)?;
                stats.failed += 1;
            }
        }
    }

    // 5) one commit for the whole dimension
    if store.in_transaction() {
        store
            .commit()
            .map_err(|e| abandon(store, e, def, "committing new rows"))?;
    }
    if stats.inserted > 0 {
        info!(inserted = stats.inserted, "inserted new records into {}", def.table);
    } else {
        info!("no new records to insert into {}", def.table);
    }

    Ok(Resolution { map, stats })
}
