// src/warehouse/sqlite.rs

use rusqlite::{
    ffi, params, params_from_iter, types::ValueRef, Connection, ErrorCode, OptionalExtension,
};
use std::path::Path;
use tracing::{debug, trace};

use super::dimension::{DimensionDef, NaturalKey, SurrogateId};
use super::fact::{FactRecord, FactTable, FACT_COLUMNS};
use super::store::WarehouseStore;
use crate::error::StoreError;

const SAVEPOINT: &str = "dimension_key";

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Map a driver error onto the cases the load branches on.
fn classify(err: rusqlite::Error, table: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, msg) = &err {
        if e.code == ErrorCode::ConstraintViolation
            && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        {
            return StoreError::UniqueViolation {
                table: table.to_string(),
            };
        }
        if msg
            .as_deref()
            .map(|m| m.starts_with("no such table"))
            .unwrap_or(false)
        {
            return StoreError::MissingTable {
                table: table.to_string(),
            };
        }
    }
    StoreError::Sqlite(err)
}

/// Stored values are compared as text: integers and reals are rendered the
/// way they would have been bound, NULL reads as empty.
fn value_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// [`WarehouseStore`] over a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_transaction(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            trace!("BEGIN");
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn key_predicate(def: &DimensionDef) -> String {
        def.stored_columns()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote(c), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl WarehouseStore for SqliteStore {
    fn load_dimension(
        &mut self,
        def: &DimensionDef,
    ) -> Result<Option<Vec<(NaturalKey, SurrogateId)>>, StoreError> {
        let n = def.columns.len();
        let cols: Vec<String> = def.stored_columns().map(quote).collect();
        let sql = format!(
            "SELECT {}, {} FROM {}",
            cols.join(", "),
            quote(def.id_column),
            quote(def.table)
        );

        let mut stmt = match self.conn.prepare(&sql) {
            Ok(s) => s,
            Err(e) => {
                return match classify(e, def.table) {
                    StoreError::MissingTable { .. } => Ok(None),
                    other => Err(other),
                }
            }
        };
        let rows = stmt
            .query_map([], |row| {
                let mut parts = Vec::with_capacity(n);
                for i in 0..n {
                    parts.push(value_text(row.get_ref(i)?));
                }
                let id: SurrogateId = row.get(n)?;
                Ok((NaturalKey::new(parts), id))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(table = def.table, rows = rows.len(), "loaded dimension");
        Ok(Some(rows))
    }

    fn insert_dimension(
        &mut self,
        def: &DimensionDef,
        key: &NaturalKey,
    ) -> Result<SurrogateId, StoreError> {
        self.ensure_transaction()?;
        let cols: Vec<String> = def.stored_columns().map(quote).collect();
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote(def.table),
            cols.join(", "),
            placeholders.join(", "),
            quote(def.id_column)
        );
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| classify(e, def.table))?;
        stmt.query_row(params_from_iter(key.parts()), |row| row.get(0))
            .map_err(|e| classify(e, def.table))
    }

    fn find_dimension(
        &mut self,
        def: &DimensionDef,
        key: &NaturalKey,
    ) -> Result<Option<SurrogateId>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            quote(def.id_column),
            quote(def.table),
            Self::key_predicate(def)
        );
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| classify(e, def.table))?;
        stmt.query_row(params_from_iter(key.parts()), |row| row.get(0))
            .optional()
            .map_err(|e| classify(e, def.table))
    }

    fn savepoint(&mut self) -> Result<(), StoreError> {
        // a bare SAVEPOINT would become the outer transaction and RELEASE
        // would commit it
        self.ensure_transaction()?;
        self.conn.execute_batch(&format!("SAVEPOINT {}", SAVEPOINT))?;
        Ok(())
    }

    fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))?;
        Ok(())
    }

    fn release_savepoint(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            trace!("COMMIT");
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            trace!("ROLLBACK");
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn clear_facts(&mut self, table: &FactTable) -> Result<bool, StoreError> {
        self.ensure_transaction()?;
        match self
            .conn
            .execute(&format!("DELETE FROM {}", quote(&table.name)), [])
        {
            Ok(n) => debug!(table = %table.name, deleted = n, "cleared facts"),
            Err(e) => {
                return match classify(e, &table.name) {
                    StoreError::MissingTable { .. } => Ok(false),
                    other => Err(other),
                }
            }
        }

        // sqlite_sequence only exists once some AUTOINCREMENT table does
        match self.conn.execute(
            "DELETE FROM sqlite_sequence WHERE name = ?1",
            params![table.name],
        ) {
            Ok(_) => {}
            Err(e) => match classify(e, "sqlite_sequence") {
                StoreError::MissingTable { .. } => {}
                other => return Err(other),
            },
        }
        Ok(true)
    }

    /// Executes the cached insert once per fact, all inside the transaction
    /// opened here. Nothing commits until the caller does, so the batch is
    /// kept or rolled back as a whole.
    fn insert_facts(&mut self, table: &FactTable, facts: &[FactRecord]) -> Result<usize, StoreError> {
        self.ensure_transaction()?;
        let cols: Vec<String> = FACT_COLUMNS.iter().map(|c| quote(c)).collect();
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&table.name),
            cols.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| classify(e, &table.name))?;
        for f in facts {
            stmt.execute(params![
                f.person_id,
                f.state_id,
                f.checkup_id,
                f.physical_activity_id,
                f.chronic_disease_id,
                f.lifestyle_id,
                f.heart_disease_flag,
                f.physical_health_days,
                f.mental_health_days,
                f.sleep_hours,
                f.height_m,
                f.weight_kg,
                f.bmi,
                f.record_year,
            ])
            .map_err(|e| classify(e, &table.name))?;
        }
        Ok(facts.len())
    }
}
