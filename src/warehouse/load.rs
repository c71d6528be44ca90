// src/warehouse/load.rs

use anyhow::{Context, Result};
use std::{fmt, path::Path};
use tracing::{info, instrument};

use super::dimension::{resolve, DimensionMaps};
use super::fact::{materialize, FactTable};
use super::prepare::prepare_records;
use super::report::LoadReport;
use super::schema::DIMENSIONS;
use super::sqlite::SqliteStore;
use super::store::WarehouseStore;
use crate::config::PipelineConfig;
use crate::record::{read_records_from_path, FieldSource};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub record_year: i32,
    pub fact_table: FactTable,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            record_year: 2022,
            fact_table: FactTable::default(),
        }
    }
}

impl From<&PipelineConfig> for LoadOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            record_year: cfg.record_year,
            fact_table: FactTable::new(cfg.fact_table.clone()),
        }
    }
}

/// Resolve every dimension in order, then replace the facts.
///
/// Each dimension commits on its own, so a failure leaves earlier dimensions
/// in place. The report is logged whether or not the run finished.
pub fn run_load<S, R>(store: &mut S, rows: &[R], opts: &LoadOptions) -> Result<LoadReport>
where
    S: WarehouseStore + ?Sized,
    R: FieldSource + fmt::Debug,
{
    let mut report = LoadReport::new(rows.len());
    let result = load_into(store, rows, opts, &mut report);
    report.log();
    result.map(|_| report)
}

fn load_into<S, R>(
    store: &mut S,
    rows: &[R],
    opts: &LoadOptions,
    report: &mut LoadReport,
) -> Result<()>
where
    S: WarehouseStore + ?Sized,
    R: FieldSource + fmt::Debug,
{
    info!("starting dimension table loading");
    let mut maps = DimensionMaps::new();
    for def in DIMENSIONS {
        let resolution = match resolve(store, rows, def) {
            Ok(r) => r,
            Err(e) => {
                report.failed_at = Some(format!("dimension {}", def.name));
                return Err(e);
            }
        };
        report.record_dimension(def.name, resolution.stats);
        maps.insert(def.name, resolution.map);
    }
    info!("dimension tables loaded");

    match materialize(store, rows, &maps, &opts.fact_table, opts.record_year) {
        Ok(outcome) => {
            report.record_facts(&outcome);
            Ok(())
        }
        Err(e) => {
            report.failed_at = Some(format!("fact table {}", opts.fact_table.name));
            Err(e)
        }
    }
}

/// Read a cleaned survey CSV, prepare it and load it into the configured
/// SQLite warehouse.
#[instrument(level = "info", skip(cfg), fields(csv = %csv.display(), database = %cfg.database.display()))]
pub fn load(csv: &Path, cfg: &PipelineConfig) -> Result<LoadReport> {
    info!("reading data from {}", csv.display());
    let mut rows = read_records_from_path(csv)?;
    prepare_records(&mut rows);

    let mut store = SqliteStore::open(&cfg.database)
        .with_context(|| format!("opening warehouse {:?}", cfg.database))?;
    let report = run_load(&mut store, &rows, &LoadOptions::from(cfg))?;
    info!("ETL process completed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BulkLoadError, StoreError};
    use crate::record::Record;
    use crate::warehouse::dimension::{NaturalKey, SurrogateId};
    use crate::warehouse::fact::FactRecord;
    use crate::warehouse::schema::{PERSON, STATE};
    use crate::warehouse::testing::{count, survey_row, warehouse_db};
    use crate::warehouse::DimensionDef;
    use rusqlite::{params, Connection};

    fn rows() -> Vec<Record> {
        vec![
            survey_row("Ohio", "Female", "No"),
            survey_row("Utah", "Male", "Yes"),
            survey_row("Ohio", "Female", "No"),
            survey_row("Ohio", "Male", "No"),
        ]
    }

    #[test]
    fn rerun_reuses_every_id() -> Result<()> {
        let (_dir, mut store) = warehouse_db()?;
        let data = rows();

        let first = run_load(&mut store, &data, &LoadOptions::default())?;
        let state = first.dimension("state").unwrap();
        assert_eq!((state.seeded, state.distinct, state.inserted), (0, 2, 2));
        assert_eq!(first.dimension("person").unwrap().inserted, 2);
        assert_eq!(first.dimension("chronic").unwrap().inserted, 1);
        assert_eq!(first.facts_written, 4);
        let first_map = resolve(&mut store, &data, &STATE)?.map;

        let second = run_load(&mut store, &data, &LoadOptions::default())?;
        for (name, stats) in &second.dimensions {
            assert_eq!(stats.inserted, 0, "{} inserted on rerun", name);
        }
        assert_eq!(second.dimension("state").unwrap().seeded, 2);
        assert_eq!(resolve(&mut store, &data, &STATE)?.map, first_map);

        // facts are replaced, not appended
        assert_eq!(count(&store, "HealthRecord")?, 4);
        assert_eq!(count(&store, "DimState")?, 2);
        Ok(())
    }

    #[test]
    fn duplicate_keys_share_one_row() -> Result<()> {
        let (_dir, mut store) = warehouse_db()?;
        let data = rows();
        let res = resolve(&mut store, &data, &STATE)?;
        assert_eq!(res.stats.inserted, 2);
        assert_eq!(res.map.len(), 2);

        run_load(&mut store, &data, &LoadOptions::default())?;
        let mut stmt = store
            .connection()
            .prepare("SELECT StateID, HeartDiseaseFlag FROM HealthRecord ORDER BY RecordID")?;
        let facts = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let ohio = res.map[&NaturalKey::new(["Ohio"])];
        let utah = res.map[&NaturalKey::new(["Utah"])];
        assert_eq!(facts, vec![(ohio, 0), (utah, 1), (ohio, 0), (ohio, 0)]);
        Ok(())
    }

    #[test]
    fn missing_tables_seed_empty() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store
            .connection()
            .execute_batch("CREATE TABLE DimState (StateID INTEGER PRIMARY KEY AUTOINCREMENT, StateName TEXT UNIQUE)")?;
        let res = resolve(&mut store, &rows(), &STATE)?;
        assert_eq!(res.stats.seeded, 0);
        assert_eq!(res.stats.inserted, 2);

        // no table at all: seeding is fine, every insert fails
        let res = resolve(&mut store, &rows(), &PERSON)?;
        assert_eq!(res.stats.seeded, 0);
        assert_eq!(res.stats.failed, 2);
        assert!(res.map.is_empty());
        assert!(!store.in_transaction());
        Ok(())
    }

    #[test]
    fn rows_with_unresolvable_keys_are_skipped() -> Result<()> {
        let (_dir, mut store) = warehouse_db()?;
        let mut data = rows();
        let mut partial = survey_row("Iowa", "Female", "No");
        partial.remove("SmokerStatus");
        data.push(partial);

        let report = run_load(&mut store, &data, &LoadOptions::default())?;
        assert_eq!(report.facts_written + report.facts_skipped, data.len());
        assert_eq!(report.facts_skipped, 1);
        assert_eq!(report.dimension("lifestyle").unwrap().incomplete_rows, 1);
        assert_eq!(report.skip_reasons.get("lifestyle: missing SmokerStatus"), Some(&1));
        assert_eq!(count(&store, "HealthRecord")?, 4);
        Ok(())
    }

    #[test]
    fn missing_fact_table_fails_after_dimensions_commit() -> Result<()> {
        let (_dir, mut store) = warehouse_db()?;
        let opts = LoadOptions {
            fact_table: FactTable::new("NoSuchFacts"),
            ..Default::default()
        };
        let err = run_load(&mut store, &rows(), &opts).unwrap_err();
        // the clear is skipped, the insert then has nowhere to go
        let bulk = err.downcast_ref::<BulkLoadError>().unwrap();
        assert!(matches!(bulk.source, StoreError::MissingTable { .. }));
        assert_eq!(bulk.rows, 4);
        // dimensions committed before the fact stage stay
        assert_eq!(count(&store, "DimState")?, 2);
        assert!(!store.in_transaction());
        Ok(())
    }

    #[test]
    fn failed_bulk_insert_keeps_nothing() -> Result<()> {
        let (_dir, mut store) = warehouse_db()?;
        run_load(&mut store, &rows(), &LoadOptions::default())?;
        assert_eq!(count(&store, "HealthRecord")?, 4);

        store.connection().execute_batch(
            "CREATE TRIGGER reject_utah BEFORE INSERT ON HealthRecord
             WHEN NEW.HeartDiseaseFlag = 1
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )?;
        let err = run_load(&mut store, &rows(), &LoadOptions::default()).unwrap_err();
        let bulk = err.downcast_ref::<BulkLoadError>().unwrap();
        assert_eq!(bulk.table, "HealthRecord");
        assert_eq!(bulk.rows, 4);

        // the clear was committed separately; none of the batch survived
        assert_eq!(count(&store, "HealthRecord")?, 0);
        assert!(!store.in_transaction());
        Ok(())
    }

    /// Commits the first new key through a second connection right before
    /// the wrapped store tries to insert it, as a concurrent run would.
    struct PreemptingStore {
        inner: SqliteStore,
        rival: Connection,
        preempted: Option<SurrogateId>,
    }

    impl WarehouseStore for PreemptingStore {
        fn load_dimension(
            &mut self,
            def: &DimensionDef,
        ) -> Result<Option<Vec<(NaturalKey, SurrogateId)>>, StoreError> {
            self.inner.load_dimension(def)
        }

        fn insert_dimension(
            &mut self,
            def: &DimensionDef,
            key: &NaturalKey,
        ) -> Result<SurrogateId, StoreError> {
            if self.preempted.is_none() {
                let id = self.rival.query_row(
                    "INSERT INTO DimState (StateName) VALUES (?1) RETURNING StateID",
                    params![key.parts()[0]],
                    |r| r.get(0),
                )?;
                self.preempted = Some(id);
            }
            self.inner.insert_dimension(def, key)
        }

        fn find_dimension(
            &mut self,
            def: &DimensionDef,
            key: &NaturalKey,
        ) -> Result<Option<SurrogateId>, StoreError> {
            self.inner.find_dimension(def, key)
        }

        fn savepoint(&mut self) -> Result<(), StoreError> {
            self.inner.savepoint()
        }
        fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
            self.inner.rollback_to_savepoint()
        }
        fn release_savepoint(&mut self) -> Result<(), StoreError> {
            self.inner.release_savepoint()
        }
        fn commit(&mut self) -> Result<(), StoreError> {
            self.inner.commit()
        }
        fn rollback(&mut self) -> Result<(), StoreError> {
            self.inner.rollback()
        }
        fn in_transaction(&self) -> bool {
            self.inner.in_transaction()
        }
        fn clear_facts(&mut self, table: &FactTable) -> Result<bool, StoreError> {
            self.inner.clear_facts(table)
        }
        fn insert_facts(
            &mut self,
            table: &FactTable,
            facts: &[FactRecord],
        ) -> Result<usize, StoreError> {
            self.inner.insert_facts(table, facts)
        }
    }

    #[test]
    fn concurrent_insert_is_recovered() -> Result<()> {
        let (dir, inner) = warehouse_db()?;
        let rival = Connection::open(dir.path().join("warehouse.db"))?;
        let mut store = PreemptingStore {
            inner,
            rival,
            preempted: None,
        };

        let res = resolve(&mut store, &rows(), &STATE)?;
        let rival_id = store.preempted.unwrap();
        assert_eq!(res.stats.conflicts, 1);
        assert_eq!(res.stats.recovered, 1);
        assert_eq!(res.stats.inserted, 1);
        assert_eq!(res.map[&NaturalKey::new(["Ohio"])], rival_id);
        assert_eq!(res.map.len(), 2);
        assert!(!store.in_transaction());
        assert_eq!(count(&store.inner, "DimState")?, 2);
        Ok(())
    }

    /// Delegates to SQLite, except that inserting `phantom` reports a
    /// uniqueness violation with no row behind it, and `fail_release`
    /// makes every savepoint release fail.
    struct FaultyStore {
        inner: SqliteStore,
        phantom: Option<&'static str>,
        fail_release: bool,
    }

    impl FaultyStore {
        fn new(inner: SqliteStore) -> Self {
            Self {
                inner,
                phantom: None,
                fail_release: false,
            }
        }
    }

    impl WarehouseStore for FaultyStore {
        fn load_dimension(
            &mut self,
            def: &DimensionDef,
        ) -> Result<Option<Vec<(NaturalKey, SurrogateId)>>, StoreError> {
            self.inner.load_dimension(def)
        }

        fn insert_dimension(
            &mut self,
            def: &DimensionDef,
            key: &NaturalKey,
        ) -> Result<SurrogateId, StoreError> {
            if def.name == "state" && self.phantom == key.parts().first().map(String::as_str) {
                return Err(StoreError::UniqueViolation {
                    table: def.table.to_string(),
                });
            }
            self.inner.insert_dimension(def, key)
        }

        fn find_dimension(
            &mut self,
            def: &DimensionDef,
            key: &NaturalKey,
        ) -> Result<Option<SurrogateId>, StoreError> {
            self.inner.find_dimension(def, key)
        }

        fn savepoint(&mut self) -> Result<(), StoreError> {
            self.inner.savepoint()
        }
        fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
            self.inner.rollback_to_savepoint()
        }
        fn release_savepoint(&mut self) -> Result<(), StoreError> {
            if self.fail_release {
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            self.inner.release_savepoint()
        }
        fn commit(&mut self) -> Result<(), StoreError> {
            self.inner.commit()
        }
        fn rollback(&mut self) -> Result<(), StoreError> {
            self.inner.rollback()
        }
        fn in_transaction(&self) -> bool {
            self.inner.in_transaction()
        }
        fn clear_facts(&mut self, table: &FactTable) -> Result<bool, StoreError> {
            self.inner.clear_facts(table)
        }
        fn insert_facts(
            &mut self,
            table: &FactTable,
            facts: &[FactRecord],
        ) -> Result<usize, StoreError> {
            self.inner.insert_facts(table, facts)
        }
    }

    #[test]
    fn conflict_without_row_drops_dependent_facts() -> Result<()> {
        let (_dir, inner) = warehouse_db()?;
        let mut store = FaultyStore::new(inner);
        store.phantom = Some("Utah");
        let data = rows();

        let report = run_load(&mut store, &data, &LoadOptions::default())?;
        let state = report.dimension("state").unwrap();
        assert_eq!(state.inserted, 1);
        assert_eq!(state.conflicts, 1);
        assert_eq!(state.recovered, 0);
        assert_eq!(state.missed, 1);

        assert_eq!(report.facts_written, 3);
        assert_eq!(report.facts_skipped, 1);
        assert_eq!(report.facts_written + report.facts_skipped, data.len());
        assert_eq!(report.skip_reasons.get("state: unresolved key"), Some(&1));
        assert!(!store.in_transaction());
        assert_eq!(count(&store.inner, "DimState")?, 1);
        assert_eq!(count(&store.inner, "HealthRecord")?, 3);
        Ok(())
    }

    #[test]
    fn savepoint_failure_closes_the_transaction() -> Result<()> {
        let (_dir, inner) = warehouse_db()?;
        let mut store = FaultyStore::new(inner);
        store.fail_release = true;

        let err = resolve(&mut store, &rows(), &STATE).unwrap_err();
        assert!(err.to_string().contains("releasing savepoint on DimState"));
        assert!(!store.in_transaction());
        // the key inserted before the failure went with the rollback
        assert_eq!(count(&store.inner, "DimState")?, 0);
        Ok(())
    }
}
