// src/warehouse/fact.rs

use anyhow::{Context, Result};
use std::fmt;
use tracing::{error, info, instrument, warn};

use super::dimension::{DimensionDef, DimensionMaps, MissingField, NaturalKey, SurrogateId};
use super::schema::{CHECKUP, CHRONIC_DISEASE, LIFESTYLE, PERSON, PHYSICAL_ACTIVITY, STATE};
use super::store::WarehouseStore;
use crate::error::BulkLoadError;
use crate::record::FieldSource;

/// Fact table columns, in [`FactRecord`] field order.
pub const FACT_COLUMNS: [&str; 14] = [
    "PersonID",
    "StateID",
    "CheckupTimeID",
    "PhysicalActivityID",
    "ChronicDiseaseID",
    "LifestyleID",
    "HeartDiseaseFlag",
    "PhysicalHealthDays",
    "MentalHealthDays",
    "SleepHours",
    "HeightInMeters",
    "WeightInKilograms",
    "BMI",
    "RecordYear",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactTable {
    pub name: String,
}

impl FactTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for FactTable {
    fn default() -> Self {
        Self::new("HealthRecord")
    }
}

/// One row of the fact table.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRecord {
    pub person_id: SurrogateId,
    pub state_id: SurrogateId,
    pub checkup_id: SurrogateId,
    pub physical_activity_id: SurrogateId,
    pub chronic_disease_id: SurrogateId,
    pub lifestyle_id: SurrogateId,
    pub heart_disease_flag: bool,
    pub physical_health_days: Option<f64>,
    pub mental_health_days: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub height_m: Option<f64>,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub record_year: i32,
}

/// Why a row produced no fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(MissingField),
    UnresolvedKey {
        dimension: &'static str,
        key: NaturalKey,
    },
}

impl SkipReason {
    /// Short grouping label for reporting.
    pub fn label(&self) -> String {
        match self {
            SkipReason::MissingField(m) => format!("{}: missing {}", m.dimension, m.column),
            SkipReason::UnresolvedKey { dimension, .. } => format!("{}: unresolved key", dimension),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingField(m) => write!(f, "{}", m),
            SkipReason::UnresolvedKey { dimension, key } => {
                write!(f, "no {} id for key {}", dimension, key)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactSkip {
    /// 0-based input row index.
    pub row: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FactOutcome {
    pub written: usize,
    pub skipped: Vec<FactSkip>,
}

fn lookup<R: FieldSource>(
    def: &DimensionDef,
    row: &R,
    maps: &DimensionMaps,
) -> Result<SurrogateId, SkipReason> {
    let key = def.key_for(row).map_err(SkipReason::MissingField)?;
    match maps.get(def.name).and_then(|m| m.get(&key)) {
        Some(id) => Ok(*id),
        None => Err(SkipReason::UnresolvedKey {
            dimension: def.name,
            key,
        }),
    }
}

fn measure<R: FieldSource>(row: &R, name: &str) -> Option<f64> {
    row.field(name).and_then(|v| v.trim().parse().ok())
}

/// Heart attack or angina.
pub fn heart_disease_flag<R: FieldSource>(row: &R) -> bool {
    row.field("HadHeartAttack") == Some("Yes") || row.field("HadAngina") == Some("Yes")
}

/// Resolve every foreign key of `row`; the first miss rejects the row.
pub fn build_fact<R: FieldSource>(
    row: &R,
    maps: &DimensionMaps,
    record_year: i32,
) -> Result<FactRecord, SkipReason> {
    Ok(FactRecord {
        person_id: lookup(&PERSON, row, maps)?,
        state_id: lookup(&STATE, row, maps)?,
        checkup_id: lookup(&CHECKUP, row, maps)?,
        physical_activity_id: lookup(&PHYSICAL_ACTIVITY, row, maps)?,
        chronic_disease_id: lookup(&CHRONIC_DISEASE, row, maps)?,
        lifestyle_id: lookup(&LIFESTYLE, row, maps)?,
        heart_disease_flag: heart_disease_flag(row),
        physical_health_days: measure(row, "PhysicalHealthDays"),
        mental_health_days: measure(row, "MentalHealthDays"),
        sleep_hours: measure(row, "SleepHours"),
        height_m: measure(row, "HeightInMeters"),
        weight_kg: measure(row, "WeightInKilograms"),
        bmi: measure(row, "BMI"),
        record_year,
    })
}

/// Replace the fact table's contents with one fact per resolvable row.
///
/// Rows with any unresolved dimension key are dropped and reported in the
/// outcome. The surviving facts are inserted and committed as one unit; on
/// failure nothing is kept and [`BulkLoadError`] is returned.
#[instrument(level = "info", skip(store, rows, maps), fields(table = %table.name))]
pub fn materialize<S, R>(
    store: &mut S,
    rows: &[R],
    maps: &DimensionMaps,
    table: &FactTable,
    record_year: i32,
) -> Result<FactOutcome>
where
    S: WarehouseStore + ?Sized,
    R: FieldSource + fmt::Debug,
{
    // 1) full replace: clear old facts first
    info!("clearing existing data from {}", table.name);
    match store.clear_facts(table) {
        Ok(true) => {
            store
                .commit()
                .with_context(|| format!("committing clear of {}", table.name))?;
            info!("{} table cleared", table.name);
        }
        Ok(false) => {
            warn!("{} table not found, skipping delete", table.name);
            store.rollback()?;
        }
        Err(e) => {
            store.rollback().ok();
            return Err(e).with_context(|| format!("clearing {}", table.name));
        }
    }

    // 2) resolve foreign keys
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        match build_fact(row, maps, record_year) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(row = index, %reason, data = ?row, "skipping row");
                skipped.push(FactSkip { row: index, reason });
            }
        }
    }

    if records.is_empty() {
        info!("no records to insert into {}", table.name);
        return Ok(FactOutcome {
            written: 0,
            skipped,
        });
    }

    // 3) one atomic batch
    let pending = records.len();
    let result = store
        .insert_facts(table, &records)
        .and_then(|n| store.commit().map(|_| n));
    match result {
        Ok(written) => {
            info!(written, skipped = skipped.len(), "inserted records into {}", table.name);
            Ok(FactOutcome { written, skipped })
        }
        Err(source) => {
            store.rollback().ok();
            error!("failed to bulk insert into {}: {}", table.name, source);
            Err(BulkLoadError {
                table: table.name.clone(),
                rows: pending,
                source,
            }
            .into())
        }
    }
}
