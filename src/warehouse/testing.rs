// src/warehouse/testing.rs
//
// Fixtures shared by the warehouse tests.

use anyhow::Result;
use tempfile::TempDir;

use super::sqlite::SqliteStore;
use crate::record::Record;

pub const WAREHOUSE_DDL: &str = include_str!("../../sql/warehouse.sql");

/// A fresh on-disk warehouse with every table created.
pub fn warehouse_db() -> Result<(TempDir, SqliteStore)> {
    let dir = tempfile::tempdir()?;
    let store = SqliteStore::open(dir.path().join("warehouse.db"))?;
    store.connection().execute_batch(WAREHOUSE_DDL)?;
    Ok((dir, store))
}

/// A prepared survey row with every column the star schema reads.
pub fn survey_row(state: &str, sex: &str, heart_attack: &str) -> Record {
    [
        ("State", state),
        ("Sex", sex),
        ("AgeCategory", "Age 65 to 69"),
        ("RaceEthnicityCategory", "White only, Non-Hispanic"),
        ("LastCheckupTime", "Within past year (anytime less than 12 months ago)"),
        ("PhysicalActivities", "Yes"),
        ("SmokerStatus", "Never smoked"),
        ("ECigaretteUsage", "Never used e-cigarettes in my entire life"),
        ("AlcoholDrinkers", "No"),
        ("HadDiabetes", "No"),
        ("HadArthritis", "No"),
        ("HadCOPD", "No"),
        ("HadKidneyDisease", "No"),
        ("HadDepressiveDisorder", "No"),
        ("HadSkinCancer", "No"),
        ("HadHeartAttack", heart_attack),
        ("HadAngina", "No"),
        ("PhysicalHealthDays", "0"),
        ("MentalHealthDays", "2"),
        ("SleepHours", "8"),
        ("HeightInMeters", "1.7"),
        ("WeightInKilograms", "70.3"),
        ("BMI", "24.3"),
    ]
    .into_iter()
    .collect()
}

pub fn count(store: &SqliteStore, table: &str) -> Result<i64> {
    Ok(store
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
}
