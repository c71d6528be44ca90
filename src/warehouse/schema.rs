// src/warehouse/schema.rs
//
// The six dimensions of the health-record star schema.
//
// Derived and placeholder key columns are computed here and nowhere else;
// the fact loader re-projects rows through these same definitions. If the
// source ever carries real sleep-quality or cancer values, replace the
// placeholders here and both sides follow.

use super::dimension::{DimensionDef, KeyColumn};
use crate::record::FieldSource;

/// `1` when `LastCheckupTime` mentions "year" at all, else `5`.
pub fn checkup_recency(row: &dyn FieldSource) -> Option<String> {
    let last = row.field("LastCheckupTime")?;
    let recency = if last.contains("year") { "1" } else { "5" };
    Some(recency.to_string())
}

pub fn activity_level(row: &dyn FieldSource) -> Option<String> {
    let level = match row.field("PhysicalActivities")? {
        "Yes" => "Active",
        _ => "Inactive",
    };
    Some(level.to_string())
}

/// Placeholder: the extract has no sleep-quality measure.
pub fn sleep_quality(_row: &dyn FieldSource) -> Option<String> {
    Some("Good".to_string())
}

/// Placeholder: the extract has no general cancer indicator.
pub fn had_cancer(_row: &dyn FieldSource) -> Option<String> {
    Some("No".to_string())
}

pub static PERSON: DimensionDef = DimensionDef {
    name: "person",
    table: "DimPerson",
    id_column: "PersonID",
    columns: &[
        KeyColumn::field("Sex", "Sex"),
        KeyColumn::field("AgeCategory", "AgeCategory"),
        KeyColumn::field("RaceEthnicityCategory", "RaceEthnicityCategory"),
    ],
};

pub static STATE: DimensionDef = DimensionDef {
    name: "state",
    table: "DimState",
    id_column: "StateID",
    columns: &[KeyColumn::field("State", "StateName")],
};

pub static CHECKUP: DimensionDef = DimensionDef {
    name: "checkup",
    table: "DimCheckupTime",
    id_column: "CheckupTimeID",
    columns: &[
        KeyColumn::field("LastCheckupTime", "LastCheckupTime"),
        KeyColumn::derived("CheckupRecency", checkup_recency, "CheckupRecency"),
    ],
};

pub static PHYSICAL_ACTIVITY: DimensionDef = DimensionDef {
    name: "physical_activity",
    table: "DimPhysicalActivity",
    id_column: "PhysicalActivityID",
    columns: &[
        KeyColumn::field("PhysicalActivities", "PhysicalActivities"),
        KeyColumn::derived("ActivityLevel", activity_level, "ActivityLevel"),
    ],
};

pub static LIFESTYLE: DimensionDef = DimensionDef {
    name: "lifestyle",
    table: "DimLifestyle",
    id_column: "LifestyleID",
    columns: &[
        KeyColumn::field("SmokerStatus", "SmokerStatus"),
        KeyColumn::field("ECigaretteUsage", "ECigaretteUsage"),
        KeyColumn::field("AlcoholDrinkers", "AlcoholDrinkers"),
        KeyColumn::derived("SleepQuality", sleep_quality, "SleepQuality"),
    ],
};

pub static CHRONIC_DISEASE: DimensionDef = DimensionDef {
    name: "chronic",
    table: "DimChronicDiseases",
    id_column: "ChronicDiseaseID",
    columns: &[
        KeyColumn::field("HadDiabetes", "HadDiabetes"),
        KeyColumn::field("HadArthritis", "HadArthritis"),
        KeyColumn::field("HadCOPD", "HadCOPD"),
        KeyColumn::field("HadKidneyDisease", "HadKidneyDisease"),
        KeyColumn::field("HadDepressiveDisorder", "HadDepressiveDisorder"),
        KeyColumn::derived("HadCancer", had_cancer, "HadCancer"),
        KeyColumn::field("HadSkinCancer", "HadSkinCancer"),
    ],
};

/// Load order of the dimensions.
pub static DIMENSIONS: [&DimensionDef; 6] = [
    &PERSON,
    &STATE,
    &CHECKUP,
    &PHYSICAL_ACTIVITY,
    &LIFESTYLE,
    &CHRONIC_DISEASE,
];
