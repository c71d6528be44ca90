// src/warehouse/prepare.rs

use tracing::{debug, info};

use crate::record::Record;

/// Indicator columns reduced to exactly `Yes` / `No`.
pub const YES_NO_COLUMNS: [&str; 12] = [
    "HadHeartAttack",
    "HadAngina",
    "HadStroke",
    "HadAsthma",
    "HadSkinCancer",
    "HadCOPD",
    "HadDepressiveDisorder",
    "HadKidneyDisease",
    "HadArthritis",
    "HadDiabetes",
    "PhysicalActivities",
    "AlcoholDrinkers",
];

/// Measures whose missing values take the column mean.
pub const MEAN_COLUMNS: [&str; 4] = ["SleepHours", "HeightInMeters", "WeightInKilograms", "BMI"];

/// Measures whose missing values take zero.
pub const ZERO_FILL_COLUMNS: [&str; 2] = ["PhysicalHealthDays", "MentalHealthDays"];

fn is_missing(value: Option<&str>) -> bool {
    matches!(value, None | Some("") | Some("NA") | Some("None"))
}

/// Mean of the parsable, non-missing values of `column`; 0 if there are none.
pub fn column_mean(rows: &[Record], column: &str) -> f64 {
    let (sum, count) = rows
        .iter()
        .map(|r| r.get(column))
        .filter(|v| !is_missing(*v))
        .filter_map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Clean rows in place before loading.
pub fn prepare_records(rows: &mut [Record]) {
    let mut fills: Vec<(&str, f64)> = ZERO_FILL_COLUMNS.iter().map(|c| (*c, 0.0)).collect();
    for column in MEAN_COLUMNS {
        let mean = column_mean(rows, column);
        debug!(column, mean, "mean fill value");
        fills.push((column, mean));
    }

    let mut filled = 0usize;
    let mut zeroed = 0usize;

    for row in rows.iter_mut() {
        for (column, fill) in &fills {
            let value = if is_missing(row.get(column)) {
                filled += 1;
                fill.to_string()
            } else {
                let raw = row.get(column).unwrap_or_default();
                match raw.trim().parse::<f64>() {
                    Ok(v) => v.to_string(),
                    Err(_) => {
                        zeroed += 1;
                        "0".to_string()
                    }
                }
            };
            row.set(*column, value);
        }

        for column in YES_NO_COLUMNS {
            if let Some(v) = row.get(column) {
                let normalized = if v == "Yes" { "Yes" } else { "No" };
                row.set(column, normalized);
            }
        }
    }

    info!(rows = rows.len(), filled, zeroed, "prepared records");
}
