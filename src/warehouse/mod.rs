pub mod dimension;
pub mod fact;
pub mod load;
pub mod prepare;
pub mod report;
pub mod schema;
pub mod sqlite;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use dimension::{
    resolve, DimensionDef, DimensionMap, DimensionMaps, DimensionStats, KeyColumn, NaturalKey,
    Resolution, SurrogateId,
};
pub use fact::{build_fact, materialize, FactOutcome, FactRecord, FactSkip, FactTable, SkipReason};
pub use load::{load, run_load, LoadOptions};
pub use prepare::prepare_records;
pub use report::LoadReport;
pub use schema::DIMENSIONS;
pub use sqlite::SqliteStore;
pub use store::WarehouseStore;
