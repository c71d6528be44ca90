// src/warehouse/store.rs

use super::dimension::{DimensionDef, NaturalKey, SurrogateId};
use super::fact::{FactRecord, FactTable};
use crate::error::StoreError;

/// The transactional relational store the warehouse is loaded into.
///
/// Statements run inside an implicit transaction that stays open until
/// [`commit`](Self::commit) or [`rollback`](Self::rollback). Savepoints nest
/// inside it and scope the undo of a single failed statement.
pub trait WarehouseStore {
    /// Every `(natural key, id)` currently in the dimension table, or
    /// `None` if the table does not exist.
    fn load_dimension(
        &mut self,
        def: &DimensionDef,
    ) -> Result<Option<Vec<(NaturalKey, SurrogateId)>>, StoreError>;

    /// Insert `key` and return the id the store assigned, in one round trip.
    fn insert_dimension(
        &mut self,
        def: &DimensionDef,
        key: &NaturalKey,
    ) -> Result<SurrogateId, StoreError>;

    /// Id of the row whose stored columns equal `key`.
    fn find_dimension(
        &mut self,
        def: &DimensionDef,
        key: &NaturalKey,
    ) -> Result<Option<SurrogateId>, StoreError>;

    fn savepoint(&mut self) -> Result<(), StoreError>;
    fn rollback_to_savepoint(&mut self) -> Result<(), StoreError>;
    fn release_savepoint(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;
    fn in_transaction(&self) -> bool;

    /// Delete every fact and reset the table's id sequence. `Ok(false)` if
    /// the table does not exist. Left uncommitted.
    fn clear_facts(&mut self, table: &FactTable) -> Result<bool, StoreError>;

    /// Insert all of `facts` through one prepared statement, executed per row
    /// inside one open transaction. Left uncommitted: a later rollback
    /// discards every row of the batch.
    fn insert_facts(&mut self, table: &FactTable, facts: &[FactRecord]) -> Result<usize, StoreError>;
}
