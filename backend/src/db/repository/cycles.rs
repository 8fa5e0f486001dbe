//! Cycle ledger repository trait.
//!
//! Storage for cumulative counter readings (`press_cycles`). Implementations
//! store and return readings verbatim; deltas are derived by the service layer.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{CycleId, CycleRecord, NewCycle, Position, PressNumber, ToolId, UserId};

/// Repository trait for counter readings.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait CycleRepository: Send + Sync {
    // ==================== Health & Connection ====================

    /// Check if the storage backend is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if healthy
    /// - `Ok(false)` if unhealthy but no error occurred
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Readings ====================

    /// Store a new reading.
    ///
    /// The caller has validated `cycle` and resolved its press. A missing
    /// `date` is stored as the time of the insert.
    ///
    /// # Returns
    /// * `Ok(CycleRecord)` - The stored reading with its assigned id
    async fn insert_cycle(
        &self,
        press: PressNumber,
        cycle: NewCycle,
        performed_by: UserId,
    ) -> RepositoryResult<CycleRecord>;

    /// Get a reading by id.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no reading has this id
    async fn get_cycle(&self, id: CycleId) -> RepositoryResult<CycleRecord>;

    /// All readings taken for a tool, newest first (date, then id).
    async fn list_cycles_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Vec<CycleRecord>>;

    /// Readings on a press, newest first (date, then id).
    ///
    /// # Arguments
    /// * `limit` - Maximum number of readings to return, `None` for all
    /// * `offset` - Number of readings to skip, `None` for zero
    async fn list_cycles_for_press(
        &self,
        press: PressNumber,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<CycleRecord>>;

    /// Replace every field of reading `id`.
    ///
    /// # Returns
    /// * `Ok(CycleRecord)` - The corrected reading
    /// * `Err(RepositoryError::NotFound)` - If no reading has this id
    async fn update_cycle(
        &self,
        id: CycleId,
        press: PressNumber,
        cycle: NewCycle,
        performed_by: UserId,
    ) -> RepositoryResult<CycleRecord>;

    /// Delete reading `id`.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no reading has this id
    async fn delete_cycle(&self, id: CycleId) -> RepositoryResult<()>;

    /// Total of the nearest reading recorded before `before` on the same
    /// press and position, whichever tool it belongs to.
    async fn previous_slot_total(
        &self,
        press: PressNumber,
        position: Position,
        before: CycleId,
    ) -> RepositoryResult<Option<i64>>;

    /// The most recent reading for a tool (date, then id).
    async fn last_cycle_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Option<CycleRecord>>;
}
