//! Regeneration event repository trait (`tool_regenerations`).

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{CycleId, NewRegeneration, Regeneration, RegenerationId, ToolId};

#[async_trait]
pub trait RegenerationRepository: Send + Sync {
    /// Store a new regeneration event.
    async fn insert_regeneration(
        &self,
        regeneration: NewRegeneration,
    ) -> RepositoryResult<Regeneration>;

    /// Re-insert a previously deleted event under its original id.
    ///
    /// Used to undo a delete when a later step of the same operation fails.
    async fn restore_regeneration(&self, regeneration: &Regeneration) -> RepositoryResult<()>;

    /// Delete an event.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no event has this id
    async fn delete_regeneration(&self, id: RegenerationId) -> RepositoryResult<()>;

    /// The tool's most recent event (highest id).
    async fn last_regeneration_for_tool(
        &self,
        tool_id: ToolId,
    ) -> RepositoryResult<Option<Regeneration>>;

    /// Every event for a tool, newest first.
    async fn regeneration_history(&self, tool_id: ToolId) -> RepositoryResult<Vec<Regeneration>>;

    /// Whether any event was triggered by reading `cycle_id`.
    async fn has_regenerations_for_cycle(&self, cycle_id: CycleId) -> RepositoryResult<bool>;
}
