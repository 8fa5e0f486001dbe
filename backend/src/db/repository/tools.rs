//! Tool repository trait.
//!
//! Covers the parts of the `tools` table the cycle accounting core depends
//! on: press assignment, cassette binding and the regenerating flag.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{NewTool, PressNumber, Tool, ToolId};

#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Register a tool. New tools are unbound and not regenerating.
    async fn insert_tool(&self, tool: NewTool) -> RepositoryResult<Tool>;

    /// Get a tool by id.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no tool has this id
    async fn get_tool(&self, id: ToolId) -> RepositoryResult<Tool>;

    /// All tools, ordered by id.
    async fn list_tools(&self) -> RepositoryResult<Vec<Tool>>;

    /// Set the regenerating flag.
    async fn set_regenerating(&self, id: ToolId, regenerating: bool) -> RepositoryResult<()>;

    /// Assign (or clear) the press of a tool and of its bound partner in one
    /// atomic unit.
    async fn assign_press(&self, id: ToolId, press: Option<PressNumber>) -> RepositoryResult<()>;

    /// Bind `cassette` to `target` in one atomic unit:
    ///
    /// 1. `cassette.binding = target`
    /// 2. `target.binding = cassette`
    /// 3. unassign every other cassette tool holding the target's press
    /// 4. `cassette.press = target.press`
    ///
    /// # Returns
    /// * `Err(RepositoryError::ValidationError)` - If either side became bound
    ///   before the unit ran; nothing is written in that case
    async fn bind_tools(&self, cassette: ToolId, target: ToolId) -> RepositoryResult<()>;

    /// Clear the binding on `id` and its partner in one atomic unit. The
    /// partner is cleared even if it no longer points back at `id`.
    ///
    /// # Returns
    /// * `Ok(Some(partner))` - The partner whose binding was cleared too
    /// * `Ok(None)` - If the tool was not bound
    async fn unbind_tool(&self, id: ToolId) -> RepositoryResult<Option<ToolId>>;
}
