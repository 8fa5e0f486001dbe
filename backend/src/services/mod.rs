//! Service layer for press cycle accounting.
//!
//! The submodules hold repository-agnostic functions generic over
//! [`FullRepository`]; [`PressService`] bundles them behind one handle that
//! also serializes writers per press.
//!
//! # Usage
//!
//! ```no_run
//! use pgpress::db::LocalRepository;
//! use pgpress::models::{Actor, NewCycle, Position, ToolId};
//! use pgpress::services::PressService;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = PressService::new(Arc::new(LocalRepository::new()));
//!     let actor = Actor::new(1, "Schichtleiter");
//!
//!     let cycle = NewCycle::new(3, ToolId(1), Position::Top, 125_000);
//!     service.add_cycle(cycle, &actor).await?;
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod ledger;
pub mod locks;
pub mod overlap;
pub mod partial_cycles;
pub mod regeneration;
pub mod summary;

pub use locks::{PressGuard, PressLocks};
pub use summary::{CycleSummaryData, ToolLookup};

use log::{debug, info};
use std::sync::Arc;

use crate::db::repo_config::AccountingSettings;
use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    Actor, CycleDelta, CycleId, CycleRecord, CycleSummaryStats, DiscontinuityPolicy, NewCycle,
    NewTool, OverlappingTool, PressCycle, PressNumber, Regeneration, Tool, ToolId, ToolSummary,
};

pub(crate) fn validation_error(
    operation: &str,
    entity: &str,
    message: impl Into<String>,
) -> RepositoryError {
    RepositoryError::validation_with_context(
        message,
        ErrorContext::new(operation).with_entity(entity),
    )
}

/// Entry point for all press cycle operations.
///
/// Reads go straight to the repository. Writes first take the lane of every
/// press they touch (see [`PressLocks`]) and re-check those presses once the
/// lanes are held.
pub struct PressService {
    repo: Arc<dyn FullRepository>,
    locks: PressLocks,
    settings: AccountingSettings,
}

impl PressService {
    pub fn new(repo: Arc<dyn FullRepository>) -> Self {
        Self {
            repo,
            locks: PressLocks::new(),
            settings: AccountingSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AccountingSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> AccountingSettings {
        self.settings
    }

    pub fn repository(&self) -> &Arc<dyn FullRepository> {
        &self.repo
    }

    fn policy(&self) -> DiscontinuityPolicy {
        self.settings.discontinuity_policy
    }

    /// Lanes of the press `tool_id` is on when the guards are handed out.
    async fn lock_tool(&self, tool_id: ToolId) -> RepositoryResult<Vec<PressGuard>> {
        let repo = self.repo.as_ref();
        self.locks
            .lock_current(move || async move {
                Ok::<_, RepositoryError>(vec![repo.get_tool(tool_id).await?.press])
            })
            .await
    }

    // ==================== Health & Tools ====================

    pub async fn health_check(&self) -> RepositoryResult<bool> {
        self.repo.health_check().await
    }

    /// Register a tool.
    pub async fn add_tool(&self, tool: NewTool) -> RepositoryResult<Tool> {
        tool.validate()
            .map_err(|e| validation_error("add_tool", "tools", e))?;
        let _guard = self.locks.lock(tool.press).await;
        let tool = self.repo.insert_tool(tool).await?;
        info!("Service layer: registered tool {} ({})", tool.id, tool);
        Ok(tool)
    }

    pub async fn get_tool(&self, tool_id: ToolId) -> RepositoryResult<Tool> {
        self.repo.get_tool(tool_id).await
    }

    pub async fn list_tools(&self) -> RepositoryResult<Vec<Tool>> {
        self.repo.list_tools().await
    }

    // ==================== Cycle Ledger ====================

    pub async fn add_cycle(&self, cycle: NewCycle, actor: &Actor) -> RepositoryResult<CycleRecord> {
        let _guard = self
            .locks
            .lock(PressNumber::new(cycle.press_number).ok())
            .await;
        ledger::add_cycle(self.repo.as_ref(), cycle, actor).await
    }

    pub async fn get_cycle(&self, id: CycleId) -> RepositoryResult<PressCycle> {
        ledger::get_cycle(self.repo.as_ref(), id, self.policy()).await
    }

    pub async fn list_cycles_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Vec<PressCycle>> {
        ledger::list_cycles_for_tool(self.repo.as_ref(), tool_id, self.policy()).await
    }

    pub async fn list_cycles_for_press(
        &self,
        press: i16,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<PressCycle>> {
        ledger::list_cycles_for_press(self.repo.as_ref(), press, limit, offset, self.policy()).await
    }

    /// Correct a reading. Locks both the press it was on and the press it moves to.
    pub async fn update_cycle(
        &self,
        id: CycleId,
        cycle: NewCycle,
        actor: &Actor,
    ) -> RepositoryResult<PressCycle> {
        id.ensure_positive()
            .map_err(|e| validation_error("update_cycle", "press_cycles", e))?;
        let repo = self.repo.as_ref();
        let target = PressNumber::new(cycle.press_number).ok();
        let _guards = self
            .locks
            .lock_current(move || async move {
                let current = repo.get_cycle(id).await?;
                Ok::<_, RepositoryError>(vec![Some(current.press_number), target])
            })
            .await?;
        ledger::update_cycle(self.repo.as_ref(), id, cycle, actor, self.policy()).await
    }

    pub async fn delete_cycle(&self, id: CycleId) -> RepositoryResult<()> {
        id.ensure_positive()
            .map_err(|e| validation_error("delete_cycle", "press_cycles", e))?;
        let repo = self.repo.as_ref();
        let _guards = self
            .locks
            .lock_current(move || async move {
                let current = repo.get_cycle(id).await?;
                Ok::<_, RepositoryError>(vec![Some(current.press_number)])
            })
            .await?;
        ledger::delete_cycle(self.repo.as_ref(), id).await
    }

    pub async fn last_cycle_for_tool(&self, tool_id: ToolId) -> RepositoryResult<PressCycle> {
        ledger::last_cycle_for_tool(self.repo.as_ref(), tool_id, self.policy()).await
    }

    pub async fn get_partial_cycles(&self, record: &CycleRecord) -> RepositoryResult<CycleDelta> {
        partial_cycles::partial_cycles(self.repo.as_ref(), record).await
    }

    // ==================== Regenerations ====================

    /// Cycles of `tool_id` among `cycles` since its last regeneration.
    pub async fn get_running_total(
        &self,
        tool_id: ToolId,
        cycles: &[PressCycle],
    ) -> RepositoryResult<i64> {
        regeneration::get_running_total(self.repo.as_ref(), tool_id, cycles).await
    }

    pub async fn get_current_total_cycles(&self, tool_id: ToolId) -> RepositoryResult<i64> {
        regeneration::current_total_cycles(self.repo.as_ref(), tool_id, self.policy()).await
    }

    pub async fn start_regeneration(
        &self,
        tool_id: ToolId,
        cycle_id: CycleId,
        reason: Option<String>,
        actor: &Actor,
    ) -> RepositoryResult<Regeneration> {
        let _guards = self.lock_tool(tool_id).await?;
        regeneration::add_tool_regeneration(self.repo.as_ref(), tool_id, cycle_id, reason, actor)
            .await
    }

    pub async fn start_regeneration_from_last_cycle(
        &self,
        tool_id: ToolId,
        reason: Option<String>,
        actor: &Actor,
    ) -> RepositoryResult<Regeneration> {
        let _guards = self.lock_tool(tool_id).await?;
        regeneration::start_tool_regeneration(self.repo.as_ref(), tool_id, reason, actor).await
    }

    pub async fn stop_regeneration(&self, tool_id: ToolId, actor: &Actor) -> RepositoryResult<()> {
        let _guards = self.lock_tool(tool_id).await?;
        regeneration::stop_tool_regeneration(self.repo.as_ref(), tool_id, actor).await
    }

    pub async fn abort_regeneration(
        &self,
        tool_id: ToolId,
        actor: &Actor,
    ) -> RepositoryResult<Option<Regeneration>> {
        let _guards = self.lock_tool(tool_id).await?;
        regeneration::abort_tool_regeneration(self.repo.as_ref(), tool_id, actor).await
    }

    pub async fn get_last_regeneration(&self, tool_id: ToolId) -> RepositoryResult<Regeneration> {
        regeneration::get_last_regeneration(self.repo.as_ref(), tool_id).await
    }

    pub async fn get_regeneration_history(
        &self,
        tool_id: ToolId,
    ) -> RepositoryResult<Vec<Regeneration>> {
        regeneration::get_regeneration_history(self.repo.as_ref(), tool_id).await
    }

    pub async fn has_regenerations_for_cycle(&self, cycle_id: CycleId) -> RepositoryResult<bool> {
        regeneration::has_regenerations_for_cycle(self.repo.as_ref(), cycle_id).await
    }

    // ==================== Bindings ====================

    /// Bind a cassette to a top tool. Locks the presses of both tools.
    pub async fn bind(&self, cassette: ToolId, target: ToolId) -> RepositoryResult<()> {
        let repo = self.repo.as_ref();
        // Unknown tools are reported by bind_tools itself.
        let _guards = self
            .locks
            .lock_current(move || async move {
                let (a, b) = (repo.get_tool(cassette).await, repo.get_tool(target).await);
                Ok::<_, RepositoryError>(vec![
                    a.ok().and_then(|t| t.press),
                    b.ok().and_then(|t| t.press),
                ])
            })
            .await?;
        binding::bind_tools(self.repo.as_ref(), cassette, target).await
    }

    pub async fn unbind(&self, tool_id: ToolId) -> RepositoryResult<Option<ToolId>> {
        let _guards = self.lock_tool(tool_id).await?;
        binding::unbind_tool(self.repo.as_ref(), tool_id).await
    }

    /// Move a tool (and its partner) to `press`, or take it off its press with `None`.
    pub async fn update_tool_press(
        &self,
        tool_id: ToolId,
        press: Option<i16>,
        actor: &Actor,
    ) -> RepositoryResult<()> {
        let repo = self.repo.as_ref();
        let target = press.and_then(|p| PressNumber::new(p).ok());
        let _guards = self
            .locks
            .lock_current(move || async move {
                let current = repo.get_tool(tool_id).await?;
                Ok::<_, RepositoryError>(vec![current.press, target])
            })
            .await?;
        binding::update_tool_press(self.repo.as_ref(), tool_id, press, actor).await
    }

    pub async fn update_regenerating(
        &self,
        tool_id: ToolId,
        regenerating: bool,
        actor: &Actor,
    ) -> RepositoryResult<()> {
        let _guards = self.lock_tool(tool_id).await?;
        binding::update_regenerating(self.repo.as_ref(), tool_id, regenerating, actor).await
    }

    pub async fn list_bindable_tools(&self, tool_id: ToolId) -> RepositoryResult<Vec<Tool>> {
        binding::list_bindable_tools(self.repo.as_ref(), tool_id).await
    }

    // ==================== Summaries ====================

    pub fn build_tool_summaries<L: ToolLookup + ?Sized>(
        &self,
        cycles: &[PressCycle],
        lookup: &L,
    ) -> Vec<ToolSummary> {
        summary::build_tool_summaries(cycles, lookup)
    }

    pub async fn get_cycle_summary_data(&self, press: i16) -> RepositoryResult<CycleSummaryData> {
        let data = summary::cycle_summary_data(self.repo.as_ref(), press, self.policy()).await?;
        debug!(
            "Service layer: summary data for press {} ({} readings, {} tools)",
            press,
            data.cycles.len(),
            data.tools.len()
        );
        Ok(data)
    }

    pub fn get_cycle_summary_stats(&self, cycles: &[PressCycle]) -> CycleSummaryStats {
        summary::cycle_summary_stats(cycles)
    }

    pub async fn get_overlapping_tools(&self) -> RepositoryResult<Vec<OverlappingTool>> {
        overlap::get_overlapping_tools(self.repo.as_ref(), self.policy()).await
    }
}
