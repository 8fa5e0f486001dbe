//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in
//! ordered maps behind a single lock, so every multi-row write is one
//! critical section.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::repository::*;
use crate::models::{
    CycleId, CycleRecord, NewCycle, NewRegeneration, NewTool, Position, PressNumber,
    Regeneration, RegenerationId, Tool, ToolId, UserId,
};

/// In-memory local repository.
///
/// # Example
/// ```
/// use pgpress::db::repositories::LocalRepository;
/// use pgpress::db::repository::ToolRepository;
/// use pgpress::models::{Format, NewTool, Position};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let repo = LocalRepository::new();
///     let tool = repo
///         .insert_tool(NewTool::new(Position::Top, Format::new(120, 60), "G01"))
///         .await
///         .unwrap();
///     assert_eq!(repo.get_tool(tool.id).await.unwrap().code, "G01");
/// });
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    tools: BTreeMap<ToolId, Tool>,
    cycles: BTreeMap<CycleId, CycleRecord>,
    regenerations: BTreeMap<RegenerationId, Regeneration>,

    // ID counters
    next_tool_id: i64,
    next_cycle_id: i64,
    next_regeneration_id: i64,

    // Connection health
    is_healthy: bool,
    // Injected failures: operation -> calls that still succeed before it fails
    failing_operations: Mutex<HashMap<String, usize>>,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            tools: BTreeMap::new(),
            cycles: BTreeMap::new(),
            regenerations: BTreeMap::new(),
            next_tool_id: 1,
            next_cycle_id: 1,
            next_regeneration_id: 1,
            is_healthy: true,
            failing_operations: Mutex::new(HashMap::new()),
        }
    }
}

impl LocalData {
    /// Fail if the repository is marked unhealthy or `operation` is injected.
    fn check(&self, operation: &str) -> RepositoryResult<()> {
        if !self.is_healthy {
            return Err(RepositoryError::connection_with_context(
                "Database is not healthy",
                ErrorContext::new(operation),
            ));
        }
        if let Some(remaining) = self.failing_operations.lock().get_mut(operation) {
            if *remaining == 0 {
                return Err(RepositoryError::query_with_context(
                    "injected failure",
                    ErrorContext::new(operation),
                ));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn tool(&self, id: ToolId, operation: &str) -> RepositoryResult<&Tool> {
        self.tools.get(&id).ok_or_else(|| tool_not_found(id, operation))
    }

    fn tool_mut(&mut self, id: ToolId, operation: &str) -> RepositoryResult<&mut Tool> {
        self.tools
            .get_mut(&id)
            .ok_or_else(|| tool_not_found(id, operation))
    }
}

fn tool_not_found(id: ToolId, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("Tool {} not found", id),
        ErrorContext::new(operation)
            .with_entity("tools")
            .with_entity_id(id),
    )
}

fn cycle_not_found(id: CycleId, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("Press cycle {} not found", id),
        ErrorContext::new(operation)
            .with_entity("press_cycles")
            .with_entity_id(id),
    )
}

fn newest_first(records: &mut [CycleRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Make every call of `operation` (a trait method name) fail with a
    /// query error until [`LocalRepository::clear_failures`] is called.
    pub fn fail_operation(&self, operation: &str) {
        self.fail_operation_after(operation, 0);
    }

    /// Let `calls` calls of `operation` succeed, then fail every later one.
    pub fn fail_operation_after(&self, operation: &str, calls: usize) {
        self.data
            .read()
            .failing_operations
            .lock()
            .insert(operation.to_string(), calls);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.data.read().failing_operations.lock().clear();
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        let is_healthy = data.is_healthy;
        *data = LocalData {
            is_healthy,
            ..Default::default()
        };
    }

    /// Get the number of readings stored.
    pub fn cycle_count(&self) -> usize {
        self.data.read().cycles.len()
    }

    /// Get the number of regeneration events stored.
    pub fn regeneration_count(&self) -> usize {
        self.data.read().regenerations.len()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CycleRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn insert_cycle(
        &self,
        press: PressNumber,
        cycle: NewCycle,
        performed_by: UserId,
    ) -> RepositoryResult<CycleRecord> {
        let mut data = self.data.write();
        data.check("insert_cycle")?;

        let id = CycleId(data.next_cycle_id);
        data.next_cycle_id += 1;
        let record = cycle.into_record(id, press, performed_by, Utc::now());
        data.cycles.insert(id, record.clone());
        Ok(record)
    }

    async fn get_cycle(&self, id: CycleId) -> RepositoryResult<CycleRecord> {
        let data = self.data.read();
        data.check("get_cycle")?;
        data.cycles
            .get(&id)
            .cloned()
            .ok_or_else(|| cycle_not_found(id, "get_cycle"))
    }

    async fn list_cycles_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Vec<CycleRecord>> {
        let data = self.data.read();
        data.check("list_cycles_for_tool")?;
        let mut records: Vec<CycleRecord> = data
            .cycles
            .values()
            .filter(|c| c.tool_id == tool_id)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn list_cycles_for_press(
        &self,
        press: PressNumber,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<CycleRecord>> {
        let data = self.data.read();
        data.check("list_cycles_for_press")?;
        let mut records: Vec<CycleRecord> = data
            .cycles
            .values()
            .filter(|c| c.press_number == press)
            .cloned()
            .collect();
        newest_first(&mut records);

        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_cycle(
        &self,
        id: CycleId,
        press: PressNumber,
        cycle: NewCycle,
        performed_by: UserId,
    ) -> RepositoryResult<CycleRecord> {
        let mut data = self.data.write();
        data.check("update_cycle")?;
        let existing = data
            .cycles
            .get_mut(&id)
            .ok_or_else(|| cycle_not_found(id, "update_cycle"))?;
        *existing = cycle.into_record(id, press, performed_by, Utc::now());
        Ok(existing.clone())
    }

    async fn delete_cycle(&self, id: CycleId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check("delete_cycle")?;
        data.cycles
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| cycle_not_found(id, "delete_cycle"))
    }

    async fn previous_slot_total(
        &self,
        press: PressNumber,
        position: Position,
        before: CycleId,
    ) -> RepositoryResult<Option<i64>> {
        let data = self.data.read();
        data.check("previous_slot_total")?;
        Ok(data
            .cycles
            .range(..before)
            .rev()
            .map(|(_, c)| c)
            .find(|c| c.press_number == press && c.tool_position == position)
            .map(|c| c.total_cycles))
    }

    async fn last_cycle_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Option<CycleRecord>> {
        let data = self.data.read();
        data.check("last_cycle_for_tool")?;
        Ok(data
            .cycles
            .values()
            .filter(|c| c.tool_id == tool_id)
            .max_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)))
            .cloned())
    }
}

#[async_trait]
impl ToolRepository for LocalRepository {
    async fn insert_tool(&self, tool: NewTool) -> RepositoryResult<Tool> {
        let mut data = self.data.write();
        data.check("insert_tool")?;
        let id = ToolId(data.next_tool_id);
        data.next_tool_id += 1;
        let tool = tool.into_tool(id);
        data.tools.insert(id, tool.clone());
        Ok(tool)
    }

    async fn get_tool(&self, id: ToolId) -> RepositoryResult<Tool> {
        let data = self.data.read();
        data.check("get_tool")?;
        data.tool(id, "get_tool").cloned()
    }

    async fn list_tools(&self) -> RepositoryResult<Vec<Tool>> {
        let data = self.data.read();
        data.check("list_tools")?;
        Ok(data.tools.values().cloned().collect())
    }

    async fn set_regenerating(&self, id: ToolId, regenerating: bool) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check("set_regenerating")?;
        data.tool_mut(id, "set_regenerating")?.regenerating = regenerating;
        Ok(())
    }

    async fn assign_press(&self, id: ToolId, press: Option<PressNumber>) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check("assign_press")?;
        let partner = data.tool(id, "assign_press")?.binding;
        if let Some(partner) = partner {
            data.tool(partner, "assign_press")?;
        }

        data.tool_mut(id, "assign_press")?.press = press;
        if let Some(partner) = partner {
            data.tool_mut(partner, "assign_press")?.press = press;
        }
        Ok(())
    }

    async fn bind_tools(&self, cassette: ToolId, target: ToolId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check("bind_tools")?;

        let cassette_tool = data.tool(cassette, "bind_tools")?;
        let target_tool = data.tool(target, "bind_tools")?;
        if cassette_tool.is_bound() || target_tool.is_bound() {
            return Err(RepositoryError::validation_with_context(
                "tool is already bound",
                ErrorContext::new("bind_tools")
                    .with_entity("tools")
                    .with_details(format!("cassette={}, target={}", cassette, target)),
            ));
        }
        let press = target_tool.press;

        data.tool_mut(cassette, "bind_tools")?.binding = Some(target);
        data.tool_mut(target, "bind_tools")?.binding = Some(cassette);
        if let Some(press) = press {
            for tool in data.tools.values_mut() {
                if tool.id != cassette
                    && tool.position == Position::TopCassette
                    && tool.press == Some(press)
                {
                    tool.press = None;
                }
            }
        }
        data.tool_mut(cassette, "bind_tools")?.press = press;
        Ok(())
    }

    async fn unbind_tool(&self, id: ToolId) -> RepositoryResult<Option<ToolId>> {
        let mut data = self.data.write();
        data.check("unbind_tool")?;
        let partner = data.tool_mut(id, "unbind_tool")?.binding.take();
        if let Some(partner) = partner {
            if let Some(p) = data.tools.get_mut(&partner) {
                p.binding = None;
            }
        }
        Ok(partner)
    }
}

#[async_trait]
impl RegenerationRepository for LocalRepository {
    async fn insert_regeneration(
        &self,
        regeneration: NewRegeneration,
    ) -> RepositoryResult<Regeneration> {
        let mut data = self.data.write();
        data.check("insert_regeneration")?;
        let id = RegenerationId(data.next_regeneration_id);
        data.next_regeneration_id += 1;
        let regeneration = regeneration.into_regeneration(id, Utc::now());
        data.regenerations.insert(id, regeneration.clone());
        Ok(regeneration)
    }

    async fn restore_regeneration(&self, regeneration: &Regeneration) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check("restore_regeneration")?;
        if data.regenerations.contains_key(&regeneration.id) {
            return Err(RepositoryError::already_exists_with_context(
                format!("Regeneration {} already exists", regeneration.id),
                ErrorContext::new("restore_regeneration")
                    .with_entity("tool_regenerations")
                    .with_entity_id(regeneration.id),
            ));
        }
        data.next_regeneration_id = data.next_regeneration_id.max(regeneration.id.0 + 1);
        data.regenerations
            .insert(regeneration.id, regeneration.clone());
        Ok(())
    }

    async fn delete_regeneration(&self, id: RegenerationId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check("delete_regeneration")?;
        data.regenerations.remove(&id).map(|_| ()).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Regeneration {} not found", id),
                ErrorContext::new("delete_regeneration")
                    .with_entity("tool_regenerations")
                    .with_entity_id(id),
            )
        })
    }

    async fn last_regeneration_for_tool(
        &self,
        tool_id: ToolId,
    ) -> RepositoryResult<Option<Regeneration>> {
        let data = self.data.read();
        data.check("last_regeneration_for_tool")?;
        Ok(data
            .regenerations
            .values()
            .rev()
            .find(|r| r.tool_id == tool_id)
            .cloned())
    }

    async fn regeneration_history(&self, tool_id: ToolId) -> RepositoryResult<Vec<Regeneration>> {
        let data = self.data.read();
        data.check("regeneration_history")?;
        Ok(data
            .regenerations
            .values()
            .rev()
            .filter(|r| r.tool_id == tool_id)
            .cloned()
            .collect())
    }

    async fn has_regenerations_for_cycle(&self, cycle_id: CycleId) -> RepositoryResult<bool> {
        let data = self.data.read();
        data.check("has_regenerations_for_cycle")?;
        Ok(data.regenerations.values().any(|r| r.cycle_id == cycle_id))
    }
}
