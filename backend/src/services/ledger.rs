//! Cycle ledger operations.
//!
//! Validation runs before anything is written; readings handed back to the
//! caller carry their derived partial cycles.

use log::{debug, info};

use super::partial_cycles::{annotate, annotate_all};
use super::validation_error;
use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    Actor, CycleId, CycleRecord, DiscontinuityPolicy, NewCycle, PressCycle, PressNumber, ToolId,
};

fn validate_write(
    operation: &str,
    cycle: &NewCycle,
    actor: &Actor,
) -> RepositoryResult<PressNumber> {
    actor
        .validate()
        .map_err(|e| validation_error(operation, "users", e))?;
    cycle
        .validate()
        .map_err(|e| validation_error(operation, "press_cycles", e))
}

fn validate_page(limit: Option<i64>, offset: Option<i64>) -> RepositoryResult<()> {
    for (name, value) in [("limit", limit), ("offset", offset)] {
        if let Some(v) = value {
            if v < 0 {
                return Err(validation_error(
                    "list_cycles_for_press",
                    "press_cycles",
                    format!("{} must not be negative, got {}", name, v),
                ));
            }
        }
    }
    Ok(())
}

/// Record a new reading.
///
/// # Returns
/// * `Ok(CycleRecord)` - The stored reading
/// * `Err(RepositoryError::ValidationError)` - Invalid press, id, total or actor
/// * `Err(RepositoryError::NotFound)` - The tool does not exist
pub async fn add_cycle<R: FullRepository + ?Sized>(
    repo: &R,
    cycle: NewCycle,
    actor: &Actor,
) -> RepositoryResult<CycleRecord> {
    let press = validate_write("add_cycle", &cycle, actor)?;
    repo.get_tool(cycle.tool_id)
        .await
        .map_err(|e| e.with_operation("add_cycle"))?;

    let record = repo.insert_cycle(press, cycle, actor.id).await?;
    info!(
        "Service layer: recorded cycle {} for tool {} on press {} {} (total {}) by {}",
        record.id,
        record.tool_id,
        record.press_number,
        record.tool_position,
        record.total_cycles,
        actor.name
    );
    Ok(record)
}

/// Get a reading with its partial cycles.
pub async fn get_cycle<R: FullRepository + ?Sized>(
    repo: &R,
    id: CycleId,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<PressCycle> {
    id.ensure_positive()
        .map_err(|e| validation_error("get_cycle", "press_cycles", e))?;
    let record = repo.get_cycle(id).await?;
    annotate(repo, record, policy).await
}

/// All readings of a tool, newest first.
pub async fn list_cycles_for_tool<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<Vec<PressCycle>> {
    tool_id
        .ensure_positive()
        .map_err(|e| validation_error("list_cycles_for_tool", "press_cycles", e))?;
    let records = repo.list_cycles_for_tool(tool_id).await?;
    debug!(
        "Service layer: {} readings for tool {}",
        records.len(),
        tool_id
    );
    annotate_all(repo, records, policy).await
}

/// Readings on a press, newest first, optionally paginated.
pub async fn list_cycles_for_press<R: FullRepository + ?Sized>(
    repo: &R,
    press: i16,
    limit: Option<i64>,
    offset: Option<i64>,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<Vec<PressCycle>> {
    let press = PressNumber::new(press)
        .map_err(|e| validation_error("list_cycles_for_press", "press_cycles", e))?;
    validate_page(limit, offset)?;
    let records = repo.list_cycles_for_press(press, limit, offset).await?;
    debug!(
        "Service layer: {} readings for press {} (limit {:?}, offset {:?})",
        records.len(),
        press,
        limit,
        offset
    );
    annotate_all(repo, records, policy).await
}

/// Correct every field of an existing reading.
///
/// The actor becomes the reading's `performed_by`.
pub async fn update_cycle<R: FullRepository + ?Sized>(
    repo: &R,
    id: CycleId,
    cycle: NewCycle,
    actor: &Actor,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<PressCycle> {
    id.ensure_positive()
        .map_err(|e| validation_error("update_cycle", "press_cycles", e))?;
    let press = validate_write("update_cycle", &cycle, actor)?;
    repo.get_tool(cycle.tool_id)
        .await
        .map_err(|e| e.with_operation("update_cycle"))?;

    let record = repo.update_cycle(id, press, cycle, actor.id).await?;
    info!(
        "Service layer: corrected cycle {} (tool {}, press {} {}, total {}) by {}",
        record.id,
        record.tool_id,
        record.press_number,
        record.tool_position,
        record.total_cycles,
        actor.name
    );
    annotate(repo, record, policy).await
}

/// Delete a reading.
///
/// # Returns
/// * `Err(RepositoryError::ValidationError)` - A regeneration still refers to it
/// * `Err(RepositoryError::NotFound)` - No such reading
pub async fn delete_cycle<R: FullRepository + ?Sized>(
    repo: &R,
    id: CycleId,
) -> RepositoryResult<()> {
    id.ensure_positive()
        .map_err(|e| validation_error("delete_cycle", "press_cycles", e))?;
    if repo.has_regenerations_for_cycle(id).await? {
        return Err(validation_error(
            "delete_cycle",
            "press_cycles",
            format!("cycle {} is referenced by a tool regeneration", id),
        ));
    }
    repo.delete_cycle(id).await?;
    info!("Service layer: deleted cycle {}", id);
    Ok(())
}

/// The most recent reading of a tool.
///
/// # Returns
/// * `Err(RepositoryError::NotFound)` - The tool has no readings
pub async fn last_cycle_for_tool<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<PressCycle> {
    let record = repo.last_cycle_for_tool(tool_id).await?.ok_or_else(|| {
        RepositoryError::not_found_with_context(
            format!("no press cycles recorded for tool {}", tool_id),
            ErrorContext::new("last_cycle_for_tool")
                .with_entity("press_cycles")
                .with_details(format!("tool_id={}", tool_id)),
        )
    })?;
    annotate(repo, record, policy).await
}
