//! Regeneration tracking.
//!
//! Starting and aborting a regeneration each touch two tables (the tool's
//! `regenerating` flag and `tool_regenerations`). Both run as a saga: the
//! steps run in order and, if a later step fails, the earlier ones are
//! undone. A failed undo surfaces as [`RepositoryError::CompensationFailed`]
//! carrying both causes.

use log::{error, info, warn};

use super::partial_cycles::annotate_all;
use super::validation_error;
use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    Actor, CycleId, DiscontinuityPolicy, NewRegeneration, PressCycle, Regeneration, ToolId,
};

fn validate_actor(operation: &str, actor: &Actor) -> RepositoryResult<()> {
    actor
        .validate()
        .map_err(|e| validation_error(operation, "users", e))
}

fn context(operation: &str, tool_id: ToolId) -> ErrorContext {
    ErrorContext::new(operation)
        .with_entity("tool_regenerations")
        .with_details(format!("tool_id={}", tool_id))
}

/// Start a regeneration of `tool_id`, anchored to reading `cycle_id`.
///
/// Sets the tool's `regenerating` flag, then stores the event. If storing
/// the event fails, the flag is put back to its previous value.
///
/// # Returns
/// * `Ok(Regeneration)` - The stored event
/// * `Err(RepositoryError::NotFound)` - Unknown tool or reading
/// * `Err(RepositoryError::ValidationError)` - The reading belongs to another tool
/// * `Err(RepositoryError::CompensationFailed)` - The event insert failed and
///   the flag could not be restored
pub async fn add_tool_regeneration<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    cycle_id: CycleId,
    reason: Option<String>,
    actor: &Actor,
) -> RepositoryResult<Regeneration> {
    const OPERATION: &str = "add_tool_regeneration";
    validate_actor(OPERATION, actor)?;
    tool_id
        .ensure_positive()
        .and_then(|_| cycle_id.ensure_positive())
        .map_err(|e| validation_error(OPERATION, "tool_regenerations", e))?;

    let tool = repo
        .get_tool(tool_id)
        .await
        .map_err(|e| e.with_operation(OPERATION))?;
    let cycle = repo
        .get_cycle(cycle_id)
        .await
        .map_err(|e| e.with_operation(OPERATION))?;
    if cycle.tool_id != tool_id {
        return Err(validation_error(
            OPERATION,
            "tool_regenerations",
            format!(
                "cycle {} belongs to tool {}, not tool {}",
                cycle_id, cycle.tool_id, tool_id
            ),
        ));
    }

    let reason = reason.filter(|r| !r.trim().is_empty());
    repo.set_regenerating(tool_id, true).await?;

    let inserted = repo
        .insert_regeneration(NewRegeneration {
            tool_id,
            cycle_id,
            reason,
            performed_by: actor.id,
        })
        .await;

    match inserted {
        Ok(regeneration) => {
            info!(
                "Service layer: tool {} regeneration {} started at cycle {} by {}",
                tool_id, regeneration.id, cycle_id, actor.name
            );
            Ok(regeneration)
        }
        Err(err) => {
            warn!(
                "Storing regeneration for tool {} failed, restoring regenerating={}: {}",
                tool_id, tool.regenerating, err
            );
            match repo.set_regenerating(tool_id, tool.regenerating).await {
                Ok(()) => Err(err),
                Err(compensation) => {
                    error!(
                        "Failed to restore regenerating flag of tool {}: {}",
                        tool_id, compensation
                    );
                    Err(RepositoryError::compensation_failed(
                        "regeneration insert failed and the regenerating flag was not restored",
                        err,
                        compensation,
                        context(OPERATION, tool_id),
                    ))
                }
            }
        }
    }
}

/// Start a regeneration anchored to the tool's most recent reading.
///
/// # Returns
/// * `Err(RepositoryError::NotFound)` - The tool has no readings
pub async fn start_tool_regeneration<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    reason: Option<String>,
    actor: &Actor,
) -> RepositoryResult<Regeneration> {
    validate_actor("start_tool_regeneration", actor)?;
    let last = repo.last_cycle_for_tool(tool_id).await?.ok_or_else(|| {
        RepositoryError::not_found_with_context(
            format!("no press cycles recorded for tool {}", tool_id),
            context("start_tool_regeneration", tool_id).with_entity("press_cycles"),
        )
    })?;
    add_tool_regeneration(repo, tool_id, last.id, reason, actor).await
}

/// Finish a regeneration. The event stays in the history.
pub async fn stop_tool_regeneration<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    actor: &Actor,
) -> RepositoryResult<()> {
    validate_actor("stop_tool_regeneration", actor)?;
    repo.get_tool(tool_id)
        .await
        .map_err(|e| e.with_operation("stop_tool_regeneration"))?;
    repo.set_regenerating(tool_id, false).await?;
    info!(
        "Service layer: tool {} regeneration stopped by {}",
        tool_id, actor.name
    );
    Ok(())
}

/// Cancel a running regeneration: delete its event, then clear the flag.
///
/// Without any event the flag is cleared anyway. If clearing the flag fails
/// after the event was deleted, the event is restored.
///
/// # Returns
/// * `Ok(Some(event))` - The deleted event
/// * `Ok(None)` - The tool had no events
/// * `Err(RepositoryError::ValidationError)` - The tool has events but is not
///   regenerating; completed regenerations cannot be aborted
pub async fn abort_tool_regeneration<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    actor: &Actor,
) -> RepositoryResult<Option<Regeneration>> {
    const OPERATION: &str = "abort_tool_regeneration";
    validate_actor(OPERATION, actor)?;
    let tool = repo
        .get_tool(tool_id)
        .await
        .map_err(|e| e.with_operation(OPERATION))?;

    let Some(last) = repo.last_regeneration_for_tool(tool_id).await? else {
        repo.set_regenerating(tool_id, false).await?;
        info!(
            "Service layer: tool {} had no regeneration to abort, flag cleared by {}",
            tool_id, actor.name
        );
        return Ok(None);
    };

    if !tool.regenerating {
        return Err(validation_error(
            OPERATION,
            "tool_regenerations",
            format!("tool {} is not regenerating", tool_id),
        ));
    }

    repo.delete_regeneration(last.id).await?;
    if let Err(err) = repo.set_regenerating(tool_id, false).await {
        warn!(
            "Clearing regenerating flag of tool {} failed, restoring regeneration {}: {}",
            tool_id, last.id, err
        );
        return match repo.restore_regeneration(&last).await {
            Ok(()) => Err(err),
            Err(compensation) => {
                error!(
                    "Failed to restore regeneration {} of tool {}: {}",
                    last.id, tool_id, compensation
                );
                Err(RepositoryError::compensation_failed(
                    "regenerating flag was not cleared and the deleted regeneration was not restored",
                    err,
                    compensation,
                    context(OPERATION, tool_id),
                ))
            }
        };
    }

    info!(
        "Service layer: tool {} regeneration {} aborted by {}",
        tool_id, last.id, actor.name
    );
    Ok(Some(last))
}

/// The tool's most recent regeneration.
///
/// # Returns
/// * `Err(RepositoryError::NotFound)` - The tool was never regenerated
pub async fn get_last_regeneration<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
) -> RepositoryResult<Regeneration> {
    repo.last_regeneration_for_tool(tool_id)
        .await?
        .ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("no regenerations recorded for tool {}", tool_id),
                context("get_last_regeneration", tool_id),
            )
        })
}

/// Every regeneration of a tool, newest first.
pub async fn get_regeneration_history<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
) -> RepositoryResult<Vec<Regeneration>> {
    repo.regeneration_history(tool_id).await
}

/// Whether any regeneration was triggered by reading `cycle_id`.
pub async fn has_regenerations_for_cycle<R: FullRepository + ?Sized>(
    repo: &R,
    cycle_id: CycleId,
) -> RepositoryResult<bool> {
    cycle_id
        .ensure_positive()
        .map_err(|e| validation_error("has_regenerations_for_cycle", "tool_regenerations", e))?;
    repo.has_regenerations_for_cycle(cycle_id).await
}

/// Cycles accumulated by `tool_id` since its last regeneration.
///
/// Counts the partials of the tool's readings whose id is greater than the
/// regeneration's `cycle_id`; with no regeneration every reading counts.
pub fn running_total(
    tool_id: ToolId,
    last_regeneration: Option<&Regeneration>,
    cycles: &[PressCycle],
) -> i64 {
    let baseline = last_regeneration.map(|r| r.cycle_id);
    cycles
        .iter()
        .filter(|c| c.record.tool_id == tool_id)
        .filter(|c| baseline.map_or(true, |b| c.record.id > b))
        .map(|c| c.partial_cycles)
        .sum()
}

/// [`running_total`] with the baseline loaded from the ledger.
pub async fn get_running_total<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    cycles: &[PressCycle],
) -> RepositoryResult<i64> {
    let last = repo.last_regeneration_for_tool(tool_id).await?;
    Ok(running_total(tool_id, last.as_ref(), cycles))
}

/// Current cycle count of a tool, loading its readings from the ledger.
pub async fn current_total_cycles<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<i64> {
    repo.get_tool(tool_id)
        .await
        .map_err(|e| e.with_operation("current_total_cycles"))?;
    let records = repo.list_cycles_for_tool(tool_id).await?;
    let cycles = annotate_all(repo, records, policy).await?;
    get_running_total(repo, tool_id, &cycles).await
}
