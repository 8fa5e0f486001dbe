//! Cassette binding and press assignment.
//!
//! Only a `top-cassette` tool can be bound, and only to a `top` tool. A
//! tool holds at most one binding. Everything is validated here before
//! the repository runs the write as one atomic unit.

use log::{debug, info};

use super::validation_error;
use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{Actor, Position, PressNumber, Tool, ToolId};

fn bind_context(cassette: ToolId, target: ToolId) -> ErrorContext {
    ErrorContext::new("bind_tools")
        .with_entity("tools")
        .with_details(format!("cassette={}, target={}", cassette, target))
}

fn check_bindable(cassette: &Tool, target: &Tool) -> RepositoryResult<()> {
    let fail = |message: String| -> RepositoryResult<()> {
        Err(RepositoryError::validation_with_context(
            message,
            bind_context(cassette.id, target.id),
        ))
    };

    if cassette.id == target.id {
        return fail(format!("tool {} cannot be bound to itself", cassette.id));
    }
    if cassette.position != Position::TopCassette {
        return fail(format!(
            "tool {} is not a {} tool (found {})",
            cassette.id,
            Position::TopCassette,
            cassette.position
        ));
    }
    if target.position != Position::Top {
        return fail(format!(
            "tool {} is not a {} tool (found {})",
            target.id,
            Position::Top,
            target.position
        ));
    }
    for tool in [cassette, target] {
        if let Some(partner) = tool.binding {
            return fail(format!("tool {} is already bound to tool {}", tool.id, partner));
        }
    }
    Ok(())
}

/// Bind a `top-cassette` tool to a `top` tool.
///
/// The cassette takes over the target's press; any other cassette on that
/// press is unassigned.
///
/// # Returns
/// * `Err(RepositoryError::NotFound)` - Either tool does not exist
/// * `Err(RepositoryError::AlreadyExists)` - The two are already bound to each other
/// * `Err(RepositoryError::ValidationError)` - Wrong positions or a side is bound elsewhere
pub async fn bind_tools<R: FullRepository + ?Sized>(
    repo: &R,
    cassette_id: ToolId,
    target_id: ToolId,
) -> RepositoryResult<()> {
    cassette_id
        .ensure_positive()
        .and_then(|_| target_id.ensure_positive())
        .map_err(|e| validation_error("bind_tools", "tools", e))?;

    let cassette = repo
        .get_tool(cassette_id)
        .await
        .map_err(|e| e.with_context(bind_context(cassette_id, target_id)))?;
    let target = repo
        .get_tool(target_id)
        .await
        .map_err(|e| e.with_context(bind_context(cassette_id, target_id)))?;

    if cassette.binding == Some(target_id) && target.binding == Some(cassette_id) {
        return Err(RepositoryError::already_exists_with_context(
            format!("tools {} and {} are already bound", cassette_id, target_id),
            bind_context(cassette_id, target_id),
        ));
    }
    check_bindable(&cassette, &target)?;

    repo.bind_tools(cassette_id, target_id).await?;
    match target.press {
        Some(press) => info!(
            "Service layer: bound cassette {} to tool {} on press {}",
            cassette_id, target_id, press
        ),
        None => info!(
            "Service layer: bound cassette {} to unassigned tool {}",
            cassette_id, target_id
        ),
    }
    Ok(())
}

/// Remove the binding of a tool and its partner.
///
/// # Returns
/// * `Ok(Some(partner))` - The former partner
/// * `Ok(None)` - The tool was not bound; nothing changed
pub async fn unbind_tool<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
) -> RepositoryResult<Option<ToolId>> {
    tool_id
        .ensure_positive()
        .map_err(|e| validation_error("unbind_tool", "tools", e))?;
    let tool = repo.get_tool(tool_id).await?;
    if tool.binding.is_none() {
        debug!("Service layer: tool {} is not bound", tool_id);
        return Ok(None);
    }

    let partner = repo.unbind_tool(tool_id).await?;
    if let Some(partner) = partner {
        info!("Service layer: unbound tool {} from tool {}", tool_id, partner);
    }
    Ok(partner)
}

/// Assign a tool (and its bound partner) to a press, or clear the press with `None`.
pub async fn update_tool_press<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    press: Option<i16>,
    actor: &Actor,
) -> RepositoryResult<()> {
    actor
        .validate()
        .map_err(|e| validation_error("update_tool_press", "users", e))?;
    let press = press
        .map(PressNumber::new)
        .transpose()
        .map_err(|e| validation_error("update_tool_press", "tools", e))?;
    let tool = repo
        .get_tool(tool_id)
        .await
        .map_err(|e| e.with_operation("update_tool_press"))?;

    repo.assign_press(tool_id, press).await?;
    let target = press.map_or_else(|| "no press".to_string(), |p| format!("press {}", p));
    match tool.binding {
        Some(partner) => info!(
            "Service layer: moved tool {} and partner {} to {} by {}",
            tool_id, partner, target, actor.name
        ),
        None => info!(
            "Service layer: moved tool {} to {} by {}",
            tool_id, target, actor.name
        ),
    }
    Ok(())
}

/// Set the regenerating flag directly. Unchanged flags are not written.
pub async fn update_regenerating<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
    regenerating: bool,
    actor: &Actor,
) -> RepositoryResult<()> {
    actor
        .validate()
        .map_err(|e| validation_error("update_regenerating", "users", e))?;
    let tool = repo
        .get_tool(tool_id)
        .await
        .map_err(|e| e.with_operation("update_regenerating"))?;
    if tool.regenerating == regenerating {
        debug!(
            "Service layer: tool {} already has regenerating={}",
            tool_id, regenerating
        );
        return Ok(());
    }

    repo.set_regenerating(tool_id, regenerating).await?;
    info!(
        "Service layer: tool {} regenerating={} by {}",
        tool_id, regenerating, actor.name
    );
    Ok(())
}

/// Unbound tools of the matching position and format that `tool_id` could be bound to.
pub async fn list_bindable_tools<R: FullRepository + ?Sized>(
    repo: &R,
    tool_id: ToolId,
) -> RepositoryResult<Vec<Tool>> {
    let tool = repo.get_tool(tool_id).await?;
    let Some(counterpart) = tool.position.binding_counterpart() else {
        return Ok(Vec::new());
    };

    let candidates: Vec<Tool> = repo
        .list_tools()
        .await?
        .into_iter()
        .filter(|t| {
            t.id != tool.id
                && t.position == counterpart
                && t.format == tool.format
                && !t.is_bound()
        })
        .collect();
    debug!(
        "Service layer: {} bindable tools for tool {}",
        candidates.len(),
        tool_id
    );
    Ok(candidates)
}
