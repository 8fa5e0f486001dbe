//! Detects tools whose usage intervals on different presses overlap.
//!
//! A physical tool can only be mounted on one press at a time, so an overlap
//! points at a wrongly recorded reading.

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use std::collections::{BTreeMap, HashMap};

use super::partial_cycles::annotate_history;
use super::summary::build_tool_summaries;
use crate::db::repository::{FullRepository, RepositoryResult};
use crate::models::{
    DiscontinuityPolicy, OverlappingTool, OverlappingToolInstance, PressNumber, Tool, ToolId,
    ToolSummary,
};

fn periods_overlap(a: &ToolSummary, b: &ToolSummary) -> bool {
    a.start_date < b.end_date && b.start_date < a.end_date
}

fn instance(press: PressNumber, summary: &ToolSummary) -> OverlappingToolInstance {
    OverlappingToolInstance {
        press_number: press,
        position: summary.position,
        start_date: summary.start_date,
        end_date: summary.end_date,
    }
}

fn push_unique(instances: &mut Vec<OverlappingToolInstance>, candidate: OverlappingToolInstance) {
    if !instances.contains(&candidate) {
        instances.push(candidate);
    }
}

fn with_position_labels(code: String, instances: &[OverlappingToolInstance]) -> String {
    let mut labels: Vec<&str> = Vec::new();
    for inst in instances {
        let label = inst.position.german_label();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    if labels.is_empty() {
        code
    } else {
        format!("{} ({})", code, labels.join(", "))
    }
}

fn check_tool(
    tool_id: ToolId,
    by_press: &BTreeMap<PressNumber, Vec<&ToolSummary>>,
) -> Option<OverlappingTool> {
    let fallback = format!("Tool ID {}", tool_id);
    let mut code = fallback.clone();
    let mut range: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    let mut overlaps = Vec::new();

    let presses: Vec<(&PressNumber, &Vec<&ToolSummary>)> = by_press.iter().collect();
    for (i, (press_a, summaries_a)) in presses.iter().enumerate() {
        for a in summaries_a.iter() {
            if !a.tool_code.is_empty() && a.tool_code != fallback {
                code = a.tool_code.clone();
            }
            range = Some(match range {
                None => (a.start_date, a.end_date),
                Some((start, end)) => (start.min(a.start_date), end.max(a.end_date)),
            });

            for (press_b, summaries_b) in &presses[i + 1..] {
                for b in summaries_b.iter().filter(|b| periods_overlap(a, b)) {
                    push_unique(&mut overlaps, instance(**press_a, a));
                    push_unique(&mut overlaps, instance(**press_b, b));
                }
            }
        }
    }

    let (start_date, end_date) = range?;
    if overlaps.is_empty() {
        return None;
    }
    Some(OverlappingTool {
        tool_id,
        tool_code: with_position_labels(code, &overlaps),
        overlaps,
        start_date,
        end_date,
    })
}

/// Find every tool that appears on two presses during overlapping periods.
///
/// Results are ordered by tool id.
pub fn find_overlapping_tools(
    summaries_by_press: &BTreeMap<PressNumber, Vec<ToolSummary>>,
) -> Vec<OverlappingTool> {
    let mut by_tool: BTreeMap<ToolId, BTreeMap<PressNumber, Vec<&ToolSummary>>> = BTreeMap::new();
    for (press, summaries) in summaries_by_press {
        for summary in summaries {
            by_tool
                .entry(summary.tool_id)
                .or_default()
                .entry(*press)
                .or_default()
                .push(summary);
        }
    }

    by_tool
        .iter()
        .filter(|(_, by_press)| by_press.len() > 1)
        .filter_map(|(tool_id, by_press)| check_tool(*tool_id, by_press))
        .collect()
}

/// Build every press's timeline and report tools mounted on two presses at once.
///
/// # Returns
/// * `Err(_)` - Loading any press failed; no partial result is returned
pub async fn get_overlapping_tools<R: FullRepository + ?Sized>(
    repo: &R,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<Vec<OverlappingTool>> {
    let tools: HashMap<ToolId, Tool> = repo
        .list_tools()
        .await?
        .into_iter()
        .map(|tool| (tool.id, tool))
        .collect();

    let mut summaries_by_press = BTreeMap::new();
    for press in PressNumber::all() {
        let records = repo
            .list_cycles_for_press(press, None, None)
            .await
            .map_err(|e| {
                error!("Failed to load cycles for press {}: {}", press, e);
                e.with_operation("get_overlapping_tools")
            })?;
        let cycles = annotate_history(records, policy);
        summaries_by_press.insert(press, build_tool_summaries(&cycles, &tools));
    }

    let overlapping = find_overlapping_tools(&summaries_by_press);
    if overlapping.is_empty() {
        debug!("Service layer: no overlapping tools");
    } else {
        warn!(
            "Service layer: {} tools overlap across presses",
            overlapping.len()
        );
    }
    Ok(overlapping)
}
