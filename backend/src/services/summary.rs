//! Tool usage timelines.
//!
//! Turns the readings of one press into consolidated intervals: consecutive
//! readings of the same tool in the same position collapse into one
//! [`ToolSummary`], and each position's intervals are re-dated so that a tool's
//! interval starts where its predecessor's ended.

use log::debug;
use std::collections::{HashMap, HashSet};

use super::partial_cycles::annotate_history;
use super::validation_error;
use crate::db::repository::{FullRepository, RepositoryResult};
use crate::models::{
    CycleSummaryStats, DiscontinuityPolicy, Position, PressCycle, PressNumber, Tool, ToolId,
    ToolSummary,
};

/// Resolves tool ids to tools for labelling.
pub trait ToolLookup {
    fn find_tool(&self, id: ToolId) -> Option<&Tool>;

    /// `"{format} {code}"`, or `"Tool ID {id}"` for tools the lookup does not know.
    fn tool_code(&self, id: ToolId) -> String {
        match self.find_tool(id) {
            Some(tool) => tool.display_code(),
            None => format!("Tool ID {}", id),
        }
    }
}

impl ToolLookup for HashMap<ToolId, Tool> {
    fn find_tool(&self, id: ToolId) -> Option<&Tool> {
        self.get(&id)
    }
}

/// Everything needed to render the cycle summary of a press.
#[derive(Debug, Clone, Default)]
pub struct CycleSummaryData {
    pub cycles: Vec<PressCycle>,
    pub tools: HashMap<ToolId, Tool>,
}

fn expand<L: ToolLookup + ?Sized>(cycles: &[PressCycle], lookup: &L) -> Vec<ToolSummary> {
    cycles
        .iter()
        .map(|cycle| {
            let record = &cycle.record;
            ToolSummary {
                tool_id: record.tool_id,
                tool_code: lookup.tool_code(record.tool_id),
                position: record.tool_position,
                start_date: record.date,
                end_date: record.date,
                max_cycles: record.total_cycles,
                total_partial: cycle.partial_cycles,
                is_first_appearance: false,
            }
        })
        .collect()
}

fn consolidate(sorted: Vec<ToolSummary>) -> Vec<ToolSummary> {
    let mut consolidated: Vec<ToolSummary> = Vec::new();
    // Per position: the tool currently holding it and its open interval.
    let mut open: HashMap<Position, (ToolId, usize)> = HashMap::new();

    for summary in sorted {
        let same_tool = open
            .get(&summary.position)
            .filter(|(tool_id, _)| *tool_id == summary.tool_id)
            .map(|&(_, index)| index);
        match same_tool {
            Some(index) => {
                let existing = &mut consolidated[index];
                existing.start_date = existing.start_date.min(summary.start_date);
                existing.end_date = existing.end_date.max(summary.end_date);
                existing.max_cycles = existing.max_cycles.max(summary.max_cycles);
                existing.total_partial += summary.total_partial;
            }
            None => {
                open.insert(summary.position, (summary.tool_id, consolidated.len()));
                consolidated.push(summary);
            }
        }
    }
    consolidated
}

fn redate(summaries: &mut [ToolSummary]) {
    for position in Position::ALL {
        let mut indices: Vec<usize> = (0..summaries.len())
            .filter(|&i| summaries[i].position == position)
            .collect();
        indices.sort_by_key(|&i| summaries[i].start_date);

        let mut previous_end = None;
        for i in indices {
            let summary = &mut summaries[i];
            match previous_end {
                None => summary.is_first_appearance = true,
                Some(end) => {
                    summary.start_date = end;
                    summary.is_first_appearance = false;
                }
            }
            previous_end = Some(summary.end_date);
        }
    }
}

/// Build the usage timeline of one press from its readings.
///
/// `cycles` may come in any order. The result is ordered by `max_cycles`,
/// then by position rank.
pub fn build_tool_summaries<L: ToolLookup + ?Sized>(
    cycles: &[PressCycle],
    lookup: &L,
) -> Vec<ToolSummary> {
    let mut summaries = expand(cycles, lookup);
    summaries.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.position.rank().cmp(&b.position.rank()))
            .then_with(|| a.end_date.cmp(&b.end_date))
    });

    let mut summaries = consolidate(summaries);
    redate(&mut summaries);
    summaries.sort_by_key(|s| (s.max_cycles, s.position.rank()));
    debug!(
        "Built {} tool summaries from {} readings",
        summaries.len(),
        cycles.len()
    );
    summaries
}

/// Highest total, sum of partials, distinct tools and number of readings.
pub fn cycle_summary_stats(cycles: &[PressCycle]) -> CycleSummaryStats {
    let mut tools = HashSet::new();
    let mut stats = CycleSummaryStats::default();
    for cycle in cycles {
        stats.total_cycles = stats.total_cycles.max(cycle.record.total_cycles);
        stats.total_partial += cycle.partial_cycles;
        tools.insert(cycle.record.tool_id);
    }
    stats.active_tools = tools.len();
    stats.entries = cycles.len();
    stats
}

/// Load every reading of a press along with all known tools.
pub async fn cycle_summary_data<R: FullRepository + ?Sized>(
    repo: &R,
    press: i16,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<CycleSummaryData> {
    let press = PressNumber::new(press)
        .map_err(|e| validation_error("cycle_summary_data", "press_cycles", e))?;
    let records = repo.list_cycles_for_press(press, None, None).await?;
    let tools = repo
        .list_tools()
        .await?
        .into_iter()
        .map(|tool| (tool.id, tool))
        .collect();

    Ok(CycleSummaryData {
        cycles: annotate_history(records, policy),
        tools,
    })
}

#[cfg(test)]
#[path = "summary_tests.rs"]
mod summary_tests;
