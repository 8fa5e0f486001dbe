//! Derived reporting types. None of these are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::press::{Position, PressNumber};
use super::tool::ToolId;

/// A consolidated stretch of time during which one tool occupied a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub tool_id: ToolId,
    pub tool_code: String,
    pub position: Position,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Highest cumulative total observed inside the interval.
    pub max_cycles: i64,
    /// Sum of attributed partial cycles inside the interval.
    pub total_partial: i64,
    pub is_first_appearance: bool,
}

/// Aggregate figures for a set of readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummaryStats {
    pub total_cycles: i64,
    pub total_partial: i64,
    pub active_tools: usize,
    pub entries: usize,
}

/// One placement of a tool that collides with a placement on another press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlappingToolInstance {
    pub press_number: PressNumber,
    pub position: Position,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// A tool that, according to the readings, was mounted on two presses at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlappingTool {
    pub tool_id: ToolId,
    pub tool_code: String,
    pub overlaps: Vec<OverlappingToolInstance>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}
