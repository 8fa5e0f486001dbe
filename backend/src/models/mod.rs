//! Domain types for press cycle accounting.
//!
//! - [`press`]: press numbers and slot positions
//! - [`tool`]: tools, formats and derived status
//! - [`cycle`]: counter readings and their deltas
//! - [`regeneration`]: tool rebuild events
//! - [`actor`]: the operator performing a mutation
//! - [`summary`]: derived reporting types

pub mod actor;
pub mod cycle;
pub mod macros;
pub mod press;
pub mod regeneration;
pub mod summary;
pub mod tool;

pub use actor::{Actor, UserId};
pub use cycle::{CycleDelta, CycleId, CycleRecord, DiscontinuityPolicy, NewCycle, PressCycle};
pub use press::{Position, PressNumber, VALID_PRESS_NUMBERS};
pub use regeneration::{NewRegeneration, Regeneration, RegenerationId};
pub use summary::{CycleSummaryStats, OverlappingTool, OverlappingToolInstance, ToolSummary};
pub use tool::{
    Format, NewTool, Tool, ToolId, ToolStatus, WearLevel, CYCLES_ERROR_THRESHOLD,
    CYCLES_WARNING_THRESHOLD,
};
