use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use super::schema::{press_cycles, tool_regenerations, tools};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{
    CycleId, CycleRecord, Format, NewCycle, NewRegeneration, NewTool, PressNumber, Regeneration,
    RegenerationId, Tool, ToolId, UserId,
};

fn corrupt_row(table: &str, id: i64, details: String) -> RepositoryError {
    RepositoryError::internal_with_context(
        "stored row cannot be decoded",
        ErrorContext::new("decode_row")
            .with_entity(table)
            .with_entity_id(id)
            .with_details(details),
    )
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tools)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ToolRow {
    pub id: i64,
    pub position: String,
    pub format: Value,
    pub tool_type: String,
    pub code: String,
    pub regenerating: bool,
    pub press: Option<i16>,
    pub binding: Option<i64>,
}

impl ToolRow {
    pub fn into_tool(self) -> RepositoryResult<Tool> {
        let position = self
            .position
            .parse()
            .map_err(|e| corrupt_row("tools", self.id, e))?;
        let format: Format = serde_json::from_value(self.format)
            .map_err(|e| corrupt_row("tools", self.id, format!("format: {}", e)))?;
        let press = self
            .press
            .map(PressNumber::new)
            .transpose()
            .map_err(|e| corrupt_row("tools", self.id, e))?;

        Ok(Tool {
            id: ToolId(self.id),
            position,
            format,
            tool_type: self.tool_type,
            code: self.code,
            regenerating: self.regenerating,
            press,
            binding: self.binding.map(ToolId),
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tools)]
pub struct NewToolRow {
    pub position: String,
    pub format: Value,
    pub tool_type: String,
    pub code: String,
    pub regenerating: bool,
    pub press: Option<i16>,
}

impl NewToolRow {
    pub fn from_model(tool: &NewTool) -> RepositoryResult<Self> {
        let format = serde_json::to_value(tool.format).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Failed to encode tool format: {}", e),
                ErrorContext::new("insert_tool").with_entity("tools"),
            )
        })?;
        Ok(Self {
            position: tool.position.as_str().to_string(),
            format,
            tool_type: tool.tool_type.clone(),
            code: tool.code.clone(),
            regenerating: false,
            press: tool.press.map(|p| p.value()),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = press_cycles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CycleRow {
    pub id: i64,
    pub press_number: i16,
    pub tool_id: i64,
    pub tool_position: String,
    pub total_cycles: i64,
    pub date: DateTime<Utc>,
    pub performed_by: i64,
}

impl CycleRow {
    pub fn into_record(self) -> RepositoryResult<CycleRecord> {
        let press_number = PressNumber::new(self.press_number)
            .map_err(|e| corrupt_row("press_cycles", self.id, e))?;
        let tool_position = self
            .tool_position
            .parse()
            .map_err(|e| corrupt_row("press_cycles", self.id, e))?;

        Ok(CycleRecord {
            id: CycleId(self.id),
            press_number,
            tool_id: ToolId(self.tool_id),
            tool_position,
            total_cycles: self.total_cycles,
            date: self.date,
            performed_by: UserId(self.performed_by),
        })
    }
}

/// Column values for both inserting and correcting a reading.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = press_cycles)]
pub struct CycleValuesRow {
    pub press_number: i16,
    pub tool_id: i64,
    pub tool_position: String,
    pub total_cycles: i64,
    pub date: DateTime<Utc>,
    pub performed_by: i64,
}

impl CycleValuesRow {
    pub fn from_model(press: PressNumber, cycle: &NewCycle, performed_by: UserId) -> Self {
        Self {
            press_number: press.value(),
            tool_id: cycle.tool_id.value(),
            tool_position: cycle.tool_position.as_str().to_string(),
            total_cycles: cycle.total_cycles,
            date: cycle.date.unwrap_or_else(Utc::now),
            performed_by: performed_by.value(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tool_regenerations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RegenerationRow {
    pub id: i64,
    pub tool_id: i64,
    pub cycle_id: i64,
    pub reason: Option<String>,
    pub performed_by: i64,
    pub created_at: DateTime<Utc>,
}

impl RegenerationRow {
    pub fn from_model(regeneration: &Regeneration) -> Self {
        Self {
            id: regeneration.id.value(),
            tool_id: regeneration.tool_id.value(),
            cycle_id: regeneration.cycle_id.value(),
            reason: regeneration.reason.clone(),
            performed_by: regeneration.performed_by.value(),
            created_at: regeneration.created_at,
        }
    }

    pub fn into_regeneration(self) -> Regeneration {
        Regeneration {
            id: RegenerationId(self.id),
            tool_id: ToolId(self.tool_id),
            cycle_id: CycleId(self.cycle_id),
            reason: self.reason,
            performed_by: UserId(self.performed_by),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tool_regenerations)]
pub struct NewRegenerationRow {
    pub tool_id: i64,
    pub cycle_id: i64,
    pub reason: Option<String>,
    pub performed_by: i64,
}

impl From<&NewRegeneration> for NewRegenerationRow {
    fn from(r: &NewRegeneration) -> Self {
        Self {
            tool_id: r.tool_id.value(),
            cycle_id: r.cycle_id.value(),
            reason: r.reason.clone(),
            performed_by: r.performed_by.value(),
        }
    }
}
