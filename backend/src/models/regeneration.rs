use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actor::UserId;
use super::cycle::CycleId;
use super::tool::ToolId;

crate::define_id_type!(i64, RegenerationId, "regeneration");

/// A tool rebuild, anchored to the reading taken when it started.
///
/// Cycle totals for the tool restart after `cycle_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regeneration {
    pub id: RegenerationId,
    pub tool_id: ToolId,
    pub cycle_id: CycleId,
    pub reason: Option<String>,
    pub performed_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegeneration {
    pub tool_id: ToolId,
    pub cycle_id: CycleId,
    pub reason: Option<String>,
    pub performed_by: UserId,
}

impl NewRegeneration {
    pub fn into_regeneration(self, id: RegenerationId, created_at: DateTime<Utc>) -> Regeneration {
        Regeneration {
            id,
            tool_id: self.tool_id,
            cycle_id: self.cycle_id,
            reason: self.reason,
            performed_by: self.performed_by,
            created_at,
        }
    }
}
