//! Cycle counter readings and the deltas derived from them.
//!
//! A reading ([`CycleRecord`]) is the cumulative counter of a press slot at
//! the time an operator reported it. The counter belongs to the slot
//! hardware, so it keeps counting across tool swaps. Per-reading increments
//! are never stored; they are derived on read and surfaced as [`CycleDelta`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::actor::UserId;
use super::press::{Position, PressNumber};
use super::tool::ToolId;

crate::define_id_type!(i64, CycleId, "cycle");

/// A persisted cumulative counter reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: CycleId,
    pub press_number: PressNumber,
    pub tool_id: ToolId,
    pub tool_position: Position,
    pub total_cycles: i64,
    pub date: DateTime<Utc>,
    pub performed_by: UserId,
}

/// Operator input for a reading, before validation.
///
/// Used for both inserts and corrections. `date` defaults to the time of the
/// write when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCycle {
    pub press_number: i16,
    pub tool_id: ToolId,
    pub tool_position: Position,
    pub total_cycles: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl NewCycle {
    pub fn new(
        press_number: i16,
        tool_id: ToolId,
        tool_position: Position,
        total_cycles: i64,
    ) -> Self {
        Self {
            press_number,
            tool_id,
            tool_position,
            total_cycles,
            date: None,
        }
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Check the scalar fields and return the validated press.
    pub fn validate(&self) -> Result<PressNumber, String> {
        let press = PressNumber::new(self.press_number)?;
        self.tool_id.ensure_positive()?;
        if self.total_cycles < 0 {
            return Err(format!(
                "total cycles must not be negative, got {}",
                self.total_cycles
            ));
        }
        Ok(press)
    }

    pub fn into_record(
        self,
        id: CycleId,
        press_number: PressNumber,
        performed_by: UserId,
        now: DateTime<Utc>,
    ) -> CycleRecord {
        CycleRecord {
            id,
            press_number,
            tool_id: self.tool_id,
            tool_position: self.tool_position,
            total_cycles: self.total_cycles,
            date: self.date.unwrap_or(now),
            performed_by,
        }
    }
}

/// How a reading's total relates to the previous reading on the same slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleDelta {
    /// No earlier reading on the slot; the whole total is attributed.
    First { total: i64 },
    /// The counter moved forward by `cycles`.
    Increment { previous_total: i64, cycles: i64 },
    /// The counter went backwards. `raw` is the unclamped (negative) difference.
    Discontinuity { previous_total: i64, raw: i64 },
}

impl CycleDelta {
    pub fn between(previous_total: Option<i64>, current_total: i64) -> Self {
        match previous_total {
            None => CycleDelta::First {
                total: current_total,
            },
            Some(prev) if current_total >= prev => CycleDelta::Increment {
                previous_total: prev,
                cycles: current_total - prev,
            },
            Some(prev) => CycleDelta::Discontinuity {
                previous_total: prev,
                raw: current_total - prev,
            },
        }
    }

    /// The plain subtraction `T - T'` (or `T` for a first reading).
    pub fn raw(&self) -> i64 {
        match *self {
            CycleDelta::First { total } => total,
            CycleDelta::Increment { cycles, .. } => cycles,
            CycleDelta::Discontinuity { raw, .. } => raw,
        }
    }

    /// Cycles this reading contributes to totals under `policy`.
    pub fn attributed(&self, policy: DiscontinuityPolicy) -> i64 {
        match (*self, policy) {
            (
                CycleDelta::Discontinuity {
                    previous_total,
                    raw,
                },
                DiscontinuityPolicy::CounterReset,
            ) => previous_total + raw,
            _ => self.raw(),
        }
    }

    pub fn is_discontinuity(&self) -> bool {
        matches!(self, CycleDelta::Discontinuity { .. })
    }
}

/// What a backwards-running counter contributes to totals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscontinuityPolicy {
    /// The slot counter was reset; the new total counts from zero.
    #[default]
    CounterReset,
    /// Keep the negative difference as-is.
    Raw,
}

impl DiscontinuityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscontinuityPolicy::CounterReset => "counter-reset",
            DiscontinuityPolicy::Raw => "raw",
        }
    }
}

impl fmt::Display for DiscontinuityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscontinuityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "counter-reset" | "reset" => Ok(Self::CounterReset),
            "raw" => Ok(Self::Raw),
            other => Err(format!("Unknown discontinuity policy: {}", other)),
        }
    }
}

/// A reading together with its derived delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressCycle {
    #[serde(flatten)]
    pub record: CycleRecord,
    pub delta: CycleDelta,
    /// `delta` resolved under the active [`DiscontinuityPolicy`].
    pub partial_cycles: i64,
}

impl PressCycle {
    pub fn new(record: CycleRecord, delta: CycleDelta, policy: DiscontinuityPolicy) -> Self {
        Self {
            partial_cycles: delta.attributed(policy),
            record,
            delta,
        }
    }

    pub fn id(&self) -> CycleId {
        self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_first_reading_is_total() {
        let d = CycleDelta::between(None, 100);
        assert_eq!(d, CycleDelta::First { total: 100 });
        assert_eq!(d.raw(), 100);
    }

    #[test]
    fn test_delta_increment() {
        let d = CycleDelta::between(Some(100), 150);
        assert_eq!(d.raw(), 50);
        assert!(!d.is_discontinuity());
    }

    #[test]
    fn test_delta_backwards_counter_is_flagged() {
        let d = CycleDelta::between(Some(500), 50);
        assert_eq!(
            d,
            CycleDelta::Discontinuity {
                previous_total: 500,
                raw: -450
            }
        );
        assert_eq!(d.attributed(DiscontinuityPolicy::Raw), -450);
        assert_eq!(d.attributed(DiscontinuityPolicy::CounterReset), 50);
    }

    #[test]
    fn test_new_cycle_validation() {
        assert!(NewCycle::new(3, ToolId(1), Position::Top, 0).validate().is_ok());
        assert!(NewCycle::new(1, ToolId(1), Position::Top, 0).validate().is_err());
        assert!(NewCycle::new(3, ToolId(0), Position::Top, 0).validate().is_err());
        assert!(NewCycle::new(3, ToolId(1), Position::Top, -1).validate().is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "counter-reset".parse::<DiscontinuityPolicy>().unwrap(),
            DiscontinuityPolicy::CounterReset
        );
        assert_eq!("RAW".parse::<DiscontinuityPolicy>().unwrap(), DiscontinuityPolicy::Raw);
        assert!("clamp".parse::<DiscontinuityPolicy>().is_err());
    }
}
