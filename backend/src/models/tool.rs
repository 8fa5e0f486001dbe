//! Press tools and their derived status.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::press::{Position, PressNumber};

crate::define_id_type!(i64, ToolId, "tool");

/// Cumulative cycles at which a tool should be scheduled for regeneration.
pub const CYCLES_WARNING_THRESHOLD: i64 = 800_000;
/// Cumulative cycles past which a tool must not keep running.
pub const CYCLES_ERROR_THRESHOLD: i64 = 1_000_000;

/// Sheet format a tool stamps, in millimetres.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Format {
    pub width: i32,
    pub height: i32,
}

impl Format {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width == 0 && self.height == 0 {
            return Ok(());
        }
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A tool as stored in the `tools` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub position: Position,
    pub format: Format,
    /// Tool family, e.g. `FC` or `GTC`.
    pub tool_type: String,
    /// Shop code, e.g. `G01`.
    pub code: String,
    pub regenerating: bool,
    pub press: Option<PressNumber>,
    pub binding: Option<ToolId>,
}

impl Tool {
    /// Label used in timelines and reports: `"{format} {code}"`.
    pub fn display_code(&self) -> String {
        format!("{} {}", self.format, self.code)
    }

    pub fn status(&self) -> ToolStatus {
        if self.regenerating {
            ToolStatus::Regenerating
        } else if self.press.is_some() {
            ToolStatus::Active
        } else {
            ToolStatus::Available
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn is_bindable(&self) -> bool {
        self.position.binding_counterpart().is_some()
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tool_type.is_empty() {
            write!(f, "{} {}", self.format, self.code)
        } else {
            write!(f, "{} {} {}", self.format, self.code, self.tool_type)
        }
    }
}

/// Values needed to register a tool. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTool {
    pub position: Position,
    pub format: Format,
    pub tool_type: String,
    pub code: String,
    #[serde(default)]
    pub press: Option<PressNumber>,
}

impl NewTool {
    pub fn new(position: Position, format: Format, code: impl Into<String>) -> Self {
        Self {
            position,
            format,
            tool_type: String::new(),
            code: code.into(),
            press: None,
        }
    }

    pub fn with_type(mut self, tool_type: impl Into<String>) -> Self {
        self.tool_type = tool_type.into();
        self
    }

    pub fn on_press(mut self, press: PressNumber) -> Self {
        self.press = Some(press);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("tool code cannot be empty".to_string());
        }
        if self.format.width < 0 || self.format.height < 0 {
            return Err(format!("invalid tool format {:?}", self.format));
        }
        Ok(())
    }

    pub fn into_tool(self, id: ToolId) -> Tool {
        Tool {
            id,
            position: self.position,
            format: self.format,
            tool_type: self.tool_type,
            code: self.code,
            regenerating: false,
            press: self.press,
            binding: None,
        }
    }
}

/// Lifecycle state derived from a tool's flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Active,
    Available,
    Regenerating,
}

/// How close a tool's cycle count is to its service limits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WearLevel {
    Ok,
    Warning,
    Critical,
}

impl WearLevel {
    pub fn for_cycles(total_cycles: i64) -> Self {
        if total_cycles >= CYCLES_ERROR_THRESHOLD {
            WearLevel::Critical
        } else if total_cycles >= CYCLES_WARNING_THRESHOLD {
            WearLevel::Warning
        } else {
            WearLevel::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> Tool {
        NewTool::new(Position::Top, Format::new(120, 60), "G01")
            .with_type("FC")
            .into_tool(ToolId(7))
    }

    #[test]
    fn test_display_code_uses_format_and_code() {
        assert_eq!(tool().display_code(), "120x60 G01");
        assert_eq!(tool().to_string(), "120x60 G01 FC");
    }

    #[test]
    fn test_empty_format_renders_blank() {
        assert_eq!(Format::default().to_string(), "");
    }

    #[test]
    fn test_status_precedence() {
        let mut t = tool();
        assert_eq!(t.status(), ToolStatus::Available);
        t.press = Some(PressNumber::new(5).unwrap());
        assert_eq!(t.status(), ToolStatus::Active);
        t.regenerating = true;
        assert_eq!(t.status(), ToolStatus::Regenerating);
    }

    #[test]
    fn test_new_tool_requires_code() {
        let t = NewTool::new(Position::Bottom, Format::new(1, 1), "  ");
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_wear_level_thresholds() {
        assert_eq!(WearLevel::for_cycles(799_999), WearLevel::Ok);
        assert_eq!(WearLevel::for_cycles(800_000), WearLevel::Warning);
        assert_eq!(WearLevel::for_cycles(1_000_000), WearLevel::Critical);
    }
}
