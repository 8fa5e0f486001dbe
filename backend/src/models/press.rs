//! Press numbers and tool slot positions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Press numbers that exist on the shop floor. Press 1 was decommissioned.
pub const VALID_PRESS_NUMBERS: [i16; 5] = [0, 2, 3, 4, 5];

/// A validated press number.
///
/// Construction goes through [`PressNumber::new`] (or `TryFrom<i16>`), so a
/// value of this type always belongs to [`VALID_PRESS_NUMBERS`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct PressNumber(i16);

impl PressNumber {
    pub fn new(value: i16) -> Result<Self, String> {
        if VALID_PRESS_NUMBERS.contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "invalid press number {}, expected one of {:?}",
                value, VALID_PRESS_NUMBERS
            ))
        }
    }

    pub fn value(&self) -> i16 {
        self.0
    }

    /// All presses in ascending order.
    pub fn all() -> Vec<PressNumber> {
        VALID_PRESS_NUMBERS.iter().map(|n| PressNumber(*n)).collect()
    }
}

impl TryFrom<i16> for PressNumber {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PressNumber> for i16 {
    fn from(p: PressNumber) -> Self {
        p.0
    }
}

impl fmt::Display for PressNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot a tool occupies in a press.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    Top,
    TopCassette,
    Bottom,
}

impl Position {
    pub const ALL: [Position; 3] = [Position::Top, Position::TopCassette, Position::Bottom];

    /// Display ordering used by timelines: top, then cassette, then bottom.
    pub fn rank(&self) -> u8 {
        match self {
            Position::Top => 1,
            Position::TopCassette => 2,
            Position::Bottom => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Top => "top",
            Position::TopCassette => "top-cassette",
            Position::Bottom => "bottom",
        }
    }

    /// Operator-facing (German) label.
    pub fn german_label(&self) -> &'static str {
        match self {
            Position::Top => "Oberteil",
            Position::TopCassette => "Oberteil Kassette",
            Position::Bottom => "Unterteil",
        }
    }

    /// The position a tool in this slot may bind to, if any.
    pub fn binding_counterpart(&self) -> Option<Position> {
        match self {
            Position::Top => Some(Position::TopCassette),
            Position::TopCassette => Some(Position::Top),
            Position::Bottom => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top" => Ok(Position::Top),
            // Older rows were written as "cassette top".
            "top-cassette" | "cassette top" | "top_cassette" => Ok(Position::TopCassette),
            "bottom" => Ok(Position::Bottom),
            other => Err(format!("invalid tool position: {}", other)),
        }
    }
}
