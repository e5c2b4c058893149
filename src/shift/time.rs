use std::fmt::{Display, Formatter};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static CLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})\s*([APap][Mm])").expect("clock regex is valid")
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
    Overnight,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 4] = [
        TimeSlot::Morning,
        TimeSlot::Afternoon,
        TimeSlot::Evening,
        TimeSlot::Overnight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Afternoon => "Afternoon",
            Self::Evening => "Evening",
            Self::Overnight => "Overnight",
        }
    }

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Overnight,
        }
    }
}

impl Display for TimeSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown time slot: {0}")]
pub struct TimeSlotParseError(pub String);

impl FromStr for TimeSlot {
    type Err = TimeSlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Self::Morning),
            "afternoon" => Ok(Self::Afternoon),
            "evening" => Ok(Self::Evening),
            "overnight" | "night" => Ok(Self::Overnight),
            _ => Err(TimeSlotParseError(s.to_string())),
        }
    }
}

/// Hour (0-23) of the first `h:mm AM/PM` time found in `text`.
pub fn start_hour_24(text: &str) -> Option<u32> {
    let caps = CLOCK_RE.captures(text)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("pm");
    let hour = match (pm, hour) {
        (true, 12) => 12,
        (true, h) => h + 12,
        (false, 12) => 0,
        (false, h) => h,
    };
    Some(hour)
}

pub fn contains_clock_time(text: &str) -> bool {
    CLOCK_RE.is_match(text)
}

/// Unparseable times fall into the morning slot.
pub fn classify_time(time_raw: &str) -> TimeSlot {
    start_hour_24(time_raw)
        .map(TimeSlot::from_hour)
        .unwrap_or(TimeSlot::Morning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_twelve_hour_clock() {
        assert_eq!(start_hour_24("12:00AM"), Some(0));
        assert_eq!(start_hour_24("12:30 pm"), Some(12));
        assert_eq!(start_hour_24("6:30pm - 9:15pm"), Some(18));
        assert_eq!(start_hour_24("no time here"), None);
    }

    #[test]
    fn classifies_slot_boundaries() {
        assert_eq!(classify_time("11:59AM"), TimeSlot::Morning);
        assert_eq!(classify_time("12:00PM"), TimeSlot::Afternoon);
        assert_eq!(classify_time("4:45PM"), TimeSlot::Afternoon);
        assert_eq!(classify_time("5:00PM"), TimeSlot::Evening);
        assert_eq!(classify_time("9:30PM - 12:15AM"), TimeSlot::Overnight);
        assert_eq!(classify_time(""), TimeSlot::Morning);
    }

    #[test]
    fn parses_slot_names() {
        assert_eq!("evening".parse::<TimeSlot>().ok(), Some(TimeSlot::Evening));
        assert!("brunch".parse::<TimeSlot>().is_err());
    }
}
