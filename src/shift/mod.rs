pub mod time;

pub use time::{classify_time, contains_clock_time, start_hour_24, TimeSlot};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub const KNOWN_COMMITTEES: [&str; 13] = [
    "Receiving",
    "Stocking",
    "Checkout",
    "Produce",
    "Maintenance",
    "Food Processing",
    "Office",
    "Childcare",
    "Orientation",
    "Inventory",
    "Shopping",
    "Cashier",
    "FTOP",
];

/// A shift as an opaque JSON object.
///
/// Fields are never rewritten; the accessors below only read the ones scoring
/// cares about and return empty values when they are missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shift(Value);

impl Shift {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn committee(&self) -> &str {
        self.str_field("committee")
    }

    pub fn day(&self) -> &str {
        self.str_field("day")
    }

    pub fn time_slot(&self) -> &str {
        self.str_field("time_slot")
    }

    pub fn time_raw(&self) -> &str {
        self.str_field("time_raw")
    }

    pub fn description(&self) -> &str {
        self.str_field("description")
    }

    pub fn signup_url(&self) -> Option<&str> {
        self.0
            .get("signup_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// Open slot count; accepts either a JSON number or a numeric string.
    /// A missing field counts as zero and fractional numbers are truncated.
    pub fn slots(&self) -> Option<i64> {
        match self.0.get("slots") {
            None | Some(Value::Null) => Some(0),
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(_) => None,
        }
    }

    pub fn slots_label(&self) -> String {
        match self.0.get("slots") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "?".to_string(),
        }
    }

    fn str_field(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

impl From<Value> for Shift {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Typed form of the shifts this crate produces itself (portal pages, mock data).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftRecord {
    pub id: String,
    pub day: String,
    pub date: Option<String>,
    pub time_raw: String,
    pub time_slot: Option<TimeSlot>,
    pub committee: String,
    pub description: String,
    pub signup_url: String,
    pub slots: String,
    pub status: Option<String>,
    pub is_carrot: Option<bool>,
    pub source_table: Value,
    pub source_row: usize,
}

impl From<ShiftRecord> for Shift {
    fn from(record: ShiftRecord) -> Self {
        let time_slot = record
            .time_slot
            .unwrap_or_else(|| classify_time(&record.time_raw));
        let mut map = Map::new();
        map.insert("id".to_string(), Value::from(record.id));
        map.insert("day".to_string(), Value::from(record.day));
        if let Some(date) = record.date {
            map.insert("date".to_string(), Value::from(date));
        }
        map.insert("time_raw".to_string(), Value::from(record.time_raw));
        map.insert("time_slot".to_string(), Value::from(time_slot.as_str()));
        map.insert("committee".to_string(), Value::from(record.committee));
        map.insert("description".to_string(), Value::from(record.description));
        map.insert("signup_url".to_string(), Value::from(record.signup_url));
        map.insert("slots".to_string(), Value::from(record.slots));
        if let Some(status) = record.status {
            map.insert("status".to_string(), Value::from(status));
        }
        if let Some(is_carrot) = record.is_carrot {
            map.insert("is_carrot".to_string(), Value::from(is_carrot));
        }
        map.insert("source_table".to_string(), record.source_table);
        map.insert("source_row".to_string(), Value::from(record.source_row));
        Self(Value::Object(map))
    }
}

pub fn shift_id(index: usize) -> String {
    format!("shift_{index:03}")
}

pub fn is_day_name(text: &str) -> bool {
    let lower = text.trim().to_ascii_lowercase();
    ["mon", "tue", "wed", "thu", "fri", "sat", "sun"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Expands an abbreviated day ("sat", "Saturday 2/14") to its full name.
pub fn normalize_day(text: &str) -> String {
    let trimmed = text.trim();
    let prefix: String = trimmed.chars().take(3).collect::<String>().to_lowercase();
    if prefix.len() == 3 {
        if let Some(day) = DAY_NAMES
            .iter()
            .find(|day| day.to_ascii_lowercase().starts_with(&prefix))
        {
            return (*day).to_string();
        }
    }
    title_case(trimmed)
}

/// Matches free text against the known committee list in either direction.
pub fn fuzzy_committee(text: &str) -> Option<&'static str> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    KNOWN_COMMITTEES.iter().copied().find(|committee| {
        let committee_lower = committee.to_lowercase();
        lower.contains(&committee_lower) || committee_lower.contains(&lower)
    })
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
