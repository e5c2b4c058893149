pub mod matcher;

pub use matcher::ShiftMatcher;

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::shift::Shift;

pub const MAX_SCORE: u8 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredShift {
    pub shift: Shift,
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    #[serde(default)]
    pub breakdown: Breakdown,
}

/// Criterion label to explanation, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown {
    entries: Vec<(String, String)>,
}

impl Breakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the text of an existing label in place.
    pub fn insert(&mut self, label: impl Into<String>, explanation: impl Into<String>) {
        let label = label.into();
        let explanation = explanation.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = explanation,
            None => self.entries.push((label, explanation)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, e)| e.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, e)| (l.as_str(), e.as_str()))
    }

    pub fn explanations(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, e)| e.as_str())
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Breakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, explanation) in &self.entries {
            map.serialize_entry(label, explanation)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Breakdown {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BreakdownVisitor;

        impl<'de> Visitor<'de> for BreakdownVisitor {
            type Value = Breakdown;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of criterion labels to explanations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Breakdown, A::Error> {
                let mut breakdown = Breakdown::new();
                while let Some((label, explanation)) = access.next_entry::<String, String>()? {
                    breakdown.insert(label, explanation);
                }
                Ok(breakdown)
            }
        }

        deserializer.deserialize_map(BreakdownVisitor)
    }
}

fn deserialize_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    u8::try_from(raw)
        .ok()
        .filter(|score| *score <= MAX_SCORE)
        .ok_or_else(|| de::Error::custom(format!("score {raw} outside 0..={MAX_SCORE}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn breakdown_keeps_insertion_order() {
        let mut breakdown = Breakdown::new();
        breakdown.insert("time", "Evening is a preferred time");
        breakdown.insert("committee", "Top choice: Office (+10%)");
        breakdown.insert("time", "Evening is not preferred (-15%)");
        assert_eq!(breakdown.labels(), vec!["time", "committee"]);
        assert_eq!(breakdown.get("time"), Some("Evening is not preferred (-15%)"));

        let encoded = serde_json::to_string(&breakdown).expect("serializable");
        assert_eq!(
            encoded,
            r#"{"time":"Evening is not preferred (-15%)","committee":"Top choice: Office (+10%)"}"#
        );
    }

    #[test]
    fn decodes_scored_shift_and_preserves_label_order() {
        let scored: ScoredShift = serde_json::from_value(json!({
            "shift": {"id": 1},
            "score": 85,
            "breakdown": {"slots": "2 slots available", "day": "Monday is a preferred day"}
        }))
        .expect("valid scored shift");
        assert_eq!(scored.score, 85);
        assert_eq!(scored.breakdown.labels(), vec!["slots", "day"]);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        for bad in [json!(101), json!(-1), json!("90")] {
            let result = serde_json::from_value::<ScoredShift>(json!({
                "shift": {}, "score": bad, "breakdown": {}
            }));
            assert!(result.is_err());
        }
    }
}
