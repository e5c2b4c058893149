use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filters selected by the member.
///
/// `committees` is ranked, most preferred first. A committee may be ranked or
/// excluded but never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub committees: Vec<String>,
    #[serde(
        default,
        rename = "excludedCommittees",
        alias = "excluded_committees"
    )]
    pub excluded_committees: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreferencesError {
    #[error("committee {0:?} is both ranked and excluded")]
    Conflict(String),
}

impl Preferences {
    pub fn validate(&self) -> Result<(), PreferencesError> {
        let excluded = self
            .excluded_committees
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect::<BTreeSet<_>>();
        match self
            .committees
            .iter()
            .find(|c| excluded.contains(&c.trim().to_lowercase()))
        {
            Some(conflict) => Err(PreferencesError::Conflict(conflict.clone())),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
            && self.times.is_empty()
            && self.committees.is_empty()
            && self.excluded_committees.is_empty()
    }

    /// Moves `committee` to the excluded set, dropping it from the ranking.
    pub fn exclude(&mut self, committee: &str) {
        let key = committee.trim().to_lowercase();
        self.committees.retain(|c| c.trim().to_lowercase() != key);
        if !self
            .excluded_committees
            .iter()
            .any(|c| c.trim().to_lowercase() == key)
        {
            self.excluded_committees.push(committee.trim().to_string());
        }
    }

    /// Appends `committee` to the ranking, lifting any exclusion.
    pub fn rank(&mut self, committee: &str) {
        let key = committee.trim().to_lowercase();
        self.excluded_committees
            .retain(|c| c.trim().to_lowercase() != key);
        if !self.committees.iter().any(|c| c.trim().to_lowercase() == key) {
            self.committees.push(committee.trim().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_with_wire_field_names() {
        let prefs = Preferences {
            days: vec!["Mon".to_string()],
            times: vec![],
            committees: vec!["Receiving".to_string()],
            excluded_committees: vec![],
        };
        assert_eq!(
            serde_json::to_value(&prefs).expect("serializable"),
            json!({
                "days": ["Mon"],
                "times": [],
                "committees": ["Receiving"],
                "excludedCommittees": []
            })
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let prefs: Preferences =
            serde_json::from_value(json!({"days": ["Tuesday"]})).expect("valid preferences");
        assert_eq!(prefs.days, vec!["Tuesday"]);
        assert!(prefs.committees.is_empty());
        assert!(prefs.excluded_committees.is_empty());
    }

    #[test]
    fn rejects_committee_that_is_ranked_and_excluded() {
        let prefs = Preferences {
            committees: vec!["Office".to_string(), "Produce".to_string()],
            excluded_committees: vec!["produce".to_string()],
            ..Preferences::default()
        };
        assert_eq!(
            prefs.validate(),
            Err(PreferencesError::Conflict("Produce".to_string()))
        );
    }

    #[test]
    fn exclude_and_rank_keep_lists_disjoint() {
        let mut prefs = Preferences::default();
        prefs.rank("Checkout");
        prefs.rank("Stocking");
        prefs.exclude("checkout");
        assert_eq!(prefs.committees, vec!["Stocking"]);
        assert_eq!(prefs.excluded_committees, vec!["checkout"]);
        prefs.rank("Checkout");
        assert!(prefs.excluded_committees.is_empty());
        assert!(prefs.validate().is_ok());
    }
}
