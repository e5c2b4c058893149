pub mod migrations;
pub mod store;

pub use store::SubscriberStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::preferences::Preferences;

/// A member who asked for the daily digest. `email` is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub member_number: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub preferences: Preferences,
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(
        email: impl Into<String>,
        member_number: impl Into<String>,
        password: impl Into<String>,
        preferences: Preferences,
    ) -> Self {
        Self {
            email: email.into().trim().to_string(),
            member_number: member_number.into().trim().to_string(),
            password: password.into(),
            preferences,
            updated_at: Utc::now(),
        }
    }

    /// Both an address and a member number are needed to log in and deliver.
    pub fn is_deliverable(&self) -> bool {
        !self.email.is_empty() && !self.member_number.is_empty()
    }
}
