use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::preferences::Preferences;
use crate::subscribers::migrations::BASE_MIGRATION;
use crate::subscribers::Subscriber;

pub struct SubscriberStore {
    conn: Connection,
}

impl SubscriberStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed creating database directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed opening database: {}", path.display()))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    /// Inserts the subscriber, or replaces credentials and preferences for an
    /// existing email. `created_at` survives the update.
    pub fn upsert(&self, subscriber: &Subscriber) -> Result<()> {
        let updated_at = subscriber.updated_at.to_rfc3339();
        self.conn.execute(
            r#"
INSERT INTO subscribers(email, member_number, password, preferences_json, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?5)
ON CONFLICT(email) DO UPDATE SET
    member_number = excluded.member_number,
    password = excluded.password,
    preferences_json = excluded.preferences_json,
    updated_at = excluded.updated_at
"#,
            params![
                subscriber.email,
                subscriber.member_number,
                subscriber.password,
                serde_json::to_string(&subscriber.preferences)?,
                updated_at
            ],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Subscriber>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT email, member_number, password, preferences_json, updated_at
FROM subscribers
ORDER BY created_at ASC, email ASC
"#,
        )?;
        let rows = stmt
            .query_map([], row_to_subscriber)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, email: &str) -> Result<Option<Subscriber>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT email, member_number, password, preferences_json, updated_at
FROM subscribers
WHERE email = ?1
"#,
        )?;
        match stmt.query_row(params![email], row_to_subscriber) {
            Ok(subscriber) => Ok(Some(subscriber)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether a row was deleted.
    pub fn remove(&self, email: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM subscribers WHERE email = ?1", params![email])?;
        Ok(deleted > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM subscribers", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_subscriber(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    let preferences_json: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(Subscriber {
        email: row.get(0)?,
        member_number: row.get(1)?,
        password: row.get(2)?,
        preferences: serde_json::from_str::<Preferences>(&preferences_json).unwrap_or_default(),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
