pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS subscribers (
    email TEXT PRIMARY KEY NOT NULL,
    member_number TEXT NOT NULL,
    password TEXT NOT NULL,
    preferences_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_subscribers_updated
    ON subscribers(updated_at DESC);
"#;
