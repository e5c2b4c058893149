use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::scoring::ScoredShift;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Scored shifts in the `{"scored_shifts": [...]}` wire shape, so the output
/// of one command can be fed to `rescore`.
pub fn render_scored_json(scored: &[ScoredShift]) -> Result<String> {
    render_json(&json!({ "scored_shifts": scored }))
}
