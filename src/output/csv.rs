use anyhow::Result;

use crate::scoring::ScoredShift;
use crate::shift::Shift;

pub fn scored_to_csv(scored: &[ScoredShift]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "rank",
        "id",
        "day",
        "time",
        "time_slot",
        "committee",
        "slots",
        "score",
        "breakdown",
        "signup_url",
    ])?;
    for (idx, s) in scored.iter().enumerate() {
        writer.write_record([
            (idx + 1).to_string(),
            s.shift.id().unwrap_or_default().to_string(),
            s.shift.day().to_string(),
            s.shift.time_raw().to_string(),
            s.shift.time_slot().to_string(),
            s.shift.committee().to_string(),
            s.shift.slots_label(),
            s.score.to_string(),
            s.breakdown.explanations().collect::<Vec<_>>().join("; "),
            s.shift.signup_url().unwrap_or_default().to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn shifts_to_csv(shifts: &[Shift]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["id", "day", "time", "time_slot", "committee", "slots", "description"])?;
    for shift in shifts {
        writer.write_record([
            shift.id().unwrap_or_default(),
            shift.day(),
            shift.time_raw(),
            shift.time_slot(),
            shift.committee(),
            shift.slots_label().as_str(),
            shift.description(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
