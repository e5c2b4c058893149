use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::digest::DigestReport;
use crate::scoring::ScoredShift;
use crate::shift::Shift;
use crate::subscribers::Subscriber;

const GOOD_SCORE: u8 = 80;
const POOR_SCORE: u8 = 50;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_scored_table(scored: &[ScoredShift]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Rank", "Committee", "Day", "Time", "Slot", "Slots", "Score", "Why",
    ]);

    for (idx, s) in scored.iter().enumerate() {
        let color = if s.score >= GOOD_SCORE {
            Color::Green
        } else if s.score < POOR_SCORE {
            Color::Red
        } else {
            Color::Yellow
        };
        table.add_row(Row::from(vec![
            Cell::new(idx + 1),
            Cell::new(s.shift.committee()),
            Cell::new(s.shift.day()),
            Cell::new(s.shift.time_raw()),
            Cell::new(s.shift.time_slot()),
            Cell::new(s.shift.slots_label()),
            Cell::new(format!("{}%", s.score)).fg(color),
            Cell::new(s.breakdown.explanations().collect::<Vec<_>>().join("\n")),
        ]));
    }
    table.to_string()
}

pub fn render_shifts_table(shifts: &[Shift]) -> String {
    let mut table = new_table();
    table.set_header(vec!["ID", "Day", "Time", "Committee", "Slots", "Status"]);
    for shift in shifts {
        let status = shift
            .as_value()
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        table.add_row(vec![
            shift.id().unwrap_or("-").to_string(),
            shift.day().to_string(),
            shift.time_raw().to_string(),
            shift.committee().to_string(),
            shift.slots_label(),
            status.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_subscribers_table(subscribers: &[Subscriber]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Email", "Member", "Committees", "Updated"]);
    for s in subscribers {
        table.add_row(vec![
            s.email.clone(),
            s.member_number.clone(),
            s.preferences.committees.join(", "),
            s.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_digest_report_table(report: &DigestReport) -> String {
    let mut table = new_table();
    table.set_header(vec!["Sent", "Skipped", "Failed"]);
    let failed = if report.failed > 0 {
        Cell::new(report.failed).fg(Color::Red)
    } else {
        Cell::new(report.failed)
    };
    table.add_row(Row::from(vec![
        Cell::new(report.sent).fg(Color::Green),
        Cell::new(report.skipped),
        failed,
    ]));
    table.to_string()
}
