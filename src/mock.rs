use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::MockConfig;
use crate::shift::{shift_id, Shift, ShiftRecord, TimeSlot, DAY_NAMES};

pub const DEFAULT_MOCK_COUNT: usize = 30;

const MOCK_COMMITTEES: [&str; 5] = ["Receiving", "Stocking", "Checkout", "Produce", "Maintenance"];
const SLOT_COUNTS: [u32; 7] = [1, 2, 3, 4, 5, 6, 8];
const MOCK_SIGNUP_URL: &str = "https://members.foodcoop.com/services/shifts/";

const DESCRIPTIONS: [&str; 10] = [
    "Unload deliveries and stock shelves in the walk-in cooler area.",
    "Assist members at checkout lanes and handle returns.",
    "Stock dry goods, dairy, and frozen sections.",
    "Sort and display produce, rotate older stock.",
    "General maintenance: cleaning, minor repairs, recycling.",
    "Process incoming shipments and verify invoices.",
    "Bag groceries and assist elderly/disabled members.",
    "Restock bulk bins and ensure proper labeling.",
    "Floor cleaning, bathroom maintenance, trash removal.",
    "Help with inventory counts and shelf organization.",
];

fn windows(slot: TimeSlot) -> &'static [(&'static str, &'static str)] {
    match slot {
        TimeSlot::Morning => &[
            ("6:00AM", "8:45AM"),
            ("7:00AM", "9:45AM"),
            ("8:00AM", "10:45AM"),
            ("9:00AM", "11:00AM"),
        ],
        TimeSlot::Afternoon => &[
            ("12:00PM", "2:45PM"),
            ("1:00PM", "3:45PM"),
            ("2:00PM", "4:45PM"),
        ],
        TimeSlot::Evening => &[
            ("5:00PM", "7:45PM"),
            ("6:00PM", "8:45PM"),
            ("7:00PM", "9:45PM"),
        ],
        TimeSlot::Overnight => &[("9:30PM", "12:15AM"), ("10:00PM", "12:45AM")],
    }
}

/// Sample shifts for demos and for when the portal cannot be parsed.
///
/// Every choice is derived from `seed`, so the same seed reproduces the same list.
pub fn generate_mock_shifts(count: usize, seed: u64) -> Vec<Shift> {
    (0..count)
        .map(|i| {
            let pick = |field: &str, len: usize| choose(seed, i, field, len);
            let slot = TimeSlot::ALL[pick("slot", TimeSlot::ALL.len())];
            let slot_windows = windows(slot);
            let (start, end) = slot_windows[pick("window", slot_windows.len())];
            ShiftRecord {
                id: shift_id(i + 1),
                day: DAY_NAMES[pick("day", DAY_NAMES.len())].to_string(),
                date: None,
                time_raw: format!("{start} - {end}"),
                time_slot: Some(slot),
                committee: MOCK_COMMITTEES[pick("committee", MOCK_COMMITTEES.len())].to_string(),
                description: DESCRIPTIONS[pick("description", DESCRIPTIONS.len())].to_string(),
                signup_url: MOCK_SIGNUP_URL.to_string(),
                slots: SLOT_COUNTS[pick("slots", SLOT_COUNTS.len())].to_string(),
                status: None,
                is_carrot: None,
                source_table: Value::from(0),
                source_row: i,
            }
            .into()
        })
        .collect()
}

/// Configured seed, or one taken from the clock so each call differs.
pub fn resolve_seed(config: &MockConfig) -> u64 {
    config.seed.unwrap_or_else(|| {
        let now = Utc::now();
        now.timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros()) as u64
    })
}

fn choose(seed: u64, index: usize, field: &str, len: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(field.as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(head) % len as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_same_shifts() {
        let first = generate_mock_shifts(12, 42);
        let second = generate_mock_shifts(12, 42);
        assert_eq!(first, second);
        assert_ne!(first, generate_mock_shifts(12, 43));
    }

    #[test]
    fn shifts_are_internally_consistent() {
        let shifts = generate_mock_shifts(DEFAULT_MOCK_COUNT, 7);
        assert_eq!(shifts.len(), DEFAULT_MOCK_COUNT);
        assert_eq!(shifts[0].id(), Some("shift_001"));
        assert_eq!(shifts[29].id(), Some("shift_030"));
        for shift in &shifts {
            assert!(MOCK_COMMITTEES.contains(&shift.committee()));
            assert!(DAY_NAMES.contains(&shift.day()));
            let slot: TimeSlot = shift.time_slot().parse().expect("known slot");
            let start = shift.time_raw().split(" - ").next().unwrap_or_default();
            assert!(windows(slot).iter().any(|(s, _)| *s == start));
            assert!(shift.slots().is_some());
        }
    }

    #[test]
    fn configured_seed_wins_over_clock() {
        let config = MockConfig {
            count: 3,
            seed: Some(99),
        };
        assert_eq!(resolve_seed(&config), 99);
    }
}
