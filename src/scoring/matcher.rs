use crate::preferences::Preferences;
use crate::scoring::{Breakdown, ScoredShift, MAX_SCORE};
use crate::shift::{start_hour_24, Shift};

const BASE_SCORE: i32 = 100;
const TOP_CHOICE_BONUS: i32 = 10;
const RANK_STEP_PENALTY: i32 = 5;
const UNRANKED_COMMITTEE_PENALTY: i32 = 25;
const DAY_PENALTY: i32 = 20;
const TIME_PENALTY: i32 = 15;
const MANY_SLOTS_BONUS: i32 = 5;
const LAST_SLOT_PENALTY: i32 = 5;
const LATE_PENALTY: i32 = 10;
const LATE_HOUR: u32 = 21;

/// Scores shifts against one set of preferences.
#[derive(Debug, Clone)]
pub struct ShiftMatcher {
    days: Vec<String>,
    times: Vec<String>,
    committees: Vec<String>,
    excluded: Vec<String>,
}

impl ShiftMatcher {
    pub fn new(preferences: &Preferences) -> Self {
        Self {
            days: lowercase_all(&preferences.days),
            times: lowercase_all(&preferences.times),
            committees: lowercase_all(&preferences.committees),
            excluded: lowercase_all(&preferences.excluded_committees),
        }
    }

    pub fn is_excluded(&self, shift: &Shift) -> bool {
        let committee = shift.committee().to_lowercase();
        self.excluded.iter().any(|c| *c == committee)
    }

    pub fn score(&self, shift: &Shift) -> ScoredShift {
        let mut total = BASE_SCORE;
        let mut breakdown = Breakdown::new();

        total += self.score_committee(shift, &mut breakdown);
        total += self.score_day(shift, &mut breakdown);
        total += self.score_time(shift, &mut breakdown);
        total += score_slots(shift, &mut breakdown);
        total += score_late(shift, &mut breakdown);

        ScoredShift {
            shift: shift.clone(),
            score: total.clamp(0, i32::from(MAX_SCORE)) as u8,
            breakdown,
        }
    }

    /// Drops excluded committees, then orders by score (highest first, stable).
    pub fn rank(&self, shifts: &[Shift]) -> Vec<ScoredShift> {
        let mut scored = shifts
            .iter()
            .filter(|shift| !self.is_excluded(shift))
            .map(|shift| self.score(shift))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }

    pub fn top(&self, shifts: &[Shift], n: usize) -> Vec<ScoredShift> {
        let mut ranked = self.rank(shifts);
        ranked.truncate(n);
        ranked
    }

    fn score_committee(&self, shift: &Shift, breakdown: &mut Breakdown) -> i32 {
        let committee = shift.committee();
        if self.committees.is_empty() {
            breakdown.insert("committee", "No committee preference set");
            return 0;
        }
        let key = committee.to_lowercase();
        match self.committees.iter().position(|c| *c == key) {
            Some(0) => {
                breakdown.insert(
                    "committee",
                    format!("Top choice: {committee} (+{TOP_CHOICE_BONUS}%)"),
                );
                TOP_CHOICE_BONUS
            }
            Some(rank) => {
                let penalty = rank as i32 * RANK_STEP_PENALTY;
                breakdown.insert(
                    "committee",
                    format!("Rank #{}: {committee} (-{penalty}%)", rank + 1),
                );
                -penalty
            }
            None => {
                breakdown.insert(
                    "committee",
                    format!(
                        "{committee} not in your preferences (-{UNRANKED_COMMITTEE_PENALTY}%)"
                    ),
                );
                -UNRANKED_COMMITTEE_PENALTY
            }
        }
    }

    fn score_day(&self, shift: &Shift, breakdown: &mut Breakdown) -> i32 {
        let day = shift.day();
        if self.days.is_empty() {
            breakdown.insert("day", "No day preference set");
            0
        } else if self.days.contains(&day.to_lowercase()) {
            breakdown.insert("day", format!("{day} is a preferred day"));
            0
        } else {
            breakdown.insert("day", format!("{day} is not preferred (-{DAY_PENALTY}%)"));
            -DAY_PENALTY
        }
    }

    fn score_time(&self, shift: &Shift, breakdown: &mut Breakdown) -> i32 {
        let slot = shift.time_slot();
        if self.times.is_empty() {
            breakdown.insert("time", "No time preference set");
            0
        } else if self.times.contains(&slot.to_lowercase()) {
            breakdown.insert("time", format!("{slot} is a preferred time"));
            0
        } else {
            breakdown.insert("time", format!("{slot} is not preferred (-{TIME_PENALTY}%)"));
            -TIME_PENALTY
        }
    }
}

fn score_slots(shift: &Shift, breakdown: &mut Breakdown) -> i32 {
    match shift.slots() {
        Some(n) if n > 3 => {
            breakdown.insert("slots", format!("{n} slots available (+{MANY_SLOTS_BONUS}%)"));
            MANY_SLOTS_BONUS
        }
        Some(1) => {
            breakdown.insert("slots", format!("Only 1 slot left (-{LAST_SLOT_PENALTY}%)"));
            -LAST_SLOT_PENALTY
        }
        Some(n) => {
            breakdown.insert("slots", format!("{n} slots available"));
            0
        }
        None => {
            breakdown.insert("slots", "Slots unknown");
            0
        }
    }
}

fn score_late(shift: &Shift, breakdown: &mut Breakdown) -> i32 {
    match start_hour_24(shift.time_raw()) {
        Some(hour) if hour >= LATE_HOUR => {
            breakdown.insert("late", format!("Late evening shift (-{LATE_PENALTY}%)"));
            -LATE_PENALTY
        }
        _ => 0,
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn shift(committee: &str, day: &str, slot: &str, time_raw: &str, slots: &str) -> Shift {
        Shift::new(json!({
            "committee": committee,
            "day": day,
            "time_slot": slot,
            "time_raw": time_raw,
            "slots": slots,
        }))
    }

    fn prefs() -> Preferences {
        Preferences {
            days: vec!["Monday".to_string(), "Saturday".to_string()],
            times: vec!["Morning".to_string()],
            committees: vec![
                "Receiving".to_string(),
                "Produce".to_string(),
                "Office".to_string(),
            ],
            excluded_committees: vec!["Checkout".to_string()],
        }
    }

    #[test]
    fn top_choice_on_preferred_day_caps_at_max() {
        let matcher = ShiftMatcher::new(&prefs());
        let scored = matcher.score(&shift("Receiving", "Monday", "Morning", "7:00AM", "5"));
        assert_eq!(scored.score, 100);
        assert_eq!(
            scored.breakdown.labels(),
            vec!["committee", "day", "time", "slots"]
        );
        assert_eq!(
            scored.breakdown.get("committee"),
            Some("Top choice: Receiving (+10%)")
        );
        assert_eq!(
            scored.breakdown.get("slots"),
            Some("5 slots available (+5%)")
        );
    }

    #[test]
    fn applies_rank_day_time_and_late_penalties() {
        let matcher = ShiftMatcher::new(&prefs());
        let scored = matcher.score(&shift("office", "Tuesday", "Overnight", "9:30PM", "1"));
        // 100 - 10 (rank 3) - 20 - 15 - 5 - 10
        assert_eq!(scored.score, 40);
        assert_eq!(scored.breakdown.get("committee"), Some("Rank #3: office (-10%)"));
        assert_eq!(
            scored.breakdown.get("late"),
            Some("Late evening shift (-10%)")
        );
    }

    #[test]
    fn unranked_committee_and_unknown_slots() {
        let matcher = ShiftMatcher::new(&prefs());
        let scored = matcher.score(&shift("Maintenance", "Saturday", "Morning", "", "lots"));
        assert_eq!(scored.score, 75);
        assert_eq!(scored.breakdown.get("slots"), Some("Slots unknown"));
        assert!(scored.breakdown.get("late").is_none());
    }

    #[test]
    fn missing_slots_count_as_zero() {
        let matcher = ShiftMatcher::new(&Preferences::default());
        let scored = matcher.score(&Shift::new(json!({"id": 1})));
        assert_eq!(scored.score, 100);
        assert_eq!(scored.breakdown.get("slots"), Some("0 slots available"));

        let fractional = matcher.score(&Shift::new(json!({"slots": 5.0})));
        assert_eq!(
            fractional.breakdown.get("slots"),
            Some("5 slots available (+5%)")
        );
    }

    #[test]
    fn empty_preferences_explain_missing_filters() {
        let matcher = ShiftMatcher::new(&Preferences::default());
        let scored = matcher.score(&shift("Produce", "Sunday", "Evening", "6:00PM", "2"));
        assert_eq!(scored.score, 100);
        assert_eq!(
            scored.breakdown.explanations().collect::<Vec<_>>(),
            vec![
                "No committee preference set",
                "No day preference set",
                "No time preference set",
                "2 slots available",
            ]
        );
    }

    #[test]
    fn rank_filters_excluded_and_sorts_descending() {
        let matcher = ShiftMatcher::new(&prefs());
        let shifts = vec![
            shift("Office", "Monday", "Morning", "8:00AM", "2"),
            shift("CHECKOUT", "Monday", "Morning", "8:00AM", "6"),
            shift("Receiving", "Monday", "Morning", "8:00AM", "2"),
            shift("Produce", "Monday", "Morning", "8:00AM", "2"),
        ];
        let ranked = matcher.rank(&shifts);
        let committees = ranked
            .iter()
            .map(|s| s.shift.committee())
            .collect::<Vec<_>>();
        assert_eq!(committees, vec!["Receiving", "Produce", "Office"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));

        let top = matcher.top(&shifts, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].shift.committee(), "Receiving");
    }

    #[test]
    fn ties_keep_input_order() {
        let matcher = ShiftMatcher::new(&Preferences::default());
        let shifts = vec![
            Shift::new(json!({"id": "a", "slots": "2"})),
            Shift::new(json!({"id": "b", "slots": "2"})),
        ];
        let ranked = matcher.rank(&shifts);
        assert_eq!(ranked[0].shift.id(), Some("a"));
        assert_eq!(ranked[1].shift.id(), Some("b"));
    }
}
