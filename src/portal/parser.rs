//! Shift calendar parsing for member portal pages.
//!
//! Two layouts are recognised: the older table listing (one shift per row,
//! optional day-section rows) and the column grid where each `div.col` is one
//! day and each `a.shift` inside it is one shift. Extraction is regex-based
//! and tolerant of missing cells.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::shift::{
    contains_clock_time, fuzzy_committee, is_day_name, normalize_day, shift_id, Shift,
    ShiftRecord,
};

const MAX_DESCRIPTION_CHARS: usize = 200;
const UNKNOWN_DAY: &str = "Unknown";
const DEFAULT_COMMITTEE: &str = "General";

static TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").expect("table regex"));
static ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("row regex"));
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]>").expect("cell regex"));
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("href regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static DIV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div\b[^>]*?\bclass\s*=\s*["']([^"']*)["'][^>]*>"#).expect("div regex")
});
static DIV_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(/?)div\b([^>]*)>").expect("div tag regex"));
static PARA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("paragraph regex"));
static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("anchor regex"));
static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<b\b[^>]*>(.*?)</b>").expect("bold regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute regex")
});
static GRID_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Mon|Tue|Wed|Thu|Fri|Sat|Sun)\s*(\d{1,2}/\d{1,2}/\d{4})").expect("header regex")
});
static SLOT_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("slot regex"));
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x{1F300}-\x{1FAFF}\x{2702}-\x{27B0}\x{FE00}-\x{FE0F}\x{200D}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]+",
    )
    .expect("emoji regex")
});
static TRAINING_MARK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*+\s*").expect("training marker regex"));

/// Parses a shifts page, trying the table layout first and the grid second.
pub fn parse_shift_page(html: &str, base_url: &str) -> Vec<Shift> {
    let shifts = parse_table_layout(html, base_url);
    if !shifts.is_empty() {
        return shifts;
    }
    parse_grid_layout(html, base_url)
}

/// Short structural summary of a page, for login/fetch debug output.
pub fn page_summary(html: &str) -> String {
    let tables = TABLE_RE.find_iter(html).count();
    let classed_divs = DIV_RE.find_iter(html).count();
    format!("Tables: {tables}, Divs with class: {classed_divs}")
}

#[derive(Debug, Default, Clone, Copy)]
struct HeaderMap {
    day: Option<usize>,
    time: Option<usize>,
    committee: Option<usize>,
    slots: Option<usize>,
    description: Option<usize>,
}

impl HeaderMap {
    fn detect(header_cells: &[Cell]) -> Self {
        let mut map = Self::default();
        for (idx, cell) in header_cells.iter().enumerate() {
            let text = cell.text.to_lowercase();
            let has = |keys: &[&str]| keys.iter().any(|k| text.contains(k));
            if has(&["day", "date"]) {
                map.day = Some(idx);
            } else if has(&["time", "hour", "when"]) {
                map.time = Some(idx);
            } else if has(&["committee", "squad", "dept", "area", "job"]) {
                map.committee = Some(idx);
            } else if has(&["slot", "open", "avail", "remain"]) {
                map.slots = Some(idx);
            } else if has(&["desc", "detail", "note", "info"]) {
                map.description = Some(idx);
            }
        }
        map
    }
}

#[derive(Debug, Clone)]
struct Cell {
    text: String,
    html: String,
}

pub fn parse_table_layout(html: &str, base_url: &str) -> Vec<Shift> {
    let mut shifts = Vec::new();
    let mut counter = 0usize;

    for (table_idx, table) in TABLE_RE.captures_iter(html).enumerate() {
        let rows = ROW_RE
            .captures_iter(&table[1])
            .map(|row| {
                CELL_RE
                    .captures_iter(&row[1])
                    .map(|cell| Cell {
                        text: text_content(&cell[1]),
                        html: cell[1].to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let Some((header, body)) = rows.split_first() else {
            continue;
        };
        let header_map = HeaderMap::detect(header);
        let mut current_day: Option<String> = None;

        for (offset, cells) in body.iter().enumerate() {
            if cells.len() == 1 && is_day_name(&cells[0].text) {
                current_day = Some(normalize_day(&cells[0].text));
                continue;
            }
            if cells.len() < 2 {
                continue;
            }
            let Some(mut record) = extract_row(
                cells,
                &header_map,
                current_day.as_deref(),
                base_url,
            ) else {
                continue;
            };
            counter += 1;
            record.id = shift_id(counter);
            record.source_table = Value::from(table_idx);
            record.source_row = offset + 1;
            shifts.push(record.into());
        }
    }
    shifts
}

fn extract_row(
    cells: &[Cell],
    header: &HeaderMap,
    current_day: Option<&str>,
    base_url: &str,
) -> Option<ShiftRecord> {
    let texts = cells.iter().map(|c| c.text.as_str()).collect::<Vec<_>>();
    let column = |idx: Option<usize>| {
        idx.and_then(|i| texts.get(i))
            .map(|t| t.to_string())
            .filter(|t| !t.is_empty())
    };

    let mut day = current_day.map(str::to_string).or_else(|| {
        column(header.day).map(|d| {
            if is_day_name(&d) {
                normalize_day(&d)
            } else {
                d
            }
        })
    });
    let mut time_raw = column(header.time).unwrap_or_default();
    let mut committee = column(header.committee).unwrap_or_default();
    let mut slots = column(header.slots).unwrap_or_default();
    let mut description = column(header.description).unwrap_or_default();

    for text in &texts {
        if day.is_none() && is_day_name(text) {
            day = Some(normalize_day(text));
        }
        if time_raw.is_empty() && contains_clock_time(text) {
            time_raw = text.to_string();
        }
        if committee.is_empty() {
            if let Some(found) = fuzzy_committee(text) {
                committee = found.to_string();
            }
        }
        if slots.is_empty() && SLOT_COUNT_RE.is_match(text.trim()) {
            slots = text.trim().to_string();
        }
    }

    if time_raw.is_empty() && committee.is_empty() {
        return None;
    }

    let signup_url = cells
        .iter()
        .filter_map(|cell| HREF_RE.captures(&cell.html).map(|c| c[1].trim().to_string()))
        .find(|href| {
            let lower = href.to_lowercase();
            lower.contains("signup") || lower.contains("shift") || lower.starts_with("http")
        })
        .map(|href| absolute_url(base_url, &href))
        .unwrap_or_default();

    if description.is_empty() {
        description = texts
            .iter()
            .filter(|t| {
                !t.is_empty() && Some(**t) != day.as_deref() && **t != time_raw.as_str()
            })
            .copied()
            .collect::<Vec<_>>()
            .join(" | ");
    }

    Some(ShiftRecord {
        day: day.unwrap_or_else(|| UNKNOWN_DAY.to_string()),
        time_raw,
        committee: if committee.is_empty() {
            DEFAULT_COMMITTEE.to_string()
        } else {
            committee
        },
        description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
        signup_url,
        slots,
        ..ShiftRecord::default()
    })
}

pub fn parse_grid_layout(html: &str, base_url: &str) -> Vec<Shift> {
    let Some(grid_start) = DIV_RE
        .captures_iter(html)
        .find(|c| has_class(&c[1], "grid-container"))
        .and_then(|c| c.get(0))
        .map(|m| m.end())
    else {
        return Vec::new();
    };
    let grid = &html[grid_start..];

    let mut shifts = Vec::new();
    let mut counter = 0usize;
    for column in grid_columns(grid) {
        let Some(header) = PARA_RE.captures(column).map(|c| text_content(&c[1])) else {
            continue;
        };
        let (day, date) = match GRID_HEADER_RE.captures(&header) {
            Some(caps) => (normalize_day(&caps[1]), caps[2].to_string()),
            None => (UNKNOWN_DAY.to_string(), String::new()),
        };

        for anchor in ANCHOR_RE.captures_iter(column) {
            let attrs = parse_attributes(&anchor[1]);
            let classes = attr(&attrs, "class").unwrap_or_default();
            if !has_class(classes, "shift") {
                continue;
            }
            let unavailable = has_class(classes, "unavail");
            let has_worker = has_class(classes, "worker");
            let is_carrot = has_class(classes, "carrot");

            let inner = &anchor[2];
            let time_raw = BOLD_RE
                .captures(inner)
                .map(|c| text_content(&c[1]))
                .unwrap_or_default();
            let committee = clean_committee(&text_content(inner), &time_raw);

            let href = attr(&attrs, "href").unwrap_or_default().trim();
            let signup_url = if href.is_empty() {
                String::new()
            } else {
                absolute_url(base_url, href)
            };

            let (status, slots) = if unavailable {
                ("unavailable", "0")
            } else if has_worker {
                ("filled", "0")
            } else {
                ("available", "1")
            };

            let mut notes = Vec::new();
            if is_carrot {
                notes.push("Carrot shift (extra credit)");
            }
            if unavailable {
                notes.push("Currently unavailable");
            }
            if has_worker {
                notes.push("Worker assigned");
            }

            counter += 1;
            shifts.push(
                ShiftRecord {
                    id: shift_id(counter),
                    day: day.clone(),
                    date: Some(date.clone()),
                    time_raw,
                    time_slot: None,
                    committee,
                    description: notes.join("; "),
                    signup_url,
                    slots: slots.to_string(),
                    status: Some(status.to_string()),
                    is_carrot: Some(is_carrot),
                    source_table: Value::from("grid-container"),
                    source_row: counter,
                }
                .into(),
            );
        }
    }
    shifts
}

/// Bodies of the `div.col` elements directly inside the grid container.
/// `grid` starts just after the container's opening tag; scanning stops at
/// its closing tag.
fn grid_columns(grid: &str) -> Vec<&str> {
    let mut columns = Vec::new();
    let mut depth = 0usize;
    let mut open_column: Option<usize> = None;

    for tag in DIV_TAG_RE.captures_iter(grid) {
        let Some(whole) = tag.get(0) else { continue };
        if tag[1].is_empty() {
            if depth == 0 {
                let attrs = parse_attributes(&tag[2]);
                if has_class(attr(&attrs, "class").unwrap_or_default(), "col") {
                    open_column = Some(whole.end());
                }
            }
            depth += 1;
        } else {
            if depth == 0 {
                break;
            }
            depth -= 1;
            if depth == 0 {
                if let Some(start) = open_column.take() {
                    columns.push(&grid[start..whole.start()]);
                }
            }
        }
    }
    if let Some(start) = open_column {
        columns.push(&grid[start..]);
    }
    columns
}

/// Strips the time, carrot marker, emoji and training asterisks from a
/// shift label, leaving the committee name.
fn clean_committee(full_text: &str, time_raw: &str) -> String {
    let mut text = full_text.to_string();
    if !time_raw.is_empty() {
        text = text.replace(time_raw, "");
    }
    let text = text.replace('\u{1F955}', "");
    let text = EMOJI_RE.replace_all(&text, "");
    let text = TRAINING_MARK_RE.replace(text.trim(), "");
    let cleaned = text.trim();
    if cleaned.is_empty() {
        DEFAULT_COMMITTEE.to_string()
    } else {
        cleaned.to_string()
    }
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    }
}

fn has_class(class_attr: &str, class: &str) -> bool {
    class_attr.split_whitespace().any(|c| c == class)
}

pub(crate) fn parse_attributes(tag_body: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag_body)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (c[1].to_ascii_lowercase(), value)
        })
        .collect()
}

pub(crate) fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Visible text of an HTML fragment with entities decoded and whitespace collapsed.
pub(crate) fn text_content(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WS_RE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&middot;", "·")
        .replace("&amp;", "&")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
