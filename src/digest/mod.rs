//! Daily digest: each subscriber's top matches, delivered through sinks.

pub mod sink;

pub use sink::{build_sinks, DigestSink, StdoutSink, WebhookSink};

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, DigestSource, MockConfig, PortalConfig};
use crate::mock::{generate_mock_shifts, resolve_seed};
use crate::portal::PortalClient;
use crate::scoring::{ScoredShift, ShiftMatcher};
use crate::shift::Shift;
use crate::subscribers::{Subscriber, SubscriberStore};

#[async_trait]
pub trait ShiftSource: Send + Sync {
    async fn fetch(&self, subscriber: &Subscriber) -> Result<Vec<Shift>>;
}

/// Logs in as the subscriber and reads the live shift calendar.
pub struct PortalShiftSource {
    config: PortalConfig,
}

impl PortalShiftSource {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ShiftSource for PortalShiftSource {
    async fn fetch(&self, subscriber: &Subscriber) -> Result<Vec<Shift>> {
        let portal = PortalClient::new(&self.config)?;
        let login = portal
            .login(&subscriber.member_number, &subscriber.password)
            .await;
        if !login.success {
            bail!("login failed: {}", login.message);
        }
        let page = portal.fetch_shifts().await;
        if !page.success {
            bail!("shift fetch failed: {}", page.message);
        }
        Ok(page.shifts)
    }
}

pub struct MockShiftSource {
    config: MockConfig,
}

impl MockShiftSource {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ShiftSource for MockShiftSource {
    async fn fetch(&self, _subscriber: &Subscriber) -> Result<Vec<Shift>> {
        Ok(generate_mock_shifts(
            self.config.count,
            resolve_seed(&self.config),
        ))
    }
}

pub fn shift_source(config: &Config) -> Box<dyn ShiftSource> {
    match config.digest.source {
        DigestSource::Portal => Box::new(PortalShiftSource::new(config.portal.clone())),
        DigestSource::Mock => Box::new(MockShiftSource::new(config.mock.clone())),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub email: String,
    pub generated_at: DateTime<Utc>,
    pub matches: Vec<ScoredShift>,
}

impl Digest {
    pub fn new(email: impl Into<String>, matches: Vec<ScoredShift>) -> Self {
        Self {
            email: email.into(),
            generated_at: Utc::now(),
            matches,
        }
    }

    pub fn subject(&self) -> String {
        format!("ShiftMatch: Your Top {} Shifts Today", self.matches.len())
    }

    pub fn text(&self) -> String {
        render_digest_text(&self.matches)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs one digest pass. A subscriber counts as `failed` when any sink
/// rejects their digest, and as `skipped` when there was nothing to send.
pub async fn run_digest(
    subscribers: &[Subscriber],
    source: &dyn ShiftSource,
    sinks: &[Box<dyn DigestSink>],
    top_n: usize,
) -> DigestReport {
    let mut report = DigestReport::default();

    for subscriber in subscribers {
        if !subscriber.is_deliverable() {
            report.skipped += 1;
            continue;
        }
        info!(email = %subscriber.email, "building digest");

        let shifts = match source.fetch(subscriber).await {
            Ok(shifts) => shifts,
            Err(e) => {
                warn!(email = %subscriber.email, error = %e, "could not load shifts");
                report.skipped += 1;
                continue;
            }
        };
        if shifts.is_empty() {
            warn!(email = %subscriber.email, "no shifts found");
            report.skipped += 1;
            continue;
        }

        let matches = ShiftMatcher::new(&subscriber.preferences).top(&shifts, top_n);
        let digest = Digest::new(subscriber.email.clone(), matches);

        let mut delivered = true;
        for sink in sinks {
            if let Err(e) = sink.send(&digest).await {
                warn!(email = %subscriber.email, error = %e, "digest delivery failed");
                delivered = false;
            }
        }
        if delivered {
            report.sent += 1;
        } else {
            report.failed += 1;
        }
    }

    info!(
        sent = report.sent,
        skipped = report.skipped,
        failed = report.failed,
        "digest pass finished"
    );
    report
}

pub fn render_digest_text(matches: &[ScoredShift]) -> String {
    if matches.is_empty() {
        return "No matching shifts today.\n".to_string();
    }
    let mut out = String::new();
    for (rank, scored) in matches.iter().enumerate() {
        let shift = &scored.shift;
        let _ = writeln!(
            out,
            "#{} {} | {} {} | {} slots | {}%",
            rank + 1,
            shift.committee(),
            shift.day(),
            shift.time_raw(),
            shift.slots_label(),
            scored.score
        );
        for line in scored.breakdown.explanations() {
            let _ = writeln!(out, "    - {line}");
        }
        if let Some(url) = shift.signup_url() {
            let _ = writeln!(out, "    Sign up: {url}");
        }
    }
    out
}

/// Next moment strictly after `now` whose local wall-clock time is `at`.
/// Days where `at` does not exist (DST gaps) are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let timezone = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = timezone
            .from_local_datetime(&day.and_time(at))
            .earliest()
            .filter(|candidate| candidate > now)
        {
            return candidate;
        }
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return now.clone(),
        };
    }
}

/// Runs the digest at the configured time every day until the task is dropped.
pub async fn run_schedule(config: &Config) -> Result<()> {
    let at = config.digest.schedule()?;
    let source = shift_source(config);
    let sinks = build_sinks(&config.digest)?;

    loop {
        let now = Local::now();
        let next = next_run_after(&now, at);
        let wait = (next.clone() - now).to_std().unwrap_or_default();
        info!(next_run = %next.to_rfc3339(), "digest scheduled");
        tokio::time::sleep(wait).await;

        let subscribers = match load_subscribers(config) {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "skipping digest run");
                continue;
            }
        };
        run_digest(&subscribers, source.as_ref(), &sinks, config.digest.top_n).await;
    }
}

/// One digest pass over every stored subscriber.
pub async fn run_once(config: &Config) -> Result<DigestReport> {
    let source = shift_source(config);
    let sinks = build_sinks(&config.digest)?;
    let subscribers = load_subscribers(config)?;
    Ok(run_digest(&subscribers, source.as_ref(), &sinks, config.digest.top_n).await)
}

fn load_subscribers(config: &Config) -> Result<Vec<Subscriber>> {
    let path = config.resolved_db_path();
    SubscriberStore::open(&path)
        .and_then(|store| store.list())
        .with_context(|| format!("failed loading subscribers from {}", path.display()))
}
