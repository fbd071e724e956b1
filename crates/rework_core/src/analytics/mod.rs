use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::EngineConfig;
use crate::domain::ClassifiedRecord;
use crate::engine::gaps::days_between;
use crate::filter::{reporting_window, DateWindow};

pub const DASHBOARD_PAYLOAD_VERSION: u32 = 1;
pub const UNKNOWN_KEY: &str = "UNKNOWN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagBucket {
    pub key: String,
    pub label: String,
    pub total: i64,
    pub rework: i64,
    pub correction: i64,
    pub first_correction: i64,
    pub pct_rework: f64,
    pub pct_first_correction: f64,
    pub record_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReworkSummary {
    pub total: i64,
    pub rework: i64,
    pub correction: i64,
    pub first_correction: i64,
    pub late_correction: i64,
    pub pct_rework: f64,
    pub pct_correction: f64,
    pub pct_first_correction: f64,
    pub pct_late_correction: f64,
    /// Distinct `(vehicle, service, episode_no)` triples.
    pub distinct_problems: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetModelBucket {
    pub model: String,
    pub vehicles: i64,
    pub vehicles_with_rework: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeSummary {
    pub vehicle_id: String,
    pub service_code: String,
    pub episode_no: u32,
    pub order_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_opened_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_closed_at: Option<OffsetDateTime>,
    pub resolved: bool,
    pub cumulative_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReworkDashboard {
    pub version: u32,
    pub min_days: u32,
    pub window: DateWindow,
    /// Closing-date window the counts cover; `None` when trimming left nothing.
    pub reporting_window: Option<DateWindow>,
    pub summary: ReworkSummary,
    pub by_model: Vec<FlagBucket>,
    pub by_workshop: Vec<FlagBucket>,
    pub by_section: Vec<FlagBucket>,
    pub by_mechanic: Vec<FlagBucket>,
    pub by_vehicle: Vec<FlagBucket>,
    pub by_service: Vec<FlagBucket>,
    pub by_month: Vec<FlagBucket>,
    pub fleet_by_model: Vec<FleetModelBucket>,
    pub episodes: Vec<EpisodeSummary>,
}

/// `100 * round(part / whole, 4)`, zero when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let ratio = ((part as f64 / whole as f64) * 10_000.0).round() / 10_000.0;
    ratio * 100.0
}

fn category_key(raw: &Option<String>) -> String {
    raw.as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_KEY)
        .to_string()
}

fn month_key(closed_at: Option<OffsetDateTime>) -> String {
    match closed_at {
        Some(dt) => format!("{:04}-{:02}", dt.year(), u8::from(dt.month())),
        None => UNKNOWN_KEY.to_string(),
    }
}

#[derive(Debug, Default)]
struct FlagTally {
    total: i64,
    rework: i64,
    correction: i64,
    first_correction: i64,
    record_keys: Vec<String>,
}

impl FlagTally {
    fn add(&mut self, rec: &ClassifiedRecord) {
        self.total += 1;
        self.rework += i64::from(rec.is_rework);
        self.correction += i64::from(rec.is_correction);
        self.first_correction += i64::from(rec.is_first_correction);
        self.record_keys.push(rec.record.key_hash.clone());
    }
}

fn tally(map: &mut BTreeMap<String, FlagTally>, key: String, rec: &ClassifiedRecord) {
    map.entry(key).or_default().add(rec);
}

fn into_buckets(prefix: &str, map: BTreeMap<String, FlagTally>) -> Vec<FlagBucket> {
    map.into_iter()
        .map(|(k, mut t)| {
            t.record_keys.sort();
            FlagBucket {
                key: format!("{prefix}:{k}"),
                pct_rework: percentage(t.rework, t.total),
                pct_first_correction: percentage(t.first_correction, t.total),
                label: k,
                total: t.total,
                rework: t.rework,
                correction: t.correction,
                first_correction: t.first_correction,
                record_keys: t.record_keys,
            }
        })
        .collect()
}

fn summarize(counted: &[&ClassifiedRecord]) -> ReworkSummary {
    let total = counted.len() as i64;
    let rework = counted.iter().filter(|r| r.is_rework).count() as i64;
    let correction = counted.iter().filter(|r| r.is_correction).count() as i64;
    let first_correction = counted.iter().filter(|r| r.is_first_correction).count() as i64;
    let late_correction = correction - first_correction;
    let distinct_problems = counted
        .iter()
        .map(|r| {
            (
                r.record.vehicle_id.as_str(),
                r.record.service_code.as_str(),
                r.episode_no,
            )
        })
        .collect::<BTreeSet<_>>()
        .len() as i64;

    ReworkSummary {
        total,
        rework,
        correction,
        first_correction,
        late_correction,
        pct_rework: percentage(rework, total),
        pct_correction: percentage(correction, total),
        pct_first_correction: percentage(first_correction, total),
        pct_late_correction: percentage(late_correction, total),
        distinct_problems,
    }
}

fn fleet_by_model(counted: &[&ClassifiedRecord]) -> Vec<FleetModelBucket> {
    let mut vehicles: BTreeMap<String, (BTreeSet<&str>, BTreeSet<&str>)> = BTreeMap::new();
    for rec in counted {
        let entry = vehicles.entry(category_key(&rec.record.payload.model)).or_default();
        entry.0.insert(rec.record.vehicle_id.as_str());
        if rec.is_rework {
            entry.1.insert(rec.record.vehicle_id.as_str());
        }
    }
    vehicles
        .into_iter()
        .map(|(model, (all, reworked))| FleetModelBucket {
            model,
            vehicles: all.len() as i64,
            vehicles_with_rework: reworked.len() as i64,
        })
        .collect()
}

/// One summary per `(vehicle, service, episode_no)`.
///
/// Built from every record handed in, not only the counted ones: an episode that started
/// before the reporting window still reports its full duration.
pub fn summarize_episodes(records: &[ClassifiedRecord]) -> Vec<EpisodeSummary> {
    let mut episodes: BTreeMap<(&str, &str, u32), Vec<&ClassifiedRecord>> = BTreeMap::new();
    for rec in records {
        episodes
            .entry((
                rec.record.vehicle_id.as_str(),
                rec.record.service_code.as_str(),
                rec.episode_no,
            ))
            .or_default()
            .push(rec);
    }

    episodes
        .into_iter()
        .filter_map(|((vehicle_id, service_code, episode_no), mut members)| {
            members.sort_by(|a, b| {
                (a.record.opened_at, &a.record.order_id)
                    .cmp(&(b.record.opened_at, &b.record.order_id))
            });
            let first = members.first()?;
            let last = members.last()?;
            let last_closed_at = last.record.closed_at;
            let cumulative_days =
                last_closed_at.map(|closed| days_between(first.record.opened_at, closed).max(0));
            Some(EpisodeSummary {
                vehicle_id: vehicle_id.to_string(),
                service_code: service_code.to_string(),
                episode_no,
                order_count: members.len() as i64,
                first_opened_at: first.record.opened_at,
                last_closed_at,
                resolved: last.is_correction && last_closed_at.is_some(),
                cumulative_days,
            })
        })
        .collect()
}

/// Aggregate classified records into dashboard counts.
///
/// Only records whose closing date falls inside the reporting window are counted. With
/// `trim_report_window` set, that window is `window` minus its last `min_days + 1` days;
/// open orders are never counted. A closing at any time on the window's last day is
/// inside it. Flags are read from the classified records, never re-derived. Every
/// dimension breakdown reconciles to `summary.total`.
pub fn build_rework_dashboard(
    records: &[ClassifiedRecord],
    window: DateWindow,
    min_days: u32,
    config: &EngineConfig,
) -> ReworkDashboard {
    let reporting = if config.trim_report_window {
        reporting_window(window, min_days)
    } else {
        Some(window)
    };

    let counted = records
        .iter()
        .filter(|r| match (reporting, r.record.closed_at) {
            (Some(w), Some(closed)) => w.contains(closed.date()),
            _ => false,
        })
        .collect::<Vec<_>>();

    let mut model_map = BTreeMap::new();
    let mut workshop_map = BTreeMap::new();
    let mut section_map = BTreeMap::new();
    let mut mechanic_map = BTreeMap::new();
    let mut vehicle_map = BTreeMap::new();
    let mut service_map = BTreeMap::new();
    let mut month_map = BTreeMap::new();

    for rec in &counted {
        let payload = &rec.record.payload;
        tally(&mut model_map, category_key(&payload.model), rec);
        tally(&mut workshop_map, category_key(&payload.workshop), rec);
        tally(&mut section_map, category_key(&payload.section), rec);
        tally(&mut mechanic_map, category_key(&payload.mechanic), rec);
        tally(&mut vehicle_map, rec.record.vehicle_id.clone(), rec);
        tally(&mut service_map, rec.record.service_code.clone(), rec);
        tally(&mut month_map, month_key(rec.record.closed_at), rec);
    }

    let summary = summarize(&counted);
    tracing::debug!(
        min_days,
        input = records.len(),
        counted = summary.total,
        rework = summary.rework,
        "built rework dashboard"
    );

    ReworkDashboard {
        version: DASHBOARD_PAYLOAD_VERSION,
        min_days,
        window,
        reporting_window: reporting,
        summary,
        by_model: into_buckets("model", model_map),
        by_workshop: into_buckets("workshop", workshop_map),
        by_section: into_buckets("section", section_map),
        by_mechanic: into_buckets("mechanic", mechanic_map),
        by_vehicle: into_buckets("vehicle", vehicle_map),
        by_service: into_buckets("service", service_map),
        by_month: into_buckets("month", month_map),
        fleet_by_model: fleet_by_model(&counted),
        episodes: summarize_episodes(records),
    }
}
