pub mod classify;
pub mod episodes;
pub mod gaps;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::{ClassifiedRecord, GroupKey, ServiceRecord, ValidationWarning};
use crate::error::AppError;
use crate::filter::{validate_request, RecordFilter};
use crate::normalize::records::{normalize_service_orders, ExcludedRecord};
use crate::repo::ServiceOrderSource;

use classify::classify;
use episodes::assign_episodes;
use gaps::compute_gaps;

/// Partition records into `(vehicle_id, service_code)` groups, each sorted by opening time
/// with `order_id` as tiebreaker.
pub fn group_records(records: Vec<ServiceRecord>) -> BTreeMap<GroupKey, Vec<ServiceRecord>> {
    let mut groups: BTreeMap<GroupKey, Vec<ServiceRecord>> = BTreeMap::new();
    for rec in records {
        groups.entry(rec.group_key()).or_default().push(rec);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| {
            (a.opened_at, &a.order_id).cmp(&(b.opened_at, &b.order_id))
        });
    }
    groups
}

/// Gap, classification and episode pass over one sorted group.
pub fn classify_group(group: Vec<ServiceRecord>, min_days: u32) -> Vec<ClassifiedRecord> {
    let gaps = compute_gaps(&group);
    let flags = gaps
        .iter()
        .map(|g| classify(*g, min_days))
        .collect::<Vec<_>>();
    let episode_numbers = assign_episodes(&flags);

    group
        .into_iter()
        .zip(gaps)
        .zip(flags)
        .zip(episode_numbers)
        .map(|(((record, gap), flag), episode_no)| ClassifiedRecord {
            record,
            prev_gap_days: gap.prev_gap_days,
            next_gap_days: gap.next_gap_days,
            is_rework: flag.is_rework,
            is_correction: flag.is_correction,
            is_first_correction: flag.is_first_correction,
            episode_no,
        })
        .collect()
}

/// Classify normalized records with threshold `min_days`.
///
/// Groups never see each other's records. Output is ordered by group key, then by position
/// inside the group, so identical input yields identical output.
pub fn classify_records(records: Vec<ServiceRecord>, min_days: u32) -> Vec<ClassifiedRecord> {
    group_records(records)
        .into_values()
        .flat_map(|group| classify_group(group, min_days))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRun {
    pub min_days: u32,
    pub records: Vec<ClassifiedRecord>,
    pub excluded: Vec<ExcludedRecord>,
    pub warnings: Vec<ValidationWarning>,
    pub fetched_count: usize,
    pub duplicates_superseded: usize,
    pub group_count: usize,
}

/// Validate the request, fetch one snapshot from `source`, normalize and classify it.
pub fn run_classification<S: ServiceOrderSource + ?Sized>(
    source: &S,
    filter: &RecordFilter,
    min_days: Option<u32>,
    config: &EngineConfig,
) -> Result<ClassificationRun, AppError> {
    let min_days = validate_request(filter, min_days, config)?;

    let raw_orders = source.fetch_service_orders(filter, &config.all_token)?;
    let fetched_count = raw_orders.len();

    let batch = normalize_service_orders(&raw_orders, config);
    let groups = group_records(batch.records);
    let group_count = groups.len();
    let records = groups
        .into_values()
        .flat_map(|group| classify_group(group, min_days))
        .collect::<Vec<_>>();

    tracing::info!(
        min_days,
        fetched = fetched_count,
        kept = records.len(),
        excluded = batch.excluded.len(),
        duplicates = batch.duplicates_superseded,
        groups = group_count,
        "classified service orders"
    );

    Ok(ClassificationRun {
        min_days,
        records,
        excluded: batch.excluded,
        warnings: batch.warnings,
        fetched_count,
        duplicates_superseded: batch.duplicates_superseded,
        group_count,
    })
}

/// Boundary answer for consumers that render results directly.
///
/// An invalid filter is not an error here: it yields no records and sets
/// `insufficient_input`. An empty `records` with `insufficient_input == None` means the
/// request was valid and simply matched nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub min_days: Option<u32>,
    pub records: Vec<ClassifiedRecord>,
    pub warnings: Vec<ValidationWarning>,
    pub insufficient_input: Option<AppError>,
}

impl ClassificationResponse {
    pub fn is_insufficient_input(&self) -> bool {
        self.insufficient_input.is_some()
    }
}

/// Like `run_classification`, but an invalid filter becomes an explicit empty answer.
/// Data-source failures still propagate as errors.
pub fn classify_or_empty<S: ServiceOrderSource + ?Sized>(
    source: &S,
    filter: &RecordFilter,
    min_days: Option<u32>,
    config: &EngineConfig,
) -> Result<ClassificationResponse, AppError> {
    match run_classification(source, filter, min_days, config) {
        Ok(run) => {
            let mut warnings = run.warnings;
            warnings.extend(run.excluded.into_iter().map(|e| e.warning));
            Ok(ClassificationResponse {
                min_days: Some(run.min_days),
                records: run.records,
                warnings,
                insufficient_input: None,
            })
        }
        Err(err) if err.is_invalid_filter() => Ok(ClassificationResponse {
            min_days: None,
            records: Vec::new(),
            warnings: Vec::new(),
            insufficient_input: Some(err),
        }),
        Err(err) => Err(err),
    }
}
