use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::config::EngineConfig;
use crate::domain::{RawServiceOrder, RecordPayload, ServiceRecord, ValidationWarning};
use crate::normalize::timestamps::{canonical_rfc3339, normalize_timestamp, NormalizedTimestamp};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcludedRecord {
    pub order_id: String,
    pub service_code: String,
    pub warning: ValidationWarning,
}

/// Output of the normalizer: one record per `(order_id, service_code)`.
///
/// Excluded rows are reported, never raised. `warnings` holds findings on rows that were
/// kept (or superseded duplicates).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedBatch {
    pub records: Vec<ServiceRecord>,
    pub excluded: Vec<ExcludedRecord>,
    pub warnings: Vec<ValidationWarning>,
    pub duplicates_superseded: usize,
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Stable join key for a normalized record.
pub fn record_key_hash(
    order_id: &str,
    vehicle_id: &str,
    service_code: &str,
    opened_at: OffsetDateTime,
) -> String {
    let payload = format!(
        "order={order_id}|vehicle={vehicle_id}|service={service_code}|opened={}",
        canonical_rfc3339(opened_at)
    );
    hex::encode(Sha256::digest(payload.as_bytes()))
}

fn exclusion(raw: &RawServiceOrder, warning: ValidationWarning) -> ExcludedRecord {
    ExcludedRecord {
        order_id: raw.order_id.trim().to_string(),
        service_code: raw.service_code.trim().to_string(),
        warning,
    }
}

fn is_workshop_order(order_type: Option<&str>, config: &EngineConfig) -> bool {
    order_type
        .map(str::trim)
        .is_some_and(|t| t.eq_ignore_ascii_case(&config.workshop_order_type))
}

fn to_service_record(
    raw: &RawServiceOrder,
    config: &EngineConfig,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<ServiceRecord, ValidationWarning> {
    let order_id = raw.order_id.trim();
    let vehicle_id = raw.vehicle_id.trim();
    let service_code = raw.service_code.trim();
    if order_id.is_empty() || vehicle_id.is_empty() || service_code.is_empty() {
        return Err(ValidationWarning::new(
            "DQ_KEY_MISSING",
            "Service order lacks order id, vehicle id or service code",
        )
        .with_details(format!(
            "order_id={order_id}; vehicle_id={vehicle_id}; service_code={service_code}"
        )));
    }

    if !is_workshop_order(raw.order_type.as_deref(), config) {
        return Err(ValidationWarning::new(
            "DQ_ORDER_TYPE_EXCLUDED",
            "Service order is not a workshop order",
        )
        .with_details(format!(
            "order_id={order_id}; order_type={}",
            raw.order_type.as_deref().unwrap_or("")
        )));
    }

    let opened_at = match normalize_timestamp(raw.opened_at.as_deref()) {
        NormalizedTimestamp::Parsed(dt) => dt,
        NormalizedTimestamp::Missing => {
            return Err(ValidationWarning::new(
                "DQ_OPENED_AT_MISSING",
                "Service order has no opening timestamp",
            )
            .with_details(format!("order_id={order_id}")));
        }
        NormalizedTimestamp::Unparseable { raw } => {
            return Err(ValidationWarning::new(
                "DQ_OPENED_AT_UNPARSEABLE",
                "Failed to parse opening timestamp",
            )
            .with_details(format!("order_id={order_id}; value={raw}")));
        }
    };

    let closed_at = match normalize_timestamp(raw.closed_at.as_deref()) {
        NormalizedTimestamp::Parsed(dt) => Some(dt),
        NormalizedTimestamp::Missing => None,
        NormalizedTimestamp::Unparseable { raw } => {
            return Err(ValidationWarning::new(
                "DQ_CLOSED_AT_UNPARSEABLE",
                "Failed to parse closing timestamp",
            )
            .with_details(format!("order_id={order_id}; value={raw}")));
        }
    };

    if let Some(closed) = closed_at {
        if closed < opened_at {
            warnings.push(
                ValidationWarning::new(
                    "DQ_CLOSED_BEFORE_OPENED",
                    "Closing timestamp precedes opening timestamp; kept as is",
                )
                .with_details(format!(
                    "order_id={order_id}; opened_at={}; closed_at={}",
                    canonical_rfc3339(opened_at),
                    canonical_rfc3339(closed)
                )),
            );
        }
    }

    Ok(ServiceRecord {
        order_id: order_id.to_string(),
        vehicle_id: vehicle_id.to_string(),
        service_code: service_code.to_string(),
        opened_at,
        closed_at,
        key_hash: record_key_hash(order_id, vehicle_id, service_code, opened_at),
        payload: RecordPayload {
            workshop: clean(raw.workshop.as_deref()),
            section: clean(raw.section.as_deref()),
            model: clean(raw.model.as_deref()),
            mechanic: clean(raw.mechanic.as_deref()),
            cost: raw.cost.filter(|c| c.is_finite()),
            symptom: clean(raw.symptom.as_deref()),
            solution: clean(raw.solution.as_deref()),
        },
    })
}

/// `true` when `candidate` should replace `current` for the same order/service pair:
/// later opening wins, then later closing (an open order counts as earliest).
fn supersedes(candidate: &ServiceRecord, current: &ServiceRecord) -> bool {
    (candidate.opened_at, candidate.closed_at) > (current.opened_at, current.closed_at)
}

fn superseded_warning(dropped: &ServiceRecord) -> ValidationWarning {
    ValidationWarning::new(
        "DQ_DUPLICATE_SUPERSEDED",
        "Duplicate order/service entry dropped in favour of the most recent opening",
    )
    .with_details(format!(
        "order_id={}; service_code={}; opened_at={}",
        dropped.order_id,
        dropped.service_code,
        canonical_rfc3339(dropped.opened_at)
    ))
}

/// Clean and deduplicate raw service orders.
///
/// Rows that fail the data-quality checks are excluded and reported; they never fail the run.
/// Output is ordered by `(order_id, service_code)`.
pub fn normalize_service_orders(
    raw_orders: &[RawServiceOrder],
    config: &EngineConfig,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    let mut kept: BTreeMap<(String, String), ServiceRecord> = BTreeMap::new();

    for raw in raw_orders {
        let record = match to_service_record(raw, config, &mut batch.warnings) {
            Ok(record) => record,
            Err(warning) => {
                tracing::debug!(code = %warning.code, order_id = %raw.order_id, "excluded service order");
                batch.excluded.push(exclusion(raw, warning));
                continue;
            }
        };

        match kept.entry((record.order_id.clone(), record.service_code.clone())) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                batch.duplicates_superseded += 1;
                if supersedes(&record, slot.get()) {
                    let dropped = slot.insert(record);
                    batch.warnings.push(superseded_warning(&dropped));
                } else {
                    batch.warnings.push(superseded_warning(&record));
                }
            }
        }
    }

    batch.records = kept.into_values().collect();
    batch
}
