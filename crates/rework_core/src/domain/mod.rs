use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Service order row exactly as the data source hands it over.
///
/// Notes:
/// - Timestamps are kept as the raw strings stored upstream; parsing (and the decision to
///   drop rows that cannot be parsed) happens in the normalizer.
/// - An empty or missing `closed_at` means the order is still open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawServiceOrder {
    pub order_id: String,
    pub vehicle_id: String,
    pub service_code: String,
    pub order_type: Option<String>,
    pub opened_at: Option<String>,
    pub closed_at: Option<String>,
    pub workshop: Option<String>,
    pub section: Option<String>,
    pub model: Option<String>,
    pub mechanic: Option<String>,
    pub cost: Option<f64>,
    pub symptom: Option<String>,
    pub solution: Option<String>,
}

/// Descriptive fields the engine carries through without interpreting them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecordPayload {
    pub workshop: Option<String>,
    pub section: Option<String>,
    pub model: Option<String>,
    pub mechanic: Option<String>,
    pub cost: Option<f64>,
    pub symptom: Option<String>,
    pub solution: Option<String>,
}

/// Normalized service record: one maintenance work item with parsed UTC timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub order_id: String,
    pub vehicle_id: String,
    pub service_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    /// Opaque per-record join key (hex SHA-256), see `normalize::records::record_key_hash`.
    pub key_hash: String,
    #[serde(flatten)]
    pub payload: RecordPayload,
}

impl ServiceRecord {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            vehicle_id: self.vehicle_id.clone(),
            service_code: self.service_code.clone(),
        }
    }
}

/// Sequencing partition: one vehicle, one service type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub vehicle_id: String,
    pub service_code: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    FirstCorrection,
    LateCorrection,
    Rework,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstCorrection => "first_correction",
            Self::LateCorrection => "late_correction",
            Self::Rework => "rework",
        }
    }
}

/// A service record plus its gap annotation, classification flags and problem episode.
///
/// Derived on every query for a given `min_days`; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub record: ServiceRecord,
    pub prev_gap_days: Option<i64>,
    pub next_gap_days: Option<i64>,
    pub is_rework: bool,
    pub is_correction: bool,
    pub is_first_correction: bool,
    pub episode_no: u32,
}

impl ClassifiedRecord {
    pub fn status(&self) -> RecordStatus {
        if self.is_first_correction {
            RecordStatus::FirstCorrection
        } else if self.is_correction {
            RecordStatus::LateCorrection
        } else {
            RecordStatus::Rework
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
