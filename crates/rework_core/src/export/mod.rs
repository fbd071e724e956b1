use serde::{Deserialize, Serialize};

use crate::domain::ClassifiedRecord;
use crate::error::AppError;
use crate::normalize::timestamps::canonical_rfc3339;

/// Flat, column-stable view of one classified record.
///
/// JSON lines and CSV share this shape so both exports carry the same fields in the
/// same order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRow {
    pub order_id: String,
    pub vehicle_id: String,
    pub service_code: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub key_hash: String,
    pub workshop: Option<String>,
    pub section: Option<String>,
    pub model: Option<String>,
    pub mechanic: Option<String>,
    pub cost: Option<f64>,
    pub prev_gap_days: Option<i64>,
    pub next_gap_days: Option<i64>,
    pub is_rework: bool,
    pub is_correction: bool,
    pub is_first_correction: bool,
    pub episode_no: u32,
    pub status: String,
}

impl From<&ClassifiedRecord> for ExportRow {
    fn from(rec: &ClassifiedRecord) -> Self {
        let r = &rec.record;
        ExportRow {
            order_id: r.order_id.clone(),
            vehicle_id: r.vehicle_id.clone(),
            service_code: r.service_code.clone(),
            opened_at: canonical_rfc3339(r.opened_at),
            closed_at: r.closed_at.map(canonical_rfc3339),
            key_hash: r.key_hash.clone(),
            workshop: r.payload.workshop.clone(),
            section: r.payload.section.clone(),
            model: r.payload.model.clone(),
            mechanic: r.payload.mechanic.clone(),
            cost: r.payload.cost,
            prev_gap_days: rec.prev_gap_days,
            next_gap_days: rec.next_gap_days,
            is_rework: rec.is_rework,
            is_correction: rec.is_correction,
            is_first_correction: rec.is_first_correction,
            episode_no: rec.episode_no,
            status: rec.status().as_str().to_string(),
        }
    }
}

/// One JSON object per line, newline-terminated, in input order.
pub fn to_json_lines(records: &[ClassifiedRecord]) -> Result<String, AppError> {
    let mut out = String::new();
    for rec in records {
        let line = serde_json::to_string(&ExportRow::from(rec)).map_err(|e| {
            AppError::new("EXPORT_JSON_FAILED", "Failed to serialize classified record")
                .with_details(format!("order_id={}; err={e}", rec.record.order_id))
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// CSV header, in `ExportRow` field order.
pub const EXPORT_COLUMNS: &[&str] = &[
    "order_id",
    "vehicle_id",
    "service_code",
    "opened_at",
    "closed_at",
    "key_hash",
    "workshop",
    "section",
    "model",
    "mechanic",
    "cost",
    "prev_gap_days",
    "next_gap_days",
    "is_rework",
    "is_correction",
    "is_first_correction",
    "episode_no",
    "status",
];

/// Header row plus one row per record, in input order. The header is written even
/// when there are no records.
pub fn to_csv(records: &[ClassifiedRecord]) -> Result<String, AppError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(EXPORT_COLUMNS).map_err(|e| {
        AppError::new("EXPORT_CSV_FAILED", "Failed to write CSV header")
            .with_details(e.to_string())
    })?;
    for rec in records {
        wtr.serialize(ExportRow::from(rec)).map_err(|e| {
            AppError::new("EXPORT_CSV_FAILED", "Failed to write classified record")
                .with_details(format!("order_id={}; err={e}", rec.record.order_id))
        })?;
    }
    let bytes = wtr.into_inner().map_err(|e| {
        AppError::new("EXPORT_CSV_FAILED", "Failed to flush CSV export")
            .with_details(e.to_string())
    })?;
    String::from_utf8(bytes).map_err(|e| {
        AppError::new("EXPORT_CSV_FAILED", "CSV export is not valid UTF-8")
            .with_details(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_input_still_carries_the_csv_header() {
        assert_eq!(to_json_lines(&[]).unwrap(), "");
        assert_eq!(to_csv(&[]).unwrap(), format!("{}\n", EXPORT_COLUMNS.join(",")));
    }

    #[test]
    fn header_matches_export_row_fields() {
        let row = ExportRow {
            order_id: "OS-1".to_string(),
            vehicle_id: "BUS-1".to_string(),
            service_code: "BRAKES".to_string(),
            opened_at: "2024-01-01T08:00:00Z".to_string(),
            closed_at: None,
            key_hash: "abc".to_string(),
            workshop: None,
            section: None,
            model: None,
            mechanic: None,
            cost: None,
            prev_gap_days: None,
            next_gap_days: None,
            is_rework: false,
            is_correction: true,
            is_first_correction: true,
            episode_no: 1,
            status: "first_correction".to_string(),
        };
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.serialize(&row).unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().next(), Some(EXPORT_COLUMNS.join(",").as_str()));
    }
}
