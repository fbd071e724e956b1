use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::{RawServiceOrder, ValidationWarning};
use crate::error::AppError;
use crate::normalize::timestamps::{normalize_timestamp, NormalizedTimestamp};
use crate::repo::insert_service_order;

/// CSV column headers for each service-order field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOrderCsvMapping {
    pub order_id: String,
    pub vehicle_id: String,
    pub service_code: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub order_type: Option<String>,
    pub workshop: Option<String>,
    pub section: Option<String>,
    pub model: Option<String>,
    pub mechanic: Option<String>,
    pub cost: Option<String>,
    pub symptom: Option<String>,
    pub solution: Option<String>,
}

impl Default for ServiceOrderCsvMapping {
    /// Headers of the maintenance system's service-order export.
    fn default() -> Self {
        Self {
            order_id: "NUMERO DA OS".to_string(),
            vehicle_id: "CODIGO DO VEICULO".to_string(),
            service_code: "DESCRICAO DO SERVICO".to_string(),
            opened_at: "DATA DA ABERTURA DA OS".to_string(),
            closed_at: Some("DATA DO FECHAMENTO DA OS".to_string()),
            order_type: Some("DESCRICAO DO TIPO DA OS".to_string()),
            workshop: Some("DESCRICAO DA OFICINA".to_string()),
            section: Some("DESCRICAO DA SECAO".to_string()),
            model: Some("DESCRICAO DO MODELO".to_string()),
            mechanic: Some("COLABORADOR QUE EXECUTOU O SERVICO".to_string()),
            cost: Some("VALOR".to_string()),
            symptom: Some("SINTOMA".to_string()),
            solution: Some("CORRECAO".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOrderCsvPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOrderImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub warnings: Vec<ValidationWarning>,
}

fn get<'a>(row: &'a csv::StringRecord, idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn required_index(headers: &csv::StringRecord, name: &str) -> Result<usize, AppError> {
    header_index(headers, name).ok_or_else(|| {
        AppError::new(
            "INGEST_CSV_MISSING_COLUMN",
            format!("Required column '{name}' not found in CSV headers"),
        )
    })
}

fn optional_index(headers: &csv::StringRecord, name: &Option<String>) -> Option<usize> {
    name.as_deref().and_then(|n| header_index(headers, n))
}

/// A value with a `,` is decimal-comma (`1.234,50`): dots may only group thousands
/// before the comma. Anything else parses as a plain decimal (`1.234` is 1.234).
fn parse_decimal(s: &str) -> Option<f64> {
    let Some((int, frac)) = s.split_once(',') else {
        return s.parse::<f64>().ok();
    };
    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut groups = int.split('.');
    let lead = groups.next()?;
    let lead_digits = lead.strip_prefix('-').unwrap_or(lead);
    if lead_digits.is_empty() || !lead_digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits = lead.to_string();
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.push_str(group);
    }
    format!("{digits}.{frac}").parse::<f64>().ok()
}

fn parse_cost(
    row_idx: usize,
    raw: Option<&str>,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<f64> {
    let s = raw?;
    match parse_decimal(s) {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            warnings.push(
                ValidationWarning::new("INGEST_COST_PARSE_FAILED", "Failed to parse cost")
                    .with_details(format!("row={row_idx}; value={s}")),
            );
            None
        }
    }
}

fn check_timestamp(
    row_idx: usize,
    field: &str,
    raw: Option<&str>,
    warnings: &mut Vec<ValidationWarning>,
) {
    if let NormalizedTimestamp::Unparseable { raw } = normalize_timestamp(raw) {
        warnings.push(
            ValidationWarning::new(
                "INGEST_TS_UNPARSEABLE",
                format!("Unparseable {field}; stored raw, the row will be excluded from analysis"),
            )
            .with_details(format!("row={row_idx}; value={raw}")),
        );
    }
}

fn read_headers(rdr: &mut csv::Reader<&[u8]>) -> Result<csv::StringRecord, AppError> {
    rdr.headers().cloned().map_err(|e| {
        AppError::new(
            "INGEST_CSV_HEADERS_FAILED",
            "Failed to read service order CSV headers",
        )
        .with_details(e.to_string())
    })
}

pub fn preview_service_orders_csv(
    csv_text: &str,
    max_rows: usize,
) -> Result<ServiceOrderCsvPreview, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = read_headers(&mut rdr)?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for result in rdr.records().take(max_rows) {
        let row = result.map_err(|e| {
            AppError::new(
                "INGEST_CSV_PARSE_FAILED",
                "Failed to parse service order CSV row",
            )
            .with_details(e.to_string())
        })?;
        rows.push(row.iter().map(|v| v.to_string()).collect::<Vec<_>>());
    }

    Ok(ServiceOrderCsvPreview { headers, rows })
}

/// Parse CSV rows into raw service orders without touching the database.
///
/// Rows lacking an order id, vehicle id or service code are skipped with a warning.
/// Timestamps are kept verbatim; unreadable ones only raise a warning here.
pub fn parse_service_orders_csv(
    csv_text: &str,
    mapping: &ServiceOrderCsvMapping,
) -> Result<(Vec<RawServiceOrder>, ServiceOrderImportSummary), AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let headers = read_headers(&mut rdr)?;

    let order_idx = required_index(&headers, &mapping.order_id)?;
    let vehicle_idx = required_index(&headers, &mapping.vehicle_id)?;
    let service_idx = required_index(&headers, &mapping.service_code)?;
    let opened_idx = required_index(&headers, &mapping.opened_at)?;
    let closed_idx = optional_index(&headers, &mapping.closed_at);
    let type_idx = optional_index(&headers, &mapping.order_type);
    let workshop_idx = optional_index(&headers, &mapping.workshop);
    let section_idx = optional_index(&headers, &mapping.section);
    let model_idx = optional_index(&headers, &mapping.model);
    let mechanic_idx = optional_index(&headers, &mapping.mechanic);
    let cost_idx = optional_index(&headers, &mapping.cost);
    let symptom_idx = optional_index(&headers, &mapping.symptom);
    let solution_idx = optional_index(&headers, &mapping.solution);

    let mut summary = ServiceOrderImportSummary {
        inserted: 0,
        skipped: 0,
        warnings: Vec::new(),
    };
    let mut orders = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        // 1-based data row numbers, header excluded.
        let row_idx = i + 1;
        let row = result.map_err(|e| {
            AppError::new(
                "INGEST_CSV_PARSE_FAILED",
                "Failed to parse service order CSV row",
            )
            .with_details(format!("row={row_idx}; err={e}"))
        })?;

        let (Some(order_id), Some(vehicle_id), Some(service_code)) = (
            get(&row, Some(order_idx)),
            get(&row, Some(vehicle_idx)),
            get(&row, Some(service_idx)),
        ) else {
            summary.skipped += 1;
            summary.warnings.push(
                ValidationWarning::new(
                    "INGEST_ROW_KEY_MISSING",
                    "Row lacks order id, vehicle id or service code; skipped",
                )
                .with_details(format!("row={row_idx}")),
            );
            continue;
        };

        let opened_at = get(&row, Some(opened_idx));
        let closed_at = get(&row, closed_idx);
        check_timestamp(row_idx, "opened_at", opened_at, &mut summary.warnings);
        check_timestamp(row_idx, "closed_at", closed_at, &mut summary.warnings);

        orders.push(RawServiceOrder {
            order_id: order_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            service_code: service_code.to_string(),
            order_type: get(&row, type_idx).map(str::to_string),
            opened_at: opened_at.map(str::to_string),
            closed_at: closed_at.map(str::to_string),
            workshop: get(&row, workshop_idx).map(str::to_string),
            section: get(&row, section_idx).map(str::to_string),
            model: get(&row, model_idx).map(str::to_string),
            mechanic: get(&row, mechanic_idx).map(str::to_string),
            cost: parse_cost(row_idx, get(&row, cost_idx), &mut summary.warnings),
            symptom: get(&row, symptom_idx).map(str::to_string),
            solution: get(&row, solution_idx).map(str::to_string),
        });
    }

    Ok((orders, summary))
}

/// Import a service-order CSV export into `service_orders` in a single transaction.
pub fn import_service_orders_csv(
    conn: &mut Connection,
    csv_text: &str,
    mapping: &ServiceOrderCsvMapping,
) -> Result<ServiceOrderImportSummary, AppError> {
    let (orders, mut summary) = parse_service_orders_csv(csv_text, mapping)?;

    let tx = conn.transaction().map_err(|e| {
        AppError::new("DB_TX_FAILED", "Failed to start import transaction")
            .with_details(e.to_string())
    })?;
    for order in &orders {
        insert_service_order(&tx, order)?;
        summary.inserted += 1;
    }
    tx.commit().map_err(|e| {
        AppError::new("DB_TX_FAILED", "Failed to commit import transaction")
            .with_details(e.to_string())
    })?;

    tracing::info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        warnings = summary.warnings.len(),
        "imported service orders CSV"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_comma_costs_are_accepted() {
        let mut warnings = Vec::new();
        assert_eq!(parse_cost(1, Some("1.234,50"), &mut warnings), Some(1234.5));
        assert_eq!(parse_cost(1, Some("-12,5"), &mut warnings), Some(-12.5));
        assert_eq!(parse_cost(1, Some("99.9"), &mut warnings), Some(99.9));
        assert_eq!(parse_cost(1, Some("abc"), &mut warnings), None);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "INGEST_COST_PARSE_FAILED");
    }

    #[test]
    fn dotted_cost_without_comma_is_a_plain_decimal() {
        let mut warnings = Vec::new();
        assert_eq!(parse_cost(1, Some("1.234"), &mut warnings), Some(1.234));
        assert!(warnings.is_empty());
    }

    #[test]
    fn mixed_separators_in_the_wrong_order_are_rejected() {
        let mut warnings = Vec::new();
        for raw in ["1,234.50", "1,2,3", "12.34,5", "1.2345,00", "7,"] {
            assert_eq!(parse_cost(3, Some(raw), &mut warnings), None, "{raw}");
        }
        assert_eq!(warnings.len(), 5);
        assert!(warnings.iter().all(|w| w.code == "INGEST_COST_PARSE_FAILED"));
        assert_eq!(warnings[0].details.as_deref(), Some("row=3; value=1,234.50"));
    }

    #[test]
    fn csv_costs_are_never_silently_rescaled() {
        let text = "NUMERO DA OS,CODIGO DO VEICULO,DESCRICAO DO SERVICO,DATA DA ABERTURA DA OS,VALOR\n\
                    OS-1,BUS-1,BRAKES,2024-01-02 08:00:00,1.234\n\
                    OS-2,BUS-1,BRAKES,2024-01-03 08:00:00,\"1,234.50\"\n\
                    OS-3,BUS-1,BRAKES,2024-01-04 08:00:00,\"1.234,50\"\n";
        let (orders, summary) =
            parse_service_orders_csv(text, &ServiceOrderCsvMapping::default()).expect("parse");
        assert_eq!(
            orders.iter().map(|o| o.cost).collect::<Vec<_>>(),
            vec![Some(1.234), None, Some(1234.5)]
        );
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].code, "INGEST_COST_PARSE_FAILED");
    }

    #[test]
    fn preview_limits_rows() {
        let text = "A,B\n1,2\n3,4\n5,6\n";
        let preview = preview_service_orders_csv(text, 2).expect("preview");
        assert_eq!(preview.headers, vec!["A", "B"]);
        assert_eq!(preview.rows.len(), 2);
    }
}
