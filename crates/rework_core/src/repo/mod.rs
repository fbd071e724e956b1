use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, Connection};

use crate::domain::RawServiceOrder;
use crate::error::AppError;
use crate::filter::{active_values, Dimension, RecordFilter};

/// Read-only supplier of raw service orders for one classification run.
///
/// Implementations must apply the same filter semantics as `RecordFilter::matches`.
pub trait ServiceOrderSource {
    fn fetch_service_orders(
        &self,
        filter: &RecordFilter,
        all_token: &str,
    ) -> Result<Vec<RawServiceOrder>, AppError>;

    /// Distinct non-blank values of a dimension, sorted.
    fn list_dimension_values(&self, dimension: Dimension) -> Result<Vec<String>, AppError>;
}

/// Source backed by an owned snapshot (tests, file imports, callers that already hold rows).
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    orders: Vec<RawServiceOrder>,
}

impl InMemorySource {
    pub fn new(orders: Vec<RawServiceOrder>) -> Self {
        Self { orders }
    }

    pub fn orders(&self) -> &[RawServiceOrder] {
        &self.orders
    }
}

impl ServiceOrderSource for InMemorySource {
    fn fetch_service_orders(
        &self,
        filter: &RecordFilter,
        all_token: &str,
    ) -> Result<Vec<RawServiceOrder>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|o| filter.matches(o, all_token))
            .cloned()
            .collect())
    }

    fn list_dimension_values(&self, dimension: Dimension) -> Result<Vec<String>, AppError> {
        let values: BTreeSet<String> = self
            .orders
            .iter()
            .filter_map(|o| dimension.value_of(o))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        Ok(values.into_iter().collect())
    }
}

fn dimension_column(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Workshop => "workshop",
        Dimension::Section => "section",
        Dimension::Service => "service_code",
        Dimension::Model => "model",
        Dimension::Vehicle => "vehicle_id",
        Dimension::Mechanic => "mechanic",
    }
}

fn push_in_clause(sql: &mut String, params: &mut Vec<String>, column: &str, values: &[String]) {
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!("\n        AND {column} IN ({placeholders})"));
    params.extend(values.iter().cloned());
}

/// Source reading the `service_orders` table.
pub struct SqliteSource<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteSource<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn build_fetch_query(filter: &RecordFilter, all_token: &str) -> (String, Vec<String>) {
        let mut sql = String::from(
            r#"
      SELECT
        order_id, vehicle_id, service_code, order_type, opened_at, closed_at,
        workshop, section, model, mechanic, cost, symptom, solution
      FROM service_orders
      WHERE 1=1"#,
        );
        let mut params = Vec::new();

        // The date window is applied after decoding; see `fetch_service_orders`.
        for dimension in [
            Dimension::Workshop,
            Dimension::Section,
            Dimension::Service,
            Dimension::Model,
            Dimension::Vehicle,
        ] {
            if let Some(values) = active_values(filter.selection(dimension), all_token) {
                push_in_clause(&mut sql, &mut params, dimension_column(dimension), values);
            }
        }
        if let Some(values) = active_values(&filter.order_ids, all_token) {
            push_in_clause(&mut sql, &mut params, "order_id", values);
        }

        sql.push_str("\n      ORDER BY id ASC");
        (sql, params)
    }
}

impl ServiceOrderSource for SqliteSource<'_> {
    fn fetch_service_orders(
        &self,
        filter: &RecordFilter,
        all_token: &str,
    ) -> Result<Vec<RawServiceOrder>, AppError> {
        let (sql, params) = Self::build_fetch_query(filter, all_token);
        let mut stmt = self.conn.prepare(&sql).map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare service orders query")
                .with_details(e.to_string())
        })?;

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(RawServiceOrder {
                    order_id: row.get(0)?,
                    vehicle_id: row.get(1)?,
                    service_code: row.get(2)?,
                    order_type: row.get(3)?,
                    opened_at: row.get(4)?,
                    closed_at: row.get(5)?,
                    workshop: row.get(6)?,
                    section: row.get(7)?,
                    model: row.get(8)?,
                    mechanic: row.get(9)?,
                    cost: row.get(10)?,
                    symptom: row.get(11)?,
                    solution: row.get(12)?,
                })
            })
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query service orders")
                    .with_details(e.to_string())
            })?;

        let mut out = Vec::new();
        for r in rows {
            let order = r.map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to decode service order row")
                    .with_details(e.to_string())
            })?;
            // SQLite's date() accepts calendar dates the timestamp parser rejects.
            if filter.window_allows(&order) {
                out.push(order);
            }
        }
        Ok(out)
    }

    fn list_dimension_values(&self, dimension: Dimension) -> Result<Vec<String>, AppError> {
        let column = dimension_column(dimension);
        let sql = format!(
            "SELECT DISTINCT TRIM({column}) FROM service_orders \
             WHERE {column} IS NOT NULL AND TRIM({column}) <> '' ORDER BY 1"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare dimension query")
                .with_details(format!("dimension={}; err={e}", dimension.as_str()))
        })?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query dimension values")
                    .with_details(e.to_string())
            })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to decode dimension value")
                    .with_details(e.to_string())
            })?);
        }
        Ok(out)
    }
}

pub fn insert_service_order(conn: &Connection, order: &RawServiceOrder) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO service_orders(
        order_id, vehicle_id, service_code, order_type, opened_at, closed_at,
        workshop, section, model, mechanic, cost, symptom, solution
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
      "#,
        params![
            order.order_id,
            order.vehicle_id,
            order.service_code,
            order.order_type,
            order.opened_at,
            order.closed_at,
            order.workshop,
            order.section,
            order.model,
            order.mechanic,
            order.cost,
            order.symptom,
            order.solution,
        ],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to insert service order")
            .with_details(format!("order_id={}; err={e}", order.order_id))
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn count_service_orders(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM service_orders", [], |row| row.get(0))
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to count service orders")
                .with_details(e.to_string())
        })
}
