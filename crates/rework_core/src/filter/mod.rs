use serde::{Deserialize, Serialize};
use time::{Date, Duration};

use crate::config::EngineConfig;
use crate::domain::RawServiceOrder;
use crate::error::AppError;
use crate::normalize::timestamps::normalize_timestamp;

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Date,
    pub end: Date,
}

impl DateWindow {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Workshop,
    Section,
    Service,
    Model,
    Vehicle,
    Mechanic,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Workshop,
        Dimension::Section,
        Dimension::Service,
        Dimension::Model,
        Dimension::Vehicle,
        Dimension::Mechanic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workshop => "workshop",
            Self::Section => "section",
            Self::Service => "service",
            Self::Model => "model",
            Self::Vehicle => "vehicle",
            Self::Mechanic => "mechanic",
        }
    }

    pub fn value_of(self, raw: &RawServiceOrder) -> Option<&str> {
        match self {
            Self::Workshop => raw.workshop.as_deref(),
            Self::Section => raw.section.as_deref(),
            Self::Service => Some(raw.service_code.as_str()),
            Self::Model => raw.model.as_deref(),
            Self::Vehicle => Some(raw.vehicle_id.as_str()),
            Self::Mechanic => raw.mechanic.as_deref(),
        }
    }
}

/// Caller-supplied restriction of the service orders fed into one classification run.
///
/// List-valued fields follow the dashboard convention: a list containing the configured
/// "all" token means "no restriction". `workshops`, `sections` and `services` are required
/// (an empty list is an invalid request); `models`, `vehicles` and `order_ids` may be empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecordFilter {
    pub window: Option<DateWindow>,
    pub workshops: Vec<String>,
    pub sections: Vec<String>,
    pub services: Vec<String>,
    pub models: Vec<String>,
    pub vehicles: Vec<String>,
    pub order_ids: Vec<String>,
}

impl RecordFilter {
    /// Unrestricted filter over `window`.
    pub fn all(window: DateWindow, all_token: &str) -> Self {
        Self {
            window: Some(window),
            workshops: vec![all_token.to_string()],
            sections: vec![all_token.to_string()],
            services: vec![all_token.to_string()],
            models: Vec::new(),
            vehicles: Vec::new(),
            order_ids: Vec::new(),
        }
    }

    pub fn selection(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::Workshop => &self.workshops,
            Dimension::Section => &self.sections,
            Dimension::Service => &self.services,
            Dimension::Model => &self.models,
            Dimension::Vehicle => &self.vehicles,
            Dimension::Mechanic => &[],
        }
    }

    /// In-memory equivalent of the SQL predicate built by `repo::SqliteSource`.
    ///
    /// Rows whose `opened_at` cannot be read pass the window check so the normalizer can
    /// report them instead of dropping them silently.
    pub fn matches(&self, raw: &RawServiceOrder, all_token: &str) -> bool {
        for dimension in [
            Dimension::Workshop,
            Dimension::Section,
            Dimension::Service,
            Dimension::Model,
            Dimension::Vehicle,
        ] {
            if !selection_allows(self.selection(dimension), all_token, dimension.value_of(raw)) {
                return false;
            }
        }
        if !selection_allows(&self.order_ids, all_token, Some(raw.order_id.as_str())) {
            return false;
        }
        self.window_allows(raw)
    }

    /// Window check on the opening date. Unreadable or missing openings pass so the
    /// normalizer can report them.
    pub fn window_allows(&self, raw: &RawServiceOrder) -> bool {
        match (self.window, normalize_timestamp(raw.opened_at.as_deref()).parsed()) {
            (Some(window), Some(opened_at)) => window.contains(opened_at.date()),
            _ => true,
        }
    }
}

/// Values a selection restricts to, or `None` when it is unrestricted.
pub fn active_values<'a>(selection: &'a [String], all_token: &str) -> Option<&'a [String]> {
    if selection.is_empty() || selection.iter().any(|s| s == all_token) {
        None
    } else {
        Some(selection)
    }
}

pub fn selection_allows(selection: &[String], all_token: &str, value: Option<&str>) -> bool {
    match active_values(selection, all_token) {
        None => true,
        Some(values) => value.is_some_and(|v| values.iter().any(|s| s == v)),
    }
}

/// Correct a multi-select so the "all" token never coexists with specific values.
///
/// The selection is in pick order (newest last):
/// - nothing selected resets to `[all]`;
/// - `all` picked after other values resets to `[all]`;
/// - values picked after `all` drop `all`;
/// - anything else is returned unchanged.
pub fn normalize_selection(selection: &[String], all_token: &str) -> Vec<String> {
    if selection.is_empty() {
        return vec![all_token.to_string()];
    }
    if selection.len() > 1 && selection[1..].iter().any(|s| s == all_token) {
        return vec![all_token.to_string()];
    }
    if selection.len() > 1 && selection.iter().any(|s| s == all_token) {
        return selection
            .iter()
            .filter(|s| *s != all_token)
            .cloned()
            .collect();
    }
    selection.to_vec()
}

fn require_selection(name: &str, selection: &[String]) -> Result<(), AppError> {
    if selection.is_empty() {
        return Err(AppError::invalid_filter(format!(
            "{name} selection is empty; use the all token to select everything"
        )));
    }
    if selection.iter().any(|s| s.trim().is_empty()) {
        return Err(AppError::invalid_filter(format!(
            "{name} selection contains a blank entry"
        )));
    }
    Ok(())
}

/// Validate a classification request and return the threshold to use.
pub fn validate_request(
    filter: &RecordFilter,
    min_days: Option<u32>,
    config: &EngineConfig,
) -> Result<u32, AppError> {
    let result = validate_request_inner(filter, min_days, config);
    if let Err(err) = &result {
        tracing::warn!(code = %err.code, message = %err.message, "rejected classification request");
    }
    result
}

fn validate_request_inner(
    filter: &RecordFilter,
    min_days: Option<u32>,
    config: &EngineConfig,
) -> Result<u32, AppError> {
    let Some(min_days) = min_days else {
        return Err(AppError::invalid_filter("min_days threshold is missing"));
    };
    if !config.is_allowed_min_days(min_days) {
        return Err(
            AppError::invalid_filter("min_days threshold is not an offered option")
                .with_details(format!(
                    "min_days={min_days}; options={:?}",
                    config.min_days_options
                )),
        );
    }

    let Some(window) = filter.window else {
        return Err(AppError::invalid_filter("date window is missing"));
    };
    if window.start > window.end {
        return Err(AppError::invalid_filter("date window is empty")
            .with_details(format!("start={}; end={}", window.start, window.end)));
    }

    require_selection("workshop", &filter.workshops)?;
    require_selection("section", &filter.sections)?;
    require_selection("service", &filter.services)?;

    for (name, selection) in [
        ("model", &filter.models),
        ("vehicle", &filter.vehicles),
        ("order", &filter.order_ids),
    ] {
        if selection.iter().any(|s| s.trim().is_empty()) {
            return Err(AppError::invalid_filter(format!(
                "{name} selection contains a blank entry"
            )));
        }
    }

    Ok(min_days)
}

/// Window used for dashboard counts: `window` minus its last `min_days + 1` days.
/// `None` when nothing is left.
pub fn reporting_window(window: DateWindow, min_days: u32) -> Option<DateWindow> {
    let end = window
        .end
        .checked_sub(Duration::days(i64::from(min_days) + 1))?;
    if end < window.start {
        return None;
    }
    Some(DateWindow::new(window.start, end))
}
