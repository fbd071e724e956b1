use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedTimestamp {
    /// Absent or blank input.
    Missing,
    /// Deterministically parsed, converted to UTC.
    Parsed(OffsetDateTime),
    /// Provided but not in any allowlisted format; raw input preserved for warnings.
    Unparseable { raw: String },
}

impl NormalizedTimestamp {
    pub fn parsed(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Parsed(dt) => Some(*dt),
            _ => None,
        }
    }
}

fn parse_naive_assume_utc(raw: &str) -> Option<OffsetDateTime> {
    // The service-order store writes wall-clock times without an offset; read them as UTC.
    for fmt in [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ] {
        if let Ok(pdt) = PrimitiveDateTime::parse(raw, fmt) {
            return Some(pdt.assume_utc());
        }
    }

    let date_only = format_description!("[year]-[month]-[day]");
    Date::parse(raw, date_only)
        .ok()
        .map(|d| d.midnight().assume_utc())
}

/// Parse a stored service-order timestamp.
///
/// Contract:
/// - blank or `None` input is `Missing` (an open order has no close timestamp);
/// - RFC3339 input is converted to UTC;
/// - allowlisted naive forms (`YYYY-MM-DD[T| ]HH:MM[:SS[.fff]]`, `YYYY-MM-DD`) are read as UTC;
/// - anything else is `Unparseable`, never guessed.
pub fn normalize_timestamp(raw_input: Option<&str>) -> NormalizedTimestamp {
    let Some(raw) = raw_input else {
        return NormalizedTimestamp::Missing;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return NormalizedTimestamp::Missing;
    }

    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return NormalizedTimestamp::Parsed(dt.to_offset(UtcOffset::UTC));
    }

    match parse_naive_assume_utc(trimmed) {
        Some(dt) => NormalizedTimestamp::Parsed(dt),
        None => NormalizedTimestamp::Unparseable {
            raw: trimmed.to_string(),
        },
    }
}

/// Canonical RFC3339 UTC rendering used for hashing and exports.
pub fn canonical_rfc3339(dt: OffsetDateTime) -> String {
    let utc = dt.to_offset(UtcOffset::UTC);
    utc.format(&Rfc3339)
        .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}
