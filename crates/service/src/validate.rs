//! Parameter checks run at the top of every service operation, before any
//! repository call.

use chrono::{DateTime, Days, NaiveDate, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use crate::errors::ServiceError;

pub fn present(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Fail with every absent or blank parameter named at once.
pub fn require(params: &[(&str, Option<&str>)]) -> Result<(), ServiceError> {
    let missing: Vec<&str> = params
        .iter()
        .filter(|(_, value)| !present(*value))
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::missing(missing))
    }
}

pub fn parse_uuid(field: &str, value: Option<&str>) -> Result<Uuid, ServiceError> {
    let raw = value.map(str::trim).unwrap_or_default();
    Uuid::parse_str(raw).map_err(|_| ServiceError::Validation(format!("{field} must be a UUID")))
}

pub fn parse_date(field: &str, value: Option<&str>) -> Result<NaiveDate, ServiceError> {
    let raw = value.map(str::trim).unwrap_or_default();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ServiceError::Validation(format!("{field} must be a YYYY-MM-DD date")))
}

pub fn parse_datetime(field: &str, value: Option<&str>) -> Result<DateTime<Utc>, ServiceError> {
    let raw = value.map(str::trim).unwrap_or_default();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ServiceError::Validation(format!("{field} must be an RFC 3339 timestamp")))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Resolve a pair of bounds into a half-open UTC window.
///
/// Plain dates cover whole days, so `end_date` is inclusive. Full RFC 3339
/// timestamps are used as given, with the end exclusive.
pub fn date_range(
    start_field: &str,
    start: Option<&str>,
    end_field: &str,
    end: Option<&str>,
) -> Result<(DateTimeWithTimeZone, DateTimeWithTimeZone), ServiceError> {
    let start_at = match parse_date(start_field, start) {
        Ok(d) => start_of_day(d),
        Err(_) => parse_datetime(start_field, start)?,
    };
    let end_at = match parse_date(end_field, end) {
        Ok(d) => start_of_day(
            d.checked_add_days(Days::new(1))
                .ok_or_else(|| ServiceError::Validation(format!("{end_field} is out of range")))?,
        ),
        Err(_) => parse_datetime(end_field, end)?,
    };
    if end_at <= start_at {
        return Err(ServiceError::Validation(format!("{end_field} must be after {start_field}")));
    }
    Ok((start_at.into(), end_at.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_names_every_blank_parameter() {
        let err = require(&[("coach_id", Some("  ")), ("start_date", Some("2024-01-01")), ("end_date", None)]).unwrap_err();
        match err {
            ServiceError::MissingParameter(names) => assert_eq!(names, vec!["coach_id", "end_date"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(require(&[("a", Some("x"))]).is_ok());
    }

    #[test]
    fn date_range_is_inclusive_of_end_day() {
        let (start, end) = date_range("start_date", Some("2024-01-01"), "end_date", Some("2024-02-01")).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-02-02T00:00:00+00:00");
    }

    #[test]
    fn date_range_accepts_timestamps_and_rejects_inverted() {
        let (start, end) = date_range("s", Some("2024-01-01T09:00:00Z"), "e", Some("2024-01-01T11:00:00+01:00")).unwrap();
        assert_eq!(end - start, chrono::Duration::hours(1));
        assert!(date_range("s", Some("2024-01-01T09:00:00Z"), "e", Some("2024-01-01T10:00:00+01:00")).is_err());
        assert!(matches!(date_range("s", Some("2024-02-01"), "e", Some("2024-01-01")), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn malformed_values_are_validation_errors() {
        assert!(matches!(parse_uuid("coach_id", Some("abc")), Err(ServiceError::Validation(_))));
        assert!(matches!(parse_date("d", Some("01/02/2024")), Err(ServiceError::Validation(_))));
        assert!(parse_datetime("t", Some("2024-03-01T10:00:00Z")).is_ok());
    }
}
