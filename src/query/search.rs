//! Search criteria over record payloads

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;

use super::{QueryError, QueryResult};

/// Parse `YYYY-MM-DD` or RFC 3339. A bare date means the start of that day,
/// or its last millisecond when `end_of_day` is set.
pub fn parse_date(input: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Some(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::MIN
    };
    Some(date.and_time(time).and_utc())
}

/// Inclusive range on a date-like payload field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFilter {
    pub field: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateFilter {
    /// Build from user-supplied bounds; a bare `to` date covers the whole day
    pub fn parse(field: impl Into<String>, from: Option<&str>, to: Option<&str>) -> QueryResult<Self> {
        let bound = |raw: Option<&str>, end_of_day: bool| -> QueryResult<Option<DateTime<Utc>>> {
            match raw {
                None => Ok(None),
                Some(raw) => parse_date(raw, end_of_day)
                    .map(Some)
                    .ok_or_else(|| QueryError::InvalidDate(raw.to_string())),
            }
        };
        Ok(Self {
            field: field.into(),
            from: bound(from, false)?,
            to: bound(to, true)?,
        })
    }

    fn matches(&self, payload: &Value) -> bool {
        let value = match payload.get(&self.field).and_then(Value::as_str) {
            Some(value) => value,
            None => return false,
        };
        let at = match parse_date(value, false) {
            Some(at) => at,
            None => return false,
        };
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// AND-combined filters; an empty criteria matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Top-level payload field -> case-insensitive substring
    pub fields: BTreeMap<String, String>,
    pub date: Option<DateFilter>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, needle: impl Into<String>) -> Self {
        self.fields.insert(name.into(), needle.into());
        self
    }

    pub fn date(mut self, filter: DateFilter) -> Self {
        self.date = Some(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.date.is_none()
    }

    pub fn matches(&self, payload: &Value) -> bool {
        let fields_match = self.fields.iter().all(|(name, needle)| {
            payload
                .get(name)
                .and_then(searchable_text)
                .map_or(false, |text| text.to_lowercase().contains(&needle.to_lowercase()))
        });
        fields_match && self.date.as_ref().map_or(true, |date| date.matches(payload))
    }
}

fn searchable_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
