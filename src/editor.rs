use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::calc::{self, FeeComponents};
use crate::error::{AdmissionError, Result};
use crate::fields::{self, FieldKind};
use crate::model::{AdmissionStatus, FieldValue};
use crate::store;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn invalid(raw: &str, reason: &str) -> AdmissionError {
    AdmissionError::InvalidValue {
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// Total digits allowed in a money or marks value.
pub const MAX_DIGITS: u32 = 10;
/// Digits allowed after the decimal point.
pub const DECIMAL_PLACES: u32 = 2;

const OUT_OF_RANGE: &str = "must have at most 8 digits before and 2 after the decimal point";

fn parse_unbounded(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

pub fn within_bounds(d: Decimal) -> bool {
    let limit = Decimal::from(10i64.pow(MAX_DIGITS - DECIMAL_PLACES));
    d.normalize().scale() <= DECIMAL_PLACES && d.abs() < limit
}

/// Parses a money or marks amount. Values outside the column bounds are
/// rejected like malformed input.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    parse_unbounded(raw).filter(|d| within_bounds(*d))
}

/// ISO-8601 with `T` or space separator and an optional offset. Values
/// without an offset are taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s.replacen(' ', "T", 1)) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Casts one raw input string to the field's semantic type. Empty input is
/// NULL for every kind.
pub fn cast_value(raw: &str, kind: FieldKind) -> Result<FieldValue> {
    if raw.is_empty() {
        return Ok(FieldValue::Null);
    }
    match kind {
        FieldKind::Text | FieldKind::Email | FieldKind::File => Ok(FieldValue::text(raw)),
        FieldKind::Decimal => match parse_unbounded(raw) {
            Some(d) if within_bounds(d) => Ok(FieldValue::Decimal(d)),
            Some(_) => Err(invalid(raw, OUT_OF_RANGE)),
            None => Err(invalid(raw, "not a decimal number")),
        },
        FieldKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| invalid(raw, "not an integer")),
        FieldKind::Boolean => {
            let truthy = matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes");
            Ok(FieldValue::Bool(truthy))
        }
        FieldKind::Date => parse_date(raw)
            .map(FieldValue::Date)
            .ok_or_else(|| invalid(raw, "expected YYYY-MM-DD")),
        FieldKind::DateTime => parse_datetime(raw)
            .map(FieldValue::DateTime)
            .ok_or_else(|| invalid(raw, "expected an ISO-8601 date and time")),
        FieldKind::Json => serde_json::from_str::<serde_json::Value>(raw)
            .map(FieldValue::Json)
            .map_err(|e| invalid(raw, &format!("malformed JSON: {e}"))),
    }
}

#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub pk: i64,
    pub field_name: String,
    pub raw_value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub value: FieldValue,
    pub new_unpaid_fee: Option<Decimal>,
}

/// Validates and applies one inline edit. Fee components recompute
/// `unpaid_fee` in the same statement.
pub fn apply_field_update(conn: &Connection, update: &FieldUpdate) -> Result<UpdateOutcome> {
    let def = fields::lookup(&update.field_name)
        .filter(|f| f.editable())
        .ok_or_else(|| AdmissionError::NotEditable(update.field_name.clone()))?;
    let value = match def.name {
        "admission_status" => cast_status(&update.raw_value)?,
        _ => cast_value(&update.raw_value, def.kind)?,
    };

    let tx = conn.unchecked_transaction()?;
    let row = store::load_admission(&tx, update.pk)?;

    let mut changes = vec![(def.name, value.clone())];
    let mut new_unpaid_fee = None;
    if calc::is_fee_component(def.name) {
        let mut fees = FeeComponents::from_row(&row);
        fees.set(def.name, value.as_decimal());
        let unpaid = fees
            .unpaid()
            .ok_or_else(|| invalid(&update.raw_value, "fee total is out of range"))?;
        changes.push(("unpaid_fee", FieldValue::Decimal(unpaid)));
        new_unpaid_fee = Some(unpaid);
    }
    store::update_fields(&tx, update.pk, changes)?;
    tx.commit()?;

    tracing::info!(
        admission_id = update.pk,
        field = def.name,
        "inline field updated"
    );
    Ok(UpdateOutcome {
        value,
        new_unpaid_fee,
    })
}

/// Inline status edits take the same vocabulary as `apply_status_update`
/// and store the lowercase form.
fn cast_status(raw: &str) -> Result<FieldValue> {
    AdmissionStatus::parse(raw)
        .map(|st| FieldValue::text(st.as_str()))
        .ok_or_else(|| invalid(raw, "must be one of enquired, admitted, discontinued, left"))
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub pk: i64,
    pub status: String,
    pub course: Option<String>,
    pub branch: Option<String>,
}

pub fn apply_status_update(conn: &Connection, update: &StatusUpdate) -> Result<AdmissionStatus> {
    let status = AdmissionStatus::parse(&update.status).ok_or_else(|| {
        AdmissionError::validation(format!("Unknown admission status \"{}\"", update.status))
    })?;
    let mut changes = vec![("admission_status", FieldValue::text(status.as_str()))];
    if status == AdmissionStatus::Admitted {
        if let Some(course) = update.course.as_deref().filter(|s| !s.is_empty()) {
            changes.push(("course", FieldValue::text(course)));
        }
        if let Some(branch) = update.branch.as_deref().filter(|s| !s.is_empty()) {
            changes.push(("branch", FieldValue::text(branch)));
        }
    }
    store::update_fields(conn, update.pk, changes)?;
    tracing::info!(admission_id = update.pk, status = status.as_str(), "status updated");
    Ok(status)
}
