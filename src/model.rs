use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rusqlite::types::Value;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;

use crate::fields::{self, FieldKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStatus {
    Enquired,
    Admitted,
    Discontinued,
    Left,
}

impl AdmissionStatus {
    pub const ALL: [AdmissionStatus; 4] = [
        AdmissionStatus::Enquired,
        AdmissionStatus::Admitted,
        AdmissionStatus::Discontinued,
        AdmissionStatus::Left,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|st| st.as_str() == wanted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enquired => "enquired",
            Self::Admitted => "admitted",
            Self::Discontinued => "discontinued",
            Self::Left => "left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpType {
    Visit,
    Fee,
}

impl FollowUpType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "visit" => Some(Self::Visit),
            "fee" => Some(Self::Fee),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visit => "visit",
            Self::Fee => "fee",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Visit => "College Visit",
            Self::Fee => "Fee Payment",
        }
    }
}

/// A typed cell of the admissions table.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Decimal(Decimal),
    Integer(i64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Empty input is stored as NULL.
    pub fn opt_text(s: &str) -> Self {
        if s.is_empty() {
            FieldValue::Null
        } else {
            FieldValue::Text(s.to_string())
        }
    }

    pub fn opt_decimal(d: Option<Decimal>) -> Self {
        d.map(FieldValue::Decimal).unwrap_or(FieldValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Canonical string form. Re-casting this string yields the same value.
    pub fn canonical(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Decimal(d) => Some(d.to_string()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            FieldValue::Json(v) => Some(v.to_string()),
        }
    }

    pub fn to_sql(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Integer(i) => Value::Integer(*i),
            FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
            other => other
                .canonical()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        }
    }

    /// Decodes a stored cell. Values that no longer parse for their kind
    /// are surfaced as text rather than failing the whole row.
    pub fn from_sql(kind: FieldKind, raw: Value) -> FieldValue {
        match (kind, raw) {
            (_, Value::Null) => FieldValue::Null,
            (FieldKind::Boolean, Value::Integer(i)) => FieldValue::Bool(i != 0),
            (FieldKind::Integer, Value::Integer(i)) => FieldValue::Integer(i),
            (FieldKind::Decimal, Value::Integer(i)) => FieldValue::Decimal(Decimal::from(i)),
            (FieldKind::Decimal, Value::Real(f)) => Decimal::try_from(f)
                .map(FieldValue::Decimal)
                .unwrap_or(FieldValue::Null),
            (FieldKind::Decimal, Value::Text(s)) => Decimal::from_str(&s)
                .map(FieldValue::Decimal)
                .unwrap_or(FieldValue::Text(s)),
            (FieldKind::Date, Value::Text(s)) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Text(s)),
            (FieldKind::DateTime, Value::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
                .unwrap_or(FieldValue::Text(s)),
            (FieldKind::Json, Value::Text(s)) => serde_json::from_str(&s)
                .map(FieldValue::Json)
                .unwrap_or(FieldValue::Text(s)),
            (_, Value::Text(s)) => FieldValue::Text(s),
            (_, Value::Integer(i)) => FieldValue::Integer(i),
            (_, Value::Real(f)) => FieldValue::Text(f.to_string()),
            (_, Value::Blob(_)) => FieldValue::Null,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Integer(i) => json!(i),
            FieldValue::Bool(b) => json!(b),
            FieldValue::Json(v) => v.clone(),
            other => json!(other.canonical()),
        }
    }
}

/// One admissions row, keyed by column name.
#[derive(Debug, Clone)]
pub struct AdmissionRow {
    pub id: i64,
    pub created_at: String,
    pub values: HashMap<&'static str, FieldValue>,
}

impl AdmissionRow {
    pub fn get(&self, name: &str) -> &FieldValue {
        self.values.get(name).unwrap_or(&FieldValue::Null)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).as_text()
    }

    pub fn decimal(&self, name: &str) -> Option<Decimal> {
        self.get(name).as_decimal()
    }

    pub fn status(&self) -> Option<AdmissionStatus> {
        self.text("admission_status").and_then(AdmissionStatus::parse)
    }

    /// Department holding rank 1, falling back to the PG department or branch.
    pub fn first_preference_dept(&self) -> String {
        if let FieldValue::Json(serde_json::Value::Object(prefs)) = self.get("department_preferences") {
            let best = prefs
                .iter()
                .filter_map(|(k, v)| rank_of(v).map(|r| (r, k)))
                .min_by_key(|(r, _)| *r);
            if let Some((_, name)) = best {
                return name.clone();
            }
            if let Some(name) = prefs.keys().next() {
                return name.clone();
            }
        }
        self.text("pg_dept")
            .or_else(|| self.text("branch"))
            .unwrap_or("")
            .to_string()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), json!(self.id));
        for f in fields::ADMISSION_FIELDS {
            obj.insert(f.name.into(), self.get(f.name).to_json());
        }
        obj.insert("created_at".into(), json!(self.created_at));
        serde_json::Value::Object(obj)
    }
}

/// Preference ranks are stored as JSON integers or numeric strings.
pub fn rank_of(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReference {
    pub name: String,
    pub mobile: String,
    pub relationship: String,
    pub department: String,
    pub designation: String,
}
