use chrono::{Days, NaiveDate, Utc};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

use crate::calc::FeeComponents;
use crate::db;
use crate::editor::{parse_date, parse_decimal, within_bounds};
use crate::error::{AdmissionError, Result};
use crate::model::{AdmissionStatus, FieldValue, FollowUpType};
use crate::store;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn ymd(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueFilter {
    Today,
    Tomorrow,
    Yesterday,
    Overdue,
}

impl DueFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "today" => Some(DueFilter::Today),
            "tomorrow" => Some(DueFilter::Tomorrow),
            "yesterday" => Some(DueFilter::Yesterday),
            "overdue" => Some(DueFilter::Overdue),
            _ => None,
        }
    }
}

fn append_activity(
    conn: &Connection,
    pk: i64,
    followup_id: Option<i64>,
    action: &str,
    created_by: Option<&str>,
    is_completed: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO activity_logs(admission_id, followup_id, action, created_by, is_completed, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (pk, followup_id, action, created_by, is_completed, db::now_stamp()),
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone)]
pub struct NewFollowUp {
    pub pk: i64,
    pub followup_type: String,
    pub expected_date: String,
    pub remarks: String,
    pub created_by: Option<String>,
}

pub fn create(conn: &Connection, input: &NewFollowUp) -> Result<i64> {
    let mut errors = Vec::new();
    let kind = FollowUpType::parse(&input.followup_type);
    if kind.is_none() {
        errors.push("Follow-up type must be visit or fee.".to_string());
    }
    let date = parse_date(&input.expected_date);
    if date.is_none() {
        errors.push("Expected date must be a valid date (YYYY-MM-DD).".to_string());
    }
    let (Some(kind), Some(date)) = (kind, date) else {
        return Err(AdmissionError::Validation(errors));
    };

    let tx = conn.unchecked_transaction()?;
    if !store::admission_exists(&tx, input.pk)? {
        return Err(AdmissionError::NotFound("admission"));
    }
    tx.execute(
        "INSERT INTO followups(admission_id, followup_type, expected_date, remarks, completed, created_by, created_at)
         VALUES(?, ?, ?, ?, 0, ?, ?)",
        (
            input.pk,
            kind.as_str(),
            ymd(date),
            &input.remarks,
            input.created_by.as_deref(),
            db::now_stamp(),
        ),
    )?;
    let followup_id = tx.last_insert_rowid();
    append_activity(
        &tx,
        input.pk,
        Some(followup_id),
        &format!("{} scheduled for {}", kind.label(), ymd(date)),
        input.created_by.as_deref(),
        false,
    )?;
    tx.commit()?;
    tracing::info!(admission_id = input.pk, followup_id, "follow-up scheduled");
    Ok(followup_id)
}

const FOLLOWUP_SELECT: &str = "SELECT f.id, f.admission_id, a.student_name, a.student_mobile,
        f.followup_type, f.expected_date, f.remarks, f.completed, f.created_by, f.created_at
     FROM followups f
     JOIN admissions a ON a.id = f.admission_id";

fn followup_json(r: &Row<'_>, today: &str) -> rusqlite::Result<serde_json::Value> {
    let kind: String = r.get(4)?;
    let expected: String = r.get(5)?;
    let completed: bool = r.get(7)?;
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "admissionId": r.get::<_, i64>(1)?,
        "studentName": r.get::<_, Option<String>>(2)?,
        "studentMobile": r.get::<_, Option<String>>(3)?,
        "followupType": kind,
        "followupTypeLabel": FollowUpType::parse(&kind).map(FollowUpType::label),
        "expectedDate": expected,
        "remarks": r.get::<_, String>(6)?,
        "completed": completed,
        "overdue": !completed && expected.as_str() < today,
        "createdBy": r.get::<_, Option<String>>(8)?,
        "createdAt": r.get::<_, String>(9)?,
    }))
}

fn query_followups(
    conn: &Connection,
    where_sql: &str,
    order_sql: &str,
    bind: Vec<Value>,
) -> Result<Vec<serde_json::Value>> {
    let today = ymd(today());
    let sql = format!("{FOLLOWUP_SELECT} WHERE {where_sql} ORDER BY {order_sql}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| followup_json(r, &today))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Incomplete follow-ups, optionally narrowed relative to today.
pub fn list_open(conn: &Connection, filter: Option<DueFilter>) -> Result<Vec<serde_json::Value>> {
    let t = today();
    let (clause, bind) = match filter {
        None => ("f.completed = 0", Vec::new()),
        Some(DueFilter::Today) => ("f.completed = 0 AND f.expected_date = ?", vec![ymd(t)]),
        Some(DueFilter::Tomorrow) => (
            "f.completed = 0 AND f.expected_date = ?",
            vec![ymd(t + Days::new(1))],
        ),
        Some(DueFilter::Yesterday) => (
            "f.completed = 0 AND f.expected_date = ?",
            vec![ymd(t - Days::new(1))],
        ),
        Some(DueFilter::Overdue) => ("f.completed = 0 AND f.expected_date < ?", vec![ymd(t)]),
    };
    query_followups(
        conn,
        clause,
        "f.expected_date ASC, f.id ASC",
        bind.into_iter().map(Value::Text).collect(),
    )
}

fn load_followup(conn: &Connection, followup_id: i64) -> Result<(i64, FollowUpType, bool)> {
    let row = conn
        .query_row(
            "SELECT admission_id, followup_type, completed FROM followups WHERE id = ?",
            [followup_id],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, bool>(2)?)),
        )
        .optional()?;
    let (pk, kind, completed) = row.ok_or(AdmissionError::NotFound("follow-up"))?;
    let kind = FollowUpType::parse(&kind)
        .ok_or_else(|| AdmissionError::Internal(format!("stored follow-up type {kind:?}")))?;
    Ok((pk, kind, completed))
}

pub fn complete(conn: &Connection, followup_id: i64, created_by: Option<&str>) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let (pk, kind, _) = load_followup(&tx, followup_id)?;
    tx.execute("UPDATE followups SET completed = 1 WHERE id = ?", [followup_id])?;
    append_activity(
        &tx,
        pk,
        Some(followup_id),
        &format!("{} completed", kind.label()),
        created_by,
        true,
    )?;
    tx.commit()?;
    tracing::info!(admission_id = pk, followup_id, "follow-up completed");
    Ok(pk)
}

pub fn reschedule(
    conn: &Connection,
    followup_id: i64,
    expected_date: &str,
    remarks: Option<&str>,
    created_by: Option<&str>,
) -> Result<i64> {
    let date = parse_date(expected_date).ok_or_else(|| {
        AdmissionError::validation("Expected date must be a valid date (YYYY-MM-DD).")
    })?;
    let tx = conn.unchecked_transaction()?;
    let (pk, kind, completed) = load_followup(&tx, followup_id)?;
    if completed {
        return Err(AdmissionError::validation(
            "Completed follow-ups cannot be rescheduled.",
        ));
    }
    match remarks {
        Some(r) => tx.execute(
            "UPDATE followups SET expected_date = ?, remarks = ? WHERE id = ?",
            (ymd(date), r, followup_id),
        )?,
        None => tx.execute(
            "UPDATE followups SET expected_date = ? WHERE id = ?",
            (ymd(date), followup_id),
        )?,
    };
    append_activity(
        &tx,
        pk,
        Some(followup_id),
        &format!("{} rescheduled to {}", kind.label(), ymd(date)),
        created_by,
        false,
    )?;
    tx.commit()?;
    Ok(pk)
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub pk: i64,
    pub amount: String,
    pub payment_date: String,
    pub payment_mode: String,
    pub transaction_id: Option<String>,
    pub remarks: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaymentOutcome {
    pub payment_id: i64,
    pub paid_fee: Decimal,
    pub unpaid_fee: Decimal,
}

/// Records a payment and moves the balance in one transaction.
pub fn add_fee_payment(conn: &Connection, input: &NewPayment) -> Result<PaymentOutcome> {
    let mut errors = Vec::new();
    let amount = parse_decimal(&input.amount).filter(|a| *a > Decimal::ZERO);
    if amount.is_none() {
        errors.push(
            "Amount must be a number greater than zero, with at most 8 digits before and 2 after the decimal point."
                .to_string(),
        );
    }
    let date = parse_date(&input.payment_date);
    if date.is_none() {
        errors.push("Payment date must be a valid date (YYYY-MM-DD).".to_string());
    }
    if input.payment_mode.trim().is_empty() {
        errors.push("Payment mode is required.".to_string());
    }
    let (Some(amount), Some(date), true) = (amount, date, errors.is_empty()) else {
        return Err(AdmissionError::Validation(errors));
    };

    let tx = conn.unchecked_transaction()?;
    let row = store::load_admission(&tx, input.pk)?;
    tx.execute(
        "INSERT INTO fee_payments(admission_id, amount, payment_date, payment_mode, transaction_id, remarks, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            input.pk,
            amount.to_string(),
            ymd(date),
            input.payment_mode.trim(),
            input.transaction_id.as_deref().filter(|s| !s.is_empty()),
            input.remarks.as_deref().filter(|s| !s.is_empty()),
            db::now_stamp(),
        ),
    )?;
    let payment_id = tx.last_insert_rowid();

    let mut fees = FeeComponents::from_row(&row);
    let paid = fees
        .paid_fee
        .unwrap_or(Decimal::ZERO)
        .checked_add(amount)
        .filter(|p| within_bounds(*p))
        .ok_or_else(|| AdmissionError::validation("Total paid fee would exceed 99999999.99."))?;
    fees.paid_fee = Some(paid);
    let unpaid = fees
        .unpaid()
        .ok_or_else(|| AdmissionError::validation("Fee balance is out of range."))?;
    store::update_fields(
        &tx,
        input.pk,
        vec![
            ("had_paid", FieldValue::Bool(true)),
            ("paid_fee", FieldValue::Decimal(paid)),
            ("unpaid_fee", FieldValue::Decimal(unpaid)),
        ],
    )?;
    append_activity(
        &tx,
        input.pk,
        None,
        &format!("Fee payment of {} received", amount),
        input.created_by.as_deref(),
        true,
    )?;
    tx.commit()?;
    tracing::info!(admission_id = input.pk, payment_id, "fee payment recorded");
    Ok(PaymentOutcome {
        payment_id,
        paid_fee: paid,
        unpaid_fee: unpaid,
    })
}

fn activity_json(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "admissionId": r.get::<_, i64>(1)?,
        "studentName": r.get::<_, Option<String>>(2)?,
        "followupId": r.get::<_, Option<i64>>(3)?,
        "action": r.get::<_, String>(4)?,
        "createdBy": r.get::<_, Option<String>>(5)?,
        "isCompleted": r.get::<_, bool>(6)?,
        "createdAt": r.get::<_, String>(7)?,
    }))
}

const ACTIVITY_SELECT: &str = "SELECT l.id, l.admission_id, a.student_name, l.followup_id,
        l.action, l.created_by, l.is_completed, l.created_at
     FROM activity_logs l
     JOIN admissions a ON a.id = l.admission_id";

/// Activity log for one admission, newest first.
pub fn activities(conn: &Connection, pk: i64) -> Result<Vec<serde_json::Value>> {
    if !store::admission_exists(conn, pk)? {
        return Err(AdmissionError::NotFound("admission"));
    }
    let mut stmt = conn.prepare(&format!(
        "{ACTIVITY_SELECT} WHERE l.admission_id = ? ORDER BY l.created_at DESC, l.id DESC"
    ))?;
    let rows = stmt
        .query_map([pk], activity_json)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn recent_activities(conn: &Connection, limit: i64) -> Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(&format!(
        "{ACTIVITY_SELECT} ORDER BY l.created_at DESC, l.id DESC LIMIT ?"
    ))?;
    let rows = stmt
        .query_map([limit], activity_json)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn payments(conn: &Connection, pk: i64) -> Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, amount, payment_date, payment_mode, transaction_id, remarks, created_at
         FROM fee_payments
         WHERE admission_id = ?
         ORDER BY payment_date, id",
    )?;
    let rows = stmt
        .query_map([pk], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "amount": r.get::<_, String>(1)?,
                "paymentDate": r.get::<_, String>(2)?,
                "paymentMode": r.get::<_, String>(3)?,
                "transactionId": r.get::<_, Option<String>>(4)?,
                "remarks": r.get::<_, Option<String>>(5)?,
                "createdAt": r.get::<_, String>(6)?,
            }))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Sum of recorded payments for one admission.
pub fn payments_total(conn: &Connection, pk: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare("SELECT amount FROM fee_payments WHERE admission_id = ?")?;
    let amounts = stmt
        .query_map([pk], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(amounts
        .iter()
        .filter_map(|a| Decimal::from_str(a).ok())
        .sum())
}

pub fn student_detail(conn: &Connection, pk: i64) -> Result<serde_json::Value> {
    let row = store::load_admission(conn, pk)?;
    let followups = query_followups(
        conn,
        "f.admission_id = ?",
        "f.expected_date DESC, f.id DESC",
        vec![Value::Integer(pk)],
    )?;
    Ok(json!({
        "admission": row.to_json(),
        "followups": followups,
        "activities": activities(conn, pk)?,
        "payments": payments(conn, pk)?,
        "references": store::list_references(conn, pk)?,
        "paymentScreenshots": store::list_payment_screenshots(conn, pk)?,
    }))
}

fn count(conn: &Connection, sql: &str, bind: Vec<Value>) -> Result<i64> {
    Ok(conn.query_row(sql, params_from_iter(bind), |r| r.get(0))?)
}

pub fn dashboard_summary(conn: &Connection) -> Result<serde_json::Value> {
    let t = today();
    let today_s = Value::Text(ymd(t));
    let tomorrow_s = Value::Text(ymd(t + Days::new(1)));
    let open_on = "SELECT COUNT(*) FROM followups WHERE completed = 0 AND expected_date = ?";

    let by_status = |statuses: &[AdmissionStatus]| -> Result<i64> {
        let marks = std::iter::repeat_n("?", statuses.len())
            .collect::<Vec<_>>()
            .join(", ");
        count(
            conn,
            &format!("SELECT COUNT(*) FROM admissions WHERE admission_status IN ({marks})"),
            statuses
                .iter()
                .map(|s| Value::Text(s.as_str().to_string()))
                .collect(),
        )
    };

    Ok(json!({
        "overdueCount": count(
            conn,
            "SELECT COUNT(*) FROM followups WHERE completed = 0 AND expected_date < ?",
            vec![today_s.clone()],
        )?,
        "todayCount": count(conn, open_on, vec![today_s.clone()])?,
        "tomorrowCount": count(conn, open_on, vec![tomorrow_s])?,
        "totalStudents": count(conn, "SELECT COUNT(*) FROM admissions", Vec::new())?,
        "enquiredCount": by_status(&[AdmissionStatus::Enquired])?,
        "admittedCount": by_status(&[AdmissionStatus::Admitted])?,
        "leftCount": by_status(&[AdmissionStatus::Left, AdmissionStatus::Discontinued])?,
        "visitsToday": count(
            conn,
            "SELECT COUNT(*) FROM followups WHERE completed = 0 AND expected_date = ? AND followup_type = 'visit'",
            vec![today_s.clone()],
        )?,
        "feeFollowupsToday": count(
            conn,
            "SELECT COUNT(*) FROM followups WHERE completed = 0 AND expected_date = ? AND followup_type = 'fee'",
            vec![today_s],
        )?,
        "todayFollowups": list_open(conn, Some(DueFilter::Today))?,
        "overdueFollowups": list_open(conn, Some(DueFilter::Overdue))?,
        "recentActivities": recent_activities(conn, 10)?,
    }))
}
