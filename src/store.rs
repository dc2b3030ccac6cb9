use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde_json::json;
use std::collections::HashMap;

use crate::db;
use crate::error::{map_unique, AdmissionError, Result};
use crate::fields::{self, ADMISSION_FIELDS};
use crate::model::{AdmissionRow, AdmissionStatus, FieldValue, NewReference};

/// `id, created_at, <field...>` in field-table order.
pub fn admission_columns() -> String {
    let mut cols = vec!["id", "created_at"];
    cols.extend(ADMISSION_FIELDS.iter().map(|f| f.name));
    cols.join(", ")
}

pub fn row_to_admission(row: &Row<'_>) -> rusqlite::Result<AdmissionRow> {
    let id: i64 = row.get(0)?;
    let created_at: String = row.get(1)?;
    let mut values = HashMap::with_capacity(ADMISSION_FIELDS.len());
    for (i, field) in ADMISSION_FIELDS.iter().enumerate() {
        let raw: Value = row.get(i + 2)?;
        values.insert(field.name, FieldValue::from_sql(field.kind, raw));
    }
    Ok(AdmissionRow {
        id,
        created_at,
        values,
    })
}

pub fn find_admission(conn: &Connection, pk: i64) -> Result<Option<AdmissionRow>> {
    let sql = format!("SELECT {} FROM admissions WHERE id = ?", admission_columns());
    Ok(conn
        .query_row(&sql, [pk], row_to_admission)
        .optional()?)
}

pub fn load_admission(conn: &Connection, pk: i64) -> Result<AdmissionRow> {
    find_admission(conn, pk)?.ok_or(AdmissionError::NotFound("admission"))
}

pub fn find_by_unique_id(conn: &Connection, unique_id: &str) -> Result<Option<AdmissionRow>> {
    let sql = format!(
        "SELECT {} FROM admissions WHERE unique_id = ? ORDER BY id LIMIT 1",
        admission_columns()
    );
    Ok(conn
        .query_row(&sql, [unique_id], row_to_admission)
        .optional()?)
}

pub fn admission_exists(conn: &Connection, pk: i64) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM admissions WHERE id = ?", [pk], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Enforces the admitted-record invariant on a pending change set: when the
/// resulting status is admitted, preferences are cleared in the same write.
fn apply_status_invariant(
    conn: &Connection,
    pk: Option<i64>,
    changes: &mut Vec<(&'static str, FieldValue)>,
) -> Result<()> {
    let new_status = changes
        .iter()
        .rev()
        .find(|(name, _)| *name == "admission_status")
        .map(|(_, v)| v.as_text().and_then(AdmissionStatus::parse));
    let status = match (new_status, pk) {
        (Some(s), _) => s,
        (None, Some(pk)) => conn
            .query_row(
                "SELECT admission_status FROM admissions WHERE id = ?",
                [pk],
                |r| r.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten()
            .as_deref()
            .and_then(AdmissionStatus::parse),
        (None, None) => None,
    };
    if status == Some(AdmissionStatus::Admitted) {
        changes.retain(|(name, _)| *name != "department_preferences");
        changes.push(("department_preferences", FieldValue::Null));
    }
    Ok(())
}

fn check_columns(changes: &[(&'static str, FieldValue)]) -> Result<()> {
    for (name, _) in changes {
        if fields::lookup(name).is_none() {
            return Err(AdmissionError::Internal(format!("unknown column {name}")));
        }
    }
    Ok(())
}

pub fn insert_admission(
    conn: &Connection,
    mut changes: Vec<(&'static str, FieldValue)>,
) -> Result<i64> {
    check_columns(&changes)?;
    apply_status_invariant(conn, None, &mut changes)?;

    let mut cols = vec!["created_at"];
    let mut bind: Vec<Value> = vec![Value::Text(db::now_stamp())];
    for (name, value) in &changes {
        cols.push(name);
        bind.push(value.to_sql());
    }
    let placeholders = std::iter::repeat_n("?", cols.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO admissions({}) VALUES({})",
        cols.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(bind))
        .map_err(map_unique)?;
    Ok(conn.last_insert_rowid())
}

/// Single UPDATE for the whole change set. Unknown pk is `NotFound`.
pub fn update_fields(
    conn: &Connection,
    pk: i64,
    mut changes: Vec<(&'static str, FieldValue)>,
) -> Result<()> {
    check_columns(&changes)?;
    apply_status_invariant(conn, Some(pk), &mut changes)?;
    if changes.is_empty() {
        return if admission_exists(conn, pk)? {
            Ok(())
        } else {
            Err(AdmissionError::NotFound("admission"))
        };
    }

    let sets = changes
        .iter()
        .map(|(name, _)| format!("{name} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut bind: Vec<Value> = changes.iter().map(|(_, v)| v.to_sql()).collect();
    bind.push(Value::Integer(pk));
    let sql = format!("UPDATE admissions SET {sets} WHERE id = ?");
    let n = conn
        .execute(&sql, params_from_iter(bind))
        .map_err(map_unique)?;
    if n == 0 {
        return Err(AdmissionError::NotFound("admission"));
    }
    Ok(())
}

/// Deletes the existing reference set and inserts `refs`. Callers run this
/// inside their transaction.
pub fn replace_references(conn: &Connection, pk: i64, refs: &[NewReference]) -> Result<()> {
    conn.execute(
        "DELETE FROM admission_references WHERE admission_id = ?",
        [pk],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO admission_references(admission_id, name, mobile, relationship, department, designation)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for r in refs {
        stmt.execute((
            pk,
            &r.name,
            &r.mobile,
            &r.relationship,
            none_if_empty(&r.department),
            none_if_empty(&r.designation),
        ))?;
    }
    Ok(())
}

fn none_if_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn list_references(conn: &Connection, pk: i64) -> Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, mobile, relationship, department, designation
         FROM admission_references
         WHERE admission_id = ?
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([pk], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "mobile": r.get::<_, String>(2)?,
                "relationship": r.get::<_, String>(3)?,
                "department": r.get::<_, Option<String>>(4)?,
                "designation": r.get::<_, Option<String>>(5)?,
            }))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn add_payment_screenshot(conn: &Connection, pk: i64, rel_path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO payment_screenshots(admission_id, image_path, uploaded_at) VALUES(?, ?, ?)",
        (pk, rel_path, db::now_stamp()),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_payment_screenshots(conn: &Connection, pk: i64) -> Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, image_path, uploaded_at FROM payment_screenshots
         WHERE admission_id = ?
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([pk], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "path": r.get::<_, String>(1)?,
                "uploadedAt": r.get::<_, String>(2)?,
            }))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
