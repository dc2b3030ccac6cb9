use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::json;
use std::path::Path;

use crate::calc::FeeComponents;
use crate::error::{AdmissionError, Result};
use crate::fields::{self, ADMISSION_FIELDS};
use crate::followups;
use crate::model::{AdmissionRow, AdmissionStatus, FieldValue};
use crate::store;

/// Spreadsheet rendering of one cell. NULL is an empty cell.
pub fn cell_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::Bool(true) => "Yes".to_string(),
        FieldValue::Bool(false) => "No".to_string(),
        FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        FieldValue::DateTime(dt) => dt.format("%Y-%m-%d").to_string(),
        FieldValue::Json(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}: {s}"),
                other => format!("{k}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Json(other) => other.to_string(),
        other => other.canonical().unwrap_or_default(),
    }
}

pub fn header_row() -> Vec<String> {
    let mut header = vec!["Id".to_string()];
    header.extend(ADMISSION_FIELDS.iter().map(|f| f.label()));
    header.push(fields::label_for("created_at"));
    header
}

fn record_row(row: &AdmissionRow) -> Vec<String> {
    let mut out = vec![row.id.to_string()];
    out.extend(ADMISSION_FIELDS.iter().map(|f| cell_text(row.get(f.name))));
    out.push(row.created_at.get(..10).unwrap_or(&row.created_at).to_string());
    out
}

/// Writes every admission to `out_path`, one row per record in id order.
/// Returns the number of data rows written.
pub fn export_admissions(conn: &Connection, out_path: &Path) -> Result<usize> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(out_path)
        .map_err(|e| AdmissionError::Internal(format!("open export file: {e}")))?;
    writer
        .write_record(header_row())
        .map_err(|e| AdmissionError::Internal(format!("write export header: {e}")))?;

    let sql = format!(
        "SELECT {} FROM admissions ORDER BY id",
        store::admission_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], store::row_to_admission)?;
    let mut count = 0usize;
    for row in rows {
        let row = row?;
        writer
            .write_record(record_row(&row))
            .map_err(|e| AdmissionError::Internal(format!("write export row: {e}")))?;
        count += 1;
    }
    writer.flush()?;
    tracing::info!(rows = count, path = %out_path.display(), "admissions exported");
    Ok(count)
}

/// Model behind the printable per-student admission report.
pub fn admission_report_model(conn: &Connection, pk: i64) -> Result<serde_json::Value> {
    let row = store::load_admission(conn, pk)?;
    let fees = FeeComponents::from_row(&row);
    let payments = followups::payments(conn, pk)?;
    let received: Decimal = followups::payments_total(conn, pk)?;

    let sections: Vec<serde_json::Value> = ADMISSION_FIELDS
        .iter()
        .filter(|f| f.kind != fields::FieldKind::File)
        .filter_map(|f| {
            let v = row.get(f.name);
            (!v.is_null()).then(|| json!({ "label": f.label(), "value": cell_text(v) }))
        })
        .collect();

    Ok(json!({
        "admission": row.to_json(),
        "fields": sections,
        "status": row.status().map(AdmissionStatus::as_str),
        "firstPreferenceDept": row.first_preference_dept(),
        "references": store::list_references(conn, pk)?,
        "payments": payments,
        "totals": {
            "totalDue": fees.total_due().map(|d| d.to_string()),
            "paid": fees.paid_fee.unwrap_or(Decimal::ZERO).to_string(),
            "concession": fees.concession_amount.unwrap_or(Decimal::ZERO).to_string(),
            "unpaid": fees.unpaid().map(|d| d.to_string()),
            "paymentsReceived": received.to_string(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::NaiveDate;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn cells_render_for_spreadsheets() {
        assert_eq!(cell_text(&FieldValue::Null), "");
        assert_eq!(cell_text(&FieldValue::Bool(true)), "Yes");
        assert_eq!(cell_text(&FieldValue::Bool(false)), "No");
        let d = NaiveDate::from_ymd_opt(2006, 3, 9).expect("date");
        assert_eq!(cell_text(&FieldValue::Date(d)), "2006-03-09");
        assert_eq!(
            cell_text(&FieldValue::Json(json!({ "MBA": 1 }))),
            "MBA: 1"
        );
        assert_eq!(cell_text(&FieldValue::Decimal(Decimal::new(12050, 2))), "120.50");
    }

    #[test]
    fn export_writes_header_and_rows_in_id_order() {
        let ws = temp_workspace("admissiond-export");
        let conn = db::open_db(&ws).expect("open db");
        for name in ["Zed", "Amy"] {
            store::insert_admission(
                &conn,
                vec![
                    ("student_name", FieldValue::text(name)),
                    ("is_fg", FieldValue::Bool(true)),
                ],
            )
            .expect("insert");
        }
        let out = ws.join("out").join("admissions.csv");
        assert_eq!(export_admissions(&conn, &out).expect("export"), 2);

        let mut reader = csv::Reader::from_path(&out).expect("read");
        let headers = reader.headers().expect("headers").clone();
        assert_eq!(&headers[0], "Id");
        let name_col = headers
            .iter()
            .position(|h| h == "Student Name")
            .expect("name column");
        let fg_col = headers
            .iter()
            .position(|h| h == "Is Fg")
            .expect("first graduate column");
        let records: Vec<csv::StringRecord> =
            reader.records().collect::<std::result::Result<_, _>>().expect("records");
        assert_eq!(&records[0][name_col], "Zed");
        assert_eq!(&records[1][name_col], "Amy");
        assert_eq!(&records[0][fg_col], "Yes");
    }

    #[test]
    fn report_model_totals_and_preference() {
        let ws = temp_workspace("admissiond-report");
        let conn = db::open_db(&ws).expect("open db");
        let pk = store::insert_admission(
            &conn,
            vec![
                ("college_fee", FieldValue::Decimal(Decimal::new(5000, 0))),
                ("paid_fee", FieldValue::Decimal(Decimal::new(1000, 0))),
                (
                    "department_preferences",
                    FieldValue::Json(json!({ "MBA": 2, "MCA": 1 })),
                ),
            ],
        )
        .expect("insert");
        let model = admission_report_model(&conn, pk).expect("model");
        assert_eq!(model["firstPreferenceDept"], json!("MCA"));
        assert_eq!(model["totals"]["unpaid"], json!("4000"));
        assert_eq!(
            admission_report_model(&conn, pk + 1).expect_err("missing").code(),
            "not_found"
        );
    }
}
