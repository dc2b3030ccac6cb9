use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;

use crate::fields::{FieldKind, ADMISSION_FIELDS};

pub const DB_FILE: &str = "admissions.sqlite3";

/// Timestamp format for every `created_at` column. Sorts lexically and its
/// first ten characters are the calendar day.
pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admissions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Record columns come from the static field table; older workspaces pick
    // up new fields here.
    ensure_admission_columns(&conn)?;

    for col in [
        "admission_status",
        "level",
        "community",
        "district",
        "state",
        "country",
        "board",
        "bus_needed",
        "hostel_needed",
        "cutoff_marks",
        "created_at",
        "unique_id",
    ] {
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_admissions_{col} ON admissions({col})"
            ),
            [],
        )?;
    }
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_admissions_email_unique
         ON admissions(email) WHERE email IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admission_references(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admission_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            mobile TEXT NOT NULL,
            relationship TEXT NOT NULL,
            department TEXT,
            designation TEXT,
            FOREIGN KEY(admission_id) REFERENCES admissions(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_references_admission ON admission_references(admission_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS followups(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admission_id INTEGER NOT NULL,
            followup_type TEXT NOT NULL,
            expected_date TEXT NOT NULL,
            remarks TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0,
            created_by TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(admission_id) REFERENCES admissions(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_followups_admission ON followups(admission_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_followups_open ON followups(completed, expected_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_logs(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admission_id INTEGER NOT NULL,
            followup_id INTEGER,
            action TEXT NOT NULL,
            created_by TEXT,
            is_completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(admission_id) REFERENCES admissions(id) ON DELETE CASCADE,
            FOREIGN KEY(followup_id) REFERENCES followups(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_admission ON activity_logs(admission_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admission_id INTEGER NOT NULL,
            amount TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            payment_mode TEXT NOT NULL,
            transaction_id TEXT,
            remarks TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(admission_id) REFERENCES admissions(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_payments_admission ON fee_payments(admission_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_screenshots(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admission_id INTEGER NOT NULL,
            image_path TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            FOREIGN KEY(admission_id) REFERENCES admissions(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_screenshots_admission ON payment_screenshots(admission_id)",
        [],
    )?;

    Ok(conn)
}

fn column_default(name: &str, kind: FieldKind) -> Option<&'static str> {
    match (name, kind) {
        ("admission_status", _) => Some("'enquired'"),
        ("department_preferences", _) => Some("'{}'"),
        (_, FieldKind::Boolean) => Some("0"),
        _ => None,
    }
}

fn ensure_admission_columns(conn: &Connection) -> anyhow::Result<()> {
    for field in ADMISSION_FIELDS {
        if table_has_column(conn, "admissions", field.name)? {
            continue;
        }
        let mut sql = format!(
            "ALTER TABLE admissions ADD COLUMN {} {}",
            field.name,
            field.kind.sql_type()
        );
        if let Some(default) = column_default(field.name, field.kind) {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        conn.execute(&sql, [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn open_is_idempotent_and_creates_every_field_column() {
        let ws = temp_workspace("admissiond-db-open");
        drop(open_db(&ws).expect("first open"));
        let conn = open_db(&ws).expect("second open");
        for field in ADMISSION_FIELDS {
            assert!(
                table_has_column(&conn, "admissions", field.name).expect("pragma"),
                "missing column {}",
                field.name
            );
        }
    }

    #[test]
    fn inserted_rows_get_defaults() {
        let ws = temp_workspace("admissiond-db-defaults");
        let conn = open_db(&ws).expect("open");
        conn.execute(
            "INSERT INTO admissions(created_at) VALUES(?)",
            [now_stamp()],
        )
        .expect("insert");
        let (status, prefs, is_fg): (String, String, i64) = conn
            .query_row(
                "SELECT admission_status, department_preferences, is_fg FROM admissions",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .expect("row");
        assert_eq!(status, "enquired");
        assert_eq!(prefs, "{}");
        assert_eq!(is_fg, 0);
    }

    #[test]
    fn stamp_prefix_is_calendar_day() {
        let s = now_stamp();
        assert_eq!(&s[..10], Utc::now().format("%Y-%m-%d").to_string());
        assert!(s.ends_with('Z'));
    }
}
