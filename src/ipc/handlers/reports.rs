use crate::export;
use crate::ipc::helpers::{db_conn, required_id, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export_admissions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    respond(
        req,
        export::export_admissions(conn, &out_path).map(|rows| {
            json!({
                "outPath": out_path.to_string_lossy(),
                "rowCount": rows,
            })
        }),
    )
}

fn handle_admission_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, export::admission_report_model(conn, pk))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.admissions" => Some(handle_export_admissions(state, req)),
        "reports.admissionModel" => Some(handle_admission_model(state, req)),
        _ => None,
    }
}
