use crate::db;
use crate::departments::{PG_DEPARTMENTS, UG_DEPARTMENTS};
use crate::error::AdmissionError;
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::bad_params;
use crate::ipc::types::{AppState, Request};
use crate::wizard;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "pageSize": state.page_size,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);
    let Some(path) = p else {
        return bad_params(req, "missing params.path");
    };

    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => {
            let e = AdmissionError::Internal(format!(
                "open workspace {}: {e:#}",
                path.display()
            ));
            fail(&req.id, &req.method, &e)
        }
    }
}

fn handle_departments_list(req: &Request) -> serde_json::Value {
    let render = |list: &[crate::departments::Department]| {
        list.iter()
            .map(|d| json!({ "name": d.name, "label": d.label }))
            .collect::<Vec<_>>()
    };
    ok(
        &req.id,
        json!({
            "ug": render(UG_DEPARTMENTS),
            "pg": render(PG_DEPARTMENTS),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "departments.list" => Some(handle_departments_list(req)),
        "wizard.steps" => Some(ok(&req.id, json!({ "steps": wizard::steps_json() }))),
        _ => None,
    }
}
