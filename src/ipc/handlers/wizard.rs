use crate::error::AdmissionError;
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{db_conn, optional_id, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::wizard::{self, FormData, Step, StepContext};
use serde_json::json;

fn handle_step(state: &mut AppState, req: &Request, step: Step) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(workspace) = state.workspace.as_deref() else {
        return fail(&req.id, &req.method, &AdmissionError::NoWorkspace);
    };
    let pk = match optional_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let form_value = req
        .params
        .get("form")
        .filter(|v| v.is_object())
        .unwrap_or(&req.params);
    let form = FormData::new(form_value);
    let ctx = StepContext { conn, workspace };

    match wizard::submit(&ctx, step, pk, &form) {
        Ok(outcome) => ok(&req.id, outcome.to_json()),
        Err(e) => {
            let mut resp = fail(&req.id, &req.method, &e);
            if matches!(e, AdmissionError::Validation(_)) {
                resp["error"]["details"]["step"] = json!(step.name());
            }
            resp
        }
    }
}

fn handle_review(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match optional_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, wizard::review(conn, pk))
}

fn handle_lookup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let identifier = match req.params.get("identifier") {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => match required_str(req, "identifier") {
            Ok(v) => v,
            Err(e) => return e,
        },
    };
    respond(
        req,
        wizard::lookup(conn, &identifier).map(|row| json!({ "admission": row.to_json() })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let step_name = req.method.strip_prefix("wizard.")?;
    match step_name {
        "review" => Some(handle_review(state, req)),
        "lookup" => Some(handle_lookup(state, req)),
        other => Step::parse(other).map(|step| handle_step(state, req, step)),
    }
}
