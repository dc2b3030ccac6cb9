use crate::editor::{self, FieldUpdate, StatusUpdate};
use crate::fields;
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{db_conn, opt_str, required_id, required_str, respond, string_map};
use crate::ipc::types::{AppState, Request};
use crate::query::{self, AdmissionFilters};
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    // Filters may be nested under `filters` or passed at the top level.
    let source = req
        .params
        .get("filters")
        .filter(|v| v.is_object())
        .unwrap_or(&req.params);
    let filters = AdmissionFilters::from_params(&string_map(Some(source)));

    match query::list_admissions(conn, &filters, state.page_size) {
        Ok(page) => ok(
            &req.id,
            json!({
                "admissions": page.rows.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
                "count": page.page.count,
                "page": page.page.to_json(),
                "sort": filters.sort.as_str(),
                "states": page.states,
                "districts": page.districts,
                "fields": fields::editable_descriptors(),
            }),
        ),
        Err(e) => fail(&req.id, &req.method, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field_name = match required_str(req, "field_name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let update = FieldUpdate {
        pk,
        field_name,
        raw_value: opt_str(req, "new_value").unwrap_or_default(),
    };

    respond(
        req,
        editor::apply_field_update(conn, &update).map(|out| {
            let mut result = json!({
                "success": true,
                "value": out.value.to_json(),
            });
            if let Some(unpaid) = out.new_unpaid_fee {
                result["new_unpaid_fee"] = json!(unpaid.to_string());
            }
            result
        }),
    )
}

fn handle_update_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match required_str(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let update = StatusUpdate {
        pk,
        status,
        course: opt_str(req, "course"),
        branch: opt_str(req, "branch"),
    };

    respond(
        req,
        editor::apply_status_update(conn, &update)
            .map(|s| json!({ "success": true, "status": s.as_str() })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admissions.list" => Some(handle_list(state, req)),
        "admissions.update" => Some(handle_update(state, req)),
        "admissions.updateStatus" => Some(handle_update_status(state, req)),
        _ => None,
    }
}
