use crate::followups::{self, DueFilter, NewFollowUp, NewPayment};
use crate::ipc::helpers::{bad_params, db_conn, opt_str, required_id, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = NewFollowUp {
        pk,
        followup_type: opt_str(req, "followup_type").unwrap_or_default(),
        expected_date: opt_str(req, "expected_date").unwrap_or_default(),
        remarks: opt_str(req, "remarks").unwrap_or_default(),
        created_by: opt_str(req, "created_by").filter(|s| !s.is_empty()),
    };
    respond(
        req,
        followups::create(conn, &input).map(|id| json!({ "followupId": id })),
    )
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let filter = match opt_str(req, "filter").filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match DueFilter::parse(&raw) {
            Some(f) => Some(f),
            None => {
                return bad_params(
                    req,
                    "filter must be one of today, tomorrow, yesterday, overdue",
                )
            }
        },
    };
    respond(
        req,
        followups::list_open(conn, filter).map(|rows| json!({ "followups": rows })),
    )
}

fn handle_complete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let followup_id = match required_id(req, "followup_id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let created_by = opt_str(req, "created_by");
    respond(
        req,
        followups::complete(conn, followup_id, created_by.as_deref())
            .map(|pk| json!({ "success": true, "pk": pk })),
    )
}

fn handle_reschedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let followup_id = match required_id(req, "followup_id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let expected_date = opt_str(req, "expected_date").unwrap_or_default();
    let remarks = opt_str(req, "remarks");
    let created_by = opt_str(req, "created_by");
    respond(
        req,
        followups::reschedule(
            conn,
            followup_id,
            &expected_date,
            remarks.as_deref(),
            created_by.as_deref(),
        )
        .map(|pk| json!({ "success": true, "pk": pk })),
    )
}

fn handle_add_payment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = NewPayment {
        pk,
        amount: opt_str(req, "amount").unwrap_or_default(),
        payment_date: opt_str(req, "payment_date").unwrap_or_default(),
        payment_mode: opt_str(req, "payment_mode").unwrap_or_default(),
        transaction_id: opt_str(req, "transaction_id"),
        remarks: opt_str(req, "remarks"),
        created_by: opt_str(req, "created_by"),
    };
    respond(
        req,
        followups::add_fee_payment(conn, &input).map(|out| {
            json!({
                "paymentId": out.payment_id,
                "paid_fee": out.paid_fee.to_string(),
                "unpaid_fee": out.unpaid_fee.to_string(),
            })
        }),
    )
}

fn handle_activities(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        followups::activities(conn, pk).map(|rows| json!({ "activities": rows })),
    )
}

fn handle_student_detail(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pk = match required_id(req, "pk") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, followups::student_detail(conn, pk))
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    respond(req, followups::dashboard_summary(conn))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "followups.create" => Some(handle_create(state, req)),
        "followups.list" => Some(handle_list(state, req)),
        "followups.complete" => Some(handle_complete(state, req)),
        "followups.reschedule" => Some(handle_reschedule(state, req)),
        "fees.addPayment" => Some(handle_add_payment(state, req)),
        "activities.list" => Some(handle_activities(state, req)),
        "students.detail" => Some(handle_student_detail(state, req)),
        "dashboard.summary" => Some(handle_dashboard(state, req)),
        _ => None,
    }
}
