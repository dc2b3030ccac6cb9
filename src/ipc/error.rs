use serde_json::json;

use crate::error::AdmissionError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Envelope for a domain error. Internal failures are logged in full and
/// reported generically.
pub fn fail(id: &str, method: &str, e: &AdmissionError) -> serde_json::Value {
    if e.is_internal() {
        tracing::error!(method, error = %e, "request failed");
    } else {
        tracing::warn!(method, code = e.code(), error = %e, "request rejected");
    }
    let mut resp = err(id, e.code(), e.public_message(), e.details());
    resp["error"]["status"] = json!(e.status());
    resp
}
