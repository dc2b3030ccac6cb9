use rusqlite::Connection;
use std::collections::HashMap;

use crate::error::AdmissionError;
use crate::ipc::error::{fail, ok};
use crate::ipc::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| bad_params(req, format!("missing {}", key)))
}

/// String parameter, with numbers accepted in their decimal form.
pub fn opt_str(req: &Request, key: &str) -> Option<String> {
    match req.params.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Record ids arrive as JSON numbers or numeric strings.
pub fn required_id(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    let v = req
        .params
        .get(key)
        .ok_or_else(|| bad_params(req, format!("missing {}", key)))?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .ok_or_else(|| bad_params(req, format!("{} must be an integer", key)))
}

pub fn optional_id(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(_) => required_id(req, key).map(Some),
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| fail(&req.id, &req.method, &AdmissionError::NoWorkspace))
}

/// Flattens an object of scalars into string values. Nulls are dropped.
pub fn string_map(value: Option<&serde_json::Value>) -> HashMap<String, String> {
    let Some(serde_json::Value::Object(map)) = value else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), s))
        })
        .collect()
}

pub fn bad_params(req: &Request, message: impl Into<String>) -> serde_json::Value {
    fail(&req.id, &req.method, &AdmissionError::bad_params(message))
}

pub fn respond(
    req: &Request,
    result: crate::error::Result<serde_json::Value>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => fail(&req.id, &req.method, &e),
    }
}
