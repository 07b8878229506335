use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::terms::{parse_iso_date, TermType};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_optional_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_iso_date(raw).map_err(|e| {
        HandlerErr::bad_params(format!("{}: {}", key, e)).with_details(serde_json::json!({
            "field": key
        }))
    })
}

pub fn parse_term_type(raw: &str) -> Result<TermType, HandlerErr> {
    raw.parse::<TermType>()
        .map_err(|e| HandlerErr::bad_params(e.to_string()))
}

/// Reference date for status checks; the local calendar day unless `params.now` is given.
pub fn reference_date(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match get_optional_str(params, "now")? {
        Some(raw) => parse_date(&raw, "now"),
        None => Ok(Local::now().date_naive()),
    }
}
