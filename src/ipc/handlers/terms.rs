use crate::db::{self, NewTerm, TermPatch};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_str, parse_date, parse_term_type,
    reference_date, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::terms::{
    can_delete_term, can_set_as_current, format_academic_session, get_active_terms,
    get_current_term, group_terms_by_session, sort_terms, validate_academic_session,
    validate_term_dates, Term, TermView,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

fn load_term(conn: &Connection, term_id: &str) -> Result<Term, HandlerErr> {
    db::get_term(conn, term_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "term not found")
                .with_details(json!({ "termId": term_id }))
        })
}

fn load_all(conn: &Connection) -> Result<Vec<Term>, HandlerErr> {
    db::list_terms(conn).map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn views(terms: Vec<Term>, now: NaiveDate) -> Vec<TermView> {
    terms.into_iter().map(|t| TermView::new(t, now)).collect()
}

struct Validation {
    date_errors: Vec<String>,
    session_errors: Vec<String>,
}

impl Validation {
    fn run(start: NaiveDate, end: NaiveDate, session: &str) -> Self {
        Self {
            date_errors: validate_term_dates(start, end),
            session_errors: validate_academic_session(session),
        }
    }

    fn is_valid(&self) -> bool {
        self.date_errors.is_empty() && self.session_errors.is_empty()
    }

    fn into_err(self) -> HandlerErr {
        let errors: Vec<String> = self
            .date_errors
            .iter()
            .chain(self.session_errors.iter())
            .cloned()
            .collect();
        HandlerErr::new("validation_failed", errors.join("; ")).with_details(json!({
            "errors": errors,
            "dateErrors": self.date_errors,
            "sessionErrors": self.session_errors,
        }))
    }
}

fn not_allowed(reason: Option<String>) -> HandlerErr {
    let reason = reason.unwrap_or_default();
    HandlerErr::new("not_allowed", reason.clone()).with_details(json!({ "reason": reason }))
}

fn terms_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let active_only = get_optional_bool(params, "activeOnly")?.unwrap_or(false);
    let sorted = get_optional_bool(params, "sorted")?.unwrap_or(true);

    let mut terms = load_all(conn)?;
    if active_only {
        terms = get_active_terms(&terms).into_iter().cloned().collect();
    }
    if sorted {
        terms = sort_terms(&terms);
    }
    Ok(json!({ "terms": views(terms, now) }))
}

fn terms_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let term_id = get_required_str(params, "termId")?;
    let term = load_term(conn, &term_id)?;
    Ok(json!({ "term": TermView::new(term, now) }))
}

fn terms_current(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let terms = load_all(conn)?;
    let current = get_current_term(&terms).cloned().map(|t| TermView::new(t, now));
    Ok(json!({ "term": current }))
}

fn terms_grouped(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let sorted = sort_terms(&load_all(conn)?);
    let sessions: Vec<serde_json::Value> = group_terms_by_session(&sorted)
        .into_iter()
        .map(|g| {
            json!({
                "label": format_academic_session(&g.session),
                "session": g.session,
                "terms": views(g.terms, now),
            })
        })
        .collect();
    Ok(json!({ "sessions": sessions }))
}

fn terms_validate(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let start = parse_date(&get_required_str(params, "startDate")?, "startDate")?;
    let end = parse_date(&get_required_str(params, "endDate")?, "endDate")?;
    let session = get_optional_str(params, "academicSession")?.unwrap_or_default();
    let v = Validation::run(start, end, &session);
    Ok(json!({
        "valid": v.is_valid(),
        "dateErrors": v.date_errors,
        "sessionErrors": v.session_errors,
    }))
}

fn terms_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let term_type = parse_term_type(&get_required_str(params, "type")?)?;
    let session = get_optional_str(params, "academicSession")?.unwrap_or_default();
    let start = parse_date(&get_required_str(params, "startDate")?, "startDate")?;
    let end = parse_date(&get_required_str(params, "endDate")?, "endDate")?;
    let is_active = get_optional_bool(params, "isActive")?.unwrap_or(true);

    let v = Validation::run(start, end, &session);
    if !v.is_valid() {
        return Err(v.into_err());
    }

    let term = db::insert_term(
        conn,
        &NewTerm {
            name,
            term_type,
            academic_session: session.trim().to_string(),
            start_date: start,
            end_date: end,
            is_active,
        },
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "terms" })))?;
    tracing::info!(term_id = %term.id, session = %term.academic_session, "term created");
    Ok(json!({ "termId": term.id.clone(), "term": TermView::new(term, now) }))
}

const PATCH_FIELDS: [&str; 5] = ["name", "type", "academicSession", "startDate", "endDate"];

fn parse_patch(patch: &serde_json::Value) -> Result<TermPatch, HandlerErr> {
    let Some(fields) = patch.as_object() else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    for key in fields.keys() {
        let hint = match key.as_str() {
            k if PATCH_FIELDS.contains(&k) => continue,
            "isCurrent" => "use terms.setCurrent to change the current term",
            "isActive" => "use terms.setActive to change the active flag",
            _ => "unknown field",
        };
        return Err(
            HandlerErr::bad_params(format!("patch.{}: {}", key, hint)).with_details(json!({
                "field": key,
                "allowed": PATCH_FIELDS,
            })),
        );
    }
    let name = match get_optional_str(patch, "name")? {
        Some(v) if v.trim().is_empty() => {
            return Err(HandlerErr::bad_params("name must not be empty"))
        }
        other => other.map(|v| v.trim().to_string()),
    };
    Ok(TermPatch {
        name,
        term_type: get_optional_str(patch, "type")?
            .map(|v| parse_term_type(&v))
            .transpose()?,
        academic_session: get_optional_str(patch, "academicSession")?.map(|v| v.trim().to_string()),
        start_date: get_optional_str(patch, "startDate")?
            .map(|v| parse_date(&v, "startDate"))
            .transpose()?,
        end_date: get_optional_str(patch, "endDate")?
            .map(|v| parse_date(&v, "endDate"))
            .transpose()?,
    })
}

fn terms_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let term_id = get_required_str(params, "termId")?;
    let patch = parse_patch(params.get("patch").unwrap_or(&serde_json::Value::Null))?;
    let existing = load_term(conn, &term_id)?;
    if patch.is_empty() {
        return Ok(json!({ "term": TermView::new(existing, now) }));
    }

    let merged = patch.apply(&existing);
    let v = Validation::run(merged.start_date, merged.end_date, &merged.academic_session);
    if !v.is_valid() {
        return Err(v.into_err());
    }

    let updated =
        db::update_term(conn, &merged).map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tracing::info!(term_id = %updated.id, "term updated");
    Ok(json!({ "term": TermView::new(updated, now) }))
}

fn terms_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let term_id = get_required_str(params, "termId")?;
    let term = load_term(conn, &term_id)?;

    let check = can_delete_term(&term, now);
    if !check.can_delete {
        tracing::info!(term_id = %term_id, reason = ?check.reason, "term delete refused");
        return Err(not_allowed(check.reason));
    }

    db::delete_term(conn, &term_id).map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tracing::info!(term_id = %term_id, "term deleted");
    Ok(json!({ "termId": term_id, "deleted": true }))
}

fn terms_set_current(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let term_id = get_required_str(params, "termId")?;
    let term = load_term(conn, &term_id)?;

    let check = can_set_as_current(&term);
    if !check.can_set {
        tracing::info!(term_id = %term_id, reason = ?check.reason, "set current refused");
        return Err(not_allowed(check.reason));
    }

    db::set_current_term(conn, &term_id).map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tracing::info!(term_id = %term_id, "current term changed");
    let term = load_term(conn, &term_id)?;
    Ok(json!({ "term": TermView::new(term, now) }))
}

fn terms_set_active(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let term_id = get_required_str(params, "termId")?;
    let active = get_optional_bool(params, "active")?
        .ok_or_else(|| HandlerErr::bad_params("missing active"))?;

    let changed = db::set_term_active(conn, &term_id, active)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    if !changed {
        return Err(HandlerErr::new("not_found", "term not found")
            .with_details(json!({ "termId": term_id })));
    }
    tracing::info!(term_id = %term_id, active, "term active flag changed");
    let term = load_term(conn, &term_id)?;
    Ok(json!({ "term": TermView::new(term, now) }))
}

fn terms_can_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = reference_date(params)?;
    let term = load_term(conn, &get_required_str(params, "termId")?)?;
    Ok(json!(can_delete_term(&term, now)))
}

fn terms_can_set_current(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let term = load_term(conn, &get_required_str(params, "termId")?)?;
    Ok(json!(can_set_as_current(&term)))
}

fn respond(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn with_db(
    state: &AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let result = require_db(state).and_then(|conn| f(conn, &req.params));
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "terms.list" => with_db(state, req, terms_list),
        "terms.get" => with_db(state, req, terms_get),
        "terms.current" => with_db(state, req, terms_current),
        "terms.grouped" => with_db(state, req, terms_grouped),
        "terms.validate" => respond(req, terms_validate(&req.params)),
        "terms.create" => with_db(state, req, terms_create),
        "terms.update" => with_db(state, req, terms_update),
        "terms.delete" => with_db(state, req, terms_delete),
        "terms.setCurrent" => with_db(state, req, terms_set_current),
        "terms.setActive" => with_db(state, req, terms_set_active),
        "terms.canDelete" => with_db(state, req, terms_can_delete),
        "terms.canSetCurrent" => with_db(state, req, terms_can_set_current),
        _ => return None,
    };
    Some(resp)
}
