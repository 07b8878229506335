use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_TERM_YEAR: i32 = 2020;
pub const MAX_TERM_YEAR: i32 = 2030;
pub const MIN_TERM_DAYS: i64 = 30;
pub const MAX_TERM_DAYS: i64 = 150;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TermError {
    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("unknown term type '{value}', expected FIRST, SECOND or THIRD")]
    UnknownTermType { value: String },
}

/// Ordinal position of a term inside its academic session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermType {
    First,
    Second,
    Third,
}

impl TermType {
    pub fn as_str(self) -> &'static str {
        match self {
            TermType::First => "FIRST",
            TermType::Second => "SECOND",
            TermType::Third => "THIRD",
        }
    }
}

impl FromStr for TermType {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIRST" => Ok(TermType::First),
            "SECOND" => Ok(TermType::Second),
            "THIRD" => Ok(TermType::Third),
            _ => Err(TermError::UnknownTermType {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub term_type: TermType,
    pub academic_session: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
    pub is_active: bool,
}

/// Date-derived classification. Unrelated to the administrative `is_current` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermStatus {
    Current,
    Upcoming,
    Past,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Blue,
    Gray,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCheck {
    pub can_delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentCheck {
    pub can_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGroup {
    pub session: String,
    pub terms: Vec<Term>,
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, TermError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| TermError::InvalidDate {
        value: raw.to_string(),
    })
}

pub fn format_term_type(term_type: TermType) -> &'static str {
    match term_type {
        TermType::First => "First Term",
        TermType::Second => "Second Term",
        TermType::Third => "Third Term",
    }
}

pub fn format_academic_session(session: &str) -> String {
    session.replace('-', "/")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub fn format_date_range(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} - {}", format_date(start), format_date(end))
}

pub fn get_term_status(term: &Term, now: NaiveDate) -> TermStatus {
    if now >= term.start_date && now <= term.end_date {
        TermStatus::Current
    } else if now < term.start_date {
        TermStatus::Upcoming
    } else {
        TermStatus::Past
    }
}

pub fn get_term_status_color(term: &Term, now: NaiveDate) -> StatusColor {
    match get_term_status(term, now) {
        TermStatus::Current => StatusColor::Green,
        TermStatus::Upcoming => StatusColor::Blue,
        TermStatus::Past => StatusColor::Gray,
    }
}

fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days()
}

pub fn get_term_duration(term: &Term) -> i64 {
    days_between(term.start_date, term.end_date)
}

/// Every check runs; callers show all messages next to the date fields.
pub fn validate_term_dates(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut errors = Vec::new();
    let duration = days_between(start, end);

    if end <= start {
        errors.push("End date must be after start date".to_string());
    }
    if start.year() < MIN_TERM_YEAR {
        errors.push("Start date cannot be before 2020".to_string());
    }
    if end.year() > MAX_TERM_YEAR {
        errors.push("End date cannot be after 2030".to_string());
    }
    if duration < MIN_TERM_DAYS {
        errors.push("Term duration must be at least 30 days".to_string());
    }
    if duration > MAX_TERM_DAYS {
        errors.push("Term duration cannot exceed 150 days".to_string());
    }

    errors
}

fn parse_session_years(session: &str) -> Option<(i32, i32)> {
    let bytes = session.as_bytes();
    if bytes.len() != 9 || !(bytes[4] == b'/' || bytes[4] == b'-') {
        return None;
    }
    let (first, second) = (&session[..4], &session[5..]);
    if !first.bytes().all(|b| b.is_ascii_digit()) || !second.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((first.parse().ok()?, second.parse().ok()?))
}

pub fn validate_academic_session(session: &str) -> Vec<String> {
    let trimmed = session.trim();
    if trimmed.is_empty() {
        return vec!["Academic session is required".to_string()];
    }
    let Some((first, second)) = parse_session_years(trimmed) else {
        return vec!["Academic session must be in format YYYY/YYYY or YYYY-YYYY".to_string()];
    };

    let mut errors = Vec::new();
    if second != first + 1 {
        errors.push("Academic session must span consecutive years".to_string());
    }
    let in_range = |y: i32| (MIN_TERM_YEAR..=MAX_TERM_YEAR).contains(&y);
    if !in_range(first) || !in_range(second) {
        errors.push("Academic session year must be between 2020 and 2030".to_string());
    }
    errors
}

fn compare_terms(a: &Term, b: &Term) -> Ordering {
    b.academic_session
        .cmp(&a.academic_session)
        .then_with(|| a.term_type.cmp(&b.term_type))
}

/// Latest session first, then FIRST, SECOND, THIRD. Stable.
pub fn sort_terms(terms: &[Term]) -> Vec<Term> {
    let mut sorted = terms.to_vec();
    sorted.sort_by(compare_terms);
    sorted
}

/// First match wins if the data carries more than one current flag.
pub fn get_current_term(terms: &[Term]) -> Option<&Term> {
    terms.iter().find(|t| t.is_current)
}

pub fn get_active_terms(terms: &[Term]) -> Vec<&Term> {
    terms.iter().filter(|t| t.is_active).collect()
}

/// Groups keep first-appearance order; the session key is not normalized.
pub fn group_terms_by_session(terms: &[Term]) -> Vec<SessionGroup> {
    let mut groups: Vec<SessionGroup> = Vec::new();
    for term in terms {
        match groups
            .iter_mut()
            .find(|g| g.session == term.academic_session)
        {
            Some(group) => group.terms.push(term.clone()),
            None => groups.push(SessionGroup {
                session: term.academic_session.clone(),
                terms: vec![term.clone()],
            }),
        }
    }
    groups
}

pub fn can_delete_term(term: &Term, now: NaiveDate) -> DeleteCheck {
    if term.is_current {
        return DeleteCheck {
            can_delete: false,
            reason: Some("Cannot delete the current term".to_string()),
        };
    }
    if get_term_status(term, now) == TermStatus::Current {
        return DeleteCheck {
            can_delete: false,
            reason: Some("Cannot delete an active term".to_string()),
        };
    }
    DeleteCheck {
        can_delete: true,
        reason: None,
    }
}

pub fn can_set_as_current(term: &Term) -> SetCurrentCheck {
    if term.is_current {
        return SetCurrentCheck {
            can_set: false,
            reason: Some("Term is already current".to_string()),
        };
    }
    if !term.is_active {
        return SetCurrentCheck {
            can_set: false,
            reason: Some("Cannot set inactive term as current".to_string()),
        };
    }
    SetCurrentCheck {
        can_set: true,
        reason: None,
    }
}

/// A term together with everything a UI derives from it for a given day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermView {
    #[serde(flatten)]
    pub term: Term,
    pub type_label: &'static str,
    pub session_label: String,
    pub status: TermStatus,
    pub status_color: StatusColor,
    pub duration_days: i64,
    pub date_range: String,
    pub delete_check: DeleteCheck,
    pub set_current_check: SetCurrentCheck,
}

impl TermView {
    pub fn new(term: Term, now: NaiveDate) -> Self {
        Self {
            type_label: format_term_type(term.term_type),
            session_label: format_academic_session(&term.academic_session),
            status: get_term_status(&term, now),
            status_color: get_term_status_color(&term, now),
            duration_days: get_term_duration(&term),
            date_range: format_date_range(term.start_date, term.end_date),
            delete_check: can_delete_term(&term, now),
            set_current_check: can_set_as_current(&term),
            term,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_iso_date(s).expect("valid test date")
    }

    fn term(session: &str, term_type: TermType) -> Term {
        Term {
            id: format!("{}-{}", session, term_type.as_str()),
            name: format_term_type(term_type).to_string(),
            term_type,
            academic_session: session.to_string(),
            start_date: d("2024-01-01"),
            end_date: d("2024-03-31"),
            is_current: false,
            is_active: true,
        }
    }

    #[test]
    fn status_boundaries_are_inclusive() {
        let t = term("2023/2024", TermType::Second);
        assert_eq!(get_term_status(&t, d("2024-01-01")), TermStatus::Current);
        assert_eq!(get_term_status(&t, d("2024-03-31")), TermStatus::Current);
        assert_eq!(get_term_status(&t, d("2023-12-31")), TermStatus::Upcoming);
        assert_eq!(get_term_status(&t, d("2024-04-01")), TermStatus::Past);
        assert_eq!(get_term_status_color(&t, d("2024-04-01")), StatusColor::Gray);
    }

    #[test]
    fn status_ignores_current_flag() {
        let mut t = term("2023/2024", TermType::Second);
        t.is_current = true;
        assert_eq!(get_term_status(&t, d("2025-01-01")), TermStatus::Past);
    }

    #[test]
    fn date_validation_reports_every_failure() {
        let errors = validate_term_dates(d("2019-06-01"), d("2019-06-10"));
        assert_eq!(
            errors,
            vec![
                "Start date cannot be before 2020".to_string(),
                "Term duration must be at least 30 days".to_string(),
            ]
        );

        let errors = validate_term_dates(d("2030-09-01"), d("2031-03-01"));
        assert!(errors.contains(&"End date cannot be after 2030".to_string()));
        assert!(errors.contains(&"Term duration cannot exceed 150 days".to_string()));

        assert!(validate_term_dates(d("2024-09-02"), d("2024-12-20")).is_empty());
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        assert!(validate_term_dates(d("2024-01-01"), d("2024-01-31")).is_empty());
        assert_eq!(
            validate_term_dates(d("2024-01-01"), d("2024-01-30")),
            vec!["Term duration must be at least 30 days".to_string()]
        );
        assert!(validate_term_dates(d("2024-01-01"), d("2024-05-30")).is_empty());
        assert_eq!(
            validate_term_dates(d("2024-01-01"), d("2024-05-31")),
            vec!["Term duration cannot exceed 150 days".to_string()]
        );
    }

    #[test]
    fn session_validation_order() {
        assert_eq!(
            validate_academic_session("   "),
            vec!["Academic session is required".to_string()]
        );
        assert_eq!(
            validate_academic_session("2024_2025"),
            vec!["Academic session must be in format YYYY/YYYY or YYYY-YYYY".to_string()]
        );
        assert_eq!(
            validate_academic_session("2031/2033"),
            vec![
                "Academic session must span consecutive years".to_string(),
                "Academic session year must be between 2020 and 2030".to_string(),
            ]
        );
        assert_eq!(
            validate_academic_session("2030-2031"),
            vec!["Academic session year must be between 2020 and 2030".to_string()]
        );
        assert!(validate_academic_session("2024-2025").is_empty());
    }

    #[test]
    fn format_session_is_idempotent() {
        let once = format_academic_session("2024-2025");
        assert_eq!(once, "2024/2025");
        assert_eq!(format_academic_session(&once), once);
    }

    #[test]
    fn long_date_format() {
        assert_eq!(format_date(d("2024-01-01")), "January 1, 2024");
        assert_eq!(
            format_date_range(d("2024-09-02"), d("2024-12-20")),
            "September 2, 2024 - December 20, 2024"
        );
    }

    #[test]
    fn sort_is_idempotent_and_leaves_input() {
        let input = vec![
            term("2022/2023", TermType::Third),
            term("2023/2024", TermType::First),
            term("2022/2023", TermType::First),
        ];
        let once = sort_terms(&input);
        assert_eq!(sort_terms(&once), once);
        assert_eq!(input[0].academic_session, "2022/2023");
        assert_eq!(once[0].id, "2023/2024-FIRST");
    }

    #[test]
    fn grouping_keeps_raw_keys_and_order() {
        let terms = vec![
            term("2024-2025", TermType::Second),
            term("2024/2025", TermType::First),
            term("2024-2025", TermType::First),
        ];
        let groups = group_terms_by_session(&terms);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].session, "2024-2025");
        let types: Vec<TermType> = groups[0].terms.iter().map(|t| t.term_type).collect();
        assert_eq!(types, vec![TermType::Second, TermType::First]);
    }

    #[test]
    fn parse_helpers_reject_garbage() {
        assert!(matches!(
            parse_iso_date("31/01/2024"),
            Err(TermError::InvalidDate { .. })
        ));
        assert_eq!("second".parse::<TermType>(), Ok(TermType::Second));
        assert!("FOURTH".parse::<TermType>().is_err());
    }

    #[test]
    fn view_serializes_flat_camel_case() {
        let view = TermView::new(term("2023/2024", TermType::First), d("2024-02-15"));
        let v = serde_json::to_value(&view).expect("serialize view");
        assert_eq!(v["type"], "FIRST");
        assert_eq!(v["academicSession"], "2023/2024");
        assert_eq!(v["startDate"], "2024-01-01");
        assert_eq!(v["status"], "current");
        assert_eq!(v["statusColor"], "green");
        assert_eq!(v["durationDays"], 90);
        assert_eq!(v["deleteCheck"]["canDelete"], false);
        assert_eq!(v["deleteCheck"]["reason"], "Cannot delete an active term");
        assert_eq!(v["setCurrentCheck"]["canSet"], true);
        assert!(v["setCurrentCheck"].get("reason").is_none());
    }
}
