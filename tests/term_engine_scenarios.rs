#[path = "../src/terms.rs"]
mod terms;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use terms::*;

fn d(s: &str) -> NaiveDate {
    parse_iso_date(s).expect("valid date")
}

fn term(id: &str, session: &str, term_type: TermType) -> Term {
    Term {
        id: id.to_string(),
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
fn mid_term_day_is_current_and_span_is_ninety_days() {
    let t = term("t1", "2023/2024", TermType::Second);
    assert_eq!(get_term_status(&t, d("2024-02-15")), TermStatus::Current);
    assert_eq!(get_term_status_color(&t, d("2024-02-15")), StatusColor::Green);
    assert_eq!(get_term_duration(&t), 90);
    assert_eq!(get_term_status_color(&t, d("2023-11-01")), StatusColor::Blue);
}

#[test]
fn reversed_dates_are_rejected() {
    let errors = validate_term_dates(d("2024-03-31"), d("2024-01-01"));
    assert!(errors.contains(&"End date must be after start date".to_string()));
    assert!(errors.contains(&"Term duration must be at least 30 days".to_string()));
}

#[test]
fn duration_outside_policy_is_always_rejected() {
    let start = d("2024-01-01");
    for days in [0i64, 1, 29, 151, 200] {
        let end = start + chrono::Duration::days(days);
        let t = Term {
            end_date: end,
            ..term("x", "2023/2024", TermType::First)
        };
        assert_eq!(get_term_duration(&t), days);
        let errors = validate_term_dates(start, end);
        assert!(
            errors.iter().any(|e| e.starts_with("Term duration")),
            "{} days accepted",
            days
        );
    }
    for days in [30i64, 90, 150] {
        assert!(validate_term_dates(start, start + chrono::Duration::days(days)).is_empty());
    }
}

#[test]
fn non_consecutive_session_is_rejected() {
    let errors = validate_academic_session("2024/2026");
    assert!(errors.contains(&"Academic session must span consecutive years".to_string()));
}

#[test]
fn bare_year_session_fails_format() {
    let errors = validate_academic_session("2024");
    assert_eq!(
        errors,
        vec!["Academic session must be in format YYYY/YYYY or YYYY-YYYY".to_string()]
    );
}

#[test]
fn sort_orders_latest_session_then_term_type() {
    let input = vec![
        term("a", "2023/2024", TermType::Second),
        term("b", "2024/2025", TermType::First),
        term("c", "2023/2024", TermType::Third),
        term("d", "2023/2024", TermType::First),
    ];
    let sorted = sort_terms(&input);
    let order: Vec<(&str, TermType)> = sorted
        .iter()
        .map(|t| (t.academic_session.as_str(), t.term_type))
        .collect();
    assert_eq!(
        order,
        vec![
            ("2024/2025", TermType::First),
            ("2023/2024", TermType::First),
            ("2023/2024", TermType::Second),
            ("2023/2024", TermType::Third),
        ]
    );
    let ids: Vec<&str> = input.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
}

#[test]
fn sort_is_stable_for_equal_keys() {
    let input = vec![
        term("first", "2023/2024", TermType::First),
        term("second", "2023/2024", TermType::First),
    ];
    let ids: Vec<String> = sort_terms(&input).into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn current_term_lookup() {
    let mut terms = vec![
        term("a", "2023/2024", TermType::First),
        term("b", "2023/2024", TermType::Second),
    ];
    assert!(get_current_term(&terms).is_none());

    terms[1].is_current = true;
    assert_eq!(get_current_term(&terms).map(|t| t.id.as_str()), Some("b"));

    // Inconsistent data: the first flagged term wins.
    terms[0].is_current = true;
    assert_eq!(get_current_term(&terms).map(|t| t.id.as_str()), Some("a"));
}

#[test]
fn active_filter_keeps_order() {
    let mut terms = vec![
        term("a", "2023/2024", TermType::First),
        term("b", "2023/2024", TermType::Second),
        term("c", "2023/2024", TermType::Third),
    ];
    terms[1].is_active = false;
    let ids: Vec<&str> = get_active_terms(&terms).into_iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[test]
fn current_flag_blocks_delete_regardless_of_dates() {
    let mut t = term("a", "2020/2021", TermType::First);
    t.is_current = true;
    for now in ["2019-01-01", "2024-02-01", "2030-01-01"] {
        let check = can_delete_term(&t, d(now));
        assert_eq!(
            check,
            DeleteCheck {
                can_delete: false,
                reason: Some("Cannot delete the current term".to_string()),
            }
        );
    }
}

#[test]
fn date_active_term_blocks_delete() {
    let t = term("a", "2023/2024", TermType::Second);
    let check = can_delete_term(&t, d("2024-03-31"));
    assert!(!check.can_delete);
    assert_eq!(check.reason.as_deref(), Some("Cannot delete an active term"));

    let check = can_delete_term(&t, d("2024-04-01"));
    assert!(check.can_delete);
    assert_eq!(check.reason, None);
}

#[test]
fn set_current_gate() {
    let mut t = term("a", "2023/2024", TermType::First);
    assert!(can_set_as_current(&t).can_set);

    t.is_active = false;
    assert_eq!(
        can_set_as_current(&t).reason.as_deref(),
        Some("Cannot set inactive term as current")
    );

    t.is_current = true;
    assert_eq!(
        can_set_as_current(&t).reason.as_deref(),
        Some("Term is already current")
    );
}

#[test]
fn labels() {
    assert_eq!(format_term_type(TermType::First), "First Term");
    assert_eq!(format_term_type(TermType::Second), "Second Term");
    assert_eq!(format_term_type(TermType::Third), "Third Term");
    assert_eq!(format_date(d("2024-12-25")), "December 25, 2024");
}
