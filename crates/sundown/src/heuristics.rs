//! Flag-id and graduation-date heuristics.
//!
//! Flag ids must be hyphenated RFC4122 UUIDs (case-insensitive). Graduation
//! dates come either from a quoted literal in the activation call or from free
//! text in comments attached to the declaration. Comment scanning is a
//! heuristic: comment formats are free text, so missed dates are expected and
//! an unintended substring that parses as a date is an accepted risk.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

/// Date formats accepted for both call arguments and comment tokens.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// Candidate date-shaped substrings pulled out of free text before
/// calendar validation.
static DATE_TOKEN: OnceLock<Regex> = OnceLock::new();

fn date_token() -> &'static Regex {
    DATE_TOKEN.get_or_init(|| {
        Regex::new(
            r"\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}/\d{1,2}/\d{4}|[A-Z][A-Za-z]{2,8} \d{1,2}, \d{4}|\d{1,2} [A-Z][A-Za-z]{2,8} \d{4}",
        )
        .expect("Date token regex compilation failed — this is a bug in the hardcoded pattern")
    })
}

/// Returns `true` if `s` is a structurally valid flag id: the hyphenated
/// 8-4-4-4-12 RFC4122 form, any case.
///
/// The 32-character unhyphenated form is rejected — kill-switch keys are
/// always written hyphenated.
pub fn is_valid_flag_id(s: &str) -> bool {
    s.len() == 36 && Uuid::parse_str(s).is_ok()
}

/// Parses a literal as a calendar date under the accepted formats.
///
/// Invalid calendar dates (`2023-13-40`) return `None`.
pub fn parse_date_literal(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Finds the first substring of `text` that parses as a valid calendar date.
///
/// Date-shaped tokens that fail calendar validation are skipped, so scanning
/// continues past them.
pub fn first_date_in_text(text: &str) -> Option<NaiveDate> {
    date_token()
        .find_iter(text)
        .find_map(|m| parse_date_literal(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_flag_id() {
        assert!(is_valid_flag_id("3fa85f64-5717-4562-b3fc-2c963f66afa6"));
        assert!(is_valid_flag_id("3FA85F64-5717-4562-B3FC-2C963F66AFA6"));
    }

    #[test]
    fn test_invalid_flag_id() {
        assert!(!is_valid_flag_id("not-a-uuid"));
        assert!(!is_valid_flag_id(""));
        // Unhyphenated 32-char form is not accepted.
        assert!(!is_valid_flag_id("3fa85f6457174562b3fc2c963f66afa6"));
        // Wrong group lengths.
        assert!(!is_valid_flag_id("3fa85f64-5717-4562-b3fc-2c963f66afa"));
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_date_literal("2023-01-01"),
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );
    }

    #[test]
    fn test_parse_slash_dates() {
        assert_eq!(
            parse_date_literal("2023/06/15"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(
            parse_date_literal("6/15/2023"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
    }

    #[test]
    fn test_parse_month_name_dates() {
        assert_eq!(
            parse_date_literal("Jan 5, 2023"),
            NaiveDate::from_ymd_opt(2023, 1, 5)
        );
        assert_eq!(
            parse_date_literal("March 5, 2023"),
            NaiveDate::from_ymd_opt(2023, 3, 5)
        );
        assert_eq!(
            parse_date_literal("5 Mar 2023"),
            NaiveDate::from_ymd_opt(2023, 3, 5)
        );
    }

    #[test]
    fn test_parse_rejects_invalid_calendar_date() {
        assert_eq!(parse_date_literal("2023-13-40"), None);
        assert_eq!(parse_date_literal("graduated"), None);
    }

    #[test]
    fn test_first_date_in_comment_text() {
        let comment = "// Kill switch graduated on 2022-11-30, safe to remove.";
        assert_eq!(
            first_date_in_text(comment),
            NaiveDate::from_ymd_opt(2022, 11, 30)
        );
    }

    #[test]
    fn test_first_date_wins() {
        let comment = "graduated 2021-03-01, revisit 2024-01-01";
        assert_eq!(
            first_date_in_text(comment),
            NaiveDate::from_ymd_opt(2021, 3, 1)
        );
    }

    #[test]
    fn test_invalid_token_skipped_for_later_valid_date() {
        let comment = "ticket 9999-99-99 closed 2022-05-01";
        assert_eq!(
            first_date_in_text(comment),
            NaiveDate::from_ymd_opt(2022, 5, 1)
        );
    }

    #[test]
    fn test_no_date_in_text() {
        assert_eq!(first_date_in_text("// plain old comment"), None);
    }
}
