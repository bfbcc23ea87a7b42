//! # Field Formatting
//!
//! Pure functions converting raw record fields into display-ready strings.
//! Every missing, empty, or unknown value resolves to the fixed fallback
//! token — never an empty string — so no positioned coordinate ever gets a
//! zero-width render.

use chrono::{Local, Months, NaiveDate};

use crate::layout::FieldRef;
use crate::record::{AddressInput, Record, StructuredAddress};

/// The fixed fallback token for missing values.
pub const FALLBACK: &str = "N/A";

/// Character count past which a formatted address wraps onto a second line.
pub const ADDRESS_WRAP_LIMIT: usize = 60;

/// Line-height multiplier for the wrapped address's second line.
pub const ADDRESS_LINE_HEIGHT: f64 = 1.2;

/// Convert an optional string to display form: trimmed, fallback on empty.
fn display(value: Option<&str>) -> String {
    match value {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => FALLBACK.to_string(),
    }
}

/// Format a single logical field of a record.
pub fn format_field(record: &Record, field: FieldRef) -> String {
    match field {
        FieldRef::UserId => display(Some(record.user_id.as_str())),
        FieldRef::Name => display(record.name.as_deref()),
        FieldRef::FatherName => display(record.father_name.as_deref()),
        FieldRef::NameWithFather => format!(
            "{} S/o {}",
            display(record.name.as_deref()),
            display(record.father_name.as_deref())
        ),
        FieldRef::Age => match record.age {
            Some(age) => age.to_string(),
            None => FALLBACK.to_string(),
        },
        FieldRef::Role => match record.role.as_deref() {
            Some(code) if !code.trim().is_empty() => role_title(code.trim()).to_string(),
            _ => FALLBACK.to_string(),
        },
        FieldRef::Gender => display(record.gender.as_deref()),
        FieldRef::Contact => display(record.contact.as_deref()),
        FieldRef::Email => display(record.email.as_deref()),
        FieldRef::City => display(structured_part(record, |a| a.city.as_deref())),
        FieldRef::State => display(structured_part(record, |a| a.state.as_deref())),
        FieldRef::FullAddress => format_address(record.address.as_ref()),
        FieldRef::AadharCard => display(record.aadhar_card.as_deref()),
        FieldRef::Pancard => display(record.pancard.as_deref()),
        FieldRef::IssueDate => format_date(issue_date()),
        FieldRef::ExpiryDate => format_date(expiry_date(issue_date())),
        FieldRef::Unknown => FALLBACK.to_string(),
    }
}

fn structured_part<'a>(
    record: &'a Record,
    pick: impl Fn(&'a StructuredAddress) -> Option<&'a str>,
) -> Option<&'a str> {
    match record.address.as_ref() {
        Some(AddressInput::Structured(a)) => pick(a),
        _ => None,
    }
}

/// Assemble an address into one formatted line.
///
/// Object form joins the non-empty parts with `", "` in street → city →
/// state → zip → country order; string form trims and passes through, which
/// makes re-formatting an already-formatted line a no-op.
pub fn format_address(address: Option<&AddressInput>) -> String {
    match address {
        Some(AddressInput::Flat(s)) => display(Some(s)),
        Some(AddressInput::Structured(a)) => {
            let parts: Vec<&str> = [
                a.street.as_deref(),
                a.city.as_deref(),
                a.state.as_deref(),
                a.zip_code.as_deref(),
                a.country.as_deref(),
            ]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != FALLBACK)
            .collect();
            if parts.is_empty() {
                FALLBACK.to_string()
            } else {
                parts.join(", ")
            }
        }
        None => FALLBACK.to_string(),
    }
}

/// Wrap a formatted address onto at most two lines.
///
/// Lines longer than [`ADDRESS_WRAP_LIMIT`] characters break at a word
/// boundary; whatever doesn't fit on the second line is dropped. The
/// two-line cap with silent truncation matches the card's fixed address
/// box and is a documented product decision, not something to reflow.
pub fn wrap_address(line: &str) -> (String, Option<String>) {
    if line.chars().count() <= ADDRESS_WRAP_LIMIT {
        return (line.to_string(), None);
    }
    let (first, rest) = split_at_word(line, ADDRESS_WRAP_LIMIT);
    let (second, _overflow) = split_at_word(&rest, ADDRESS_WRAP_LIMIT);
    (first, Some(second))
}

/// Split off up to `limit` chars at a word boundary, hard-splitting only
/// when a single word exceeds the limit.
fn split_at_word(text: &str, limit: usize) -> (String, String) {
    let text = text.trim();
    if text.chars().count() <= limit {
        return (text.to_string(), String::new());
    }
    let head: String = text.chars().take(limit).collect();
    let break_at = match head.rfind(' ') {
        Some(pos) if pos > 0 => pos,
        _ => head.len(),
    };
    let first = text[..break_at].trim_end().to_string();
    let rest = text[break_at..].trim_start().to_string();
    (first, rest)
}

/// Today in the host's local calendar. Issue dates are never stored on the
/// record; they are derived at render time.
pub fn issue_date() -> NaiveDate {
    Local::now().date_naive()
}

/// Exactly one calendar year after the issue date (Feb 29 clamps to Feb 28).
pub fn expiry_date(issue: NaiveDate) -> NaiveDate {
    issue.checked_add_months(Months::new(12)).unwrap_or(issue)
}

/// Day-first display form, `DD/MM/YYYY`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Resolve a role code to its localized title. Codes absent from the table
/// render unchanged.
pub fn role_title(code: &str) -> &str {
    match code {
        // National level
        "rashtriyapramukh" => "राष्ट्रीय प्रमुख",
        "sahpramukh" => "सह प्रमुख",
        "sangathanmantri" => "संगठन मंत्री",
        "sahsangathanmantri" => "सह संगठन मंत्री",
        "koshadhaksh" => "कोषाध्यक्ष",
        "karyalaysachiv" => "कार्यालय सचिव",
        "rashtriyapracharak" => "राष्ट्रीय प्रचारक",
        "sahpracharak" => "सह प्रचारक",
        "mediaprabhari" => "मीडिया प्रभारी",

        // State level
        "pradeshpramukh" => "प्रदेश प्रमुख",
        "pradeshsahpramukh" => "प्रदेश सह प्रमुख",
        "pradeshsangathanmantri" => "प्रदेश संगठन मंत्री",
        "pradeshsahsangathanmantri" => "प्रदेश सह संगठन मंत्री",
        "pradeshkoshadhaksh" => "प्रदेश कोषाध्यक्ष",
        "pradeshkaryalaysachiv" => "प्रदेश कार्यालय सचिव",
        "pradeshpracharak" => "प्रदेश प्रचारक",
        "pradeshsahpracharak" => "प्रदेश सह प्रचारक",
        "pradeshmediaprabhari" => "प्रदेश मीडिया प्रभारी",

        // District level
        "jilapramukh" => "जिला प्रमुख",
        "sahjilapramukh" => "सह जिला प्रमुख",
        "jilasangathanmantri" => "जिला संगठन मंत्री",
        "jilasahsangathanmantri" => "जिला सह संगठन मंत्री",
        "jilakoshadhaksh" => "जिला कोषाध्यक्ष",
        "jilakaryalaysachiv" => "जिला कार्यालय सचिव",
        "jilapracharak" => "जिला प्रचारक",
        "jilasahpracharak" => "जिला सह प्रचारक",
        "districtmediaprabhari" => "जिला मीडिया प्रभारी",

        "member" => "सदस्य",

        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn record_with_address(json: &str) -> Record {
        Record::from_json(&format!(r#"{{"userId": "1", "address": {}}}"#, json)).unwrap()
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let record = Record::new("1");
        for field in [
            FieldRef::Name,
            FieldRef::FatherName,
            FieldRef::Role,
            FieldRef::Gender,
            FieldRef::Contact,
            FieldRef::Email,
            FieldRef::City,
            FieldRef::State,
            FieldRef::FullAddress,
            FieldRef::AadharCard,
            FieldRef::Pancard,
            FieldRef::Age,
            FieldRef::Unknown,
        ] {
            let value = format_field(&record, field);
            assert_eq!(value, FALLBACK, "{:?} should fall back", field);
        }
    }

    #[test]
    fn test_empty_string_falls_back() {
        let record = Record::from_json(r#"{"userId": "1", "name": "   "}"#).unwrap();
        assert_eq!(format_field(&record, FieldRef::Name), FALLBACK);
    }

    #[test]
    fn test_address_joins_non_empty_parts() {
        let record = record_with_address(r#"{"city": "Mathura", "state": "UP"}"#);
        assert_eq!(format_field(&record, FieldRef::FullAddress), "Mathura, UP");
    }

    #[test]
    fn test_address_all_parts_in_order() {
        let record = record_with_address(
            r#"{"street": "12 Temple Rd", "city": "Vrindavan", "state": "UP", "zipCode": "281121", "country": "India"}"#,
        );
        assert_eq!(
            format_field(&record, FieldRef::FullAddress),
            "12 Temple Rd, Vrindavan, UP, 281121, India"
        );
    }

    #[test]
    fn test_format_address_idempotent() {
        let once = format_address(Some(&AddressInput::Structured(StructuredAddress {
            street: Some("12 Temple Rd".into()),
            city: Some("Vrindavan".into()),
            state: Some("UP".into()),
            zip_code: None,
            country: None,
        })));
        let twice = format_address(Some(&AddressInput::Flat(once.clone())));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_structured_address_falls_back() {
        let record = record_with_address(r#"{"street": "", "city": "  "}"#);
        assert_eq!(format_field(&record, FieldRef::FullAddress), FALLBACK);
    }

    #[test]
    fn test_short_address_does_not_wrap() {
        let (first, second) = wrap_address("Mathura, UP");
        assert_eq!(first, "Mathura, UP");
        assert!(second.is_none());
    }

    #[test]
    fn test_long_address_wraps_to_two_lines() {
        let long = "G-02 Lake Beauty Apartment, KR Puram, Bangalore, Karnataka, 560036, India";
        let (first, second) = wrap_address(long);
        assert!(first.chars().count() <= ADDRESS_WRAP_LIMIT);
        let second = second.expect("needs a second line");
        assert!(second.chars().count() <= ADDRESS_WRAP_LIMIT);
        assert!(!second.is_empty());
    }

    #[test]
    fn test_overflow_beyond_two_lines_is_truncated() {
        let word = "x".repeat(50);
        let very_long = format!("{w} {w} {w} {w}", w = word);
        let (first, second) = wrap_address(&very_long);
        let kept = first.chars().count() + second.unwrap().chars().count();
        assert!(kept < very_long.chars().count());
    }

    #[test]
    fn test_expiry_is_one_calendar_year() {
        let issue = NaiveDate::from_ymd_opt(2026, 8, 8).unwrap();
        assert_eq!(expiry_date(issue), NaiveDate::from_ymd_opt(2027, 8, 8).unwrap());

        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(expiry_date(leap), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn test_date_display_is_day_first() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 8).unwrap();
        assert_eq!(format_date(date), "08/08/2026");
    }

    #[test]
    fn test_role_lookup() {
        assert_eq!(role_title("member"), "सदस्य");
        assert_eq!(role_title("jilapramukh"), "जिला प्रमुख");
        // Unknown codes render unchanged, not as an error.
        assert_eq!(role_title("volunteer"), "volunteer");
    }

    #[test]
    fn test_name_with_father_composite() {
        let record = Record::from_json(
            r#"{"userId": "1", "name": "Rajesh Kumar", "fatherName": "Nagesh Kumar"}"#,
        )
        .unwrap();
        assert_eq!(
            format_field(&record, FieldRef::NameWithFather),
            "Rajesh Kumar S/o Nagesh Kumar"
        );
    }
}
