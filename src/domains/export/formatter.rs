//! Per-value formatting shared by the CSV, Excel and PDF exporters

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::domains::export::types::{CsvOptions, FieldValue};

/// Typed cell content for the workbook builder
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
}

fn iso_date_regex() -> &'static Regex {
    static ISO_DATE_REGEX: OnceLock<Regex> = OnceLock::new();
    ISO_DATE_REGEX.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn iso_datetime_regex() -> &'static Regex {
    static ISO_DATETIME_REGEX: OnceLock<Regex> = OnceLock::new();
    ISO_DATETIME_REGEX.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}").unwrap())
}

fn us_date_regex() -> &'static Regex {
    static US_DATE_REGEX: OnceLock<Regex> = OnceLock::new();
    US_DATE_REGEX.get_or_init(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap())
}

/// Recognize `YYYY-MM-DD`, ISO-8601 timestamps and `MM/DD/YYYY`.
/// Returns None when the text only looks like a date.
pub fn parse_date_string(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if iso_date_regex().is_match(value) {
        return NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }

    if iso_datetime_regex().is_match(value) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc).naive_utc());
        }
        return ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok());
    }

    if us_date_regex().is_match(value) {
        return NaiveDate::parse_from_str(value, "%m/%d/%Y")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }

    None
}

/// Plain number rendering: integral values print without a fraction
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// en-US style number: thousands grouping, at most three fraction digits
pub fn format_locale_number(value: f64) -> String {
    if !value.is_finite() {
        return format_number(value);
    }

    let rounded = format!("{:.3}", value.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let is_zero = int_part.chars().all(|c| c == '0') && frac_part.is_empty();
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };

    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

/// en-US short date, e.g. 1/15/2024
pub fn format_locale_date(value: &DateTime<Utc>) -> String {
    value.format("%-m/%-d/%Y").to_string()
}

fn json_to_string(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// CSV cell text. Quoting is left to the CSV writer.
pub fn format_csv_value(value: &FieldValue, options: &CsvOptions) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::String(s) => s.clone(),
        FieldValue::Number(n) => format_number(*n),
        FieldValue::Boolean(true) => options.true_value.clone(),
        FieldValue::Boolean(false) => options.false_value.clone(),
        FieldValue::Date(dt) => match &options.date_format {
            Some(fmt) => dt.format(fmt).to_string(),
            None => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
        FieldValue::Json(json) => json_to_string(json),
    }
}

/// Typed workbook cell. Date-like strings become native dates.
pub fn format_excel_value(value: &FieldValue) -> CellValue {
    match value {
        FieldValue::Null => CellValue::Blank,
        FieldValue::String(s) => match parse_date_string(s) {
            Some(dt) => CellValue::Date(dt),
            None => CellValue::Text(s.clone()),
        },
        FieldValue::Number(n) if n.is_finite() => CellValue::Number(*n),
        FieldValue::Number(n) => CellValue::Text(format_number(*n)),
        FieldValue::Boolean(b) => CellValue::Boolean(*b),
        FieldValue::Date(dt) => CellValue::Date(dt.naive_utc()),
        FieldValue::Json(json) => CellValue::Text(json_to_string(json)),
    }
}

/// Display text for the PDF report
pub fn format_pdf_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::String(s) => s.clone(),
        FieldValue::Number(n) => format_locale_number(*n),
        FieldValue::Boolean(true) => "Yes".to_string(),
        FieldValue::Boolean(false) => "No".to_string(),
        FieldValue::Date(dt) => format_locale_date(dt),
        FieldValue::Json(json) => json_to_string(json),
    }
}

/// Plain string form used for width estimates and distinct counts
pub fn display_length(value: &FieldValue) -> usize {
    match value {
        FieldValue::Null => 0,
        FieldValue::String(s) => s.chars().count(),
        FieldValue::Number(n) => format_number(*n).len(),
        FieldValue::Boolean(b) => b.to_string().len(),
        FieldValue::Date(_) => 10,
        FieldValue::Json(json) => json_to_string(json).chars().count(),
    }
}

pub fn value_key(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::String(s) => s.clone(),
        FieldValue::Number(n) => format_number(*n),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::Date(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        FieldValue::Json(json) => json_to_string(json),
    }
}

/// `resourceType` -> `Resource Type`, `vpc_id` -> `Vpc Id`
pub fn title_case(field: &str) -> String {
    let chars: Vec<char> = field.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if matches!(ch, '_' | '-' | ' ' | '.') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|c| c.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("id"), "Id");
        assert_eq!(title_case("resourceType"), "Resource Type");
        assert_eq!(title_case("vpc_id"), "Vpc Id");
        assert_eq!(title_case("transit-gateway-id"), "Transit Gateway Id");
        assert_eq!(title_case("VPCId"), "VPC Id");
        assert_eq!(title_case("cidr4Block"), "Cidr4 Block");
        assert_eq!(title_case("already Titled"), "Already Titled");
    }

    #[test]
    fn test_parse_date_string() {
        let d = parse_date_string("2024-01-15").unwrap();
        assert_eq!(d.to_string(), "2024-01-15 00:00:00");

        let d = parse_date_string("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(d.to_string(), "2024-01-15 10:30:00");

        let d = parse_date_string("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(d.to_string(), "2024-01-15 08:30:00");

        let d = parse_date_string("2024-01-15T10:30").unwrap();
        assert_eq!(d.to_string(), "2024-01-15 10:30:00");

        let d = parse_date_string("01/15/2024").unwrap();
        assert_eq!(d.to_string(), "2024-01-15 00:00:00");

        assert!(parse_date_string("2024-02-30").is_none());
        assert!(parse_date_string("13/45/2024").is_none());
        assert!(parse_date_string("vpc-2024-01-15").is_none());
        assert!(parse_date_string("us-east-1").is_none());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::NAN), "NaN");

        assert_eq!(format_locale_number(1234567.891), "1,234,567.891");
        assert_eq!(format_locale_number(1234.5), "1,234.5");
        assert_eq!(format_locale_number(999.0), "999");
        assert_eq!(format_locale_number(-1000.0), "-1,000");
        assert_eq!(format_locale_number(0.12345), "0.123");
        assert_eq!(format_locale_number(-0.0001), "0");
    }

    #[test]
    fn test_csv_values() {
        let options = CsvOptions {
            true_value: "Yes".into(),
            false_value: "No".into(),
            ..CsvOptions::default()
        };
        assert_eq!(format_csv_value(&FieldValue::Null, &options), "");
        assert_eq!(format_csv_value(&FieldValue::Boolean(true), &options), "Yes");
        assert_eq!(format_csv_value(&FieldValue::Boolean(false), &options), "No");
        assert_eq!(format_csv_value(&FieldValue::Number(3.0), &options), "3");
        assert_eq!(
            format_csv_value(&FieldValue::Json(json!({"env": "prod"})), &options),
            r#"{"env":"prod"}"#
        );

        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_csv_value(&FieldValue::Date(dt), &options), "2024-01-15T10:30:00.000Z");

        let custom = CsvOptions {
            date_format: Some("%d.%m.%Y".into()),
            ..CsvOptions::default()
        };
        assert_eq!(format_csv_value(&FieldValue::Date(dt), &custom), "15.01.2024");
    }

    #[test]
    fn test_excel_values() {
        assert_eq!(format_excel_value(&FieldValue::Null), CellValue::Blank);
        assert_eq!(format_excel_value(&FieldValue::Number(2.5)), CellValue::Number(2.5));
        assert_eq!(format_excel_value(&FieldValue::Boolean(true)), CellValue::Boolean(true));
        assert!(matches!(format_excel_value(&"2024-03-01".into()), CellValue::Date(_)));
        assert_eq!(
            format_excel_value(&"2024-13-01".into()),
            CellValue::Text("2024-13-01".to_string())
        );
        assert_eq!(
            format_excel_value(&FieldValue::Json(json!([1, 2]))),
            CellValue::Text("[1,2]".to_string())
        );
    }

    #[test]
    fn test_pdf_values() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(format_pdf_value(&FieldValue::Date(dt)), "1/5/2024");
        assert_eq!(format_pdf_value(&FieldValue::Boolean(true)), "Yes");
        assert_eq!(format_pdf_value(&FieldValue::Boolean(false)), "No");
        assert_eq!(format_pdf_value(&FieldValue::Number(12000.0)), "12,000");
        assert_eq!(format_pdf_value(&FieldValue::Null), "");
    }
}
