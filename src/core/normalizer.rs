//! Cell normalization: any `Cell` plus an expected `FieldKind` → canonical `Value`

use crate::core::dates;
use crate::types::{format_number, Cell, FieldKind, Value};

/// Normalize a cell for a field of the given kind.
///
/// Total over every cell shape. Empty or unconvertible cells yield the empty
/// sentinel for the kind: `""` for text, `Null` for numbers and dates.
pub fn normalize(cell: &Cell, kind: FieldKind) -> Value {
    match kind {
        FieldKind::Text => Value::Text(to_text(cell)),
        FieldKind::Number => to_number(cell).map_or(Value::Null, Value::Number),
        FieldKind::Date => dates::resolve_date(cell).map_or(Value::Null, Value::Date),
    }
}

fn to_text(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) | Cell::DateTime(s) => s.clone(),
        Cell::Number(n) => format_number(*n),
        Cell::Boolean(b) => b.to_string(),
        Cell::Empty => String::new(),
    }
}

fn to_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n).filter(|n| n.is_finite()),
        Cell::Text(s) => parse_number(s),
        Cell::DateTime(s) => dates::resolve_text(s).map(dates::to_serial),
        Cell::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Cell::Empty => None,
    }
}

/// Parse numeric text, tolerating thousands separators and a leading currency sign
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let unsigned = trimmed
        .strip_prefix('$')
        .or_else(|| trimmed.strip_prefix('€'))
        .or_else(|| trimmed.strip_prefix('£'))
        .unwrap_or(trimmed);
    let cleaned: String = unsigned.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn all_cells() -> Vec<Cell> {
        vec![
            Cell::Text("P100".to_string()),
            Cell::Text("12.5".to_string()),
            Cell::Text(String::new()),
            Cell::Text("N/A".to_string()),
            Cell::Number(45292.0),
            Cell::Number(-3.0),
            Cell::Number(f64::NAN),
            Cell::Number(f64::INFINITY),
            Cell::DateTime("2024-01-15T00:00:00".to_string()),
            Cell::DateTime("garbage".to_string()),
            Cell::Boolean(true),
            Cell::Boolean(false),
            Cell::Empty,
        ]
    }

    #[test]
    fn test_normalize_is_total() {
        for cell in all_cells() {
            for kind in [FieldKind::Text, FieldKind::Number, FieldKind::Date] {
                let value = normalize(&cell, kind);
                match kind {
                    FieldKind::Text => assert!(matches!(value, Value::Text(_))),
                    FieldKind::Number => {
                        assert!(matches!(value, Value::Number(_) | Value::Null))
                    }
                    FieldKind::Date => assert!(matches!(value, Value::Date(_) | Value::Null)),
                }
            }
        }
    }

    #[test]
    fn test_empty_sentinels() {
        assert_eq!(normalize(&Cell::Empty, FieldKind::Text), Value::Text(String::new()));
        assert_eq!(normalize(&Cell::Empty, FieldKind::Number), Value::Null);
        assert_eq!(normalize(&Cell::Empty, FieldKind::Date), Value::Null);
    }

    #[test]
    fn test_text_to_number() {
        assert_eq!(
            normalize(&Cell::text("12.5"), FieldKind::Number),
            Value::Number(12.5)
        );
        assert_eq!(
            normalize(&Cell::text(" $1,250.00 "), FieldKind::Number),
            Value::Number(1250.0)
        );
        assert_eq!(normalize(&Cell::text("N/A"), FieldKind::Number), Value::Null);
        assert_eq!(normalize(&Cell::text("$"), FieldKind::Number), Value::Null);
    }

    #[test]
    fn test_non_finite_numbers_are_null() {
        assert_eq!(normalize(&Cell::Number(f64::NAN), FieldKind::Number), Value::Null);
        assert_eq!(
            normalize(&Cell::Number(f64::NEG_INFINITY), FieldKind::Number),
            Value::Null
        );
    }

    #[test]
    fn test_number_to_text() {
        assert_eq!(
            normalize(&Cell::number(100.0), FieldKind::Text),
            Value::Text("100".to_string())
        );
        assert_eq!(
            normalize(&Cell::number(0.25), FieldKind::Text),
            Value::Text("0.25".to_string())
        );
        assert_eq!(
            normalize(&Cell::Boolean(true), FieldKind::Text),
            Value::Text("true".to_string())
        );
    }

    #[test]
    fn test_boolean_to_number() {
        assert_eq!(normalize(&Cell::Boolean(true), FieldKind::Number), Value::Number(1.0));
        assert_eq!(normalize(&Cell::Boolean(false), FieldKind::Number), Value::Number(0.0));
    }

    #[test]
    fn test_date_kind() {
        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(normalize(&Cell::number(45292.0), FieldKind::Date), Value::Date(jan1));
        assert_eq!(normalize(&Cell::text("2024-01-01"), FieldKind::Date), Value::Date(jan1));
        assert_eq!(normalize(&Cell::text("N/A"), FieldKind::Date), Value::Null);
        assert_eq!(normalize(&Cell::Boolean(true), FieldKind::Date), Value::Null);
    }

    #[test]
    fn test_datetime_to_number_is_serial() {
        assert_eq!(
            normalize(&Cell::DateTime("2024-01-01T00:00:00".into()), FieldKind::Number),
            Value::Number(45292.0)
        );
    }
}
