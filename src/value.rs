//! Renders raw condition values into SQL literal fragments.
//!
//! Every literal is quoted, numbers included. Classification only
//! normalises the text that goes inside the quotes.

use std::borrow::Cow;

use chrono::NaiveDate;

use crate::error::{CompileError, RowLocation};
use crate::operator::SqlOperator;

/// Separator for BETWEEN ranges and IN lists.
pub const VALUE_SEPARATOR: char = ',';

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inferred type of a raw value. Variants are tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    String,
}

impl ValueKind {
    pub fn classify(raw: Option<&str>) -> ValueKind {
        let Some(raw) = raw else {
            return ValueKind::Null;
        };
        let text = raw.trim();
        if text.eq_ignore_ascii_case("true") {
            return ValueKind::Boolean(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return ValueKind::Boolean(false);
        }
        if let Ok(n) = text.parse::<i64>() {
            return ValueKind::Int(n);
        }
        if let Ok(f) = text.parse::<f64>() {
            return ValueKind::Float(f);
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
            return ValueKind::Date(date);
        }
        ValueKind::String
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "NULL",
            ValueKind::Boolean(_) => "boolean",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::Date(_) => "date",
            ValueKind::String => "string",
        }
    }
}

/// Quotes a single value after normalising it by kind.
fn literal(raw: Option<&str>) -> String {
    let kind = ValueKind::classify(raw);
    tracing::trace!(kind = kind.name(), "Classified condition value");
    match (kind, raw) {
        (ValueKind::Null, _) | (_, None) => "NULL".to_string(),
        (kind, Some(text)) => quote(&normalize(text, kind)),
    }
}

fn normalize(text: &str, kind: ValueKind) -> Cow<'_, str> {
    match kind {
        ValueKind::Boolean(b) => Cow::Owned(b.to_string()),
        ValueKind::Date(date) => Cow::Owned(date.format(DATE_FORMAT).to_string()),
        _ => Cow::Borrowed(text),
    }
}

/// Standard SQL string literal: single quotes, embedded quotes doubled.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Formats the right-hand side of a condition for `op`.
///
/// Returns an empty fragment for IS NULL / IS NOT NULL, the raw text for
/// column comparisons, and quoted literals otherwise.
pub fn format_value(
    raw: Option<&str>,
    op: &SqlOperator,
    is_column_comparison: bool,
    row: RowLocation,
) -> Result<String, CompileError> {
    if op.is_nullary() {
        return Ok(String::new());
    }

    let malformed = |value: &str, reason: String| CompileError::MalformedConditionValue {
        row,
        operator: op.token().to_string(),
        value: value.to_string(),
        reason,
    };

    if is_column_comparison {
        return match raw {
            Some(column) if !column.trim().is_empty() => Ok(column.to_string()),
            _ => Err(malformed("", "column comparison without a column name".to_string())),
        };
    }

    match op {
        SqlOperator::Between => {
            let value = raw.ok_or_else(|| malformed("", "missing range".to_string()))?;
            let bounds: Vec<&str> = value.split(VALUE_SEPARATOR).map(str::trim).collect();
            match bounds.as_slice() {
                [start, end] if !start.is_empty() && !end.is_empty() => Ok(format!(
                    "{} AND {}",
                    literal(Some(*start)),
                    literal(Some(*end))
                )),
                [_, _] => Err(malformed(value, "empty range bound".to_string())),
                _ => Err(malformed(
                    value,
                    format!("expected exactly 2 bounds, found {}", bounds.len()),
                )),
            }
        }
        SqlOperator::In | SqlOperator::NotIn => {
            let value = raw.ok_or_else(|| malformed("", "missing list".to_string()))?;
            let items: Vec<&str> = value.split(VALUE_SEPARATOR).map(str::trim).collect();
            if items.iter().any(|item| item.is_empty()) {
                return Err(malformed(value, "empty list element".to_string()));
            }
            let quoted: Vec<String> = items.into_iter().map(|item| literal(Some(item))).collect();
            Ok(format!("({})", quoted.join(", ")))
        }
        _ => Ok(literal(raw)),
    }
}
