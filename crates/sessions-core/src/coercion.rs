//! Field coercion shared by every CSV-backed entity.
//!
//! Each entity declares a table of [`FieldSpec`]s. [`CoercedRow::coerce`]
//! walks that table once per row and converts every raw cell according to its
//! [`FieldKind`]. Only an unparseable UUID rejects a row; every other defect
//! degrades to a default value.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::EntityKind;
use crate::time_utils::TimezoneHandler;

// ── Field table ───────────────────────────────────────────────────────────────

/// Declared type of a CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Identity or foreign key. Unparseable → the row is rejected.
    Uuid,
    /// Point in time. Unparseable → absent.
    Timestamp,
    /// `0/1`, `true/false`, `yes/no`. Anything else → `false`.
    Bool,
    /// Signed integer. Unparseable → `0`.
    Int,
    /// Floating point. Unparseable or non-finite → `0.0`.
    Float,
    /// Free text. Missing → empty string.
    Text,
}

/// One column of an entity's field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub kind: FieldKind,
    /// Whether the header must contain this column for the file to load.
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(column: &'static str, kind: FieldKind) -> Self {
        Self {
            column,
            kind,
            required: true,
        }
    }

    pub const fn optional(column: &'static str, kind: FieldKind) -> Self {
        Self {
            column,
            kind,
            required: false,
        }
    }
}

/// A single coerced cell.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Uuid(Uuid),
    Timestamp(Option<DateTime<Utc>>),
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDefect {
    InvalidUuid { column: &'static str, value: String },
}

impl fmt::Display for RowDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowDefect::InvalidUuid { column, value } => {
                write!(f, "invalid UUID in column {}: {:?}", column, value)
            }
        }
    }
}

// ── Per-kind coercion ─────────────────────────────────────────────────────────

/// Coerce one raw cell according to `kind`.
///
/// `raw` is `None` when the column is absent from the file or the row is
/// shorter than the header.
pub fn coerce_field(
    column: &'static str,
    raw: Option<&str>,
    kind: FieldKind,
    tz: &TimezoneHandler,
) -> Result<FieldValue, RowDefect> {
    let cell = raw.unwrap_or("");
    let value = match kind {
        FieldKind::Uuid => {
            let parsed = Uuid::parse_str(cell.trim()).map_err(|_| RowDefect::InvalidUuid {
                column,
                value: cell.to_string(),
            })?;
            FieldValue::Uuid(parsed)
        }
        FieldKind::Timestamp => FieldValue::Timestamp(tz.parse_timestamp(cell)),
        FieldKind::Bool => FieldValue::Bool(parse_bool(cell)),
        FieldKind::Int => FieldValue::Int(parse_int(cell)),
        FieldKind::Float => FieldValue::Float(parse_float(cell)),
        FieldKind::Text => FieldValue::Text(cell.to_string()),
    };
    Ok(value)
}

/// Case-insensitive `1/true/yes`; every other token is `false`.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Integer with a `0` fallback. Integral float tokens such as `3.0` are
/// accepted since spreadsheet exports often write integers that way.
pub fn parse_int(raw: &str) -> i64 {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return v;
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
        _ => 0,
    }
}

/// Float with a `0.0` fallback for unparseable or non-finite input.
pub fn parse_float(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(f) if f.is_finite() => f,
        _ => 0.0,
    }
}

// ── CoercedRow ────────────────────────────────────────────────────────────────

/// All cells of one row, coerced per the entity's field table.
#[derive(Debug, Clone, Default)]
pub struct CoercedRow {
    values: HashMap<&'static str, FieldValue>,
}

impl CoercedRow {
    /// Coerce every field in `fields`, fetching raw cells through `lookup`.
    ///
    /// Fails fast on the first [`RowDefect`].
    pub fn coerce<'a, F>(
        fields: &[FieldSpec],
        lookup: F,
        tz: &TimezoneHandler,
    ) -> Result<Self, RowDefect>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut values = HashMap::with_capacity(fields.len());
        for spec in fields {
            let value = coerce_field(spec.column, lookup(spec.column), spec.kind, tz)?;
            values.insert(spec.column, value);
        }
        Ok(Self { values })
    }

    pub fn uuid(&self, column: &str) -> Option<Uuid> {
        match self.values.get(column) {
            Some(FieldValue::Uuid(u)) => Some(*u),
            _ => None,
        }
    }

    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.values.get(column) {
            Some(FieldValue::Timestamp(ts)) => *ts,
            _ => None,
        }
    }

    pub fn bool(&self, column: &str) -> bool {
        matches!(self.values.get(column), Some(FieldValue::Bool(true)))
    }

    pub fn int(&self, column: &str) -> i64 {
        match self.values.get(column) {
            Some(FieldValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn float(&self, column: &str) -> f64 {
        match self.values.get(column) {
            Some(FieldValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn text(&self, column: &str) -> String {
        match self.values.get(column) {
            Some(FieldValue::Text(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

// ── CsvRecord ─────────────────────────────────────────────────────────────────

/// An entity that can be built from one CSV row.
pub trait CsvRecord: Sized {
    const KIND: EntityKind;

    /// Field table driving [`CoercedRow::coerce`].
    const FIELDS: &'static [FieldSpec];

    /// Build the entity from an already-coerced row.
    ///
    /// Returns `None` only if an identity column is missing from the row,
    /// which the coercion step already rules out for required UUIDs.
    fn from_row(row: &CoercedRow) -> Option<Self>;

    /// Columns the header must contain.
    fn required_columns() -> Vec<&'static str> {
        Self::FIELDS
            .iter()
            .filter(|f| f.required)
            .map(|f| f.column)
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
