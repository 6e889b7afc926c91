//! Core candidate data model for CPL.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "cpl-core";

pub const NAME: &str = "name";
pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const SOURCE: &str = "source";
pub const POSITION: &str = "position";

/// Columns with first-class slots on [`CandidateRecord`], in output order.
pub const KNOWN_COLUMNS: [&str; 4] = [NAME, EMAIL, PHONE, SOURCE];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("required column `{0}` is missing from the table schema")]
    MissingColumn(String),
}

/// Loosely typed cell value. Blank text counts as null.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(value)
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(n) => n.is_nan(),
        }
    }

    /// Text rendering of a non-null value.
    pub fn to_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Integral numbers render without a fractional part so that phone numbers
/// stored as numbers keep their digits intact.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One row of the working table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl CandidateRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::default();
        for (column, value) in pairs {
            record.set(column.as_ref(), value.into());
        }
        record
    }

    pub fn get(&self, column: &str) -> Value {
        match column {
            NAME => self.name.clone().into(),
            EMAIL => self.email.clone().into(),
            PHONE => self.phone.clone().into(),
            SOURCE => self.source.clone().into(),
            _ => self.attributes.get(column).cloned().unwrap_or_default(),
        }
    }

    /// Null values clear the cell.
    pub fn set(&mut self, column: &str, value: Value) {
        match column {
            NAME => self.name = value.to_text(),
            EMAIL => self.email = value.to_text(),
            PHONE => self.phone = value.to_text(),
            SOURCE => self.source = value.to_text(),
            _ => {
                if value.is_null() {
                    self.attributes.remove(column);
                } else {
                    self.attributes.insert(column.to_string(), value);
                }
            }
        }
    }

    pub fn is_blank(&self, column: &str) -> bool {
        let known = match column {
            NAME => &self.name,
            EMAIL => &self.email,
            PHONE => &self.phone,
            SOURCE => &self.source,
            _ => return self.attributes.get(column).map_or(true, Value::is_null),
        };
        known.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    /// Columns holding a non-null value: known columns first, then attributes.
    pub fn populated_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = KNOWN_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.is_blank(c))
            .collect();
        out.extend(
            self.attributes
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k.as_str()),
        );
        out
    }

    /// Individual origin tags; merged records carry a comma-joined list.
    pub fn source_tags(&self) -> Vec<String> {
        self.source
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Pairwise null-fill: `base` keeps every non-null value it has.
pub fn merge_records(base: &CandidateRecord, other: &CandidateRecord) -> CandidateRecord {
    let mut merged = base.clone();
    for column in other.populated_columns() {
        if merged.is_blank(column) {
            merged.set(column, other.get(column));
        }
    }
    merged
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
}

impl SearchCriteria {
    fn terms(&self) -> Vec<(&'static str, String)> {
        [
            (NAME, &self.name),
            (EMAIL, &self.email),
            (PHONE, &self.phone),
            (POSITION, &self.position),
        ]
        .into_iter()
        .filter_map(|(column, term)| {
            let term = term.as_deref()?.trim();
            (!term.is_empty()).then(|| (column, term.to_lowercase()))
        })
        .collect()
    }
}

/// Ordered column list plus rows. Cells missing from a row read as null.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateTable {
    columns: Vec<String>,
    rows: Vec<CandidateRecord>,
}

impl CandidateTable {
    /// Builds a table and checks that it can be matched on.
    pub fn new(columns: Vec<String>, rows: Vec<CandidateRecord>) -> Result<Self, SchemaError> {
        let table = Self::from_parts(columns, rows);
        table.validate()?;
        Ok(table)
    }

    /// Unchecked constructor for raw exports whose headers are not mapped yet.
    /// Repeated column names are collapsed to their first occurrence.
    pub fn from_parts(columns: Vec<String>, rows: Vec<CandidateRecord>) -> Self {
        let mut table = Self {
            columns: Vec::with_capacity(columns.len()),
            rows: Vec::new(),
        };
        for column in columns {
            table.ensure_column(&column);
        }
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.has_column(NAME) {
            Ok(())
        } else {
            Err(SchemaError::MissingColumn(NAME.to_string()))
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[CandidateRecord] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [CandidateRecord] {
        &mut self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<CandidateRecord>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_position(column).is_some()
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Appends `column` if absent.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Moves (or adds) `column` to the first position.
    pub fn insert_column_front(&mut self, column: &str) {
        if let Some(pos) = self.column_position(column) {
            self.columns.remove(pos);
        }
        self.columns.insert(0, column.to_string());
    }

    /// Removes the column and clears its cells. Returns whether it existed.
    pub fn drop_column(&mut self, column: &str) -> bool {
        let Some(pos) = self.column_position(column) else {
            return false;
        };
        self.columns.remove(pos);
        for row in &mut self.rows {
            row.set(column, Value::Null);
        }
        true
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let Some(pos) = self.column_position(from) else {
            return;
        };
        if self.has_column(to) {
            self.columns.remove(pos);
        } else {
            self.columns[pos] = to.to_string();
        }
        for row in &mut self.rows {
            let value = row.get(from);
            row.set(from, Value::Null);
            if row.is_blank(to) {
                row.set(to, value);
            }
        }
    }

    /// Appends a row, registering any populated column the table lacks.
    pub fn push_row(&mut self, row: CandidateRecord) {
        for column in row.populated_columns() {
            if !self.has_column(column) {
                self.columns.push(column.to_string());
            }
        }
        self.rows.push(row);
    }

    /// Stacks tables; the column set is the union in first-seen order.
    pub fn concat(tables: impl IntoIterator<Item = CandidateTable>) -> CandidateTable {
        let mut out = CandidateTable::default();
        for table in tables {
            for column in &table.columns {
                out.ensure_column(column);
            }
            for row in table.rows {
                out.push_row(row);
            }
        }
        out
    }

    /// Case-insensitive substring search; every given criterion must match.
    /// Returns row indices with the matching records.
    pub fn find_candidates(&self, criteria: &SearchCriteria) -> Vec<(usize, &CandidateRecord)> {
        let terms = criteria.terms();
        if terms.is_empty() {
            return Vec::new();
        }
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                terms.iter().all(|(column, term)| {
                    row.get(column)
                        .to_text()
                        .is_some_and(|v| v.to_lowercase().contains(term.as_str()))
                })
            })
            .collect()
    }
}
