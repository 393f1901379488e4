//! Per-field descriptors and desired-state coercion.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::reconcile::compare::is_false_clear;
use crate::validation::{validate_choice, validate_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Bool,
    Choice(&'static [&'static str]),
    StrList,
    IntList,
    /// Rows of fixed columns, pipe-joined on the wire.
    Table(&'static [&'static str]),
    Json,
    /// `key|value|key|value`, compared as a map.
    KeyValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Exact,
    CaseInsensitive,
    /// Hex strings, ignoring `:` separators and case.
    Hex,
    /// Trimmed text where empty equals unset.
    Text,
    /// Never echoed by the server; sent but not diffed.
    WriteOnly,
    /// Always counts as a change when supplied.
    Always,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Parameter name on the wire.
    pub wire: &'static str,
    /// Key in the fetched representation.
    pub remote: &'static str,
    pub compare: Compare,
    pub clear_with_false: bool,
    pub reject_empty: bool,
    pub secret: bool,
    pub range: Option<(i64, i64)>,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            wire: name,
            remote: name,
            compare: Compare::Exact,
            clear_with_false: false,
            reject_empty: false,
            secret: false,
            range: None,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::Str)
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub const fn choice(name: &'static str, choices: &'static [&'static str]) -> Self {
        Self::new(name, FieldKind::Choice(choices))
    }

    pub const fn list(name: &'static str) -> Self {
        Self::new(name, FieldKind::StrList)
    }

    pub const fn int_list(name: &'static str) -> Self {
        Self::new(name, FieldKind::IntList)
    }

    pub const fn table(name: &'static str, columns: &'static [&'static str]) -> Self {
        Self::new(name, FieldKind::Table(columns))
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    pub const fn key_values(name: &'static str) -> Self {
        Self::new(name, FieldKind::KeyValues)
    }

    pub const fn wire(mut self, wire: &'static str) -> Self {
        self.wire = wire;
        self
    }

    pub const fn remote(mut self, remote: &'static str) -> Self {
        self.remote = remote;
        self
    }

    pub const fn compare(mut self, compare: Compare) -> Self {
        self.compare = compare;
        self
    }

    pub const fn case_insensitive(self) -> Self {
        self.compare(Compare::CaseInsensitive)
    }

    pub const fn text(self) -> Self {
        self.compare(Compare::Text)
    }

    pub const fn write_only(self) -> Self {
        self.compare(Compare::WriteOnly)
    }

    pub const fn clearable(mut self) -> Self {
        self.clear_with_false = true;
        self
    }

    pub const fn reject_empty(mut self) -> Self {
        self.reject_empty = true;
        self
    }

    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::StrList | FieldKind::IntList | FieldKind::Table(_)
        )
    }

    /// Bring user input into the canonical shape for this field.
    pub fn coerce(&self, raw: &Value) -> Result<Value, AppError> {
        if self.is_list() && is_false_clear(raw) {
            if self.clear_with_false {
                return Ok(Value::Bool(false));
            }
            return Err(AppError::validation(format!(
                "{} must be a list and cannot be cleared with false",
                self.name
            )));
        }
        match self.kind {
            FieldKind::Str => scalar_string(self.name, raw).map(Value::String),
            FieldKind::Choice(choices) => {
                let s = scalar_string(self.name, raw)?;
                validate_choice(self.name, &s, choices)?;
                Ok(Value::String(s))
            }
            FieldKind::Int => {
                let n = parse_int(self.name, raw)?;
                if let Some((min, max)) = self.range {
                    validate_range(self.name, n, min, max)?;
                }
                Ok(Value::from(n))
            }
            FieldKind::Bool => parse_bool(self.name, raw).map(Value::Bool),
            FieldKind::StrList => {
                let items = split_list(self.name, raw)?;
                self.check_not_empty(&items)?;
                Ok(Value::Array(items.into_iter().map(Value::String).collect()))
            }
            FieldKind::IntList => {
                let items = split_list(self.name, raw)?;
                self.check_not_empty(&items)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::from(parse_int(self.name, &Value::String(item))?));
                }
                Ok(Value::Array(out))
            }
            FieldKind::Table(columns) => {
                let rows = parse_table(self.name, columns, raw)?;
                self.check_not_empty(&rows)?;
                Ok(Value::Array(rows))
            }
            FieldKind::Json => Ok(match raw {
                Value::String(s) => {
                    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
                }
                other => other.clone(),
            }),
            FieldKind::KeyValues => match raw {
                Value::Object(_) => Ok(raw.clone()),
                Value::String(s) => Ok(Value::Object(parse_key_values(s))),
                _ => Err(AppError::validation(format!(
                    "{} must be a 'key|value|...' string or a mapping",
                    self.name
                ))),
            },
        }
    }

    fn check_not_empty<T>(&self, items: &[T]) -> Result<(), AppError> {
        if self.reject_empty && items.is_empty() {
            return Err(AppError::validation(format!(
                "{} can only be cleared with boolean false, not an empty list",
                self.name
            )));
        }
        Ok(())
    }
}

pub fn find<'a>(fields: &'a [FieldSpec], name: &str) -> Option<&'a FieldSpec> {
    fields.iter().find(|f| f.name == name)
}

fn scalar_string(name: &str, raw: &Value) -> Result<String, AppError> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(AppError::validation(format!("{name} must be a string"))),
    }
}

fn parse_int(name: &str, raw: &Value) -> Result<i64, AppError> {
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AppError::validation(format!("{name} must be an integer, got {raw}")))
}

fn parse_bool(name: &str, raw: &Value) -> Result<bool, AppError> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(AppError::validation(format!("{name} must be true or false"))),
        },
        _ => Err(AppError::validation(format!("{name} must be true or false"))),
    }
}

fn split_list(name: &str, raw: &Value) -> Result<Vec<String>, AppError> {
    match raw {
        Value::Array(items) => items.iter().map(|v| scalar_string(name, v)).collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()),
        Value::Number(n) => Ok(vec![n.to_string()]),
        _ => Err(AppError::validation(format!("{name} must be a list"))),
    }
}

fn parse_table(name: &str, columns: &[&str], raw: &Value) -> Result<Vec<Value>, AppError> {
    let rows: Vec<Value> = match raw {
        Value::Array(items) => items.clone(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        // A single flat "a|b|c|a|b|c" string holds every row.
        Value::String(s) => {
            let cells: Vec<&str> = s.split('|').collect();
            if cells.len() % columns.len() != 0 {
                return Err(AppError::validation(format!(
                    "{name} expects rows of {} ('{}')",
                    columns.len(),
                    columns.join("|")
                )));
            }
            cells
                .chunks(columns.len())
                .map(|chunk| Value::String(chunk.join("|")))
                .collect()
        }
        _ => {
            return Err(AppError::validation(format!(
                "{name} must be a list of rows"
            )));
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut obj = Map::new();
        match row {
            Value::Object(map) => {
                for col in columns {
                    obj.insert(
                        (*col).to_string(),
                        map.get(*col).cloned().unwrap_or(Value::Null),
                    );
                }
            }
            Value::String(s) => {
                let cells: Vec<&str> = s.split('|').collect();
                if cells.len() != columns.len() {
                    return Err(AppError::validation(format!(
                        "{name} row '{s}' must have {} columns ('{}')",
                        columns.len(),
                        columns.join("|")
                    )));
                }
                for (col, cell) in columns.iter().zip(cells) {
                    obj.insert((*col).to_string(), Value::String(cell.to_string()));
                }
            }
            other => {
                return Err(AppError::validation(format!(
                    "{name} row {other} must be a mapping or a '|' separated string"
                )));
            }
        }
        out.push(Value::Object(obj));
    }
    Ok(out)
}

pub(crate) fn parse_key_values(s: &str) -> Map<String, Value> {
    let parts: Vec<&str> = s.split('|').collect();
    parts
        .chunks_exact(2)
        .map(|kv| (kv[0].to_string(), Value::String(kv[1].to_string())))
        .collect()
}

/// Desired field values keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Desired(BTreeMap<String, Value>);

impl Desired {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Fail on keys with no descriptor in `fields`.
    pub fn check_allowed(&self, fields: &[FieldSpec], context: &str) -> Result<(), AppError> {
        for key in self.0.keys() {
            if find(fields, key).is_none() {
                return Err(AppError::validation(format!(
                    "parameter '{key}' is not supported for {context}"
                )));
            }
        }
        Ok(())
    }

    pub fn require(&self, names: &[&str], context: &str) -> Result<(), AppError> {
        for name in names {
            if !self.0.contains_key(*name) {
                return Err(AppError::validation(format!(
                    "missing required parameter '{name}' for {context}"
                )));
            }
        }
        Ok(())
    }

    /// Coerce every value against its descriptor. Unknown keys are an error.
    pub fn coerced(&self, fields: &[FieldSpec], context: &str) -> Result<Desired, AppError> {
        self.check_allowed(fields, context)?;
        let mut out = BTreeMap::new();
        for (key, raw) in &self.0 {
            if let Some(spec) = find(fields, key) {
                out.insert(key.clone(), spec.coerce(raw)?);
            }
        }
        Ok(Desired(out))
    }
}

impl From<BTreeMap<String, Value>> for Desired {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Desired(map)
    }
}

impl From<Map<String, Value>> for Desired {
    fn from(map: Map<String, Value>) -> Self {
        Desired(map.into_iter().collect())
    }
}
