//! Placeholder handling for statements sent to MySQL.
//!
//! The query builder emits `:name` placeholders (and `?` for delete-by-IN-list),
//! while the MySQL protocol only understands positional `?`. A
//! [`PreparedStatement`] records which named or positional parameter feeds each
//! `?` so values can be bound by name and handed to the driver in order.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("cannot bind a value of type {0}")]
    UnsupportedType(&'static str),

    #[error("parameter {0} was never bound")]
    Unbound(String),

    #[error("statement mixes named and positional parameters")]
    MixedPlaceholders,

    #[error("positional parameter {position} is out of range (statement has {count})")]
    PositionOutOfRange { position: usize, count: usize },
}

/// Driver-level classification of a bound value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Null,
    Str,
}

/// A value ready to be handed to the driver
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Int(i64),
    Null,
    Str(String),
}

impl BoundValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            BoundValue::Int(_) => ParamType::Int,
            BoundValue::Null => ParamType::Null,
            BoundValue::Str(_) => ParamType::Str,
        }
    }

    /// Convert a JSON scalar. Booleans bind as integers; floats and integers
    /// outside the `i64` range bind as strings and are coerced by MySQL.
    pub fn from_json(value: &Value) -> Result<Self, BindError> {
        match value {
            Value::Null => Ok(BoundValue::Null),
            Value::Bool(b) => Ok(BoundValue::Int(i64::from(*b))),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => BoundValue::Int(i),
                None => BoundValue::Str(n.to_string()),
            }),
            Value::String(s) => Ok(BoundValue::Str(s.clone())),
            Value::Array(_) => Err(BindError::UnsupportedType("array")),
            Value::Object(_) => Err(BindError::UnsupportedType("object")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Named(String),
    Positional(usize),
}

/// A statement compiled to positional form, plus the values bound so far
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    original: String,
    sql: String,
    slots: Vec<Slot>,
    values: Vec<Option<BoundValue>>,
}

impl PreparedStatement {
    pub fn parse(sql: &str) -> Result<Self, BindError> {
        let mut out = String::with_capacity(sql.len());
        let mut slots = Vec::new();
        let mut quote: Option<char> = None;
        let mut chars = sql.char_indices().peekable();
        let mut positional = 0usize;

        while let Some((idx, c)) = chars.next() {
            if let Some(q) = quote {
                out.push(c);
                if c == '\\' && q != '`' {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    positional += 1;
                    slots.push(Slot::Positional(positional));
                    out.push('?');
                }
                ':' => {
                    let starts_name = matches!(
                        chars.peek(),
                        Some((_, next)) if next.is_ascii_alphabetic() || *next == '_'
                    );
                    let after_colon = idx > 0 && sql[..idx].ends_with(':');
                    if starts_name && !after_colon {
                        let mut name = String::new();
                        while let Some((_, next)) = chars.peek() {
                            if next.is_ascii_alphanumeric() || *next == '_' {
                                name.push(*next);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        slots.push(Slot::Named(name));
                        out.push('?');
                    } else {
                        out.push(':');
                    }
                }
                _ => out.push(c),
            }
        }

        let has_named = slots.iter().any(|s| matches!(s, Slot::Named(_)));
        if has_named && positional > 0 {
            return Err(BindError::MixedPlaceholders);
        }

        let values = vec![None; slots.len()];
        Ok(Self {
            original: sql.to_string(),
            sql: out,
            slots,
            values,
        })
    }

    /// The statement as sent to the driver
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The statement as written by the caller
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn placeholder_count(&self) -> usize {
        self.slots.len()
    }

    /// Distinct named parameters, in first-use order
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for slot in &self.slots {
            if let Slot::Named(name) = slot {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Bind every occurrence of `name` (with or without the leading `:`).
    /// Returns false when the statement does not reference it.
    pub fn bind_named(&mut self, name: &str, value: BoundValue) -> bool {
        let name = name.strip_prefix(':').unwrap_or(name);
        let mut matched = false;
        for (slot, bound) in self.slots.iter().zip(self.values.iter_mut()) {
            if matches!(slot, Slot::Named(n) if n == name) {
                *bound = Some(value.clone());
                matched = true;
            }
        }
        matched
    }

    /// Bind a 1-based positional parameter
    pub fn bind_position(&mut self, position: usize, value: BoundValue) -> Result<(), BindError> {
        let count = self.slots.len();
        let index = self
            .slots
            .iter()
            .position(|slot| *slot == Slot::Positional(position))
            .ok_or(BindError::PositionOutOfRange { position, count })?;
        self.values[index] = Some(value);
        Ok(())
    }

    /// Values in placeholder order; fails on the first unbound placeholder
    pub fn bound_values(&self) -> Result<Vec<BoundValue>, BindError> {
        self.slots
            .iter()
            .zip(self.values.iter())
            .map(|(slot, value)| {
                value.clone().ok_or_else(|| match slot {
                    Slot::Named(name) => BindError::Unbound(format!(":{}", name)),
                    Slot::Positional(p) => BindError::Unbound(format!("?{}", p)),
                })
            })
            .collect()
    }
}
