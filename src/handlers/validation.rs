//! Field checks for request data.
//!
//! A [`Validator`] walks a request map and collects every failed rule per
//! field; `finish` turns the collection into a 400 with an `errors` object
//! mapping each field to its messages.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// `HxWxL`, each part a positive number
static DIMENSIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(\.\d+)?)(x(\d+(\.\d+)?)){2}$").expect("valid regex"));

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

pub struct Validator<'a> {
    data: &'a Map<String, Value>,
    errors: Map<String, Value>,
}

impl<'a> Validator<'a> {
    pub fn new(data: &'a Map<String, Value>) -> Self {
        Self {
            data,
            errors: Map::new(),
        }
    }

    /// Record a failure against `field`
    pub fn fail(&mut self, field: &str, message: impl Into<String>) {
        let entry = self
            .errors
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(messages) = entry {
            messages.push(Value::String(message.into()));
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The field as text when present and non-empty
    pub fn text(&self, field: &str) -> Option<String> {
        match self.data.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(true) => Some("1".to_string()),
            _ => None,
        }
    }

    pub fn required(&mut self, field: &str) -> Option<String> {
        let value = self.text(field);
        if value.is_none() {
            self.fail(field, format!("{} is required", field));
        }
        value
    }

    /// Required text with no whitespace anywhere in it
    pub fn token(&mut self, field: &str) -> Option<String> {
        let value = self.required(field)?;
        if value.chars().any(char::is_whitespace) {
            self.fail(field, format!("{} should not contain whitespace", field));
            return None;
        }
        Some(value)
    }

    /// Required number that is zero or more
    pub fn amount(&mut self, field: &str) -> Option<Decimal> {
        let text = self.required(field)?;
        let Ok(value) = Decimal::from_str(&text) else {
            self.fail(field, format!("{} should be numeric", field));
            return None;
        };
        if value.is_sign_negative() && !value.is_zero() {
            self.fail(field, format!("{} should not be null or negative", field));
            return None;
        }
        Some(value)
    }

    /// Required `HxWxL` with no zero dimension
    pub fn dimensions(&mut self, field: &str) -> Option<String> {
        let text = self.required(field)?;
        let non_zero = text
            .split('x')
            .all(|part| Decimal::from_str(part).map(|d| !d.is_zero()).unwrap_or(false));
        if !DIMENSIONS.is_match(&text) || !non_zero {
            self.fail(
                field,
                format!(
                    "{} should have a valid format (HxWxL) and none of the dimensions should be equal to 0",
                    field
                ),
            );
            return None;
        }
        Some(text)
    }

    pub fn one_of<T: FromStr>(&mut self, field: &str, allowed: &[&str]) -> Option<T> {
        let text = self.required(field)?;
        match text.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.fail(
                    field,
                    format!("The value of {} must be one of the following: {}", field, allowed.join(", ")),
                );
                None
            }
        }
    }

    pub fn email(&mut self, field: &str) -> Option<String> {
        let text = self.required(field)?;
        if !EMAIL.is_match(&text) {
            self.fail(field, format!("{} should be an email", field));
            return None;
        }
        Some(text)
    }

    pub fn min_length(&mut self, field: &str, length: usize) -> Option<String> {
        let text = self.required(field)?;
        if text.chars().count() < length {
            self.fail(field, format!("{} should be at least {} characters", field, length));
            return None;
        }
        Some(text)
    }

    /// `field` must equal `other` exactly
    pub fn matches(&mut self, field: &str, other: &str) {
        if self.required(field).is_some() && self.data.get(field) != self.data.get(other) {
            self.fail(field, format!("{} and {} do not match", field, other));
        }
    }

    pub fn unique(&mut self, field: &str) {
        self.fail(field, format!("{} already exists in the database", field));
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("Invalid parameters.", self.errors))
        }
    }
}
