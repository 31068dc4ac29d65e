use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{string_field, u64_field};
use crate::database::connection::Row;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: Option<u64>,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string, never the plain password
    #[serde(skip_serializing)]
    pub password: String,
}

impl UserDto {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            password: password_hash.into(),
        }
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("email".to_string(), Value::String(self.email.clone()));
        fields.insert("password".to_string(), Value::String(self.password.clone()));
        fields.insert("name".to_string(), Value::String(self.name.clone()));
        fields
    }

    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: u64_field(row, "id"),
            name: string_field(row, "name").unwrap_or_default(),
            email: string_field(row, "email")?,
            password: string_field(row, "password")?,
        })
    }
}
