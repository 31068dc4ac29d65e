pub mod product;
pub mod user;

pub use product::{
    BookDto, DvdDto, FurnitureDto, ProductDto, ProductFields, ProductOptionDto, ProductType,
};
pub use user::UserDto;

use serde_json::Value;

use crate::database::connection::Row;

/// Integer column that may arrive as a number or as numeric text
pub(crate) fn u64_field(row: &Row, key: &str) -> Option<u64> {
    match row.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn string_field(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
