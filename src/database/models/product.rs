use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{string_field, u64_field};
use crate::database::connection::Row;

/// The three product families the catalog knows about.
///
/// Category ids and option ids share the same numbering in the seeded
/// `categories`/`options` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Book,
    Dvd,
    Furniture,
}

impl ProductType {
    pub const ALL: [ProductType; 3] = [ProductType::Book, ProductType::Dvd, ProductType::Furniture];

    pub fn category_id(&self) -> u8 {
        match self {
            ProductType::Book => 1,
            ProductType::Dvd => 2,
            ProductType::Furniture => 3,
        }
    }

    /// Row id in `options` for this family's attribute
    pub fn option_id(&self) -> u8 {
        match self {
            ProductType::Book => 1,
            ProductType::Dvd => 2,
            ProductType::Furniture => 3,
        }
    }

    /// Name of the family-specific attribute
    pub fn option_key(&self) -> &'static str {
        match self {
            ProductType::Book => "weight",
            ProductType::Dvd => "size",
            ProductType::Furniture => "dimensions",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Book => "Book",
            ProductType::Dvd => "Dvd",
            ProductType::Furniture => "Furniture",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown product type '{0}'")]
pub struct UnknownProductType(pub String);

impl FromStr for ProductType {
    type Err = UnknownProductType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Book" => Ok(ProductType::Book),
            "Dvd" => Ok(ProductType::Dvd),
            "Furniture" => Ok(ProductType::Furniture),
            other => Err(UnknownProductType(other.to_string())),
        }
    }
}

/// Columns shared by every product row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFields {
    pub id: Option<u64>,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub category_id: u8,
}

impl ProductFields {
    /// Column-named values; `id` is left out until the row exists
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(id) = self.id {
            fields.insert("id".to_string(), Value::from(id));
        }
        fields.insert("sku".to_string(), Value::String(self.sku.clone()));
        fields.insert("product_name".to_string(), Value::String(self.name.clone()));
        fields.insert("price".to_string(), Value::String(self.price.to_string()));
        fields.insert("category_id".to_string(), Value::from(self.category_id));
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDto {
    #[serde(flatten)]
    pub product: ProductFields,
    /// Kilograms
    pub weight: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DvdDto {
    #[serde(flatten)]
    pub product: ProductFields,
    /// Megabytes
    pub size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurnitureDto {
    #[serde(flatten)]
    pub product: ProductFields,
    /// `HxWxL`
    pub dimensions: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProductDto {
    Book(BookDto),
    Dvd(DvdDto),
    Furniture(FurnitureDto),
}

impl ProductDto {
    pub fn product_type(&self) -> ProductType {
        match self {
            ProductDto::Book(_) => ProductType::Book,
            ProductDto::Dvd(_) => ProductType::Dvd,
            ProductDto::Furniture(_) => ProductType::Furniture,
        }
    }

    pub fn product(&self) -> &ProductFields {
        match self {
            ProductDto::Book(book) => &book.product,
            ProductDto::Dvd(dvd) => &dvd.product,
            ProductDto::Furniture(furniture) => &furniture.product,
        }
    }

    /// The family attribute as stored in `product_options.option_value`
    pub fn option_value(&self) -> String {
        match self {
            ProductDto::Book(book) => book.weight.to_string(),
            ProductDto::Dvd(dvd) => dvd.size.to_string(),
            ProductDto::Furniture(furniture) => furniture.dimensions.clone(),
        }
    }

    /// Product columns followed by the family attribute
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = self.product().to_fields();
        fields.insert(
            self.product_type().option_key().to_string(),
            Value::String(self.option_value()),
        );
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductOptionDto {
    pub id: Option<u64>,
    pub product_id: u64,
    pub option_id: u8,
    pub option_value: String,
}

impl ProductOptionDto {
    pub fn for_product(product: &ProductDto, product_id: u64) -> Self {
        Self {
            id: None,
            product_id,
            option_id: product.product_type().option_id(),
            option_value: product.option_value(),
        }
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(id) = self.id {
            fields.insert("id".to_string(), Value::from(id));
        }
        fields.insert("product_id".to_string(), Value::from(self.product_id));
        fields.insert("option_id".to_string(), Value::from(self.option_id));
        fields.insert("option_value".to_string(), Value::String(self.option_value.clone()));
        fields
    }

    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: u64_field(row, "id"),
            product_id: u64_field(row, "product_id")?,
            option_id: u8::try_from(u64_field(row, "option_id")?).ok()?,
            option_value: string_field(row, "option_value").unwrap_or_default(),
        })
    }
}
