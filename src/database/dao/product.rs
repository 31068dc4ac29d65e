use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Dao, DaoError, Selection};
use crate::database::connection::{Connection, Row};
use crate::database::models::{ProductDto, ProductType};
use crate::database::query_builder::Condition;
use crate::database::service::ColumnMapping;

/// Columns every joined product read returns
const OPTION_SELECTORS: &[&str] = &[
    "products.id",
    "products.category_id",
    "products.product_name",
    "products.sku",
    "products.price",
    "product_options.option_value",
    "options.option_name",
];

const OPTION_JOINS: &[(&str, &str)] = &[
    ("product_options", "products.id = product_options.product_id"),
    ("options", "product_options.option_id = options.id"),
];

/// Generic verbs over `products`, plus the joined read with each product's
/// family attribute.
pub struct ProductDao {
    dao: Dao,
}

impl ProductDao {
    pub const TABLE: &'static str = "products";
    pub const TABLE_ID: &'static str = "id";

    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            dao: Dao::new(connection, Self::TABLE, Self::TABLE_ID),
        }
    }

    /// Select over `products ⋈ product_options ⋈ options`. The caller's
    /// selectors come first; the product and option columns are always added.
    pub async fn read_with_options(&mut self, mut selection: Selection) -> Result<Vec<Row>, DaoError> {
        selection
            .selectors
            .extend(OPTION_SELECTORS.iter().map(|s| s.to_string()));
        self.dao.read_joined(selection, OPTION_JOINS).await
    }

    /// Products of every family, newest first
    pub async fn get_all_products(&mut self) -> Result<Vec<Row>, DaoError> {
        let mut products = Vec::new();
        for kind in ProductType::ALL {
            products.extend(self.read_category(kind).await?);
        }
        products.sort_by_key(|row| std::cmp::Reverse(row_id(row)));
        Ok(products)
    }

    /// One product with its family attribute
    pub async fn find_with_options(&mut self, id: u64) -> Result<Option<Row>, DaoError> {
        let mut parameters = Map::new();
        parameters.insert("product_id".to_string(), Value::from(id));
        let selection = Selection::filtered(vec![Condition::literal("products.id = :product_id")])
            .with_parameters(parameters);
        Ok(self.read_with_options(selection).await?.into_iter().next())
    }

    async fn read_category(&mut self, kind: ProductType) -> Result<Vec<Row>, DaoError> {
        let condition = Condition::literal(format!("category_id = {}", kind.category_id()));
        self.read_with_options(Selection::filtered(vec![condition])).await
    }

    async fn insert_product(&mut self, product: &ProductDto) -> Result<u64, DaoError> {
        let mut fields = product.to_fields();
        fields.shift_remove(product.product_type().option_key());
        self.dao.create(fields).await
    }

    async fn update_product(&mut self, product: &ProductDto, id: u64) -> Result<bool, DaoError> {
        let mut fields = product.to_fields();
        fields.shift_remove(product.product_type().option_key());
        fields.shift_remove(Self::TABLE_ID);
        self.dao
            .update(&fields, &ColumnMapping::identity(), &Value::from(id))
            .await
    }
}

impl Deref for ProductDao {
    type Target = Dao;

    fn deref(&self) -> &Dao {
        &self.dao
    }
}

impl DerefMut for ProductDao {
    fn deref_mut(&mut self) -> &mut Dao {
        &mut self.dao
    }
}

fn row_id(row: &Row) -> u64 {
    crate::database::models::u64_field(row, "id").unwrap_or(0)
}

/// Compile-time product family for [`TypedProductDao`]
pub trait ProductKind: Send + Sync + 'static {
    const TYPE: ProductType;
}

pub struct Book;
pub struct Dvd;
pub struct Furniture;

impl ProductKind for Book {
    const TYPE: ProductType = ProductType::Book;
}

impl ProductKind for Dvd {
    const TYPE: ProductType = ProductType::Dvd;
}

impl ProductKind for Furniture {
    const TYPE: ProductType = ProductType::Furniture;
}

/// Product DAO locked to one family; writes reject DTOs of any other family
/// before touching the database.
pub struct TypedProductDao<K: ProductKind> {
    products: ProductDao,
    _kind: PhantomData<K>,
}

pub type BookDao = TypedProductDao<Book>;
pub type DvdDao = TypedProductDao<Dvd>;
pub type FurnitureDao = TypedProductDao<Furniture>;

impl<K: ProductKind> TypedProductDao<K> {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            products: ProductDao::new(connection),
            _kind: PhantomData,
        }
    }

    pub fn product_type(&self) -> ProductType {
        K::TYPE
    }

    fn check(&self, product: &ProductDto) -> Result<(), DaoError> {
        if product.product_type() != K::TYPE {
            return Err(DaoError::InvalidArgument(format!(
                "Expected {}Dto instance.",
                K::TYPE
            )));
        }
        Ok(())
    }

    /// Insert the product row without its family attribute
    pub async fn create(&mut self, product: &ProductDto) -> Result<u64, DaoError> {
        self.check(product)?;
        self.products.insert_product(product).await
    }

    pub async fn update(&mut self, product: &ProductDto, id: u64) -> Result<bool, DaoError> {
        self.check(product)?;
        self.products.update_product(product, id).await
    }

    pub async fn get_all(&mut self) -> Result<Vec<Row>, DaoError> {
        self.products.read_category(K::TYPE).await
    }

    pub fn last_id(&self) -> Result<u64, DaoError> {
        self.products.last_id()
    }
}
