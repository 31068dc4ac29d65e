// handlers/product.rs - catalog listing, create, edit and mass delete
//
// Multi-statement writes run inside one transaction on the request's
// connection; every DAO built here shares that connection.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::database::connection::{Connection, Row};
use crate::database::dao::{BookDao, Dao, DaoError, DvdDao, FurnitureDao, ProductDao, ProductOptionDao};
use crate::database::models::{
    u64_field, BookDto, DvdDto, FurnitureDto, ProductDto, ProductFields, ProductOptionDto, ProductType,
};
use crate::error::ApiError;
use crate::handlers::request::{sanitize, HttpRequest, JsonResponse};
use crate::handlers::validation::Validator;
use crate::routing::{Action, Controller, RequestContext};

const ACTIONS: &[Action] = &[
    Action::new("index", 0),
    Action::new("showAllProducts", 0),
    Action::new("handleAddProduct", 0),
    Action::new("handleUpdateProduct", 1),
    Action::new("handleMassDelete", 0),
];

const PRODUCT_TYPES: &[&str] = &["Book", "Dvd", "Furniture"];

pub struct ProductController {
    ctx: Arc<RequestContext>,
}

impl ProductController {
    pub fn new(ctx: Arc<RequestContext>) -> Self {
        Self { ctx }
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>, ApiError> {
        Ok(self.ctx.connection().await?)
    }

    async fn show_all_products(&self) -> Result<JsonResponse, ApiError> {
        let rows = ProductDao::new(self.connection().await?)
            .get_all_products()
            .await?;
        Ok(JsonResponse::ok(rows_to_json(rows)))
    }

    async fn handle_add_product(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        match request.method {
            Method::GET => Ok(JsonResponse::message(
                StatusCode::OK,
                "Form should be displayed on frontend",
            )),
            Method::POST => self.insert_product(request).await,
            _ => Err(ApiError::method_not_allowed("Invalid method for adding product")),
        }
    }

    async fn insert_product(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        let data = product_data(&request.data()?);
        let product = parse_product(&data, None)?;

        let conn = self.connection().await?;
        let mut products = ProductDao::new(conn.clone());
        ensure_unique_sku(&mut products, &product.product().sku, None).await?;

        products.begin().await?;
        let id = match create_with_option(conn, &product).await {
            Ok(id) => {
                products.commit().await?;
                id
            }
            Err(err) => {
                rollback(&products).await;
                return Err(err);
            }
        };

        info!(id, sku = %product.product().sku, kind = %product.product_type(), "Product created");
        Ok(JsonResponse::message(
            StatusCode::CREATED,
            format!("{} created successfully", product.product_type()),
        ))
    }

    async fn handle_update_product(&self, id: &str, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        if self.ctx.tokens().user_id_from_jwt(request.bearer_token()).is_none() {
            return Err(ApiError::unauthorized("Unauthorized"));
        }

        let data = request.data()?;
        let method = match request.effective_method(&data) {
            Method::PUT => Method::PUT,
            _ => request.method.clone(),
        };

        let id: u64 = id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid parameters."))?;

        match method {
            Method::PUT => self.update_product(id, &data).await,
            Method::GET => self.get_product_by_id(id).await,
            _ => Err(ApiError::method_not_allowed("Invalid method for updating product")),
        }
    }

    async fn get_product_by_id(&self, id: u64) -> Result<JsonResponse, ApiError> {
        let mut products = ProductDao::new(self.connection().await?);
        match products.find_with_options(id).await? {
            Some(row) => Ok(JsonResponse::ok(Value::Object(row))),
            None => Err(ApiError::not_found("Product not found")),
        }
    }

    async fn update_product(&self, id: u64, raw: &Map<String, Value>) -> Result<JsonResponse, ApiError> {
        let conn = self.connection().await?;
        let mut products = ProductDao::new(conn.clone());
        if products.find_with_options(id).await?.is_none() {
            return Err(ApiError::not_found("Product not found"));
        }

        let data = product_data(raw);
        let product = parse_product(&data, Some(id))?;
        ensure_unique_sku(&mut products, &product.product().sku, Some(id)).await?;

        products.begin().await?;
        match update_with_option(conn, &product, id).await {
            Ok(()) => products.commit().await?,
            Err(err) => {
                rollback(&products).await;
                return Err(err);
            }
        }

        info!(id, kind = %product.product_type(), "Product updated");
        Ok(JsonResponse::message(
            StatusCode::CREATED,
            format!("{} updated successfully", product.product_type()),
        ))
    }

    async fn handle_mass_delete(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        let data = request.data()?;
        if request.effective_method(&data) != Method::DELETE {
            return Err(ApiError::method_not_allowed("Invalid method for mass delete"));
        }

        let ids = product_ids(&sanitize(&data))?;
        let mut products = ProductDao::new(self.connection().await?);
        let deleted = if products.delete_by_ids(&ids).await? {
            ids.len()
        } else {
            0
        };

        let noun = if deleted > 1 { "products" } else { "product" };
        info!(requested = ids.len(), deleted, "Mass delete");
        Ok(JsonResponse::created(serde_json::json!({
            "status": 201,
            "message": format!("{} {} deleted successfully", deleted, noun),
        })))
    }
}

#[async_trait]
impl Controller for ProductController {
    fn actions(&self) -> &'static [Action] {
        ACTIONS
    }

    async fn invoke(
        &mut self,
        action: &'static str,
        args: Vec<String>,
        request: &HttpRequest,
    ) -> Result<JsonResponse, ApiError> {
        match action {
            "handleAddProduct" => self.handle_add_product(request).await,
            "handleUpdateProduct" => match args.first() {
                Some(id) => self.handle_update_product(id, request).await,
                None => Err(ApiError::bad_request("Invalid parameters.")),
            },
            "handleMassDelete" => self.handle_mass_delete(request).await,
            _ => self.show_all_products().await,
        }
    }
}

fn rows_to_json(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

/// Sanitized request data with `size_in_mb` accepted for `size`
fn product_data(raw: &Map<String, Value>) -> Map<String, Value> {
    let mut data = sanitize(raw);
    if !data.contains_key("size") {
        if let Some(size) = data.get("size_in_mb").cloned() {
            data.insert("size".to_string(), size);
        }
    }
    data
}

/// Validate the request fields and build the matching DTO
fn parse_product(data: &Map<String, Value>, id: Option<u64>) -> Result<ProductDto, ApiError> {
    let mut v = Validator::new(data);
    let product_type: Option<ProductType> = v.one_of("product_type", PRODUCT_TYPES);
    let name = v.required("name");
    let sku = v.token("sku");
    let price = v.amount("price");

    let amount = match product_type {
        Some(ProductType::Book) => v.amount("weight"),
        Some(ProductType::Dvd) => v.amount("size"),
        _ => None,
    };
    let dimensions = match product_type {
        Some(ProductType::Furniture) => v.dimensions("dimensions"),
        _ => None,
    };
    v.finish()?;

    let (Some(product_type), Some(name), Some(sku), Some(price)) = (product_type, name, sku, price) else {
        return Err(ApiError::bad_request("Invalid parameters."));
    };
    let product = ProductFields {
        id,
        sku,
        name,
        price,
        category_id: product_type.category_id(),
    };

    match (product_type, amount, dimensions) {
        (ProductType::Book, Some(weight), _) => Ok(ProductDto::Book(BookDto { product, weight })),
        (ProductType::Dvd, Some(size), _) => Ok(ProductDto::Dvd(DvdDto { product, size })),
        (ProductType::Furniture, _, Some(dimensions)) => {
            Ok(ProductDto::Furniture(FurnitureDto { product, dimensions }))
        }
        _ => Err(ApiError::bad_request("Invalid parameters.")),
    }
}

/// A sku may only be reused by the product that already owns it
async fn ensure_unique_sku(products: &mut ProductDao, sku: &str, current: Option<u64>) -> Result<(), ApiError> {
    let mut lookup = Map::new();
    lookup.insert("sku".to_string(), Value::String(sku.to_string()));

    if let Some(row) = products.find_by_exact(&lookup).await? {
        let owner = u64_field(&row, "id");
        if current.is_none() || owner != current {
            let mut v = Validator::new(&lookup);
            v.unique("sku");
            v.finish()?;
        }
    }
    Ok(())
}

async fn create_typed(conn: Arc<dyn Connection>, product: &ProductDto) -> Result<u64, DaoError> {
    match product.product_type() {
        ProductType::Book => BookDao::new(conn).create(product).await,
        ProductType::Dvd => DvdDao::new(conn).create(product).await,
        ProductType::Furniture => FurnitureDao::new(conn).create(product).await,
    }
}

async fn update_typed(conn: Arc<dyn Connection>, product: &ProductDto, id: u64) -> Result<bool, DaoError> {
    match product.product_type() {
        ProductType::Book => BookDao::new(conn).update(product, id).await,
        ProductType::Dvd => DvdDao::new(conn).update(product, id).await,
        ProductType::Furniture => FurnitureDao::new(conn).update(product, id).await,
    }
}

async fn create_with_option(conn: Arc<dyn Connection>, product: &ProductDto) -> Result<u64, ApiError> {
    let kind = product.product_type();
    let id = create_typed(conn.clone(), product).await?;
    if id == 0 {
        return Err(ApiError::internal_server_error(format!(
            "Error creating {}",
            kind.as_str().to_lowercase()
        )));
    }

    let option = ProductOptionDto::for_product(product, id);
    if ProductOptionDao::new(conn).create(&option).await? == 0 {
        return Err(ApiError::internal_server_error(format!(
            "Error creating {}",
            kind.as_str().to_lowercase()
        )));
    }
    Ok(id)
}

async fn update_with_option(conn: Arc<dyn Connection>, product: &ProductDto, id: u64) -> Result<(), ApiError> {
    // MySQL reports zero affected rows when nothing changed
    if !update_typed(conn.clone(), product, id).await? {
        debug!(id, "product row unchanged");
    }

    let mut options = ProductOptionDao::new(conn);
    let kind = product.product_type();
    match options.find_by_option_id(kind.option_id(), id).await? {
        Some(existing) => {
            let option = ProductOptionDto {
                id: existing.id,
                option_value: product.option_value(),
                ..existing
            };
            if !options.update(&option).await? {
                debug!(id, "product option unchanged");
            }
        }
        None => {
            options.create(&ProductOptionDto::for_product(product, id)).await?;
        }
    }
    Ok(())
}

async fn rollback(dao: &Dao) {
    if let Err(e) = dao.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

/// `product_ids` as an array or a comma-separated string of positive ids
fn product_ids(data: &Map<String, Value>) -> Result<Vec<Value>, ApiError> {
    let raw: Vec<Value> = match data.get("product_ids") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| Value::String(part.trim().to_string()))
            .collect(),
        Some(Value::Number(n)) => vec![Value::Number(n.clone())],
        _ => Vec::new(),
    };

    let ids: Option<Vec<Value>> = raw
        .iter()
        .map(|item| match item {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
        .map(|id| id.filter(|id| *id > 0).map(Value::from))
        .collect();

    match ids {
        Some(ids) if !ids.is_empty() => Ok(ids),
        _ => {
            let mut v = Validator::new(data);
            v.fail("product_ids", "product_ids should be a list of product ids");
            v.finish().map(|_| Vec::new())
        }
    }
}
