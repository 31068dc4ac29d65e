use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Dao, DaoError};
use crate::database::connection::Connection;
use crate::database::models::ProductOptionDto;
use crate::database::service::ColumnMapping;

/// Rows of `product_options`: one family attribute value per product
pub struct ProductOptionDao {
    dao: Dao,
}

impl ProductOptionDao {
    pub const TABLE: &'static str = "product_options";

    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            dao: Dao::new(connection, Self::TABLE, "id"),
        }
    }

    pub async fn create(&mut self, option: &ProductOptionDto) -> Result<u64, DaoError> {
        let mut fields = option.to_fields();
        fields.shift_remove("id");
        self.dao.create(fields).await
    }

    /// Update by the option row's own id
    pub async fn update(&mut self, option: &ProductOptionDto) -> Result<bool, DaoError> {
        let id = option.id.ok_or_else(|| {
            DaoError::InvalidArgument("product option has no id".to_string())
        })?;
        let mut fields = option.to_fields();
        fields.shift_remove("id");
        self.dao
            .update(&fields, &ColumnMapping::identity(), &Value::from(id))
            .await
    }

    pub async fn find_by_option_id(
        &mut self,
        option_id: u8,
        product_id: u64,
    ) -> Result<Option<ProductOptionDto>, DaoError> {
        let mut lookup = Map::new();
        lookup.insert("option_id".to_string(), Value::from(option_id));
        lookup.insert("product_id".to_string(), Value::from(product_id));

        let row = self.dao.find_by_exact(&lookup).await?;
        Ok(row.as_ref().and_then(ProductOptionDto::from_row))
    }
}
