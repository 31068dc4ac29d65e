use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Dao, DaoError, ReadOutcome, Selection};
use crate::database::connection::Connection;
use crate::database::models::UserDto;
use crate::database::service::ColumnMapping;

pub struct UserDao {
    dao: Dao,
}

impl UserDao {
    pub const TABLE: &'static str = "users";

    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            dao: Dao::new(connection, Self::TABLE, "id"),
        }
    }

    pub async fn create(&mut self, user: &UserDto) -> Result<u64, DaoError> {
        self.dao.create(user.to_fields()).await
    }

    pub async fn read(&mut self, selection: Selection) -> Result<ReadOutcome, DaoError> {
        self.dao.read(selection).await
    }

    pub async fn update(&mut self, user: &UserDto, id: u64) -> Result<bool, DaoError> {
        self.dao
            .update(&user.to_fields(), &ColumnMapping::identity(), &Value::from(id))
            .await
    }

    pub async fn delete_by_ids(&mut self, ids: &[Value]) -> Result<bool, DaoError> {
        self.dao.delete_by_ids(ids).await
    }

    pub async fn find_by_email(&mut self, email: &str) -> Result<Option<UserDto>, DaoError> {
        let mut lookup = Map::new();
        lookup.insert("email".to_string(), Value::String(email.to_string()));
        let row = self.dao.find_by_exact(&lookup).await?;
        Ok(row.as_ref().and_then(UserDto::from_row))
    }
}
