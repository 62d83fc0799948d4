//! Edition entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "editions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    pub date: DateTimeWithTimeZone,

    pub is_special_edition: bool,

    #[sea_orm(column_type = "Text", nullable)]
    pub pdf_key: Option<String>,

    /// Ordered storage keys as a JSONB array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub page_keys: serde_json::Value,

    /// Optimistic concurrency token
    pub version: i64,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Page keys in reading order; non-string entries are dropped.
    pub fn page_key_list(&self) -> Vec<String> {
        match &self.page_keys {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
