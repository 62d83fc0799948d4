//! Postgres-backed edition store
//!
//! Saves are conditional on the version the caller fetched, so a stale
//! write is rejected instead of silently overwriting a newer one.

use crate::db::models::*;
use crate::db::DbPool;
use crate::edition::store::{Edition, EditionStore, NewEdition};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS editions (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    date TIMESTAMPTZ NOT NULL,
    is_special_edition BOOLEAN NOT NULL DEFAULT FALSE,
    pdf_key TEXT,
    page_keys JSONB NOT NULL DEFAULT '[]'::jsonb,
    version BIGINT NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_editions_date ON editions (date DESC);
"#;

/// Repository for edition records
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    /// Create the editions table and its date index if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.conn().execute_unprepared(SCHEMA).await?;
        info!("Edition schema ready");
        Ok(())
    }
}

impl From<EditionModel> for Edition {
    fn from(model: EditionModel) -> Self {
        let page_keys = model.page_key_list();
        Edition {
            id: model.id,
            title: model.title,
            date: model.date.with_timezone(&Utc),
            is_special_edition: model.is_special_edition,
            pdf_key: model.pdf_key,
            page_keys,
            version: model.version,
        }
    }
}

#[async_trait]
impl EditionStore for Repository {
    async fn create(&self, edition: NewEdition) -> Result<Edition> {
        let now = Utc::now();

        let model = EditionActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(edition.title),
            date: Set(edition.date.into()),
            is_special_edition: Set(edition.is_special_edition),
            pdf_key: Set(edition.pdf_key),
            page_keys: Set(serde_json::to_value(&edition.page_keys)?),
            version: Set(1),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let inserted = model.insert(self.conn()).await?;
        debug!(edition_id = %inserted.id, "Edition row inserted");
        Ok(inserted.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Edition>> {
        let found = EditionEntity::find_by_id(id).one(self.conn()).await?;
        Ok(found.map(Into::into))
    }

    async fn find_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Edition>> {
        let rows = EditionEntity::find()
            .filter(EditionColumn::Date.gte(start))
            .filter(EditionColumn::Date.lt(end))
            .order_by_desc(EditionColumn::Date)
            .order_by_asc(EditionColumn::Id)
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_all(&self) -> Result<Vec<Edition>> {
        let rows = EditionEntity::find()
            .order_by_desc(EditionColumn::Date)
            .order_by_asc(EditionColumn::Id)
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn save(&self, edition: &Edition) -> Result<Edition> {
        let next_version = edition.version + 1;
        let page_keys = serde_json::to_value(&edition.page_keys)?;
        let date: sea_orm::prelude::DateTimeWithTimeZone = edition.date.into();
        let updated_at: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let result = EditionEntity::update_many()
            .col_expr(EditionColumn::Title, Expr::value(edition.title.clone()))
            .col_expr(EditionColumn::Date, Expr::value(date))
            .col_expr(EditionColumn::IsSpecialEdition, Expr::value(edition.is_special_edition))
            .col_expr(EditionColumn::PdfKey, Expr::value(edition.pdf_key.clone()))
            .col_expr(EditionColumn::PageKeys, Expr::value(page_keys))
            .col_expr(EditionColumn::Version, Expr::value(next_version))
            .col_expr(EditionColumn::UpdatedAt, Expr::value(updated_at))
            .filter(EditionColumn::Id.eq(edition.id))
            .filter(EditionColumn::Version.eq(edition.version))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            let exists = EditionEntity::find_by_id(edition.id).one(self.conn()).await?.is_some();
            return Err(if exists {
                AppError::Conflict {
                    id: edition.id.to_string(),
                    expected: edition.version,
                }
            } else {
                AppError::EditionNotFound {
                    id: edition.id.to_string(),
                }
            });
        }

        let mut saved = edition.clone();
        saved.version = next_version;
        Ok(saved)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let result = EditionEntity::delete_by_id(id).exec(self.conn()).await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn model(page_keys: serde_json::Value) -> EditionModel {
        let date = Utc.with_ymd_and_hms(2024, 2, 10, 7, 0, 0).unwrap();
        EditionModel {
            id: Uuid::new_v4(),
            title: "Morning".into(),
            date: date.into(),
            is_special_edition: true,
            pdf_key: Some("uploads/a.pdf".into()),
            page_keys,
            version: 3,
            created_at: date.into(),
            updated_at: date.into(),
        }
    }

    #[test]
    fn test_model_converts_to_edition() {
        let row = model(serde_json::json!(["uploads/1.png", "uploads/2.png"]));
        let id = row.id;
        let edition: Edition = row.into();

        assert_eq!(edition.id, id);
        assert_eq!(edition.page_keys, vec!["uploads/1.png", "uploads/2.png"]);
        assert_eq!(edition.version, 3);
        assert_eq!(edition.date, Utc.with_ymd_and_hms(2024, 2, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_malformed_page_keys_are_dropped() {
        let edition: Edition = model(serde_json::json!(["uploads/1.png", 7, null])).into();
        assert_eq!(edition.page_keys, vec!["uploads/1.png"]);

        let edition: Edition = model(serde_json::json!({"not": "an array"})).into();
        assert!(edition.page_keys.is_empty());
    }

    #[test]
    fn test_schema_is_idempotent() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS editions"));
        assert!(SCHEMA.contains("CREATE INDEX IF NOT EXISTS"));
    }
}
