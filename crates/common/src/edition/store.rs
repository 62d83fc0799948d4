//! Edition records and the persistence contract
//!
//! The lifecycle logic only talks to an [`EditionStore`]. The database
//! [`Repository`](crate::db::Repository) implements it for production and
//! [`MemoryEditionStore`] implements it for tests and local runs.

use crate::edition::paths::to_public_path;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A persisted edition, keys in canonical storage form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    pub is_special_edition: bool,
    pub pdf_key: Option<String>,
    /// Reading order
    pub page_keys: Vec<String>,
    /// Bumped by every successful save
    pub version: i64,
}

impl Edition {
    /// Every storage key the record references.
    pub fn referenced_keys(&self) -> impl Iterator<Item = &String> {
        self.pdf_key.iter().chain(self.page_keys.iter())
    }

    pub fn references(&self, key: &str) -> bool {
        self.referenced_keys().any(|k| k == key)
    }

    /// Client-facing representation with public paths.
    pub fn to_view(&self) -> EditionView {
        EditionView {
            id: self.id,
            title: self.title.clone(),
            date: self.date,
            is_special_edition: self.is_special_edition,
            pdf_file: self.pdf_key.as_deref().map(to_public_path),
            pages: self.page_keys.iter().map(|k| to_public_path(k)).collect(),
        }
    }
}

/// Fields for a new record; the store assigns id and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEdition {
    pub title: String,
    pub date: DateTime<Utc>,
    pub is_special_edition: bool,
    pub pdf_key: Option<String>,
    pub page_keys: Vec<String>,
}

/// Edition as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "isSpecialEdition")]
    pub is_special_edition: bool,
    #[serde(rename = "pdfFile")]
    pub pdf_file: Option<String>,
    pub pages: Vec<String>,
}

/// Persistence boundary for editions.
///
/// No transaction spans this trait and the filesystem.
#[async_trait]
pub trait EditionStore: Send + Sync {
    /// Assign an id, persist with version 1, return the stored record.
    async fn create(&self, edition: NewEdition) -> Result<Edition>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Edition>>;

    /// Editions with `start <= date < end`, newest first.
    async fn find_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Edition>>;

    /// All editions, newest first.
    async fn find_all(&self) -> Result<Vec<Edition>>;

    /// Persist a mutation of a fetched record.
    ///
    /// Fails with [`AppError::Conflict`] if the stored version moved past
    /// `edition.version`, and with [`AppError::EditionNotFound`] if the record
    /// is gone. Returns the record with its new version.
    async fn save(&self, edition: &Edition) -> Result<Edition>;

    /// Returns whether a record was removed.
    async fn delete_by_id(&self, id: Uuid) -> Result<bool>;
}

/// In-process store keyed by id.
#[derive(Debug, Default)]
pub struct MemoryEditionStore {
    editions: RwLock<HashMap<Uuid, Edition>>,
}

impl MemoryEditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.editions.read().await.is_empty()
    }
}

fn newest_first(mut editions: Vec<Edition>) -> Vec<Edition> {
    editions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    editions
}

#[async_trait]
impl EditionStore for MemoryEditionStore {
    async fn create(&self, edition: NewEdition) -> Result<Edition> {
        let record = Edition {
            id: Uuid::new_v4(),
            title: edition.title,
            date: edition.date,
            is_special_edition: edition.is_special_edition,
            pdf_key: edition.pdf_key,
            page_keys: edition.page_keys,
            version: 1,
        };
        self.editions.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Edition>> {
        Ok(self.editions.read().await.get(&id).cloned())
    }

    async fn find_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Edition>> {
        let editions = self
            .editions
            .read()
            .await
            .values()
            .filter(|e| e.date >= start && e.date < end)
            .cloned()
            .collect();
        Ok(newest_first(editions))
    }

    async fn find_all(&self) -> Result<Vec<Edition>> {
        let editions = self.editions.read().await.values().cloned().collect();
        Ok(newest_first(editions))
    }

    async fn save(&self, edition: &Edition) -> Result<Edition> {
        let mut editions = self.editions.write().await;
        let stored = editions
            .get_mut(&edition.id)
            .ok_or_else(|| AppError::EditionNotFound {
                id: edition.id.to_string(),
            })?;

        if stored.version != edition.version {
            return Err(AppError::Conflict {
                id: edition.id.to_string(),
                expected: edition.version,
            });
        }

        let mut next = edition.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.editions.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_edition(title: &str, day: u32) -> NewEdition {
        NewEdition {
            title: title.to_string(),
            date: Utc.with_ymd_and_hms(2024, 2, day, 8, 0, 0).unwrap(),
            is_special_edition: false,
            pdf_key: Some(format!("uploads/{title}.pdf")),
            page_keys: vec![format!("uploads/{title}-1.png")],
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_version() {
        let store = MemoryEditionStore::new();
        let created = store.create(new_edition("a", 1)).await.unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(store.find_by_id(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_range_is_half_open_and_descending() {
        let store = MemoryEditionStore::new();
        for (title, day) in [("a", 1), ("b", 2), ("c", 3)] {
            store.create(new_edition(title, day)).await.unwrap();
        }

        let start = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 3, 8, 0, 0).unwrap();
        let found = store.find_by_date_range(start, end).await.unwrap();

        let titles: Vec<_> = found.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let store = MemoryEditionStore::new();
        let created = store.create(new_edition("a", 1)).await.unwrap();

        let mut first = created.clone();
        first.title = "first".into();
        let saved = store.save(&first).await.unwrap();
        assert_eq!(saved.version, 2);

        let mut second = created;
        second.title = "second".into();
        let err = store.save(&second).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { expected: 1, .. }));

        let stored = store.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "first");
    }

    #[tokio::test]
    async fn test_save_missing_record() {
        let store = MemoryEditionStore::new();
        let created = store.create(new_edition("a", 1)).await.unwrap();
        assert!(store.delete_by_id(created.id).await.unwrap());
        assert!(!store.delete_by_id(created.id).await.unwrap());

        let err = store.save(&created).await.unwrap_err();
        assert!(matches!(err, AppError::EditionNotFound { .. }));
    }

    #[test]
    fn test_view_uses_public_paths() {
        let edition = Edition {
            id: Uuid::new_v4(),
            title: "t".into(),
            date: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            is_special_edition: true,
            pdf_key: Some("uploads/a.pdf".into()),
            page_keys: vec!["uploads/1.png".into(), "uploads/2.png".into()],
            version: 4,
        };
        let view = edition.to_view();
        assert_eq!(view.pdf_file.as_deref(), Some("/uploads/a.pdf"));
        assert_eq!(view.pages, vec!["/uploads/1.png", "/uploads/2.png"]);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["isSpecialEdition"], true);
        assert_eq!(json["pdfFile"], "/uploads/a.pdf");
        assert!(json.get("_id").is_some());
    }
}
