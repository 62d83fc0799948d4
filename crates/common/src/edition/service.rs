//! Edition service
//!
//! Orchestrates the store and the cleanup executor. Every mutation follows
//! the same order: validate, mutate in memory, persist, then touch the
//! filesystem. A failed persist therefore never removes a file.

use crate::edition::classify::{classify, PdfRequirement, UploadedFile};
use crate::edition::cleanup::Cleanup;
use crate::edition::dates::{day_window, month_window, parse_submitted_date, truncate_to_second, DateWindow};
use crate::edition::reconcile::{apply_fields, apply_files, EditionChanges};
use crate::edition::store::{Edition, EditionStore, EditionView, NewEdition};
use crate::errors::{AppError, Result};
use crate::metrics::{self, EditionEvent};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Scalar fields submitted with a new edition.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewEditionInput {
    #[validate(length(max = 500, message = "Title must be at most 500 characters"))]
    pub title: String,

    /// Unparsed; absent means now
    pub date: Option<String>,

    pub is_special_edition: Option<bool>,
}

/// Create, update, delete and query editions.
#[derive(Clone)]
pub struct EditionService {
    store: Arc<dyn EditionStore>,
    cleanup: Cleanup,
}

impl EditionService {
    pub fn new(store: Arc<dyn EditionStore>, cleanup: Cleanup) -> Self {
        Self { store, cleanup }
    }

    /// Create an edition from an upload batch holding exactly one PDF.
    #[instrument(skip(self, input, files), fields(file_count = files.len()))]
    pub async fn insert(&self, input: NewEditionInput, files: Vec<UploadedFile>) -> Result<EditionView> {
        input.validate()?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::MissingField {
                field: "title".to_string(),
            });
        }
        if files.is_empty() {
            return Err(AppError::validation("files", "At least one file is required"));
        }

        let date = match input.date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => parse_submitted_date(raw)?,
            None => truncate_to_second(Utc::now()),
        };

        let upload = classify(&files, PdfRequirement::Required)?;
        let page_count = upload.page_keys.len();

        let edition = self
            .store
            .create(NewEdition {
                title: title.to_string(),
                date,
                is_special_edition: input.is_special_edition.unwrap_or(false),
                pdf_key: upload.pdf_key,
                page_keys: upload.page_keys,
            })
            .await?;

        self.cleanup.dispatch(upload.ignored_keys).await;

        metrics::record_edition(EditionEvent::Created, page_count);
        info!(edition_id = %edition.id, pages = page_count, "Edition created");

        Ok(edition.to_view())
    }

    /// Apply changes and new files to an existing edition.
    ///
    /// Orphaned files are only removed once the save has gone through.
    #[instrument(skip(self, changes, files), fields(file_count = files.len()))]
    pub async fn update(&self, id: Uuid, changes: EditionChanges, files: Vec<UploadedFile>) -> Result<EditionView> {
        let mut edition = self.get(id).await?;

        apply_fields(&mut edition, &changes)?;
        let upload = classify(&files, PdfRequirement::Optional)?;
        let pages_added = upload.page_keys.len();
        let pending = apply_files(&mut edition, &changes, upload);

        let saved = match self.store.save(&edition).await {
            Ok(saved) => saved,
            Err(e) => {
                if matches!(e, AppError::Conflict { .. }) {
                    metrics::record_conflict();
                }
                return Err(e);
            }
        };

        let orphaned = pending.retain_unreferenced(&saved);
        let orphan_count = orphaned.len();
        self.cleanup.dispatch(orphaned).await;

        metrics::record_edition(EditionEvent::Updated, pages_added);
        info!(
            edition_id = %saved.id,
            version = saved.version,
            pages = saved.page_keys.len(),
            orphaned = orphan_count,
            "Edition updated"
        );

        Ok(saved.to_view())
    }

    /// Delete an edition and every file it references.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let edition = self.get(id).await?;

        let manifest: Vec<String> = edition.referenced_keys().cloned().collect();
        let report = self.cleanup.remove_now(&manifest).await;
        if !report.failed.is_empty() {
            // Keep the record so its manifest is still there for a retry.
            warn!(edition_id = %id, failed = report.failed.len(), "Some edition files could not be removed; record kept");
            return Err(AppError::Storage {
                message: format!(
                    "{} file(s) of edition {} could not be removed",
                    report.failed.len(),
                    id
                ),
            });
        }

        if !self.store.delete_by_id(id).await? {
            return Err(not_found(id));
        }

        metrics::record_edition(EditionEvent::Deleted, 0);
        info!(edition_id = %id, files = manifest.len(), "Edition deleted");

        Ok(())
    }

    /// Fetch one edition in storage form.
    pub async fn get(&self, id: Uuid) -> Result<Edition> {
        self.store.find_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn get_view(&self, id: Uuid) -> Result<EditionView> {
        Ok(self.get(id).await?.to_view())
    }

    /// Editions dated on a `YYYY-MM-DD` day, newest first.
    pub async fn fetch_by_day(&self, day: &str) -> Result<Vec<EditionView>> {
        self.fetch_window(day_window(day)?).await
    }

    /// Editions dated in a `YYYY-MM` month, newest first.
    pub async fn fetch_by_month(&self, month: &str) -> Result<Vec<EditionView>> {
        self.fetch_window(month_window(month)?).await
    }

    pub async fn list_all(&self) -> Result<Vec<EditionView>> {
        Ok(views(self.store.find_all().await?))
    }

    async fn fetch_window(&self, (start, end): DateWindow) -> Result<Vec<EditionView>> {
        Ok(views(self.store.find_by_date_range(start, end).await?))
    }
}

fn views(editions: Vec<Edition>) -> Vec<EditionView> {
    editions.iter().map(Edition::to_view).collect()
}

fn not_found(id: Uuid) -> AppError {
    AppError::EditionNotFound { id: id.to_string() }
}
