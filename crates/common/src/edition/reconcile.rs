//! Edition update reconciliation
//!
//! Applies a requested change set to a fetched edition in memory and works
//! out which storage keys become orphaned. Nothing here touches the store
//! or the filesystem; the caller saves the record first and only then
//! removes the orphaned files.

use crate::edition::classify::ClassifiedUpload;
use crate::edition::dates::parse_submitted_date;
use crate::edition::paths::to_storage_key;
use crate::edition::store::Edition;
use crate::errors::Result;

/// Requested changes to an existing edition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditionChanges {
    /// Blank titles are ignored
    pub title: Option<String>,
    /// Unparsed; blank values are ignored
    pub date: Option<String>,
    pub is_special_edition: Option<bool>,
    /// Drop the PDF when no replacement is uploaded
    pub remove_pdf: bool,
    /// Storage keys or public paths of pages to excise
    pub remove_pages: Vec<String>,
}

/// Keys that lost their last reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDeletions {
    keys: Vec<String>,
}

impl PendingDeletions {
    fn push(&mut self, key: String) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Drop any key the committed record still references.
    pub fn retain_unreferenced(self, edition: &Edition) -> Vec<String> {
        self.keys
            .into_iter()
            .filter(|key| !edition.references(key))
            .collect()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Validate and apply scalar field changes.
///
/// Runs before any file handling so that a bad date rejects the update
/// without side effects.
pub fn apply_fields(edition: &mut Edition, changes: &EditionChanges) -> Result<()> {
    if let Some(date) = changes.date.as_deref().filter(|d| !d.trim().is_empty()) {
        edition.date = parse_submitted_date(date)?;
    }

    if let Some(title) = changes.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        edition.title = title.to_string();
    }

    if let Some(flag) = changes.is_special_edition {
        edition.is_special_edition = flag;
    }

    Ok(())
}

/// Apply PDF replacement/removal, page appends and page removals.
pub fn apply_files(
    edition: &mut Edition,
    changes: &EditionChanges,
    upload: ClassifiedUpload,
) -> PendingDeletions {
    let mut pending = PendingDeletions::default();

    match upload.pdf_key {
        Some(new_pdf) => {
            if let Some(old) = edition.pdf_key.replace(new_pdf) {
                pending.push(old);
            }
        }
        None if changes.remove_pdf => {
            if let Some(old) = edition.pdf_key.take() {
                pending.push(old);
            }
        }
        None => {}
    }

    edition.page_keys.extend(upload.page_keys);

    for requested in &changes.remove_pages {
        let key = to_storage_key(requested);
        let before = edition.page_keys.len();
        edition.page_keys.retain(|existing| existing != &key);
        if edition.page_keys.len() != before {
            pending.push(key);
        } else {
            tracing::debug!(edition_id = %edition.id, key = %key, "Requested page removal matched nothing");
        }
    }

    for key in upload.ignored_keys {
        pending.push(key);
    }

    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn edition() -> Edition {
        Edition {
            id: Uuid::new_v4(),
            title: "Morning".into(),
            date: Utc.with_ymd_and_hms(2024, 2, 1, 6, 0, 0).unwrap(),
            is_special_edition: false,
            pdf_key: Some("uploads/old.pdf".into()),
            page_keys: vec![
                "uploads/1.png".into(),
                "uploads/2.png".into(),
                "uploads/3.png".into(),
            ],
            version: 1,
        }
    }

    fn upload(pdf: Option<&str>, pages: &[&str]) -> ClassifiedUpload {
        ClassifiedUpload {
            pdf_key: pdf.map(String::from),
            page_keys: pages.iter().map(|p| p.to_string()).collect(),
            ignored_keys: vec![],
        }
    }

    #[test]
    fn test_blank_fields_are_no_ops() {
        let mut e = edition();
        let original = e.clone();
        let changes = EditionChanges {
            title: Some("   ".into()),
            date: Some("".into()),
            ..Default::default()
        };
        apply_fields(&mut e, &changes).unwrap();
        assert_eq!(e, original);
    }

    #[test]
    fn test_bad_date_rejected_before_mutation() {
        let mut e = edition();
        let changes = EditionChanges {
            title: Some("Evening".into()),
            date: Some("not a date".into()),
            ..Default::default()
        };
        let err = apply_fields(&mut e, &changes).unwrap_err();
        assert!(matches!(err, AppError::InvalidDate { .. }));
        assert_eq!(e.title, "Morning");
    }

    #[test]
    fn test_scalar_fields_replaced() {
        let mut e = edition();
        let changes = EditionChanges {
            title: Some("Evening".into()),
            date: Some("2024-03-05".into()),
            is_special_edition: Some(true),
            ..Default::default()
        };
        apply_fields(&mut e, &changes).unwrap();
        assert_eq!(e.title, "Evening");
        assert_eq!(e.date, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        assert!(e.is_special_edition);
    }

    #[test]
    fn test_append_and_remove_preserves_order() {
        let mut e = edition();
        let changes = EditionChanges {
            remove_pages: vec!["/uploads/2.png".into()],
            ..Default::default()
        };
        let pending = apply_files(&mut e, &changes, upload(None, &["uploads/4.png", "uploads/5.png"]));

        assert_eq!(
            e.page_keys,
            vec!["uploads/1.png", "uploads/3.png", "uploads/4.png", "uploads/5.png"]
        );
        assert_eq!(pending.keys(), ["uploads/2.png".to_string()]);
        assert_eq!(e.pdf_key.as_deref(), Some("uploads/old.pdf"));
    }

    #[test]
    fn test_unknown_removal_is_ignored() {
        let mut e = edition();
        let before = e.page_keys.clone();
        let changes = EditionChanges {
            remove_pages: vec!["uploads/missing.png".into()],
            ..Default::default()
        };
        let pending = apply_files(&mut e, &changes, ClassifiedUpload::default());
        assert_eq!(e.page_keys, before);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pdf_replacement_marks_old_pdf() {
        let mut e = edition();
        let changes = EditionChanges {
            remove_pdf: true,
            ..Default::default()
        };
        let pending = apply_files(&mut e, &changes, upload(Some("uploads/new.pdf"), &[]));
        assert_eq!(e.pdf_key.as_deref(), Some("uploads/new.pdf"));
        assert_eq!(pending.keys(), ["uploads/old.pdf".to_string()]);
    }

    #[test]
    fn test_pdf_removal_without_replacement() {
        let mut e = edition();
        let changes = EditionChanges {
            remove_pdf: true,
            ..Default::default()
        };
        let pending = apply_files(&mut e, &changes, ClassifiedUpload::default());
        assert!(e.pdf_key.is_none());
        assert_eq!(pending.keys(), ["uploads/old.pdf".to_string()]);
    }

    #[test]
    fn test_duplicate_page_removed_everywhere_once() {
        let mut e = edition();
        e.page_keys.push("uploads/1.png".into());
        let changes = EditionChanges {
            remove_pages: vec!["uploads/1.png".into(), "uploads/1.png".into()],
            ..Default::default()
        };
        let pending = apply_files(&mut e, &changes, ClassifiedUpload::default());
        assert_eq!(e.page_keys, vec!["uploads/2.png", "uploads/3.png"]);
        assert_eq!(pending.keys().len(), 1);
    }

    #[test]
    fn test_still_referenced_keys_are_kept() {
        let mut e = edition();
        // re-uploaded file with the same name as the current PDF
        let pending = apply_files(
            &mut e,
            &EditionChanges::default(),
            upload(Some("uploads/old.pdf"), &[]),
        );
        assert_eq!(pending.keys(), ["uploads/old.pdf".to_string()]);
        assert!(pending.retain_unreferenced(&e).is_empty());
    }

    #[test]
    fn test_ignored_uploads_become_pending() {
        let mut e = edition();
        let mut batch = ClassifiedUpload::default();
        batch.ignored_keys.push("uploads/readme.txt".into());
        let pending = apply_files(&mut e, &EditionChanges::default(), batch);
        assert_eq!(pending.keys(), ["uploads/readme.txt".to_string()]);
    }
}
