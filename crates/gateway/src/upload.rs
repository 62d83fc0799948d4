//! Multipart upload transport
//!
//! Streams each file part straight to `<base_dir>/uploads/` under a
//! generated name and collects the text parts. Everything written for a
//! request is tracked so it can be discarded if the request is rejected.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use pressroom_common::edition::UploadedFile;
use pressroom_common::errors::{AppError, Result};
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Per-request upload bounds.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_bytes: usize,
}

/// Parsed multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, Vec<String>>,
    files: Vec<UploadedFile>,
    written: Vec<PathBuf>,
}

impl UploadForm {
    /// Read every part of `multipart`, writing files into `uploads_dir`.
    ///
    /// On failure any file already written is removed before returning.
    pub async fn read(mut multipart: Multipart, uploads_dir: &Path, limits: UploadLimits) -> Result<Self> {
        tokio::fs::create_dir_all(uploads_dir).await?;

        let mut form = UploadForm::default();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    form.discard().await;
                    return Err(multipart_error(e, &limits));
                }
            };

            if let Err(e) = form.accept(field, uploads_dir, &limits).await {
                form.discard().await;
                return Err(e);
            }
        }

        debug!(files = form.files.len(), fields = form.fields.len(), "Multipart form read");
        Ok(form)
    }

    async fn accept(&mut self, field: Field<'_>, uploads_dir: &Path, limits: &UploadLimits) -> Result<()> {
        let name = field.name().unwrap_or_default().to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(|e| multipart_error(e, limits))?;
            self.fields.entry(name).or_default().push(value);
            return Ok(());
        };

        if self.files.len() >= limits.max_files {
            return Err(AppError::validation(
                "files",
                format!("At most {} files may be uploaded at once", limits.max_files),
            ));
        }

        let path = uploads_dir.join(stored_file_name(&name, &original_name));
        self.written.push(path.clone());
        stream_to_disk(field, &path, limits).await?;

        self.files
            .push(UploadedFile::new(original_name, path.to_string_lossy()));
        Ok(())
    }

    /// First value of a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values of a repeated text field. A single value holding a JSON
    /// array of strings is expanded.
    pub fn texts(&self, name: &str) -> Vec<String> {
        let values = self.fields.get(name).cloned().unwrap_or_default();
        if let [only] = values.as_slice() {
            if let Ok(list) = serde_json::from_str::<Vec<String>>(only) {
                return list;
            }
        }
        values
    }

    /// Boolean field; only the literal `true` is true.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.text(name).map(|v| v == "true")
    }

    pub fn take_files(&mut self) -> Vec<UploadedFile> {
        std::mem::take(&mut self.files)
    }

    #[cfg(test)]
    pub(crate) fn from_fields(fields: &[(&str, &str)]) -> Self {
        let mut form = UploadForm::default();
        for (name, value) in fields {
            form.fields
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        form
    }

    /// Remove every file written for this request.
    pub async fn discard(&self) {
        for path in &self.written {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Discarded upload"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Could not discard upload"),
            }
        }
    }
}

async fn stream_to_disk(mut field: Field<'_>, path: &Path, limits: &UploadLimits) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limits))? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// `<field>_<unix-millis>_<random><.ext>`, keeping the client's extension.
pub fn stored_file_name(field: &str, original_name: &str) -> String {
    let field: String = field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let field = if field.is_empty() { "file".to_string() } else { field };

    let extension = Path::new(original_name)
        .extension()
        .map(|ext| ext.to_string_lossy())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000_000);

    format!("{field}_{millis}_{nonce}{extension}")
}

fn multipart_error(e: MultipartError, limits: &UploadLimits) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            limit: limits.max_bytes,
        }
    } else {
        AppError::validation("files", e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> UploadForm {
        UploadForm::from_fields(fields)
    }

    #[test]
    fn test_stored_file_name_shape() {
        let name = stored_file_name("files", "Front Page.PNG");
        let parts: Vec<&str> = name.splitn(3, '_').collect();
        assert_eq!(parts[0], "files");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].ends_with(".PNG"));

        let nonce: u64 = parts[2].trim_end_matches(".PNG").parse().unwrap();
        assert!(nonce < 1_000_000_000);
    }

    #[test]
    fn test_stored_file_name_strips_path_tricks() {
        let name = stored_file_name("../files", "evil.pdf/../../x");
        assert!(name.starts_with("files_"));
        assert!(!name.contains('/'));

        assert!(stored_file_name("", "noext").starts_with("file_"));
        assert!(!stored_file_name("files", "noext").contains('.'));
    }

    #[test]
    fn test_flag_only_literal_true() {
        let form = form(&[("a", "true"), ("b", "TRUE"), ("c", "1"), ("d", "false")]);
        assert_eq!(form.flag("a"), Some(true));
        assert_eq!(form.flag("b"), Some(false));
        assert_eq!(form.flag("c"), Some(false));
        assert_eq!(form.flag("d"), Some(false));
        assert_eq!(form.flag("missing"), None);
    }

    #[test]
    fn test_texts_repeated_or_json_array() {
        let repeated = form(&[("deletePages", "/uploads/1.png"), ("deletePages", "/uploads/2.png")]);
        assert_eq!(repeated.texts("deletePages"), vec!["/uploads/1.png", "/uploads/2.png"]);

        let json = form(&[("deletePages", r#"["/uploads/1.png","/uploads/3.png"]"#)]);
        assert_eq!(json.texts("deletePages"), vec!["/uploads/1.png", "/uploads/3.png"]);

        let single = form(&[("deletePages", "/uploads/1.png")]);
        assert_eq!(single.texts("deletePages"), vec!["/uploads/1.png"]);

        assert!(single.texts("other").is_empty());
    }

    #[tokio::test]
    async fn test_discard_removes_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.png");
        let written = dir.path().join("written.png");
        std::fs::write(&kept, b"k").unwrap();
        std::fs::write(&written, b"w").unwrap();

        let mut form = UploadForm::default();
        form.written.push(written.clone());
        form.written.push(dir.path().join("never-created.png"));
        form.discard().await;

        assert!(!written.exists());
        assert!(kept.exists());
    }
}
