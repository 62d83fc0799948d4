//! Edition handlers
//!
//! Multipart create/update, date-window queries and delete. Every response
//! body is a `{ "message", "data" }` envelope.

use axum::{
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::upload::{UploadForm, UploadLimits};
use crate::AppState;
use pressroom_common::{
    edition::{EditionChanges, EditionView, NewEditionInput},
    errors::{AppError, Result},
};

/// Response envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    fn new(message: &str, data: T) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
            data: Some(data),
        })
    }
}

/// Query for `GET /api/upload/data`
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub date: Option<String>,
    pub month: Option<String>,
}

/// Edition id from the path. Anything but a UUID is a validation error.
#[derive(Debug, Clone, Copy)]
pub struct EditionId(pub Uuid);

impl<S> FromRequestParts<S> for EditionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::validation("id", e.body_text()))?;

        Uuid::parse_str(&raw)
            .map(EditionId)
            .map_err(|_| AppError::validation("id", format!("'{raw}' is not a valid edition id")))
    }
}

fn limits(state: &AppState) -> UploadLimits {
    UploadLimits {
        max_files: state.config.server.max_files_per_request,
        max_bytes: state.config.server.max_upload_bytes,
    }
}

async fn read_form(state: &AppState, multipart: Multipart) -> Result<UploadForm> {
    UploadForm::read(multipart, &state.config.uploads_dir(), limits(state)).await
}

/// Create an edition from a multipart upload
pub async fn create_edition(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<EditionView>>)> {
    let mut form = read_form(&state, multipart).await?;

    let input = NewEditionInput {
        title: form.text("title").unwrap_or_default().to_string(),
        date: form.text("date").map(str::to_string),
        is_special_edition: form.flag("isSpecialEdition"),
    };
    let files = form.take_files();

    match state.service.insert(input, files).await {
        Ok(view) => Ok((StatusCode::CREATED, Envelope::new("Upload successful", view))),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

/// Editions for one day (`?date=YYYY-MM-DD`) or one month (`?month=YYYY-MM`)
pub async fn fetch_editions(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Envelope<Vec<EditionView>>>> {
    let editions = match (query.date.as_deref(), query.month.as_deref()) {
        (Some(day), _) => state.service.fetch_by_day(day).await?,
        (None, Some(month)) => state.service.fetch_by_month(month).await?,
        (None, None) => {
            return Err(AppError::validation(
                "date",
                "Provide 'date' (YYYY-MM-DD) or 'month' (YYYY-MM)",
            ))
        }
    };

    Ok(Envelope::new("Uploads fetched successfully", editions))
}

/// Every edition, newest first
pub async fn list_editions(State(state): State<AppState>) -> Result<Json<Envelope<Vec<EditionView>>>> {
    let editions = state.service.list_all().await?;
    Ok(Envelope::new("ok", editions))
}

/// Get one edition by ID
pub async fn get_edition(
    State(state): State<AppState>,
    EditionId(id): EditionId,
) -> Result<Json<Envelope<EditionView>>> {
    let view = state.service.get_view(id).await?;
    Ok(Envelope::new("ok", view))
}

/// Update scalars, replace the PDF, append pages and excise pages
pub async fn update_edition(
    State(state): State<AppState>,
    EditionId(id): EditionId,
    multipart: Multipart,
) -> Result<Json<Envelope<EditionView>>> {
    let mut form = read_form(&state, multipart).await?;

    let changes = changes_from_form(&form);
    let files = form.take_files();

    match state.service.update(id, changes, files).await {
        Ok(view) => Ok(Envelope::new("updated", view)),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

/// Delete an edition and its files
pub async fn delete_edition(
    State(state): State<AppState>,
    EditionId(id): EditionId,
) -> Result<Json<Envelope<serde_json::Value>>> {
    state.service.remove(id).await?;

    Ok(Json(Envelope {
        message: "deleted".to_string(),
        data: Some(serde_json::json!({ "_id": id })),
    }))
}

fn changes_from_form(form: &UploadForm) -> EditionChanges {
    EditionChanges {
        title: form.text("title").map(str::to_string),
        date: form.text("date").map(str::to_string),
        is_special_edition: form.flag("isSpecialEdition"),
        remove_pdf: form.flag("removePdf").unwrap_or(false),
        remove_pages: form.texts("deletePages"),
    }
}
