// src/api.rs

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::extract::ExtractError;
use crate::receipt::{NewReceipt, ReceiptDraft, ReceiptItem, StoredReceipt, de_opt_stringlike};
use crate::server::AppState;
use crate::store::StoreError;

/// Envelope for every successful reply: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Success<T> {
    fn new(data: T) -> Self {
        Success {
            success: true,
            data,
        }
    }
}

/// Create payload as the browser sends it. Everything is optional here so
/// the handler, not the deserializer, decides what "missing" means; `total`
/// arrives as the form's digit string but a bare number is accepted too.
#[derive(Debug, Deserialize)]
pub struct CreateReceiptRequest {
    #[serde(default)]
    pub tanggal: Option<String>,
    #[serde(default)]
    pub toko: Option<String>,
    #[serde(default, deserialize_with = "de_opt_stringlike")]
    pub total: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<ReceiptItem>>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No image provided")]
    MissingImage,
    #[error("Missing required fields: tanggal, toko, total")]
    MissingFields,
    #[error("Invalid multipart upload")]
    Multipart(#[from] MultipartError),
    #[error("Invalid request body")]
    Body(#[from] JsonRejection),
    #[error("Failed to extract receipt data")]
    Extract(#[from] ExtractError),
    #[error("Failed to save receipt")]
    Save(StoreError),
    #[error("Failed to fetch receipts")]
    Fetch(StoreError),
}

/// Error reply body. `details` carries the underlying cause when there is
/// one; caller-input errors have none.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingImage
            | ApiError::MissingFields
            | ApiError::Multipart(_)
            | ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::Extract(_) | ApiError::Save(_) | ApiError::Fetch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let details = match &self {
            ApiError::Multipart(e) => Some(e.to_string()),
            ApiError::Body(e) => Some(e.to_string()),
            ApiError::Extract(e) => Some(e.to_string()),
            ApiError::Save(e) | ApiError::Fetch(e) => Some(e.to_string()),
            ApiError::MissingImage | ApiError::MissingFields => None,
        };

        error!(status = status.as_u16(), error = %self, details = ?details, "Request failed");

        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

/// `POST /api/extract`: multipart upload of one receipt photo, answered
/// with the extracted draft.
pub async fn extract_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Success<ReceiptDraft>>, ApiError> {
    let mut image: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let mime = field.content_type().unwrap_or("image/jpeg").to_string();
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            image = Some((bytes.to_vec(), mime));
        }
        break;
    }

    let (bytes, mime) = image.ok_or(ApiError::MissingImage)?;
    let draft = state.extractor.extract(&bytes, &mime).await?;
    Ok(Json(Success::new(draft)))
}

/// `POST /api/receipts`: persist a confirmed receipt. The body arrives as a
/// `Result` so a malformed payload gets the uniform error shape rather than
/// axum's plain-text rejection.
pub async fn create_receipt(
    State(state): State<AppState>,
    body: Result<Json<CreateReceiptRequest>, JsonRejection>,
) -> Result<Json<Success<StoredReceipt>>, ApiError> {
    let Json(body) = body?;
    let (Some(tanggal), Some(toko), Some(total)) = (body.tanggal, body.toko, body.total) else {
        return Err(ApiError::MissingFields);
    };
    if tanggal.is_empty() || toko.is_empty() || total.is_empty() {
        return Err(ApiError::MissingFields);
    }

    let row = NewReceipt {
        tanggal,
        toko,
        total: coerce_total(&total),
        items: body.items.unwrap_or_default(),
        image_url: body.image_url.filter(|u| !u.is_empty()),
    };

    let stored = state.store.create(&row).await.map_err(ApiError::Save)?;
    Ok(Json(Success::new(stored)))
}

/// `GET /api/receipts`: every stored receipt, most recent first.
pub async fn list_receipts(
    State(state): State<AppState>,
) -> Result<Json<Success<Vec<StoredReceipt>>>, ApiError> {
    let rows = state.store.list().await.map_err(ApiError::Fetch)?;
    Ok(Json(Success::new(rows)))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Storage wants a number; the form sends a digit string. Unparseable or
/// negative input stores as 0 rather than failing the request.
fn coerce_total(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_total() {
        assert_eq!(coerce_total("125000"), 125000.0);
        assert_eq!(coerce_total(" 125000.50 "), 125000.5);
        assert_eq!(coerce_total("abc"), 0.0);
        assert_eq!(coerce_total(""), 0.0);
        assert_eq!(coerce_total("-5"), 0.0);
        assert_eq!(coerce_total("NaN"), 0.0);
    }

    #[test]
    fn test_create_request_total_accepts_string_or_number() {
        let from_string: CreateReceiptRequest =
            serde_json::from_str(r#"{"total": "125000"}"#).unwrap();
        assert_eq!(from_string.total.as_deref(), Some("125000"));

        let from_number: CreateReceiptRequest =
            serde_json::from_str(r#"{"total": 125000}"#).unwrap();
        assert_eq!(from_number.total.as_deref(), Some("125000"));

        let from_null: CreateReceiptRequest = serde_json::from_str(r#"{"total": null}"#).unwrap();
        assert!(from_null.total.is_none());

        let absent: CreateReceiptRequest = serde_json::from_str("{}").unwrap();
        assert!(absent.total.is_none());
    }

    #[test]
    fn test_error_body_omits_absent_details() {
        let body = serde_json::to_string(&ErrorBody {
            error: "No image provided".to_string(),
            details: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"error":"No image provided"}"#);
    }
}
