use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::AppState;
use crate::formats::mime_from_file_name;
use crate::supabase::{BucketOutcome, PolicyOutcome};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

fn fail(status: StatusCode, body: ErrorResponse) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(body))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    success: bool,
    url: String,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    success: bool,
    bucket: String,
    bucket_outcome: BucketOutcome,
    policies: Vec<PolicyOutcome>,
}

struct IncomingFile {
    bytes: Vec<u8>,
    file_name: String,
    mime_type: String,
}

/// POST /api/upload-imagekit
///
/// Multipart fields: `file` (required), `type` (evidence kind, used in the
/// stored name) and `customName` (overrides the generated name).
pub async fn upload_imagekit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let mut file: Option<IncomingFile> = None;
    let mut kind: Option<String> = None;
    let mut custom_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::with_details("Failed to read upload", e.to_string()),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();
        let read_error = |e: axum::extract::multipart::MultipartError| {
            fail(
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_details("Failed to read upload", e.to_string()),
            )
        };

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("evidencia.webp").to_string();
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_from_file_name(&file_name).to_string());
                let bytes = field.bytes().await.map_err(read_error)?;
                file = Some(IncomingFile {
                    bytes: bytes.to_vec(),
                    file_name,
                    mime_type,
                });
            }
            "type" => kind = Some(field.text().await.map_err(read_error)?),
            "customName" => custom_name = Some(field.text().await.map_err(read_error)?),
            _ => {}
        }
    }

    let Some(file) = file.filter(|f| !f.bytes.is_empty()) else {
        tracing::warn!("upload-imagekit called without a file");
        return Err(fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::with_details("No file provided", "multipart field 'file' is required"),
        ));
    };

    let Some(imagekit) = state.imagekit.as_ref() else {
        return Err(fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::with_details("Upload failed", "ImageKit is not configured"),
        ));
    };

    let stored_name = stored_file_name(&file.file_name, kind.as_deref(), custom_name.as_deref());
    match imagekit
        .upload_bytes(file.bytes, &stored_name, &file.mime_type)
        .await
    {
        Ok(hosted) => {
            tracing::info!(file = %stored_name, url = %hosted.url, "evidence uploaded");
            Ok(Json(UploadResponse {
                success: true,
                url: hosted.url,
            }))
        }
        Err(e) => {
            tracing::error!("ImageKit upload failed: {}", e);
            Err(fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details("Upload failed", e.to_string()),
            ))
        }
    }
}

/// `customName` wins; otherwise `{type}_{millis}`. The original extension
/// is kept either way.
fn stored_file_name(original: &str, kind: Option<&str>, custom_name: Option<&str>) -> String {
    let extension = original
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "webp".to_string());

    let stem = match custom_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!(
            "{}_{}",
            kind.map(str::trim)
                .filter(|k| !k.is_empty())
                .unwrap_or("evidencia"),
            chrono::Utc::now().timestamp_millis()
        ),
    };

    format!("{}.{}", stem, extension)
}

/// GET /api/setup
pub async fn setup(State(state): State<AppState>) -> ApiResult<SetupResponse> {
    let Some(supabase) = state.supabase.as_ref() else {
        return Err(fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::with_details("Setup failed", "Supabase is not configured"),
        ));
    };

    match supabase.provision_storage(&state.bucket).await {
        Ok(report) => Ok(Json(SetupResponse {
            success: true,
            bucket: report.bucket,
            bucket_outcome: report.bucket_outcome,
            policies: report.policies,
        })),
        Err(e) => {
            tracing::error!("Storage setup failed: {}", e);
            Err(fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details("Setup failed", e.to_string()),
            ))
        }
    }
}

/// GET /api/revisiones/:id
pub async fn get_revision(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id: i64 = id.trim().parse().map_err(|_| {
        fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(format!("Invalid revision id: {}", id)),
        )
    })?;

    let Some(supabase) = state.supabase.as_ref() else {
        return Err(fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::with_details("Lookup failed", "Supabase is not configured"),
        ));
    };

    match supabase.get_revision(id).await {
        Ok(Some(revision)) => serde_json::to_value(revision).map(Json).map_err(|e| {
            fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details("Lookup failed", e.to_string()),
            )
        }),
        Ok(None) => Err(fail(
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("Revision {} not found", id)),
        )),
        Err(e) => {
            tracing::error!("Revision lookup failed: {}", e);
            Err(fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details("Lookup failed", e.to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name_custom() {
        assert_eq!(
            stored_file_name("foto.WEBP", Some("fachada"), Some(" casita-7 ")),
            "casita-7.webp"
        );
    }

    #[test]
    fn test_stored_file_name_from_type() {
        let name = stored_file_name("foto.webp", Some("techo"), None);
        assert!(name.starts_with("techo_"));
        assert!(name.ends_with(".webp"));
    }

    #[test]
    fn test_stored_file_name_defaults() {
        let name = stored_file_name("blob", None, Some("  "));
        assert!(name.starts_with("evidencia_"));
        assert!(name.ends_with(".webp"));
    }
}
