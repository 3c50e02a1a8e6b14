//! Message attachment uploads

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    routing::post,
    Extension, Json, Router,
};
use parlor_auth::AuthenticatedUser;
use parlor_chats::AttachmentStorage;
use serde::Serialize;
use tracing::{error, info};

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

/// Multipart field that carries the uploaded files.
const FILES_FIELD: &str = "files";
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_urls: Vec<String>,
}

pub fn create_message_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/messages/upload-files", post(upload_message_files))
}

/// Stores every `files` part under the upload directory with a generated name
/// and returns the paths to put in a message's attachments.
pub async fn upload_message_files(
    State(state): State<Arc<GatewayState>>,
    Extension(user): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> GatewayResult<Json<UploadResponse>> {
    let upload_dir = state.uploads().upload_dir();
    let mut file_urls = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| GatewayError::InvalidRequest("invalid multipart body".to_string()))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let file_name = generated_file_name(field.file_name());
        let data = field
            .bytes()
            .await
            .map_err(|_| GatewayError::InvalidRequest("invalid file upload".to_string()))?;

        if file_urls.is_empty() {
            tokio::fs::create_dir_all(&upload_dir).await.map_err(|err| {
                error!(path = %upload_dir.display(), error = %err, "failed to create upload directory");
                GatewayError::InternalError("failed to store uploaded files".to_string())
            })?;
        }

        let path = upload_dir.join(&file_name);
        tokio::fs::write(&path, &data).await.map_err(|err| {
            error!(path = %path.display(), error = %err, "failed to write uploaded file");
            GatewayError::InternalError("failed to store uploaded files".to_string())
        })?;

        file_urls.push(AttachmentStorage::public_path(&file_name));
    }

    if file_urls.is_empty() {
        return Err(GatewayError::InvalidRequest("no files uploaded".to_string()));
    }

    info!(user_id = %user.user_id, files = file_urls.len(), "stored message attachments");
    Ok(Json(UploadResponse {
        success: true,
        file_urls,
    }))
}

/// A fresh id plus the client's extension when it is plain alphanumeric.
fn generated_file_name(original: Option<&str>) -> String {
    let id = cuid2::cuid();
    let extension = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match extension {
        Some(ext) => format!("{id}.{}", ext.to_ascii_lowercase()),
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_valid_attachment_files() {
        for original in [Some("cat.PNG"), Some("../../parlor.db"), Some("noext"), Some("a.t@r"), None] {
            let name = generated_file_name(original);
            assert!(AttachmentStorage::is_valid_path(&AttachmentStorage::public_path(&name)));
            assert!(!name.contains(".."));
        }
        assert!(generated_file_name(Some("cat.PNG")).ends_with(".png"));
        assert!(!generated_file_name(Some("a.t@r")).contains('.'));
    }
}
