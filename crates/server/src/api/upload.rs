use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Response;
use darkroom_gateway::UploadIngest;
use darkroom_gateway::upload::FILE_FIELD;
use tracing::{debug, instrument};

use crate::auth::Operator;
use crate::error::ServerError;

use super::{AppState, relay};

/// `POST /api/upload` -- ingest one file from a multipart body and create it
/// upstream under the service API key.
///
/// The first part named `file` is the upload; later file parts are skipped.
/// Text fields `fileCreatedAt`, `fileModifiedAt` and `lastModified` sent
/// before it become timestamp hints.
#[instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    Operator(_operator): Operator,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServerError> {
    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let mut ingest = UploadIngest::new();

    while let Some(mut field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_owned();

        if name == FILE_FIELD {
            let filename = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            if !ingest.begin_file(filename.as_deref(), content_type.as_deref()) {
                continue;
            }
            while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
                ingest.push_chunk(&chunk);
            }
            ingest.end_file();
        } else if field.file_name().is_none() {
            let value = field.text().await.map_err(bad_multipart)?;
            ingest.text_field(&name, &value);
        } else {
            debug!(field = %name, "skipping unexpected file field");
        }
    }

    let (item, hints) = ingest.finish()?;
    let response = state.uploads.upload(item, &hints).await?;
    Ok(relay(response))
}

fn bad_multipart(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ServerError::PayloadTooLarge(err.body_text());
    }
    ServerError::BadRequest(format!("invalid multipart body: {}", err.body_text()))
}
