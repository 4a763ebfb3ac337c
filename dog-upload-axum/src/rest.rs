use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use dog_upload::{ByteStream, RequestHead, UploadRequest, UploadResponse, UploadResult};
use futures::TryStreamExt;
use tracing::debug;

use crate::{UploadAxumState, UploadHttpError};

/// POST starts simple, multipart and resumable uploads; PUT carries resumable chunks
pub fn upload_router(state: UploadAxumState) -> Router<()> {
    Router::new()
        .route("/", routing::post(handle_upload).put(handle_upload))
        .with_state(state)
}

async fn handle_upload(State(state): State<UploadAxumState>, request: Request) -> Response {
    let mut upload = upload_request(request);
    debug!(method = %upload.head().method, path = %upload.head().path, "upload request");

    let result = state
        .uploads
        .handle_request(&mut upload, state.form.as_deref())
        .await;
    render(result)
}

/// Convert an axum request, keeping the path the client used so `Location` points back here
pub fn upload_request(request: Request) -> UploadRequest {
    let (parts, body) = request.into_parts();

    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let body: ByteStream = Box::pin(body.into_data_stream().map_err(std::io::Error::other));
    let head = RequestHead {
        method: parts.method,
        path,
        query: Vec::new(),
        headers: parts.headers,
    };

    let upload = UploadRequest::from_parts(head, body);
    match parts.uri.query() {
        Some(query) => upload.with_query_string(query),
        None => upload,
    }
}

pub fn render(mut result: UploadResult) -> Response {
    if let Some(error) = result.error.take() {
        let mut err = UploadHttpError::from(error);
        if err.code < 500 {
            if let Some(errors) = result.form_errors.take() {
                err = err.with_errors(errors.into_value());
            }
        }
        return err.into_response();
    }

    if let Some(errors) = result.form_errors.take() {
        return UploadHttpError::from_form_errors(errors).into_response();
    }

    into_axum(result.into_response())
}

fn into_axum(response: UploadResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut res = match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };
    res.headers_mut().extend(response.headers);
    res
}
