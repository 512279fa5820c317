use axum::{
    body::Body,
    extract::{rejection::FormRejection, Multipart, Path as AxumPath, State},
    http::header,
    response::Response,
    Form, Json,
};
use mime_guess::MimeGuess;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::extract::VideoInfo;
use crate::server::api::{ApiError, ApiResult, FetchInfoForm, UploadResponse};
use crate::server::storage::{plain_file_name, save_field, upload_file_name};
use crate::server::AppState;

/// Multipart field carrying the video
const UPLOAD_FIELD: &str = "file";

/// `POST /upload`: store the upload, stretch it to 2K, answer with the output name
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field
            .file_name()
            .and_then(upload_file_name)
            .filter(|name| state.storage.is_allowed(name))
            .ok_or_else(|| ApiError::bad_request("Invalid file format"))?;

        let upload_path = state.storage.upload_dir.join(&name);
        let size = save_field(&mut field, &upload_path).await?;
        info!("Received upload {} ({} bytes)", name, size);

        let enhancer = state.enhancer.clone();
        let processed_dir = state.storage.processed_dir.clone();
        let enhanced = tokio::task::spawn_blocking(move || enhancer.enhance(&upload_path, &processed_dir))
            .await
            .map_err(|e| {
                error!("Enhancement task for {} failed: {}", name, e);
                ApiError::internal("Enhancement failed unexpectedly.")
            })?
            .map_err(|e| {
                warn!("Enhancing {} failed: {}", name, e);
                ApiError::internal(e.user_message())
            })?;

        let filename = enhanced
            .file_name()
            .ok_or_else(|| ApiError::internal("Output file name is not valid UTF-8"))?
            .to_string();

        return Ok(Json(UploadResponse { filename }));
    }

    Err(ApiError::bad_request("No file uploaded"))
}

/// `GET /download-file/{filename}`: send a processed file as an attachment
pub async fn download_file(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Response> {
    let not_found = || ApiError::not_found("File not found");

    let name = plain_file_name(&filename).ok_or_else(not_found)?;
    let path = state.storage.processed_dir.join(name);

    let file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;
    let metadata = file.metadata().await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    let mime = MimeGuess::from_path(&path).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(name))
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// `POST /fetch-video-info`: resolve a page URL to a direct link and title
pub async fn fetch_video_info(
    State(state): State<AppState>,
    form: Result<Form<FetchInfoForm>, FormRejection>,
) -> ApiResult<Json<VideoInfo>> {
    let url = form
        .ok()
        .and_then(|Form(form)| form.url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::bad_request("No URL provided"))?;

    let extractor = state.extractor.clone();
    let info = tokio::task::spawn_blocking(move || extractor.extract(&url))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| {
            warn!("Video info lookup failed: {}", e);
            ApiError::internal(e.to_string())
        })?;

    Ok(Json(info))
}

/// `attachment; filename="..."`, dropping characters a quoted header value cannot hold
fn content_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') { c } else { '_' })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}
