//! HTTP request handlers
//!
//! Handlers only translate between HTTP and the buffer engine. Filesystem and audio
//! work runs on the blocking pool.

use crate::buffer::PoolName;
use crate::error::{Error, Result};
use crate::media::MediaKind;
use crate::AppState;
use axum::{
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use inferno_common::config::MAX_REQUEST_COUNT;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Sentences generated when the caller does not ask for a count
pub const DEFAULT_SENTENCE_COUNT: usize = 3;

/// Bounds of the random clip length used when none is requested
const DEFAULT_CLIP_CHUNKS: std::ops::RangeInclusive<usize> = 3..=10;

const RESOURCE_ADDED: &str = "Resource added";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    pools: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize)]
pub struct TextUpload {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    numsentences: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioQuery {
    clip_duration: Option<String>,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pools = state
        .lifecycle
        .buffers()
        .counts()
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "inferno-poison".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pools,
    })
}

// ============================================================================
// Text
// ============================================================================

/// POST /poison/text
pub async fn post_text(
    State(state): State<AppState>,
    Json(upload): Json<TextUpload>,
) -> Result<impl IntoResponse> {
    let content = upload
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("No content provided".to_string()))?;

    let corpus = state.corpus.clone();
    tokio::task::spawn_blocking(move || corpus.add_fragment(&content)).await??;

    Ok((StatusCode::CREATED, RESOURCE_ADDED))
}

/// GET /poison/text?numsentences=N
///
/// Generation failures still answer 200 with the error text as the body.
pub async fn get_text(
    State(state): State<AppState>,
    Query(query): Query<TextQuery>,
) -> Result<String> {
    let count = parse_count(query.numsentences.as_deref(), DEFAULT_SENTENCE_COUNT);
    debug!("Generating {} sentences", count);

    let corpus = state.corpus.clone();
    let text = tokio::task::spawn_blocking(move || corpus.generate_with_fallback(count)).await?;
    Ok(text)
}

// ============================================================================
// Images
// ============================================================================

/// POST /poison/images (multipart field `image`)
pub async fn post_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let (filename, payload) = read_upload(multipart, "image").await?;

    let lifecycle = state.lifecycle.clone();
    tokio::task::spawn_blocking(move || lifecycle.intake(&payload, &filename, MediaKind::Image))
        .await??;

    Ok((StatusCode::CREATED, RESOURCE_ADDED))
}

/// GET /poison/images
pub async fn get_image(State(state): State<AppState>) -> Result<Response> {
    let lifecycle = state.lifecycle.clone();
    let staged = tokio::task::spawn_blocking(move || lifecycle.serve(PoolName::Image)).await??;
    file_response(&staged, MediaKind::Image.required_mime()).await
}

// ============================================================================
// Audio
// ============================================================================

/// POST /poison/audio (multipart field `audio`)
pub async fn post_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let (filename, payload) = read_upload(multipart, "audio").await?;

    let audio = state.audio.clone();
    let chunks = tokio::task::spawn_blocking(move || audio.ingest(&payload, &filename)).await??;
    info!("Audio upload stored as {} chunks", chunks);

    Ok((StatusCode::CREATED, RESOURCE_ADDED))
}

/// GET /poison/audio?clip_duration=N
pub async fn get_audio(
    State(state): State<AppState>,
    Query(query): Query<AudioQuery>,
) -> Result<Response> {
    let default = rand::thread_rng().gen_range(DEFAULT_CLIP_CHUNKS);
    let chunks = parse_count(query.clip_duration.as_deref(), default);

    let audio = state.audio.clone();
    let staged = tokio::task::spawn_blocking(move || audio.assemble(chunks)).await??;
    file_response(&staged, MediaKind::Audio.required_mime()).await
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a caller-supplied count, falling back to `default` when absent, zero or not
/// an integer, and clamp it to `1..=MAX_REQUEST_COUNT`
pub fn parse_count(raw: Option<&str>, default: usize) -> usize {
    let requested = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n != 0)
        .unwrap_or(default as i64);
    requested.clamp(1, MAX_REQUEST_COUNT as i64) as usize
}

/// Pull the named file field out of a multipart body
async fn read_upload(mut multipart: Multipart, field_name: &str) -> Result<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput("No selected file".to_string()))?;
        let payload = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("Failed to read upload: {}", e)))?;

        debug!("Received upload '{}' ({} bytes)", filename, payload.len());
        return Ok((filename, payload.to_vec()));
    }

    Err(Error::InvalidInput(format!("No file part named '{}'", field_name)))
}

/// Stream a staged file back as an attachment
async fn file_response(path: &Path, content_type: &'static str) -> Result<Response> {
    let body = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_defaults() {
        assert_eq!(parse_count(None, 3), 3);
        assert_eq!(parse_count(Some("abc"), 3), 3);
        assert_eq!(parse_count(Some(""), 7), 7);
    }

    #[test]
    fn test_parse_count_zero_means_default() {
        assert_eq!(parse_count(Some("0"), 3), 3);
        assert_eq!(parse_count(Some(" 0 "), 7), 7);
    }

    #[test]
    fn test_parse_count_clamps() {
        assert_eq!(parse_count(Some("-5"), 3), 1);
        assert_eq!(parse_count(Some("1000"), 3), 100);
        assert_eq!(parse_count(Some(" 42 "), 3), 42);
    }
}
