//! Upload classification by content signature
//!
//! The declared file name and content type of an upload are never trusted; the
//! category and subtype come from the payload's magic bytes.

use crate::error::{Error, Result};
use infer::MatcherType;
use std::fmt;
use tracing::warn;

/// Media accepted by the upload endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// The only MIME type the matching buffer stores
    pub fn required_mime(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Audio => "audio/mpeg",
        }
    }

    /// File extension used for stored resources
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Audio => "mp3",
        }
    }

    /// File name prefix for stored resources
    pub fn as_prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        }
    }

    /// Human-readable name of the accepted format
    pub fn accepted_format(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Audio => "mp3",
        }
    }

    fn matches_category(&self, matcher: MatcherType) -> bool {
        matches!(
            (self, matcher),
            (MediaKind::Image, MatcherType::Image) | (MediaKind::Audio, MatcherType::Audio)
        )
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "an image"),
            MediaKind::Audio => write!(f, "an audio"),
        }
    }
}

/// Check that `payload` is exactly the media the `expected` buffer accepts
///
/// Returns `WrongKind` when the sniffed category differs and `WrongSubtype` when the
/// category matches but the MIME type does not.
pub fn validate(payload: &[u8], expected: MediaKind, declared_filename: &str) -> Result<()> {
    let detected = infer::get(payload);
    let detected_mime = detected
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "an unknown type".to_string());

    let category_ok = detected
        .map(|t| expected.matches_category(t.matcher_type()))
        .unwrap_or(false);

    if !category_ok {
        warn!(
            "Uploaded file '{}' will not be saved: expected {} file, detected {}",
            declared_filename, expected, detected_mime
        );
        return Err(Error::WrongKind {
            expected,
            detected: detected_mime,
        });
    }

    if detected_mime != expected.required_mime() {
        warn!(
            "Uploaded file '{}' will not be saved: filetype must be '{}', not '{}'",
            declared_filename,
            expected.required_mime(),
            detected_mime
        );
        return Err(Error::WrongSubtype {
            expected,
            detected: detected_mime,
        });
    }

    Ok(())
}
