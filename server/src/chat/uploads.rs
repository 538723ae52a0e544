//! Image Upload Handling
//!
//! Images arrive inline with a send request as base64 or a `data:` URL.
//! They are decoded, sniffed with magic bytes, and handed to a
//! [`MediaUploader`] which returns the hosted URL.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;
use tracing::warn;

use crate::error::AppError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while hosting an image.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Image uploads are not configured.
    #[error("Image uploads are not configured")]
    NotConfigured,

    /// Payload is not valid base64.
    #[error("Invalid image encoding")]
    Decode,

    /// Image too large.
    #[error("Image too large (max: {max_size} bytes)")]
    TooLarge {
        /// Maximum allowed size in bytes.
        max_size: usize,
    },

    /// Content is not an image.
    #[error("Invalid file type: {mime_type}")]
    InvalidMimeType {
        /// The rejected MIME type.
        mime_type: String,
    },

    /// Storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Decode | UploadError::TooLarge { .. } | UploadError::InvalidMimeType { .. } => {
                Self::Validation(err.to_string())
            }
            UploadError::NotConfigured | UploadError::Storage(_) => Self::Service(err.to_string()),
        }
    }
}

/// Image hosting collaborator: stores an inline image and returns its URL.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, image: &str) -> Result<String, UploadError>;
}

/// A decoded, verified image ready for storage.
#[derive(Debug)]
pub struct DecodedImage {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub extension: &'static str,
}

/// Decode a base64 or `data:<mime>;base64,` image and verify its content.
pub fn decode_image(input: &str, max_size: usize) -> Result<DecodedImage, UploadError> {
    let payload = match input.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or(UploadError::Decode)?,
        None => input,
    };

    // Cheap bound before decoding: 4 base64 chars per 3 bytes
    if payload.len() / 4 * 3 > max_size + 3 {
        return Err(UploadError::TooLarge { max_size });
    }

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|_| UploadError::Decode)?;
    if data.len() > max_size {
        return Err(UploadError::TooLarge { max_size });
    }

    // Magic byte detection; the claimed data-URL type is not trusted
    match infer::get(&data) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(DecodedImage {
            data,
            mime_type: kind.mime_type(),
            extension: kind.extension(),
        }),
        Some(kind) => Err(UploadError::InvalidMimeType {
            mime_type: kind.mime_type().to_string(),
        }),
        None => {
            warn!(size = data.len(), "Image content does not match any known signature");
            Err(UploadError::InvalidMimeType {
                mime_type: "unrecognized content".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest valid PNG header the sniffer recognises.
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn test_decode_data_url_png() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(PNG));
        let image = decode_image(&url, 1024).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.extension, "png");
        assert_eq!(image.data, PNG);
    }

    #[test]
    fn test_decode_plain_base64() {
        let image = decode_image(&STANDARD.encode(PNG), 1024).unwrap();
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_rejects_non_image() {
        let pdf = STANDARD.encode(b"%PDF-1.4 some document");
        assert!(matches!(
            decode_image(&pdf, 1024),
            Err(UploadError::InvalidMimeType { .. })
        ));

        let text = STANDARD.encode(b"just text");
        assert!(matches!(
            decode_image(&text, 1024),
            Err(UploadError::InvalidMimeType { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_encoding_and_size() {
        assert!(matches!(decode_image("!!!", 1024), Err(UploadError::Decode)));
        assert!(matches!(
            decode_image("data:image/png,abc", 1024),
            Err(UploadError::Decode)
        ));
        assert!(matches!(
            decode_image(&STANDARD.encode(PNG), 4),
            Err(UploadError::TooLarge { max_size: 4 })
        ));
    }

    #[test]
    fn test_upload_errors_map_to_request_errors() {
        assert!(matches!(
            AppError::from(UploadError::Decode),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(UploadError::Storage("boom".into())),
            AppError::Service(_)
        ));
    }
}
