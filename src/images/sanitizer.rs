//! Upload acceptance and re-encoding.
//!
//! An upload is accepted only if it fits the size ceiling and both its file
//! extension and declared content type are JPEG or PNG. Accepted bytes are
//! decoded and written out as a fresh 500x500 JPEG under a random name, so
//! whatever else the original carried (metadata, trailing payloads) is gone.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageReader, Limits};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];
pub const OUTPUT_SIZE: u32 = 500;
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";
const JPEG_QUALITY: u8 = 90;
const MAX_SOURCE_DIMENSION: u32 = 8192;
// Ceiling on decoder buffers, whatever the header claims.
const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

pub const REJECT_TOO_LARGE: &str = "image must not exceed the size limit";
pub const REJECT_TYPE: &str = "only JPG or PNG images are allowed";

/// Raw upload as received from the client.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Upload that passed `accept`. Only constructible through it.
#[derive(Debug)]
pub struct AcceptedUpload {
    body: Bytes,
}

/// Re-encoded image ready for storage.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub file_name: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadSanitizer {
    max_bytes: usize,
}

impl UploadSanitizer {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn accept(&self, candidate: UploadCandidate) -> Result<AcceptedUpload, AppError> {
        if candidate.body.len() > self.max_bytes {
            warn!(size = candidate.body.len(), max = self.max_bytes, "upload rejected: too large");
            return Err(AppError::ImageRejected(REJECT_TOO_LARGE));
        }

        let extension_ok = candidate
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let content_type_ok = candidate
            .content_type
            .as_deref()
            .map(|ct| ALLOWED_CONTENT_TYPES.contains(&ct.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false);

        if !(extension_ok && content_type_ok) {
            warn!(
                content_type = candidate.content_type.as_deref().unwrap_or("-"),
                file_name = candidate.file_name.as_deref().unwrap_or("-"),
                "upload rejected: file type"
            );
            return Err(AppError::ImageRejected(REJECT_TYPE));
        }

        Ok(AcceptedUpload {
            body: candidate.body,
        })
    }

    /// Re-encodes on the blocking pool. The source bytes are dropped when
    /// this returns, whatever the outcome.
    pub async fn process(&self, accepted: AcceptedUpload) -> Result<ProcessedImage, AppError> {
        let AcceptedUpload { body } = accepted;
        let encoded = tokio::task::spawn_blocking(move || reencode(&body)).await;

        match encoded {
            Ok(Ok(jpeg)) => {
                let file_name = generate_file_name();
                info!(file_name = %file_name, size = jpeg.len(), "image processed");
                Ok(ProcessedImage {
                    file_name,
                    body: Bytes::from(jpeg),
                })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "image could not be re-encoded");
                Err(AppError::ImageProcessingFailed)
            }
            Err(e) => {
                error!(error = %e, "image task failed");
                Err(AppError::ImageProcessingFailed)
            }
        }
    }
}

/// Decodes `source` and writes a cover-cropped `OUTPUT_SIZE` square JPEG.
pub fn reencode(source: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut reader = ImageReader::new(Cursor::new(source)).with_guessed_format()?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    let decoded = reader.decode()?;
    let resized = decoded.resize_to_fill(OUTPUT_SIZE, OUTPUT_SIZE, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}

/// Random storage name, never derived from client input.
pub fn generate_file_name() -> String {
    format!("profile-{}.jpg", Uuid::new_v4().simple())
}

/// Whether `name` has the shape `generate_file_name` produces.
pub fn is_generated_file_name(name: &str) -> bool {
    let Some(id) = name
        .strip_prefix("profile-")
        .and_then(|rest| rest.strip_suffix(".jpg"))
    else {
        return false;
    };
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
