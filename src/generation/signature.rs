//! Signature image payloads.
//!
//! A signature arrives as an uploaded file, as a `data:image/...;base64,`
//! URI from a drawing canvas, or both. Any payload that is present must be a
//! non-empty PNG, JPEG or GIF; the upload wins when both are valid.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::GenerationError;
use crate::template::ImageFormat;

#[derive(Debug, Clone, Default)]
pub struct SignatureInput {
    pub upload: Option<Vec<u8>>,
    pub data_uri: Option<String>,
}

impl SignatureInput {
    pub fn is_empty(&self) -> bool {
        self.upload.is_none() && self.data_uri.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    /// Validate every supplied payload and return the image bytes to embed.
    pub fn decode(&self) -> Result<Option<Arc<[u8]>>, GenerationError> {
        let uploaded = match &self.upload {
            Some(bytes) => Some(check_image(bytes.clone(), "uploaded signature")?),
            None => None,
        };

        let drawn = match self.data_uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => Some(decode_data_uri(uri)?),
            _ => None,
        };

        Ok(uploaded.or(drawn))
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI holding an image.
pub fn decode_data_uri(uri: &str) -> Result<Arc<[u8]>, GenerationError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| invalid("signature is not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("data URI has no payload separator"))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("data URI must be base64 encoded"))?;
    if !mime.to_ascii_lowercase().starts_with("image/") {
        return Err(invalid(format!("declared type '{}' is not an image", mime)));
    }

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(invalid("data URI payload is empty"));
    }

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| invalid(format!("payload is not valid base64: {}", e)))?;
    check_image(bytes, "data URI payload")
}

fn check_image(bytes: Vec<u8>, what: &str) -> Result<Arc<[u8]>, GenerationError> {
    if bytes.is_empty() {
        return Err(invalid(format!("{} is empty", what)));
    }
    if ImageFormat::detect(&bytes).is_none() {
        return Err(invalid(format!("{} is not a PNG, JPEG or GIF image", what)));
    }
    Ok(Arc::from(bytes))
}

fn invalid(message: impl Into<String>) -> GenerationError {
    GenerationError::ImagePayload(message.into())
}
