//! Image ingestion: validates the client payload and carries it through
//! unchanged to the provider adapters.
//!
//! Accepts either a `data:image/...;base64,` URL or a bare base64 string.
//! Bare payloads get a data URL synthesized from their magic bytes.

use base64::Engine as _;
use thiserror::Error;

/// Default ceiling for the decoded image size (10 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Media type assumed when magic bytes are not recognized.
const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("No image provided")]
    Missing,

    #[error("Unsupported media type '{0}', expected an image")]
    UnsupportedType(String),

    #[error("Image data is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("Image too large ({size} bytes), maximum is {max} bytes")]
    TooLarge { size: usize, max: usize },
}

/// A validated image ready to be forwarded to a vision backend.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    data_url: String,
    mime_type: String,
    /// Byte offset of the base64 payload inside `data_url`.
    data_start: usize,
    decoded_len: usize,
}

impl ImagePayload {
    /// Validate a client-supplied image string.
    pub fn from_client(raw: &str, max_bytes: usize) -> Result<Self, ImageError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageError::Missing);
        }

        let (declared_mime, payload) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    ImageError::InvalidEncoding("data URL has no ',' separator".into())
                })?;
                let mut parts = header.split(';');
                let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
                if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                    return Err(ImageError::InvalidEncoding(
                        "data URL is not base64-encoded".into(),
                    ));
                }
                if !mime.starts_with("image/") {
                    return Err(ImageError::UnsupportedType(mime));
                }
                (Some(mime), payload)
            }
            None => (None, raw),
        };

        // Line-wrapped base64 is common from some clients; providers want it flat.
        let payload: String = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
            payload.chars().filter(|c| !c.is_ascii_whitespace()).collect()
        } else {
            payload.to_string()
        };
        if payload.is_empty() {
            return Err(ImageError::Missing);
        }

        // Reject oversized payloads before paying for a full decode.
        let estimated = payload.len() / 4 * 3;
        if estimated > max_bytes.saturating_add(3) {
            return Err(ImageError::TooLarge {
                size: estimated,
                max: max_bytes,
            });
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| ImageError::InvalidEncoding(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageError::Missing);
        }
        if bytes.len() > max_bytes {
            return Err(ImageError::TooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }

        let mime_type = declared_mime
            .unwrap_or_else(|| sniff_mime(&bytes).unwrap_or(FALLBACK_MIME).to_string());
        let prefix = format!("data:{mime_type};base64,");
        let data_start = prefix.len();

        Ok(Self {
            data_url: prefix + &payload,
            mime_type,
            data_start,
            decoded_len: bytes.len(),
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// The base64 payload without the data URL header.
    pub fn base64_data(&self) -> &str {
        &self.data_url[self.data_start..]
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded_len
    }
}

/// Detect the image media type from magic bytes.
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        Some("image/jpeg")
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.len() >= 6 && (&bytes[0..6] == b"GIF87a" || &bytes[0..6] == b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"heic" | b"heix" | b"mif1")
    {
        Some("image/heic")
    } else {
        None
    }
}
