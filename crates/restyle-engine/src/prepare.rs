use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageReader;

/// A parsed `data:<mime>;base64,<data>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub data: String,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self::new(mime_type, BASE64.encode(bytes))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let Some(rest) = raw.trim().strip_prefix("data:") else {
            bail!("not a data URI");
        };
        let Some((header, data)) = rest.split_once(',') else {
            bail!("data URI has no payload separator");
        };
        let mut fields = header.split(';');
        let mime_type = fields.next().unwrap_or_default().trim();
        if !fields.any(|field| field.trim().eq_ignore_ascii_case("base64")) {
            bail!("data URI payload is not base64");
        }
        Ok(Self::new(
            if mime_type.is_empty() {
                "application/octet-stream"
            } else {
                mime_type
            },
            data.trim(),
        ))
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .context("data URI base64 decode failed")
    }

    pub fn to_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// The photo a batch is generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

impl UploadedImage {
    pub fn from_data_uri(data_uri: String) -> Result<Self> {
        let (width, height) = dimensions(&data_uri)?;
        Ok(Self {
            data_uri,
            width,
            height,
        })
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    /// Base64 payload without the `data:...;base64,` prefix.
    pub fn base64_payload(&self) -> &str {
        self.data_uri
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or_default()
    }
}

/// Reads an image file into a base64 data URI. The MIME type is sniffed from
/// the bytes, then the extension, then defaults to `image/png`.
pub fn to_data_uri(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime = image::guess_format(&bytes)
        .ok()
        .map(|format| format.to_mime_type())
        .or_else(|| mime_for_path(path))
        .unwrap_or("image/png");
    Ok(DataUri::from_bytes(mime, &bytes).to_uri())
}

/// Pixel dimensions of the image inside a data URI.
pub fn dimensions(data_uri: &str) -> Result<(u32, u32)> {
    let bytes = DataUri::parse(data_uri)?.decode_bytes()?;
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("image format detection failed")?;
    let dims = reader
        .into_dimensions()
        .context("data URI does not decode as an image")?;
    Ok(dims)
}

pub fn load_upload(path: &Path) -> Result<UploadedImage> {
    let data_uri = to_data_uri(path)?;
    UploadedImage::from_data_uri(data_uri)
        .with_context(|| format!("cannot process image {}", path.display()))
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
