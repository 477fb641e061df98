use std::fmt;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use reqwest::blocking::Client as HttpClient;

use crate::error::ExportError;
use crate::prepare::DataUri;
use crate::text::slugify;

pub const EXPORT_RATIOS: [&str; 3] = ["4:3", "1:1", "3:4"];
pub const DEFAULT_FILE_PREFIX: &str = "interior";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Parses `"W:H"`. Zero or non-numeric components yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (left, right) = raw.trim().split_once(':')?;
        let width = left.trim().parse::<u32>().ok().filter(|value| *value > 0)?;
        let height = right.trim().parse::<u32>().ok().filter(|value| *value > 0)?;
        Some(Self { width, height })
    }

    pub fn value(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// `4:3` → `4x3`, for file names.
    pub fn slug(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Centered `(x, y, width, height)` crop of a `width`×`height` source that
/// matches `ratio`. Wider sources lose columns, taller sources lose rows.
pub fn crop_rect(width: u32, height: u32, ratio: AspectRatio) -> (u32, u32, u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0, width, height);
    }
    let target = ratio.value();
    let current = width as f64 / height as f64;
    if current > target {
        let crop_w = ((height as f64 * target).round() as u32).clamp(1, width);
        ((width - crop_w) / 2, 0, crop_w, height)
    } else {
        let crop_h = ((width as f64 / target).round() as u32).clamp(1, height);
        (0, (height - crop_h) / 2, width, crop_h)
    }
}

/// Crops a data-URI image to `ratio` and re-encodes it as PNG.
///
/// Any parse or decode failure returns the input unchanged.
pub fn crop(image_uri: &str, ratio: &str) -> String {
    let Some(ratio) = AspectRatio::parse(ratio) else {
        return image_uri.to_string();
    };
    match crop_to_png(image_uri, ratio) {
        Ok(cropped) => cropped,
        Err(err) => {
            log::warn!("crop to {ratio} failed, exporting uncropped image: {err:#}");
            image_uri.to_string()
        }
    }
}

fn crop_to_png(image_uri: &str, ratio: AspectRatio) -> Result<String> {
    let bytes = DataUri::parse(image_uri)?.decode_bytes()?;
    let source = image::load_from_memory(&bytes).context("image decode failed")?;
    let (x, y, w, h) = crop_rect(source.width(), source.height(), ratio);
    let cropped = source.crop_imm(x, y, w, h);
    let mut encoded = Cursor::new(Vec::new());
    cropped
        .write_to(&mut encoded, ImageFormat::Png)
        .context("PNG encode failed")?;
    Ok(DataUri::from_bytes("image/png", encoded.get_ref()).to_uri())
}

/// `<prefix>-<label-slug>-<ratio-slug>-<timestamp>.png`
pub fn download_filename(prefix: &str, label: &str, ratio: &str, at: DateTime<Utc>) -> String {
    let ratio_slug = AspectRatio::parse(ratio)
        .map(|parsed| parsed.slug())
        .unwrap_or_else(|| slugify(ratio));
    let stamp = at.format("%Y%m%dT%H%M%S%3fZ");
    let mut parts = vec![slugify(prefix), slugify(label), ratio_slug, stamp.to_string()];
    parts.retain(|part| !part.is_empty());
    format!("{}.png", parts.join("-"))
}

fn fetch_bytes(uri: &str) -> Result<Vec<u8>, ExportError> {
    let trimmed = uri.trim();
    if trimmed.starts_with("data:") {
        return DataUri::parse(trimmed)
            .and_then(|parsed| parsed.decode_bytes())
            .map_err(ExportError::Download);
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let fetched = HttpClient::new()
            .get(trimmed)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .with_context(|| format!("fetching {trimmed} failed"))
            .map_err(ExportError::Download)?;
        return Ok(fetched.to_vec());
    }
    Err(ExportError::UnsupportedUri(
        trimmed.chars().take(32).collect::<String>(),
    ))
}

/// Saves the image behind `uri` as `dir/filename`.
///
/// Bytes land in a temporary file inside `dir` first and are renamed into
/// place, so a failed save never leaves a partial file under the final name.
pub fn download(uri: &str, dir: &Path, filename: &str) -> Result<PathBuf, ExportError> {
    let bytes = fetch_bytes(uri)?;
    write_atomically(dir, filename, &bytes).map_err(ExportError::Download)
}

/// Crops `image_uri` to `ratio` (keeping the original when cropping fails)
/// and saves it under a timestamped name derived from `label`.
pub fn export_item(
    image_uri: &str,
    label: &str,
    ratio: &str,
    prefix: &str,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let cropped = crop(image_uri, ratio);
    let filename = download_filename(prefix, label, ratio, Utc::now());
    download(&cropped, dir, &filename)
}

fn write_atomically(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut transient = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    transient.write_all(bytes)?;
    transient.flush()?;
    let target = dir.join(filename);
    transient
        .persist(&target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(target)
}
