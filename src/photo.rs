//! # Photo Pipeline
//!
//! Normalizes an uploaded or remote photo into a decodable bitmap, applies a
//! bounded set of visual adjustments, and produces both a live preview
//! description and a flattened bitmap for embedding.
//!
//! The preview and the embedded output are deliberately asymmetric: the
//! embedding formats downstream don't support arbitrary color-curve filters,
//! so brightness/contrast/saturation exist on screen only, while scale and
//! right-angle rotation survive flattening. That asymmetry is part of the
//! contract — see [`flatten`].

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::assets::ByteSource;
use crate::error::PatraError;
use crate::layout::PhotoSlot;

/// Maximum accepted photo size: 5 MB.
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// User-adjustable photo state, created fresh per render session and
/// discarded once a render completes. Out-of-range values clamp to the
/// documented bounds; the default is the visually-neutral midpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoEditState {
    /// Percent, 50–150.
    pub brightness: f32,
    /// Percent, 50–150.
    pub contrast: f32,
    /// Percent, 0–200.
    pub saturation: f32,
    /// Degrees, −180–180.
    pub rotation: f32,
    /// Factor, 0.5–2.0.
    pub scale: f32,
}

impl Default for PhotoEditState {
    fn default() -> Self {
        PhotoEditState {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

impl PhotoEditState {
    /// Clamp every adjustment to its documented range.
    pub fn clamped(self) -> Self {
        PhotoEditState {
            brightness: self.brightness.clamp(50.0, 150.0),
            contrast: self.contrast.clamp(50.0, 150.0),
            saturation: self.saturation.clamp(0.0, 200.0),
            rotation: self.rotation.clamp(-180.0, 180.0),
            scale: self.scale.clamp(0.5, 2.0),
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == PhotoEditState::default()
    }
}

/// The accepted photo formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFormat {
    Jpeg,
    Png,
    Webp,
}

impl PhotoFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "image/jpeg",
            PhotoFormat::Png => "image/png",
            PhotoFormat::Webp => "image/webp",
        }
    }

    /// Parse a declared MIME type against the allow-list.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim() {
            "image/jpeg" | "image/jpg" => Some(PhotoFormat::Jpeg),
            "image/png" => Some(PhotoFormat::Png),
            "image/webp" => Some(PhotoFormat::Webp),
            _ => None,
        }
    }

    /// Assume a format from a URL path extension, for remote sources where
    /// no content type is available.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = path.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(PhotoFormat::Jpeg),
            "png" => Some(PhotoFormat::Png),
            "webp" => Some(PhotoFormat::Webp),
            _ => None,
        }
    }

    /// Detect a format from magic bytes.
    pub fn from_magic(data: &[u8]) -> Option<Self> {
        if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
            return Some(PhotoFormat::Jpeg);
        }
        if data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47] {
            return Some(PhotoFormat::Png);
        }
        if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(PhotoFormat::Webp);
        }
        None
    }
}

/// A validated, fully decoded photo ready for adjustment and embedding.
#[derive(Debug, Clone)]
pub struct DecodedPhoto {
    pub format: PhotoFormat,
    pub image: DynamicImage,
}

impl DecodedPhoto {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Validate and decode photo bytes.
///
/// Rejects anything over 5 MB or outside the JPEG/PNG/WebP allow-list.
/// `declared` is the caller's claim (upload MIME or URL extension); magic
/// bytes win when the two disagree.
pub fn accept(data: &[u8], declared: Option<PhotoFormat>) -> Result<DecodedPhoto, PatraError> {
    if data.len() > MAX_PHOTO_BYTES {
        return Err(PatraError::UnsupportedPhoto(format!(
            "{} bytes exceeds the {} byte limit",
            data.len(),
            MAX_PHOTO_BYTES
        )));
    }
    let format = PhotoFormat::from_magic(data).or(declared).ok_or_else(|| {
        PatraError::UnsupportedPhoto("unrecognized image format (expected JPEG, PNG, or WebP)".into())
    })?;

    let image = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| PatraError::UnsupportedPhoto(format!("format detection failed: {}", e)))?
        .decode()
        .map_err(|e| PatraError::UnsupportedPhoto(format!("could not be decoded: {}", e)))?;

    Ok(DecodedPhoto { format, image })
}

/// Resolve a photo source string to a decoded photo.
///
/// Supported forms:
/// - `data:image/...;base64,...` — local upload
/// - anything else — fetched through `source`, format assumed from the
///   path extension when present
pub fn load_photo(src: &str, source: &dyn ByteSource) -> Result<DecodedPhoto, PatraError> {
    if let Some(rest) = src.strip_prefix("data:") {
        let (mime, payload) = rest.split_once(';').and_then(|(mime, tail)| {
            tail.strip_prefix("base64,").map(|payload| (mime, payload))
        }).ok_or_else(|| {
            PatraError::UnsupportedPhoto("malformed data URI (expected data:<mime>;base64,...)".into())
        })?;
        let declared = PhotoFormat::from_mime(mime);
        if declared.is_none() {
            return Err(PatraError::UnsupportedPhoto(format!(
                "'{}' is not an accepted photo type",
                mime
            )));
        }
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| PatraError::UnsupportedPhoto(format!("base64 decode error: {}", e)))?;
        return accept(&bytes, declared);
    }

    let declared = PhotoFormat::from_path(src);
    let bytes = source
        .fetch(src)
        .map_err(|reason| PatraError::PhotoEmbedFailed(format!("'{}': {}", src, reason)))?;
    accept(&bytes, declared)
}

/// Non-destructive description of the on-screen preview for an edit state.
/// Display only — it never mutates the underlying bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewStyle {
    pub filter: String,
    pub transform: String,
}

pub fn preview(state: PhotoEditState) -> PreviewStyle {
    let s = state.clamped();
    PreviewStyle {
        filter: format!(
            "brightness({}%) contrast({}%) saturate({}%)",
            s.brightness, s.contrast, s.saturation
        ),
        transform: format!("rotate({}deg) scale({})", s.rotation, s.scale),
    }
}

/// The pixel data actually embedded into a rendered document.
#[derive(Debug, Clone)]
pub struct FlattenedBitmap {
    pub image: DynamicImage,
}

impl FlattenedBitmap {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Split into an RGB byte plane and an alpha plane (None if opaque),
    /// the shape the PDF serializer consumes.
    pub fn rgb_with_alpha(&self) -> (Vec<u8>, Option<Vec<u8>>) {
        let rgba = self.image.to_rgba8();
        let pixel_count = (rgba.width() * rgba.height()) as usize;
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        let mut has_transparency = false;
        for pixel in rgba.pixels() {
            rgb.push(pixel[0]);
            rgb.push(pixel[1]);
            rgb.push(pixel[2]);
            alpha.push(pixel[3]);
            if pixel[3] != 255 {
                has_transparency = true;
            }
        }
        (rgb, if has_transparency { Some(alpha) } else { None })
    }
}

/// Produce the bitmap that embedding uses.
///
/// Only `scale` and right-angle `rotation` survive flattening; quarter
/// turns are applied losslessly, other angles remain preview-only.
/// Brightness/contrast/saturation never touch the flattened pixels — the
/// embedding formats can't express the equivalent filters, and emulating
/// them here would make preview and print disagree in worse ways. A neutral
/// edit state passes the decoded pixels through bit-identically.
pub fn flatten(photo: &DecodedPhoto, state: PhotoEditState) -> FlattenedBitmap {
    let state = state.clamped();
    let mut img = photo.image.clone();

    match quarter_turns(state.rotation) {
        Some(1) => img = img.rotate90(),
        Some(2) => img = img.rotate180(),
        Some(3) => img = img.rotate270(),
        _ => {}
    }

    if (state.scale - 1.0).abs() > f32::EPSILON {
        let (w, h) = img.dimensions();
        let nw = ((w as f32 * state.scale).round() as u32).max(1);
        let nh = ((h as f32 * state.scale).round() as u32).max(1);
        img = img.resize_exact(nw, nh, FilterType::Lanczos3);
    }

    FlattenedBitmap { image: img }
}

/// Number of clockwise quarter turns, or None when the angle isn't a
/// multiple of 90°.
fn quarter_turns(rotation: f32) -> Option<u32> {
    let r = rotation.rem_euclid(360.0);
    let q = (r / 90.0).round();
    if (r - q * 90.0).abs() < 0.01 {
        Some((q as u32) % 4)
    } else {
        None
    }
}

/// Uniform-scale dimensions for fitting a bitmap into a photo slot: neither
/// bound exceeded, aspect ratio preserved, never upscaled.
pub fn fit_into_slot(width: u32, height: u32, slot: &PhotoSlot) -> (u32, u32) {
    let scale = (slot.max_width / width as f64)
        .min(slot.max_height / height as f64)
        .min(1.0);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}
