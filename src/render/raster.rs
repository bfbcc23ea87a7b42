//! # Raster Backend
//!
//! Captures the populated template — background art, photo, overlaid text
//! runs — into a single PNG at 2× scale, the way the on-screen card was
//! snapshotted.
//!
//! Before anything is drawn, a [`StyleSanitizer`] pass runs over the styled
//! capture tree: the capture pipeline cannot parse modern color syntax like
//! `oklch(...)`, so such values are coerced to black. The pass runs
//! immediately before capture, not earlier — styles can change between
//! edits and capture.

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use super::{locate_font, suggested_file_name, RenderBackend, RenderPlan, RenderedArtifact};
use crate::error::PatraError;
use crate::layout::Rgb;
use crate::photo::{self, FlattenedBitmap};

/// Snapshot scale factor: the card is captured at twice its layout size.
pub const CAPTURE_SCALE: f64 = 2.0;

/// A computed color as it lands on a capture node. `Unsupported` carries
/// syntax the capture pipeline can't evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorStyle {
    Rgb(Rgb),
    Unsupported(String),
}

impl ColorStyle {
    /// Parse a CSS-ish color value. Hex and `rgb()` forms resolve;
    /// anything else (`oklch(...)`, `lab(...)`, variables) is kept verbatim
    /// as `Unsupported` for the sanitizer to deal with.
    pub fn parse(value: &str) -> ColorStyle {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            if hex.len() == 6 && hex.is_ascii() {
                if let (Ok(r), Ok(g), Ok(b)) = (
                    u8::from_str_radix(&hex[0..2], 16),
                    u8::from_str_radix(&hex[2..4], 16),
                    u8::from_str_radix(&hex[4..6], 16),
                ) {
                    return ColorStyle::Rgb(Rgb {
                        r: r as f64 / 255.0,
                        g: g as f64 / 255.0,
                        b: b as f64 / 255.0,
                    });
                }
            }
        }
        if let Some(inner) = value
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<_> = inner.split(',').map(str::trim).collect();
            if parts.len() == 3 {
                if let (Ok(r), Ok(g), Ok(b)) = (
                    parts[0].parse::<f64>(),
                    parts[1].parse::<f64>(),
                    parts[2].parse::<f64>(),
                ) {
                    return ColorStyle::Rgb(Rgb {
                        r: r / 255.0,
                        g: g / 255.0,
                        b: b / 255.0,
                    });
                }
            }
        }
        ColorStyle::Unsupported(value.to_string())
    }

    /// The color actually drawn; unsupported syntax renders black.
    pub fn effective(&self) -> Rgb {
        match self {
            ColorStyle::Rgb(rgb) => *rgb,
            ColorStyle::Unsupported(_) => Rgb::BLACK,
        }
    }
}

/// One node of the styled tree the pre-capture pass walks.
#[derive(Debug, Clone)]
pub struct StyledNode {
    pub color: ColorStyle,
    pub children: Vec<StyledNode>,
}

/// Capability injected into the raster backend: normalize a style tree in
/// place before capture.
pub type StyleSanitizer = fn(&mut StyledNode);

/// Default sanitizer: visit every descendant and coerce unsupported color
/// syntax to black.
pub fn sanitize_unsupported_colors(node: &mut StyledNode) {
    if let ColorStyle::Unsupported(_) = node.color {
        node.color = ColorStyle::Rgb(Rgb::BLACK);
    }
    for child in &mut node.children {
        sanitize_unsupported_colors(child);
    }
}

/// The PNG snapshot backend.
pub struct RasterBackend {
    font: Option<Font<'static>>,
    sanitizer: StyleSanitizer,
}

impl Default for RasterBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend {
    /// Probe the conventional font locations; text capture needs a real
    /// TrueType face.
    pub fn new() -> Self {
        let font = locate_font().and_then(Font::try_from_vec);
        if font.is_none() {
            log::warn!("no TrueType font found; raster rendering will fail until one is provided");
        }
        RasterBackend {
            font,
            sanitizer: sanitize_unsupported_colors,
        }
    }

    /// Use an explicit font instead of probing.
    pub fn with_font_bytes(bytes: Vec<u8>) -> Result<Self, PatraError> {
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| PatraError::Render("font data is not a parsable TrueType face".into()))?;
        Ok(RasterBackend {
            font: Some(font),
            sanitizer: sanitize_unsupported_colors,
        })
    }

    /// Replace the pre-capture sanitizer.
    pub fn with_sanitizer(mut self, sanitizer: StyleSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Whether a usable font was found.
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

/// Build the styled capture tree for a plan: one child per visible text run,
/// in plan order.
fn capture_tree(plan: &RenderPlan) -> StyledNode {
    StyledNode {
        color: ColorStyle::Rgb(Rgb::BLACK),
        children: plan
            .texts
            .iter()
            .filter(|t| t.page == 0)
            .map(|t| StyledNode {
                color: ColorStyle::Rgb(t.color),
                children: Vec::new(),
            })
            .collect(),
    }
}

impl RenderBackend for RasterBackend {
    fn render(
        &self,
        plan: &RenderPlan,
        background: &[u8],
        photo: Option<&FlattenedBitmap>,
    ) -> Result<RenderedArtifact, PatraError> {
        let font = self.font.as_ref().ok_or_else(|| {
            PatraError::Render("no TrueType font available for text capture".into())
        })?;

        let bg = image::load_from_memory(background).map_err(|e| {
            PatraError::TemplateLoadFailed {
                name: plan.template.clone(),
                reason: format!("background art is not a decodable image: {}", e),
            }
        })?;

        let width = (plan.width * CAPTURE_SCALE).round() as u32;
        let height = (plan.height * CAPTURE_SCALE).round() as u32;
        let mut canvas = bg.resize_exact(width, height, FilterType::Lanczos3).to_rgba8();

        // Photo first so text can overlap it, matching the card's stacking.
        if let (Some(slot), Some(photo)) = (plan.photo_slot.as_ref(), photo) {
            if slot.page == 0 {
                let (pw, ph) = photo.dimensions();
                let (fw, fh) = photo::fit_into_slot(pw, ph, slot);
                let scaled = photo.image.resize_exact(
                    (fw as f64 * CAPTURE_SCALE).round() as u32,
                    (fh as f64 * CAPTURE_SCALE).round() as u32,
                    FilterType::Lanczos3,
                );
                imageops::overlay(
                    &mut canvas,
                    &scaled.to_rgba8(),
                    (slot.x * CAPTURE_SCALE).round() as i64,
                    (slot.y * CAPTURE_SCALE).round() as i64,
                );
            }
        }

        // Sanitize computed styles immediately before capture.
        let mut tree = capture_tree(plan);
        (self.sanitizer)(&mut tree);

        let runs: Vec<_> = plan.texts.iter().filter(|t| t.page == 0).collect();
        for (run, node) in runs.iter().zip(&tree.children) {
            let color = node.color.effective().to_rgb8();
            let px = (run.font_size * CAPTURE_SCALE) as f32;
            let x = (run.x * CAPTURE_SCALE) as f32;
            let y = (run.y * CAPTURE_SCALE) as f32;
            draw_text(&mut canvas, font, &run.text, x, y, px, color);
            if run.bold {
                draw_text(&mut canvas, font, &run.text, x + 1.0, y, px, color);
            }
        }

        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(canvas.as_raw(), width, height, ColorType::Rgba8)
            .map_err(|e| PatraError::Render(format!("PNG encode failed: {}", e)))?;

        Ok(RenderedArtifact {
            mime_type: "image/png",
            bytes,
            suggested_file_name: suggested_file_name(&plan.template, &plan.subject, "png"),
        })
    }
}

/// Lay out and alpha-blend one line of glyphs. `y_top` is the top of the
/// text box; the baseline sits one ascent below it.
fn draw_text(
    canvas: &mut RgbaImage,
    font: &Font<'_>,
    text: &str,
    x: f32,
    y_top: f32,
    px: f32,
    color: [u8; 3],
) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let baseline = point(x, y_top + v_metrics.ascent);

    for glyph in font.layout(text, scale, baseline) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let cx = bb.min.x + gx as i32;
                let cy = bb.min.y + gy as i32;
                if coverage > 0.0
                    && cx >= 0
                    && cy >= 0
                    && (cx as u32) < canvas.width()
                    && (cy as u32) < canvas.height()
                {
                    blend(canvas.get_pixel_mut(cx as u32, cy as u32), color, coverage);
                }
            });
        }
    }
}

fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], coverage: f32) {
    let a = coverage.clamp(0.0, 1.0);
    for i in 0..3 {
        let base = pixel[i] as f32;
        pixel[i] = (base + (color[i] as f32 - base) * a).round() as u8;
    }
    pixel[3] = 255;
}
