//! # Rendering
//!
//! Two interchangeable backends behind one contract: a *raster* backend that
//! snapshots the populated template into a PNG, and a *document* backend
//! that embeds text runs and images into a single-page PDF at absolute
//! coordinates.
//!
//! Both backends draw the same [`RenderPlan`] — the formatted, positioned
//! text runs are computed once, so the two outputs carry identical text
//! content by construction, not by convention.

pub mod pdf;
pub mod raster;

use crate::error::PatraError;
use crate::format::{self, ADDRESS_LINE_HEIGHT};
use crate::layout::{FieldRef, PhotoSlot, Rgb, TemplateLayout};
use crate::photo::FlattenedBitmap;
use crate::record::Record;

/// One positioned text run, ready to draw.
#[derive(Debug, Clone)]
pub struct PlacedText {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub color: Rgb,
    pub bold: bool,
    pub page: u32,
}

/// Everything a backend needs to draw, minus the background bytes and the
/// photo bitmap (those are fetched/processed by the compositor).
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub template: String,
    pub width: f64,
    pub height: f64,
    pub pages: u32,
    pub texts: Vec<PlacedText>,
    pub photo_slot: Option<PhotoSlot>,
    /// Display name of the record's subject, used for file naming.
    pub subject: String,
}

impl RenderPlan {
    /// Format every layout field for `record` and place the results.
    ///
    /// The full address is the one field that can span two runs: past the
    /// wrap limit it breaks onto a second line one line-height below the
    /// anchor, and anything beyond two lines is dropped.
    pub fn build(record: &Record, layout: &TemplateLayout) -> RenderPlan {
        let mut texts = Vec::with_capacity(layout.fields.len() + 1);

        for pos in &layout.fields {
            let value = format::format_field(record, pos.field);
            let value = match &pos.label {
                Some(label) => format!("{}{}", label, value),
                None => value,
            };

            if pos.field == FieldRef::FullAddress {
                let (first, second) = format::wrap_address(&value);
                texts.push(PlacedText {
                    text: first,
                    x: pos.x,
                    y: pos.y,
                    font_size: pos.font_size,
                    color: pos.color,
                    bold: pos.bold,
                    page: pos.page,
                });
                if let Some(second) = second {
                    texts.push(PlacedText {
                        text: second,
                        x: pos.x,
                        y: pos.y + pos.font_size * ADDRESS_LINE_HEIGHT,
                        font_size: pos.font_size,
                        color: pos.color,
                        bold: pos.bold,
                        page: pos.page,
                    });
                }
            } else {
                texts.push(PlacedText {
                    text: value,
                    x: pos.x,
                    y: pos.y,
                    font_size: pos.font_size,
                    color: pos.color,
                    bold: pos.bold,
                    page: pos.page,
                });
            }
        }

        let subject = record
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string();

        RenderPlan {
            template: layout.name.clone(),
            width: layout.width,
            height: layout.height,
            pages: layout.page_count(),
            texts,
            photo_slot: layout.photo_slot,
            subject,
        }
    }

    /// The drawn strings in placement order — the cross-backend text
    /// contract surface.
    pub fn text_content(&self) -> Vec<&str> {
        self.texts.iter().map(|t| t.text.as_str()).collect()
    }
}

/// The final downloadable/previewable output. Owned by the caller; the
/// compositor keeps no reference once this is returned.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub suggested_file_name: String,
}

/// A render backend: plan + background art + optional flattened photo in,
/// artifact out.
pub trait RenderBackend {
    fn render(
        &self,
        plan: &RenderPlan,
        background: &[u8],
        photo: Option<&FlattenedBitmap>,
    ) -> Result<RenderedArtifact, PatraError>;
}

/// Probe the conventional font locations for a usable TrueType file,
/// Devanagari-capable families first. Both backends share this list; each
/// decides for itself what missing fonts mean (the PDF backend falls back
/// to standard Helvetica, the raster backend cannot draw text without one).
pub fn locate_font() -> Option<Vec<u8>> {
    const CANDIDATES: &[&str] = &[
        "fonts/NotoSansDevanagari-Regular.ttf",
        "fonts/NotoSans-Regular.ttf",
        "fonts/DejaVuSans.ttf",
        "fonts/LiberationSans-Regular.ttf",
        "/usr/share/fonts/truetype/noto/NotoSansDevanagari-Regular.ttf",
        "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    ];
    for path in CANDIDATES {
        if let Ok(bytes) = std::fs::read(path) {
            log::debug!("using font {}", path);
            return Some(bytes);
        }
    }
    None
}

/// Download file names follow the pages this replaces.
pub fn suggested_file_name(template: &str, subject: &str, ext: &str) -> String {
    match (template, ext) {
        ("identity-card", "png") => format!("{}_ID_card.png", subject),
        ("identity-card", _) => format!("ID_Card_{}.{}", subject, ext),
        ("appointment-letter", _) => {
            format!("appointment-letter-{}.{}", subject.replace(' ', "-"), ext)
        }
        _ => format!("{}-{}.{}", template, subject.replace(' ', "-"), ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::record::Record;

    fn sample_record() -> Record {
        Record::from_json(
            r#"{
                "userId": "160525122516474",
                "name": "Asha Devi",
                "role": "member",
                "address": {"city": "Mathura", "state": "UP"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_contains_formatted_fields() {
        let plan = RenderPlan::build(&sample_record(), &layout::identity_card());
        let content = plan.text_content().join("\n");
        assert!(content.contains("Asha Devi"));
        assert!(content.contains("सदस्य"));
        assert!(content.contains("Mathura, UP"));
        assert!(content.contains("160525122516474"));
    }

    #[test]
    fn test_plan_missing_fields_use_fallback() {
        let record = Record::new("1");
        let plan = RenderPlan::build(&record, &layout::identity_card());
        assert!(plan.texts.iter().all(|t| !t.text.is_empty()));
        assert!(plan.text_content().contains(&"N/A"));
    }

    #[test]
    fn test_long_address_adds_a_second_run() {
        let record = Record::from_json(
            r#"{
                "userId": "1",
                "address": {
                    "street": "G-02 Lake Beauty Apartment, KR Puram",
                    "city": "Bangalore", "state": "Karnataka",
                    "zipCode": "560036", "country": "India"
                }
            }"#,
        )
        .unwrap();
        let layout = layout::identity_card();
        let base = RenderPlan::build(&Record::new("1"), &layout);
        let plan = RenderPlan::build(&record, &layout);
        assert_eq!(plan.texts.len(), base.texts.len() + 1);

        // The continuation sits one line-height below the anchor.
        let address_runs: Vec<_> = plan
            .texts
            .iter()
            .filter(|t| (t.x - 180.0).abs() < f64::EPSILON && t.y >= 129.0)
            .collect();
        assert_eq!(address_runs.len(), 2);
        assert!((address_runs[1].y - (129.0 + 10.0 * ADDRESS_LINE_HEIGHT)).abs() < 0.001);
    }

    #[test]
    fn test_appointment_letter_label_prefix() {
        let plan = RenderPlan::build(&sample_record(), &layout::appointment_letter());
        assert!(plan
            .text_content()
            .iter()
            .any(|t| t.starts_with("समाप्ति तिथि: ")));
    }

    #[test]
    fn test_suggested_file_names() {
        assert_eq!(
            suggested_file_name("identity-card", "Asha Devi", "png"),
            "Asha Devi_ID_card.png"
        );
        assert_eq!(
            suggested_file_name("identity-card", "Asha Devi", "pdf"),
            "ID_Card_Asha Devi.pdf"
        );
        assert_eq!(
            suggested_file_name("appointment-letter", "Rajesh Kumar", "pdf"),
            "appointment-letter-Rajesh-Kumar.pdf"
        );
    }
}
