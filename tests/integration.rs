//! End-to-end tests: records through the compositor to real artifacts.
//!
//! Backgrounds and photos are generated in memory; the PDF assertions
//! inflate the content streams back out of the artifact bytes, so no test
//! depends on a font being installed. Raster snapshot tests skip themselves
//! when no TrueType font can be located.

use chrono::Datelike;
use image::GenericImageView;

use patra::assets::MemorySource;
use patra::compose::{BackendKind, Compositor, RenderSession};
use patra::error::PatraError;
use patra::format;
use patra::layout;
use patra::photo::PhotoEditState;
use patra::record::Record;
use patra::render::pdf::PdfBackend;
use patra::render::raster::RasterBackend;
use patra::render::RenderPlan;

// ── Helpers ─────────────────────────────────────────────────────────

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 200, 255])
    });
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(encoder, img.as_raw(), width, height, image::ColorType::Rgba8)
        .unwrap();
    buf
}

fn template_source() -> MemorySource {
    MemorySource::new()
        .with("idcard.png", png_bytes(336, 210))
        .with("appletter.png", png_bytes(200, 283))
        .with("badge.png", png_bytes(150, 100))
}

fn photo_source() -> MemorySource {
    MemorySource::new()
        .with("photos/asha.png", png_bytes(160, 200))
        .with("photos/broken.png", b"this is not an image at all".to_vec())
}

/// A compositor pinned to the standard-font PDF path so text lands in the
/// content stream as literal WinAnsi strings.
fn test_compositor() -> Compositor {
    Compositor::new(Box::new(template_source()), Box::new(photo_source()))
        .with_pdf_backend(PdfBackend::without_unicode_font())
}

fn sample_record() -> Record {
    Record::from_json(
        r#"{
            "userId": "160525122516474",
            "name": "Asha Devi",
            "role": "member",
            "gender": "female",
            "contact": "8123573669",
            "address": {"city": "Mathura", "state": "UP"}
        }"#,
    )
    .unwrap()
}

fn assert_valid_pdf(bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    assert!(text.starts_with("%PDF-"), "missing PDF header");
    assert!(text.contains("xref"), "missing xref table");
    assert!(text.trim_end().ends_with("%%EOF"), "missing EOF marker");
}

/// Inflate every content stream in the artifact and return the combined
/// operator text.
fn pdf_stream_text(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut rest = bytes;
    while let Some(start) = find(rest, b">>\nstream\n") {
        let after = &rest[start + 10..];
        let Some(end) = find(after, b"\nendstream") else {
            break;
        };
        if let Ok(inflated) = miniz_oxide::inflate::decompress_to_vec_zlib(&after[..end]) {
            out.push_str(&String::from_utf8_lossy(&inflated));
        }
        rest = &after[end..];
    }
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ── Composition ─────────────────────────────────────────────────────

#[test]
fn test_unknown_template_fails_before_any_work() {
    let compositor = test_compositor();
    let err = compositor
        .compose(&sample_record(), "visiting-card", None, BackendKind::Document)
        .unwrap_err();
    assert!(matches!(err, PatraError::UnknownTemplate(_)));
}

#[test]
fn test_template_load_failure_is_terminal() {
    let compositor = Compositor::new(
        Box::new(MemorySource::new()),
        Box::new(MemorySource::new()),
    );
    let err = compositor
        .compose(&sample_record(), "identity-card", None, BackendKind::Document)
        .unwrap_err();
    assert!(matches!(err, PatraError::TemplateLoadFailed { .. }));
}

#[test]
fn test_identity_card_pdf_contains_record_text() {
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&sample_record(), "identity-card", None, BackendKind::Document)
        .unwrap();

    assert_eq!(artifact.mime_type, "application/pdf");
    assert_valid_pdf(&artifact.bytes);
    assert_eq!(artifact.suggested_file_name, "ID_Card_Asha Devi.pdf");

    let text = pdf_stream_text(&artifact.bytes);
    assert!(text.contains("Asha Devi"));
    assert!(text.contains("160525122516474"));
    assert!(text.contains("Mathura, UP"));
}

#[test]
fn test_rendered_expiry_is_one_year_out() {
    let before = format::expiry_date(format::issue_date());
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&sample_record(), "identity-card", None, BackendKind::Document)
        .unwrap();
    let after = format::expiry_date(format::issue_date());

    let text = pdf_stream_text(&artifact.bytes);
    assert!(
        text.contains(&format::format_date(before)) || text.contains(&format::format_date(after)),
        "expiry date missing from artifact"
    );

    let days = (before - format::issue_date()).num_days();
    assert!((365..=366).contains(&days));
    assert_eq!(before.year(), format::issue_date().year() + 1);
}

#[test]
fn test_localized_role_title_in_plan_and_artifact() {
    let registry = layout::LayoutRegistry::new();
    let plan = RenderPlan::build(&sample_record(), registry.resolve("identity-card").unwrap());
    assert!(plan.text_content().contains(&"सदस्य"));

    // The standard-font fallback draws Devanagari lossily, but the drawn
    // run is still present at the role's coordinates.
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&sample_record(), "identity-card", None, BackendKind::Document)
        .unwrap();
    // Role sits at x=180, y=61 in a 210pt-tall card: baseline 210-61-8.
    let text = pdf_stream_text(&artifact.bytes);
    assert!(text.contains("180.00 141.00 Tm"), "role run missing");
}

// ── Photos ──────────────────────────────────────────────────────────

#[test]
fn test_photo_less_render_has_no_photo_region() {
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&sample_record(), "identity-card", None, BackendKind::Document)
        .unwrap();
    assert_valid_pdf(&artifact.bytes);
    assert!(find(&artifact.bytes, b"/Im0").is_none());
}

#[test]
fn test_photo_is_embedded_when_present() {
    let mut record = sample_record();
    record.photo_url = Some("photos/asha.png".to_string());
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&record, "identity-card", None, BackendKind::Document)
        .unwrap();
    assert!(find(&artifact.bytes, b"/Im0").is_some());
}

#[test]
fn test_undecodable_photo_degrades_to_text_only() {
    let mut record = sample_record();
    record.photo_url = Some("photos/broken.png".to_string());
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&record, "identity-card", None, BackendKind::Document)
        .unwrap();

    assert_valid_pdf(&artifact.bytes);
    assert!(find(&artifact.bytes, b"/Im0").is_none());
    let text = pdf_stream_text(&artifact.bytes);
    assert!(text.contains("Asha Devi"));
}

#[test]
fn test_missing_remote_photo_degrades_to_text_only() {
    let mut record = sample_record();
    record.photo_url = Some("photos/nobody.jpg".to_string());
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&record, "identity-card", None, BackendKind::Document)
        .unwrap();
    assert!(find(&artifact.bytes, b"/Im0").is_none());
}

#[test]
fn test_photo_edit_state_is_honored() {
    let mut record = sample_record();
    record.photo_url = Some("photos/asha.png".to_string());
    let compositor = test_compositor();

    let neutral = compositor
        .compose(&record, "identity-card", None, BackendKind::Document)
        .unwrap();
    let rotated = compositor
        .compose(
            &record,
            "identity-card",
            Some(PhotoEditState {
                rotation: 90.0,
                ..PhotoEditState::default()
            }),
            BackendKind::Document,
        )
        .unwrap();
    // A 160x200 source rotated a quarter turn embeds with swapped
    // dimensions.
    assert!(find(&neutral.bytes, b"/Width 160 /Height 200").is_some());
    assert!(find(&rotated.bytes, b"/Width 200 /Height 160").is_some());
}

#[test]
fn test_color_filters_affect_preview_only() {
    let mut record = sample_record();
    record.photo_url = Some("photos/asha.png".to_string());
    let compositor = test_compositor();

    let filtered_state = PhotoEditState {
        brightness: 150.0,
        contrast: 50.0,
        saturation: 200.0,
        ..PhotoEditState::default()
    };
    let neutral = compositor
        .compose(&record, "identity-card", None, BackendKind::Document)
        .unwrap();
    let filtered = compositor
        .compose(&record, "identity-card", Some(filtered_state), BackendKind::Document)
        .unwrap();
    assert_eq!(neutral.bytes, filtered.bytes);

    let style = patra::photo::preview(filtered_state);
    assert_eq!(style.filter, "brightness(150%) contrast(50%) saturate(200%)");
}

// ── Appointment letter ──────────────────────────────────────────────

#[test]
fn test_appointment_letter_renders() {
    let record = Record::from_json(
        r#"{"userId": "2", "name": "Rajesh Kumar", "fatherName": "Nagesh Kumar", "role": "jilapramukh"}"#,
    )
    .unwrap();
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&record, "appointment-letter", None, BackendKind::Document)
        .unwrap();

    assert_valid_pdf(&artifact.bytes);
    assert_eq!(
        artifact.suggested_file_name,
        "appointment-letter-Rajesh-Kumar.pdf"
    );
    let text = pdf_stream_text(&artifact.bytes);
    assert!(text.contains("Rajesh Kumar S/o Nagesh Kumar"));

    let registry = layout::LayoutRegistry::new();
    let plan = RenderPlan::build(&record, registry.resolve("appointment-letter").unwrap());
    assert!(plan.text_content().contains(&"जिला प्रमुख"));
}

// ── Custom layouts ──────────────────────────────────────────────────

#[test]
fn test_registered_layout_renders() {
    let mut compositor = test_compositor();
    compositor
        .layouts_mut()
        .register_json(
            r#"{
                "name": "donor-badge",
                "width": 150, "height": 100,
                "background": "badge.png",
                "fields": [
                    {"field": "name", "x": 10, "y": 20, "fontSize": 12},
                    {"field": "bloodGroup", "x": 10, "y": 40, "fontSize": 10}
                ]
            }"#,
        )
        .unwrap();

    let artifact = compositor
        .compose(&sample_record(), "donor-badge", None, BackendKind::Document)
        .unwrap();
    let text = pdf_stream_text(&artifact.bytes);
    assert!(text.contains("Asha Devi"));
    // Unknown field names render the fallback token, not an error.
    assert!(text.contains("N/A"));
}

// ── Last-request-wins ───────────────────────────────────────────────

#[test]
fn test_rapid_double_compose_keeps_only_the_second() {
    let compositor = test_compositor();
    let session = RenderSession::new();

    let first_record = sample_record();
    let second_record = Record::from_json(r#"{"userId": "9", "name": "Meera Joshi"}"#).unwrap();

    let first_ticket = session.begin();
    let second_ticket = session.begin();

    let first = compositor
        .compose(&first_record, "identity-card", None, BackendKind::Document)
        .unwrap();
    let second = compositor
        .compose(&second_record, "identity-card", None, BackendKind::Document)
        .unwrap();

    // The stale result lands after the newer one: it must be dropped.
    assert!(session.submit(second_ticket, second));
    assert!(!session.submit(first_ticket, first));

    let held = session.current().expect("slot holds the newest artifact");
    assert_eq!(held.suggested_file_name, "ID_Card_Meera Joshi.pdf");
    let text = pdf_stream_text(&held.bytes);
    assert!(text.contains("Meera Joshi"));
    assert!(!text.contains("Asha Devi"));
}

// ── Cross-backend contract ──────────────────────────────────────────

#[test]
fn test_backends_share_identical_text_content() {
    let registry = layout::LayoutRegistry::new();
    let layout = registry.resolve("identity-card").unwrap();
    let plan_a = RenderPlan::build(&sample_record(), layout);
    let plan_b = RenderPlan::build(&sample_record(), layout);
    assert_eq!(plan_a.text_content(), plan_b.text_content());

    // Every plan line that survives the narrow encoding shows up verbatim
    // in the document backend's output.
    let compositor = test_compositor();
    let artifact = compositor
        .compose(&sample_record(), "identity-card", None, BackendKind::Document)
        .unwrap();
    let text = pdf_stream_text(&artifact.bytes);
    for line in plan_a.text_content() {
        if line.is_ascii() {
            assert!(text.contains(line), "missing run: {}", line);
        }
    }
}

// ── Raster backend (skips without a system font) ────────────────────

#[test]
fn test_raster_snapshot_when_a_font_is_available() {
    let backend = RasterBackend::new();
    if !backend.has_font() {
        eprintln!("no TrueType font on this machine; skipping raster snapshot test");
        return;
    }

    let mut record = sample_record();
    record.photo_url = Some("photos/asha.png".to_string());
    let compositor = Compositor::new(Box::new(template_source()), Box::new(photo_source()))
        .with_raster_backend(backend);

    let artifact = compositor
        .compose(&record, "identity-card", None, BackendKind::Raster)
        .unwrap();

    assert_eq!(artifact.mime_type, "image/png");
    assert_eq!(artifact.suggested_file_name, "Asha Devi_ID_card.png");

    let snapshot = image::load_from_memory(&artifact.bytes).unwrap();
    // Captured at 2x the 336x210 layout.
    assert_eq!(
        (snapshot.width(), snapshot.height()),
        (672, 420),
        "snapshot must be captured at 2x scale"
    );
}

#[test]
fn test_raster_without_font_fails_render_not_construction() {
    let compositor = Compositor::new(Box::new(template_source()), Box::new(MemorySource::new()))
        .with_raster_backend(RasterBackend::new());
    let result = compositor.compose(&sample_record(), "identity-card", None, BackendKind::Raster);
    match result {
        Ok(artifact) => assert_eq!(artifact.mime_type, "image/png"),
        Err(PatraError::Render(msg)) => assert!(msg.contains("font")),
        Err(other) => panic!("unexpected error: {}", other),
    }
}
