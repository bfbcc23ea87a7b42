//! # Document Backend
//!
//! Writes the plan into a portable paged document: a from-scratch PDF 1.7
//! writer. We write the raw bytes ourselves because it gives us full control
//! over the output and keeps the compositor self-contained; the subset of
//! the PDF spec needed for stamping text and images at absolute coordinates
//! is manageable.
//!
//! ```text
//! %PDF-1.7            <- header
//! 1 0 obj ... endobj  <- objects (catalog, pages, fonts, images, content)
//! ...
//! xref                <- cross-reference table (byte offsets of each object)
//! trailer             <- points to the root object
//! %%EOF
//! ```
//!
//! ## Fonts
//!
//! Text prefers a Unicode-capable TrueType face, embedded as CIDFontType2
//! with Identity-H encoding (FontFile2, FontDescriptor, CIDFont, ToUnicode
//! CMap, and the root Type0 dictionary). When no face is available or it
//! fails to parse, the writer falls back to the standard Helvetica fonts
//! with WinAnsi encoding — logged, never fatal, but lossy for scripts
//! outside Latin-1.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;

use miniz_oxide::deflate::compress_to_vec_zlib;

use super::{locate_font, suggested_file_name, RenderBackend, RenderPlan, RenderedArtifact};
use crate::error::PatraError;
use crate::photo::{self, FlattenedBitmap, PhotoFormat};

/// Approximate cap-ascent fraction used to turn a top-anchored layout `y`
/// into a PDF baseline.
const ASCENT_FRACTION: f64 = 0.8;

/// Pen width for the simulated bold stroke when only one face is embedded.
const BOLD_STROKE_FRACTION: f64 = 0.02;

/// The PDF backend.
pub struct PdfBackend {
    unicode_font: Option<Vec<u8>>,
}

impl Default for PdfBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBackend {
    /// Probe the conventional font locations for an embeddable face.
    pub fn new() -> Self {
        let unicode_font = locate_font().filter(|bytes| {
            ttf_parser::Face::parse(bytes, 0).is_ok()
        });
        if unicode_font.is_none() {
            log::warn!(
                "no embeddable TrueType font found; falling back to standard Helvetica (WinAnsi)"
            );
        }
        PdfBackend { unicode_font }
    }

    /// Use explicit font bytes. Unparsable data degrades to the standard
    /// fonts rather than failing the render.
    pub fn with_font_bytes(bytes: Vec<u8>) -> Self {
        match ttf_parser::Face::parse(&bytes, 0) {
            Ok(_) => PdfBackend {
                unicode_font: Some(bytes),
            },
            Err(e) => {
                log::warn!(
                    "font data not embeddable ({}); falling back to standard Helvetica",
                    e
                );
                PdfBackend { unicode_font: None }
            }
        }
    }

    /// Force the standard-font fallback (useful in tests).
    pub fn without_unicode_font() -> Self {
        PdfBackend { unicode_font: None }
    }

    pub fn has_unicode_font(&self) -> bool {
        self.unicode_font.is_some()
    }
}

/// Tracks allocated PDF objects during writing. Object 0 is the mandatory
/// free entry; 1 is the Catalog, 2 the page tree root.
struct PdfBuilder {
    objects: Vec<Vec<u8>>,
}

impl PdfBuilder {
    fn new() -> Self {
        PdfBuilder {
            objects: vec![Vec::new(), Vec::new(), Vec::new()],
        }
    }

    fn push(&mut self, data: Vec<u8>) -> usize {
        let id = self.objects.len();
        self.objects.push(data);
        id
    }
}

/// How text gets encoded into content streams.
enum FontMode {
    /// Embedded CID font: hex glyph IDs via the char→GID map.
    Unicode { char_to_gid: BTreeMap<char, u16> },
    /// Standard Helvetica pair (/F0 regular, /F1 bold), WinAnsi bytes.
    Standard,
}

impl RenderBackend for PdfBackend {
    fn render(
        &self,
        plan: &RenderPlan,
        background: &[u8],
        photo: Option<&FlattenedBitmap>,
    ) -> Result<RenderedArtifact, PatraError> {
        let mut builder = PdfBuilder::new();

        // Fonts first: collect the characters the plan actually draws.
        let mut used_chars: BTreeSet<char> = BTreeSet::new();
        for run in &plan.texts {
            used_chars.extend(run.text.chars());
        }

        let (font_resources, font_mode) = match &self.unicode_font {
            Some(ttf) => match write_unicode_font(&mut builder, ttf, &used_chars) {
                Ok((type0_id, char_to_gid)) => (
                    format!("/F0 {} 0 R", type0_id),
                    FontMode::Unicode { char_to_gid },
                ),
                Err(reason) => {
                    log::warn!(
                        "font embedding failed ({}); falling back to standard Helvetica",
                        reason
                    );
                    (write_standard_fonts(&mut builder), FontMode::Standard)
                }
            },
            None => (write_standard_fonts(&mut builder), FontMode::Standard),
        };

        // Background art, shared by every page.
        let background_id = write_background_xobject(&mut builder, background).map_err(|e| {
            PatraError::TemplateLoadFailed {
                name: plan.template.clone(),
                reason: e,
            }
        })?;

        // Photo, if the layout has a slot for one. Failures here degrade to
        // a text-only document instead of aborting the render.
        let photo_entry = match (plan.photo_slot.as_ref(), photo) {
            (Some(slot), Some(bitmap)) => {
                match write_photo_xobject(&mut builder, bitmap) {
                    Ok(obj_id) => {
                        let (pw, ph) = bitmap.dimensions();
                        let (fw, fh) = photo::fit_into_slot(pw, ph, slot);
                        Some((obj_id, *slot, fw as f64, fh as f64))
                    }
                    Err(reason) => {
                        log::warn!("photo could not be embedded, continuing without it: {}", reason);
                        None
                    }
                }
            }
            _ => None,
        };

        // One page object + content stream per layout page.
        let mut page_obj_ids = Vec::new();
        for page in 0..plan.pages {
            let mut stream = String::new();

            // Background fills the page.
            let _ = write!(
                stream,
                "q\n{:.2} 0 0 {:.2} 0 0 cm\n/Bg0 Do\nQ\n",
                plan.width, plan.height
            );

            let mut xobjects = format!("/Bg0 {} 0 R", background_id);

            if let Some((obj_id, slot, fw, fh)) = &photo_entry {
                if slot.page == page {
                    let y = plan.height - slot.y - fh;
                    let _ = write!(
                        stream,
                        "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/Im0 Do\nQ\n",
                        fw, fh, slot.x, y
                    );
                    let _ = write!(xobjects, " /Im0 {} 0 R", obj_id);
                }
            }

            write_text_runs(&mut stream, plan, page, &font_mode);

            let compressed = compress_to_vec_zlib(stream.as_bytes(), 6);
            let mut content = Vec::new();
            let _ = write!(
                content,
                "<< /Length {} /Filter /FlateDecode >>\nstream\n",
                compressed.len()
            );
            content.extend_from_slice(&compressed);
            content.extend_from_slice(b"\nendstream");
            let content_id = builder.push(content);

            let page_dict = format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Contents {} 0 R /Resources << /Font << {} >> /XObject << {} >> >> >>",
                plan.width, plan.height, content_id, font_resources, xobjects
            );
            page_obj_ids.push(builder.push(page_dict.into_bytes()));
        }

        builder.objects[1] = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
        let kids: Vec<String> = page_obj_ids.iter().map(|id| format!("{} 0 R", id)).collect();
        builder.objects[2] = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_obj_ids.len()
        )
        .into_bytes();

        Ok(RenderedArtifact {
            mime_type: "application/pdf",
            bytes: serialize(&builder),
            suggested_file_name: suggested_file_name(&plan.template, &plan.subject, "pdf"),
        })
    }
}

/// Write the text runs for one page as BT/ET blocks.
fn write_text_runs(stream: &mut String, plan: &RenderPlan, page: u32, mode: &FontMode) {
    let _ = write!(stream, "BT\n");
    for run in plan.texts.iter().filter(|t| t.page == page) {
        let _ = write!(
            stream,
            "{:.3} {:.3} {:.3} rg\n",
            run.color.r, run.color.g, run.color.b
        );

        let baseline_y = plan.height - run.y - run.font_size * ASCENT_FRACTION;

        match mode {
            FontMode::Unicode { char_to_gid } => {
                if run.bold {
                    // Single embedded face: simulate bold with fill+stroke.
                    let _ = write!(
                        stream,
                        "{:.3} {:.3} {:.3} RG\n2 Tr\n{:.2} w\n",
                        run.color.r,
                        run.color.g,
                        run.color.b,
                        run.font_size * BOLD_STROKE_FRACTION
                    );
                } else {
                    let _ = write!(stream, "0 Tr\n");
                }
                let _ = write!(
                    stream,
                    "/F0 {:.1} Tf\n1 0 0 1 {:.2} {:.2} Tm\n",
                    run.font_size, run.x, baseline_y
                );
                let mut hex = String::new();
                for ch in run.text.chars() {
                    let gid = char_to_gid.get(&ch).copied().unwrap_or(0);
                    let _ = write!(hex, "{:04X}", gid);
                }
                let _ = write!(stream, "<{}> Tj\n", hex);
            }
            FontMode::Standard => {
                let font_name = if run.bold { "F1" } else { "F0" };
                let _ = write!(
                    stream,
                    "/{} {:.1} Tf\n1 0 0 1 {:.2} {:.2} Tm\n",
                    font_name, run.font_size, run.x, baseline_y
                );
                let _ = write!(stream, "({}) Tj\n", escape_winansi(&run.text));
            }
        }
    }
    let _ = write!(stream, "ET\n");
}

/// Register the standard Helvetica pair; returns the /Font resource entries.
fn write_standard_fonts(builder: &mut PdfBuilder) -> String {
    let regular = builder.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    let bold = builder.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    format!("/F0 {} 0 R /F1 {} 0 R", regular, bold)
}

/// Write the 5 PDF objects for an embedded TrueType face (full file, no
/// subsetting): FontFile2, FontDescriptor, CIDFont, ToUnicode CMap, Type0.
/// Returns the Type0 object id and the char→GID map.
fn write_unicode_font(
    builder: &mut PdfBuilder,
    ttf: &[u8],
    used_chars: &BTreeSet<char>,
) -> Result<(usize, BTreeMap<char, u16>), String> {
    let face = ttf_parser::Face::parse(ttf, 0).map_err(|e| format!("TTF parse: {}", e))?;

    let units_per_em = face.units_per_em();
    let scale = 1000.0 / units_per_em as f64;

    let mut char_to_gid = BTreeMap::new();
    for &ch in used_chars {
        if let Some(gid) = face.glyph_index(ch) {
            char_to_gid.insert(ch, gid.0);
        }
    }

    let ps_name = face_ps_name(&face);

    // 1. FontFile2 — the compressed font program.
    let compressed = compress_to_vec_zlib(ttf, 6);
    let mut fontfile = Vec::new();
    let _ = write!(
        fontfile,
        "<< /Length {} /Length1 {} /Filter /FlateDecode >>\nstream\n",
        compressed.len(),
        ttf.len()
    );
    fontfile.extend_from_slice(&compressed);
    fontfile.extend_from_slice(b"\nendstream");
    let fontfile_id = builder.push(fontfile);

    // 2. FontDescriptor.
    let bbox = face.global_bounding_box();
    let cap_height = face.capital_height().unwrap_or(face.ascender());
    let descriptor = format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags 4 \
         /FontBBox [{} {} {} {}] /ItalicAngle 0 \
         /Ascent {} /Descent {} /CapHeight {} /StemV 80 \
         /FontFile2 {} 0 R >>",
        ps_name,
        (bbox.x_min as f64 * scale) as i32,
        (bbox.y_min as f64 * scale) as i32,
        (bbox.x_max as f64 * scale) as i32,
        (bbox.y_max as f64 * scale) as i32,
        (face.ascender() as f64 * scale) as i32,
        (face.descender() as f64 * scale) as i32,
        (cap_height as f64 * scale) as i32,
        fontfile_id,
    );
    let descriptor_id = builder.push(descriptor.into_bytes());

    // 3. CIDFont (descendant), widths for the glyphs in use.
    let mut w_entries = BTreeMap::new();
    for &gid in char_to_gid.values() {
        let advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(gid))
            .unwrap_or(units_per_em);
        w_entries.insert(gid, (advance as f64 * scale) as u32);
    }
    let mut w_array = String::from("[");
    for (gid, width) in &w_entries {
        let _ = write!(w_array, " {} [{}]", gid, width);
    }
    w_array.push_str(" ]");

    let cidfont = format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
         /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
         /FontDescriptor {} 0 R /DW 1000 /W {} /CIDToGIDMap /Identity >>",
        ps_name, descriptor_id, w_array,
    );
    let cidfont_id = builder.push(cidfont.into_bytes());

    // 4. ToUnicode CMap, so text extraction recovers the real characters.
    let tounicode_id = builder.push(build_tounicode_cmap(&char_to_gid));

    // 5. The root Type0 dictionary.
    let type0 = format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H \
         /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        ps_name, cidfont_id, tounicode_id,
    );
    Ok((builder.push(type0.into_bytes()), char_to_gid))
}

/// PostScript-safe name for the embedded face.
fn face_ps_name(face: &ttf_parser::Face) -> String {
    let raw = face
        .names()
        .into_iter()
        .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
        .and_then(|n| n.to_string())
        .or_else(|| {
            face.names()
                .into_iter()
                .find(|n| n.name_id == ttf_parser::name_id::FAMILY)
                .and_then(|n| n.to_string())
        })
        .unwrap_or_else(|| "EmbeddedFont".to_string());
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if sanitized.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        sanitized
    }
}

/// Build the ToUnicode CMap stream mapping GIDs back to characters.
fn build_tounicode_cmap(char_to_gid: &BTreeMap<char, u16>) -> Vec<u8> {
    let mut body = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<(u16, char)> = char_to_gid.iter().map(|(&ch, &gid)| (gid, ch)).collect();
    for chunk in entries.chunks(100) {
        let _ = write!(body, "{} beginbfchar\n", chunk.len());
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let encoded = ch.encode_utf16(&mut units);
            let _ = write!(body, "<{:04X}> <", gid);
            for unit in encoded {
                let _ = write!(body, "{:04X}", unit);
            }
            body.push_str(">\n");
        }
        body.push_str("endbfchar\n");
    }
    body.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend");

    let mut obj = Vec::new();
    let _ = write!(obj, "<< /Length {} >>\nstream\n", body.len());
    obj.extend_from_slice(body.as_bytes());
    obj.extend_from_slice(b"\nendstream");
    obj
}

/// Embed the template background. JPEG bytes pass straight through with
/// DCTDecode; anything else is decoded and re-embedded as flate RGB.
fn write_background_xobject(builder: &mut PdfBuilder, bytes: &[u8]) -> Result<usize, String> {
    if PhotoFormat::from_magic(bytes) == Some(PhotoFormat::Jpeg) {
        let (width, height) = image::io::Reader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| format!("format detection: {}", e))?
            .into_dimensions()
            .map_err(|e| format!("JPEG dimensions: {}", e))?;
        let mut obj = Vec::new();
        let _ = write!(
            obj,
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
            width,
            height,
            bytes.len()
        );
        obj.extend_from_slice(bytes);
        obj.extend_from_slice(b"\nendstream");
        return Ok(builder.push(obj));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| format!("background art is not a decodable image: {}", e))?;
    let rgb_image = decoded.to_rgb8();
    let (width, height) = (rgb_image.width(), rgb_image.height());
    Ok(write_rgb_xobject(
        builder,
        width,
        height,
        rgb_image.as_raw(),
        None,
    ))
}

/// Embed a flattened photo as an RGB XObject with an SMask when it carries
/// transparency.
fn write_photo_xobject(
    builder: &mut PdfBuilder,
    bitmap: &FlattenedBitmap,
) -> Result<usize, String> {
    let (width, height) = bitmap.dimensions();
    if width == 0 || height == 0 {
        return Err("photo has zero pixels".to_string());
    }
    let (rgb, alpha) = bitmap.rgb_with_alpha();
    Ok(write_rgb_xobject(builder, width, height, &rgb, alpha.as_deref()))
}

fn write_rgb_xobject(
    builder: &mut PdfBuilder,
    width: u32,
    height: u32,
    rgb: &[u8],
    alpha: Option<&[u8]>,
) -> usize {
    let smask_ref = alpha.map(|alpha_data| {
        let compressed = compress_to_vec_zlib(alpha_data, 6);
        let mut smask = Vec::new();
        let _ = write!(
            smask,
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode /Length {} >>\nstream\n",
            width,
            height,
            compressed.len()
        );
        smask.extend_from_slice(&compressed);
        smask.extend_from_slice(b"\nendstream");
        builder.push(smask)
    });

    let compressed = compress_to_vec_zlib(rgb, 6);
    let mut obj = Vec::new();
    let smask_entry = smask_ref
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    let _ = write!(
        obj,
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
         /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode /Length {}{} >>\nstream\n",
        width,
        height,
        compressed.len(),
        smask_entry
    );
    obj.extend_from_slice(&compressed);
    obj.extend_from_slice(b"\nendstream");
    builder.push(obj)
}

/// Escape a string for a WinAnsi `(…) Tj` operand. Characters outside the
/// encoding become `?` — the narrow-font fallback is lossy by design.
fn escape_winansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let byte = unicode_to_winansi(ch).unwrap_or(b'?');
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            0x20..=0x7E => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{:03o}", byte);
            }
        }
    }
    out
}

/// Map a character to its WinAnsi (CP-1252) byte.
fn unicode_to_winansi(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E => Some(code as u8),
        0xA0..=0xFF => Some(code as u8),
        _ => match ch {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            '‰' => Some(0x89),
            '‹' => Some(0x8B),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '›' => Some(0x9B),
            _ => None,
        },
    }
}

/// Serialize all objects with the xref table and trailer.
fn serialize(builder: &PdfBuilder) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");

    let mut offsets = vec![0usize; builder.objects.len()];
    for (id, data) in builder.objects.iter().enumerate().skip(1) {
        offsets[id] = out.len();
        let _ = write!(out, "{} 0 obj\n", id);
        out.extend_from_slice(data);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_pos = out.len();
    let _ = write!(out, "xref\n0 {}\n", builder.objects.len());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        let _ = write!(out, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
        builder.objects.len(),
        xref_pos
    );
    out
}
