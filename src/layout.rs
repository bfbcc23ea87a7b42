//! # Template Layouts
//!
//! The declarative map from logical field to position on a named template.
//! Each layout is an ordered list of `{field, x, y, fontSize, color, page}`
//! entries plus an optional photo slot, with coordinates in the template's
//! own space (canvas pixels for the card, document points for the letter)
//! and a top-left origin — backends flip the axis where their output format
//! needs it.
//!
//! This single model replaces the per-page coordinate literals the system
//! used to scatter across every rendering surface. Layout resolution is pure
//! and does no I/O; background art bytes are fetched by the render backends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PatraError;

/// A logical field a layout can reference.
///
/// `Unknown` absorbs any unrecognized name in caller-supplied layout JSON;
/// the formatter renders it as the fallback token rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldRef {
    UserId,
    Name,
    FatherName,
    /// Composite "Name S/o Father" line used by the appointment letter.
    NameWithFather,
    Age,
    /// Role code resolved through the localized title table.
    Role,
    Gender,
    Contact,
    Email,
    City,
    State,
    /// The assembled one-line address; wraps onto at most two lines.
    FullAddress,
    AadharCard,
    Pancard,
    IssueDate,
    ExpiryDate,
    Unknown,
}

impl FieldRef {
    /// The wire name, matching the record's camelCase field names.
    pub fn key(&self) -> &'static str {
        match self {
            FieldRef::UserId => "userId",
            FieldRef::Name => "name",
            FieldRef::FatherName => "fatherName",
            FieldRef::NameWithFather => "nameWithFather",
            FieldRef::Age => "age",
            FieldRef::Role => "role",
            FieldRef::Gender => "gender",
            FieldRef::Contact => "contact",
            FieldRef::Email => "email",
            FieldRef::City => "city",
            FieldRef::State => "state",
            FieldRef::FullAddress => "fullAddress",
            FieldRef::AadharCard => "aadharCard",
            FieldRef::Pancard => "pancard",
            FieldRef::IssueDate => "issueDate",
            FieldRef::ExpiryDate => "expiryDate",
            FieldRef::Unknown => "unknown",
        }
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        match name.as_str() {
            "userId" => FieldRef::UserId,
            "name" => FieldRef::Name,
            "fatherName" => FieldRef::FatherName,
            "nameWithFather" => FieldRef::NameWithFather,
            "age" => FieldRef::Age,
            "role" => FieldRef::Role,
            "gender" => FieldRef::Gender,
            "contact" => FieldRef::Contact,
            "email" => FieldRef::Email,
            "city" => FieldRef::City,
            "state" => FieldRef::State,
            "fullAddress" => FieldRef::FullAddress,
            "aadharCard" => FieldRef::AadharCard,
            "pancard" => FieldRef::Pancard,
            "issueDate" => FieldRef::IssueDate,
            "expiryDate" => FieldRef::ExpiryDate,
            _ => FieldRef::Unknown,
        }
    }
}

impl From<FieldRef> for String {
    fn from(field: FieldRef) -> String {
        field.key().to_string()
    }
}

/// A color as unit-interval RGB, matching what the PDF operators take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    /// The letterhead accent red (#e11f1f).
    pub const ACCENT_RED: Rgb = Rgb {
        r: 0.882,
        g: 0.122,
        b: 0.122,
    };

    /// Convert to 8-bit channels for raster drawing.
    pub fn to_rgb8(&self) -> [u8; 3] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }
}

fn default_color() -> Rgb {
    Rgb::BLACK
}

/// One positioned field on a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPos {
    pub field: FieldRef,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    #[serde(default = "default_color")]
    pub color: Rgb,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub bold: bool,
    /// Literal text drawn before the field value (e.g. a Hindi caption).
    #[serde(default)]
    pub label: Option<String>,
}

/// Where a photo lands on the template, if it has a photo at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSlot {
    pub x: f64,
    pub y: f64,
    pub max_width: f64,
    pub max_height: f64,
    #[serde(default)]
    pub page: u32,
}

/// A complete template layout: page geometry, background asset key, fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateLayout {
    pub name: String,
    pub width: f64,
    pub height: f64,
    /// Asset key for the background art, resolved by a `ByteSource`.
    pub background: String,
    pub fields: Vec<FieldPos>,
    #[serde(default)]
    pub photo_slot: Option<PhotoSlot>,
}

impl TemplateLayout {
    /// Number of pages this layout spans.
    pub fn page_count(&self) -> u32 {
        let mut max_page = 0;
        for f in &self.fields {
            max_page = max_page.max(f.page);
        }
        if let Some(slot) = &self.photo_slot {
            max_page = max_page.max(slot.page);
        }
        max_page + 1
    }
}

/// Registry of known templates: the two built-ins plus anything the caller
/// registers (layouts deserialize straight from JSON).
pub struct LayoutRegistry {
    layouts: HashMap<String, TemplateLayout>,
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutRegistry {
    pub fn new() -> Self {
        let mut layouts = HashMap::new();
        for layout in [identity_card(), appointment_letter()] {
            layouts.insert(layout.name.clone(), layout);
        }
        Self { layouts }
    }

    /// Look up a template by name. Pure; fails fast on unknown names.
    pub fn resolve(&self, name: &str) -> Result<&TemplateLayout, PatraError> {
        self.layouts
            .get(name)
            .ok_or_else(|| PatraError::UnknownTemplate(name.to_string()))
    }

    /// Register (or replace) a layout under its own name.
    pub fn register(&mut self, layout: TemplateLayout) {
        self.layouts.insert(layout.name.clone(), layout);
    }

    /// Register a layout from its JSON description.
    pub fn register_json(&mut self, json: &str) -> Result<(), PatraError> {
        let layout: TemplateLayout =
            serde_json::from_str(json).map_err(PatraError::LayoutParse)?;
        self.register(layout);
        Ok(())
    }
}

fn field(field: FieldRef, x: f64, y: f64, font_size: f64) -> FieldPos {
    FieldPos {
        field,
        x,
        y,
        font_size,
        color: Rgb::BLACK,
        page: 0,
        bold: false,
        label: None,
    }
}

/// The 336×210 identity card: photo on the left, a field column at x=180,
/// the validity date tucked into the bottom-right corner.
pub fn identity_card() -> TemplateLayout {
    TemplateLayout {
        name: "identity-card".to_string(),
        width: 336.0,
        height: 210.0,
        background: "idcard.png".to_string(),
        fields: vec![
            field(FieldRef::UserId, 180.0, 35.0, 10.0),
            field(FieldRef::Name, 180.0, 47.0, 10.0),
            field(FieldRef::Role, 180.0, 61.0, 10.0),
            field(FieldRef::Gender, 180.0, 74.0, 10.0),
            field(FieldRef::Contact, 180.0, 87.0, 10.0),
            field(FieldRef::City, 180.0, 101.0, 10.0),
            field(FieldRef::State, 180.0, 115.0, 10.0),
            field(FieldRef::FullAddress, 180.0, 129.0, 10.0),
            field(FieldRef::ExpiryDate, 290.0, 200.0, 5.0),
        ],
        photo_slot: Some(PhotoSlot {
            x: 15.0,
            y: 43.0,
            max_width: 80.0,
            max_height: 100.0,
            page: 0,
        }),
    }
}

/// The 794×1123 appointment letter: name and role stamped in accent red
/// over the letterhead art, expiry in the top-right corner.
pub fn appointment_letter() -> TemplateLayout {
    let mut expiry = field(FieldRef::ExpiryDate, 600.0, 16.0, 16.0);
    expiry.label = Some("समाप्ति तिथि: ".to_string());

    let mut name = field(FieldRef::NameWithFather, 230.0, 270.0, 16.0);
    name.color = Rgb::ACCENT_RED;
    name.bold = true;

    let mut role = field(FieldRef::Role, 45.0, 352.0, 16.0);
    role.color = Rgb::ACCENT_RED;
    role.bold = true;

    TemplateLayout {
        name: "appointment-letter".to_string(),
        width: 794.0,
        height: 1123.0,
        background: "appletter.png".to_string(),
        fields: vec![expiry, name, role],
        photo_slot: None,
    }
}
