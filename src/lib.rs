//! # Patra
//!
//! A fixed-layout document compositor.
//!
//! Membership sites tend to re-implement the same rendering logic on every
//! page: an identity card here, an appointment letter there, each with its
//! own hardcoded coordinates, its own null-checks, its own photo handling.
//! Patra pulls that pattern into one place: **a record, a declarative
//! layout, and two interchangeable render backends.**
//!
//! ## Architecture
//!
//! ```text
//! Input (record JSON)
//!       ↓
//!   [record]   — Data model: member fields, loose address forms
//!       ↓
//!   [format]   — Null-safe display strings, dates, localized titles
//!       ↓
//!   [layout]   — Field → {x, y, size, color} maps per template
//!       ↓
//!   [render]   — RenderPlan → PNG snapshot | single-page PDF
//! ```
//!
//! The photo pipeline (`photo`) runs alongside: validate, adjust, flatten,
//! fit into the layout's photo slot. `compose` orchestrates one render from
//! end to end and arbitrates concurrent preview requests.

pub mod assets;
pub mod compose;
pub mod error;
pub mod format;
pub mod layout;
pub mod photo;
pub mod record;
pub mod render;

pub use compose::{BackendKind, Compositor, RenderSession};
pub use error::PatraError;
pub use photo::PhotoEditState;
pub use record::Record;
pub use render::{RenderPlan, RenderedArtifact};
