//! # Composition
//!
//! The orchestrator tying formatting, photo processing, and rendering
//! together. The order is fixed: resolve the layout, format every field,
//! process the photo if there is one, then hand the plan to the selected
//! backend. Layout resolution failing means nothing else runs — no partial
//! side effects.
//!
//! The compositor holds byte sources and backends but no per-render state;
//! the record and edit state live in the calling layer and are consumed
//! read-only. For callers that re-render while an earlier result is still
//! pending, [`RenderSession`] arbitrates: the preview slot only ever holds
//! the newest request's artifact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::assets::ByteSource;
use crate::error::PatraError;
use crate::layout::LayoutRegistry;
use crate::photo::{self, FlattenedBitmap, PhotoEditState};
use crate::record::Record;
use crate::render::pdf::PdfBackend;
use crate::render::raster::RasterBackend;
use crate::render::{RenderBackend, RenderPlan, RenderedArtifact};

/// Which of the two interchangeable backends renders the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// PNG snapshot of the populated template.
    Raster,
    /// Portable paged document with embedded text and images.
    Document,
}

/// The compositor: layouts, byte sources, and the two render backends.
pub struct Compositor {
    layouts: LayoutRegistry,
    templates: Box<dyn ByteSource>,
    photos: Box<dyn ByteSource>,
    raster: RasterBackend,
    pdf: PdfBackend,
}

impl Compositor {
    /// Wire a compositor from a template-art source and a photo source.
    pub fn new(templates: Box<dyn ByteSource>, photos: Box<dyn ByteSource>) -> Self {
        Compositor {
            layouts: LayoutRegistry::new(),
            templates,
            photos,
            raster: RasterBackend::new(),
            pdf: PdfBackend::new(),
        }
    }

    /// Replace the raster backend (font, sanitizer).
    pub fn with_raster_backend(mut self, backend: RasterBackend) -> Self {
        self.raster = backend;
        self
    }

    /// Replace the document backend (font).
    pub fn with_pdf_backend(mut self, backend: PdfBackend) -> Self {
        self.pdf = backend;
        self
    }

    /// Access the layout registry, e.g. to register a custom template.
    pub fn layouts_mut(&mut self) -> &mut LayoutRegistry {
        &mut self.layouts
    }

    /// Render `record` onto `template_name` with the selected backend.
    ///
    /// Steps run strictly in order — resolve, format, fetch template art,
    /// process photo, render — because the later ones feed the same
    /// in-memory document. A photo that fails at embed time degrades to a
    /// text-only artifact; a missing template aborts before any formatting
    /// work.
    pub fn compose(
        &self,
        record: &Record,
        template_name: &str,
        edit: Option<PhotoEditState>,
        backend: BackendKind,
    ) -> Result<RenderedArtifact, PatraError> {
        let layout = self.layouts.resolve(template_name)?;
        let plan = RenderPlan::build(record, layout);

        let background =
            self.templates
                .fetch(&layout.background)
                .map_err(|reason| PatraError::TemplateLoadFailed {
                    name: template_name.to_string(),
                    reason,
                })?;

        let photo = self.prepare_photo(record, edit);

        let backend: &dyn RenderBackend = match backend {
            BackendKind::Raster => &self.raster,
            BackendKind::Document => &self.pdf,
        };
        backend.render(&plan, &background, photo.as_ref())
    }

    /// Decode a record from a JSON payload and compose it.
    pub fn compose_json(
        &self,
        payload: &str,
        template_name: &str,
        edit: Option<PhotoEditState>,
        backend: BackendKind,
    ) -> Result<RenderedArtifact, PatraError> {
        let record = Record::from_json(payload)?;
        self.compose(&record, template_name, edit, backend)
    }

    /// Run the photo pipeline if the record carries a photo. Any failure
    /// here is the degrade path: log and continue text-only.
    fn prepare_photo(
        &self,
        record: &Record,
        edit: Option<PhotoEditState>,
    ) -> Option<FlattenedBitmap> {
        let src = record.photo_url.as_deref()?;
        match photo::load_photo(src, self.photos.as_ref()) {
            Ok(decoded) => {
                let state = edit.unwrap_or_default();
                log::debug!("photo {}x{} accepted from '{}'", decoded.dimensions().0, decoded.dimensions().1, src);
                Some(photo::flatten(&decoded, state))
            }
            Err(e) => {
                log::warn!("photo could not be embedded, continuing without it: {}", e);
                None
            }
        }
    }
}

/// A monotonically increasing ticket for one render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket(u64);

/// Last-request-wins arbitration for a preview slot.
///
/// Each render request takes a ticket before starting; when its artifact is
/// ready it submits both. A submission is accepted only if no newer request
/// began in the meantime, so two artifacts can never race to populate the
/// same preview — the stale one is dropped.
#[derive(Default)]
pub struct RenderSession {
    latest: AtomicU64,
    slot: Mutex<Option<(u64, RenderedArtifact)>>,
}

impl RenderSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a new render request.
    pub fn begin(&self) -> RenderTicket {
        RenderTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Offer an artifact for the slot. Returns false (and drops the
    /// artifact) when the ticket is stale.
    pub fn submit(&self, ticket: RenderTicket, artifact: RenderedArtifact) -> bool {
        if ticket.0 != self.latest.load(Ordering::SeqCst) {
            log::debug!("dropping stale render result (ticket {})", ticket.0);
            return false;
        }
        let mut slot = self.slot.lock().unwrap();
        match &*slot {
            Some((held, _)) if *held > ticket.0 => false,
            _ => {
                *slot = Some((ticket.0, artifact));
                true
            }
        }
    }

    /// The artifact currently in the slot, if any.
    pub fn current(&self) -> Option<RenderedArtifact> {
        self.slot.lock().unwrap().as_ref().map(|(_, a)| a.clone())
    }

    /// Take the artifact out of the slot, leaving it empty.
    pub fn take(&self) -> Option<RenderedArtifact> {
        self.slot.lock().unwrap().take().map(|(_, a)| a)
    }
}
