use std::sync::Arc;

use crate::compositor::Compositor;
use crate::error::DecodeError;
use crate::error::EncodeError;
use crate::export;
use crate::export::EncodedImage;
use crate::surface::CompositeSurface;
use crate::surface::OpacityLevel;
use crate::surface::RasterSurface;


/// Identifies one upload. Only the newest ticket may replace the base image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct UploadTicket(u64);

impl UploadTicket {

    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The base was replaced and the preview recomputed (if the overlay is there).
    Applied,
    /// A newer upload was started while this one was decoding.
    Stale,
}

pub type PreviewListener = Box<dyn FnMut(&CompositeSurface) + Send>;

/// Keeps the current base, overlay and opacity and recomposites whenever
/// any of them changes.
pub struct Session {
    compositor: Compositor,
    base: Option<Arc<RasterSurface>>,
    overlay: Option<Arc<RasterSurface>>,
    opacity: OpacityLevel,
    preview: Option<Arc<CompositeSurface>>,
    latest_upload: u64,
    listener: Option<PreviewListener>,
}

impl Default for Session {

    fn default() -> Self {
        Session::new(Compositor::default())
    }
}

impl Session {

    pub fn new(compositor: Compositor) -> Self {
        Session {
            compositor,
            base: None,
            overlay: None,
            opacity: OpacityLevel::default(),
            preview: None,
            latest_upload: 0,
            listener: None,
        }
    }

    /// Called with every freshly computed preview.
    pub fn subscribe(&mut self, listener: PreviewListener) {
        self.listener = Some(listener);
    }

    pub fn opacity(&self) -> OpacityLevel {
        self.opacity
    }

    pub fn base(&self) -> Option<&RasterSurface> {
        self.base.as_deref()
    }

    pub fn preview(&self) -> Option<&CompositeSurface> {
        self.preview.as_deref()
    }

    pub fn can_export(&self) -> bool {
        self.preview.is_some()
    }

    pub fn set_overlay(&mut self, overlay: Arc<RasterSurface>) {
        self.overlay = Some(overlay);
        self.recompose();
    }

    pub fn set_opacity(&mut self, opacity: OpacityLevel) {
        if opacity != self.opacity {
            self.opacity = opacity;
            self.recompose();
        }
    }

    /// Starts an upload; any ticket handed out earlier becomes stale.
    pub fn begin_upload(&mut self) -> UploadTicket {
        self.latest_upload += 1;
        UploadTicket(self.latest_upload)
    }

    /// Delivers a finished decode. Completions for superseded tickets are
    /// dropped. A failed decode leaves the previous base and preview as they were.
    pub fn complete_upload(&mut self, ticket: UploadTicket, decoded: Result<RasterSurface, DecodeError>) -> Result<UploadOutcome, DecodeError> {
        if ticket.0 != self.latest_upload {
            log::debug!("dropping stale upload #{} (latest #{})", ticket.0, self.latest_upload);
            return Ok(UploadOutcome::Stale);
        }
        let surface = decoded?;
        log::info!("upload #{} decoded ({}x{})", ticket.0, surface.width(), surface.height());
        self.base = Some(Arc::new(surface));
        self.recompose();
        Ok(UploadOutcome::Applied)
    }

    pub fn export(&self) -> Result<EncodedImage, EncodeError> {
        export::export(self.preview())
    }

    fn recompose(&mut self) {
        let next = self.compositor.composite(self.base.as_deref(), self.overlay.as_deref(), self.opacity);
        if let Some(next) = next {
            let next = Arc::new(next);
            if let Some(listener) = self.listener.as_mut() {
                listener(&*next);
            }
            self.preview = Some(next);
        }
    }
}
