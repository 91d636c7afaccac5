use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::thread;

use once_cell::sync::Lazy;
use once_cell::sync::OnceCell;

use crate::error::AssetLoadError;
use crate::error::DecodeError;
use crate::surface::RasterSurface;


pub const DEFAULT_OVERLAY_FILE: &'static str = "overlay.png";


/// Decodes any format the `image` crate recognises; the result keeps the
/// image's natural pixel dimensions.
pub fn decode(bytes: &[u8]) -> Result<RasterSurface, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    Ok(RasterSurface::from_rgba(image.into_rgba8()))
}


/// A decode running on its own thread. The caller polls or waits for it
/// without being blocked while the image is being decoded.
pub struct DecodeJob {
    rx: Receiver<Result<RasterSurface, DecodeError>>,
    done: Option<Result<RasterSurface, DecodeError>>,
}

impl DecodeJob {

    pub fn spawn(name: String, bytes: Vec<u8>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let r = decode(&bytes);
                if let Err(e) = &r {
                    log::debug!("[{}] decode failed: {}", thread::current().name().unwrap_or_default(), e);
                }
                // receiver may be gone when the upload was superseded
                let _ = tx.send(r);
            })?;
        Ok(DecodeJob { rx, done: None })
    }

    /// `None` while the decode is still running.
    pub fn poll(&mut self) -> Option<&Result<RasterSurface, DecodeError>> {
        if self.done.is_none() {
            match self.rx.try_recv() {
                Ok(r) => self.done = Some(r),
                Err(TryRecvError::Empty) => {},
                Err(TryRecvError::Disconnected) => {
                    self.done = Some(Err(DecodeError::Interrupted));
                }
            }
        }
        self.done.as_ref()
    }

    pub fn wait(self) -> Result<RasterSurface, DecodeError> {
        if let Some(r) = self.done {
            return r;
        }
        self.rx.recv().unwrap_or(Err(DecodeError::Interrupted))
    }
}


/// The fixed overlay image, read from disk at most once per instance.
///
/// Concurrent first calls collapse into a single decode. A failure is not
/// cached, so calling again retries the load.
pub struct OverlayAsset {
    path: PathBuf,
    cell: OnceCell<Arc<RasterSurface>>,
}

impl OverlayAsset {

    pub fn new(path: PathBuf) -> Self {
        OverlayAsset {
            path,
            cell: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<RasterSurface>, AssetLoadError> {
        self.cell
            .get_or_try_init(|| {
                let surface = read_overlay(self.path.as_path())?;
                log::info!("overlay {} loaded ({}x{})", self.path.display(), surface.width(), surface.height());
                Ok(Arc::new(surface))
            })
            .map(Arc::clone)
    }
}

fn read_overlay(path: &Path) -> Result<RasterSurface, AssetLoadError> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            AssetLoadError::Missing(path.to_path_buf())
        } else {
            AssetLoadError::Io { path: path.to_path_buf(), source: e }
        }
    })?;
    decode(&bytes).map_err(|e| AssetLoadError::Decode { path: path.to_path_buf(), source: e })
}


static OVERLAY_PATH: Lazy<Mutex<PathBuf>> = Lazy::new(|| {
    Mutex::new(crate::application::default_overlay_path())
});

static OVERLAY: Lazy<OverlayAsset> = Lazy::new(|| {
    let path = match OVERLAY_PATH.lock() {
        Ok(p) => p.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    OverlayAsset::new(path)
});

/// Sets where the process-wide overlay is read from. Too late (returns
/// `false`) once the process-wide overlay has been touched.
pub fn configure_overlay_path(path: PathBuf) -> bool {
    if Lazy::get(&OVERLAY).is_some() {
        log::warn!("overlay path already fixed to {}", OVERLAY.path().display());
        return false;
    }
    match OVERLAY_PATH.lock() {
        Ok(mut p) => *p = path,
        Err(poisoned) => *poisoned.into_inner() = path,
    }
    true
}

pub fn fixed_overlay() -> &'static OverlayAsset {
    &OVERLAY
}

/// Process-wide overlay, loaded on first call and cached afterwards.
pub fn load_fixed_overlay() -> Result<Arc<RasterSurface>, AssetLoadError> {
    OVERLAY.get()
}
