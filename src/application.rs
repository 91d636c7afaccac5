use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::compositor::Compositor;
use crate::error::ComposeResult;
use crate::export::EncodedImage;
use crate::loader;
use crate::loader::DecodeJob;
use crate::loader::OverlayAsset;
use crate::session::Session;
use crate::surface::OpacityLevel;
use crate::surface::RasterSurface;


pub struct AppOptions {
    compositor: Compositor,
    overlay_path: PathBuf,
    input_file: PathBuf,
    output_folder: PathBuf,
    opacity: OpacityLevel,
}

impl Default for AppOptions {
    fn default() -> Self {
        AppOptions {
            compositor: Default::default(),
            overlay_path: default_overlay_path(),
            input_file: Default::default(),
            output_folder: PathBuf::from("."),
            opacity: Default::default(),
        }
    }
}

impl AppOptions {

    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    pub fn set_overlay_path(&mut self, path: &str) {
        self.overlay_path = PathBuf::from(path);
    }

    pub fn set_input_file(&mut self, path: &str) {
        self.input_file = PathBuf::from(path);
    }

    pub fn set_output_folder(&mut self, path: &str) {
        self.output_folder = PathBuf::from(path);
    }

    pub fn set_opacity(&mut self, opacity: OpacityLevel) {
        self.opacity = opacity;
    }
}

pub struct Application {
    options: AppOptions,
    overlay: OverlayAsset,
}

impl Application {

    pub fn new(options: AppOptions) -> Self {
        Application {
            overlay: OverlayAsset::new(options.overlay_path.clone()),
            options,
        }
    }

    /// Overlay first, so a broken install is reported before any upload work.
    pub fn compose_one(&self) -> ComposeResult<PathBuf> {
        let overlay = self.overlay.get()?;

        let mut session = Session::new(self.options.compositor);
        session.subscribe(Box::new(|preview: &RasterSurface| {
            log::debug!("preview {}x{} ready", preview.width(), preview.height());
        }));
        session.set_opacity(self.options.opacity);
        session.set_overlay(overlay);

        let bytes = fs::read(self.options.input_file.as_path())?;
        let ticket = session.begin_upload();
        let job = DecodeJob::spawn(format!("decode-{}", ticket.id()), bytes)?;
        session.complete_upload(ticket, job.wait())?;

        let encoded = session.export()?;
        let path = encoded.save_into(self.options.output_folder.as_path())?;
        log::info!("{} -> {} ({} bytes, overlay at {})", self.options.input_file.display(), path.display(), encoded.bytes.len(), session.opacity());
        Ok(path)
    }
}

/// Whole pipeline for an upload already held in memory, decoded on the
/// calling thread.
pub fn compose_upload(compositor: Compositor, overlay: Arc<RasterSurface>, opacity: OpacityLevel, bytes: &[u8]) -> ComposeResult<EncodedImage> {
    let mut session = Session::new(compositor);
    session.set_opacity(opacity);
    session.set_overlay(overlay);
    let ticket = session.begin_upload();
    session.complete_upload(ticket, loader::decode(bytes))?;
    Ok(session.export()?)
}

/// Directory of the running executable; the web root ships beside it.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
}

pub fn default_web_root() -> PathBuf {
    exe_dir().join("web")
}

pub fn default_overlay_path() -> PathBuf {
    default_web_root().join(loader::DEFAULT_OVERLAY_FILE)
}


#[cfg(test)]
mod test {

    use super::*;

    use image::Rgba;

    use crate::error::AssetLoadError;
    use crate::error::ComposeError;
    use crate::loader::test::png_bytes;
    use crate::loader::test::temp_path;

    #[test]
    fn test_default_paths_sit_next_to_exe() {
        let exe = std::env::current_exe().unwrap();
        assert_eq!(exe_dir(), exe.parent().unwrap().to_path_buf());
        assert_eq!(default_overlay_path(), exe_dir().join("web").join("overlay.png"));
    }

    #[test]
    fn test_compose_one() {
        let overlay = temp_path("app-overlay.png");
        let input = temp_path("app-input.png");
        let out = temp_path("app-out");
        fs::write(&overlay, png_bytes(3, 3, [0, 0, 255, 255])).unwrap();
        fs::write(&input, png_bytes(40, 20, [255, 0, 0, 255])).unwrap();

        let mut options = AppOptions::default();
        options.set_overlay_path(overlay.to_str().unwrap());
        options.set_input_file(input.to_str().unwrap());
        options.set_output_folder(out.to_str().unwrap());
        options.set_opacity(OpacityLevel::new(50));
        options.compositor_mut().set_filter("nearest");

        let path = Application::new(options).compose_one().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("image-with-overlay-") && name.ends_with(".png"));
        let img = image::open(&path).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (40, 20));
        assert_eq!(*img.get_pixel(39, 19), Rgba([128, 0, 128, 255]));
    }

    #[test]
    fn test_compose_upload() {
        let overlay = Arc::new(RasterSurface::from_rgba(image::RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]))));
        let encoded = compose_upload(Compositor::default(), overlay.clone(), OpacityLevel::MIN, &png_bytes(7, 5, [1, 2, 3, 255])).unwrap();
        let img = image::load_from_memory(&encoded.bytes).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (7, 5));
        assert!(img.pixels().all(|p| *p == Rgba([1, 2, 3, 255])));

        match compose_upload(Compositor::default(), overlay, OpacityLevel::MAX, b"") {
            Err(ComposeError::Decode(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compose_without_overlay() {
        let mut options = AppOptions::default();
        options.set_overlay_path(temp_path("app-missing-overlay.png").to_str().unwrap());
        options.set_input_file(temp_path("app-missing-input.png").to_str().unwrap());
        match Application::new(options).compose_one() {
            Err(ComposeError::AssetLoad(AssetLoadError::Missing(_))) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compose_bad_input() {
        let overlay = temp_path("app-overlay-2.png");
        let input = temp_path("app-not-an-image.png");
        fs::write(&overlay, png_bytes(1, 1, [0, 0, 0, 255])).unwrap();
        fs::write(&input, b"not a png").unwrap();
        let mut options = AppOptions::default();
        options.set_overlay_path(overlay.to_str().unwrap());
        options.set_input_file(input.to_str().unwrap());
        options.set_output_folder(temp_path("app-out-2").to_str().unwrap());
        match Application::new(options).compose_one() {
            Err(ComposeError::Decode(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
    }
}
