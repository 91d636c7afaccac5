use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use image::DynamicImage;
use image::ImageFormat;

use crate::error::EncodeError;
use crate::surface::CompositeSurface;


pub const FILENAME_PREFIX: &'static str = "image-with-overlay-";

/// A composite encoded as png, ready to be written or sent as a download.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl EncodedImage {

    pub fn save_into(&self, dir: &Path) -> Result<PathBuf, EncodeError> {
        if !dir.is_dir() {
            fs::create_dir_all(dir)?;
        }
        let path = dir.join(&self.filename);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub fn export(surface: Option<&CompositeSurface>) -> Result<EncodedImage, EncodeError> {
    let surface = surface.ok_or(EncodeError::NothingToExport)?;
    let pic = surface.as_rgba();
    let mut bytes = Vec::with_capacity(pic.as_raw().len() / 3);
    DynamicImage::ImageRgba8(pic.clone()).write_to(&mut bytes, ImageFormat::Png)?;
    Ok(EncodedImage {
        filename: export_filename(epoch_millis()),
        bytes,
    })
}

pub fn export_filename(millis: u128) -> String {
    format!("{}{}.png", FILENAME_PREFIX, millis)
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}


#[cfg(test)]
mod test {

    use super::*;

    use image::Rgba;
    use image::RgbaImage;

    use crate::surface::RasterSurface;

    #[test]
    fn test_nothing_to_export() {
        match export(None) {
            Err(EncodeError::NothingToExport) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_export_is_lossless_png() {
        let img = RgbaImage::from_fn(16, 9, |x, y| Rgba([x as u8 * 10, y as u8 * 20, 7, 200 + x as u8]));
        let surface = RasterSurface::from_rgba(img.clone());
        let encoded = export(Some(&surface)).unwrap();
        assert_eq!(image::guess_format(&encoded.bytes).unwrap(), ImageFormat::Png);
        let back = image::load_from_memory(&encoded.bytes).unwrap().into_rgba8();
        assert_eq!(back, img);
    }

    #[test]
    fn test_filename_pattern() {
        assert_eq!(export_filename(1700000000123), "image-with-overlay-1700000000123.png");

        let surface = RasterSurface::from_rgba(RgbaImage::new(1, 1));
        let name = export(Some(&surface)).unwrap().filename;
        let millis = &name[FILENAME_PREFIX.len() .. name.len() - ".png".len()];
        assert!(name.starts_with(FILENAME_PREFIX));
        assert!(millis.parse::<u128>().unwrap() > 0);
    }

    #[test]
    fn test_save_into_creates_dir() {
        let dir = std::env::temp_dir()
            .join(format!("overlay_compositor-{}", std::process::id()))
            .join("exports");
        let _ = fs::remove_dir_all(&dir);
        let surface = RasterSurface::from_rgba(RgbaImage::new(3, 2));
        let encoded = export(Some(&surface)).unwrap();
        let path = encoded.save_into(&dir).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), encoded.filename);
        assert_eq!(fs::read(&path).unwrap(), encoded.bytes);
    }
}
