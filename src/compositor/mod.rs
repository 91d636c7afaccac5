pub mod canvas;


use image::imageops::FilterType;

use crate::surface::CompositeSurface;
use crate::surface::OpacityLevel;
use crate::surface::RasterSurface;
use canvas::Canvas;


/// Flattens the overlay onto the base. Holds no state besides the resampling
/// filter used to stretch the overlay, so every call is a pure function of
/// its inputs.
#[derive(Clone, Copy, Debug)]
pub struct Compositor {
    filter: FilterType,
}

impl Default for Compositor {

    fn default() -> Self {
        Compositor {
            filter: FilterType::Triangle,
        }
    }
}

impl Compositor {

    /// Accepts "nearest", "triangle", "gaussian", "catmullrom", "lanczos3".
    pub fn set_filter(&mut self, filter: &str) -> bool {
        match filter {
            "nearest" => self.filter = FilterType::Nearest,
            "triangle" => self.filter = FilterType::Triangle,
            "gaussian" => self.filter = FilterType::Gaussian,
            "catmullrom" => self.filter = FilterType::CatmullRom,
            "lanczos3" => self.filter = FilterType::Lanczos3,
            _ => return false,
        }
        true
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    /// Returns `None` until both surfaces exist. The output always has the
    /// base's dimensions; the overlay is stretched over the whole of it.
    pub fn composite(&self, base: Option<&RasterSurface>, overlay: Option<&RasterSurface>, opacity: OpacityLevel) -> Option<CompositeSurface> {
        let (base, overlay) = match (base, overlay) {
            (Some(b), Some(o)) => (b, o),
            _ => return None,
        };
        let (w, h) = base.dimensions();
        let mut canvas = Canvas::new(w, h);
        canvas.draw_stretched(base.as_rgba(), self.filter, OpacityLevel::MAX);
        canvas.draw_stretched(overlay.as_rgba(), self.filter, opacity);
        log::debug!("composited {}x{} overlay onto {}x{} base at {}", overlay.width(), overlay.height(), w, h, opacity);
        Some(canvas.into_surface())
    }
}

pub fn composite(base: Option<&RasterSurface>, overlay: Option<&RasterSurface>, opacity: OpacityLevel) -> Option<CompositeSurface> {
    Compositor::default().composite(base, overlay, opacity)
}


#[cfg(test)]
mod test {

    use super::*;

    use image::Rgba;
    use image::RgbaImage;

    fn solid(w: u32, h: u32, c: [u8; 4]) -> RasterSurface {
        RasterSurface::from_rgba(RgbaImage::from_pixel(w, h, Rgba(c)))
    }

    fn gradient(w: u32, h: u32) -> RasterSurface {
        RasterSurface::from_rgba(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, ((x + y) % 256) as u8, 255])
        }))
    }

    // resampling may drift a few units even on a flat colour
    fn close(a: Rgba<u8>, b: Rgba<u8>) -> bool {
        a.0.iter().zip(b.0.iter()).all(|(x, y)| (*x as i32 - *y as i32).abs() <= 4)
    }

    #[test]
    fn test_not_ready_is_none() {
        let s = solid(2, 2, [0, 0, 0, 255]);
        assert!(composite(None, None, OpacityLevel::MAX).is_none());
        assert!(composite(Some(&s), None, OpacityLevel::MAX).is_none());
        assert!(composite(None, Some(&s), OpacityLevel::MAX).is_none());
    }

    #[test]
    fn test_red_blue_half() {
        let base = solid(100, 50, [255, 0, 0, 255]);
        let overlay = solid(100, 50, [0, 0, 255, 255]);
        let out = composite(Some(&base), Some(&overlay), OpacityLevel::new(50)).unwrap();
        assert_eq!(out.dimensions(), (100, 50));
        assert!(out.as_rgba().pixels().all(|p| *p == Rgba([128, 0, 128, 255])));
    }

    #[test]
    fn test_zero_opacity_is_base() {
        let base = gradient(64, 40);
        let overlay = solid(13, 7, [0, 255, 0, 255]);
        let out = composite(Some(&base), Some(&overlay), OpacityLevel::MIN).unwrap();
        assert!(out == base);
    }

    #[test]
    fn test_full_opacity_hides_base() {
        let base = gradient(30, 30);
        let overlay = gradient(30, 30);
        let overlay = RasterSurface::from_rgba(image::imageops::flip_horizontal(overlay.as_rgba()));
        let out = composite(Some(&base), Some(&overlay), OpacityLevel::MAX).unwrap();
        assert!(out == overlay);
    }

    #[test]
    fn test_small_overlay_stretched() {
        let base = gradient(200, 200);
        let overlay = solid(10, 10, [20, 40, 60, 255]);
        let out = composite(Some(&base), Some(&overlay), OpacityLevel::MAX).unwrap();
        assert_eq!(out.dimensions(), (200, 200));
        assert!(out.as_rgba().pixels().all(|p| close(*p, Rgba([20, 40, 60, 255]))));

        let mut nearest = Compositor::default();
        assert!(nearest.set_filter("nearest"));
        let out = nearest.composite(Some(&base), Some(&overlay), OpacityLevel::MAX).unwrap();
        assert!(out.as_rgba().pixels().all(|p| *p == Rgba([20, 40, 60, 255])));
    }

    #[test]
    fn test_dimensions_follow_base() {
        let overlays = [solid(1, 1, [0, 0, 0, 255]), solid(300, 20, [1, 1, 1, 128]), solid(17, 999, [2, 2, 2, 0])];
        for (w, h) in &[(1, 1), (640, 480), (33, 7)] {
            let base = solid(*w, *h, [5, 5, 5, 255]);
            for overlay in &overlays {
                let out = composite(Some(&base), Some(overlay), OpacityLevel::new(60)).unwrap();
                assert_eq!(out.dimensions(), (*w, *h));
            }
        }
    }

    #[test]
    fn test_overlay_split_left_right() {
        // left half of the overlay lands on the left half of a wider base
        let overlay = RasterSurface::from_rgba(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
        }));
        let base = solid(8, 4, [0, 0, 0, 255]);
        let mut c = Compositor::default();
        c.set_filter("nearest");
        let out = c.composite(Some(&base), Some(&overlay), OpacityLevel::MAX).unwrap();
        assert_eq!(out.pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(out.pixel(7, 3), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_idempotent() {
        let base = gradient(50, 31);
        let overlay = gradient(12, 40);
        let a = composite(Some(&base), Some(&overlay), OpacityLevel::new(73)).unwrap();
        let b = composite(Some(&base), Some(&overlay), OpacityLevel::new(73)).unwrap();
        assert_eq!(a.as_rgba().as_raw(), b.as_rgba().as_raw());
    }

    #[test]
    fn test_monotonic_in_opacity() {
        let base = solid(3, 3, [10, 240, 100, 255]);
        let overlay = solid(3, 3, [250, 5, 100, 255]);
        let mut last: Option<Rgba<u8>> = None;
        for o in 0 ..= 100 {
            let p = composite(Some(&base), Some(&overlay), OpacityLevel::new(o)).unwrap().pixel(1, 1);
            if let Some(prev) = last {
                assert!(p[0] >= prev[0]);
                assert!(p[1] <= prev[1]);
                assert_eq!(p[2], 100);
            }
            last = Some(p);
        }
        assert_eq!(last, Some(Rgba([250, 5, 100, 255])));
    }

    #[test]
    fn test_inputs_untouched() {
        let base = gradient(20, 20);
        let overlay = solid(5, 5, [1, 2, 3, 255]);
        let (b0, o0) = (base.clone(), overlay.clone());
        let _ = composite(Some(&base), Some(&overlay), OpacityLevel::new(40));
        assert!(base == b0);
        assert!(overlay == o0);
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let mut c = Compositor::default();
        assert!(!c.set_filter("bicubic"));
        assert_eq!(c.filter(), FilterType::Triangle);
    }
}
