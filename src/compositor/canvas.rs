use std::borrow::Cow;

use image::ImageBuffer;
use image::Rgba;
use image::RgbaImage;
use image::imageops;
use image::imageops::FilterType;

use crate::surface::OpacityLevel;
use crate::surface::RasterSurface;


/// Drawing target for one compositing pass.
///
/// The global alpha only ever applies to the draw call that sets it and is
/// back at 100% when `draw_stretched` returns.
pub struct Canvas {
    target: RgbaImage,
    global_alpha: OpacityLevel,
}

impl Canvas {

    /// A fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Canvas {
            target: RgbaImage::new(width, height),
            global_alpha: OpacityLevel::MAX,
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.target.dimensions()
    }

    #[inline]
    pub fn global_alpha(&self) -> OpacityLevel {
        self.global_alpha
    }

    /// Source-over draws `src` scaled to cover the whole canvas.
    pub fn draw_stretched(&mut self, src: &RgbaImage, filter: FilterType, alpha: OpacityLevel) {
        let (w, h) = self.target.dimensions();
        let src: Cow<RgbaImage> = if src.dimensions() == (w, h) {
            Cow::Borrowed(src)
        } else {
            Cow::Owned(resize_premultiplied(src, w, h, filter))
        };
        self.global_alpha = alpha;
        for (dst, s) in self.target.pixels_mut().zip(src.pixels()) {
            blend_over(dst, s, self.global_alpha);
        }
        self.global_alpha = OpacityLevel::MAX;
    }

    pub fn into_surface(self) -> RasterSurface {
        RasterSurface::from_rgba(self.target)
    }
}


/// Resamples with colour weighted by alpha, so transparent texels do not
/// darken the edges of opaque ones.
///
/// Channels are widened to `u16`: colour becomes `c·a` and alpha `a·255`,
/// which keeps both on the same scale through the filter.
fn resize_premultiplied(src: &RgbaImage, width: u32, height: u32, filter: FilterType) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    let premultiplied: ImageBuffer<Rgba<u16>, Vec<u16>> = ImageBuffer::from_fn(sw, sh, |x, y| {
        let p = src.get_pixel(x, y);
        let a = p[3] as u16;
        Rgba([p[0] as u16 * a, p[1] as u16 * a, p[2] as u16 * a, a * 255])
    });
    let scaled = imageops::resize(&premultiplied, width, height, filter);

    let mut out = RgbaImage::new(width, height);
    for (dst, p) in out.pixels_mut().zip(scaled.pixels()) {
        let a = p[3] as u32;
        if a == 0 {
            continue;
        }
        for i in 0 .. 3 {
            dst[i] = ((p[i] as u32 * 255 + a / 2) / a).min(255) as u8;
        }
        dst[3] = ((a + 127) / 255).min(255) as u8;
    }
    out
}


/// `out = src·α + dst·(1−α)` where α is the source alpha times `alpha`.
///
/// Integer math keeps it exact at the ends: α = 0 leaves `dst` untouched and
/// an opaque `src` at α = 1 replaces it.
pub fn blend_over(dst: &mut Rgba<u8>, src: &Rgba<u8>, alpha: OpacityLevel) {
    const FULL: u64 = 255 * 100;

    let da = dst[3] as u64 * 100;
    if da == 0 && alpha == OpacityLevel::MAX {
        *dst = *src;
        return;
    }
    let sa = src[3] as u64 * alpha.percent() as u64;
    if sa == 0 {
        return;
    }
    // both weights carry an extra factor FULL
    let keep = da * (FULL - sa);
    let total = sa * FULL + keep;
    for i in 0 .. 3 {
        let c = src[i] as u64 * sa * FULL + dst[i] as u64 * keep;
        dst[i] = ((c + total / 2) / total) as u8;
    }
    dst[3] = ((total + FULL * 50) / (FULL * 100)) as u8;
}
