use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use image::Rgba;
use image::RgbaImage;

use crate::error::InvalidOpacity;


/// A decoded image held in memory, never modified after decoding.
#[derive(Clone, PartialEq)]
pub struct RasterSurface {
    pixels: RgbaImage,
}

/// Output of one compositing pass, always sized to the base image.
pub type CompositeSurface = RasterSurface;

impl RasterSurface {

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        RasterSurface { pixels }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl fmt::Debug for RasterSurface {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("RasterSurface({}x{})", self.width(), self.height()))
    }
}


/// Overlay visibility in percent: 0 hides the overlay, 100 paints it fully.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpacityLevel(u8);

impl OpacityLevel {

    pub const MIN: OpacityLevel = OpacityLevel(0);
    pub const MAX: OpacityLevel = OpacityLevel(100);

    /// Clamps into [0, 100].
    pub fn new(percent: u8) -> Self {
        OpacityLevel(std::cmp::min(percent, 100))
    }

    #[inline]
    pub fn percent(self) -> u8 {
        self.0
    }
}

impl Default for OpacityLevel {

    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for OpacityLevel {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}%", self.0))
    }
}

impl TryFrom<i64> for OpacityLevel {
    type Error = InvalidOpacity;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=100).contains(&value) {
            Ok(OpacityLevel(value as u8))
        } else {
            Err(InvalidOpacity(value.to_string()))
        }
    }
}

impl FromStr for OpacityLevel {
    type Err = InvalidOpacity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_suffix('%').unwrap_or(s);
        let value: i64 = s.parse().map_err(|_| InvalidOpacity(s.to_string()))?;
        Self::try_from(value)
    }
}
