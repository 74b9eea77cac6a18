//! Shared types for the cutout segmentation core.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can pass rasters around
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Re-export `GrayImage` for single-channel mask sources.
pub use image::GrayImage;

/// An alpha-channel segmentation mask produced by the inference engine.
///
/// Row-major RGBA, 4 bytes per pixel. The alpha byte is the inclusion
/// indicator: 0 means excluded, anything else means included, and values
/// in `1..=254` carry partial coverage from antialiasing.
///
/// The byte length is always exactly `width * height * 4`. A mask is
/// immutable once built; derive new rasters from it instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask(RgbaImage);

impl PixelMask {
    /// Build a mask from raw RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::DataLength`] if `data.len()` is not exactly
    /// `width * height * 4`, or [`MaskError::Dimensions`] if that product
    /// does not fit in memory.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, MaskError> {
        let expected = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h))
            .and_then(|n| n.checked_mul(4))
            .ok_or(MaskError::Dimensions { width, height })?;
        if data.len() != expected {
            return Err(MaskError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        RgbaImage::from_raw(width, height, data)
            .map(Self)
            .ok_or(MaskError::Dimensions { width, height })
    }

    /// Wrap an existing RGBA raster as a mask.
    ///
    /// `RgbaImage::from_raw` accepts over-long buffers; those are copied
    /// into an exact-length one so [`as_raw`](Self::as_raw) always holds
    /// `width * height * 4` bytes.
    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        if image.pixels().len() * 4 == image.as_raw().len() {
            return Self(image);
        }
        Self(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            *image.get_pixel(x, y)
        }))
    }

    /// Build a mask from a single-channel image: luma becomes alpha and
    /// the color channels are white.
    #[must_use]
    pub fn from_luma(gray: &GrayImage) -> Self {
        Self(RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y).0[0];
            image::Rgba([255, 255, 255, v])
        }))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Alpha at `(x, y)`, or `None` outside the mask.
    #[must_use]
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        self.0.get_pixel_checked(x, y).map(|p| p.0[3])
    }

    /// The raw RGBA bytes.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Borrow the mask as a raster.
    #[must_use]
    pub const fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    /// Consume the mask, returning the underlying raster.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.0
    }
}

/// Inclusive pixel bounding box of a raster's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Leftmost content column.
    pub left: u32,
    /// Topmost content row.
    pub top: u32,
    /// Rightmost content column (inclusive).
    pub right: u32,
    /// Bottommost content row (inclusive).
    pub bottom: u32,
}

impl Bounds {
    /// Number of columns covered.
    ///
    /// Expects `left <= right`; an inverted box counts as one column.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.right.saturating_sub(self.left).saturating_add(1)
    }

    /// Number of rows covered.
    ///
    /// Expects `top <= bottom`; an inverted box counts as one row.
    #[must_use]
    pub const fn height(self) -> u32 {
        self.bottom.saturating_sub(self.top).saturating_add(1)
    }

    /// Grow the box by `padding` on every side, clamped to a
    /// `width` x `height` raster.
    ///
    /// The raster must contain the box (so both extents are non-zero).
    #[must_use]
    pub fn expand(self, padding: u32, width: u32, height: u32) -> Self {
        Self {
            left: self.left.saturating_sub(padding),
            top: self.top.saturating_sub(padding),
            right: self
                .right
                .saturating_add(padding)
                .min(width.saturating_sub(1)),
            bottom: self
                .bottom
                .saturating_add(padding)
                .min(height.saturating_sub(1)),
        }
    }
}

/// Whether a click adds to or carves out of the selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickKind {
    /// Positive prompt: the clicked region belongs to the object.
    #[default]
    Include,
    /// Negative prompt: the clicked region is background.
    Exclude,
}

impl ClickKind {
    /// The name the segmentation engine expects.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }
}

impl fmt::Display for ClickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prompt point in source-image pixel space (not display space).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Click {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
    /// Include or exclude.
    pub kind: ClickKind,
}

impl Click {
    /// An include click at `(x, y)`.
    #[must_use]
    pub const fn include(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            kind: ClickKind::Include,
        }
    }

    /// An exclude click at `(x, y)`.
    #[must_use]
    pub const fn exclude(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            kind: ClickKind::Exclude,
        }
    }

    /// Whether the click lands inside a `width` x `height` image.
    #[must_use]
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        (0.0..f64::from(width)).contains(&self.x) && (0.0..f64::from(height)).contains(&self.y)
    }
}

/// Options for [`apply_mask_to_image`](crate::mask::apply_mask_to_image).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Crop the result to its non-transparent content.
    pub trim_to_content: bool,

    /// Pixels of margin kept around the content when trimming.
    /// Ignored unless `trim_to_content` is set.
    pub padding: u32,
}

/// RGB color used to tint mask overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayColor {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl OverlayColor {
    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for OverlayColor {
    fn default() -> Self {
        Self::new(0, 114, 189)
    }
}

impl fmt::Display for OverlayColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for OverlayColor {
    type Err = ParseColorError;

    /// Parse `"#rrggbb"`, `"rrggbb"`, or the short `"#rgb"` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        let err = || ParseColorError(s.to_owned());
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, ch) in rgb.iter_mut().zip(hex.chars()) {
                    let n = ch.to_digit(16).ok_or_else(err)?;
                    *slot = u8::try_from(n * 17).map_err(|_| err())?;
                }
                Ok(Self::new(rgb[0], rgb[1], rgb[2]))
            }
            6 if hex.is_ascii() => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
                Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
            }
            _ => Err(err()),
        }
    }
}

/// A string could not be parsed as a hex color.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex color: {0:?}")]
pub struct ParseColorError(String);

/// Errors from building a [`PixelMask`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskError {
    /// The byte buffer does not hold exactly `width * height * 4` bytes.
    #[error("mask data has {actual} bytes, expected {expected}")]
    DataLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The dimensions cannot describe an in-memory raster.
    #[error("invalid mask dimensions {width}x{height}")]
    Dimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Invalid input to a segmentation request.
///
/// Always reported synchronously by the
/// [`Segmenter`](crate::segmenter::Segmenter), never through the queue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentError {
    /// No image has been loaded yet.
    #[error("no image loaded")]
    NoImage,

    /// The click lies outside the loaded image.
    #[error("click at ({x}, {y}) is outside the {width}x{height} image")]
    ClickOutOfBounds {
        /// Click x.
        x: f64,
        /// Click y.
        y: f64,
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },
}
