//! Mask raster algebra: bounds, overlays, cutouts, and trimming.
//!
//! Everything here is pure and synchronous. A pixel is *content* when
//! its alpha byte is nonzero. A fully transparent mask is valid input:
//! it has no bounds, and trimming it is a no-op.

use image::{Rgba, RgbaImage};

use crate::types::{Bounds, ExtractOptions, OverlayColor, PixelMask};

/// Tight inclusive bounding box of the mask's content pixels.
///
/// Returns `None` when no pixel has nonzero alpha.
#[must_use]
pub fn compute_bounds(mask: &PixelMask) -> Option<Bounds> {
    content_bounds(mask.as_image())
}

/// Tight inclusive bounding box of a raster's non-transparent pixels.
///
/// Single row-major pass with no per-pixel allocation.
#[must_use]
pub fn content_bounds(raster: &RgbaImage) -> Option<Bounds> {
    let mut bounds: Option<Bounds> = None;
    for (x, y, pixel) in raster.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => Bounds {
                left: x,
                top: y,
                right: x,
                bottom: y,
            },
            Some(b) => Bounds {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x),
                bottom: b.bottom.max(y),
            },
        });
    }
    bounds
}

/// Tint the mask with `color` for drawing over the source image.
///
/// Content pixels take the color's RGB and keep their own alpha, so
/// antialiased edges stay soft. Everything else is fully transparent.
#[must_use = "returns the overlay raster"]
pub fn composite_overlay(mask: &PixelMask, color: OverlayColor) -> RgbaImage {
    let mut overlay = RgbaImage::new(mask.width(), mask.height());
    for (dst, src) in overlay.pixels_mut().zip(mask.as_image().pixels()) {
        let alpha = src.0[3];
        if alpha != 0 {
            *dst = Rgba([color.r, color.g, color.b, alpha]);
        }
    }
    overlay
}

/// Cut the masked object out of `image`.
///
/// The mask may have a different resolution than the image; each image
/// pixel `(x, y)` reads the mask at
/// `(floor(x * mask_w / image_w), floor(y * mask_h / image_h))`.
/// Where that mask pixel's alpha is exactly zero the output alpha is
/// zeroed; any nonzero alpha leaves the image pixel untouched (binary
/// cutout, not soft matting). RGB is never modified.
///
/// With [`ExtractOptions::trim_to_content`] the result is cropped by
/// [`trim_to_content`] using [`ExtractOptions::padding`].
#[must_use = "returns the extracted raster"]
pub fn apply_mask_to_image(
    image: &RgbaImage,
    mask: &PixelMask,
    options: &ExtractOptions,
) -> RgbaImage {
    let (image_w, image_h) = image.dimensions();
    let (mask_w, mask_h) = (mask.width(), mask.height());

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        // A degenerate (empty) mask has nothing to sample and cuts everything.
        let alpha = mask
            .alpha_at(
                nearest_index(x, image_w, mask_w),
                nearest_index(y, image_h, mask_h),
            )
            .unwrap_or(0);
        if alpha == 0 {
            pixel.0[3] = 0;
        }
    }

    if options.trim_to_content {
        trim_to_content(&out, options.padding)
    } else {
        out
    }
}

/// Crop a raster to its non-transparent content plus `padding`.
///
/// The padded box is clamped to the raster. Pixels are copied as-is.
/// A raster with no content is returned unchanged.
#[must_use = "returns the trimmed raster"]
pub fn trim_to_content(raster: &RgbaImage, padding: u32) -> RgbaImage {
    let Some(bounds) = content_bounds(raster) else {
        return raster.clone();
    };
    let region = bounds.expand(padding, raster.width(), raster.height());
    image::imageops::crop_imm(
        raster,
        region.left,
        region.top,
        region.width(),
        region.height(),
    )
    .to_image()
}

/// Map `coord` in `0..from` onto `0..to` by flooring `coord * to / from`.
///
/// Integer arithmetic in `u64` so the floor is exact. `from` is non-zero
/// whenever a coordinate exists.
#[expect(clippy::cast_possible_truncation)]
fn nearest_index(coord: u32, from: u32, to: u32) -> u32 {
    // Result is < `to`, so it fits in u32.
    (u64::from(coord) * u64::from(to) / u64::from(from)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A fully transparent `w` x `h` mask.
    fn empty_mask(w: u32, h: u32) -> PixelMask {
        PixelMask::from_image(RgbaImage::new(w, h))
    }

    /// A mask whose alpha is `alpha(x, y)`.
    fn mask_from_fn(w: u32, h: u32, alpha: impl Fn(u32, u32) -> u8) -> PixelMask {
        PixelMask::from_image(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([255, 255, 255, alpha(x, y)])
        }))
    }

    /// An opaque image with a position-dependent color.
    fn gradient_image(w: u32, h: u32) -> RgbaImage {
        #[expect(clippy::cast_possible_truncation)]
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 7, 255]))
    }

    // --- compute_bounds ---

    #[test]
    fn bounds_of_transparent_mask_is_none() {
        assert_eq!(compute_bounds(&empty_mask(10, 10)), None);
    }

    #[test]
    fn bounds_of_zero_sized_mask_is_none() {
        assert_eq!(compute_bounds(&empty_mask(0, 0)), None);
    }

    #[test]
    fn bounds_of_single_pixel() {
        let mask = mask_from_fn(10, 10, |x, y| if (x, y) == (5, 5) { 255 } else { 0 });
        let bounds = compute_bounds(&mask).unwrap();
        assert_eq!(
            bounds,
            Bounds {
                left: 5,
                top: 5,
                right: 5,
                bottom: 5,
            },
        );
        assert_eq!(bounds.width(), 1);
        assert_eq!(bounds.height(), 1);
    }

    #[test]
    fn bounds_span_scattered_content() {
        // An L-shape plus a faint antialiased pixel; faint pixels count.
        let mask = mask_from_fn(12, 9, |x, y| match (x, y) {
            (2, 7) | (3..=6, 7) | (2, 3..=6) => 255,
            (10, 1) => 1,
            _ => 0,
        });
        assert_eq!(
            compute_bounds(&mask),
            Some(Bounds {
                left: 2,
                top: 1,
                right: 10,
                bottom: 7,
            }),
        );
    }

    #[test]
    fn bounds_ignore_color_channels() {
        let mask = PixelMask::from_image(RgbaImage::from_fn(4, 4, |_, _| Rgba([255, 255, 255, 0])));
        assert_eq!(compute_bounds(&mask), None);
    }

    // --- composite_overlay ---

    #[test]
    fn overlay_tints_content_and_keeps_alpha() {
        let mask = mask_from_fn(3, 1, |x, _| [0, 128, 255][x as usize]);
        let color = OverlayColor::new(10, 20, 30);
        let overlay = composite_overlay(&mask, color);

        assert_eq!(overlay.dimensions(), (3, 1));
        assert_eq!(overlay.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(overlay.get_pixel(1, 0), &Rgba([10, 20, 30, 128]));
        assert_eq!(overlay.get_pixel(2, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn overlay_does_not_leak_mask_rgb_into_transparent_pixels() {
        let mask = PixelMask::from_image(RgbaImage::from_fn(2, 2, |_, _| Rgba([9, 9, 9, 0])));
        let overlay = composite_overlay(&mask, OverlayColor::default());
        assert!(overlay.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    // --- apply_mask_to_image ---

    #[test]
    fn zero_alpha_cuts_and_keeps_rgb() {
        let image = gradient_image(4, 4);
        let mask = mask_from_fn(4, 4, |x, y| if (x, y) == (1, 2) { 0 } else { 255 });
        let out = apply_mask_to_image(&image, &mask, &ExtractOptions::default());

        assert_eq!(out.get_pixel(1, 2), &Rgba([1, 2, 7, 0]));
        assert_eq!(out.get_pixel(2, 1), &Rgba([2, 1, 7, 255]));
    }

    #[test]
    fn partial_alpha_is_a_binary_keep() {
        let image = RgbaImage::from_fn(2, 1, |_, _| Rgba([50, 60, 70, 200]));
        let mask = mask_from_fn(2, 1, |x, _| if x == 0 { 128 } else { 1 });
        let out = apply_mask_to_image(&image, &mask, &ExtractOptions::default());

        assert_eq!(out, image);
    }

    #[test]
    fn lower_resolution_mask_is_sampled_nearest_neighbour() {
        // 2x2 mask over a 4x4 image: each mask pixel covers a 2x2 block.
        let image = gradient_image(4, 4);
        let mask = mask_from_fn(2, 2, |x, y| if (x, y) == (1, 0) { 0 } else { 255 });
        let out = apply_mask_to_image(&image, &mask, &ExtractOptions::default());

        for (x, y, p) in out.enumerate_pixels() {
            let cut = x >= 2 && y < 2;
            assert_eq!(p.0[3] == 0, cut, "pixel ({x}, {y})");
            assert_eq!(&p.0[..3], &image.get_pixel(x, y).0[..3]);
        }
    }

    #[test]
    fn higher_resolution_mask_uses_floor_mapping() {
        // 3x1 image over a 7x1 mask: x maps to floor(x * 7 / 3) = 0, 2, 4.
        let image = gradient_image(3, 1);
        let mask = mask_from_fn(7, 1, |x, _| if x == 2 { 0 } else { 255 });
        let out = apply_mask_to_image(&image, &mask, &ExtractOptions::default());

        assert_eq!(out.get_pixel(0, 0).0[3], 255);
        assert_eq!(out.get_pixel(1, 0).0[3], 0);
        assert_eq!(out.get_pixel(2, 0).0[3], 255);
    }

    #[test]
    fn empty_mask_cuts_everything() {
        let image = gradient_image(3, 3);
        let out = apply_mask_to_image(&image, &empty_mask(0, 0), &ExtractOptions::default());
        assert!(out.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn apply_with_trim_crops_to_padded_content() {
        let image = gradient_image(20, 20);
        let mask = mask_from_fn(20, 20, |x, y| {
            if (5..=9).contains(&x) && (6..=8).contains(&y) {
                255
            } else {
                0
            }
        });
        let options = ExtractOptions {
            trim_to_content: true,
            padding: 1,
        };
        let out = apply_mask_to_image(&image, &mask, &options);

        // Content 5..=9 x 6..=8 padded by 1 -> 4..=10 x 5..=9.
        assert_eq!(out.dimensions(), (7, 5));
        assert_eq!(out.get_pixel(0, 0), &Rgba([4, 5, 7, 0]));
        assert_eq!(out.get_pixel(1, 1), &Rgba([5, 6, 7, 255]));
    }

    // --- trim_to_content ---

    #[test]
    fn trim_with_padding_expands_inclusive_box() {
        let raster = RgbaImage::from_fn(100, 100, |x, y| {
            let inside = (10..=20).contains(&x) && (10..=20).contains(&y);
            Rgba([1, 2, 3, if inside { 255 } else { 0 }])
        });
        let trimmed = trim_to_content(&raster, 2);

        // 10..=20 padded by 2 -> 8..=22, anchored at (8, 8).
        assert_eq!(trimmed.dimensions(), (15, 15));
        assert_eq!(trimmed.get_pixel(2, 2).0[3], 255);
        assert_eq!(trimmed.get_pixel(1, 1).0[3], 0);
        assert_eq!(trimmed.get_pixel(12, 12).0[3], 255);
        assert_eq!(trimmed.get_pixel(13, 13).0[3], 0);
    }

    #[test]
    fn trim_padding_is_clamped_at_edges() {
        let raster = RgbaImage::from_fn(10, 10, |x, y| {
            Rgba([0, 0, 0, if (x, y) == (1, 8) { 255 } else { 0 }])
        });
        let trimmed = trim_to_content(&raster, 5);

        // 1-5 clamps to 0, 8+5 clamps to 9 -> columns 0..=6, rows 3..=9.
        assert_eq!(trimmed.dimensions(), (7, 7));
        assert_eq!(trimmed.get_pixel(1, 5).0[3], 255);
    }

    #[test]
    fn trim_without_content_returns_input() {
        let raster = RgbaImage::from_fn(6, 4, |x, y| Rgba([3, x as u8 * 10, y as u8, 0]));
        assert_eq!(trim_to_content(&raster, 3), raster);
    }

    #[test]
    fn trim_preserves_pixels() {
        let raster = RgbaImage::from_fn(8, 8, |x, y| {
            #[expect(clippy::cast_possible_truncation)]
            let v = (x * 8 + y) as u8;
            Rgba([v, v, v, if x >= 3 && y >= 4 { v } else { 0 }])
        });
        let trimmed = trim_to_content(&raster, 0);

        assert_eq!(trimmed.dimensions(), (5, 4));
        for (x, y, p) in trimmed.enumerate_pixels() {
            assert_eq!(p, raster.get_pixel(x + 3, y + 4));
        }
    }
}
