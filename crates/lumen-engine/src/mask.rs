use image::{Rgb, RgbImage};
use lumen_contracts::regions::RegionRect;

use crate::error::Result;
use crate::normalize::encode_png;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Builds an inpainting mask for the given canvas. White marks pixels to
/// regenerate, black marks pixels to preserve.
///
/// No rectangles means "regenerate everything": an all-white canvas.
/// Otherwise rectangles are painted white over black in listed order;
/// paint falling outside the canvas is silently discarded. `invert` swaps
/// the two roles as a final step.
pub fn synthesize(width: u32, height: u32, rects: &[RegionRect], invert: bool) -> RgbImage {
    let mut mask = RgbImage::new(width, height);
    if rects.is_empty() {
        for pixel in mask.pixels_mut() {
            *pixel = WHITE;
        }
    } else {
        for rect in rects {
            paint_white(&mut mask, rect);
        }
    }
    if invert {
        invert_in_place(&mut mask);
    }
    mask
}

/// Monochrome negation, applied channel-wise so intermediate values from
/// externally supplied masks invert too.
pub fn invert_in_place(mask: &mut RgbImage) {
    for pixel in mask.pixels_mut() {
        let Rgb([r, g, b]) = *pixel;
        *pixel = Rgb([255 - r, 255 - g, 255 - b]);
    }
}

/// Lossless 3-channel encoding of a synthesized mask.
pub fn encode(mask: &RgbImage) -> Result<Vec<u8>> {
    encode_png(mask)
}

fn paint_white(mask: &mut RgbImage, rect: &RegionRect) {
    let x_end = rect.x.saturating_add(rect.width).min(mask.width());
    let y_end = rect.y.saturating_add(rect.height).min(mask.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            mask.put_pixel(x, y, WHITE);
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use lumen_contracts::regions::RegionRect;

    use super::{invert_in_place, synthesize};

    fn rect(x: u32, y: u32, width: u32, height: u32) -> RegionRect {
        RegionRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn empty_rect_list_yields_all_white() {
        let mask = synthesize(64, 48, &[], false);
        assert_eq!((mask.width(), mask.height()), (64, 48));
        assert!(mask.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn one_full_canvas_rect_equals_the_empty_case() {
        let empty = synthesize(64, 48, &[], false);
        let full = synthesize(64, 48, &[rect(0, 0, 64, 48)], false);
        assert_eq!(empty.as_raw(), full.as_raw());
    }

    #[test]
    fn rects_paint_white_over_black() {
        let mask = synthesize(100, 100, &[rect(10, 10, 20, 20)], false);
        assert_eq!(*mask.get_pixel(15, 15), Rgb([255, 255, 255]));
        assert_eq!(*mask.get_pixel(29, 29), Rgb([255, 255, 255]));
        assert_eq!(*mask.get_pixel(30, 30), Rgb([0, 0, 0]));
        assert_eq!(*mask.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn overlapping_rects_stay_white() {
        let mask = synthesize(50, 50, &[rect(0, 0, 30, 30), rect(20, 20, 30, 30)], false);
        assert_eq!(*mask.get_pixel(25, 25), Rgb([255, 255, 255]));
        assert_eq!(*mask.get_pixel(45, 45), Rgb([255, 255, 255]));
    }

    #[test]
    fn out_of_canvas_paint_is_discarded() {
        let mask = synthesize(40, 40, &[rect(30, 30, 100, 100)], false);
        assert_eq!(*mask.get_pixel(35, 35), Rgb([255, 255, 255]));
        assert_eq!(*mask.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!((mask.width(), mask.height()), (40, 40));
    }

    #[test]
    fn inversion_swaps_roles() {
        let mask = synthesize(20, 20, &[rect(0, 0, 10, 10)], true);
        assert_eq!(*mask.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*mask.get_pixel(15, 15), Rgb([255, 255, 255]));
    }

    #[test]
    fn inversion_is_self_inverse() {
        let original = synthesize(32, 32, &[rect(4, 4, 9, 13)], false);
        let mut round_tripped = original.clone();
        invert_in_place(&mut round_tripped);
        invert_in_place(&mut round_tripped);
        assert_eq!(original.as_raw(), round_tripped.as_raw());
    }
}
