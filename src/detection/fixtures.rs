//! Synthetic CAPTCHA backgrounds for tests.
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

const STRIPE_LIGHT: Rgb<u8> = Rgb([150, 170, 190]);
const STRIPE_DARK: Rgb<u8> = Rgb([90, 110, 130]);
const GAP_FILL: Rgb<u8> = Rgb([40, 40, 40]);

/// Horizontal 4px stripes: every column has the same profile.
pub fn striped_background(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        if (y / 4) % 2 == 0 {
            STRIPE_LIGHT
        } else {
            STRIPE_DARK
        }
    })
}

/// Striped background with a flat dark square gap of side `gap_size`,
/// starting at `gap_x` and vertically centered.
pub fn captcha_with_gap(width: u32, height: u32, gap_x: u32, gap_size: u32) -> RgbImage {
    let mut image = striped_background(width, height);
    let top = height.saturating_sub(gap_size) / 2;
    for y in top..(top + gap_size).min(height) {
        for x in gap_x..(gap_x + gap_size).min(width) {
            image.put_pixel(x, y, GAP_FILL);
        }
    }
    image
}

/// Plain gray background with a bright filled square piece.
pub fn background_with_piece(width: u32, height: u32, x0: u32, y0: u32, size: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y) {
            Rgb([200, 200, 200])
        } else {
            Rgb([128, 128, 128])
        }
    })
}

pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("in-memory PNG encoding");
    bytes.into_inner()
}
