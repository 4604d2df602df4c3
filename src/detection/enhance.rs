//! Contrast-limited adaptive histogram equalization (CLAHE).
use image::{GrayImage, Luma};

const BINS: usize = 256;

/// Equalize `image` per tile on a `tiles x tiles` grid, clipping each tile's
/// histogram at `clip_limit` times the uniform bin height, then blend the
/// neighbouring tile mappings bilinearly.
pub fn clahe(image: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tiles = tiles.max(1);
    let tile_w = width.div_ceil(tiles).max(1);
    let tile_h = height.div_ceil(tiles).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);
        let v = image.get_pixel(x, y).0[0] as usize;

        let top = lut_at(tx0, ty0)[v] * (1.0 - ax) + lut_at(tx1, ty0)[v] * ax;
        let bottom = lut_at(tx0, ty1)[v] * (1.0 - ax) + lut_at(tx1, ty1)[v] * ax;
        let value = top * (1.0 - ay) + bottom * ay;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clipped-histogram CDF of one tile, scaled to [0, 255].
fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [f32; BINS] {
    let mut histogram = [0u32; BINS];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let area = ((x1 - x0) * (y1 - y0)).max(1);
    let limit = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);

    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    // Spread the clipped mass evenly, remainder to the lowest bins.
    let share = excess / BINS as u32;
    let remainder = (excess % BINS as u32) as usize;
    for (i, count) in histogram.iter_mut().enumerate() {
        *count += share + u32::from(i < remainder);
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0f32; BINS];
    let mut cumulative = 0u32;
    for (i, count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[i] = cumulative as f32 * scale;
    }
    lut
}

/// Neighbouring tile indices along one axis and the blend weight of the second.
fn neighbours(pos: u32, tile: u32, count: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }

    let first = (f.floor() as u32).min(count - 1);
    let second = (first + 1).min(count - 1);
    let weight = if first == second { 0.0 } else { f - first as f32 };
    (first, second, weight)
}
