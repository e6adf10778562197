//! Pixel compositor — cuts grid composites into panel tiles and stitches
//! reference stills into a single collage. Pure `image`-crate geometry;
//! nothing here touches the graph.

use image::imageops::FilterType;
use image::{Rgba, RgbaImage, imageops};

/// Canvas width used for stitched collages; height follows the target
/// aspect ratio.
const STITCH_WIDTH: u32 = 2048;
/// Collage background fill (matches the app's near-black canvas).
const STITCH_BG: Rgba<u8> = Rgba([10, 10, 10, 255]);

/// Parse an `"W:H"` aspect string to a ratio. Unparseable input falls back
/// to 16:9 rather than failing — the string comes from a fixed UI set.
pub fn aspect_ratio_value(ar: &str) -> f32 {
    let mut parts = ar.split(':');
    let w = parts.next().and_then(|p| p.trim().parse::<f32>().ok());
    let h = parts.next().and_then(|p| p.trim().parse::<f32>().ok());
    match (w, h) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => w / h,
        _ => 16.0 / 9.0,
    }
}

/// Cut a composite into `rows * cols` equal tiles, row-major. Tile size is
/// `floor(w/cols) x floor(h/rows)`; a ragged right/bottom edge is dropped.
/// 1x1 returns the input unchanged.
pub fn slice_grid(img: &RgbaImage, rows: u32, cols: u32) -> Vec<RgbaImage> {
    if rows <= 1 && cols <= 1 {
        return vec![img.clone()];
    }
    let tile_w = img.width() / cols;
    let tile_h = img.height() / rows;
    if tile_w == 0 || tile_h == 0 {
        return vec![img.clone()];
    }
    let mut tiles = Vec::with_capacity((rows * cols) as usize);
    for r in 0..rows {
        for c in 0..cols {
            let tile = imageops::crop_imm(img, c * tile_w, r * tile_h, tile_w, tile_h).to_image();
            tiles.push(tile);
        }
    }
    tiles
}

/// Stitch up to `rows * cols` images into one collage of the target aspect
/// ratio. Each cell is filled center-crop style (cover, not letterbox);
/// surplus images are ignored, missing cells stay background.
pub fn stitch_grid(images: &[RgbaImage], rows: u32, cols: u32, target_aspect: &str) -> RgbaImage {
    let total_w = STITCH_WIDTH;
    let total_h = ((total_w as f32 / aspect_ratio_value(target_aspect)).round() as u32).max(1);
    let cell_w = total_w / cols.max(1);
    let cell_h = total_h / rows.max(1);

    let mut canvas = RgbaImage::from_pixel(total_w, total_h, STITCH_BG);
    if cell_w == 0 || cell_h == 0 {
        return canvas;
    }

    for (index, src) in images.iter().enumerate() {
        if index as u32 >= rows * cols || src.width() == 0 || src.height() == 0 {
            break;
        }
        let r = index as u32 / cols;
        let c = index as u32 % cols;
        let cell = cover_crop(src, cell_w, cell_h);
        imageops::replace(
            &mut canvas,
            &cell,
            (c * cell_w) as i64,
            (r * cell_h) as i64,
        );
    }
    canvas
}

/// Scale `src` so it covers `w x h`, then crop the centered window.
fn cover_crop(src: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    let scale = (w as f32 / src.width() as f32).max(h as f32 / src.height() as f32);
    let scaled_w = ((src.width() as f32 * scale).ceil() as u32).max(w);
    let scaled_h = ((src.height() as f32 * scale).ceil() as u32).max(h);
    let scaled = imageops::resize(src, scaled_w, scaled_h, FilterType::Triangle);
    let off_x = (scaled_w - w) / 2;
    let off_y = (scaled_h - h) / 2;
    imageops::crop_imm(&scaled, off_x, off_y, w, h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    #[test]
    fn aspect_parsing() {
        assert_eq!(aspect_ratio_value("1:1"), 1.0);
        assert_eq!(aspect_ratio_value("21:9"), 21.0 / 9.0);
        // Garbage degrades to widescreen.
        assert_eq!(aspect_ratio_value("wat"), 16.0 / 9.0);
    }

    #[test]
    fn slice_single_returns_input() {
        let img = solid(64, 64, [5, 6, 7]);
        let tiles = slice_grid(&img, 1, 1);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].dimensions(), (64, 64));
    }

    #[test]
    fn slice_uses_floor_tiles_row_major() {
        // 101x67 into 3x3: tiles are floor-sized, ragged edge dropped.
        let img = solid(101, 67, [9, 9, 9]);
        let tiles = slice_grid(&img, 3, 3);
        assert_eq!(tiles.len(), 9);
        for tile in &tiles {
            assert_eq!(tile.dimensions(), (33, 22));
        }
    }

    #[test]
    fn stitch_then_slice_preserves_quadrants() {
        // Four solid-color sources in a 2x2 square collage; slicing the
        // result back must give each quadrant its original color (pixel
        // region correspondence, not byte identity).
        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];
        let sources: Vec<RgbaImage> = colors.iter().map(|c| solid(100, 100, *c)).collect();

        let collage = stitch_grid(&sources, 2, 2, "1:1");
        assert_eq!(collage.dimensions(), (2048, 2048));

        let tiles = slice_grid(&collage, 2, 2);
        assert_eq!(tiles.len(), 4);
        for (tile, color) in tiles.iter().zip(colors.iter()) {
            let center = tile.get_pixel(tile.width() / 2, tile.height() / 2);
            assert_eq!(&center.0[..3], color);
        }
    }

    #[test]
    fn stitch_ignores_surplus_images() {
        let sources: Vec<RgbaImage> = (0..6).map(|i| solid(10, 10, [i * 40, 0, 0])).collect();
        // 2x2 takes the first four; no panic, no bleed into background.
        let collage = stitch_grid(&sources, 2, 2, "16:9");
        assert_eq!(collage.width(), 2048);
    }

    #[test]
    fn cover_crop_fills_cell_exactly() {
        let tall = solid(50, 200, [1, 2, 3]);
        let cell = cover_crop(&tall, 100, 100);
        assert_eq!(cell.dimensions(), (100, 100));
    }
}
