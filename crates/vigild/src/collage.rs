//! Collage assembly for identity groups.
//!
//! Lays the member crops of one group out on a fixed grid, at most five
//! across, each cell normalized to a portrait aspect. The result is what
//! gets uploaded next to the group's entry in the analysis report.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

const MAX_COLS: u32 = 5;
const CELL_WIDTH: u32 = 128;
const CELL_HEIGHT: u32 = 160;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Grid dimensions (columns, rows) for `n` crops.
fn grid_for(n: u32) -> (u32, u32) {
    let cols = n.min(MAX_COLS).max(1);
    let rows = n.div_ceil(cols).max(1);
    (cols, rows)
}

/// Compose the crops into one grid image.
pub fn assemble(crops: &[RgbImage]) -> RgbImage {
    let (cols, rows) = grid_for(crops.len() as u32);
    let mut canvas = RgbImage::from_pixel(cols * CELL_WIDTH, rows * CELL_HEIGHT, BACKGROUND);

    for (i, crop) in crops.iter().enumerate() {
        let cell = imageops::resize(crop, CELL_WIDTH, CELL_HEIGHT, FilterType::Triangle);
        let x = (i as u32 % cols) * CELL_WIDTH;
        let y = (i as u32 / cols) * CELL_HEIGHT;
        imageops::replace(&mut canvas, &cell, x as i64, y as i64);
    }

    canvas
}
