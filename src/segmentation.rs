//! # Tile Segmentation Module
//!
//! Splits a (possibly very large) enhanced page into overlapping tiles sized
//! for reliable recognition. Tiles are independent and embarrassingly
//! parallel; each carries its placement in the enhanced image's coordinate
//! space, which is the contract reassembly depends on.
//!
//! Question papers additionally get structural tiles (header, footer, and
//! margins on wide pages) because instructions, marks, and continuation text
//! live in those regions and are under-sampled by the regular grid.

use image::DynamicImage;
use tracing::debug;

use crate::document_class::DocumentClass;

/// Handwriting recognition degrades on large tiles, so tile sides are capped
/// harder than for printed text
pub const HANDWRITING_MAX_TILE: u32 = 600;
/// Minimum overlap fraction for handwriting, so cut-off strokes always
/// appear whole in a neighboring tile
pub const HANDWRITING_MIN_OVERLAP: f32 = 0.30;
/// Header and footer structural tiles are at most this tall
const STRUCTURAL_BAND_MAX_HEIGHT: u32 = 300;
/// Pages wider than this also get left/right margin tiles
const WIDE_PAGE_THRESHOLD: u32 = 1000;
/// Margin tiles are at most this wide
const MARGIN_MAX_WIDTH: u32 = 260;

/// Role of a tile within the page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    /// Regular grid tile
    Body,
    /// Top band of a question paper
    Header,
    /// Bottom band of a question paper
    Footer,
    /// Left edge band of a wide question paper
    LeftMargin,
    /// Right edge band of a wide question paper
    RightMargin,
}

/// A sub-rectangle of the enhanced image dispatched independently for
/// recognition.
#[derive(Debug, Clone)]
pub struct Tile {
    /// The tile's pixels
    pub image: DynamicImage,
    /// Left edge in the enhanced image's coordinate space
    pub x: u32,
    /// Top edge in the enhanced image's coordinate space
    pub y: u32,
    /// Tile width in pixels
    pub width: u32,
    /// Tile height in pixels
    pub height: u32,
    /// Structural role of the tile
    pub kind: TileKind,
    /// Set when recognition of this tile failed terminally
    pub error: Option<String>,
}

/// Split an enhanced page into overlapping tiles.
///
/// An image that already fits within one tile is returned as a single tile
/// covering the whole image. Otherwise tiles are emitted left-to-right,
/// top-to-bottom; edge tiles are shrunk to the remaining extent rather than
/// padded. For handwriting the tile side is capped at
/// [`HANDWRITING_MAX_TILE`] and the overlap raised to at least
/// [`HANDWRITING_MIN_OVERLAP`].
pub fn segment(
    image: &DynamicImage,
    class: DocumentClass,
    max_tile_width: u32,
    max_tile_height: u32,
    overlap_fraction: f32,
) -> Vec<Tile> {
    let (width, height) = (image.width(), image.height());

    let (tile_width, tile_height, overlap) = if class.is_handwritten() {
        (
            max_tile_width.min(HANDWRITING_MAX_TILE),
            max_tile_height.min(HANDWRITING_MAX_TILE),
            overlap_fraction.max(HANDWRITING_MIN_OVERLAP),
        )
    } else {
        (max_tile_width, max_tile_height, overlap_fraction)
    };

    if width <= tile_width && height <= tile_height {
        return vec![whole_image_tile(image)];
    }

    let mut tiles = Vec::new();
    for (y, tile_h) in axis_offsets(height, tile_height, overlap) {
        for (x, tile_w) in axis_offsets(width, tile_width, overlap) {
            tiles.push(Tile {
                image: image.crop_imm(x, y, tile_w, tile_h),
                x,
                y,
                width: tile_w,
                height: tile_h,
                kind: TileKind::Body,
                error: None,
            });
        }
    }

    if class == DocumentClass::QuestionPaper {
        tiles.extend(structural_tiles(image));
    }

    debug!(
        target: "scan_pipeline",
        tiles = %tiles.len(),
        tile_size = %format!("{}x{}", tile_width, tile_height),
        overlap = %overlap,
        class = %class,
        "Segmented page into tiles"
    );

    tiles
}

/// Tile start offsets and lengths along one axis.
///
/// `overlap_px = floor(tile * fraction)`; the tile count is
/// `ceil((dim - overlap) / (tile - overlap))`. The final tile is shrunk to
/// the remaining extent.
fn axis_offsets(dim: u32, tile: u32, overlap_fraction: f32) -> Vec<(u32, u32)> {
    if dim <= tile {
        return vec![(0, dim)];
    }

    let overlap = (tile as f32 * overlap_fraction).floor() as u32;
    let stride = (tile - overlap).max(1);
    let count = (dim - overlap).div_ceil(stride);

    (0..count)
        .map(|i| {
            let start = i * stride;
            (start, tile.min(dim - start))
        })
        .collect()
}

/// Single tile covering the whole image
fn whole_image_tile(image: &DynamicImage) -> Tile {
    Tile {
        image: image.clone(),
        x: 0,
        y: 0,
        width: image.width(),
        height: image.height(),
        kind: TileKind::Body,
        error: None,
    }
}

/// Header, footer, and (for wide pages) margin tiles for question papers
fn structural_tiles(image: &DynamicImage) -> Vec<Tile> {
    let (width, height) = (image.width(), image.height());
    let band_height = STRUCTURAL_BAND_MAX_HEIGHT.min(height / 4).max(1);

    let mut tiles = vec![
        Tile {
            image: image.crop_imm(0, 0, width, band_height),
            x: 0,
            y: 0,
            width,
            height: band_height,
            kind: TileKind::Header,
            error: None,
        },
        Tile {
            image: image.crop_imm(0, height - band_height, width, band_height),
            x: 0,
            y: height - band_height,
            width,
            height: band_height,
            kind: TileKind::Footer,
            error: None,
        },
    ];

    if width > WIDE_PAGE_THRESHOLD {
        let margin_width = MARGIN_MAX_WIDTH.min(width / 6).max(1);
        tiles.push(Tile {
            image: image.crop_imm(0, 0, margin_width, height),
            x: 0,
            y: 0,
            width: margin_width,
            height,
            kind: TileKind::LeftMargin,
            error: None,
        });
        tiles.push(Tile {
            image: image.crop_imm(width - margin_width, 0, margin_width, height),
            x: width - margin_width,
            y: 0,
            width: margin_width,
            height,
            kind: TileKind::RightMargin,
            error: None,
        });
    }

    tiles
}
