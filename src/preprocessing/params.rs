//! # Enhancement Parameter Tables
//!
//! All class- and brightness-dependent tuning lives here as declarative
//! data, keyed by `(DocumentClass, BrightnessBucket)`. The enhancement
//! algorithm itself stays generic; changing how a dark handwritten photo is
//! treated means editing one table entry, not hunting thresholds through the
//! pipeline.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::document_class::{BrightnessBucket, DocumentClass};

/// Parameters applied by the adaptive enhancer for one
/// `(class, brightness bucket)` combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancementParams {
    /// Linear contrast factor around the 128 midpoint
    pub contrast: f32,
    /// Brightness offset added after the contrast stretch
    pub brightness_offset: f32,
    /// Gaussian denoise sigma; zero disables the pass
    pub denoise_sigma: f32,
    /// Unsharp-mask strength; zero disables the pass
    pub sharpen_strength: f32,
    /// Adaptive threshold neighborhood side length
    pub threshold_block_size: u32,
    /// Subtracted from the local mean during thresholding
    pub threshold_offset: i16,
    /// Stroke dilation radius used by the handwriting stroke repair pass
    pub stroke_width: f32,
    /// Sobel magnitude above which a pixel counts as an ink edge
    pub edge_threshold: u16,
    /// Foreground neighbors required for a pixel to survive despeckling
    pub despeckle_min_neighbors: u8,
    /// Despeckle window radius (1 = 8-neighborhood)
    pub despeckle_window_radius: u32,
}

/// Greyscale channel weights per class. Printed text uses the standard luma
/// weights; handwriting weights the blue channel more heavily because blue
/// and black ink show more contrast there.
pub fn grey_weights(class: DocumentClass) -> [f32; 3] {
    if class.is_handwritten() {
        [0.25, 0.35, 0.40]
    } else {
        [0.299, 0.587, 0.114]
    }
}

/// Resize band for the larger image dimension per class. Handwriting needs
/// the largest floor to preserve thin strokes.
pub fn dimension_band(class: DocumentClass) -> (u32, u32) {
    match class {
        DocumentClass::StudentHandwritten => (1500, 2400),
        DocumentClass::QuestionPaper => (1100, 2200),
        DocumentClass::ModelAnswer => (1100, 2200),
        DocumentClass::McqOptions => (900, 2000),
    }
}

lazy_static! {
    static ref PARAM_TABLE: HashMap<(DocumentClass, BrightnessBucket), EnhancementParams> = {
        use BrightnessBucket::{Dark, Light, Mid};
        use DocumentClass::{McqOptions, ModelAnswer, QuestionPaper, StudentHandwritten};

        let printed_base = EnhancementParams {
            contrast: 1.2,
            brightness_offset: 5.0,
            denoise_sigma: 0.0,
            sharpen_strength: 0.3,
            threshold_block_size: 15,
            threshold_offset: 10,
            stroke_width: 0.0,
            edge_threshold: 96,
            despeckle_min_neighbors: 1,
            despeckle_window_radius: 1,
        };
        let hand_base = EnhancementParams {
            contrast: 1.3,
            brightness_offset: 0.0,
            denoise_sigma: 1.0,
            sharpen_strength: 0.5,
            threshold_block_size: 31,
            threshold_offset: 7,
            stroke_width: 1.0,
            edge_threshold: 80,
            despeckle_min_neighbors: 2,
            despeckle_window_radius: 1,
        };

        let mut table = HashMap::new();

        // Question papers: dense printed text, crisp glyph edges
        table.insert((QuestionPaper, Dark), EnhancementParams {
            contrast: 1.45,
            brightness_offset: 28.0,
            sharpen_strength: 0.4,
            ..printed_base
        });
        table.insert((QuestionPaper, Mid), printed_base);
        table.insert((QuestionPaper, Light), EnhancementParams {
            contrast: 1.35,
            brightness_offset: -12.0,
            denoise_sigma: 0.8,
            threshold_block_size: 17,
            threshold_offset: 12,
            ..printed_base
        });

        // Model answers: typeset like question papers, usually cleaner scans
        table.insert((ModelAnswer, Dark), EnhancementParams {
            contrast: 1.4,
            brightness_offset: 25.0,
            ..printed_base
        });
        table.insert((ModelAnswer, Mid), EnhancementParams {
            contrast: 1.15,
            ..printed_base
        });
        table.insert((ModelAnswer, Light), EnhancementParams {
            contrast: 1.3,
            brightness_offset: -10.0,
            threshold_offset: 12,
            ..printed_base
        });

        // MCQ options: small printed strips, fine locality matters most
        table.insert((McqOptions, Dark), EnhancementParams {
            contrast: 1.5,
            brightness_offset: 30.0,
            threshold_block_size: 13,
            threshold_offset: 11,
            ..printed_base
        });
        table.insert((McqOptions, Mid), EnhancementParams {
            contrast: 1.25,
            threshold_block_size: 13,
            threshold_offset: 11,
            ..printed_base
        });
        table.insert((McqOptions, Light), EnhancementParams {
            contrast: 1.4,
            brightness_offset: -15.0,
            threshold_block_size: 13,
            threshold_offset: 13,
            ..printed_base
        });

        // Handwriting: thin uneven strokes, larger blocks, gentler offsets
        table.insert((StudentHandwritten, Dark), EnhancementParams {
            contrast: 1.5,
            brightness_offset: 30.0,
            denoise_sigma: 1.2,
            ..hand_base
        });
        table.insert((StudentHandwritten, Mid), hand_base);
        table.insert((StudentHandwritten, Light), EnhancementParams {
            contrast: 1.45,
            brightness_offset: -15.0,
            threshold_block_size: 35,
            threshold_offset: 6,
            ..hand_base
        });

        table
    };
}

/// Look up the enhancement parameters for a class and brightness bucket.
pub fn lookup(class: DocumentClass, bucket: BrightnessBucket) -> EnhancementParams {
    *PARAM_TABLE
        .get(&(class, bucket))
        .expect("parameter table covers every class and bucket")
}

/// Widen the stroke repair and relax edge detection for sparse handwriting,
/// where thin isolated strokes would otherwise be thresholded or despeckled
/// away.
pub fn adjust_for_sparse_handwriting(params: EnhancementParams) -> EnhancementParams {
    EnhancementParams {
        stroke_width: (params.stroke_width * 2.0).max(2.0),
        edge_threshold: params.edge_threshold.saturating_sub(24).max(32),
        despeckle_min_neighbors: params.despeckle_min_neighbors.max(2),
        despeckle_window_radius: 2,
        ..params
    }
}
