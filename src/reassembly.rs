//! # Text Reassembly Module
//!
//! Reconstructs a single ordered document from per-tile recognition results.
//! Segments are grouped into visual rows by geometry, question-paper layouts
//! are checked for multiple columns, and neighboring segments within a row
//! are stitched with spacing inferred from their pixel gap and estimated
//! character width.
//!
//! The reconstruction is position-derived, never input-order-derived:
//! shuffling the segment array yields identical output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document_class::DocumentClass;

/// Rows whose start x-position is shared by at least this fraction of all
/// rows mark a candidate column
const COLUMN_SUPPORT_FRACTION: f32 = 0.2;
/// Candidate column starts closer than this to a kept candidate are merged
const COLUMN_MIN_SEPARATION: u32 = 50;
/// Row-start positions are bucketed to this granularity for the histogram
const COLUMN_BUCKET_PX: u32 = 10;

/// Trailing note appended when any segment was recovered approximately
pub const RECOVERY_NOTE: &str = "(Note: some of the recognized text may be approximate.)";

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern compiles");
}

/// A tile's recognized text bound to the tile's geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Recognized text for the tile
    pub text: String,
    /// Tile left edge in the enhanced image's coordinate space
    pub x: u32,
    /// Tile top edge
    pub y: u32,
    /// Tile width in pixels
    pub width: u32,
    /// Tile height in pixels
    pub height: u32,
    /// True when the text came from a degraded retry and may be approximate
    pub is_recovered: bool,
}

/// One visual line of segments, ordered left to right when stitched
struct Row {
    segments: Vec<Segment>,
    bottom: u32,
}

impl Row {
    fn top(&self) -> u32 {
        self.segments[0].y
    }

    fn start_x(&self) -> u32 {
        self.segments.iter().map(|s| s.x).min().unwrap_or(0)
    }

    fn min_height(&self) -> u32 {
        self.segments.iter().map(|s| s.height).min().unwrap_or(0)
    }
}

/// Reassemble recognized segments into a single ordered document.
///
/// Zero segments produce an empty string with no note; a single segment is
/// returned verbatim, bypassing row/column logic and text cleanup entirely.
pub fn reassemble(segments: &[Segment], class: DocumentClass) -> String {
    if segments.is_empty() {
        return String::new();
    }
    if segments.len() == 1 {
        let mut text = segments[0].text.clone();
        if segments[0].is_recovered && !text.is_empty() {
            text.push_str("\n\n");
            text.push_str(RECOVERY_NOTE);
        }
        return text;
    }

    let mut usable: Vec<Segment> = segments
        .iter()
        .map(|s| Segment {
            text: clean_text(&s.text),
            ..s.clone()
        })
        .filter(|s| !s.text.is_empty())
        .collect();

    if usable.is_empty() {
        return String::new();
    }
    let any_recovered = usable.iter().any(|s| s.is_recovered);
    if usable.len() == 1 {
        let mut text = usable.remove(0).text;
        if any_recovered {
            text.push_str("\n\n");
            text.push_str(RECOVERY_NOTE);
        }
        return text;
    }

    // Position-derived total order so input order never matters
    usable.sort_by(|a, b| {
        (a.y, a.x, a.width, a.height, &a.text).cmp(&(b.y, b.x, b.width, b.height, &b.text))
    });

    let rows = group_rows(usable, class);
    let ordered = order_rows(rows, class);

    let mut lines: Vec<String> = ordered
        .iter()
        .map(|row| stitch_row(row, class))
        .collect();

    if any_recovered {
        lines.push(String::new());
        lines.push(RECOVERY_NOTE.to_string());
    }

    lines.join("\n")
}

/// Collapse runs of whitespace inside recognized text and trim the ends
fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Group y-sorted segments into visual rows.
///
/// A segment joins the current row when it vertically overlaps the row
/// (`segment.y < last_segment_bottom`) or its top edge sits within a dynamic
/// threshold of the row's top. The threshold adapts to tile geometry:
/// `max(average segment height, smallest height in the current row)` scaled
/// by the class row multiplier. Handwriting lines are less uniform, so the
/// handwriting multiplier is looser.
fn group_rows(sorted: Vec<Segment>, class: DocumentClass) -> Vec<Row> {
    let multiplier = if class.is_handwritten() { 0.7 } else { 0.6 };
    let avg_height =
        sorted.iter().map(|s| s.height as f32).sum::<f32>() / sorted.len() as f32;

    let mut rows: Vec<Row> = Vec::new();

    for segment in sorted {
        let joined = match rows.last_mut() {
            Some(row) => {
                let threshold = avg_height.max(row.min_height() as f32) * multiplier;
                if segment.y < row.bottom || (segment.y - row.top()) as f32 <= threshold {
                    row.bottom = row.bottom.max(segment.y + segment.height);
                    row.segments.push(segment.clone());
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !joined {
            rows.push(Row {
                bottom: segment.y + segment.height,
                segments: vec![segment],
            });
        }
    }

    rows
}

/// Reorder rows into reading order.
///
/// Question papers are checked for a multi-column layout; when found, all
/// rows of the leftmost column are emitted before any row of the next
/// column. Strict left-to-right column precedence is a recorded design
/// choice: interleaved and right-to-left layouts are not handled. Every
/// other layout keeps the top-to-bottom order produced by row grouping.
fn order_rows(rows: Vec<Row>, class: DocumentClass) -> Vec<Row> {
    if class != DocumentClass::QuestionPaper {
        return rows;
    }

    let boundaries = detect_columns(&rows);
    if boundaries.len() < 2 {
        return rows;
    }

    debug!(
        target: "scan_pipeline",
        columns = %boundaries.len(),
        "Detected multi-column layout"
    );

    // Largest boundary at or below the row start is the row's column
    let column_of = |row: &Row| -> usize {
        let x = row.start_x();
        boundaries
            .iter()
            .rposition(|&b| b <= x)
            .unwrap_or(0)
    };

    let mut ordered: Vec<Row> = Vec::with_capacity(rows.len());
    let mut remaining: Vec<(usize, Row)> = rows.into_iter().map(|r| (column_of(&r), r)).collect();
    for column in 0..boundaries.len() {
        // Row grouping already produced top-to-bottom order within a column
        let (in_column, rest): (Vec<_>, Vec<_>) =
            remaining.into_iter().partition(|(c, _)| *c == column);
        ordered.extend(in_column.into_iter().map(|(_, r)| r));
        remaining = rest;
    }
    ordered.extend(remaining.into_iter().map(|(_, r)| r));
    ordered
}

/// Detect column start boundaries from a histogram of row-start x-positions.
fn detect_columns(rows: &[Row]) -> Vec<u32> {
    let mut histogram: std::collections::HashMap<u32, u32> = std::collections::HashMap::new();
    for row in rows {
        let bucket = (row.start_x() + COLUMN_BUCKET_PX / 2) / COLUMN_BUCKET_PX * COLUMN_BUCKET_PX;
        *histogram.entry(bucket).or_insert(0) += 1;
    }

    let support = ((rows.len() as f32 * COLUMN_SUPPORT_FRACTION).ceil() as u32).max(2);
    let mut candidates: Vec<u32> = histogram
        .into_iter()
        .filter(|&(_, count)| count >= support)
        .map(|(x, _)| x)
        .collect();
    candidates.sort_unstable();

    let mut kept: Vec<u32> = Vec::new();
    for x in candidates {
        if kept.last().map_or(true, |&last| x - last >= COLUMN_MIN_SEPARATION) {
            kept.push(x);
        }
    }
    kept
}

/// Stitch one row's segments into a line of text.
///
/// Consecutive segments are compared by the pixel gap between them against a
/// threshold derived from their mean estimated character width. Very large
/// gaps become a tab (question papers) or a double space; ordinary gaps a
/// single space; sub-threshold gaps nothing, unless the boundary characters
/// would fuse two words or a sentence boundary needs a space.
fn stitch_row(row: &Row, class: DocumentClass) -> String {
    let mut segments = row.segments.clone();
    segments.sort_by(|a, b| (a.x, a.y, &a.text).cmp(&(b.x, b.y, &b.text)));

    let multiplier = gap_multiplier(class);
    let mut line = segments[0].text.clone();

    for pair in segments.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let gap = cur.x as f32 - (prev.x + prev.width) as f32;
        let threshold = mean_char_width(prev, cur) * multiplier;

        let joiner = if gap > threshold * 3.0 {
            if class == DocumentClass::QuestionPaper {
                "\t"
            } else {
                "  "
            }
        } else if gap > threshold {
            " "
        } else if needs_separating_space(&prev.text, &cur.text) {
            " "
        } else {
            ""
        };

        line.push_str(joiner);
        line.push_str(&cur.text);
    }

    line
}

/// Average of the two neighbors' estimated character widths
fn mean_char_width(a: &Segment, b: &Segment) -> f32 {
    let estimate =
        |s: &Segment| -> f32 { s.width as f32 / s.text.chars().count().max(1) as f32 };
    (estimate(a) + estimate(b)) / 2.0
}

/// Sub-threshold gaps still get a space when joining would fuse two words or
/// swallow a sentence boundary
fn needs_separating_space(prev: &str, cur: &str) -> bool {
    let last = prev.chars().next_back();
    let first = cur.chars().next();
    match (last, first) {
        (Some(last), Some(first)) => {
            (last.is_alphanumeric() && first.is_alphanumeric())
                || (matches!(last, '.' | '!' | '?') && first.is_uppercase())
        }
        _ => false,
    }
}

/// Per-class gap multiplier: handwriting spacing is wider and less regular
fn gap_multiplier(class: DocumentClass) -> f32 {
    match class {
        DocumentClass::QuestionPaper => 0.6,
        DocumentClass::ModelAnswer => 0.65,
        DocumentClass::McqOptions => 0.7,
        DocumentClass::StudentHandwritten => 0.8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, x: u32, y: u32, width: u32, height: u32) -> Segment {
        Segment {
            text: text.to_string(),
            x,
            y,
            width,
            height,
            is_recovered: false,
        }
    }

    #[test]
    fn test_reassemble_empty_is_empty_without_note() {
        assert_eq!(reassemble(&[], DocumentClass::QuestionPaper), "");
    }

    #[test]
    fn test_reassemble_single_segment_verbatim() {
        let s = seg("What is photosynthesis?", 10, 10, 400, 40);
        assert_eq!(
            reassemble(&[s], DocumentClass::QuestionPaper),
            "What is photosynthesis?"
        );
    }

    #[test]
    fn test_rows_emitted_top_to_bottom() {
        let segments = vec![
            seg("second line", 0, 120, 300, 40),
            seg("first line", 0, 10, 300, 40),
            seg("third line", 0, 240, 300, 40),
        ];
        let text = reassemble(&segments, DocumentClass::ModelAnswer);
        assert_eq!(text, "first line\nsecond line\nthird line");
    }

    #[test]
    fn test_same_row_segments_merge_left_to_right() {
        // Vertical overlap keeps both segments on one row despite jitter
        let segments = vec![
            seg("world", 230, 14, 200, 40),
            seg("hello", 0, 10, 200, 40),
        ];
        let text = reassemble(&segments, DocumentClass::ModelAnswer);
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_gap_just_above_threshold_inserts_one_space() {
        // 5ch over 100px = 20px/char for both; multiplier 0.6 -> threshold 12
        let a = seg("alpha", 0, 0, 100, 30);
        let b = seg("bravo", 113, 0, 100, 30); // gap 13 = threshold + 1
        let text = reassemble(&[a, b], DocumentClass::QuestionPaper);
        assert_eq!(text, "alpha bravo");
    }

    #[test]
    fn test_subthreshold_gap_alphanumeric_boundary_inserts_space() {
        let a = seg("alpha", 0, 0, 100, 30);
        let b = seg("bravo", 111, 0, 100, 30); // gap 11 = threshold - 1
        let text = reassemble(&[a, b], DocumentClass::QuestionPaper);
        assert_eq!(text, "alpha bravo");
    }

    #[test]
    fn test_subthreshold_gap_punctuation_boundary_inserts_nothing() {
        let a = seg("alpha,", 0, 0, 100, 30);
        let b = seg("(b)", 105, 0, 100, 30);
        let text = reassemble(&[a, b], DocumentClass::QuestionPaper);
        assert_eq!(text, "alpha,(b)");
    }

    #[test]
    fn test_sentence_boundary_gets_space() {
        let a = seg("done.", 0, 0, 100, 30);
        let b = seg("Next", 102, 0, 100, 30);
        let text = reassemble(&[a, b], DocumentClass::QuestionPaper);
        assert_eq!(text, "done. Next");
    }

    #[test]
    fn test_very_large_gap_tab_for_question_paper() {
        let a = seg("Q1", 0, 0, 40, 30);
        let b = seg("5 marks", 500, 0, 140, 30);
        let text = reassemble(&[a, b], DocumentClass::QuestionPaper);
        assert_eq!(text, "Q1\t5 marks");
    }

    #[test]
    fn test_very_large_gap_double_space_elsewhere() {
        let a = seg("Q1", 0, 0, 40, 30);
        let b = seg("5 marks", 500, 0, 140, 30);
        let text = reassemble(&[a, b], DocumentClass::ModelAnswer);
        assert_eq!(text, "Q1  5 marks");
    }

    #[test]
    fn test_shuffled_input_yields_identical_output() {
        let segments = vec![
            seg("one", 0, 0, 90, 30),
            seg("two", 120, 2, 90, 30),
            seg("three", 0, 100, 150, 30),
            seg("four", 200, 102, 120, 30),
            seg("five", 0, 200, 120, 30),
        ];
        let expected = reassemble(&segments, DocumentClass::ModelAnswer);

        let mut rotated = segments.clone();
        rotated.rotate_left(2);
        assert_eq!(reassemble(&rotated, DocumentClass::ModelAnswer), expected);

        let mut reversed = segments;
        reversed.reverse();
        assert_eq!(reassemble(&reversed, DocumentClass::ModelAnswer), expected);
    }

    #[test]
    fn test_two_column_question_paper_reads_left_column_first() {
        // Column text lines are staggered, as photographed columns are
        let mut segments = Vec::new();
        for i in 0..10u32 {
            segments.push(seg(&format!("L{}", i), 0, 20 + i * 100, 300, 40));
            segments.push(seg(&format!("R{}", i), 1000, 70 + i * 100, 300, 40));
        }
        let text = reassemble(&segments, DocumentClass::QuestionPaper);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 20);
        for (i, line) in lines.iter().take(10).enumerate() {
            assert_eq!(*line, format!("L{}", i));
        }
        for (i, line) in lines.iter().skip(10).enumerate() {
            assert_eq!(*line, format!("R{}", i));
        }
    }

    #[test]
    fn test_column_detection_ignored_for_model_answers() {
        let mut segments = Vec::new();
        for i in 0..10u32 {
            segments.push(seg(&format!("L{}", i), 0, 20 + i * 100, 300, 40));
            segments.push(seg(&format!("R{}", i), 1000, 70 + i * 100, 300, 40));
        }
        let text = reassemble(&segments, DocumentClass::ModelAnswer);
        // Without column reordering the rows interleave left and right
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "L0");
        assert_eq!(lines[1], "R0");
    }

    #[test]
    fn test_near_column_starts_are_merged() {
        // Start positions jittered within the 50px separation collapse to
        // one column, so no reordering happens
        let mut segments = Vec::new();
        for i in 0..10u32 {
            let jitter = (i % 3) * 15;
            segments.push(seg(&format!("line{}", i), jitter, 20 + i * 100, 300, 40));
        }
        let text = reassemble(&segments, DocumentClass::QuestionPaper);
        assert_eq!(text.lines().count(), 10);
        assert!(text.starts_with("line0"));
    }

    #[test]
    fn test_recovered_segment_appends_note() {
        let mut s = seg("partial answer", 0, 0, 200, 40);
        s.is_recovered = true;
        let text = reassemble(&[s], DocumentClass::StudentHandwritten);
        assert!(text.starts_with("partial answer"));
        assert!(text.ends_with(RECOVERY_NOTE));
    }

    #[test]
    fn test_no_note_without_recovered_segments() {
        let s = seg("clean answer", 0, 0, 200, 40);
        let text = reassemble(&[s], DocumentClass::StudentHandwritten);
        assert!(!text.contains(RECOVERY_NOTE));
    }

    #[test]
    fn test_empty_text_segments_are_dropped() {
        let segments = vec![
            seg("", 0, 0, 100, 30),
            seg("   ", 200, 0, 100, 30),
            seg("kept", 0, 100, 100, 30),
        ];
        assert_eq!(reassemble(&segments, DocumentClass::ModelAnswer), "kept");
    }

    #[test]
    fn test_whitespace_is_normalized_inside_segments() {
        let segments = vec![
            seg("two   words\n\tsplit", 0, 0, 300, 40),
            seg("next line", 0, 100, 180, 40),
        ];
        assert_eq!(
            reassemble(&segments, DocumentClass::ModelAnswer),
            "two words split\nnext line"
        );
    }

    #[test]
    fn test_segment_serde_round_trip() {
        let s = seg("answer", 5, 10, 200, 40);
        let json = serde_json::to_string(&s).expect("segment serializes");
        let back: Segment = serde_json::from_str(&json).expect("segment deserializes");
        assert_eq!(back, s);
    }
}
