//! # Reassembly Tests Module
//!
//! Integration tests for segment-to-document reconstruction: ordering,
//! column handling, spacing inference, and the segment wire format.

#[cfg(test)]
mod tests {
    use exam_scan::reassembly::{reassemble, Segment, RECOVERY_NOTE};
    use exam_scan::DocumentClass;

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
    fn test_empty_input_is_empty_output() {
        assert_eq!(reassemble(&[], DocumentClass::QuestionPaper), "");
        assert_eq!(reassemble(&[], DocumentClass::StudentHandwritten), "");
    }

    #[test]
    fn test_single_segment_is_returned_verbatim() {
        let s = seg("Q1. State Ohm's law.\t[2 marks]", 40, 500, 800, 60);
        assert_eq!(
            reassemble(&[s], DocumentClass::QuestionPaper),
            "Q1. State Ohm's law.\t[2 marks]"
        );
    }

    #[test]
    fn test_input_order_never_changes_output() {
        let segments = vec![
            seg("Answer:", 0, 0, 140, 40),
            seg("the cell", 180, 4, 160, 40),
            seg("divides by", 0, 90, 200, 40),
            seg("mitosis", 240, 92, 140, 40),
            seg("into two cells.", 0, 180, 300, 40),
        ];
        let expected = reassemble(&segments, DocumentClass::StudentHandwritten);

        let mut shuffled = segments.clone();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);
        assert_eq!(
            reassemble(&shuffled, DocumentClass::StudentHandwritten),
            expected
        );

        let mut reversed = segments;
        reversed.reverse();
        assert_eq!(
            reassemble(&reversed, DocumentClass::StudentHandwritten),
            expected
        );
    }

    #[test]
    fn test_gap_spacing_rules_around_the_threshold() {
        // Both segments: 5 characters over 100px, so 20px per character.
        // QuestionPaper multiplier 0.6 puts the threshold at 12px.
        let above = vec![
            seg("alpha", 0, 0, 100, 30),
            seg("bravo", 113, 0, 100, 30), // gap of threshold + 1
        ];
        assert_eq!(
            reassemble(&above, DocumentClass::QuestionPaper),
            "alpha bravo"
        );

        let below_alnum = vec![
            seg("alpha", 0, 0, 100, 30),
            seg("bravo", 111, 0, 100, 30), // gap of threshold - 1
        ];
        assert_eq!(
            reassemble(&below_alnum, DocumentClass::QuestionPaper),
            "alpha bravo",
            "alphanumeric boundary still gets one space"
        );

        let below_punct = vec![
            seg("alpha)", 0, 0, 100, 30),
            seg("(beta", 105, 0, 100, 30),
        ];
        assert_eq!(
            reassemble(&below_punct, DocumentClass::QuestionPaper),
            "alpha)(beta",
            "non-alphanumeric boundary with a sub-threshold gap fuses"
        );
    }

    #[test]
    fn test_question_paper_wide_gap_becomes_tab() {
        let segments = vec![
            seg("Section A", 0, 0, 180, 40),
            seg("40 marks", 1500, 0, 160, 40),
        ];
        let text = reassemble(&segments, DocumentClass::QuestionPaper);
        assert_eq!(text, "Section A\t40 marks");

        let text = reassemble(&segments, DocumentClass::ModelAnswer);
        assert_eq!(text, "Section A  40 marks");
    }

    #[test]
    fn test_two_columns_read_left_then_right() {
        let mut segments = Vec::new();
        for i in 0..10u32 {
            segments.push(seg(&format!("left-{}", i), 0, 30 + i * 120, 380, 50));
            segments.push(seg(&format!("right-{}", i), 1000, 90 + i * 120, 380, 50));
        }
        let text = reassemble(&segments, DocumentClass::QuestionPaper);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 20);
        assert!(lines[..10].iter().all(|l| l.starts_with("left-")));
        assert!(lines[10..].iter().all(|l| l.starts_with("right-")));
        // Top-to-bottom inside each column
        assert_eq!(lines[0], "left-0");
        assert_eq!(lines[9], "left-9");
        assert_eq!(lines[10], "right-0");
        assert_eq!(lines[19], "right-9");
    }

    #[test]
    fn test_recovered_segments_add_the_advisory_note() {
        let mut segments = vec![
            seg("The mitochondria is the", 0, 0, 460, 40),
            seg("powerhouse of the cell.", 0, 90, 460, 40),
        ];
        segments[1].is_recovered = true;

        let text = reassemble(&segments, DocumentClass::StudentHandwritten);
        assert!(text.starts_with("The mitochondria is the"));
        assert!(text.ends_with(RECOVERY_NOTE));

        segments[1].is_recovered = false;
        let text = reassemble(&segments, DocumentClass::StudentHandwritten);
        assert!(!text.contains(RECOVERY_NOTE));
    }

    #[test]
    fn test_segment_wire_format_round_trip() {
        // Segments cross the host's recognizer boundary as JSON
        let segments = vec![
            seg("first", 0, 0, 100, 30),
            seg("second", 0, 80, 120, 30),
        ];
        let json = serde_json::to_string(&segments).expect("segments serialize");
        let back: Vec<Segment> = serde_json::from_str(&json).expect("segments deserialize");
        assert_eq!(back, segments);
        assert_eq!(
            reassemble(&back, DocumentClass::ModelAnswer),
            reassemble(&segments, DocumentClass::ModelAnswer)
        );
    }

    #[test]
    fn test_handwriting_rows_group_with_loose_tolerance() {
        // Jittered baselines within the handwriting tolerance stay one row
        let segments = vec![
            seg("my answer", 0, 100, 200, 60),
            seg("continues here", 220, 130, 260, 60),
        ];
        let text = reassemble(&segments, DocumentClass::StudentHandwritten);
        assert_eq!(text.lines().count(), 1);
    }
}
