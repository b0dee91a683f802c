use std::sync::Arc;

use async_lsp::lsp_types::{Position, Range};
use pretty_assertions::assert_eq;
use yarals_parser::Span;

use crate::documents::line_index::LineIndex;

#[test]
fn columns_are_utf16_code_units() {
    // The emoji takes four bytes in UTF-8 and two code units in UTF-16.
    let index = LineIndex::new(Arc::from("a😀b\nc"));

    assert_eq!(index.offset_to_position(5), Position::new(0, 3));
    assert_eq!(index.position_to_offset(Position::new(0, 3)), Some(5));
    assert_eq!(index.offset_to_position(7), Position::new(1, 0));
    assert_eq!(index.position_to_offset(Position::new(1, 0)), Some(7));
    assert_eq!(
        index.span_to_range(Span::new(1, 5)),
        Range::new(Position::new(0, 1), Position::new(0, 3))
    );
}

#[test]
fn offsets_inside_a_character_are_rounded_down() {
    let index = LineIndex::new(Arc::from("a😀b"));
    assert_eq!(index.offset_to_position(3), Position::new(0, 1));
}

#[test]
fn columns_past_the_end_of_line_are_clamped() {
    let index = LineIndex::new(Arc::from("abc\ndef"));

    assert_eq!(index.position_to_offset(Position::new(0, 100)), Some(3));
    assert_eq!(index.position_to_offset(Position::new(1, 100)), Some(7));
    assert_eq!(index.position_to_offset(Position::new(2, 0)), None);
}

#[test]
fn lines() {
    let index = LineIndex::new(Arc::from("ab\r\ncd\n"));

    assert_eq!(index.line_count(), 3);
    assert_eq!(index.line_span(0), Some(Span::new(0, 2)));
    assert_eq!(index.line_span(1), Some(Span::new(4, 6)));
    assert_eq!(index.line_span(2), Some(Span::new(7, 7)));
    assert_eq!(index.line_span(3), None);
    assert_eq!(index.line_of(5), 1);
}
