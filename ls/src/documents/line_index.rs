use std::sync::Arc;

use async_lsp::lsp_types::{Position, Range};
use yarals_parser::Span;

/// A utility for converting between byte offsets and line/column numbers.
///
/// Positions in the Language Server Protocol are zero-based line numbers
/// and columns measured in UTF-16 code units, while the parser works with
/// byte offsets. This type converts between both representations.
#[derive(Debug, Clone)]
pub struct LineIndex {
    text: Arc<str>,
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Creates a new `LineIndex` for the given text.
    ///
    /// This function pre-calculates the starting byte offset for each line,
    /// which allows for efficient conversion between byte offsets and
    /// line/column numbers.
    pub fn new(text: Arc<str>) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    /// Number of lines in the text. A trailing newline starts a new, empty
    /// line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a byte `offset` in the text to an LSP `Position` (line and
    /// UTF-16 character).
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = self.floor_char_boundary(offset);
        let line = self.line_starts.partition_point(|&i| i <= offset) - 1;
        let start_of_line = self.line_starts[line];
        let character =
            self.text[start_of_line..offset].encode_utf16().count();
        Position::new(line as u32, character as u32)
    }

    /// Converts an LSP `Position` to a byte offset.
    ///
    /// Columns beyond the end of the line are clamped to the end of the
    /// line. Returns `None` if the line doesn't exist.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = self.line_span(position.line as usize)?;
        let mut remaining = position.character as usize;
        for (i, c) in self.text[line.range()].char_indices() {
            if remaining == 0 {
                return Some(line.start() + i);
            }
            remaining = remaining.saturating_sub(c.len_utf16());
        }
        Some(line.end())
    }

    /// Converts a `Span` (byte range) in the text to an LSP `Range`.
    pub fn span_to_range(&self, span: Span) -> Range {
        Range {
            start: self.offset_to_position(span.start()),
            end: self.offset_to_position(span.end()),
        }
    }

    /// Returns the span of the given line, without the line terminator.
    pub fn line_span(&self, line: usize) -> Option<Span> {
        let start = *self.line_starts.get(line)?;
        let mut end = match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.text.len(),
        };
        if self.text[start..end].ends_with('\r') {
            end -= 1;
        }
        Some(Span::new(start, end))
    }

    /// Returns the line that contains the given offset.
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&i| i <= offset) - 1
    }

    fn floor_char_boundary(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}
