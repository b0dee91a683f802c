/*! Parses YARA source code and produces an Abstract Syntax Tree (AST) that
keeps track of the position of every construct in the source code.

This parser is designed for editor tooling, so it never gives up. Malformed
constructs are reported as [`Error`]s and replaced with error nodes, and the
parser resumes at the next section keyword or rule boundary. A single broken
rule doesn't prevent the rest of the file from being analyzed.

```
use yarals_parser::Parser;

let source_file = Parser::new("rule test { condition: true }").build_ast();

assert!(source_file.errors.is_empty());
assert_eq!(source_file.rules[0].identifier.name, "test");
```
 */

use std::fmt::{Display, Formatter};
use std::ops::Range;

pub use errors::Error;
pub use parser::Parser;
pub use tokenizer::{is_keyword, Token, TokenKind, Tokenizer, KEYWORDS};

pub mod ast;

mod errors;
mod parser;
mod tokenizer;

/// Starting and ending positions of some construct inside the source code.
///
/// Positions are byte offsets, the ending position is not included in the
/// span.
#[derive(Default, Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Span {
    start: u32,
    end: u32,
}

impl From<logos::Span> for Span {
    fn from(value: logos::Span) -> Self {
        Self::new(value.start, value.end)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}

impl Span {
    const MAX: usize = u32::MAX as usize;

    /// Creates a new span from its starting and ending offsets.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start: start as u32, end: end as u32 }
    }

    /// Displace the span to the right, incrementing both the starting and
    /// ending positions by the given offset.
    ///
    /// ```
    /// # use yarals_parser::Span;
    /// assert_eq!(Span::new(0, 1).offset(1), Span::new(1, 2))
    /// ```
    pub fn offset(mut self, offset: usize) -> Self {
        self.start = self.start.saturating_add(offset as u32);
        self.end = self.end.saturating_add(offset as u32);
        self
    }

    /// Offset within the source code (in bytes) were the span starts.
    #[inline]
    pub fn start(&self) -> usize {
        self.start as usize
    }

    /// Offset within the source code (in bytes) where the span ends.
    #[inline]
    pub fn end(&self) -> usize {
        self.end as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the span as a range of byte offsets, suitable for slicing
    /// the source code.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Returns a new span that goes from the start of `self` to the end of
    /// `other`.
    ///
    /// ```
    /// # use yarals_parser::Span;
    /// assert_eq!(Span::new(0, 2).combine(&Span::new(5, 8)), Span::new(0, 8))
    /// ```
    pub fn combine(&self, other: &Span) -> Span {
        Span::new(self.start(), other.end().max(self.end()))
    }

    /// Returns true if the given offset is inside the span. The ending
    /// offset counts as inside, so a cursor placed right after the last
    /// character of an identifier still touches the identifier.
    #[inline]
    pub fn touches(&self, offset: usize) -> bool {
        self.start() <= offset && offset <= self.end()
    }

    /// Returns true if `other` is completely contained in `self`.
    #[inline]
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}
