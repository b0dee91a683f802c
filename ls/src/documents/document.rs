use std::sync::Arc;

use async_lsp::lsp_types::{Position, Range, Url};
use yarals_parser::ast::{Rule, SourceFile};
use yarals_parser::{Parser, Span};

use crate::documents::line_index::LineIndex;
use crate::documents::{Diagnostic, Origin, Severity};

/// A YARA source file known by the server, either open in the editor or
/// read from the workspace folder.
///
/// Documents are immutable. Every edit produces a new `Document` that
/// replaces the previous one.
#[derive(Debug)]
pub struct Document {
    /// Document URI.
    pub uri: Url,
    /// Version reported by the editor. Documents read from disk don't have
    /// a version.
    pub version: Option<i32>,
    /// The full text of the document.
    pub text: Arc<str>,
    /// The Abstract Syntax Tree (AST) for the document.
    pub ast: SourceFile,
    /// A helper for converting between byte offsets and line/column numbers.
    pub line_index: LineIndex,
}

impl Document {
    /// Parses the text and creates a new document.
    pub fn parse<T: Into<Arc<str>>>(
        uri: Url,
        version: Option<i32>,
        text: T,
    ) -> Self {
        let text = text.into();
        let ast = Parser::new(&text).build_ast();
        let line_index = LineIndex::new(Arc::clone(&text));
        Self { uri, version, text, ast, line_index }
    }

    /// Returns the errors found while parsing the document, as diagnostics.
    pub fn parse_diagnostics(&self) -> impl Iterator<Item = Diagnostic> + '_ {
        self.ast.errors.iter().map(|err| Diagnostic {
            severity: Severity::Error,
            message: err.to_string(),
            span: err.span(),
            origin: Origin::Parse,
            code: Some(err.code().to_string()),
        })
    }

    /// Converts a position to a byte offset in the text.
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        self.line_index.position_to_offset(position)
    }

    pub fn range(&self, span: Span) -> Range {
        self.line_index.span_to_range(span)
    }

    pub fn text_at(&self, span: Span) -> &str {
        self.text.get(span.range()).unwrap_or_default()
    }

    /// Returns the rule that encloses the given offset.
    ///
    /// A rule without a closing brace extends up to the next rule, so the
    /// text that is being typed at the end of an unfinished rule still
    /// belongs to it.
    pub fn rule_at(&self, offset: usize) -> Option<(usize, &Rule)> {
        let rules = &self.ast.rules;
        rules.iter().enumerate().find(|(i, rule)| {
            let end = match rule.rbrace {
                Some(rbrace) => rbrace.end(),
                None => rules
                    .get(i + 1)
                    .map(|next| next.span.start())
                    .unwrap_or(self.text.len()),
            };
            rule.span.start() <= offset && offset <= end
        })
    }
}
