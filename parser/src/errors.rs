use thiserror::Error;

use crate::Span;

/// Error found while parsing YARA source code.
///
/// Errors are never fatal, the parser reports them and keeps going. Each
/// variant carries the span of the offending construct.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("syntax error: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String, span: Span },

    #[error("syntax error: unexpected end of file, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    #[error("unterminated string")]
    UnterminatedString { span: Span },

    #[error("unterminated regular expression")]
    UnterminatedRegexp { span: Span },

    #[error("unbalanced braces, missing `}}`")]
    UnbalancedBraces { span: Span },

    #[error("unknown token `{token}`")]
    UnknownToken { token: String, span: Span },

    #[error("pattern identifiers must start with `$`, found `{ident}`")]
    InvalidPatternIdentifier { ident: String, span: Span },

    #[error("duplicate pattern `{ident}`")]
    DuplicatePattern { ident: String, span: Span, existing: Span },

    #[error("duplicate tag `{tag}`")]
    DuplicateTag { tag: String, span: Span },

    #[error("duplicate `{section}` section")]
    DuplicateSection { section: String, span: Span },

    #[error("duplicate rule modifier `{modifier}`")]
    DuplicateModifier { modifier: String, span: Span },

    #[error("missing `condition` section in rule `{rule}`")]
    MissingCondition { rule: String, span: Span },

    #[error("invalid integer `{literal}`")]
    InvalidInteger { literal: String, span: Span },

    #[error("expression nested too deeply")]
    NestingTooDeep { span: Span },
}

impl Error {
    /// Returns a stable code that identifies the kind of error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnexpectedToken { .. } => "E001",
            Error::UnexpectedEof { .. } => "E002",
            Error::UnterminatedString { .. } => "E003",
            Error::UnterminatedRegexp { .. } => "E004",
            Error::UnbalancedBraces { .. } => "E005",
            Error::UnknownToken { .. } => "E006",
            Error::InvalidPatternIdentifier { .. } => "E007",
            Error::DuplicatePattern { .. } => "E008",
            Error::DuplicateTag { .. } => "E009",
            Error::DuplicateSection { .. } => "E010",
            Error::DuplicateModifier { .. } => "E011",
            Error::MissingCondition { .. } => "E012",
            Error::InvalidInteger { .. } => "E013",
            Error::NestingTooDeep { .. } => "E014",
        }
    }

    /// Returns the span where the error was found.
    pub fn span(&self) -> Span {
        match self {
            Error::UnexpectedToken { span, .. }
            | Error::UnexpectedEof { span, .. }
            | Error::UnterminatedString { span }
            | Error::UnterminatedRegexp { span }
            | Error::UnbalancedBraces { span }
            | Error::UnknownToken { span, .. }
            | Error::InvalidPatternIdentifier { span, .. }
            | Error::DuplicatePattern { span, .. }
            | Error::DuplicateTag { span, .. }
            | Error::DuplicateSection { span, .. }
            | Error::DuplicateModifier { span, .. }
            | Error::MissingCondition { span, .. }
            | Error::InvalidInteger { span, .. }
            | Error::NestingTooDeep { span } => *span,
        }
    }
}
