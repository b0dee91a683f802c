/*! Documents and the diagnostics attached to them. */

use std::path::Path;

use async_lsp::lsp_types::Url;
use walkdir::WalkDir;
use yarals_parser::Span;

pub mod document;
pub mod line_index;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

/// Where a [`Diagnostic`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Found by the parser or while building the symbol index.
    Parse,
    /// Reported by the external rule compiler.
    Compile,
}

/// A problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub origin: Origin,
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn error<M: Into<String>>(span: Span, message: M) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
            origin: Origin::Parse,
            code: None,
        }
    }

    pub fn with_code<C: Into<String>>(mut self, code: C) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Returns true if the path has one of the extensions used by YARA files.
pub fn is_yara_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        ext.to_str().is_some_and(|ext| matches!(ext, "yar" | "yara"))
    })
}

/// Recursively traverse all YARA files in the given folder using
/// [`walkdir::WalkDir`].
pub fn walk_workspace(root: &Path) -> impl Iterator<Item = Url> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_yara_file(entry.path()))
        .filter_map(|entry| Url::from_file_path(entry.into_path()).ok())
}
