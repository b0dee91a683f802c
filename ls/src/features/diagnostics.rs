use async_lsp::lsp_types::{DiagnosticSeverity, NumberOrString, Url};

use crate::documents::document::Document;
use crate::documents::{Diagnostic, Origin, Severity};
use crate::errors::RequestError;
use crate::index::Snapshot;

/// Converts a diagnostic into its LSP representation.
pub fn to_lsp(
    document: &Document,
    diagnostic: &Diagnostic,
) -> async_lsp::lsp_types::Diagnostic {
    async_lsp::lsp_types::Diagnostic {
        range: document.range(diagnostic.span),
        severity: Some(match diagnostic.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
            Severity::Information => DiagnosticSeverity::INFORMATION,
        }),
        code: diagnostic.code.clone().map(NumberOrString::String),
        source: Some(
            match diagnostic.origin {
                Origin::Parse => "yarals",
                Origin::Compile => "compiler",
            }
            .to_string(),
        ),
        message: diagnostic.message.clone(),
        ..Default::default()
    }
}

/// Returns the diagnostics that can be computed without the compiler: syntax
/// errors, unknown patterns and duplicate rules.
pub fn diagnostics(
    snapshot: &Snapshot,
    uri: &Url,
) -> Result<Vec<Diagnostic>, RequestError> {
    let index = snapshot.require(uri)?;
    let mut diagnostics = index.diagnostics.clone();
    diagnostics.extend(snapshot.conflicts(uri));
    diagnostics.sort_by_key(|diagnostic| diagnostic.span);
    Ok(diagnostics)
}
