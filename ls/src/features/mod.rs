/*! Language features: each module answers one kind of request using the
latest snapshot of the symbol index.
 */

use async_lsp::lsp_types::{Location, Url};
use yarals_parser::Span;

use crate::index::Snapshot;

pub mod completion;
pub mod diagnostics;
pub mod document_highlight;
pub mod formatting;
pub mod goto;
pub mod hover;
pub mod references;
pub mod rename;

/// Converts a span in a document into a location.
pub(crate) fn location(
    snapshot: &Snapshot,
    uri: &Url,
    span: Span,
) -> Option<Location> {
    let index = snapshot.document(uri)?;
    Some(Location { uri: uri.clone(), range: index.document.range(span) })
}
