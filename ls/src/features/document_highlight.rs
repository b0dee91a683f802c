use async_lsp::lsp_types::{
    DocumentHighlight, DocumentHighlightKind, Position, Url,
};

use crate::errors::RequestError;
use crate::index::{Role, Snapshot};

/// The document highlight request is sent from the client to the server to
/// resolve document highlights for a given text document position. When the
/// specified position is contained in a symbol, the response contains the
/// ranges of all occurrences of that symbol in the document. The declaration
/// is marked as `WRITE`, and references as `READ`.
pub fn document_highlight(
    snapshot: &Snapshot,
    uri: &Url,
    pos: Position,
) -> Result<Option<Vec<DocumentHighlight>>, RequestError> {
    let index = snapshot.require(uri)?;

    let Some(offset) = index.document.offset_at(pos) else {
        return Ok(None);
    };

    let Some(resolved) = snapshot.resolve(uri, offset) else {
        return Ok(None);
    };

    if resolved.role == Role::Enclosing {
        return Ok(None);
    }

    let declaration = snapshot.declaration(&resolved.symbol);

    let mut highlights = Vec::new();

    if let Some((decl_uri, span)) = &declaration {
        if decl_uri == uri {
            highlights.push(DocumentHighlight {
                range: index.document.range(*span),
                kind: Some(DocumentHighlightKind::WRITE),
            });
        }
    }

    highlights.extend(
        snapshot
            .find_references(&resolved.symbol, false)
            .into_iter()
            .filter(|(ref_uri, _)| ref_uri == uri)
            .map(|(_, span)| DocumentHighlight {
                range: index.document.range(span),
                kind: Some(DocumentHighlightKind::READ),
            }),
    );

    Ok(Some(highlights))
}
