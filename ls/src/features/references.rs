use async_lsp::lsp_types::{Location, Position, Url};

use crate::errors::RequestError;
use crate::features::location;
use crate::index::{Role, Snapshot};

/// Finds all references of a symbol at the given position in the text.
///
/// References to rules are searched for in the whole workspace, references
/// to patterns and loop variables only in the rule that declares them.
pub fn find_references(
    snapshot: &Snapshot,
    uri: &Url,
    pos: Position,
    include_declaration: bool,
) -> Result<Option<Vec<Location>>, RequestError> {
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

    Ok(Some(
        snapshot
            .find_references(&resolved.symbol, include_declaration)
            .into_iter()
            .filter_map(|(uri, span)| location(snapshot, &uri, span))
            .collect(),
    ))
}
