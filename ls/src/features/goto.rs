use async_lsp::lsp_types::{Location, Position, Url};

use crate::errors::RequestError;
use crate::features::location;
use crate::index::{Role, Snapshot};

/// Return the location of the declaration of the symbol at the specified
/// position, if it exists.
///
/// If the position is already on a declaration, the declaration itself is
/// returned. Modules are not declared in the source code, so there's no
/// definition for them.
pub fn go_to_definition(
    snapshot: &Snapshot,
    uri: &Url,
    pos: Position,
) -> Result<Option<Location>, RequestError> {
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

    Ok(snapshot
        .declaration(&resolved.symbol)
        .and_then(|(uri, span)| location(snapshot, &uri, span)))
}
