use std::collections::HashMap;

use async_lsp::lsp_types::{Position, TextEdit, Url, WorkspaceEdit};
use log::debug;
use yarals_parser::{is_keyword, Span};

use crate::errors::{RequestError, ValidationError};
use crate::index::{strip_sigil, Role, Snapshot, Symbol};
use crate::schema::path_to_string;

/// Maximum length of rule identifiers accepted by YARA.
const MAX_IDENT_LEN: usize = 128;

/// Renames all occurrences of a symbol at the given position in the text.
///
/// The edits are computed from a single snapshot. Applying them is up to the
/// client, which receives every edit in a single [`WorkspaceEdit`]. If the
/// new name is equal to the current one the edit is empty.
pub fn rename(
    snapshot: &Snapshot,
    uri: &Url,
    pos: Position,
    new_name: &str,
) -> Result<Option<WorkspaceEdit>, RequestError> {
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

    let symbol = resolved.symbol;

    let edits = match &symbol {
        Symbol::Module { path } => {
            return Err(reject(ValidationError::NotRenameable(
                path_to_string(path),
            )));
        }
        Symbol::Rule { uri, rule } => {
            let current = &snapshot.require(uri)?.rules[*rule].name;
            validate_identifier(new_name, "rule")?;
            if current == new_name {
                return Ok(Some(WorkspaceEdit::new(HashMap::new())));
            }
            if !snapshot.rule_declarations(new_name).is_empty() {
                return Err(reject(ValidationError::RuleExists(
                    new_name.to_string(),
                )));
            }
            snapshot
                .find_references(&symbol, true)
                .into_iter()
                .map(|(uri, span)| (uri, span, new_name.to_string()))
                .collect::<Vec<_>>()
        }
        Symbol::Pattern { uri, rule, pattern } => {
            let rule = &snapshot.require(uri)?.rules[*rule];
            let current = strip_sigil(&rule.patterns[*pattern].name);
            let new_bare = strip_sigil(new_name);
            validate_pattern_name(new_name, new_bare)?;
            if current == new_bare {
                return Ok(Some(WorkspaceEdit::new(HashMap::new())));
            }
            if rule.pattern(new_bare).is_some() {
                return Err(reject(ValidationError::PatternExists(format!(
                    "${new_bare}"
                ))));
            }
            // The sigil of each occurrence is kept, so `#a` becomes `#b`
            // and `@a` becomes `@b`.
            snapshot
                .find_references(&symbol, true)
                .into_iter()
                .map(|(uri, span)| {
                    let span = Span::new(span.start() + 1, span.end());
                    (uri, span, new_bare.to_string())
                })
                .collect()
        }
        Symbol::LoopVar { uri, var } => {
            let current = &snapshot.require(uri)?.loop_vars[*var].name;
            validate_identifier(new_name, "variable")?;
            if current == new_name {
                return Ok(Some(WorkspaceEdit::new(HashMap::new())));
            }
            snapshot
                .find_references(&symbol, true)
                .into_iter()
                .map(|(uri, span)| (uri, span, new_name.to_string()))
                .collect()
        }
    };

    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();

    for (uri, span, new_text) in edits {
        let index = snapshot.require(&uri)?;
        changes
            .entry(uri)
            .or_default()
            .push(TextEdit { range: index.document.range(span), new_text });
    }

    for edits in changes.values_mut() {
        edits.sort_by_key(|edit| (edit.range.start.line, edit.range.start.character));
    }

    Ok(Some(WorkspaceEdit::new(changes)))
}

fn reject(err: ValidationError) -> RequestError {
    debug!("rename rejected: {err}");
    RequestError::Validation(err)
}

/// Checks that the name is a valid identifier for rules and loop
/// variables.
fn validate_identifier(
    name: &str,
    kind: &'static str,
) -> Result<(), RequestError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_IDENT_LEN
        && !is_keyword(name);

    if valid {
        Ok(())
    } else {
        Err(reject(ValidationError::InvalidIdentifier {
            name: name.to_string(),
            kind,
        }))
    }
}

/// Checks that the name is a valid pattern identifier. The name may start
/// with any of the sigils used for referencing patterns (`$`, `#`, `@`,
/// `!`), or have no sigil at all.
fn validate_pattern_name(name: &str, bare: &str) -> Result<(), RequestError> {
    let valid = !bare.is_empty()
        && bare.len() <= MAX_IDENT_LEN
        && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(reject(ValidationError::InvalidIdentifier {
            name: name.to_string(),
            kind: "pattern",
        }))
    }
}
