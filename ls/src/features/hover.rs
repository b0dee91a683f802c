use async_lsp::lsp_types::{
    HoverContents, MarkupContent, MarkupKind, Position, Url,
};

use crate::errors::RequestError;
use crate::index::{
    LoopVarSymbol, OccurrenceKind, PatternSymbol, Role, RuleSymbol, Snapshot,
    Symbol,
};
use crate::schema::{catalog, path_to_string, Segment, SchemaNode};

/// Returns the hover contents for the symbol at the given position.
///
/// Indexed pattern references like `@a[1]` and wildcards like `$a*` don't
/// refer to a single pattern occurrence, so they have no hover.
pub fn hover(
    snapshot: &Snapshot,
    uri: &Url,
    pos: Position,
) -> Result<Option<HoverContents>, RequestError> {
    let index = snapshot.require(uri)?;

    let Some(offset) = index.document.offset_at(pos) else {
        return Ok(None);
    };

    if let Some(OccurrenceKind::PatternRef { indexed: true, .. }) =
        index.occurrence_at(offset).map(|o| &o.kind)
    {
        return Ok(None);
    }

    let Some(resolved) = snapshot.resolve(uri, offset) else {
        return Ok(None);
    };

    if resolved.role == Role::Enclosing {
        return Ok(None);
    }

    let markdown = match &resolved.symbol {
        Symbol::Rule { uri, rule } => {
            rule_markdown(&snapshot.require(uri)?.rules[*rule])
        }
        Symbol::Pattern { uri, rule, pattern } => pattern_markdown(
            &snapshot.require(uri)?.rules[*rule].patterns[*pattern],
        ),
        Symbol::LoopVar { uri, var } => {
            loop_var_markdown(&snapshot.require(uri)?.loop_vars[*var])?
        }
        Symbol::Module { path } => {
            let Some(node) = catalog()?.schema_at(path) else {
                return Ok(None);
            };
            module_markdown(path, node)
        }
    };

    Ok(Some(HoverContents::Markup(MarkupContent {
        kind: MarkupKind::Markdown,
        value: markdown,
    })))
}

/// Markdown for a rule: its header followed by the metadata entries.
fn rule_markdown(rule: &RuleSymbol) -> String {
    let mut markdown = format!("### rule `{}`\n", rule.name);

    markdown.push_str("```\n");
    markdown.push_str(&rule.header());
    markdown.push('\n');

    for (key, value) in &rule.metas {
        markdown.push_str(&format!("    {key} = {value}\n"));
    }

    markdown.push_str("```\n");
    markdown
}

fn pattern_markdown(pattern: &PatternSymbol) -> String {
    format!("Pattern value is:\n\n`{}`", pattern.value)
}

fn loop_var_markdown(var: &LoopVarSymbol) -> Result<String, RequestError> {
    let mut markdown = format!("Loop variable `{}`", var.name);

    if let Some(binding) = &var.binding {
        let node = catalog()?.schema_at(binding);
        if let (Some((_, container)), Some(node)) = (binding.split_last(), node)
        {
            markdown.push_str(&format!(
                "\n\nItem of `{}`: {}",
                path_to_string(container),
                node.type_name()
            ));
        }
    }

    Ok(markdown)
}

/// Markdown for a node in a module schema. Functions show all their
/// overloads.
fn module_markdown(path: &[Segment], node: &SchemaNode) -> String {
    let name = match path.last() {
        Some(Segment::Field(name)) => name.as_str(),
        _ => "",
    };

    let mut markdown = format!(
        "### `{}`\n\n*{}*",
        path_to_string(path),
        node.type_name()
    );

    if node.is_function() {
        markdown.push_str("\n\n```\n");
        for signature in node.signatures(name) {
            markdown.push_str(&signature);
            markdown.push('\n');
        }
        markdown.push_str("```");
    }

    if let Some(doc) = node.doc() {
        markdown.push_str("\n\n");
        markdown.push_str(doc);
    }

    markdown
}
