/*! Context-aware completion.

The context is determined by looking at the text that precedes the cursor
and at the AST of the last successfully indexed version of the document.
Member accesses (`pe.`, `pe.sections[0].`) are completed with the members
of the module schema, other positions with keywords, snippets, rules,
patterns and loop variables.
 */

use async_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionItemLabelDetails,
    Documentation, InsertTextFormat, InsertTextMode, MarkupContent,
    MarkupKind, Position, Url,
};
use itertools::Itertools;
use yarals_parser::ast::{PatternKind, SectionKind};

use crate::errors::RequestError;
use crate::index::{DocumentIndex, Snapshot};
use crate::schema::{catalog, Catalog, SchemaNode, Segment};

/// Modifiers accepted by each kind of pattern.
const PATTERN_MODS: &[(PatternKind, &[&str])] = &[
    (
        PatternKind::Text,
        &[
            "ascii",
            "wide",
            "nocase",
            "private",
            "fullword",
            "base64",
            "base64wide",
            "xor",
        ],
    ),
    (PatternKind::Regexp, &["ascii", "wide", "nocase", "private", "fullword"]),
    (PatternKind::Hex, &["private"]),
];

const RULE_SECTIONS: [SectionKind; 3] =
    [SectionKind::Meta, SectionKind::Strings, SectionKind::Condition];

/// Top-level keywords, with an optional snippet.
const SOURCE_SUGGESTIONS: [(&str, Option<&str>); 5] = [
    ("rule", Some("rule ${1:ident} {\n\tcondition:\n\t\t${2:true}\n}")),
    (
        "private rule",
        Some("private rule ${1:ident} {\n\tcondition:\n\t\t${2:true}\n}"),
    ),
    (
        "global rule",
        Some("global rule ${1:ident} {\n\tcondition:\n\t\t${2:true}\n}"),
    ),
    ("import", Some("import \"${1:}\"")),
    ("include", Some("include \"${1:}\"")),
];

/// Keywords that can appear in conditions, with an optional snippet.
const CONDITION_SUGGESTIONS: [(&str, Option<&str>); 23] = [
    ("and", None),
    ("or", None),
    ("not", None),
    ("all", None),
    ("any", None),
    ("none", None),
    ("of", None),
    ("them", None),
    ("at", Some("at ${1:expression}")),
    ("in", Some("in (${1:start}..${2:end})")),
    ("filesize", None),
    ("entrypoint", None),
    ("true", None),
    ("false", None),
    ("defined", None),
    ("contains", None),
    ("icontains", None),
    ("startswith", None),
    ("endswith", None),
    ("matches", None),
    ("for", Some("for ${1:any} ${2:i} in (${3:iterable}) : ( ${4:expression} )")),
    ("for of", Some("for ${1:any} of ${2:them} : ( ${3:expression} )")),
    ("with", Some("with ${1:declarations} : ( ${2:expression} )")),
];

/// Returns the completion items for the given position.
pub fn completion(
    snapshot: &Snapshot,
    uri: &Url,
    pos: Position,
) -> Result<Option<Vec<CompletionItem>>, RequestError> {
    let index = snapshot.require(uri)?;

    let Some(offset) = index.document.offset_at(pos) else {
        return Ok(None);
    };

    let text = &index.document.text;
    let Some(before) = text.get(..offset) else {
        return Ok(None);
    };

    let catalog = catalog()?;

    if let Some(items) = dictionary_key_suggestions(catalog, index, before) {
        return Ok(Some(items));
    }

    let partial = trailing_identifier(before);
    let before_partial = &before[..before.len() - partial.len()];

    if let Some(before_dot) = before_partial.strip_suffix('.') {
        let next_is_paren = text[offset..].starts_with('(');
        return Ok(Some(
            member_suggestions(catalog, index, before_dot, offset)
                .map(|node| member_items(node, next_is_paren))
                .unwrap_or_default(),
        ));
    }

    let Some((rule_idx, rule)) = index.document.rule_at(offset) else {
        if let Some(line) = before.rsplit('\n').next() {
            if is_import_string(line) {
                return Ok(Some(module_items(catalog.module_names())));
            }
        }
        return Ok(Some(source_file_suggestions()));
    };

    // Inside the rule header there's nothing to complete.
    if rule.lbrace.map_or(true, |lbrace| offset < lbrace.end()) {
        return Ok(Some(vec![]));
    }

    let section = match rule.section_at(offset) {
        Some(section) if offset >= section.keyword.end() => section,
        _ => return Ok(Some(rule_suggestions())),
    };

    let items = match section.kind {
        SectionKind::Meta => vec![],
        SectionKind::Strings => {
            let line = before.rsplit('\n').next().unwrap_or_default();
            if line.contains('=') {
                let kind = rule
                    .patterns
                    .iter()
                    .rev()
                    .find(|pattern| pattern.span.start() <= offset)
                    .map_or(PatternKind::Text, |pattern| pattern.kind);
                pattern_modifier_suggestions(kind)
            } else {
                vec![]
            }
        }
        SectionKind::Condition => {
            let sigil = before_partial.chars().last().filter(|c| {
                matches!(c, '$' | '#' | '@' | '!')
            });
            match sigil {
                Some(sigil) => pattern_items(index, rule_idx, sigil),
                None => condition_suggestions(
                    snapshot, index, rule_idx, offset,
                ),
            }
        }
    };

    Ok(Some(items))
}

/// Returns the identifier characters at the end of `text`.
fn trailing_identifier(text: &str) -> &str {
    let start = text
        .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .map_or(0, |i| i + 1);
    &text[start..]
}

/// Parses the dotted path that ends at the end of `text`, like
/// `pe.sections[0]` or `math`. Indexing expressions are not parsed, they
/// just become [`Segment::Index`].
fn path_before(text: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut end = text.len();

    loop {
        while text[..end].ends_with(']') {
            let mut depth = 0;
            let open = text[..end].char_indices().rev().find_map(|(i, c)| {
                match c {
                    ']' => depth += 1,
                    '[' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    _ => {}
                }
                None
            })?;
            segments.push(Segment::Index);
            end = open;
        }

        let ident = trailing_identifier(&text[..end]);
        if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit())
        {
            return None;
        }
        end -= ident.len();
        segments.push(Segment::field(ident));

        match text[..end].strip_suffix('.') {
            Some(rest) => end = rest.len(),
            None => break,
        }
    }

    // Pattern identifiers (`$a`, `#a`) don't have members.
    if text[..end].ends_with(['$', '#', '@', '!']) {
        return None;
    }

    segments.reverse();
    Some(segments)
}

/// Returns the path that starts at a module, replacing a loop variable at
/// the root of the path with the items it iterates over.
fn module_path(
    catalog: &Catalog,
    index: &DocumentIndex,
    mut path: Vec<Segment>,
    offset: usize,
) -> Option<Vec<Segment>> {
    let Some(Segment::Field(root)) = path.first() else {
        return None;
    };

    if let Some(var) = index.loop_var_at(root, offset) {
        let mut bound = index.loop_vars[var].binding.clone()?;
        bound.extend(path.drain(1..));
        return Some(bound);
    }

    catalog.module(root).map(|_| path)
}

/// Returns the schema node whose members are completed after the dot. If
/// only a prefix of the path exists in the schema, the deepest node that
/// was reached is used.
fn member_suggestions<'a>(
    catalog: &'a Catalog,
    index: &DocumentIndex,
    before_dot: &str,
    offset: usize,
) -> Option<&'a SchemaNode> {
    let path = path_before(before_dot)?;
    let path = module_path(catalog, index, path, offset)?;
    catalog.resolve_prefix(&path).map(|(node, _)| node)
}

fn member_items(node: &SchemaNode, next_is_paren: bool) -> Vec<CompletionItem> {
    let mut result = Vec::new();

    for (name, child) in node.children() {
        let documentation = child.doc().map(|doc| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: doc.to_string(),
            })
        });

        if !child.is_function() {
            result.push(CompletionItem {
                label: name.to_string(),
                kind: Some(match child {
                    SchemaNode::Struct { .. } => CompletionItemKind::STRUCT,
                    SchemaNode::Namespace { .. } => CompletionItemKind::MODULE,
                    _ => CompletionItemKind::FIELD,
                }),
                detail: Some(child.type_name()),
                documentation,
                ..Default::default()
            });
            continue;
        }

        let detail = Some(child.signatures(name).join("\n"));

        // Functions are offered by name, and also as a call unless the
        // arguments are already there.
        result.push(CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::FUNCTION),
            detail: detail.clone(),
            documentation: documentation.clone(),
            ..Default::default()
        });

        if !next_is_paren {
            result.push(CompletionItem {
                label: format!("{name}()"),
                kind: Some(CompletionItemKind::FUNCTION),
                detail,
                documentation,
                insert_text: Some(call_snippet(name, child)),
                insert_text_format: Some(InsertTextFormat::SNIPPET),
                ..Default::default()
            });
        }
    }

    result
}

/// Returns a snippet for calling a function, with a placeholder for each
/// argument of its first overload.
fn call_snippet(name: &str, node: &SchemaNode) -> String {
    let params = match node {
        SchemaNode::Function { overloads, .. } => overloads
            .first()
            .map(|signature| {
                signature
                    .params
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| format!("${{{}:{}}}", i + 1, ty))
                    .join(", ")
            })
            .unwrap_or_default(),
        _ => String::new(),
    };
    format!("{name}({params})")
}

/// Suggests keys after `dict[` and `dict["`, when `dict` is a dictionary
/// in a module schema.
fn dictionary_key_suggestions(
    catalog: &Catalog,
    index: &DocumentIndex,
    before: &str,
) -> Option<Vec<CompletionItem>> {
    let open = before.rfind('[')?;
    let inside = &before[open + 1..];

    let quoted = match inside.strip_prefix('"') {
        Some(key) if !key.contains(['"', ']']) => true,
        None if inside.is_empty() => false,
        _ => return None,
    };

    let path = path_before(&before[..open])?;
    let path = module_path(catalog, index, path, before.len())?;

    let SchemaNode::Dictionary { keys, .. } = catalog.schema_at(&path)? else {
        return None;
    };

    Some(
        keys.iter()
            .map(|key| CompletionItem {
                label: key.clone(),
                kind: Some(CompletionItemKind::VALUE),
                insert_text: Some(if quoted {
                    key.clone()
                } else {
                    format!("\"{key}\"")
                }),
                ..Default::default()
            })
            .collect(),
    )
}

/// Checks whether the line ends inside the string of an import statement.
fn is_import_string(line: &str) -> bool {
    match line.rsplit_once('"') {
        Some((head, _)) => head.trim().ends_with("import") && !head.contains('"'),
        None => false,
    }
}

fn module_items<'a, I>(names: I) -> Vec<CompletionItem>
where
    I: Iterator<Item = &'a str>,
{
    names
        .map(|name| CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::MODULE),
            ..Default::default()
        })
        .collect()
}

/// Collects completion suggestions outside any rule.
fn source_file_suggestions() -> Vec<CompletionItem> {
    SOURCE_SUGGESTIONS
        .iter()
        .map(|(label, insert_text)| CompletionItem {
            label: label.to_string(),
            kind: if insert_text.is_none() {
                Some(CompletionItemKind::KEYWORD)
            } else {
                Some(CompletionItemKind::SNIPPET)
            },
            insert_text_mode: insert_text
                .map(|_| InsertTextMode::ADJUST_INDENTATION),
            insert_text_format: insert_text.map(|_| InsertTextFormat::SNIPPET),
            insert_text: insert_text
                .map(|insert_text| insert_text.to_string()),
            ..Default::default()
        })
        .collect()
}

/// Collects completion suggestions for the sections of a rule.
fn rule_suggestions() -> Vec<CompletionItem> {
    RULE_SECTIONS
        .iter()
        .map(|section| {
            let kw = section.keyword();
            CompletionItem {
                label: kw.to_string(),
                label_details: Some(CompletionItemLabelDetails {
                    description: Some(format!("Section {kw}")),
                    ..Default::default()
                }),
                kind: Some(CompletionItemKind::KEYWORD),
                insert_text_mode: Some(InsertTextMode::ADJUST_INDENTATION),
                insert_text: Some(format!("{kw}:\n\t")),
                ..Default::default()
            }
        })
        .collect()
}

fn pattern_modifier_suggestions(kind: PatternKind) -> Vec<CompletionItem> {
    PATTERN_MODS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, modifiers)| {
            modifiers
                .iter()
                .map(|modifier| CompletionItem {
                    label: modifier.to_string(),
                    kind: Some(CompletionItemKind::KEYWORD),
                    ..Default::default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Patterns declared by the rule, without sigil because the sigil was
/// already typed.
fn pattern_items(
    index: &DocumentIndex,
    rule_idx: usize,
    sigil: char,
) -> Vec<CompletionItem> {
    let Some(rule) = index.rules.get(rule_idx) else {
        return vec![];
    };

    rule.patterns
        .iter()
        .filter(|pattern| pattern.name.len() > 1)
        .map(|pattern| CompletionItem {
            label: pattern.name[1..].to_string(),
            label_details: Some(CompletionItemLabelDetails {
                description: Some("Pattern".to_string()),
                ..Default::default()
            }),
            kind: Some(CompletionItemKind::VARIABLE),
            detail: Some(format!("{sigil}{}", &pattern.name[1..])),
            ..Default::default()
        })
        .collect()
}

/// Collects completion suggestions for a condition: rules, patterns and
/// loop variables in scope, imported modules and keywords.
fn condition_suggestions(
    snapshot: &Snapshot,
    index: &DocumentIndex,
    rule_idx: usize,
    offset: usize,
) -> Vec<CompletionItem> {
    let mut result = Vec::new();

    let current = index.rules.get(rule_idx).map(|rule| rule.name.as_str());

    let rule_names = snapshot
        .documents()
        .into_iter()
        .flat_map(|index| index.rules.iter().map(|rule| rule.name.clone()))
        .filter(|name| !name.is_empty() && Some(name.as_str()) != current)
        .unique();

    for name in rule_names {
        result.push(CompletionItem {
            label: name,
            label_details: Some(CompletionItemLabelDetails {
                description: Some("Rule".to_string()),
                ..Default::default()
            }),
            kind: Some(CompletionItemKind::VARIABLE),
            ..Default::default()
        });
    }

    if let Some(rule) = index.rules.get(rule_idx) {
        for pattern in rule.patterns.iter().filter(|p| p.name.len() > 1) {
            result.push(CompletionItem {
                label: pattern.name.clone(),
                label_details: Some(CompletionItemLabelDetails {
                    description: Some("Pattern".to_string()),
                    ..Default::default()
                }),
                kind: Some(CompletionItemKind::VARIABLE),
                ..Default::default()
            });
        }
    }

    for var in index.loop_vars.iter().filter(|var| var.scope.touches(offset))
    {
        result.push(CompletionItem {
            label: var.name.clone(),
            label_details: Some(CompletionItemLabelDetails {
                description: Some("Variable".to_string()),
                ..Default::default()
            }),
            kind: Some(CompletionItemKind::VARIABLE),
            ..Default::default()
        });
    }

    result.extend(module_items(
        index
            .document
            .ast
            .imports
            .iter()
            .map(|import| import.module_name.as_str())
            .unique(),
    ));

    result.extend(CONDITION_SUGGESTIONS.iter().map(|(kw, insert)| {
        CompletionItem {
            label: kw.to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            insert_text_format: insert.map(|_| InsertTextFormat::SNIPPET),
            insert_text: insert.map(|insert_text| insert_text.to_string()),
            ..Default::default()
        }
    }));

    result
}
