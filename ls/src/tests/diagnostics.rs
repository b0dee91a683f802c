use async_lsp::lsp_types::{DiagnosticSeverity, Location, NumberOrString};
use pretty_assertions::assert_eq;

use crate::documents::Origin;
use crate::features::diagnostics::{diagnostics, to_lsp};
use crate::features::goto::go_to_definition;
use crate::tests::{position_of, range_of, snapshot, uri};

#[test]
fn valid_rule_has_no_diagnostics() {
    let s = snapshot(&[("a.yar", "rule A { condition: true }")]);
    assert_eq!(diagnostics(&s, &uri("a.yar")), Ok(vec![]));
}

#[test]
fn unknown_pattern() {
    let text = "rule A { strings: $a = \"x\" condition: $b }";
    let s = snapshot(&[("a.yar", text)]);
    let index = s.document(&uri("a.yar")).unwrap();

    let diagnostics = diagnostics(&s, &uri("a.yar")).unwrap();
    assert_eq!(diagnostics.len(), 1);

    let diagnostic = to_lsp(&index.document, &diagnostics[0]);
    assert_eq!(diagnostic.range, range_of(text, "$b", 0));
    assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
    assert_eq!(
        diagnostic.code,
        Some(NumberOrString::String("unknown_pattern".to_string()))
    );
    assert_eq!(diagnostic.source.as_deref(), Some("yarals"));
}

#[test]
fn duplicate_rule_in_second_document() {
    let text = "rule A { condition: true }";
    let s = snapshot(&[("a.yar", text), ("b.yar", text)]);

    assert_eq!(diagnostics(&s, &uri("a.yar")), Ok(vec![]));

    let conflicts = diagnostics(&s, &uri("b.yar")).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].code.as_deref(), Some("duplicate_rule"));
    assert_eq!(
        to_lsp(&s.document(&uri("b.yar")).unwrap().document, &conflicts[0]).range,
        range_of(text, "A", 0)
    );

    // Both declarations can still be navigated independently.
    for name in ["a.yar", "b.yar"] {
        assert_eq!(
            go_to_definition(&s, &uri(name), position_of(text, "A", 0)),
            Ok(Some(Location { uri: uri(name), range: range_of(text, "A", 0) }))
        );
    }
}

#[test]
fn duplicate_rule_in_same_document() {
    let text = "rule A { condition: true }\nrule A { condition: false }";
    let s = snapshot(&[("a.yar", text)]);

    let conflicts = diagnostics(&s, &uri("a.yar")).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(
        conflicts[0].message,
        "duplicate rule `A`, already declared in this file"
    );
    assert_eq!(
        to_lsp(&s.document(&uri("a.yar")).unwrap().document, &conflicts[0]).range,
        range_of(text, "A", 1)
    );
}

#[test]
fn syntax_errors() {
    let s = snapshot(&[("a.yar", "rule A { condition: }")]);
    let diagnostics = diagnostics(&s, &uri("a.yar")).unwrap();

    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|d| d.origin == Origin::Parse));
    assert!(diagnostics
        .iter()
        .all(|d| d.code.as_deref().is_some_and(|code| code.starts_with('E'))));
}

#[test]
fn anonymous_pattern_outside_for_of() {
    let text = "rule A { strings: $ = \"x\" condition: $ and for any of them : ($) }";
    let s = snapshot(&[("a.yar", text)]);
    let diagnostics = diagnostics(&s, &uri("a.yar")).unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "`$` used outside of `for .. of`");
}

#[test]
fn deeply_nested_condition() {
    let text = format!(
        "rule A {{ strings: $a = \"x\" condition: {}$a{} }}\nrule B {{ condition: A }}",
        "(".repeat(100_000),
        ")".repeat(100_000),
    );
    let s = snapshot(&[("a.yar", text.as_str())]);
    let diagnostics = diagnostics(&s, &uri("a.yar")).unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code.as_deref(), Some("E014"));
    assert_eq!(diagnostics[0].message, "expression nested too deeply");

    // The rest of the document is still indexed.
    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(&text, "A", 1)),
        Ok(Some(Location { uri: uri("a.yar"), range: range_of(&text, "A", 0) }))
    );
}
