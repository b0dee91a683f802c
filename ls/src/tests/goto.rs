use async_lsp::lsp_types::{Location, Position};
use pretty_assertions::assert_eq;

use crate::errors::RequestError;
use crate::features::goto::go_to_definition;
use crate::tests::{position_of, range_of, snapshot, uri};

#[test]
fn definition_on_declaration_returns_itself() {
    let text = "rule A { condition: true }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(text, "A", 0)),
        Ok(Some(Location { uri: uri("a.yar"), range: range_of(text, "A", 0) }))
    );
}

#[test]
fn rule_declared_in_another_document() {
    let a = "rule A { condition: true }";
    let b = "rule B { condition: A }";
    let s = snapshot(&[("a.yar", a), ("b.yar", b)]);

    assert_eq!(
        go_to_definition(&s, &uri("b.yar"), position_of(b, "A", 0)),
        Ok(Some(Location { uri: uri("a.yar"), range: range_of(a, "A", 0) }))
    );
}

#[test]
fn duplicate_rules_prefer_same_document_then_first_registered() {
    let a = "rule A { condition: true }";
    let b = "rule A { condition: true }\nrule D { condition: A }";
    let c = "rule C { condition: A }";
    let s = snapshot(&[("a.yar", a), ("b.yar", b), ("c.yar", c)]);

    // From `c.yar`, the declaration in the first registered document wins.
    assert_eq!(
        go_to_definition(&s, &uri("c.yar"), position_of(c, "A", 0)),
        Ok(Some(Location { uri: uri("a.yar"), range: range_of(a, "A", 0) }))
    );

    // From `b.yar`, the declaration in the same document wins.
    assert_eq!(
        go_to_definition(&s, &uri("b.yar"), position_of(b, "A", 1)),
        Ok(Some(Location { uri: uri("b.yar"), range: range_of(b, "A", 0) }))
    );
}

#[test]
fn pattern_reference_with_any_sigil() {
    let text = "rule A { strings: $a = \"x\" condition: #a > 1 and @a[1] > 0 }";
    let s = snapshot(&[("a.yar", text)]);
    let expected =
        Ok(Some(Location { uri: uri("a.yar"), range: range_of(text, "$a", 0) }));

    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(text, "#a", 0)),
        expected
    );
    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(text, "@a", 0)),
        expected
    );
}

#[test]
fn loop_variable() {
    let text = "rule A { condition: for any idx in (1..2) : (idx == 1) }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(text, "idx", 1)),
        Ok(Some(Location {
            uri: uri("a.yar"),
            range: range_of(text, "idx", 0)
        }))
    );
}

#[test]
fn modules_and_whitespace_have_no_definition() {
    let text = "import \"pe\"\nrule A { condition: pe.is_dll() }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(text, "is_dll", 0)),
        Ok(None)
    );
    assert_eq!(
        go_to_definition(&s, &uri("a.yar"), position_of(text, "{", 0)),
        Ok(None)
    );
}

#[test]
fn unknown_document() {
    let s = snapshot(&[("a.yar", "rule A { condition: true }")]);

    assert_eq!(
        go_to_definition(&s, &uri("missing.yar"), Position::new(0, 0)),
        Err(RequestError::UnknownDocument(uri("missing.yar")))
    );
}
