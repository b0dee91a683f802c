use async_lsp::lsp_types::{DocumentHighlight, DocumentHighlightKind};
use pretty_assertions::assert_eq;

use crate::features::document_highlight::document_highlight;
use crate::tests::{position_of, range_of, snapshot, uri};

fn highlight(
    text: &str,
    needle: &str,
    nth: usize,
    kind: DocumentHighlightKind,
) -> DocumentHighlight {
    DocumentHighlight { range: range_of(text, needle, nth), kind: Some(kind) }
}

#[test]
fn pattern_declaration_is_write_and_references_are_read() {
    let text = "rule A { strings: $a = \"x\" condition: $a and #a > 0 }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        document_highlight(&s, &uri("a.yar"), position_of(text, "#a", 0)),
        Ok(Some(vec![
            highlight(text, "$a", 0, DocumentHighlightKind::WRITE),
            highlight(text, "$a", 1, DocumentHighlightKind::READ),
            highlight(text, "#a", 0, DocumentHighlightKind::READ),
        ]))
    );
}

#[test]
fn only_occurrences_in_the_current_document() {
    let a = "rule A { condition: true }";
    let b = "rule B { condition: A }\nrule C { condition: A and B }";
    let s = snapshot(&[("a.yar", a), ("b.yar", b)]);

    assert_eq!(
        document_highlight(&s, &uri("b.yar"), position_of(b, "A", 0)),
        Ok(Some(vec![
            highlight(b, "A", 0, DocumentHighlightKind::READ),
            highlight(b, "A", 1, DocumentHighlightKind::READ),
        ]))
    );
}

#[test]
fn nothing_to_highlight_outside_identifiers() {
    let text = "rule A { condition: true }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        document_highlight(&s, &uri("a.yar"), position_of(text, "true", 0)),
        Ok(None)
    );
}
