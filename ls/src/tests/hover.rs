use async_lsp::lsp_types::{HoverContents, MarkupContent, MarkupKind};
use pretty_assertions::assert_eq;

use crate::features::hover::hover;
use crate::tests::{position_of, snapshot, uri};

fn markdown(value: &str) -> HoverContents {
    HoverContents::Markup(MarkupContent {
        kind: MarkupKind::Markdown,
        value: value.to_string(),
    })
}

#[test]
fn pattern_value() {
    let text = "rule A { strings: $a = \"foo\" wide condition: $a }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "$a", 1)),
        Ok(Some(markdown("Pattern value is:\n\n`\"foo\" wide`")))
    );
}

#[test]
fn indexed_references_and_wildcards_have_no_hover() {
    let text =
        "rule A { strings: $ab = \"x\" condition: @ab[1] > 0 and any of ($a*) }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(hover(&s, &uri("a.yar"), position_of(text, "@ab", 0)), Ok(None));
    assert_eq!(hover(&s, &uri("a.yar"), position_of(text, "$a*", 0)), Ok(None));
}

#[test]
fn rule_header_and_metadata() {
    let text = r#"rule A : tag1 {
  meta:
    author = "me"
    version = 2
  condition:
    true
}
rule B { condition: A }"#;
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "A }", 0)),
        Ok(Some(markdown(
            "### rule `A`\n```\nrule A : tag1\n    author = \"me\"\n    version = 2\n```\n"
        )))
    );
}

#[test]
fn module_function_with_overloads() {
    let text = "import \"math\"\nrule A { condition: math.entropy(0, filesize) > 7 }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "entropy", 0)),
        Ok(Some(markdown(
            "### `math.entropy`\n\n*function*\n\n```\n\
             entropy(integer, integer) -> float\n\
             entropy(string) -> float\n```\n\n\
             Entropy of the data in the given range or string."
        )))
    );
}

#[test]
fn module_field() {
    let text = "import \"pe\"\nrule A { condition: pe.number_of_sections > 2 }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "number_of_sections", 0)),
        Ok(Some(markdown("### `pe.number_of_sections`\n\n*integer*")))
    );
}

#[test]
fn unresolved_module_path() {
    let text = "import \"pe\"\nrule A { condition: pe.does_not_exist }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "does_not_exist", 0)),
        Ok(None)
    );
}

#[test]
fn loop_variable_bound_to_module_array() {
    let text = "import \"pe\"\n\
                rule A { condition: for any s in pe.sections : (s.name == \".text\") }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "s.name", 0)),
        Ok(Some(markdown("Loop variable `s`\n\nItem of `pe.sections`: struct")))
    );
}

#[test]
fn loop_variable_over_range() {
    let text = "rule A { condition: for any idx in (1..2) : (idx == 1) }";
    let s = snapshot(&[("a.yar", text)]);

    assert_eq!(
        hover(&s, &uri("a.yar"), position_of(text, "idx", 0)),
        Ok(Some(markdown("Loop variable `idx`")))
    );
}
