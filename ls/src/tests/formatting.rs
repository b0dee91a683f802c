use async_lsp::lsp_types::{FormattingOptions, Position, Range, TextEdit};
use pretty_assertions::assert_eq;

use crate::features::formatting::{
    formatting, CanonicalFormatter, FormatError, FormatOptions, Indentation,
    RuleFormatter,
};
use crate::tests::{position_at, snapshot, uri};

fn format(source: &str) -> String {
    CanonicalFormatter
        .format(source, &FormatOptions::default())
        .expect("formatting failed")
}

#[test]
fn canonical_layout() {
    let source = "rule test : tag1 tag2 { meta: author = \"foo\" strings: $a = \"bar\" condition: $a }";

    let expected = r#"rule test : tag1 tag2
{
    meta:
        author = "foo"
    strings:
        $a = "bar"
    condition:
        $a
}
"#;

    assert_eq!(format(source), expected);
}

#[test]
fn formatting_is_idempotent() {
    let source = r#"import "pe"
// first
private   rule a{condition:
  pe.is_dll() and
      pe.number_of_sections > 2}


/* second */
global rule b : x {
strings: $a = "a" // comment
condition: $a }
"#;

    let formatted = format(source);
    assert_eq!(format(&formatted), formatted);
}

#[test]
fn comments_and_blank_lines_between_rules() {
    let source = "// header\nrule a { condition: true }\n\n\n// second\nrule b { condition: false }\n";

    let expected = r#"// header
rule a
{
    condition:
        true
}

// second
rule b
{
    condition:
        false
}
"#;

    assert_eq!(format(source), expected);
}

#[test]
fn relative_indentation_is_kept() {
    let source = "rule a {\n  condition:\n    true and\n      false\n}\n";

    assert_eq!(
        format(source),
        "rule a\n{\n    condition:\n        true and\n          false\n}\n"
    );

    let tabs = FormatOptions {
        indentation: Indentation::Tabs,
        tab_size: 4,
        insert_final_newline: true,
    };

    assert_eq!(
        CanonicalFormatter.format(source, &tabs),
        Ok("rule a\n{\n\tcondition:\n\t\ttrue and\n\t\t  false\n}\n".to_string())
    );
}

#[test]
fn syntax_errors_are_not_formatted() {
    assert!(matches!(
        CanonicalFormatter.format("rule a { condition: }", &FormatOptions::default()),
        Err(FormatError::SyntaxErrors { .. })
    ));
}

#[test]
fn whole_document_edit() {
    let text = "rule a { condition: true }";
    let s = snapshot(&[("a.yar", text)]);
    let options =
        FormattingOptions { tab_size: 4, insert_spaces: true, ..Default::default() };

    assert_eq!(
        formatting(&s, &uri("a.yar"), &options, &CanonicalFormatter),
        Ok(Some(vec![TextEdit {
            range: Range::new(Position::new(0, 0), position_at(text, text.len())),
            new_text: "rule a\n{\n    condition:\n        true\n}".to_string(),
        }]))
    );
}

#[test]
fn no_edit_when_already_formatted_or_invalid() {
    let formatted = "rule a\n{\n    condition:\n        true\n}\n";
    let invalid = "rule a { condition: }";
    let s = snapshot(&[("a.yar", formatted), ("b.yar", invalid)]);
    let options =
        FormattingOptions { tab_size: 4, insert_spaces: true, ..Default::default() };

    assert_eq!(
        formatting(&s, &uri("a.yar"), &options, &CanonicalFormatter),
        Ok(None)
    );
    assert_eq!(
        formatting(&s, &uri("b.yar"), &options, &CanonicalFormatter),
        Ok(None)
    );
}
