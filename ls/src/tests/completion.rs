use async_lsp::lsp_types::{CompletionItem, InsertTextFormat, Position};
use pretty_assertions::assert_eq;

use crate::features::completion::completion;
use crate::schema::catalog;
use crate::tests::{position_after, snapshot, uri};

fn complete(text: &str, pos: Position) -> Vec<CompletionItem> {
    let s = snapshot(&[("a.yar", text)]);
    completion(&s, &uri("a.yar"), pos)
        .expect("completion failed")
        .expect("no completion items")
}

fn labels(items: &[CompletionItem]) -> Vec<&str> {
    items.iter().map(|item| item.label.as_str()).collect()
}

fn item<'a>(items: &'a [CompletionItem], label: &str) -> &'a CompletionItem {
    items
        .iter()
        .find(|item| item.label == label)
        .unwrap_or_else(|| panic!("no item labeled `{label}`"))
}

#[test]
fn module_members_after_dot() {
    let text = "import \"pe\"\nrule A { condition: pe. }";
    let items = complete(text, position_after(text, "pe.", 0));
    let labels = labels(&items);

    // Functions are offered twice, by name and as a call.
    let pe = catalog().unwrap().module("pe").unwrap();
    let functions = pe.children().filter(|(_, child)| child.is_function()).count();
    assert_eq!(items.len(), pe.children().count() + functions);

    assert!(labels.contains(&"version_info"));
    assert!(labels.contains(&"signatures"));
    assert!(labels.contains(&"number_of_sections"));

    assert!(labels.contains(&"is_dll()"));
    assert!(labels.contains(&"is_dll"));
    assert_eq!(item(&items, "is_dll").insert_text, None);

    let is_dll = item(&items, "is_dll()");
    assert_eq!(is_dll.insert_text.as_deref(), Some("is_dll()"));
    assert_eq!(is_dll.insert_text_format, Some(InsertTextFormat::SNIPPET));
    assert_eq!(is_dll.detail.as_deref(), Some("is_dll() -> bool"));

    assert_eq!(
        item(&items, "number_of_sections").detail.as_deref(),
        Some("integer")
    );
}

#[test]
fn call_snippet_has_a_placeholder_per_argument() {
    let text = "import \"math\"\nrule A { condition: math. }";
    let items = complete(text, position_after(text, "math.", 0));

    assert_eq!(
        item(&items, "entropy()").insert_text.as_deref(),
        Some("entropy(${1:integer}, ${2:integer})")
    );
}

#[test]
fn functions_with_partial_identifier() {
    let text = "import \"pe\"\nrule A { condition: pe.is_d }";
    let items = complete(text, position_after(text, "pe.is_d", 0));
    let labels = labels(&items);

    assert!(labels.contains(&"is_dll"));
    assert!(labels.contains(&"is_dll()"));
}

#[test]
fn functions_followed_by_parenthesis() {
    let text = "import \"pe\"\nrule A { condition: pe.is_d() }";
    let items = complete(text, position_after(text, "pe.is_d", 0));
    let labels = labels(&items);

    assert!(labels.contains(&"is_dll"));
    assert!(!labels.contains(&"is_dll()"));
}

#[test]
fn members_of_array_items() {
    let text =
        "import \"pe\"\nrule A { condition: pe.sections[0].name == \".text\" }";
    let items = complete(text, position_after(text, "pe.sections[0].", 0));
    let labels = labels(&items);

    assert_eq!(items.len(), 11);
    assert!(labels.contains(&"name"));
    assert!(labels.contains(&"virtual_address"));
}

#[test]
fn members_of_loop_variable() {
    let text = "import \"pe\"\n\
                rule A { condition: for any s in pe.sections : (s.name == \".text\") }";
    let items = complete(text, position_after(text, "(s.", 0));
    let labels = labels(&items);

    assert!(labels.contains(&"name"));
    assert!(labels.contains(&"raw_data_size"));
}

#[test]
fn unknown_module_has_no_members() {
    let text = "rule A { condition: foo. }";
    assert_eq!(complete(text, position_after(text, "foo.", 0)), vec![]);
}

#[test]
fn dictionary_keys() {
    let text = "import \"pe\"\n\
                rule A { condition: pe.version_info[\"CompanyName\"] == \"x\" }";

    let items = complete(text, position_after(text, "version_info[", 0));
    assert_eq!(items.len(), 12);
    assert_eq!(
        item(&items, "CompanyName").insert_text.as_deref(),
        Some("\"CompanyName\"")
    );

    // The quote was already typed.
    let items = complete(text, position_after(text, "version_info[\"", 0));
    assert_eq!(items.len(), 12);
    assert_eq!(
        item(&items, "CompanyName").insert_text.as_deref(),
        Some("CompanyName")
    );
}

#[test]
fn top_level_keywords() {
    let items = complete("", Position::new(0, 0));
    assert_eq!(
        labels(&items),
        vec!["rule", "private rule", "global rule", "import", "include"]
    );
}

#[test]
fn module_names_in_import() {
    let text = "import \"";
    let items = complete(text, position_after(text, "import \"", 0));
    assert_eq!(
        labels(&items),
        vec![
            "console", "cuckoo", "dotnet", "elf", "hash", "magic", "math",
            "pe", "string", "time"
        ]
    );
}

#[test]
fn nothing_in_rule_header() {
    let text = "rule A : t { condition: true }";
    assert_eq!(complete(text, position_after(text, "rule A : ", 0)), vec![]);
}

#[test]
fn section_keywords() {
    let text = "rule A {\n  \n  condition:\n    true\n}";
    let items = complete(text, Position::new(1, 2));
    assert_eq!(labels(&items), vec!["meta", "strings", "condition"]);
    assert_eq!(
        item(&items, "strings").insert_text.as_deref(),
        Some("strings:\n\t")
    );
}

#[test]
fn pattern_modifiers() {
    let text = r#"rule A {
  strings:
    $a = "x"
    $h = { 01 02 }
  condition:
    all of them
}"#;

    let items = complete(text, position_after(text, "\"x\"", 0));
    assert_eq!(
        labels(&items),
        vec![
            "ascii",
            "wide",
            "nocase",
            "private",
            "fullword",
            "base64",
            "base64wide",
            "xor"
        ]
    );

    let items = complete(text, position_after(text, "{ 01 02 }", 0));
    assert_eq!(labels(&items), vec!["private"]);
}

#[test]
fn patterns_after_sigil() {
    let text = "rule A { strings: $foo = \"x\" $bar = \"y\" condition: #f > 0 }";
    let items = complete(text, position_after(text, "#f", 0));

    assert_eq!(labels(&items), vec!["foo", "bar"]);
    assert_eq!(item(&items, "foo").detail.as_deref(), Some("#foo"));
}

#[test]
fn condition_suggestions() {
    let other = "rule Other { condition: true }";
    let text = r#"import "pe"
rule A {
  strings:
    $foo = "x"
  condition:
    $foo and for any idx in (1..2) : (idx == 1 and tr)
}"#;
    let s = snapshot(&[("other.yar", other), ("a.yar", text)]);
    let items = completion(&s, &uri("a.yar"), position_after(text, "and tr", 0))
        .unwrap()
        .unwrap();
    let labels = labels(&items);

    assert!(labels.contains(&"Other"));
    assert!(labels.contains(&"$foo"));
    assert!(labels.contains(&"idx"));
    assert!(labels.contains(&"pe"));
    assert!(labels.contains(&"filesize"));
    assert!(labels.contains(&"and"));

    // The rule being edited is not suggested.
    assert!(!labels.contains(&"A"));
}
