use pretty_assertions::assert_eq;

use crate::errors::SchemaError;
use crate::schema::{catalog, path_to_string, Catalog, SchemaNode, Segment};

fn path(segments: &[&str]) -> Vec<Segment> {
    segments
        .iter()
        .map(|s| if *s == "[]" { Segment::Index } else { Segment::field(*s) })
        .collect()
}

#[test]
fn bundled_catalog() {
    let catalog = catalog().expect("bundled schema is malformed");

    assert_eq!(
        catalog.module_names().collect::<Vec<_>>(),
        vec![
            "console", "cuckoo", "dotnet", "elf", "hash", "magic", "math",
            "pe", "string", "time"
        ]
    );
}

#[test]
fn schema_at() {
    let catalog = catalog().unwrap();

    let is_dll = catalog.schema_at(&path(&["pe", "is_dll"])).unwrap();
    assert!(is_dll.is_function());
    assert_eq!(is_dll.signatures("is_dll"), vec!["is_dll() -> bool"]);

    let sections = catalog.schema_at(&path(&["pe", "sections"])).unwrap();
    assert_eq!(sections.type_name(), "array of struct");

    let name = catalog.schema_at(&path(&["pe", "sections", "[]", "name"]));
    assert!(matches!(name, Some(SchemaNode::Scalar { .. })));

    let version_info = catalog.schema_at(&path(&["pe", "version_info"])).unwrap();
    assert_eq!(version_info.type_name(), "dictionary of string");

    assert!(catalog.schema_at(&path(&["pe", "bogus"])).is_none());
    assert!(catalog.schema_at(&path(&["bogus"])).is_none());
    assert!(catalog.schema_at(&[Segment::Index]).is_none());
}

#[test]
fn resolve_prefix_stops_at_first_unknown_segment() {
    let catalog = catalog().unwrap();

    let (node, resolved) = catalog
        .resolve_prefix(&path(&["pe", "sections", "[]", "bogus", "name"]))
        .unwrap();

    assert_eq!(resolved, 3);
    assert!(matches!(node, SchemaNode::Struct { .. }));
    assert_eq!(node.children().count(), 11);
}

#[test]
fn function_overloads() {
    let entropy = catalog().unwrap().schema_at(&path(&["math", "entropy"])).unwrap();

    assert_eq!(
        entropy.signatures("entropy"),
        vec!["entropy(integer, integer) -> float", "entropy(string) -> float"]
    );
    assert_eq!(
        entropy.doc(),
        Some("Entropy of the data in the given range or string.")
    );
}

#[test]
fn paths_as_strings() {
    assert_eq!(
        path_to_string(&path(&["pe", "sections", "[]", "name"])),
        "pe.sections[].name"
    );
    assert_eq!(path_to_string(&path(&["math"])), "math");
}

#[test]
fn malformed_schemas() {
    assert_eq!(
        Catalog::from_json(r#"{"x": {"kind": "scalar", "type": "integer"}}"#)
            .err(),
        Some(SchemaError("module `x` is not a namespace".to_string()))
    );

    assert!(Catalog::from_json(r#"{"x": {"kind": "unknown"}}"#).is_err());
    assert!(Catalog::from_json("not json").is_err());

    let catalog = Catalog::from_json(
        r#"{"x": {"kind": "namespace", "members": {"y": {"kind": "scalar", "type": "bool"}}}}"#,
    )
    .unwrap();

    assert_eq!(
        catalog.schema_at(&path(&["x", "y"])).map(|node| node.type_name()),
        Some("bool".to_string())
    );
}
