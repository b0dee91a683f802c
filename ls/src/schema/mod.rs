/*! Catalog of the modules that can be imported in YARA rules.

The catalog describes the structure exposed by each module (fields, nested
structures, arrays, dictionaries and functions). It is used for hover and
completion only, it is not a type checker. The data lives in `modules.json`,
which is embedded in the binary and versioned together with the crate.
 */

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use itertools::Itertools;
use serde::Deserialize;

use crate::errors::SchemaError;

const MODULES_JSON: &str = include_str!("modules.json");

/// A segment in a path that goes from a module to one of its members.
///
/// `pe.sections[0].name` is represented as `[Field("pe"), Field("sections"),
/// Index, Field("name")]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    /// Indexing of an array or dictionary, the index itself is irrelevant.
    Index,
}

impl Segment {
    pub fn field<N: Into<String>>(name: N) -> Self {
        Segment::Field(name.into())
    }
}

/// Formats a path the way it would appear in YARA source code, with
/// `[]` for indexing.
pub fn path_to_string(path: &[Segment]) -> String {
    let mut result = String::new();
    for segment in path {
        match segment {
            Segment::Field(name) => {
                if !result.is_empty() {
                    result.push('.');
                }
                result.push_str(name);
            }
            Segment::Index => result.push_str("[]"),
        }
    }
    result
}

/// Type of scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Integer,
    Float,
    String,
    Bool,
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarType::Integer => write!(f, "integer"),
            ScalarType::Float => write!(f, "float"),
            ScalarType::String => write!(f, "string"),
            ScalarType::Bool => write!(f, "bool"),
        }
    }
}

/// Parameters and result of a function. Used for display only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Signature {
    pub params: Vec<String>,
    pub result: String,
}

impl Signature {
    /// Returns the signature as `name(type, type) -> result`.
    pub fn render(&self, name: &str) -> String {
        format!("{}({}) -> {}", name, self.params.join(", "), self.result)
    }
}

/// A node in the schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
    /// The root of a module.
    Namespace {
        #[serde(default)]
        doc: Option<String>,
        members: BTreeMap<String, SchemaNode>,
    },
    Scalar {
        #[serde(default)]
        doc: Option<String>,
        #[serde(rename = "type")]
        ty: ScalarType,
    },
    Struct {
        #[serde(default)]
        doc: Option<String>,
        members: BTreeMap<String, SchemaNode>,
    },
    Array {
        #[serde(default)]
        doc: Option<String>,
        items: Box<SchemaNode>,
    },
    /// A string-keyed dictionary. `keys` lists the keys that are commonly
    /// found, for completion purposes.
    Dictionary {
        #[serde(default)]
        doc: Option<String>,
        values: Box<SchemaNode>,
        #[serde(default)]
        keys: Vec<String>,
    },
    Function {
        #[serde(default)]
        doc: Option<String>,
        overloads: Vec<Signature>,
    },
}

impl SchemaNode {
    /// Returns the node reached by following `segment` from this node.
    pub fn child(&self, segment: &Segment) -> Option<&SchemaNode> {
        match (self, segment) {
            (
                SchemaNode::Namespace { members, .. }
                | SchemaNode::Struct { members, .. },
                Segment::Field(name),
            ) => members.get(name),
            (SchemaNode::Array { items, .. }, Segment::Index) => Some(items),
            (SchemaNode::Dictionary { values, .. }, Segment::Index) => {
                Some(values)
            }
            _ => None,
        }
    }

    /// Returns the named members of this node, sorted by name. Only
    /// namespaces and structures have members.
    pub fn children(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        let members = match self {
            SchemaNode::Namespace { members, .. }
            | SchemaNode::Struct { members, .. } => Some(members),
            _ => None,
        };
        members
            .into_iter()
            .flat_map(|m| m.iter().map(|(name, node)| (name.as_str(), node)))
    }

    pub fn doc(&self) -> Option<&str> {
        match self {
            SchemaNode::Namespace { doc, .. }
            | SchemaNode::Scalar { doc, .. }
            | SchemaNode::Struct { doc, .. }
            | SchemaNode::Array { doc, .. }
            | SchemaNode::Dictionary { doc, .. }
            | SchemaNode::Function { doc, .. } => doc.as_deref(),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, SchemaNode::Function { .. })
    }

    /// A short description of the node's type (e.g. `integer`,
    /// `array of struct`, `function`).
    pub fn type_name(&self) -> String {
        match self {
            SchemaNode::Namespace { .. } => "module".to_string(),
            SchemaNode::Scalar { ty, .. } => ty.to_string(),
            SchemaNode::Struct { .. } => "struct".to_string(),
            SchemaNode::Array { items, .. } => {
                format!("array of {}", items.type_name())
            }
            SchemaNode::Dictionary { values, .. } => {
                format!("dictionary of {}", values.type_name())
            }
            SchemaNode::Function { .. } => "function".to_string(),
        }
    }

    /// For functions, returns every overload rendered as
    /// `name(params) -> result`.
    pub fn signatures(&self, name: &str) -> Vec<String> {
        match self {
            SchemaNode::Function { overloads, .. } => overloads
                .iter()
                .map(|signature| signature.render(name))
                .unique()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// The set of known modules.
#[derive(Debug)]
pub struct Catalog {
    modules: BTreeMap<String, SchemaNode>,
}

impl Catalog {
    /// Builds a catalog from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let modules: BTreeMap<String, SchemaNode> = serde_json::from_str(json)
            .map_err(|err| SchemaError(err.to_string()))?;

        if let Some((name, _)) = modules
            .iter()
            .find(|(_, node)| !matches!(node, SchemaNode::Namespace { .. }))
        {
            return Err(SchemaError(format!(
                "module `{name}` is not a namespace"
            )));
        }

        Ok(Self { modules })
    }

    pub fn module(&self, name: &str) -> Option<&SchemaNode> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|name| name.as_str())
    }

    /// Returns the node at the given path. The first segment must be the
    /// name of a module.
    pub fn schema_at(&self, path: &[Segment]) -> Option<&SchemaNode> {
        match self.resolve_prefix(path) {
            Some((node, len)) if len == path.len() => Some(node),
            _ => None,
        }
    }

    /// Follows the path as far as possible and returns the deepest node
    /// reached, together with the number of segments that were resolved.
    pub fn resolve_prefix(
        &self,
        path: &[Segment],
    ) -> Option<(&SchemaNode, usize)> {
        let Some(Segment::Field(module)) = path.first() else {
            return None;
        };
        let mut node = self.module(module)?;
        let mut resolved = 1;
        for segment in &path[1..] {
            match node.child(segment) {
                Some(child) => {
                    node = child;
                    resolved += 1;
                }
                None => break,
            }
        }
        Some((node, resolved))
    }
}

/// Returns the catalog of built-in modules.
///
/// The catalog is parsed the first time this function is called. If the
/// bundled data is malformed every call returns the same error.
pub fn catalog() -> Result<&'static Catalog, SchemaError> {
    static CATALOG: OnceLock<Result<Catalog, SchemaError>> = OnceLock::new();
    CATALOG
        .get_or_init(|| Catalog::from_json(MODULES_JSON))
        .as_ref()
        .map_err(Clone::clone)
}
