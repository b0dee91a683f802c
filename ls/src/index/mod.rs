/*! Symbol index.

Each document is indexed independently into a [`DocumentIndex`], which is
immutable and describes a single version of the document: the rules it
declares, their patterns, the variables introduced by `for` loops, and every
occurrence of an identifier together with the symbol it refers to.

The workspace is represented by a [`Snapshot`], an immutable collection of
document indexes. Snapshots are never modified; publishing a new version of
a document creates a new snapshot that shares the indexes of the remaining
documents, so readers holding the old snapshot are not affected.

References to rules are resolved at query time, because the rule may be
declared in a different document. When more than one rule has the same
name, a declaration in the same document wins; otherwise the declaration
from the document that was registered first is used.
 */

use std::collections::HashMap;
use std::sync::Arc;

use async_lsp::lsp_types::Url;
use yarals_parser::ast::{PatternKind, RuleFlag, RuleFlags};
use yarals_parser::Span;

use crate::documents::document::Document;
use crate::documents::Diagnostic;
use crate::errors::RequestError;
use crate::schema::Segment;

pub(crate) mod builder;

/// A rule declared in a document.
#[derive(Debug, Clone)]
pub struct RuleSymbol {
    pub name: String,
    /// Span of the rule's identifier.
    pub ident_span: Span,
    /// Span of the whole rule.
    pub span: Span,
    pub flags: RuleFlags,
    pub tags: Vec<String>,
    /// Metadata entries as `(key, value)`, with values rendered as they
    /// appear in the source.
    pub metas: Vec<(String, String)>,
    pub patterns: Vec<PatternSymbol>,
}

impl RuleSymbol {
    /// Returns the rule header as it would be written in the source code
    /// (e.g. `private rule foo : bar baz`).
    pub fn header(&self) -> String {
        let mut header = String::new();
        if self.flags.contains(RuleFlag::Private) {
            header.push_str("private ");
        }
        if self.flags.contains(RuleFlag::Global) {
            header.push_str("global ");
        }
        header.push_str("rule ");
        header.push_str(&self.name);
        if !self.tags.is_empty() {
            header.push_str(" : ");
            header.push_str(&self.tags.join(" "));
        }
        header
    }

    /// Returns the index of the pattern with the given name. The sigil is
    /// ignored, so `#a` finds `$a`.
    pub fn pattern(&self, name: &str) -> Option<usize> {
        let bare = strip_sigil(name);
        if bare.is_empty() {
            return None;
        }
        self.patterns.iter().position(|p| strip_sigil(&p.name) == bare)
    }
}

/// A pattern declared in a rule.
#[derive(Debug, Clone)]
pub struct PatternSymbol {
    /// Pattern name, including the `$`.
    pub name: String,
    pub ident_span: Span,
    /// Span of the whole declaration.
    pub span: Span,
    pub kind: PatternKind,
    /// The declared value, including modifiers.
    pub value: String,
}

/// A variable introduced by a `for .. in` expression.
#[derive(Debug, Clone)]
pub struct LoopVarSymbol {
    pub name: String,
    pub ident_span: Span,
    /// The part of the source code where the variable is visible.
    pub scope: Span,
    /// If the loop iterates over a module array or dictionary, the path
    /// of the items the variable is bound to.
    pub binding: Option<Vec<Segment>>,
}

/// What an [`Occurrence`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccurrenceKind {
    RuleDecl,
    RuleRef {
        name: String,
    },
    PatternDecl {
        pattern: usize,
    },
    /// A reference to a pattern in any of its forms (`$a`, `#a`, `@a`,
    /// `!a`). `pattern` is `None` if no pattern with that name exists in
    /// the rule, or if the reference is a wildcard like `$a*`.
    PatternRef {
        pattern: Option<usize>,
        wildcard: bool,
        /// The reference is indexed, like in `@a[2]`.
        indexed: bool,
    },
    LoopVarDecl {
        var: usize,
    },
    LoopVarRef {
        var: usize,
    },
    /// An identifier that is part of a path into a module, `path` goes
    /// from the module to the identifier, both included.
    ModuleRef {
        path: Vec<Segment>,
        /// False if the path doesn't exist in the module schema.
        resolved: bool,
    },
}

/// An identifier found in the source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub span: Span,
    /// Index of the rule where the identifier appears.
    pub rule: usize,
    pub kind: OccurrenceKind,
}

/// Index for a single version of a document.
#[derive(Debug)]
pub struct DocumentIndex {
    pub document: Document,
    /// Position of the document in registration order. Used for breaking
    /// ties between rules with the same name.
    pub order: u64,
    pub rules: Vec<RuleSymbol>,
    pub loop_vars: Vec<LoopVarSymbol>,
    /// Occurrences sorted by starting offset. They never overlap.
    pub occurrences: Vec<Occurrence>,
    /// Parse errors and unresolved pattern references.
    pub diagnostics: Vec<Diagnostic>,
}

impl DocumentIndex {
    /// Parses and indexes a document.
    pub fn new(document: Document, order: u64) -> Self {
        builder::build(document, order)
    }

    pub fn uri(&self) -> &Url {
        &self.document.uri
    }

    /// Returns the occurrence that contains the offset. The end of an
    /// occurrence counts as inside, but if one occurrence ends where
    /// another one starts, the latter wins.
    pub fn occurrence_at(&self, offset: usize) -> Option<&Occurrence> {
        let idx = self
            .occurrences
            .partition_point(|occurrence| occurrence.span.start() <= offset);
        self.occurrences[..idx]
            .iter()
            .rev()
            .take(2)
            .find(|occurrence| occurrence.span.touches(offset))
    }

    /// Returns the first rule declared with the given name.
    pub fn rule(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.name == name)
    }

    /// Returns the rule that contains the given offset.
    pub fn rule_at(&self, offset: usize) -> Option<usize> {
        self.document.rule_at(offset).map(|(i, _)| i)
    }

    /// Returns the loop variables named `name` that are visible at
    /// `offset`, the innermost one first.
    pub fn loop_var_at(&self, name: &str, offset: usize) -> Option<usize> {
        self.loop_vars
            .iter()
            .enumerate()
            .filter(|(_, var)| var.name == name && var.scope.touches(offset))
            .min_by_key(|(_, var)| var.scope.len())
            .map(|(i, _)| i)
    }
}

/// A navigable entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Rule { uri: Url, rule: usize },
    Pattern { uri: Url, rule: usize, pattern: usize },
    LoopVar { uri: Url, var: usize },
    Module { path: Vec<Segment> },
}

/// How the position passed to [`Snapshot::resolve`] relates to the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The position is on the identifier that declares the symbol.
    Declaration,
    /// The position is on an identifier that refers to the symbol.
    Reference,
    /// The position is somewhere inside the symbol's declaration, but not
    /// on its identifier.
    Enclosing,
}

/// Result of [`Snapshot::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub symbol: Symbol,
    pub role: Role,
    /// Span of the occurrence at the position, or the span of the
    /// enclosing declaration.
    pub span: Span,
}

/// An immutable view of every document in the workspace.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    /// Incremented every time a new snapshot is published.
    pub generation: u64,
    documents: HashMap<Url, Arc<DocumentIndex>>,
    /// Declarations of each rule name, sorted by document registration
    /// order and then by source offset.
    rules: HashMap<String, Vec<(Url, usize)>>,
}

impl Snapshot {
    /// Returns a new snapshot where the given document replaces its
    /// previous version, if any.
    pub fn with_document(&self, index: Arc<DocumentIndex>) -> Snapshot {
        self.with_documents([index])
    }

    /// Like [`Snapshot::with_document`], but for multiple documents at once.
    pub fn with_documents<I>(&self, indexes: I) -> Snapshot
    where
        I: IntoIterator<Item = Arc<DocumentIndex>>,
    {
        let mut documents = self.documents.clone();
        for index in indexes {
            documents.insert(index.uri().clone(), index);
        }
        Self::from_documents(self.generation + 1, documents)
    }

    /// Returns a new snapshot without the given document.
    pub fn without_document(&self, uri: &Url) -> Snapshot {
        self.without_documents(|index| index.uri() == uri)
    }

    /// Returns a new snapshot without the documents that match the
    /// predicate.
    pub fn without_documents<P>(&self, predicate: P) -> Snapshot
    where
        P: Fn(&DocumentIndex) -> bool,
    {
        let documents = self
            .documents
            .iter()
            .filter(|(_, index)| !predicate(index))
            .map(|(uri, index)| (uri.clone(), Arc::clone(index)))
            .collect();
        Self::from_documents(self.generation + 1, documents)
    }

    fn from_documents(
        generation: u64,
        documents: HashMap<Url, Arc<DocumentIndex>>,
    ) -> Snapshot {
        let mut rules: HashMap<String, Vec<(u64, Url, usize)>> =
            HashMap::new();

        for index in documents.values() {
            for (i, rule) in index.rules.iter().enumerate() {
                if rule.name.is_empty() {
                    continue;
                }
                rules.entry(rule.name.clone()).or_default().push((
                    index.order,
                    index.uri().clone(),
                    i,
                ));
            }
        }

        let rules = rules
            .into_iter()
            .map(|(name, mut decls)| {
                decls.sort_by_key(|(order, _, i)| (*order, *i));
                let decls =
                    decls.into_iter().map(|(_, uri, i)| (uri, i)).collect();
                (name, decls)
            })
            .collect();

        Snapshot { generation, documents, rules }
    }

    pub fn document(&self, uri: &Url) -> Option<&Arc<DocumentIndex>> {
        self.documents.get(uri)
    }

    /// Like [`Snapshot::document`], but fails if the document is unknown.
    pub fn require(
        &self,
        uri: &Url,
    ) -> Result<&Arc<DocumentIndex>, RequestError> {
        self.document(uri)
            .ok_or_else(|| RequestError::UnknownDocument(uri.clone()))
    }

    /// Returns every document, in registration order.
    pub fn documents(&self) -> Vec<&Arc<DocumentIndex>> {
        let mut documents: Vec<_> = self.documents.values().collect();
        documents.sort_by_key(|index| index.order);
        documents
    }

    /// Returns every declaration of rules with the given name, in the
    /// order used for breaking ties.
    pub fn rule_declarations(&self, name: &str) -> &[(Url, usize)] {
        self.rules.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolves a reference to a rule that appears in document `from`.
    pub fn resolve_rule(&self, from: &Url, name: &str) -> Option<(Url, usize)> {
        let decls = self.rule_declarations(name);
        decls
            .iter()
            .find(|(uri, _)| uri == from)
            .or_else(|| decls.first())
            .cloned()
    }

    /// Returns the symbol at the given offset of a document.
    pub fn resolve(&self, uri: &Url, offset: usize) -> Option<Resolved> {
        let index = self.document(uri)?;

        let Some(occurrence) = index.occurrence_at(offset) else {
            return self.enclosing(index, offset);
        };

        let (symbol, role) = match &occurrence.kind {
            OccurrenceKind::RuleDecl => (
                Symbol::Rule { uri: uri.clone(), rule: occurrence.rule },
                Role::Declaration,
            ),
            OccurrenceKind::RuleRef { name } => {
                let (uri, rule) = self.resolve_rule(uri, name)?;
                (Symbol::Rule { uri, rule }, Role::Reference)
            }
            OccurrenceKind::PatternDecl { pattern } => (
                Symbol::Pattern {
                    uri: uri.clone(),
                    rule: occurrence.rule,
                    pattern: *pattern,
                },
                Role::Declaration,
            ),
            OccurrenceKind::PatternRef {
                pattern: Some(pattern),
                wildcard: false,
                ..
            } => (
                Symbol::Pattern {
                    uri: uri.clone(),
                    rule: occurrence.rule,
                    pattern: *pattern,
                },
                Role::Reference,
            ),
            OccurrenceKind::PatternRef { .. } => return None,
            OccurrenceKind::LoopVarDecl { var } => (
                Symbol::LoopVar { uri: uri.clone(), var: *var },
                Role::Declaration,
            ),
            OccurrenceKind::LoopVarRef { var } => (
                Symbol::LoopVar { uri: uri.clone(), var: *var },
                Role::Reference,
            ),
            OccurrenceKind::ModuleRef { path, .. } => {
                (Symbol::Module { path: path.clone() }, Role::Reference)
            }
        };

        Some(Resolved { symbol, role, span: occurrence.span })
    }

    /// Returns the innermost declaration that contains the offset.
    fn enclosing(
        &self,
        index: &DocumentIndex,
        offset: usize,
    ) -> Option<Resolved> {
        let uri = index.uri().clone();
        let rule_idx = index.rule_at(offset)?;
        let rule = &index.rules[rule_idx];

        if let Some((pattern_idx, pattern)) = rule
            .patterns
            .iter()
            .enumerate()
            .find(|(_, pattern)| pattern.span.touches(offset))
        {
            return Some(Resolved {
                symbol: Symbol::Pattern {
                    uri,
                    rule: rule_idx,
                    pattern: pattern_idx,
                },
                role: Role::Enclosing,
                span: pattern.span,
            });
        }

        Some(Resolved {
            symbol: Symbol::Rule { uri, rule: rule_idx },
            role: Role::Enclosing,
            span: rule.span,
        })
    }

    /// Returns the span of the identifier that declares the symbol.
    /// Modules are not declared in the source code.
    pub fn declaration(&self, symbol: &Symbol) -> Option<(Url, Span)> {
        match symbol {
            Symbol::Rule { uri, rule } => {
                let rule = self.document(uri)?.rules.get(*rule)?;
                Some((uri.clone(), rule.ident_span))
            }
            Symbol::Pattern { uri, rule, pattern } => {
                let rule = self.document(uri)?.rules.get(*rule)?;
                let pattern = rule.patterns.get(*pattern)?;
                Some((uri.clone(), pattern.ident_span))
            }
            Symbol::LoopVar { uri, var } => {
                let var = self.document(uri)?.loop_vars.get(*var)?;
                Some((uri.clone(), var.ident_span))
            }
            Symbol::Module { .. } => None,
        }
    }

    /// Returns the spans of all the identifiers that refer to `symbol`.
    ///
    /// Patterns and loop variables are only visible in the document (and
    /// rule) that declares them, rules and modules can be referenced from
    /// any document.
    pub fn find_references(
        &self,
        symbol: &Symbol,
        include_declaration: bool,
    ) -> Vec<(Url, Span)> {
        let mut result = Vec::new();

        if include_declaration {
            result.extend(self.declaration(symbol));
        }

        match symbol {
            Symbol::Rule { uri: decl_uri, rule } => {
                let Some(name) = self
                    .document(decl_uri)
                    .and_then(|index| index.rules.get(*rule))
                    .map(|rule| rule.name.as_str())
                else {
                    return result;
                };
                for index in self.documents() {
                    let resolves_here = self
                        .resolve_rule(index.uri(), name)
                        .is_some_and(|(u, r)| &u == decl_uri && r == *rule);
                    if !resolves_here {
                        continue;
                    }
                    result.extend(
                        index
                            .occurrences
                            .iter()
                            .filter(|o| matches!(&o.kind, OccurrenceKind::RuleRef { name: n } if n == name))
                            .map(|o| (index.uri().clone(), o.span)),
                    );
                }
            }
            Symbol::Pattern { uri, rule, pattern } => {
                if let Some(index) = self.document(uri) {
                    result.extend(
                        index
                            .occurrences
                            .iter()
                            .filter(|o| {
                                o.rule == *rule
                                    && matches!(
                                        o.kind,
                                        OccurrenceKind::PatternRef {
                                            pattern: Some(p),
                                            wildcard: false,
                                            ..
                                        } if p == *pattern
                                    )
                            })
                            .map(|o| (uri.clone(), o.span)),
                    );
                }
            }
            Symbol::LoopVar { uri, var } => {
                if let Some(index) = self.document(uri) {
                    result.extend(
                        index
                            .occurrences
                            .iter()
                            .filter(|o| o.kind == OccurrenceKind::LoopVarRef { var: *var })
                            .map(|o| (uri.clone(), o.span)),
                    );
                }
            }
            Symbol::Module { path } => {
                for index in self.documents() {
                    result.extend(
                        index
                            .occurrences
                            .iter()
                            .filter(|o| matches!(&o.kind, OccurrenceKind::ModuleRef { path: p, .. } if p == path))
                            .map(|o| (index.uri().clone(), o.span)),
                    );
                }
            }
        }

        result
    }

    /// Returns a diagnostic for every rule in the document whose name was
    /// already used by an earlier declaration.
    pub fn conflicts(&self, uri: &Url) -> Vec<Diagnostic> {
        let Some(index) = self.document(uri) else {
            return Vec::new();
        };

        index
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| !rule.name.is_empty())
            .filter_map(|(i, rule)| {
                let (first_uri, first_rule) =
                    self.rule_declarations(&rule.name).first()?;
                if first_uri == uri && *first_rule == i {
                    return None;
                }
                let location = if first_uri == uri {
                    "in this file".to_string()
                } else {
                    format!("in `{}`", first_uri)
                };
                Some(
                    Diagnostic::error(
                        rule.ident_span,
                        format!(
                            "duplicate rule `{}`, already declared {}",
                            rule.name, location
                        ),
                    )
                    .with_code("duplicate_rule"),
                )
            })
            .collect()
    }
}

/// Removes the sigil (`$`, `#`, `@` or `!`) from a pattern identifier.
pub fn strip_sigil(name: &str) -> &str {
    name.strip_prefix(['$', '#', '@', '!']).unwrap_or(name)
}
