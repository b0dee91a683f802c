use log::error;
use yarals_parser::ast::{
    Expr, ForIn, Ident, Iterable, MatchAnchor, OfItems, PatternSet,
    Quantifier, Range, Rule,
};
use yarals_parser::Span;

use crate::documents::document::Document;
use crate::documents::Diagnostic;
use crate::index::{
    strip_sigil, DocumentIndex, LoopVarSymbol, Occurrence, OccurrenceKind,
    PatternSymbol, RuleSymbol,
};
use crate::schema::{catalog, Catalog, Segment};

/// Builds the index for a document.
pub(crate) fn build(document: Document, order: u64) -> DocumentIndex {
    let catalog = match catalog() {
        Ok(catalog) => Some(catalog),
        Err(err) => {
            error!("{err}");
            None
        }
    };

    let mut builder = Builder {
        document: &document,
        catalog,
        rules: Vec::new(),
        loop_vars: Vec::new(),
        occurrences: Vec::new(),
        diagnostics: document.parse_diagnostics().collect(),
        scopes: Vec::new(),
        for_of_depth: 0,
    };

    for (i, rule) in document.ast.rules.iter().enumerate() {
        builder.rule(i, rule);
    }

    let Builder { rules, loop_vars, mut occurrences, mut diagnostics, .. } =
        builder;

    occurrences.sort_by_key(|occurrence| occurrence.span);
    diagnostics.sort_by_key(|diagnostic| diagnostic.span);

    DocumentIndex {
        document,
        order,
        rules,
        loop_vars,
        occurrences,
        diagnostics,
    }
}

/// Each of the postfix operations that can follow an identifier in
/// expressions like `pe.sections[0].name` or `math.entropy(0, 10)`.
enum Link<'a> {
    Field(&'a Ident),
    Index(&'a Expr),
    Call(&'a [Expr]),
}

/// Splits a chain of field accesses, lookups and function calls into its
/// root expression and the list of links that follow it.
fn flatten<'a>(expr: &'a Expr, links: &mut Vec<Link<'a>>) -> &'a Expr {
    match expr {
        Expr::FieldAccess(f) => {
            let root = flatten(&f.object, links);
            links.push(Link::Field(&f.field));
            root
        }
        Expr::Lookup(l) => {
            let root = flatten(&l.primary, links);
            links.push(Link::Index(&l.index));
            root
        }
        Expr::FuncCall(c) => {
            let root = flatten(&c.callee, links);
            links.push(Link::Call(&c.args));
            root
        }
        other => other,
    }
}

struct Builder<'a> {
    document: &'a Document,
    catalog: Option<&'static Catalog>,
    rules: Vec<RuleSymbol>,
    loop_vars: Vec<LoopVarSymbol>,
    occurrences: Vec<Occurrence>,
    diagnostics: Vec<Diagnostic>,
    /// Loop variables visible at the current point, innermost last.
    scopes: Vec<usize>,
    /// Number of `for .. of` expressions that enclose the current point.
    for_of_depth: usize,
}

impl<'a> Builder<'a> {
    fn rule(&mut self, idx: usize, rule: &'a Rule) {
        let patterns = rule
            .patterns
            .iter()
            .map(|pattern| PatternSymbol {
                name: pattern.identifier.name.clone(),
                ident_span: pattern.identifier.span,
                span: pattern.span,
                kind: pattern.kind,
                value: self
                    .document
                    .text_at(Span::new(pattern.value.start(), pattern.span.end()))
                    .trim()
                    .to_string(),
            })
            .collect::<Vec<_>>();

        self.rules.push(RuleSymbol {
            name: rule.identifier.name.clone(),
            ident_span: rule.identifier.span,
            span: rule.span,
            flags: rule.flags,
            tags: rule.tags.iter().map(|tag| tag.name.clone()).collect(),
            metas: rule
                .meta
                .iter()
                .map(|m| (m.identifier.name.clone(), m.value.to_string()))
                .collect(),
            patterns,
        });

        if !rule.identifier.name.is_empty() {
            self.occurrence(idx, rule.identifier.span, OccurrenceKind::RuleDecl);
        }

        for (i, pattern) in rule.patterns.iter().enumerate() {
            // Anonymous patterns can't be referenced.
            if strip_sigil(&pattern.identifier.name).is_empty() {
                continue;
            }
            self.occurrence(
                idx,
                pattern.identifier.span,
                OccurrenceKind::PatternDecl { pattern: i },
            );
        }

        if let Some(condition) = &rule.condition {
            self.scopes.clear();
            self.for_of_depth = 0;
            self.expr(idx, condition);
        }
    }

    fn occurrence(&mut self, rule: usize, span: Span, kind: OccurrenceKind) {
        self.occurrences.push(Occurrence { span, rule, kind });
    }

    fn expr(&mut self, rule: usize, expr: &'a Expr) {
        match expr {
            Expr::True { .. }
            | Expr::False { .. }
            | Expr::Filesize { .. }
            | Expr::Entrypoint { .. }
            | Expr::LiteralString { .. }
            | Expr::LiteralInteger { .. }
            | Expr::LiteralFloat { .. }
            | Expr::Regexp { .. }
            | Expr::RuleWildcard(_)
            | Expr::Error { .. } => {}

            Expr::Ident(_)
            | Expr::FieldAccess(_)
            | Expr::Lookup(_)
            | Expr::FuncCall(_) => self.chain(rule, expr),

            Expr::PatternMatch(m) => {
                self.pattern_ref(rule, &m.identifier, false);
                match &m.anchor {
                    Some(MatchAnchor::At(expr)) => self.expr(rule, expr),
                    Some(MatchAnchor::In(range)) => self.range(rule, range),
                    None => {}
                }
            }
            Expr::PatternCount(p) => {
                self.pattern_ref(rule, &p.identifier, false);
                if let Some(range) = &p.range {
                    self.range(rule, range);
                }
            }
            Expr::PatternOffset(p) | Expr::PatternLength(p) => {
                self.pattern_ref(rule, &p.identifier, p.index.is_some());
                if let Some(index) = &p.index {
                    self.expr(rule, index);
                }
            }

            Expr::Unary(u) => self.expr(rule, &u.operand),
            Expr::Binary(b) => {
                for operand in &b.operands {
                    self.expr(rule, operand);
                }
            }
            Expr::Group { expr, .. } => self.expr(rule, expr),

            Expr::Of(of) => {
                self.quantifier(rule, &of.quantifier);
                match &of.items {
                    OfItems::PatternSet(set) => self.pattern_set(rule, set),
                    OfItems::ExprTuple(items) => {
                        for item in items {
                            self.expr(rule, item);
                        }
                    }
                }
                match &of.anchor {
                    Some(MatchAnchor::At(expr)) => self.expr(rule, expr),
                    Some(MatchAnchor::In(range)) => self.range(rule, range),
                    None => {}
                }
            }
            Expr::ForOf(f) => {
                self.quantifier(rule, &f.quantifier);
                self.pattern_set(rule, &f.pattern_set);
                self.for_of_depth += 1;
                self.expr(rule, &f.condition);
                self.for_of_depth -= 1;
            }
            Expr::ForIn(f) => self.for_in(rule, f),
        }
    }

    fn range(&mut self, rule: usize, range: &'a Range) {
        self.expr(rule, &range.lower_bound);
        self.expr(rule, &range.upper_bound);
    }

    fn quantifier(&mut self, rule: usize, quantifier: &'a Quantifier) {
        if let Quantifier::Percentage(expr) | Quantifier::Expr(expr) =
            quantifier
        {
            self.expr(rule, expr);
        }
    }

    fn for_in(&mut self, rule: usize, f: &'a ForIn) {
        self.quantifier(rule, &f.quantifier);

        let items = match &f.iterable {
            Iterable::Range(range) => {
                self.range(rule, range);
                None
            }
            Iterable::ExprTuple(exprs) => {
                for expr in exprs {
                    self.expr(rule, expr);
                }
                None
            }
            Iterable::Expr(expr) => {
                self.expr(rule, expr);
                self.module_path(expr).map(|mut path| {
                    path.push(Segment::Index);
                    path
                })
            }
        };

        let scope = f.condition.span();
        let last = f.variables.len().saturating_sub(1);
        let scopes_len = self.scopes.len();

        for (i, variable) in f.variables.iter().enumerate() {
            let var = self.loop_vars.len();
            self.loop_vars.push(LoopVarSymbol {
                name: variable.name.clone(),
                ident_span: variable.span,
                scope,
                // With two variables the loop iterates over a dictionary,
                // and only the second one is bound to its values.
                binding: if i == last { items.clone() } else { None },
            });
            self.occurrence(
                rule,
                variable.span,
                OccurrenceKind::LoopVarDecl { var },
            );
            self.scopes.push(var);
        }

        self.expr(rule, &f.condition);
        self.scopes.truncate(scopes_len);
    }

    /// Records a reference to a pattern (`$a`, `#a`, `@a`, `!a`).
    fn pattern_ref(&mut self, rule: usize, ident: &Ident, indexed: bool) {
        // Anonymous references like `$` or `#` refer to the pattern being
        // iterated by a `for .. of`.
        if strip_sigil(&ident.name).is_empty() {
            if self.for_of_depth == 0 {
                self.diagnostics.push(Diagnostic::error(
                    ident.span,
                    format!("`{}` used outside of `for .. of`", ident.name),
                ));
            }
            return;
        }

        let pattern = self.rules[rule].pattern(&ident.name);

        if pattern.is_none() {
            self.diagnostics.push(
                Diagnostic::error(
                    ident.span,
                    format!("unknown pattern `{}`", ident.name),
                )
                .with_code("unknown_pattern"),
            );
        }

        self.occurrence(
            rule,
            ident.span,
            OccurrenceKind::PatternRef { pattern, wildcard: false, indexed },
        );
    }

    fn pattern_set(&mut self, rule: usize, set: &'a PatternSet) {
        let PatternSet::Set(items) = set else {
            return;
        };
        for item in items {
            if !item.wildcard {
                self.pattern_ref(rule, &item.identifier, false);
                continue;
            }
            let prefix = strip_sigil(&item.identifier.name);
            let matches = self.rules[rule]
                .patterns
                .iter()
                .any(|p| strip_sigil(&p.name).starts_with(prefix));
            if !matches {
                self.diagnostics.push(Diagnostic::error(
                    item.span,
                    format!("no pattern matches `{}*`", item.identifier.name),
                ));
            }
            if !prefix.is_empty() {
                self.occurrence(
                    rule,
                    item.identifier.span,
                    OccurrenceKind::PatternRef {
                        pattern: None,
                        wildcard: true,
                        indexed: false,
                    },
                );
            }
        }
    }

    /// Handles chains like `foo`, `pe.sections[0].name` or `math.entropy()`.
    fn chain(&mut self, rule: usize, expr: &'a Expr) {
        let mut links = Vec::new();
        let root = flatten(expr, &mut links);

        let Expr::Ident(ident) = root else {
            self.expr(rule, root);
            self.links(rule, &links, None);
            return;
        };

        if let Some(var) = self.visible_loop_var(&ident.name) {
            self.occurrence(rule, ident.span, OccurrenceKind::LoopVarRef { var });
            let binding = self.loop_vars[var].binding.clone();
            self.links(rule, &links, binding);
        } else if self.is_module(&ident.name) {
            let path = vec![Segment::field(ident.name.as_str())];
            let resolved = self.resolves(&path);
            self.occurrence(
                rule,
                ident.span,
                OccurrenceKind::ModuleRef { path: path.clone(), resolved },
            );
            self.links(rule, &links, Some(path));
        } else {
            if !ident.name.is_empty() {
                self.occurrence(
                    rule,
                    ident.span,
                    OccurrenceKind::RuleRef { name: ident.name.clone() },
                );
            }
            self.links(rule, &links, None);
        }
    }

    /// Visits the links that follow the root of a chain. If the root is a
    /// module path, every field becomes a module reference.
    fn links(
        &mut self,
        rule: usize,
        links: &[Link<'a>],
        mut path: Option<Vec<Segment>>,
    ) {
        for link in links {
            match link {
                Link::Field(field) => {
                    if let Some(path) = path.as_mut() {
                        path.push(Segment::field(field.name.as_str()));
                        let resolved = self.resolves(path);
                        self.occurrence(
                            rule,
                            field.span,
                            OccurrenceKind::ModuleRef {
                                path: path.clone(),
                                resolved,
                            },
                        );
                    }
                }
                Link::Index(index) => {
                    if let Some(path) = path.as_mut() {
                        path.push(Segment::Index);
                    }
                    self.expr(rule, index);
                }
                Link::Call(args) => {
                    path = None;
                    for arg in args.iter() {
                        self.expr(rule, arg);
                    }
                }
            }
        }
    }

    /// Returns the module path that an expression refers to, if any.
    fn module_path(&self, expr: &'a Expr) -> Option<Vec<Segment>> {
        let mut links = Vec::new();
        let Expr::Ident(root) = flatten(expr, &mut links) else {
            return None;
        };

        let mut path = match self.visible_loop_var(&root.name) {
            Some(var) => self.loop_vars[var].binding.clone()?,
            None if self.is_module(&root.name) => {
                vec![Segment::field(root.name.as_str())]
            }
            None => return None,
        };

        for link in links {
            match link {
                Link::Field(field) => {
                    path.push(Segment::field(field.name.as_str()))
                }
                Link::Index(_) => path.push(Segment::Index),
                Link::Call(_) => return None,
            }
        }

        Some(path)
    }

    fn visible_loop_var(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find(|var| self.loop_vars[**var].name == name)
            .copied()
    }

    /// An identifier is a module if it was imported, or if it's the name of
    /// a known module, so that completion and hover work before the import
    /// statement is written.
    fn is_module(&self, name: &str) -> bool {
        self.document.ast.imports.iter().any(|import| import.module_name == name)
            || self.catalog.is_some_and(|c| c.module(name).is_some())
    }

    fn resolves(&self, path: &[Segment]) -> bool {
        self.catalog.is_some_and(|c| c.schema_at(path).is_some())
    }
}
