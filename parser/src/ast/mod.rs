/*! Abstract Syntax Tree (AST) for YARA rules.

Each structure or enum in this module corresponds to some construct in the
YARA language, like a rule, expression, identifier, import statement, etc.
Every node carries the [`Span`] that it occupies in the source code, and the
tree owns all its data, so it can outlive the source code it was built from.
*/

use std::fmt;
use std::fmt::{Display, Formatter};

use bitmask::bitmask;

use crate::{Error, Span};

/// The result of parsing a YARA source file.
///
/// Parsing never fails, the errors found are in the `errors` field, and the
/// rest of the fields contain everything that could be recovered.
#[derive(Debug, Default)]
pub struct SourceFile {
    /// The list of imports.
    pub imports: Vec<Import>,
    /// The list of includes.
    pub includes: Vec<Include>,
    /// The list of rules, in the order they appear in the source.
    pub rules: Vec<Rule>,
    /// Errors found while parsing.
    pub errors: Vec<Error>,
}

/// An import statement (e.g. `import "pe"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub span: Span,
    pub module_name: String,
    /// Span of the module name, including the quotes.
    pub module_name_span: Span,
}

/// An include statement (e.g. `include "other.yar"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub span: Span,
    pub path: String,
}

bitmask! {
    /// A set of flags associated to a YARA rule.
    #[derive(Debug)]
    pub mask RuleFlags: u8 where
    /// Each of the flags that a YARA rule can have.
    flags RuleFlag {
        Private = 0x01,
        Global = 0x02,
    }
}

/// A YARA rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub flags: RuleFlags,
    pub identifier: Ident,
    pub tags: Vec<Ident>,
    pub meta: Vec<Meta>,
    pub patterns: Vec<Pattern>,
    pub condition: Option<Expr>,
    /// Sections in the order they appear in the rule body.
    pub sections: Vec<Section>,
    /// Span of the opening brace, if any.
    pub lbrace: Option<Span>,
    /// Span of the closing brace, if any.
    pub rbrace: Option<Span>,
    /// Span that covers the whole rule, from the modifiers to the closing
    /// brace. If the closing brace is missing the span ends at the last
    /// token that belongs to the rule.
    pub span: Span,
}

impl Rule {
    /// Returns the pattern with the given identifier (including the `$`).
    pub fn pattern(&self, ident: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.identifier.name == ident)
    }

    /// Returns the section that contains the given offset, if any.
    pub fn section_at(&self, offset: usize) -> Option<&Section> {
        self.sections.iter().find(|s| s.span.touches(offset))
    }

    /// Returns the span of the rule header, which goes from the start of
    /// the rule to the opening brace.
    pub fn header_span(&self) -> Span {
        match self.lbrace {
            Some(lbrace) => Span::new(self.span.start(), lbrace.start()),
            None => Span::new(self.span.start(), self.identifier.span.end()),
        }
    }
}

/// Sections in the body of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Meta,
    Strings,
    Condition,
}

impl SectionKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            SectionKind::Meta => "meta",
            SectionKind::Strings => "strings",
            SectionKind::Condition => "condition",
        }
    }
}

/// A section of a rule body (e.g. `strings: ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    /// Span of the keyword and the colon that follows it.
    pub keyword: Span,
    /// Span that goes from the keyword to the start of the next section or
    /// the closing brace of the rule.
    pub span: Span,
}

impl Section {
    /// Returns the span of the section's content, after the colon.
    pub fn body(&self) -> Span {
        Span::new(self.keyword.end(), self.span.end())
    }
}

/// A metadata entry in a YARA rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub span: Span,
    pub identifier: Ident,
    pub value: MetaValue,
}

/// Each of the possible values that can have a metadata entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// The string as it appears in the source, without the quotes and
    /// with escape sequences untouched.
    String(String),
}

impl Display for MetaValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "\"{}\"", v),
        }
    }
}

/// An identifier (e.g. `some_ident`, `$a`, `#a`).
///
/// For pattern identifiers the name includes the sigil.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub span: Span,
    pub name: String,
}

impl Ident {
    pub fn new<N: Into<String>>(name: N, span: Span) -> Self {
        Self { span, name: name.into() }
    }
}

/// Types of patterns (a.k.a. strings) that can appear in a YARA rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Text,
    Hex,
    Regexp,
}

/// A pattern (a.k.a. string) declared in a YARA rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub span: Span,
    pub identifier: Ident,
    pub kind: PatternKind,
    /// Span of the pattern's value: the quoted text, the hex pattern with
    /// its braces, or the regexp with its slashes and flags.
    pub value: Span,
    pub modifiers: Vec<PatternModifier>,
}

/// A pattern modifier (e.g. `wide`, `xor(1-10)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternModifier {
    pub span: Span,
    pub name: String,
}

/// A range (e.g. `(0..filesize)`).
#[derive(Debug, Clone)]
pub struct Range {
    pub span: Span,
    pub lower_bound: Expr,
    pub upper_bound: Expr,
}

/// In expressions like `$a at 0` and `$b in (0..10)`, this type represents
/// the anchor (e.g. `at <expr>`, `in <range>`).
#[derive(Debug, Clone)]
pub enum MatchAnchor {
    At(Box<Expr>),
    In(Box<Range>),
}

/// A pattern match expression (e.g. `$a`, `$a at 0`, `$a in (0..10)`).
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub identifier: Ident,
    pub anchor: Option<MatchAnchor>,
}

/// A pattern identifier accompanied by an optional range (e.g. `#a`,
/// `#a in (0..10)`).
#[derive(Debug, Clone)]
pub struct IdentWithRange {
    pub span: Span,
    pub identifier: Ident,
    pub range: Option<Range>,
}

/// A pattern identifier accompanied by an optional index (e.g. `@a`,
/// `!a[2]`).
#[derive(Debug, Clone)]
pub struct IdentWithIndex {
    pub span: Span,
    pub identifier: Ident,
    pub index: Option<Expr>,
}

/// A field access expression (e.g. `pe.number_of_sections`).
#[derive(Debug, Clone)]
pub struct FieldAccess {
    pub span: Span,
    pub object: Expr,
    pub field: Ident,
}

/// An array or dictionary lookup (e.g. `pe.sections[0]`,
/// `pe.version_info["CompanyName"]`).
#[derive(Debug, Clone)]
pub struct Lookup {
    pub span: Span,
    pub primary: Expr,
    pub index: Expr,
}

/// A function call (e.g. `pe.is_dll()`, `math.entropy(0, filesize)`).
#[derive(Debug, Clone)]
pub struct FuncCall {
    pub span: Span,
    pub callee: Expr,
    pub args: Vec<Expr>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Defined,
    Minus,
    BitwiseNot,
}

/// An expression with a single operand.
#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub span: Span,
    pub op: UnaryOp,
    pub operand: Expr,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IEquals,
    Matches,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// A binary operator applied from left to right to two or more operands.
///
/// `a + b + c` is a single expression with three operands, while in
/// `a + b - c` the first operand of the subtraction is `a + b`.
#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub span: Span,
    pub op: BinaryOp,
    pub operands: Vec<Expr>,
}

/// A quantifier used in `for` and `of` expressions.
#[derive(Debug, Clone)]
pub enum Quantifier {
    None { span: Span },
    All { span: Span },
    Any { span: Span },
    /// Used in expressions like `10% of them`.
    Percentage(Expr),
    /// Used in expressions like `10 of them`.
    Expr(Expr),
}

/// Each individual item in a set of patterns.
///
/// In the pattern set `($a, $b*)`, `$a` and `$b*` are represented by a
/// [`PatternSetItem`]. The identifier doesn't include the asterisk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSetItem {
    pub span: Span,
    pub identifier: Ident,
    pub wildcard: bool,
}

/// Either a set of pattern identifiers (possibly with wildcards), or the
/// special set `them`, which includes all the patterns declared in the rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSet {
    Them { span: Span },
    Set(Vec<PatternSetItem>),
}

/// Items in an `of` expression.
#[derive(Debug, Clone)]
pub enum OfItems {
    PatternSet(PatternSet),
    /// A tuple of boolean expressions or rule names (e.g.
    /// `any of (foo, bar*)`).
    ExprTuple(Vec<Expr>),
}

/// An `of` expression (e.g. `1 of ($a, $b)`, `all of them`).
#[derive(Debug, Clone)]
pub struct Of {
    pub span: Span,
    pub quantifier: Quantifier,
    pub items: OfItems,
    pub anchor: Option<MatchAnchor>,
}

/// A `for .. of` expression (e.g `for all of them : (..)`).
#[derive(Debug, Clone)]
pub struct ForOf {
    pub span: Span,
    pub quantifier: Quantifier,
    pub pattern_set: PatternSet,
    pub condition: Expr,
}

/// Possible iterable expressions that can be used in a [`ForIn`].
#[derive(Debug, Clone)]
pub enum Iterable {
    Range(Range),
    ExprTuple(Vec<Expr>),
    Expr(Expr),
}

/// A `for .. in` expression (e.g `for all x in (1..3) : (..)`).
#[derive(Debug, Clone)]
pub struct ForIn {
    pub span: Span,
    pub quantifier: Quantifier,
    pub variables: Vec<Ident>,
    pub iterable: Iterable,
    pub condition: Expr,
}

/// An expression in the AST.
#[derive(Debug, Clone)]
pub enum Expr {
    True { span: Span },
    False { span: Span },
    Filesize { span: Span },
    Entrypoint { span: Span },

    /// A literal string, (e.g: `"abcd"`)
    LiteralString { span: Span },
    /// A literal integer, (e.g: `1`, `0xAB`, `2KB`)
    LiteralInteger { span: Span, value: i64 },
    /// A literal float, (e.g: `2.0`, `3.14`)
    LiteralFloat { span: Span },
    /// A regular expression (e.g: `/ab.*cd/i`)
    Regexp { span: Span },

    /// Identifier (e.g. `some_identifier`).
    Ident(Box<Ident>),
    /// Rule name followed by an asterisk, only valid in `of` tuples
    /// (e.g. `any of (foo*)`).
    RuleWildcard(Box<Ident>),

    /// Pattern match expression (e.g. `$`, `$a`, `$a at 0`).
    PatternMatch(Box<PatternMatch>),
    /// Pattern count expression (e.g. `#`, `#a`, `#a in (0..10)`).
    PatternCount(Box<IdentWithRange>),
    /// Pattern offset expression (e.g. `@`, `@a`, `@a[1]`).
    PatternOffset(Box<IdentWithIndex>),
    /// Pattern length expression (e.g. `!`, `!a`, `!a[1]`).
    PatternLength(Box<IdentWithIndex>),

    FieldAccess(Box<FieldAccess>),
    Lookup(Box<Lookup>),
    FuncCall(Box<FuncCall>),

    Unary(Box<UnaryExpr>),
    Binary(Box<BinaryExpr>),

    Of(Box<Of>),
    ForOf(Box<ForOf>),
    ForIn(Box<ForIn>),

    /// A parenthesized expression or a tuple used as an `of` item.
    Group { span: Span, expr: Box<Expr> },

    /// A malformed expression.
    Error { span: Span },
}

impl Expr {
    /// Returns the span of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::True { span }
            | Expr::False { span }
            | Expr::Filesize { span }
            | Expr::Entrypoint { span }
            | Expr::LiteralString { span }
            | Expr::LiteralInteger { span, .. }
            | Expr::LiteralFloat { span }
            | Expr::Regexp { span }
            | Expr::Group { span, .. }
            | Expr::Error { span } => *span,
            Expr::Ident(ident) | Expr::RuleWildcard(ident) => ident.span,
            Expr::PatternMatch(p) => match &p.anchor {
                None => p.identifier.span,
                Some(MatchAnchor::At(expr)) => {
                    p.identifier.span.combine(&expr.span())
                }
                Some(MatchAnchor::In(range)) => {
                    p.identifier.span.combine(&range.span)
                }
            },
            Expr::PatternCount(p) => p.span,
            Expr::PatternOffset(p) | Expr::PatternLength(p) => p.span,
            Expr::FieldAccess(f) => f.span,
            Expr::Lookup(l) => l.span,
            Expr::FuncCall(f) => f.span,
            Expr::Unary(u) => u.span,
            Expr::Binary(b) => b.span,
            Expr::Of(o) => o.span,
            Expr::ForOf(f) => f.span,
            Expr::ForIn(f) => f.span,
        }
    }

    /// If this expression is a chain of field accesses that starts with an
    /// identifier (e.g. `pe.version_info`), returns the identifiers in the
    /// chain.
    pub fn dotted_path(&self) -> Option<Vec<&Ident>> {
        match self {
            Expr::Ident(ident) => Some(vec![ident.as_ref()]),
            Expr::FieldAccess(f) => {
                let mut path = f.object.dotted_path()?;
                path.push(&f.field);
                Some(path)
            }
            _ => None,
        }
    }
}
