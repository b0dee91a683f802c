/*! This module contains a handwritten recursive-descent parser for YARA
rules.

The parser receives the sequence of tokens produced by the [`Tokenizer`] and
builds a [`SourceFile`] directly, without an intermediate concrete syntax
tree. Errors never stop the parser: they are recorded, the malformed
construct is replaced with an error node (or simply dropped), and parsing
resumes at the next recovery point.

Recovery points are the keywords that start a rule section (`meta`,
`strings`, `condition`), the closing brace of a rule, and anything that can
start a top-level item (`rule`, `private`, `global`, `import`, `include`).
After reporting an error the parser enters "panic mode", where further
errors are suppressed until the next recovery point is reached. This avoids
cascades of meaningless errors after the first one.
 */

mod token_stream;


use crate::ast::*;
use crate::parser::token_stream::TokenStream;
use crate::tokenizer::{Token, TokenKind, Tokenizer};
use crate::{Error, Span};

use TokenKind::*;

/// Parses YARA source code and produces a [`SourceFile`].
pub struct Parser<'src> {
    source: &'src str,
    tokens: TokenStream<'src>,
    errors: Vec<Error>,
    /// True after an error has been reported and before the next recovery
    /// point is reached.
    panicking: bool,
    /// Current nesting level while parsing a condition.
    depth: usize,
}

impl<'src> Parser<'src> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            tokens: TokenStream::new(Tokenizer::new(source)),
            errors: Vec::new(),
            panicking: false,
            depth: 0,
        }
    }

    /// Returns the source code passed to the parser.
    #[inline]
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Consumes the parser and builds the [`SourceFile`].
    pub fn build_ast(mut self) -> SourceFile {
        let mut source_file = SourceFile::default();

        while let Some(token) = self.tokens.peek() {
            match token.kind {
                IMPORT_KW => {
                    self.panicking = false;
                    if let Some(import) = self.import() {
                        source_file.imports.push(import);
                    }
                }
                INCLUDE_KW => {
                    self.panicking = false;
                    if let Some(include) = self.include() {
                        source_file.includes.push(include);
                    }
                }
                RULE_KW | PRIVATE_KW | GLOBAL_KW => {
                    self.panicking = false;
                    if let Some(rule) = self.rule() {
                        source_file.rules.push(rule);
                    }
                }
                _ => {
                    self.unexpected("`import`, `include` or `rule`");
                    self.tokens.bump();
                }
            }
        }

        source_file.errors = self.errors;
        source_file
    }
}

// Parser private API.
//
// Utility functions used by the grammar rules.
impl<'src> Parser<'src> {
    #[inline]
    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek_kind()
    }

    #[inline]
    fn check(&mut self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// Consumes the next token if it is of the given kind.
    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            self.tokens.bump()
        } else {
            None
        }
    }

    /// Like [`Parser::eat`], but reports an error if the next token is not
    /// of the expected kind.
    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        let token = self.eat(kind);
        if token.is_none() {
            self.unexpected(kind.description());
        }
        token
    }

    /// Returns the slice of source code covered by `span`.
    #[inline]
    fn text(&self, span: Span) -> &'src str {
        &self.source[span.range()]
    }

    /// Empty span located at the end of the last consumed token.
    #[inline]
    fn empty_span(&self) -> Span {
        Span::new(self.tokens.prev_end(), self.tokens.prev_end())
    }

    fn report(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Reports that the next token is not what the parser expected, unless
    /// the parser is already in panic mode.
    fn unexpected(&mut self, expected: &str) {
        if self.panicking {
            return;
        }
        self.panicking = true;
        let error = match self.tokens.peek() {
            None => Error::UnexpectedEof {
                expected: expected.to_string(),
                span: Span::new(self.source.len(), self.source.len()),
            },
            Some(token) => self.token_error(token, expected),
        };
        self.report(error);
    }

    fn token_error(&self, token: Token, expected: &str) -> Error {
        let span = token.span;
        match token.kind {
            UNTERMINATED_STRING => Error::UnterminatedString { span },
            UNTERMINATED_REGEXP => Error::UnterminatedRegexp { span },
            UNKNOWN => Error::UnknownToken {
                token: self.text(span).to_string(),
                span,
            },
            IDENT => Error::UnexpectedToken {
                expected: expected.to_string(),
                found: format!("`{}`", self.text(span)),
                span,
            },
            kind => Error::UnexpectedToken {
                expected: expected.to_string(),
                found: kind.description().to_string(),
                span,
            },
        }
    }

    /// Returns true if the next token is a recovery point, or if there are
    /// no more tokens.
    fn at_sync_point(&mut self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(
                META_KW
                    | STRINGS_KW
                    | CONDITION_KW
                    | R_BRACE
                    | RULE_KW
                    | PRIVATE_KW
                    | GLOBAL_KW
                    | IMPORT_KW
                    | INCLUDE_KW
            )
        )
    }

    /// Returns true if the next token starts a top-level item.
    fn at_top_level_item(&mut self) -> bool {
        match self.peek_kind() {
            Some(RULE_KW | IMPORT_KW | INCLUDE_KW) => true,
            Some(PRIVATE_KW | GLOBAL_KW) => matches!(
                self.tokens.peek_nth(1).map(|t| t.kind),
                Some(RULE_KW | PRIVATE_KW | GLOBAL_KW)
            ),
            _ => false,
        }
    }

    fn skip_to_sync_point(&mut self) {
        while !self.at_sync_point() {
            self.tokens.bump();
        }
    }
}

// Grammar rules for top-level items.
impl<'src> Parser<'src> {
    fn import(&mut self) -> Option<Import> {
        let start = self.tokens.bump()?.span;
        let name = self.expect(STRING_LIT)?.span;
        Some(Import {
            span: start.combine(&name),
            module_name: unquote(self.text(name)).to_string(),
            module_name_span: name,
        })
    }

    fn include(&mut self) -> Option<Include> {
        let start = self.tokens.bump()?.span;
        let path = self.expect(STRING_LIT)?.span;
        Some(Include {
            span: start.combine(&path),
            path: unquote(self.text(path)).to_string(),
        })
    }

    fn rule(&mut self) -> Option<Rule> {
        let start = self.tokens.peek()?.span.start();
        let mut flags = RuleFlags::none();

        loop {
            let flag = match self.peek_kind() {
                Some(PRIVATE_KW) => RuleFlag::Private,
                Some(GLOBAL_KW) => RuleFlag::Global,
                _ => break,
            };
            let token = self.tokens.bump()?;
            if flags.contains(flag) {
                self.report(Error::DuplicateModifier {
                    modifier: self.text(token.span).to_string(),
                    span: token.span,
                });
            }
            flags.set(flag);
        }

        self.expect(RULE_KW)?;

        let identifier = match self.eat(IDENT) {
            Some(token) => Ident::new(self.text(token.span), token.span),
            None => {
                self.unexpected("rule identifier");
                Ident::new("", self.empty_span())
            }
        };

        let mut tags: Vec<Ident> = Vec::new();

        if self.eat(COLON).is_some() {
            while let Some(token) = self.eat(IDENT) {
                let tag = Ident::new(self.text(token.span), token.span);
                if tags.iter().any(|t| t.name == tag.name) {
                    self.report(Error::DuplicateTag {
                        tag: tag.name.clone(),
                        span: tag.span,
                    });
                } else {
                    tags.push(tag);
                }
            }
        }

        let mut rule = Rule {
            flags,
            identifier,
            tags,
            meta: Vec::new(),
            patterns: Vec::new(),
            condition: None,
            sections: Vec::new(),
            lbrace: None,
            rbrace: None,
            span: Span::default(),
        };

        rule.lbrace = self.expect(L_BRACE).map(|t| t.span);

        loop {
            match self.peek_kind() {
                None => {
                    self.report(Error::UnbalancedBraces {
                        span: rule.lbrace.unwrap_or(rule.identifier.span),
                    });
                    break;
                }
                Some(R_BRACE) => {
                    rule.rbrace = self.tokens.bump().map(|t| t.span);
                    break;
                }
                Some(META_KW | STRINGS_KW | CONDITION_KW) => {
                    self.panicking = false;
                    self.section(&mut rule);
                }
                Some(_) if self.at_top_level_item() => {
                    self.report(Error::UnbalancedBraces {
                        span: rule.lbrace.unwrap_or(rule.identifier.span),
                    });
                    break;
                }
                Some(_) => {
                    self.unexpected("`meta`, `strings` or `condition`");
                    self.tokens.bump();
                }
            }
        }

        let end = rule.rbrace.map_or(self.tokens.prev_end(), |s| s.end());
        rule.span = Span::new(start, end);

        if !rule.sections.iter().any(|s| s.kind == SectionKind::Condition)
            && !rule.identifier.name.is_empty()
        {
            self.report(Error::MissingCondition {
                rule: rule.identifier.name.clone(),
                span: rule.identifier.span,
            });
        }

        Some(rule)
    }

    fn section(&mut self, rule: &mut Rule) {
        let Some(keyword) = self.tokens.bump() else {
            return;
        };

        let kind = match keyword.kind {
            META_KW => SectionKind::Meta,
            STRINGS_KW => SectionKind::Strings,
            _ => SectionKind::Condition,
        };

        let duplicate = rule.sections.iter().any(|s| s.kind == kind);

        if duplicate {
            self.report(Error::DuplicateSection {
                section: kind.keyword().to_string(),
                span: keyword.span,
            });
        }

        self.expect(COLON);

        let keyword_span = Span::new(keyword.span.start(), self.tokens.prev_end());

        match kind {
            SectionKind::Meta => self.meta_entries(rule),
            SectionKind::Strings => self.pattern_declarations(rule),
            SectionKind::Condition => {
                self.depth = 0;
                let condition = self.expr();
                if !duplicate {
                    rule.condition = Some(condition);
                }
            }
        }

        if !self.at_sync_point() || self.at_false_top_level_modifier() {
            self.unexpected("end of section");
            self.skip_to_sync_point();
        }

        let end = self
            .tokens
            .peek()
            .map_or(self.source.len(), |token| token.span.start());

        rule.sections.push(Section {
            kind,
            keyword: keyword_span,
            span: Span::new(keyword.span.start(), end),
        });
    }

    /// `private` and `global` are recovery points only when they start a
    /// new rule. Inside a section they are unexpected.
    fn at_false_top_level_modifier(&mut self) -> bool {
        matches!(self.peek_kind(), Some(PRIVATE_KW | GLOBAL_KW))
            && !self.at_top_level_item()
    }

    fn meta_entries(&mut self, rule: &mut Rule) {
        while let Some(token) = self.eat(IDENT) {
            let identifier = Ident::new(self.text(token.span), token.span);

            if self.expect(EQUAL).is_none() {
                return;
            }

            let Some(value) = self.meta_value() else {
                return;
            };

            rule.meta.push(Meta {
                span: identifier.span.combine(&self.empty_span()),
                identifier,
                value,
            });
        }
    }

    fn meta_value(&mut self) -> Option<MetaValue> {
        let token = match self.tokens.peek() {
            Some(token) => token,
            None => {
                self.unexpected("meta value");
                return None;
            }
        };

        let value = match token.kind {
            TRUE_KW => MetaValue::Bool(true),
            FALSE_KW => MetaValue::Bool(false),
            STRING_LIT => MetaValue::String(unquote(self.text(token.span)).to_string()),
            UNTERMINATED_STRING => {
                self.report(Error::UnterminatedString { span: token.span });
                MetaValue::String(self.text(token.span)[1..].to_string())
            }
            FLOAT_LIT => {
                MetaValue::Float(self.text(token.span).parse().unwrap_or_default())
            }
            INTEGER_LIT => MetaValue::Integer(self.integer(token.span)),
            HYPHEN => {
                self.tokens.bump();
                return match self.tokens.peek() {
                    Some(t) if t.kind == INTEGER_LIT => {
                        self.tokens.bump();
                        Some(MetaValue::Integer(-self.integer(t.span)))
                    }
                    Some(t) if t.kind == FLOAT_LIT => {
                        self.tokens.bump();
                        Some(MetaValue::Float(
                            -self.text(t.span).parse::<f64>().unwrap_or_default(),
                        ))
                    }
                    _ => {
                        self.unexpected("number");
                        None
                    }
                };
            }
            _ => {
                self.unexpected("meta value");
                return None;
            }
        };

        self.tokens.bump();
        Some(value)
    }

    fn pattern_declarations(&mut self, rule: &mut Rule) {
        loop {
            let token = match self.tokens.peek() {
                Some(token) => token,
                None => return,
            };

            match token.kind {
                PATTERN_IDENT => {}
                IDENT | PATTERN_COUNT | PATTERN_OFFSET | PATTERN_LENGTH
                    if self.tokens.peek_nth(1).map(|t| t.kind) == Some(EQUAL) =>
                {
                    self.report(Error::InvalidPatternIdentifier {
                        ident: self.text(token.span).to_string(),
                        span: token.span,
                    });
                    // Parse the declaration anyway, but don't keep it.
                    self.tokens.bump();
                    self.tokens.bump();
                    if self.pattern_value().is_none() {
                        return;
                    }
                    self.pattern_modifiers();
                    continue;
                }
                _ => return,
            }

            self.tokens.bump();

            let identifier = Ident::new(self.text(token.span), token.span);

            if self.expect(EQUAL).is_none() {
                return;
            }

            let Some((kind, value)) = self.pattern_value() else {
                return;
            };

            let modifiers = self.pattern_modifiers();

            let pattern = Pattern {
                span: identifier.span.combine(&self.empty_span()),
                identifier,
                kind,
                value,
                modifiers,
            };

            // Anonymous patterns (`$`) can be declared more than once.
            let existing = if pattern.identifier.name != "$" {
                rule.pattern(&pattern.identifier.name).map(|p| p.identifier.span)
            } else {
                None
            };

            match existing {
                Some(existing) => self.report(Error::DuplicatePattern {
                    ident: pattern.identifier.name,
                    span: pattern.identifier.span,
                    existing,
                }),
                None => rule.patterns.push(pattern),
            }
        }
    }

    fn pattern_value(&mut self) -> Option<(PatternKind, Span)> {
        let token = match self.tokens.peek() {
            Some(token) => token,
            None => {
                self.unexpected("pattern value");
                return None;
            }
        };

        match token.kind {
            STRING_LIT => {
                self.tokens.bump();
                Some((PatternKind::Text, token.span))
            }
            REGEXP => {
                self.tokens.bump();
                Some((PatternKind::Regexp, token.span))
            }
            UNTERMINATED_STRING => {
                self.tokens.bump();
                self.report(Error::UnterminatedString { span: token.span });
                Some((PatternKind::Text, token.span))
            }
            UNTERMINATED_REGEXP => {
                self.tokens.bump();
                self.report(Error::UnterminatedRegexp { span: token.span });
                Some((PatternKind::Regexp, token.span))
            }
            L_BRACE => {
                self.tokens.bump();
                self.tokens.enter_hex_pattern_mode();
                let end = self.hex_pattern(token.span);
                Some((PatternKind::Hex, Span::new(token.span.start(), end)))
            }
            _ => {
                self.unexpected("pattern value");
                None
            }
        }
    }

    /// Parses the content of a hex pattern after the opening brace, and
    /// returns the offset where the pattern ends.
    fn hex_pattern(&mut self, lbrace: Span) -> usize {
        let mut depth = 0_usize;

        loop {
            let token = match self.tokens.peek() {
                Some(token) => token,
                None => {
                    self.report(Error::UnbalancedBraces { span: lbrace });
                    return self.tokens.prev_end();
                }
            };

            match token.kind {
                HEX_BYTE => {
                    self.tokens.bump();
                }
                L_BRACKET => {
                    self.tokens.bump();
                    self.tokens.enter_hex_jump_mode();
                    self.hex_jump();
                }
                L_PAREN => {
                    self.tokens.bump();
                    depth += 1;
                }
                PIPE if depth > 0 => {
                    self.tokens.bump();
                }
                R_PAREN if depth > 0 => {
                    self.tokens.bump();
                    depth -= 1;
                }
                R_BRACE if depth == 0 => {
                    self.tokens.bump();
                    return token.span.end();
                }
                _ if self.at_sync_point() => {
                    // Something like a section keyword inside the hex
                    // pattern, most likely the closing brace is missing.
                    self.report(Error::UnbalancedBraces { span: lbrace });
                    return self.tokens.prev_end();
                }
                _ => {
                    self.unexpected(if depth > 0 {
                        "BYTE, `|` or `)`"
                    } else {
                        "BYTE or `}`"
                    });
                    // The tokenizer is not in hex mode anymore, skip
                    // everything up to the closing brace.
                    while !self.at_sync_point() {
                        self.tokens.bump();
                    }
                    return match self.eat(R_BRACE) {
                        Some(rbrace) => rbrace.span.end(),
                        None => self.tokens.prev_end(),
                    };
                }
            }
        }
    }

    fn hex_jump(&mut self) {
        self.eat(INTEGER_LIT);
        if self.eat(HYPHEN).is_some() {
            self.eat(INTEGER_LIT);
        }
        self.expect(R_BRACKET);
    }

    fn pattern_modifiers(&mut self) -> Vec<PatternModifier> {
        let mut modifiers = Vec::new();

        loop {
            let token = match self.tokens.peek() {
                Some(token) => token,
                None => break,
            };

            match token.kind {
                ASCII_KW | WIDE_KW | NOCASE_KW | FULLWORD_KW => {
                    self.tokens.bump();
                }
                PRIVATE_KW if !self.at_top_level_item() => {
                    self.tokens.bump();
                }
                XOR_KW | BASE64_KW | BASE64WIDE_KW => {
                    self.tokens.bump();
                    if self.eat(L_PAREN).is_some() {
                        while !self.check(R_PAREN) && !self.at_sync_point() {
                            self.tokens.bump();
                        }
                        self.expect(R_PAREN);
                    }
                }
                _ => break,
            }

            modifiers.push(PatternModifier {
                span: Span::new(token.span.start(), self.tokens.prev_end()),
                name: self.text(token.span).to_string(),
            });
        }

        modifiers
    }
}

// Grammar rules for expressions, from lowest to highest precedence.
impl<'src> Parser<'src> {
    /// Maximum nesting level for expressions.
    ///
    /// Every parenthesized expression, `not`, unary operator, link in a
    /// postfix chain, and change of operator within a chain of binary
    /// operations increases the nesting level. Deeper expressions are
    /// rejected, so that neither the parser nor the code that walks the
    /// AST can run out of stack.
    const MAX_DEPTH: usize = 128;

    fn expr(&mut self) -> Expr {
        self.nested(Self::or_expr)
    }

    /// Parses an expression with `parse` one nesting level deeper.
    fn nested(&mut self, parse: fn(&mut Self) -> Expr) -> Expr {
        if self.depth >= Self::MAX_DEPTH {
            return self.too_deep();
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth = self.depth.saturating_sub(1);
        expr
    }

    /// Reports that the maximum nesting level was reached and skips the
    /// rest of the section.
    fn too_deep(&mut self) -> Expr {
        let start = self
            .tokens
            .peek()
            .map_or(self.tokens.prev_end(), |token| token.span.start());
        self.skip_to_sync_point();
        let span = Span::new(start, self.tokens.prev_end().max(start));
        self.report(Error::NestingTooDeep { span });
        self.panicking = true;
        Expr::Error { span }
    }

    /// Parses operands separated by the binary operators recognized by
    /// `operator`, all of them with the same precedence.
    ///
    /// Consecutive uses of the same operator are collected into a single
    /// [`BinaryExpr`]. When the operator changes, the expression parsed so
    /// far becomes the first operand of a new one.
    fn binary_chain(
        &mut self,
        mut lhs: Expr,
        operator: fn(&mut Self) -> Option<BinaryOp>,
        operand: fn(&mut Self) -> Expr,
    ) -> Expr {
        // True once `lhs` is a node created by this chain.
        let mut chained = false;

        while let Some(op) = operator(self) {
            self.tokens.bump();
            let rhs = operand(self);
            lhs = match lhs {
                Expr::Binary(mut expr) if chained && expr.op == op => {
                    expr.span = expr.span.combine(&rhs.span());
                    expr.operands.push(rhs);
                    Expr::Binary(expr)
                }
                lhs => {
                    if chained {
                        if self.depth >= Self::MAX_DEPTH {
                            return self.too_deep();
                        }
                        self.depth += 1;
                    }
                    chained = true;
                    binary(op, lhs, rhs)
                }
            };
        }

        lhs
    }

    fn or_expr(&mut self) -> Expr {
        let lhs = self.and_expr();
        self.binary_chain(
            lhs,
            |p| p.check(OR_KW).then_some(BinaryOp::Or),
            Self::and_expr,
        )
    }

    fn and_expr(&mut self) -> Expr {
        let lhs = self.not_expr();
        self.binary_chain(
            lhs,
            |p| p.check(AND_KW).then_some(BinaryOp::And),
            Self::not_expr,
        )
    }

    fn not_expr(&mut self) -> Expr {
        let op = match self.peek_kind() {
            Some(NOT_KW) => UnaryOp::Not,
            Some(DEFINED_KW) => UnaryOp::Defined,
            _ => return self.comparison(),
        };
        let Some(token) = self.tokens.bump() else {
            return Expr::Error { span: self.empty_span() };
        };
        let operand = self.nested(Self::not_expr);
        unary(op, token.span, operand)
    }

    fn comparison(&mut self) -> Expr {
        let lhs = self.bitwise_or();

        // Expressions like `2 of them` or `50% of ($a*)`.
        if self.check(OF_KW) {
            return self.of_expr(Quantifier::Expr(lhs));
        }

        if self.check(PERCENT)
            && self.tokens.peek_nth(1).map(|t| t.kind) == Some(OF_KW)
        {
            self.tokens.bump();
            return self.of_expr(Quantifier::Percentage(lhs));
        }

        self.binary_chain(lhs, Self::comparison_op, Self::bitwise_or)
    }

    fn comparison_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek_kind()? {
            EQ => BinaryOp::Eq,
            NE => BinaryOp::Ne,
            LT => BinaryOp::Lt,
            LE => BinaryOp::Le,
            GT => BinaryOp::Gt,
            GE => BinaryOp::Ge,
            CONTAINS_KW => BinaryOp::Contains,
            ICONTAINS_KW => BinaryOp::IContains,
            STARTSWITH_KW => BinaryOp::StartsWith,
            ISTARTSWITH_KW => BinaryOp::IStartsWith,
            ENDSWITH_KW => BinaryOp::EndsWith,
            IENDSWITH_KW => BinaryOp::IEndsWith,
            IEQUALS_KW => BinaryOp::IEquals,
            MATCHES_KW => BinaryOp::Matches,
            _ => return None,
        };
        Some(op)
    }

    fn bitwise_or(&mut self) -> Expr {
        let lhs = self.bitwise_xor();
        self.binary_chain(
            lhs,
            |p| p.check(PIPE).then_some(BinaryOp::BitwiseOr),
            Self::bitwise_xor,
        )
    }

    fn bitwise_xor(&mut self) -> Expr {
        let lhs = self.bitwise_and();
        self.binary_chain(
            lhs,
            |p| p.check(CARET).then_some(BinaryOp::BitwiseXor),
            Self::bitwise_and,
        )
    }

    fn bitwise_and(&mut self) -> Expr {
        let lhs = self.shift();
        self.binary_chain(
            lhs,
            |p| p.check(AMPERSAND).then_some(BinaryOp::BitwiseAnd),
            Self::shift,
        )
    }

    fn shift(&mut self) -> Expr {
        let lhs = self.additive();
        self.binary_chain(
            lhs,
            |p| match p.peek_kind()? {
                SHL => Some(BinaryOp::Shl),
                SHR => Some(BinaryOp::Shr),
                _ => None,
            },
            Self::additive,
        )
    }

    fn additive(&mut self) -> Expr {
        let lhs = self.multiplicative();
        self.binary_chain(
            lhs,
            |p| match p.peek_kind()? {
                PLUS => Some(BinaryOp::Add),
                HYPHEN => Some(BinaryOp::Sub),
                _ => None,
            },
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Expr {
        let lhs = self.unary();
        self.binary_chain(
            lhs,
            |p| match p.peek_kind()? {
                ASTERISK => Some(BinaryOp::Mul),
                BACKSLASH => Some(BinaryOp::Div),
                // In `50% of them` the `%` is not the modulo operator.
                PERCENT
                    if p.tokens.peek_nth(1).map(|t| t.kind) != Some(OF_KW) =>
                {
                    Some(BinaryOp::Mod)
                }
                _ => None,
            },
            Self::unary,
        )
    }

    fn unary(&mut self) -> Expr {
        let op = match self.peek_kind() {
            Some(HYPHEN) => UnaryOp::Minus,
            Some(TILDE) => UnaryOp::BitwiseNot,
            _ => return self.postfix(),
        };
        let Some(token) = self.tokens.bump() else {
            return Expr::Error { span: self.empty_span() };
        };
        let operand = self.nested(Self::unary);
        unary(op, token.span, operand)
    }

    fn postfix(&mut self) -> Expr {
        let mut expr = self.primary();
        let depth = self.depth;

        loop {
            let is_link = match self.peek_kind() {
                // A dot is a field access only if followed by an identifier,
                // in `0..10` it is part of a range.
                Some(DOT) => {
                    self.tokens.peek_nth(1).map(|t| t.kind) == Some(IDENT)
                }
                Some(L_BRACKET | L_PAREN) => true,
                _ => false,
            };

            if !is_link {
                break;
            }

            if self.depth >= Self::MAX_DEPTH {
                self.depth = depth;
                return self.too_deep();
            }

            self.depth += 1;

            match self.peek_kind() {
                Some(DOT) => {
                    self.tokens.bump();
                    let Some(token) = self.tokens.bump() else {
                        break;
                    };
                    let field = Ident::new(self.text(token.span), token.span);
                    expr = Expr::FieldAccess(Box::new(FieldAccess {
                        span: expr.span().combine(&field.span),
                        object: expr,
                        field,
                    }));
                }
                Some(L_BRACKET) => {
                    self.tokens.bump();
                    let index = self.expr();
                    self.expect(R_BRACKET);
                    expr = Expr::Lookup(Box::new(Lookup {
                        span: expr.span().combine(&self.empty_span()),
                        primary: expr,
                        index,
                    }));
                }
                _ => {
                    self.tokens.bump();
                    let args = self.expr_list(R_PAREN);
                    self.expect(R_PAREN);
                    expr = Expr::FuncCall(Box::new(FuncCall {
                        span: expr.span().combine(&self.empty_span()),
                        callee: expr,
                        args,
                    }));
                }
            }
        }

        self.depth = depth;
        expr
    }

    fn primary(&mut self) -> Expr {
        let token = match self.tokens.peek() {
            Some(token) => token,
            None => {
                self.unexpected("expression");
                return Expr::Error { span: self.empty_span() };
            }
        };

        let span = token.span;

        match token.kind {
            TRUE_KW => {
                self.tokens.bump();
                Expr::True { span }
            }
            FALSE_KW => {
                self.tokens.bump();
                Expr::False { span }
            }
            FILESIZE_KW => {
                self.tokens.bump();
                Expr::Filesize { span }
            }
            ENTRYPOINT_KW => {
                self.tokens.bump();
                Expr::Entrypoint { span }
            }
            INTEGER_LIT => {
                self.tokens.bump();
                Expr::LiteralInteger { span, value: self.integer(span) }
            }
            FLOAT_LIT => {
                self.tokens.bump();
                Expr::LiteralFloat { span }
            }
            STRING_LIT => {
                self.tokens.bump();
                Expr::LiteralString { span }
            }
            UNTERMINATED_STRING => {
                self.tokens.bump();
                self.report(Error::UnterminatedString { span });
                Expr::LiteralString { span }
            }
            REGEXP => {
                self.tokens.bump();
                Expr::Regexp { span }
            }
            UNTERMINATED_REGEXP => {
                self.tokens.bump();
                self.report(Error::UnterminatedRegexp { span });
                Expr::Regexp { span }
            }
            IDENT => {
                self.tokens.bump();
                Expr::Ident(Box::new(Ident::new(self.text(span), span)))
            }
            PATTERN_IDENT => {
                self.tokens.bump();
                let identifier = Ident::new(self.text(span), span);
                let anchor = self.match_anchor();
                Expr::PatternMatch(Box::new(PatternMatch { identifier, anchor }))
            }
            PATTERN_COUNT => {
                self.tokens.bump();
                let identifier = Ident::new(self.text(span), span);
                let range = if self.eat(IN_KW).is_some() {
                    Some(self.range())
                } else {
                    None
                };
                Expr::PatternCount(Box::new(IdentWithRange {
                    span: span.combine(&self.empty_span()),
                    identifier,
                    range,
                }))
            }
            PATTERN_OFFSET | PATTERN_LENGTH => {
                self.tokens.bump();
                let identifier = Ident::new(self.text(span), span);
                let index = if self.eat(L_BRACKET).is_some() {
                    let index = self.expr();
                    self.expect(R_BRACKET);
                    Some(index)
                } else {
                    None
                };
                let expr = Box::new(IdentWithIndex {
                    span: span.combine(&self.empty_span()),
                    identifier,
                    index,
                });
                if token.kind == PATTERN_OFFSET {
                    Expr::PatternOffset(expr)
                } else {
                    Expr::PatternLength(expr)
                }
            }
            L_PAREN => {
                self.tokens.bump();
                let expr = self.expr();
                self.expect(R_PAREN);
                Expr::Group {
                    span: span.combine(&self.empty_span()),
                    expr: Box::new(expr),
                }
            }
            ALL_KW | ANY_KW | NONE_KW => {
                let quantifier = self.quantifier();
                self.of_expr(quantifier)
            }
            FOR_KW => self.for_expr(),
            _ => {
                self.unexpected("expression");
                Expr::Error { span: Span::new(span.start(), span.start()) }
            }
        }
    }

    /// Parses a comma-separated list of expressions, stopping before the
    /// `end` token. The list can be empty.
    fn expr_list(&mut self, end: TokenKind) -> Vec<Expr> {
        let mut exprs = Vec::new();
        if self.check(end) {
            return exprs;
        }
        loop {
            exprs.push(self.expr());
            if self.eat(COMMA).is_none() {
                return exprs;
            }
        }
    }

    fn match_anchor(&mut self) -> Option<MatchAnchor> {
        if self.eat(AT_KW).is_some() {
            Some(MatchAnchor::At(Box::new(self.nested(Self::bitwise_or))))
        } else if self.eat(IN_KW).is_some() {
            Some(MatchAnchor::In(Box::new(self.range())))
        } else {
            None
        }
    }

    /// Parses a range like `(0..100)`.
    fn range(&mut self) -> Range {
        let start = self.tokens.peek().map_or(self.empty_span(), |t| t.span);
        self.expect(L_PAREN);
        let lower_bound = self.expr();
        self.range_dots();
        let upper_bound = self.expr();
        self.expect(R_PAREN);
        Range {
            span: start.combine(&self.empty_span()),
            lower_bound,
            upper_bound,
        }
    }

    /// Consumes the `..` in a range. They are two separate tokens that
    /// must be adjacent.
    fn range_dots(&mut self) {
        if self.eat(DOT).is_some() && self.tokens.next_is_adjacent(DOT) {
            self.tokens.bump();
        } else {
            self.unexpected("`..`");
        }
    }

    fn quantifier(&mut self) -> Quantifier {
        let token = match self.tokens.peek() {
            Some(token) => token,
            None => {
                self.unexpected("quantifier");
                return Quantifier::Expr(Expr::Error {
                    span: self.empty_span(),
                });
            }
        };

        let span = token.span;

        match token.kind {
            ALL_KW => {
                self.tokens.bump();
                Quantifier::All { span }
            }
            ANY_KW => {
                self.tokens.bump();
                Quantifier::Any { span }
            }
            NONE_KW => {
                self.tokens.bump();
                Quantifier::None { span }
            }
            _ => {
                let expr = self.nested(Self::bitwise_or);
                if self.check(PERCENT) {
                    self.tokens.bump();
                    Quantifier::Percentage(expr)
                } else {
                    Quantifier::Expr(expr)
                }
            }
        }
    }

    fn quantifier_span(&self, quantifier: &Quantifier) -> Span {
        match quantifier {
            Quantifier::None { span }
            | Quantifier::All { span }
            | Quantifier::Any { span } => *span,
            Quantifier::Percentage(expr) | Quantifier::Expr(expr) => {
                expr.span()
            }
        }
    }

    /// Parses `of <items> [at <expr> | in <range>]`, the quantifier was
    /// already parsed.
    fn of_expr(&mut self, quantifier: Quantifier) -> Expr {
        let start = self.quantifier_span(&quantifier);

        self.expect(OF_KW);

        let items = if self.check(L_PAREN)
            && self.tokens.peek_nth(1).map(|t| t.kind) != Some(PATTERN_IDENT)
        {
            self.tokens.bump();
            let mut items = Vec::new();
            loop {
                match self.tokens.peek() {
                    Some(token)
                        if token.kind == IDENT
                            && self.tokens.peek_nth(1).is_some_and(|next| {
                                next.kind == ASTERISK
                                    && next.span.start() == token.span.end()
                            }) =>
                    {
                        self.tokens.bump();
                        self.tokens.bump();
                        items.push(Expr::RuleWildcard(Box::new(Ident::new(
                            self.text(token.span),
                            token.span,
                        ))));
                    }
                    _ => items.push(self.expr()),
                }
                if self.eat(COMMA).is_none() {
                    break;
                }
            }
            self.expect(R_PAREN);
            OfItems::ExprTuple(items)
        } else {
            OfItems::PatternSet(self.pattern_set())
        };

        let anchor = self.match_anchor();

        Expr::Of(Box::new(Of {
            span: start.combine(&self.empty_span()),
            quantifier,
            items,
            anchor,
        }))
    }

    /// Parses `them` or a tuple of pattern identifiers like `($a, $b*)`.
    fn pattern_set(&mut self) -> PatternSet {
        if let Some(token) = self.eat(THEM_KW) {
            return PatternSet::Them { span: token.span };
        }

        let mut items = Vec::new();

        if self.expect(L_PAREN).is_none() {
            return PatternSet::Set(items);
        }

        loop {
            let Some(token) = self.expect(PATTERN_IDENT) else {
                break;
            };
            let wildcard = self.tokens.next_is_adjacent(ASTERISK);
            if wildcard {
                self.tokens.bump();
            }
            items.push(PatternSetItem {
                span: Span::new(token.span.start(), self.tokens.prev_end()),
                identifier: Ident::new(self.text(token.span), token.span),
                wildcard,
            });
            if self.eat(COMMA).is_none() {
                break;
            }
        }

        self.expect(R_PAREN);

        PatternSet::Set(items)
    }

    /// Parses `for .. of` and `for .. in` expressions.
    fn for_expr(&mut self) -> Expr {
        let Some(for_kw) = self.tokens.bump() else {
            return Expr::Error { span: self.empty_span() };
        };

        let quantifier = self.quantifier();

        if self.eat(OF_KW).is_some() {
            let pattern_set = self.pattern_set();
            let condition = self.for_body();
            return Expr::ForOf(Box::new(ForOf {
                span: for_kw.span.combine(&self.empty_span()),
                quantifier,
                pattern_set,
                condition,
            }));
        }

        let mut variables = Vec::new();

        loop {
            let Some(token) = self.expect(IDENT) else {
                break;
            };
            variables.push(Ident::new(self.text(token.span), token.span));
            if self.eat(COMMA).is_none() {
                break;
            }
        }

        self.expect(IN_KW);

        let iterable = self.iterable();
        let condition = self.for_body();

        Expr::ForIn(Box::new(ForIn {
            span: for_kw.span.combine(&self.empty_span()),
            quantifier,
            variables,
            iterable,
            condition,
        }))
    }

    fn iterable(&mut self) -> Iterable {
        let Some(lparen) = self.eat(L_PAREN) else {
            return Iterable::Expr(self.expr());
        };

        let first = self.expr();

        if self.check(DOT) {
            self.range_dots();
            let upper_bound = self.expr();
            self.expect(R_PAREN);
            return Iterable::Range(Range {
                span: lparen.span.combine(&self.empty_span()),
                lower_bound: first,
                upper_bound,
            });
        }

        let mut items = vec![first];

        while self.eat(COMMA).is_some() {
            items.push(self.expr());
        }

        self.expect(R_PAREN);

        Iterable::ExprTuple(items)
    }

    /// Parses `: ( <expr> )`.
    fn for_body(&mut self) -> Expr {
        self.expect(COLON);
        let start = self.tokens.peek().map_or(self.empty_span(), |t| t.span);
        self.expect(L_PAREN);
        let expr = self.expr();
        self.expect(R_PAREN);
        Expr::Group {
            span: start.combine(&self.empty_span()),
            expr: Box::new(expr),
        }
    }

    /// Returns the value of an integer literal. Invalid or overflowing
    /// literals are reported and evaluate to zero.
    fn integer(&mut self, span: Span) -> i64 {
        let literal = self.text(span);
        match parse_integer(literal) {
            Some(value) => value,
            None => {
                self.report(Error::InvalidInteger {
                    literal: literal.to_string(),
                    span,
                });
                0
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(Box::new(BinaryExpr {
        span: lhs.span().combine(&rhs.span()),
        op,
        operands: vec![lhs, rhs],
    }))
}

fn unary(op: UnaryOp, op_span: Span, operand: Expr) -> Expr {
    Expr::Unary(Box::new(UnaryExpr {
        span: op_span.combine(&operand.span()),
        op,
        operand,
    }))
}

/// Removes the surrounding quotes from a string literal.
fn unquote(literal: &str) -> &str {
    let literal = literal.strip_prefix('"').unwrap_or(literal);
    literal.strip_suffix('"').unwrap_or(literal)
}

/// Parses integer literals in the formats accepted by YARA: decimal,
/// hexadecimal (`0x`), octal (`0o`), and decimal with a `KB` or `MB`
/// suffix.
fn parse_integer(literal: &str) -> Option<i64> {
    if let Some(hex) = literal.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = literal.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(kb) = literal.strip_suffix("KB") {
        kb.parse::<i64>().ok()?.checked_mul(1024)
    } else if let Some(mb) = literal.strip_suffix("MB") {
        mb.parse::<i64>().ok()?.checked_mul(1024 * 1024)
    } else {
        literal.parse().ok()
    }
}
