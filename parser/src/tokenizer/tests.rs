use pretty_assertions::assert_eq;

use super::{Token, TokenKind, Tokenizer};
use crate::Span;

fn tokens(source: &str) -> Vec<(TokenKind, &str)> {
    let mut tokenizer = Tokenizer::new(source);
    let mut result = Vec::new();
    while let Some(token) = tokenizer.next_token() {
        result.push((token.kind, &source[token.span.range()]));
    }
    result
}

#[test]
fn keywords() {
    let mut lexer = Tokenizer::new("global rule");

    assert_eq!(
        lexer.next_token(),
        Some(Token::new(TokenKind::GLOBAL_KW, Span::new(0, 6)))
    );
    assert_eq!(
        lexer.next_token(),
        Some(Token::new(TokenKind::WHITESPACE, Span::new(6, 7)))
    );
    assert_eq!(
        lexer.next_token(),
        Some(Token::new(TokenKind::RULE_KW, Span::new(7, 11)))
    );
    assert_eq!(lexer.next_token(), None);

    let mut lexer = Tokenizer::new("globalrule");

    assert_eq!(
        lexer.next_token(),
        Some(Token::new(TokenKind::IDENT, Span::new(0, 10)))
    );
    assert_eq!(lexer.next_token(), None);
}

#[test]
fn keyword_list_is_sorted() {
    let mut sorted = super::KEYWORDS.to_vec();
    sorted.sort();
    assert_eq!(sorted, super::KEYWORDS);
    assert!(super::is_keyword("condition"));
    assert!(super::is_keyword("include"));
    assert!(!super::is_keyword("pe"));
}

#[test]
fn identifiers() {
    assert_eq!(
        tokens("foo _bar $ $_ $foo @foo #foo !foo"),
        vec![
            (TokenKind::IDENT, "foo"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::IDENT, "_bar"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::PATTERN_IDENT, "$"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::PATTERN_IDENT, "$_"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::PATTERN_IDENT, "$foo"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::PATTERN_OFFSET, "@foo"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::PATTERN_COUNT, "#foo"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::PATTERN_LENGTH, "!foo"),
        ]
    );
}

#[test]
fn numeric_literals() {
    assert_eq!(
        tokens("1 0x10 0o17 2KB 3.14"),
        vec![
            (TokenKind::INTEGER_LIT, "1"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::INTEGER_LIT, "0x10"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::INTEGER_LIT, "0o17"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::INTEGER_LIT, "2KB"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::FLOAT_LIT, "3.14"),
        ]
    );
}

#[test]
fn ranges() {
    assert_eq!(
        tokens("(0..10)"),
        vec![
            (TokenKind::L_PAREN, "("),
            (TokenKind::INTEGER_LIT, "0"),
            (TokenKind::DOT, "."),
            (TokenKind::DOT, "."),
            (TokenKind::INTEGER_LIT, "10"),
            (TokenKind::R_PAREN, ")"),
        ]
    );
}

#[test]
fn string_literals() {
    assert_eq!(
        tokens(r#""foo \"bar\"" "baz"#),
        vec![
            (TokenKind::STRING_LIT, r#""foo \"bar\"""#),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::UNTERMINATED_STRING, r#""baz"#),
        ]
    );

    assert_eq!(
        tokens("\"foo\nbar\""),
        vec![
            (TokenKind::UNTERMINATED_STRING, "\"foo"),
            (TokenKind::NEWLINE, "\n"),
            (TokenKind::IDENT, "bar"),
            (TokenKind::UNTERMINATED_STRING, "\""),
        ]
    );
}

#[test]
fn regexps() {
    assert_eq!(
        tokens(r#"/foo\/bar/is /baz"#),
        vec![
            (TokenKind::REGEXP, r#"/foo\/bar/is"#),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::UNTERMINATED_REGEXP, "/baz"),
        ]
    );
}

#[test]
fn comments() {
    assert_eq!(
        tokens("// foo\n/* bar\n baz */"),
        vec![
            (TokenKind::COMMENT, "// foo"),
            (TokenKind::NEWLINE, "\n"),
            (TokenKind::COMMENT, "/* bar\n baz */"),
        ]
    );
}

#[test]
fn unknown_tokens() {
    assert_eq!(
        tokens("foo ?bar? baz"),
        vec![
            (TokenKind::IDENT, "foo"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::UNKNOWN, "?bar?"),
            (TokenKind::WHITESPACE, " "),
            (TokenKind::IDENT, "baz"),
        ]
    );
}

#[test]
fn hex_patterns() {
    let source = "{ a0 ?? [1-2] b1 } a0";
    let mut lexer = Tokenizer::new(source);

    let next = |lexer: &mut Tokenizer| {
        lexer.next_token().map(|t| (t.kind, &source[t.span.range()]))
    };

    assert_eq!(next(&mut lexer), Some((TokenKind::L_BRACE, "{")));
    lexer.enter_hex_pattern_mode();
    assert_eq!(next(&mut lexer), Some((TokenKind::WHITESPACE, " ")));
    assert_eq!(next(&mut lexer), Some((TokenKind::HEX_BYTE, "a0")));
    assert_eq!(next(&mut lexer), Some((TokenKind::WHITESPACE, " ")));
    assert_eq!(next(&mut lexer), Some((TokenKind::HEX_BYTE, "??")));
    assert_eq!(next(&mut lexer), Some((TokenKind::WHITESPACE, " ")));
    assert_eq!(next(&mut lexer), Some((TokenKind::L_BRACKET, "[")));
    lexer.enter_hex_jump_mode();
    assert_eq!(next(&mut lexer), Some((TokenKind::INTEGER_LIT, "1")));
    assert_eq!(next(&mut lexer), Some((TokenKind::HYPHEN, "-")));
    assert_eq!(next(&mut lexer), Some((TokenKind::INTEGER_LIT, "2")));
    assert_eq!(next(&mut lexer), Some((TokenKind::R_BRACKET, "]")));
    assert_eq!(next(&mut lexer), Some((TokenKind::WHITESPACE, " ")));
    assert_eq!(next(&mut lexer), Some((TokenKind::HEX_BYTE, "b1")));
    assert_eq!(next(&mut lexer), Some((TokenKind::WHITESPACE, " ")));
    assert_eq!(next(&mut lexer), Some((TokenKind::R_BRACE, "}")));
    assert_eq!(next(&mut lexer), Some((TokenKind::WHITESPACE, " ")));
    // Back in normal mode `a0` is an identifier.
    assert_eq!(next(&mut lexer), Some((TokenKind::IDENT, "a0")));
    assert_eq!(next(&mut lexer), None);
}
