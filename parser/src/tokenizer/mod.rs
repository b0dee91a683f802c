/*! Implements the YARA tokenizer.

The tokenizer takes YARA source code and produces a sequence of [`Token`]s
that is later processed by the parser. Trivia, like whitespaces, newlines
and comments, are also returned as tokens, the parser decides what to do
with them.
*/

use logos::Logos;

use crate::Span;

mod tokens;

pub use tokens::Token;
pub use tokens::TokenKind;

#[cfg(test)]
mod tests;

/// Reserved words in YARA. None of them can be used as a rule identifier.
pub const KEYWORDS: &[&str] = &[
    "all",
    "and",
    "any",
    "ascii",
    "at",
    "base64",
    "base64wide",
    "condition",
    "contains",
    "defined",
    "endswith",
    "entrypoint",
    "false",
    "filesize",
    "for",
    "fullword",
    "global",
    "icontains",
    "iendswith",
    "iequals",
    "import",
    "in",
    "include",
    "istartswith",
    "matches",
    "meta",
    "nocase",
    "none",
    "not",
    "of",
    "or",
    "private",
    "rule",
    "startswith",
    "strings",
    "them",
    "true",
    "wide",
    "xor",
];

/// Returns true if `word` is a reserved keyword.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.binary_search(&word).is_ok()
}

/// Takes YARA source code and produces a sequence of tokens.
///
/// The tokenizer has three modes of operation: normal mode, hex pattern mode,
/// and hex jump mode.
///
/// Certain inputs have different meanings depending on the mode. Outside a
/// hex pattern `a0` is an identifier; inside, it's a byte literal. The
/// tokenizer can't tell by itself whether it is inside a hex pattern, so
/// the parser must call [`Tokenizer::enter_hex_pattern_mode`] right after
/// consuming the opening brace (`{`) of a hex pattern. The tokenizer goes
/// back to normal mode by itself when it finds something that can't appear
/// in a hex pattern, like the closing brace (`}`). Jumps work in the same
/// way: the parser calls [`Tokenizer::enter_hex_jump_mode`] after the
/// opening bracket (`[`), and the tokenizer returns to hex pattern mode
/// when it finds the closing bracket (`]`).
pub struct Tokenizer<'src> {
    source: &'src str,
    mode: Mode<'src>,
    /// Absolute offset within the source code where the current lexer
    /// started. Spans reported by the lexer are relative to this point.
    lexer_starting_pos: usize,
}

impl<'src> Tokenizer<'src> {
    /// Creates a new [`Tokenizer`].
    pub fn new(source: &'src str) -> Self {
        // Can't handle source files greater than the maximum span size.
        assert!(source.len() < Span::MAX);
        Self {
            source,
            lexer_starting_pos: 0,
            mode: Mode::Normal(NormalToken::lexer(source)),
        }
    }

    /// Returns the source code passed to the tokenizer.
    #[inline]
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Returns the next token.
    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            match &mut self.mode {
                Mode::Normal(lexer) => {
                    return match lexer.next()? {
                        Ok(token) => Some(Token::new(
                            token.kind(),
                            Span::from(lexer.span())
                                .offset(self.lexer_starting_pos),
                        )),
                        Err(()) => Some(self.unexpected_token()),
                    }
                }
                Mode::HexPattern(lexer) => match lexer.next()? {
                    Ok(token) => {
                        return Some(Token::new(
                            token.kind(),
                            Span::from(lexer.span())
                                .offset(self.lexer_starting_pos),
                        ))
                    }
                    Err(()) => {
                        // Found something that can't appear in a hex
                        // pattern, switch back to normal mode and try again
                        // starting at the same position.
                        self.lexer_starting_pos += lexer.span().start;
                        self.mode = Mode::Normal(NormalToken::lexer(
                            &self.source[self.lexer_starting_pos..],
                        ));
                    }
                },
                Mode::HexJump(lexer) => match lexer.next()? {
                    Ok(token) => {
                        return Some(Token::new(
                            token.kind(),
                            Span::from(lexer.span())
                                .offset(self.lexer_starting_pos),
                        ))
                    }
                    Err(()) => {
                        self.lexer_starting_pos += lexer.span().start;
                        self.mode = Mode::HexPattern(HexPatternToken::lexer(
                            &self.source[self.lexer_starting_pos..],
                        ));
                    }
                },
            }
        }
    }

    /// Switches the tokenizer to hex pattern operation mode.
    ///
    /// The parser must invoke this function right after processing the
    /// opening brace (`{`) of a hex pattern. If the tokenizer is not in
    /// normal mode this does nothing.
    pub fn enter_hex_pattern_mode(&mut self) {
        if let Mode::Normal(lexer) = &self.mode {
            self.lexer_starting_pos += lexer.span().end;
            self.mode = Mode::HexPattern(HexPatternToken::lexer(
                &self.source[self.lexer_starting_pos..],
            ));
        }
    }

    /// Switches the tokenizer to hex jump operation mode.
    ///
    /// The parser must invoke this function right after processing the
    /// opening bracket (`[`) of a hex jump. If the tokenizer is not in hex
    /// pattern mode this does nothing.
    pub fn enter_hex_jump_mode(&mut self) {
        if let Mode::HexPattern(lexer) = &self.mode {
            self.lexer_starting_pos += lexer.span().end;
            self.mode = Mode::HexJump(HexJumpToken::lexer(
                &self.source[self.lexer_starting_pos..],
            ));
        }
    }
}

impl<'src> Tokenizer<'src> {
    /// Produces an [`TokenKind::UNKNOWN`] token that covers everything from
    /// the current position up to the next whitespace.
    fn unexpected_token(&mut self) -> Token {
        let lexer = match &mut self.mode {
            Mode::Normal(lexer) => lexer,
            // This function is called only in normal mode.
            _ => unreachable!(),
        };

        let start = lexer.span().start;
        let unexpected = lexer.source()[start..]
            .split(char::is_whitespace)
            .next()
            .unwrap_or_default();

        // If `unexpected` is larger than the current token, bump the lexer
        // to the end of `unexpected`.
        lexer.bump(unexpected.len().saturating_sub(lexer.span().len()));

        Token::new(
            TokenKind::UNKNOWN,
            Span::from(lexer.span()).offset(self.lexer_starting_pos),
        )
    }
}

/// Describes the current mode of operation for a tokenizer.
///
/// [`Tokenizer`] uses three different logos lexers, one for each of the
/// modes of operation.
enum Mode<'src> {
    Normal(logos::Lexer<'src, NormalToken>),
    HexPattern(logos::Lexer<'src, HexPatternToken>),
    HexJump(logos::Lexer<'src, HexJumpToken>),
}

/// Tokens recognized in normal mode.
#[derive(logos::Logos, Debug, PartialEq)]
enum NormalToken {
    // Keywords
    #[token("all")]
    All,
    #[token("and")]
    And,
    #[token("any")]
    Any,
    #[token("ascii")]
    Ascii,
    #[token("at")]
    At,
    #[token("base64")]
    Base64,
    #[token("base64wide")]
    Base64Wide,
    #[token("condition")]
    Condition,
    #[token("contains")]
    Contains,
    #[token("defined")]
    Defined,
    #[token("endswith")]
    EndsWith,
    #[token("entrypoint")]
    Entrypoint,
    #[token("false")]
    False,
    #[token("filesize")]
    Filesize,
    #[token("for")]
    For,
    #[token("fullword")]
    Fullword,
    #[token("global")]
    Global,
    #[token("icontains")]
    IContains,
    #[token("iendswith")]
    IEndsWith,
    #[token("iequals")]
    IEquals,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("include")]
    Include,
    #[token("istartswith")]
    IStartsWith,
    #[token("matches")]
    Matches,
    #[token("meta")]
    Meta,
    #[token("nocase")]
    Nocase,
    #[token("none")]
    None,
    #[token("not")]
    Not,
    #[token("of")]
    Of,
    #[token("or")]
    Or,
    #[token("private")]
    Private,
    #[token("rule")]
    Rule,
    #[token("startswith")]
    StartsWith,
    #[token("strings")]
    Strings,
    #[token("them")]
    Them,
    #[token("true")]
    True,
    #[token("wide")]
    Wide,
    #[token("xor")]
    Xor,

    // Bitwise
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,

    // Comparison
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Punctuation
    #[token("&")]
    Ampersand,
    #[token("*")]
    Asterisk,
    #[token("\\")]
    Backslash,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("=")]
    Equal,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("%")]
    Percent,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // Pattern identifiers (i.e: $, $a, $b, $foo, $bar).
    #[regex(r"\$([[:alpha:]]|\d|_)*")]
    PatternIdent,

    // Pattern count (i.e: #a, #b, #foo, #bar).
    #[regex(r"#([[:alpha:]]|\d|_)*")]
    PatternCount,

    // Pattern offset (i.e: @a, @b, @foo, @bar).
    #[regex(r"@([[:alpha:]]|\d|_)*")]
    PatternOffset,

    // Pattern length (i.e: !a, !b, !foo, !bar).
    #[regex(r"!([[:alpha:]]|\d|_)*")]
    PatternLength,

    // Identifiers must start with underscore or letter, followed by any
    // number of underscores, letters, or digits.
    #[regex(r"([[:alpha:]]|_)([[:alpha:]]|\d|_)*")]
    Ident,

    #[regex(r"[0-9]+\.[0-9]+")]
    FloatLit,

    #[regex(
        r#"(?x)
           (
             0x[a-fA-F0-9]+ |           # hexadecimal number
             0o[0-7]+       |           # octal number
             [0-9]+(KB|MB)?             # decimal number followed by optional KB or MB
           )
        "#)
    ]
    IntegerLit,

    // String literals start and end with double quotes, in-between the
    // quotes they contain either an escape sequence, or anything that is not
    // a quote, newline or backslash.
    #[regex(
        r#"(?x)
        "                               # starts with double quotes
        (
          \\.                           #   escape sequence
          |
          [^"\n\\]                      #   anything except quotes, newlines and backslashes
        )*
        "                               # ends with double quotes
        "#)
    ]
    StringLit,

    // Same as above, but without the closing quotes. As logos picks the
    // longest match, this only wins when the closing quotes are missing.
    #[regex(r#""(\\.|[^"\n\\])*"#)]
    UnterminatedStringLit,

    #[regex(
        r#"(?x)
        /                               # starts with /
        (\\.|[^*/\\\n])                 # followed by escape sequence or anything that
                                        # is not * or /, this prevents collisions with
                                        # comments.
        (
          \\.                           #   escape sequence
          |
          [^\\/\n]                      #   anything except \, / and newlines
        )*
        /                               # ends with /
        [[:alpha:]]{0,2}                # up to 2 optional modifiers like "s" and "i"
        "#)
    ]
    Regexp,

    #[regex(r"/(\\.|[^*/\\\n])(\\.|[^\\/\n])*")]
    UnterminatedRegexp,

    #[regex(
        r#"(?x)
        /\*                            # starts with /*
        [^*]*                          # zero or more characters except *
        \*+                            # one or more *
        (
            [^/*]                      #   anything except / and *
            [^*]*                      #   zero or more characters except *
            \*+                        #   one or more *
        )*
        /                              # ends with /
        "#
    )]
    BlockComment,

    #[regex(r#"//[^\n]*"#)]
    Comment,

    #[regex("[ \t]+")]
    Whitespace,

    #[token("\n")]
    LF,

    #[token("\r")]
    CR,

    #[token("\r\n")]
    CRLF,
}

impl NormalToken {
    fn kind(&self) -> TokenKind {
        match self {
            NormalToken::All => TokenKind::ALL_KW,
            NormalToken::And => TokenKind::AND_KW,
            NormalToken::Any => TokenKind::ANY_KW,
            NormalToken::Ascii => TokenKind::ASCII_KW,
            NormalToken::At => TokenKind::AT_KW,
            NormalToken::Base64 => TokenKind::BASE64_KW,
            NormalToken::Base64Wide => TokenKind::BASE64WIDE_KW,
            NormalToken::Condition => TokenKind::CONDITION_KW,
            NormalToken::Contains => TokenKind::CONTAINS_KW,
            NormalToken::Defined => TokenKind::DEFINED_KW,
            NormalToken::EndsWith => TokenKind::ENDSWITH_KW,
            NormalToken::Entrypoint => TokenKind::ENTRYPOINT_KW,
            NormalToken::False => TokenKind::FALSE_KW,
            NormalToken::Filesize => TokenKind::FILESIZE_KW,
            NormalToken::For => TokenKind::FOR_KW,
            NormalToken::Fullword => TokenKind::FULLWORD_KW,
            NormalToken::Global => TokenKind::GLOBAL_KW,
            NormalToken::IContains => TokenKind::ICONTAINS_KW,
            NormalToken::IEndsWith => TokenKind::IENDSWITH_KW,
            NormalToken::IEquals => TokenKind::IEQUALS_KW,
            NormalToken::Import => TokenKind::IMPORT_KW,
            NormalToken::In => TokenKind::IN_KW,
            NormalToken::Include => TokenKind::INCLUDE_KW,
            NormalToken::IStartsWith => TokenKind::ISTARTSWITH_KW,
            NormalToken::Matches => TokenKind::MATCHES_KW,
            NormalToken::Meta => TokenKind::META_KW,
            NormalToken::Nocase => TokenKind::NOCASE_KW,
            NormalToken::None => TokenKind::NONE_KW,
            NormalToken::Not => TokenKind::NOT_KW,
            NormalToken::Of => TokenKind::OF_KW,
            NormalToken::Or => TokenKind::OR_KW,
            NormalToken::Private => TokenKind::PRIVATE_KW,
            NormalToken::Rule => TokenKind::RULE_KW,
            NormalToken::StartsWith => TokenKind::STARTSWITH_KW,
            NormalToken::Strings => TokenKind::STRINGS_KW,
            NormalToken::Them => TokenKind::THEM_KW,
            NormalToken::True => TokenKind::TRUE_KW,
            NormalToken::Wide => TokenKind::WIDE_KW,
            NormalToken::Xor => TokenKind::XOR_KW,

            NormalToken::Shl => TokenKind::SHL,
            NormalToken::Shr => TokenKind::SHR,

            NormalToken::Eq => TokenKind::EQ,
            NormalToken::Ne => TokenKind::NE,
            NormalToken::Lt => TokenKind::LT,
            NormalToken::Gt => TokenKind::GT,
            NormalToken::Le => TokenKind::LE,
            NormalToken::Ge => TokenKind::GE,

            NormalToken::Ampersand => TokenKind::AMPERSAND,
            NormalToken::Asterisk => TokenKind::ASTERISK,
            NormalToken::Backslash => TokenKind::BACKSLASH,
            NormalToken::Caret => TokenKind::CARET,
            NormalToken::Comma => TokenKind::COMMA,
            NormalToken::Colon => TokenKind::COLON,
            NormalToken::Dot => TokenKind::DOT,
            NormalToken::Equal => TokenKind::EQUAL,
            NormalToken::Minus => TokenKind::HYPHEN,
            NormalToken::Percent => TokenKind::PERCENT,
            NormalToken::Pipe => TokenKind::PIPE,
            NormalToken::Plus => TokenKind::PLUS,
            NormalToken::Tilde => TokenKind::TILDE,

            NormalToken::LBrace => TokenKind::L_BRACE,
            NormalToken::RBrace => TokenKind::R_BRACE,
            NormalToken::LParen => TokenKind::L_PAREN,
            NormalToken::RParen => TokenKind::R_PAREN,
            NormalToken::LBracket => TokenKind::L_BRACKET,
            NormalToken::RBracket => TokenKind::R_BRACKET,

            NormalToken::PatternIdent => TokenKind::PATTERN_IDENT,
            NormalToken::PatternCount => TokenKind::PATTERN_COUNT,
            NormalToken::PatternOffset => TokenKind::PATTERN_OFFSET,
            NormalToken::PatternLength => TokenKind::PATTERN_LENGTH,
            NormalToken::Ident => TokenKind::IDENT,

            NormalToken::FloatLit => TokenKind::FLOAT_LIT,
            NormalToken::IntegerLit => TokenKind::INTEGER_LIT,
            NormalToken::StringLit => TokenKind::STRING_LIT,
            NormalToken::UnterminatedStringLit => {
                TokenKind::UNTERMINATED_STRING
            }
            NormalToken::Regexp => TokenKind::REGEXP,
            NormalToken::UnterminatedRegexp => TokenKind::UNTERMINATED_REGEXP,

            NormalToken::BlockComment | NormalToken::Comment => {
                TokenKind::COMMENT
            }
            NormalToken::Whitespace => TokenKind::WHITESPACE,
            NormalToken::LF | NormalToken::CR | NormalToken::CRLF => {
                TokenKind::NEWLINE
            }
        }
    }
}

/// Tokens recognized in hex pattern mode.
#[derive(logos::Logos, Debug, PartialEq)]
enum HexPatternToken {
    // A hex byte is an optional tilde ~, followed by two hex digits or
    // question marks. For instance: 10, A0, ef, 3?, ?3, ??, ~AB, ~A?
    #[regex("~?[?0-9a-fA-F]{2}")]
    Byte,

    #[token("|")]
    Pipe,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[regex("[ \t]+")]
    Whitespace,

    #[token("\n")]
    LF,

    #[token("\r")]
    CR,

    #[token("\r\n")]
    CRLF,

    #[regex(r"/\*([^*]|\*[^/])*\*/")]
    BlockComment,

    #[regex(r#"//[^\n]*"#)]
    Comment,
}

impl HexPatternToken {
    fn kind(&self) -> TokenKind {
        match self {
            HexPatternToken::Byte => TokenKind::HEX_BYTE,
            HexPatternToken::Pipe => TokenKind::PIPE,
            HexPatternToken::LParen => TokenKind::L_PAREN,
            HexPatternToken::RParen => TokenKind::R_PAREN,
            HexPatternToken::LBracket => TokenKind::L_BRACKET,
            HexPatternToken::RBracket => TokenKind::R_BRACKET,
            HexPatternToken::Whitespace => TokenKind::WHITESPACE,
            HexPatternToken::LF | HexPatternToken::CR | HexPatternToken::CRLF => {
                TokenKind::NEWLINE
            }
            HexPatternToken::BlockComment | HexPatternToken::Comment => {
                TokenKind::COMMENT
            }
        }
    }
}

/// Tokens recognized in hex jump mode.
#[derive(logos::Logos, Debug, PartialEq)]
enum HexJumpToken {
    #[token("-")]
    Hyphen,

    #[regex("0x[a-fA-F0-9]+|0o[0-7]+|[0-9]+")]
    IntegerLit,

    #[regex("[ \t]+")]
    Whitespace,

    #[token("\n")]
    LF,

    #[token("\r")]
    CR,

    #[token("\r\n")]
    CRLF,
}

impl HexJumpToken {
    fn kind(&self) -> TokenKind {
        match self {
            HexJumpToken::Hyphen => TokenKind::HYPHEN,
            HexJumpToken::IntegerLit => TokenKind::INTEGER_LIT,
            HexJumpToken::Whitespace => TokenKind::WHITESPACE,
            HexJumpToken::LF | HexJumpToken::CR | HexJumpToken::CRLF => {
                TokenKind::NEWLINE
            }
        }
    }
}
