use crate::Span;

/// Each of the kinds of tokens produced by the [`super::Tokenizer`].
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    // Keywords.
    ALL_KW,
    AND_KW,
    ANY_KW,
    ASCII_KW,
    AT_KW,
    BASE64_KW,
    BASE64WIDE_KW,
    CONDITION_KW,
    CONTAINS_KW,
    DEFINED_KW,
    ENDSWITH_KW,
    ENTRYPOINT_KW,
    FALSE_KW,
    FILESIZE_KW,
    FOR_KW,
    FULLWORD_KW,
    GLOBAL_KW,
    ICONTAINS_KW,
    IENDSWITH_KW,
    IEQUALS_KW,
    IMPORT_KW,
    IN_KW,
    INCLUDE_KW,
    ISTARTSWITH_KW,
    MATCHES_KW,
    META_KW,
    NOCASE_KW,
    NONE_KW,
    NOT_KW,
    OF_KW,
    OR_KW,
    PRIVATE_KW,
    RULE_KW,
    STARTSWITH_KW,
    STRINGS_KW,
    THEM_KW,
    TRUE_KW,
    WIDE_KW,
    XOR_KW,

    // Bitwise operators.
    SHL,
    SHR,

    // Comparison operators.
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,

    // Literals.
    FLOAT_LIT,
    INTEGER_LIT,
    STRING_LIT,
    REGEXP,

    // Literals that reached the end of the line without being closed.
    UNTERMINATED_STRING,
    UNTERMINATED_REGEXP,

    // Identifiers.
    IDENT,
    PATTERN_IDENT,
    PATTERN_COUNT,
    PATTERN_OFFSET,
    PATTERN_LENGTH,

    // Punctuation.
    AMPERSAND,
    ASTERISK,
    BACKSLASH,
    CARET,
    COLON,
    COMMA,
    DOT,
    EQUAL,
    HYPHEN,
    PERCENT,
    PIPE,
    PLUS,
    TILDE,

    L_BRACE,
    R_BRACE,
    L_BRACKET,
    R_BRACKET,
    L_PAREN,
    R_PAREN,

    // Hex patterns.
    HEX_BYTE,

    // Trivia.
    COMMENT,
    NEWLINE,
    WHITESPACE,

    /// Anything that is not recognized as a valid token.
    UNKNOWN,
}

impl TokenKind {
    /// Returns the description of the token used in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            TokenKind::ALL_KW => "`all`",
            TokenKind::AND_KW => "`and`",
            TokenKind::ANY_KW => "`any`",
            TokenKind::ASCII_KW => "`ascii`",
            TokenKind::AT_KW => "`at`",
            TokenKind::BASE64_KW => "`base64`",
            TokenKind::BASE64WIDE_KW => "`base64wide`",
            TokenKind::CONDITION_KW => "`condition`",
            TokenKind::CONTAINS_KW => "`contains`",
            TokenKind::DEFINED_KW => "`defined`",
            TokenKind::ENDSWITH_KW => "`endswith`",
            TokenKind::ENTRYPOINT_KW => "`entrypoint`",
            TokenKind::FALSE_KW => "`false`",
            TokenKind::FILESIZE_KW => "`filesize`",
            TokenKind::FOR_KW => "`for`",
            TokenKind::FULLWORD_KW => "`fullword`",
            TokenKind::GLOBAL_KW => "`global`",
            TokenKind::ICONTAINS_KW => "`icontains`",
            TokenKind::IENDSWITH_KW => "`iendswith`",
            TokenKind::IEQUALS_KW => "`iequals`",
            TokenKind::IMPORT_KW => "`import`",
            TokenKind::IN_KW => "`in`",
            TokenKind::INCLUDE_KW => "`include`",
            TokenKind::ISTARTSWITH_KW => "`istartswith`",
            TokenKind::MATCHES_KW => "`matches`",
            TokenKind::META_KW => "`meta`",
            TokenKind::NOCASE_KW => "`nocase`",
            TokenKind::NONE_KW => "`none`",
            TokenKind::NOT_KW => "`not`",
            TokenKind::OF_KW => "`of`",
            TokenKind::OR_KW => "`or`",
            TokenKind::PRIVATE_KW => "`private`",
            TokenKind::RULE_KW => "`rule`",
            TokenKind::STARTSWITH_KW => "`startswith`",
            TokenKind::STRINGS_KW => "`strings`",
            TokenKind::THEM_KW => "`them`",
            TokenKind::TRUE_KW => "`true`",
            TokenKind::WIDE_KW => "`wide`",
            TokenKind::XOR_KW => "`xor`",

            TokenKind::SHL => "`<<`",
            TokenKind::SHR => "`>>`",

            TokenKind::EQ => "`==`",
            TokenKind::NE => "`!=`",
            TokenKind::LT => "`<`",
            TokenKind::LE => "`<=`",
            TokenKind::GT => "`>`",
            TokenKind::GE => "`>=`",

            TokenKind::FLOAT_LIT => "FLOAT",
            TokenKind::INTEGER_LIT => "INTEGER",
            TokenKind::STRING_LIT => "STRING",
            TokenKind::REGEXP => "REGEXP",
            TokenKind::UNTERMINATED_STRING => "unterminated string",
            TokenKind::UNTERMINATED_REGEXP => "unterminated regexp",

            TokenKind::IDENT => "identifier",
            TokenKind::PATTERN_IDENT => "pattern identifier",
            TokenKind::PATTERN_COUNT => "pattern count",
            TokenKind::PATTERN_OFFSET => "pattern offset",
            TokenKind::PATTERN_LENGTH => "pattern length",

            TokenKind::AMPERSAND => "`&`",
            TokenKind::ASTERISK => "`*`",
            TokenKind::BACKSLASH => "`\\`",
            TokenKind::CARET => "`^`",
            TokenKind::COLON => "`:`",
            TokenKind::COMMA => "`,`",
            TokenKind::DOT => "`.`",
            TokenKind::EQUAL => "`=`",
            TokenKind::HYPHEN => "`-`",
            TokenKind::PERCENT => "`%`",
            TokenKind::PIPE => "`|`",
            TokenKind::PLUS => "`+`",
            TokenKind::TILDE => "`~`",

            TokenKind::L_BRACE => "`{`",
            TokenKind::R_BRACE => "`}`",
            TokenKind::L_BRACKET => "`[`",
            TokenKind::R_BRACKET => "`]`",
            TokenKind::L_PAREN => "`(`",
            TokenKind::R_PAREN => "`)`",

            TokenKind::HEX_BYTE => "BYTE",

            TokenKind::COMMENT => "comment",
            TokenKind::NEWLINE => "newline",
            TokenKind::WHITESPACE => "whitespace",

            TokenKind::UNKNOWN => "unknown",
        }
    }

    /// Returns true if the token is irrelevant for the grammar.
    #[inline]
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            TokenKind::COMMENT | TokenKind::NEWLINE | TokenKind::WHITESPACE
        )
    }

    /// Returns true if the token is a keyword.
    pub fn is_keyword(&self) -> bool {
        (*self as u8) <= (TokenKind::XOR_KW as u8)
    }
}

/// A token produced by the [`super::Tokenizer`], together with its location
/// in the source code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
