use std::collections::VecDeque;

use crate::tokenizer::{Token, TokenKind, Tokenizer};

/// A stream of the non-trivia tokens produced by a [`Tokenizer`], with
/// support for looking ahead an arbitrary number of tokens.
pub(super) struct TokenStream<'src> {
    tokenizer: Tokenizer<'src>,
    lookahead: VecDeque<Token>,
    /// Ending offset of the last token consumed.
    prev_end: usize,
}

impl<'src> TokenStream<'src> {
    pub fn new(tokenizer: Tokenizer<'src>) -> Self {
        Self { tokenizer, lookahead: VecDeque::new(), prev_end: 0 }
    }

    /// Returns the `n`-th token ahead without consuming it.
    pub fn peek_nth(&mut self, n: usize) -> Option<Token> {
        while self.lookahead.len() <= n {
            let token = self.next_non_trivia()?;
            self.lookahead.push_back(token);
        }
        self.lookahead.get(n).copied()
    }

    /// Returns the next token without consuming it.
    #[inline]
    pub fn peek(&mut self) -> Option<Token> {
        self.peek_nth(0)
    }

    /// Returns the kind of the next token.
    #[inline]
    pub fn peek_kind(&mut self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    /// Consumes the next token.
    pub fn bump(&mut self) -> Option<Token> {
        let token = match self.lookahead.pop_front() {
            Some(token) => Some(token),
            None => self.next_non_trivia(),
        }?;
        self.prev_end = token.span.end();
        Some(token)
    }

    /// Ending offset of the last consumed token.
    #[inline]
    pub fn prev_end(&self) -> usize {
        self.prev_end
    }

    /// Returns true if the next token is of the given kind and starts right
    /// where the previous one ended, without trivia in-between.
    pub fn next_is_adjacent(&mut self, kind: TokenKind) -> bool {
        let prev_end = self.prev_end;
        self.peek()
            .is_some_and(|t| t.kind == kind && t.span.start() == prev_end)
    }

    /// See [`Tokenizer::enter_hex_pattern_mode`]. Must be called while no
    /// token is waiting in the lookahead buffer.
    pub fn enter_hex_pattern_mode(&mut self) {
        debug_assert!(self.lookahead.is_empty());
        self.tokenizer.enter_hex_pattern_mode();
    }

    /// See [`Tokenizer::enter_hex_jump_mode`]. Must be called while no
    /// token is waiting in the lookahead buffer.
    pub fn enter_hex_jump_mode(&mut self) {
        debug_assert!(self.lookahead.is_empty());
        self.tokenizer.enter_hex_jump_mode();
    }

    fn next_non_trivia(&mut self) -> Option<Token> {
        loop {
            let token = self.tokenizer.next_token()?;
            if !token.kind.is_trivia() {
                return Some(token);
            }
        }
    }
}
