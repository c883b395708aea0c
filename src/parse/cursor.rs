use super::lex::Token;
use super::types::ParseError;

//===========================================================================//

/// A position within a token sequence, shared by the script and map parsers.
pub(crate) struct TokenCursor {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenCursor {
    pub(crate) fn new(tokens: Vec<Token>) -> TokenCursor {
        TokenCursor { tokens, index: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.index
    }

    pub(crate) fn rewind(&mut self, position: usize) {
        debug_assert!(position <= self.tokens.len());
        self.index = position;
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset)
    }

    /// Returns the tokens from the current position to the end of input.
    pub(crate) fn remaining(&self) -> &[Token] {
        &self.tokens[self.index.min(self.tokens.len())..]
    }

    pub(crate) fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    pub(crate) fn advance_by(&mut self, count: usize) {
        self.index = (self.index + count).min(self.tokens.len());
    }

    /// Returns a description of the current token, for error messages.
    pub(crate) fn describe_current(&self) -> String {
        match self.peek() {
            Some(token) => format!(
                "{} `{}` on line {}",
                token.kind.name(),
                token.text,
                token.line
            ),
            None => "end of input".to_string(),
        }
    }

    pub(crate) fn error(&self, message: String) -> ParseError {
        ParseError::new(self.index, message)
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let found = self.describe_current();
        self.error(format!("expected {expected}, but found {found}"))
    }
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::TokenCursor;
    use crate::parse::{Dialect, tokenize};

    fn cursor(source: &str) -> TokenCursor {
        TokenCursor::new(tokenize(source, "", Dialect::MapFile))
    }

    #[test]
    fn advance_and_rewind() {
        let mut cursor = cursor("a b c");
        assert_eq!(cursor.advance().map(|t| t.text.as_str()), Some("a"));
        let mark = cursor.position();
        cursor.advance_by(5);
        assert!(cursor.is_at_end());
        assert_eq!(cursor.advance(), None);
        cursor.rewind(mark);
        assert_eq!(cursor.peek().map(|t| t.text.as_str()), Some("b"));
        assert_eq!(cursor.peek_at(1).map(|t| t.text.as_str()), Some("c"));
        assert_eq!(cursor.remaining().len(), 2);
    }

    #[test]
    fn unexpected_message() {
        let cursor = cursor("0x10");
        let error = cursor.unexpected("`:`");
        assert_eq!(error.token_index, 0);
        assert_eq!(
            error.message,
            "expected `:`, but found hex literal `10` on line 1"
        );
    }
}

//===========================================================================//
