use logos::{self, Logos};
use std::collections::VecDeque;

//===========================================================================//

#[derive(Debug, Eq, Logos, PartialEq)]
#[logos(skip r"[ \t\r\x0B\x0C]+")] // whitespace other than newlines
enum Chunk {
    #[token("\n")]
    Linebreak,
    #[regex(r"[^ \t\r\n\x0B\x0C]+")]
    Text,
}

#[derive(Clone, Copy, Debug, Eq, Logos, PartialEq)]
enum Literal {
    #[regex(r"[0-9]+[Gg]")]
    SizeGb,
    #[regex(r"[0-9]+[Mm]")]
    SizeMb,
    #[regex(r"[0-9]+[Kk]")]
    SizeKb,
    #[regex(r"0x[0-9A-Fa-f]+")]
    Hex,
    #[regex(r"[0-9]+")]
    Decimal,
}

impl Literal {
    /// Classifies an entire chunk of text, returning `None` unless exactly
    /// one literal spans all of it.
    fn classify(text: &str) -> Option<Literal> {
        let mut lexer = Literal::lexer(text);
        match (lexer.next(), lexer.next()) {
            (Some(Ok(literal)), None) => Some(literal),
            _ => None,
        }
    }

    fn token_kind(self) -> TokenKind {
        match self {
            Literal::SizeGb => TokenKind::SizeGb,
            Literal::SizeMb => TokenKind::SizeMb,
            Literal::SizeKb => TokenKind::SizeKb,
            Literal::Hex => TokenKind::Hex,
            Literal::Decimal => TokenKind::Decimal,
        }
    }

    /// Returns the digits of a chunk that was classified as this literal,
    /// without any prefix or suffix.
    fn digits(self, text: &str) -> &str {
        match self {
            Literal::Hex => &text[2..],
            Literal::Decimal => text,
            Literal::SizeGb | Literal::SizeMb | Literal::SizeKb => {
                &text[..text.len() - 1]
            }
        }
    }
}

fn strip_leading_zeros(digits: &str) -> &str {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() { "0" } else { stripped }
}

/// Removes one trailing character that can't be part of a word, so that
/// e.g. `0x20000000,` still reads as a hex literal.
fn trim_trailing_punct(chunk: &str) -> &str {
    match chunk.chars().next_back() {
        Some(chr) if !(chr.is_ascii_alphanumeric() || chr == '_') => {
            &chunk[..chunk.len() - chr.len_utf8()]
        }
        _ => chunk,
    }
}

//===========================================================================//

/// The kind of a single lexical token.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TokenKind {
    /// Any chunk that isn't a numeric literal: identifiers, keywords,
    /// punctuation, paths.
    Word,
    /// A decimal integer literal.
    Decimal,
    /// A `0x`-prefixed hexadecimal integer literal.
    Hex,
    /// A size in kibibytes, e.g. `128K`.
    SizeKb,
    /// A size in mebibytes, e.g. `2M`.
    SizeMb,
    /// A size in gibibytes, e.g. `1G`.
    SizeGb,
    /// A kind outside the recognized set.  The lexer never produces this,
    /// but token streams built by other means may contain it.
    Unknown,
}

impl TokenKind {
    /// Returns true for every kind that the lexer can produce.
    pub fn is_recognized(self) -> bool {
        !matches!(self, TokenKind::Unknown)
    }

    /// Returns true for the numeric literal kinds.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TokenKind::Decimal
                | TokenKind::Hex
                | TokenKind::SizeKb
                | TokenKind::SizeMb
                | TokenKind::SizeGb
        )
    }

    /// Returns the human-readable name for this kind of token.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Word => "word",
            TokenKind::Decimal => "decimal literal",
            TokenKind::Hex => "hex literal",
            TokenKind::SizeKb => "KB size",
            TokenKind::SizeMb => "MB size",
            TokenKind::SizeGb => "GB size",
            TokenKind::Unknown => "unknown token",
        }
    }
}

//===========================================================================//

/// A single lexical token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// For words, the original text of the chunk.  For numeric literals, the
    /// digits only, with leading zeros stripped (and uppercased, for hex).
    pub text: String,
    /// The line of the source file on which the token appears, starting
    /// from 1.
    pub line: u32,
}

impl Token {
    /// Constructs a new token.
    pub fn new(kind: TokenKind, text: &str, line: u32) -> Token {
        Token { kind, text: text.to_string(), line }
    }

    /// Constructs a word token.
    pub fn word(text: &str, line: u32) -> Token {
        Token::new(TokenKind::Word, text, line)
    }

    /// Returns true if this is a word token with exactly the given text.
    pub fn is_word(&self, text: &str) -> bool {
        self.kind == TokenKind::Word && self.text == text
    }

    /// Returns true if this is a word token matching the given text, ignoring
    /// ASCII case.
    pub fn is_keyword(&self, text: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(text)
    }

    fn classify(chunk: &str, line: u32) -> Token {
        let trimmed = trim_trailing_punct(chunk);
        match Literal::classify(trimmed) {
            Some(literal) => {
                let digits = strip_leading_zeros(literal.digits(trimmed));
                let text = if literal == Literal::Hex {
                    digits.to_ascii_uppercase()
                } else {
                    digits.to_string()
                };
                Token { kind: literal.token_kind(), text, line }
            }
            None => Token::word(chunk, line),
        }
    }
}

//===========================================================================//

/// Which document format is being tokenized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    /// A linker-control script.  Chunks containing `>` are split apart so
    /// that e.g. `}>RAM` reads as `}`, `>`, `RAM`.
    LinkerScript,
    /// A link-time memory map report.  Chunks are never split.
    MapFile,
}

impl Dialect {
    /// Returns the marker string after which tokenization conventionally
    /// begins for this dialect.
    pub const fn default_starter(self) -> &'static str {
        match self {
            Dialect::LinkerScript => "ENTRY",
            Dialect::MapFile => "Memory Configuration",
        }
    }
}

//===========================================================================//

/// A lexer for tokenizing the text that follows a starter marker in a
/// linker script or map file.
pub struct TokenLexer<'a> {
    chunks: logos::Lexer<'a, Chunk>,
    line: u32,
    dialect: Dialect,
    pending: VecDeque<Token>,
}

impl<'a> TokenLexer<'a> {
    /// Constructs a lexer over the text following the first occurrence of
    /// `starter` in `source`.  If `starter` doesn't occur, the lexer yields
    /// no tokens.  An empty `starter` selects the whole source.
    pub fn new(source: &'a str, starter: &str, dialect: Dialect) -> Self {
        let (text, line) = match source.find(starter) {
            Some(index) => {
                let line = source[..index].matches('\n').count() + 1;
                (&source[index + starter.len()..], line as u32)
            }
            None => ("", 1),
        };
        TokenLexer {
            chunks: Chunk::lexer(text),
            line,
            dialect,
            pending: VecDeque::new(),
        }
    }

    fn split_placement(&mut self, chunk: &str) {
        for (index, side) in chunk.split('>').enumerate() {
            if index > 0 {
                self.pending.push_back(Token::word(">", self.line));
            }
            if !side.is_empty() {
                self.pending.push_back(Token::classify(side, self.line));
            }
        }
    }
}

impl Iterator for TokenLexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            match self.chunks.next()? {
                Ok(Chunk::Linebreak) => self.line += 1,
                Ok(Chunk::Text) => {
                    let chunk = self.chunks.slice();
                    if self.dialect == Dialect::LinkerScript
                        && chunk != ">"
                        && chunk.contains('>')
                    {
                        self.split_placement(chunk);
                    } else {
                        return Some(Token::classify(chunk, self.line));
                    }
                }
                Err(()) => {}
            }
        }
    }
}

impl std::iter::FusedIterator for TokenLexer<'_> {}

/// Tokenizes the text following `starter` in `source`.
pub fn tokenize(source: &str, starter: &str, dialect: Dialect) -> Vec<Token> {
    TokenLexer::new(source, starter, dialect).collect()
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{Dialect, Token, TokenKind, tokenize};

    fn read_all(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input, "", Dialect::LinkerScript)
            .into_iter()
            .map(|token| (token.kind, token.text))
            .collect()
    }

    fn tok(kind: TokenKind, text: &str) -> (TokenKind, String) {
        (kind, text.to_string())
    }

    #[test]
    fn empty_input() {
        assert_eq!(read_all(""), vec![]);
        assert_eq!(read_all(" \t\r\n  \n"), vec![]);
    }

    #[test]
    fn missing_starter() {
        let tokens = tokenize("MEMORY { }", "ENTRY", Dialect::LinkerScript);
        assert!(tokens.is_empty());
    }

    #[test]
    fn text_before_starter_is_ignored() {
        let source = "/* banner */\nMEMORY\nENTRY(Reset_Handler)\n_x = 1;";
        let tokens = tokenize(source, "ENTRY", Dialect::LinkerScript);
        assert_eq!(tokens[0], Token::word("(Reset_Handler)", 3));
        assert_eq!(tokens[1], Token::word("_x", 4));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn decimal_leading_zeros() {
        assert_eq!(read_all("00042"), vec![tok(TokenKind::Decimal, "42")]);
        assert_eq!(read_all("000"), vec![tok(TokenKind::Decimal, "0")]);
        assert_eq!(read_all("7"), vec![tok(TokenKind::Decimal, "7")]);
    }

    #[test]
    fn hex_literals() {
        assert_eq!(
            read_all("0x00020000 0xdeadBEEF 0x0"),
            vec![
                tok(TokenKind::Hex, "20000"),
                tok(TokenKind::Hex, "DEADBEEF"),
                tok(TokenKind::Hex, "0"),
            ]
        );
    }

    #[test]
    fn size_literals() {
        assert_eq!(
            read_all("128K 2m 001G 4k"),
            vec![
                tok(TokenKind::SizeKb, "128"),
                tok(TokenKind::SizeMb, "2"),
                tok(TokenKind::SizeGb, "1"),
                tok(TokenKind::SizeKb, "4"),
            ]
        );
    }

    #[test]
    fn trailing_punctuation_is_trimmed_from_literals() {
        assert_eq!(
            read_all("0x08000000, 512K; 10,"),
            vec![
                tok(TokenKind::Hex, "8000000"),
                tok(TokenKind::SizeKb, "512"),
                tok(TokenKind::Decimal, "10"),
            ]
        );
    }

    #[test]
    fn words_keep_original_text() {
        assert_eq!(
            read_all("FLASH (rx) : ORIGIN, ; 0x 12KB"),
            vec![
                tok(TokenKind::Word, "FLASH"),
                tok(TokenKind::Word, "(rx)"),
                tok(TokenKind::Word, ":"),
                tok(TokenKind::Word, "ORIGIN,"),
                tok(TokenKind::Word, ";"),
                tok(TokenKind::Word, "0x"),
                tok(TokenKind::Word, "12KB"),
            ]
        );
    }

    #[test]
    fn script_splits_placement_arrow() {
        assert_eq!(
            read_all("}>RAM AT>FLASH > >RAM2"),
            vec![
                tok(TokenKind::Word, "}"),
                tok(TokenKind::Word, ">"),
                tok(TokenKind::Word, "RAM"),
                tok(TokenKind::Word, "AT"),
                tok(TokenKind::Word, ">"),
                tok(TokenKind::Word, "FLASH"),
                tok(TokenKind::Word, ">"),
                tok(TokenKind::Word, ">"),
                tok(TokenKind::Word, "RAM2"),
            ]
        );
    }

    #[test]
    fn map_does_not_split_placement_arrow() {
        let tokens = tokenize("}>RAM", "", Dialect::MapFile);
        assert_eq!(tokens, vec![Token::word("}>RAM", 1)]);
    }

    #[test]
    fn line_numbers() {
        let tokens = tokenize("a\n\nb c\nd", "", Dialect::MapFile);
        let lines: Vec<u32> = tokens.iter().map(|token| token.line).collect();
        assert_eq!(lines, vec![1, 3, 3, 4]);
    }

    #[test]
    fn every_lexed_kind_is_recognized() {
        let tokens = tokenize(
            "MEMORY { RAM (xrw) : ORIGIN = 0x20000000, LENGTH = 128K }",
            "",
            Dialect::LinkerScript,
        );
        assert!(tokens.iter().all(|token| token.kind.is_recognized()));
        assert!(!TokenKind::Unknown.is_recognized());
    }
}

//===========================================================================//
