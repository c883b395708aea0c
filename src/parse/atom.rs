use super::lex::{Token, TokenKind};
use chumsky::{self, Parser};

//===========================================================================//

/// The error type used for `chumsky::Parser`s in this crate.
pub(crate) type PError<'a> =
    chumsky::extra::Err<chumsky::error::Rich<'a, Token>>;

/// The most tokens that any row shape looks at.
pub(crate) const MAX_ROW_TOKENS: usize = 6;

//===========================================================================//

pub(crate) fn kind<'a>(
    kind: TokenKind,
) -> impl Parser<'a, &'a [Token], Token, PError<'a>> + Clone {
    chumsky::prelude::any().filter(move |token: &Token| token.kind == kind)
}

pub(crate) fn keyword<'a>(
    word: &'static str,
) -> impl Parser<'a, &'a [Token], Token, PError<'a>> + Clone {
    chumsky::prelude::any()
        .filter(move |token: &Token| token.is_keyword(word))
}

pub(crate) fn hex<'a>()
-> impl Parser<'a, &'a [Token], Token, PError<'a>> + Clone {
    kind(TokenKind::Hex)
}

pub(crate) fn word<'a>()
-> impl Parser<'a, &'a [Token], Token, PError<'a>> + Clone {
    kind(TokenKind::Word)
}

//===========================================================================//

/// A row of the "Linker script and memory map" listing, as recognized from
/// its token shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum RowShape {
    /// `word hex hex hex`, or `word hex hex load address hex`.
    Section {
        name: Token,
        address: Token,
        size: Token,
        load_address: Option<Token>,
    },
    /// `word hex hex word hex`: an input section with its object file,
    /// followed by the address of the function it defines.
    Symbol {
        name: Token,
        address: Token,
        size: Token,
        object_file: Token,
        function_address: Token,
    },
}

impl RowShape {
    /// Returns the number of tokens that make up this row.
    pub(crate) fn token_count(&self) -> usize {
        match self {
            RowShape::Section { load_address: None, .. } => 4,
            RowShape::Section { load_address: Some(_), .. } => 6,
            RowShape::Symbol { .. } => 5,
        }
    }

    /// Recognizes a row at the start of `tokens`, if there is one.
    pub(crate) fn recognize(tokens: &[Token]) -> Option<RowShape> {
        let window = &tokens[..tokens.len().min(MAX_ROW_TOKENS)];
        RowShape::parser()
            .then_ignore(chumsky::prelude::any().repeated())
            .parse(window)
            .into_output()
    }

    fn parser<'a>() -> impl Parser<'a, &'a [Token], RowShape, PError<'a>> {
        let load_address = keyword("load")
            .ignore_then(keyword("address"))
            .ignore_then(hex());
        let section = word()
            .then(hex())
            .then(hex())
            .then(hex().to(None).or(load_address.map(Some)))
            .map(|(((name, address), size), load_address)| {
                RowShape::Section { name, address, size, load_address }
            });
        let symbol = word()
            .then(hex())
            .then(hex())
            .then(word())
            .then(hex())
            .map(|((((name, address), size), object_file), function)| {
                RowShape::Symbol {
                    name,
                    address,
                    size,
                    object_file,
                    function_address: function,
                }
            });
        chumsky::prelude::choice((section, symbol))
    }
}

/// Returns true if `tokens` begins with something that looks like the start
/// of a listing row: a word followed by two hex literals.
pub(crate) fn starts_row(tokens: &[Token]) -> bool {
    matches!(
        tokens,
        [first, second, third, ..]
            if first.kind == TokenKind::Word
                && second.kind == TokenKind::Hex
                && third.kind == TokenKind::Hex
    )
}

//===========================================================================//


//===========================================================================//
