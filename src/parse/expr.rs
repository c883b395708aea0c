//! Evaluation of the single-literal expressions that appear as `ORIGIN` and
//! `LENGTH` values.

use super::lex::{Dialect, Token, TokenKind, tokenize};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use thiserror::Error;

//===========================================================================//

/// An error from evaluating a literal.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum LiteralError {
    /// The text was not a single decimal, hex, or size literal.
    #[error("not a numeric literal")]
    NotALiteral,
    /// The literal's value doesn't fit in 64 bits.
    #[error("literal value {0} is out of range")]
    OutOfRange(BigUint),
}

//===========================================================================//

/// Evaluates a numeric literal token.  Sizes are multiplied out (`4K` is
/// 4096); words and unknown tokens are not literals.
pub fn literal_value(token: &Token) -> Result<u64, LiteralError> {
    let (radix, shift): (u32, u32) = match token.kind {
        TokenKind::Decimal => (10, 0),
        TokenKind::Hex => (16, 0),
        TokenKind::SizeKb => (10, 10),
        TokenKind::SizeMb => (10, 20),
        TokenKind::SizeGb => (10, 30),
        TokenKind::Word | TokenKind::Unknown => {
            return Err(LiteralError::NotALiteral);
        }
    };
    let digits = BigUint::parse_bytes(token.text.as_bytes(), radix)
        .ok_or(LiteralError::NotALiteral)?;
    let value = digits << shift;
    match value.to_u64() {
        Some(int) => Ok(int),
        None => Err(LiteralError::OutOfRange(value)),
    }
}

/// Evaluates a literal written as text, such as a command-line argument:
/// `0x20000000`, `65536`, or `64K`.
pub fn parse_literal(text: &str) -> Result<u64, LiteralError> {
    let tokens = tokenize(text, "", Dialect::MapFile);
    match tokens.as_slice() {
        [token] => literal_value(token),
        _ => Err(LiteralError::NotALiteral),
    }
}

//===========================================================================//


//===========================================================================//
