//! Facilities for parsing linker scripts and link-time memory map reports.

mod atom;
mod cursor;
mod expr;
mod lex;
mod map;
mod script;
mod types;

pub use expr::{LiteralError, literal_value, parse_literal};
pub use lex::{Dialect, Token, TokenKind, TokenLexer, tokenize};
pub use map::{
    MapFileAst, SectionRecord, Symbol, SymbolFunction, SymbolsByRegion,
};
pub use script::{Constant, LinkerScriptAst, SectionDefinition};
pub use types::{MemoryRegion, ParseError, Parsed};

//===========================================================================//
