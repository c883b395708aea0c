use crate::addr::Range;
use std::fmt;

//===========================================================================//

/// A non-fatal error encountered while parsing a linker script or map file.
///
/// Parsers never stop at the first error; they record it and resynchronize,
/// so a document may yield both a partial AST and a list of these.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseError {
    /// The index, within the document's token sequence, of the token at
    /// which the error was detected.  This may equal the number of tokens if
    /// the error was an unexpected end of input.
    pub token_index: usize,
    /// The error message to report to the user.
    pub message: String,
}

impl ParseError {
    /// Constructs a parse error at the given token index.
    pub fn new(token_index: usize, message: String) -> ParseError {
        ParseError { token_index, message }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token {}: {}", self.token_index, self.message)
    }
}

impl std::error::Error for ParseError {}

//===========================================================================//

/// The result of parsing one document: a best-effort AST together with the
/// errors that were recovered from while building it.
#[derive(Debug)]
pub struct Parsed<T> {
    /// The (possibly partial) abstract syntax tree.
    pub ast: T,
    /// Errors recorded during the parse, in the order they were found.
    pub errors: Vec<ParseError>,
}

impl<T> Parsed<T> {
    /// Returns true if the document parsed without any errors.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts into a `Result`, discarding the partial AST if any errors
    /// were recorded.
    pub fn into_result(self) -> Result<T, Vec<ParseError>> {
        if self.errors.is_empty() { Ok(self.ast) } else { Err(self.errors) }
    }
}

//===========================================================================//

/// A named, address-bounded range of storage, declared either in a linker
/// script's `MEMORY` block or in a map file's "Memory Configuration" table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    /// The name of the region, e.g. `FLASH`.
    pub name: String,
    /// The access attributes as written, e.g. `(rx)` or `xrw`, if any.
    pub access_attributes: Option<String>,
    /// The address of the first byte of the region.
    pub origin: u64,
    /// The size of the region, in bytes.
    pub length: u64,
}

impl MemoryRegion {
    /// Returns the addresses covered by this region.  A region whose end
    /// would overflow is clamped to the top of the address space (the
    /// parsers never produce one).
    pub fn range(&self) -> Range {
        Range::with_len(self.origin, self.length).unwrap_or_else(|| {
            Range::with_bounds(self.origin, u64::MAX)
        })
    }

    /// Returns true if `addr` lies within this region.
    pub fn contains(&self, addr: u64) -> bool {
        self.range().contains(addr)
    }
}

//===========================================================================//
