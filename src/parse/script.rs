//! Facilities for parsing GNU ld linker scripts.

use super::cursor::TokenCursor;
use super::expr::{LiteralError, literal_value};
use super::lex::{Dialect, Token, TokenKind, tokenize};
use super::types::{MemoryRegion, ParseError, Parsed};
use crate::usage::{self, RegionUsage, UsageError};

//===========================================================================//

const ORIGIN_KEYWORDS: &[&str] = &["ORIGIN", "org", "o"];
const LENGTH_KEYWORDS: &[&str] = &["LENGTH", "len", "l"];

/// Word tokens that can never be used as a region, section, or constant
/// name.
const PUNCTUATION: &[&str] = &[":", "{", "}", "=", ">", ";", ","];

const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "&", "|", "^", "<<", ">>", "<", ">", "?", ":",
];

//===========================================================================//

/// The abstract syntax tree for a linker script.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinkerScriptAst {
    /// Regions declared in `MEMORY` blocks, in declaration order.
    pub memories: Vec<MemoryRegion>,
    /// Output sections declared in `SECTIONS` blocks, in declaration order.
    pub sections: Vec<SectionDefinition>,
    /// Top-level symbol assignments such as `_estack = 0x20020000;`.
    pub constants: Vec<Constant>,
}

impl LinkerScriptAst {
    /// Parses the part of a linker script that follows its `ENTRY` command.
    pub fn parse_source(source: &str) -> Parsed<LinkerScriptAst> {
        LinkerScriptAst::parse_with_starter(
            source,
            Dialect::LinkerScript.default_starter(),
        )
    }

    /// Parses the part of a linker script that follows the first occurrence
    /// of `starter`.  An empty `starter` parses the whole script.
    pub fn parse_with_starter(
        source: &str,
        starter: &str,
    ) -> Parsed<LinkerScriptAst> {
        let tokens = tokenize(source, starter, Dialect::LinkerScript);
        LinkerScriptAst::parse_tokens(tokens)
    }

    /// Parses an already-tokenized linker script.
    pub fn parse_tokens(tokens: Vec<Token>) -> Parsed<LinkerScriptAst> {
        log::debug!("parsing linker script of {} tokens", tokens.len());
        ScriptParser::new(tokens).parse()
    }

    /// Returns the first declared memory region with the given name.
    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.memories.iter().find(|region| region.name == name)
    }

    /// Returns the first declared constant with the given name.
    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|constant| constant.name == name)
    }

    /// Computes how much of the memory region containing `address` a
    /// `budget` of bytes would use.
    pub fn region_usage(
        &self,
        address: u64,
        budget: u64,
    ) -> Result<RegionUsage, UsageError> {
        usage::region_usage(&self.memories, address, budget)
    }

    /// Like `region_usage`, but with the address written as a literal, e.g.
    /// `0x20000000`.
    pub fn region_usage_str(
        &self,
        address: &str,
        budget: u64,
    ) -> Result<RegionUsage, UsageError> {
        usage::region_usage_str(&self.memories, address, budget)
    }

    /// Computes the declared capacity, and how much of it `budget` would use,
    /// for every region whose name matches `memory_type` (ignoring case).
    pub fn declared_usage(
        &self,
        memory_type: &str,
        budget: u64,
    ) -> Result<RegionUsage, UsageError> {
        usage::declared_usage(&self.memories, memory_type, budget)
    }
}

//===========================================================================//

/// An output section declared in a `SECTIONS` block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectionDefinition {
    /// The section name, e.g. `.text`.
    pub name: String,
    /// The region the section is placed in (`> REGION`), if any.
    pub memory_region: Option<String>,
    /// The region the section is loaded from (`AT > REGION`), if any.
    pub load_region: Option<String>,
}

/// A top-level symbol assignment to a numeric literal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Constant {
    /// The symbol name, including its leading underscore.
    pub name: String,
    /// Either `TokenKind::Hex` or `TokenKind::Decimal`.
    pub kind: TokenKind,
    /// The normalized literal text, as lexed.
    pub value: String,
}

impl Constant {
    /// Evaluates the constant's value.
    pub fn int_value(&self) -> Result<u64, LiteralError> {
        literal_value(&Token::new(self.kind, &self.value, 0))
    }
}

//===========================================================================//

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanState {
    Normal,
    InComment,
}

enum TopLevel {
    Memory,
    Sections,
    Constant,
    Discard,
    Other,
}

fn is_name(token: &Token) -> bool {
    token.kind == TokenKind::Word && !PUNCTUATION.contains(&token.text.as_str())
}

fn opens_comment(token: &Token) -> bool {
    token.kind == TokenKind::Word && token.text.starts_with("/*")
}

fn closes_comment(token: &Token) -> bool {
    token.kind == TokenKind::Word && token.text.ends_with("*/")
}

fn region_name(text: &str) -> String {
    text.trim_end_matches(|c| c == ';' || c == ',').to_string()
}

struct ScriptParser {
    cursor: TokenCursor,
    state: ScanState,
    errors: Vec<ParseError>,
}

impl ScriptParser {
    fn new(tokens: Vec<Token>) -> ScriptParser {
        ScriptParser {
            cursor: TokenCursor::new(tokens),
            state: ScanState::Normal,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Parsed<LinkerScriptAst> {
        let mut memories = Vec::new();
        let mut sections = Vec::new();
        let mut constants = Vec::new();
        while let Some(item) = self.top_level_item() {
            match item {
                TopLevel::Memory => memories.extend(self.parse_memory_block()),
                TopLevel::Sections => {
                    sections.extend(self.parse_sections_block());
                }
                TopLevel::Constant => {
                    let start = self.mark();
                    match self.parse_constant() {
                        Ok(constant) => constants.push(constant),
                        Err(error) => {
                            let mut recovering = false;
                            self.recover(start, error, &mut recovering);
                        }
                    }
                }
                TopLevel::Discard => {
                    log::debug!("reached /DISCARD/; ignoring the rest");
                    self.skip_discard();
                    break;
                }
                TopLevel::Other => {
                    let description = self.cursor.describe_current();
                    log::warn!("skipping unexpected {description}");
                    self.cursor.advance();
                }
            }
        }
        Parsed {
            ast: LinkerScriptAst { memories, sections, constants },
            errors: self.errors,
        }
    }

    //=======================================================================//

    /// Consumes any comments at the current position.  A comment runs from a
    /// word starting with `/*` through the next word ending with `*/`, which
    /// may be the same word.
    fn skip_comments(&mut self) {
        while let Some(token) = self.cursor.peek() {
            match self.state {
                ScanState::Normal => {
                    if !opens_comment(token) {
                        return;
                    }
                    log::trace!("skipping comment on line {}", token.line);
                    if token.text.len() < 4 || !closes_comment(token) {
                        self.state = ScanState::InComment;
                    }
                }
                ScanState::InComment => {
                    if closes_comment(token) {
                        self.state = ScanState::Normal;
                    }
                }
            }
            self.cursor.advance();
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_comments();
        self.cursor.peek()
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_comments();
        self.cursor.advance().cloned()
    }

    fn mark(&mut self) -> usize {
        self.skip_comments();
        self.cursor.position()
    }

    /// Records `error` unless this failure continues an earlier one.
    fn report(&mut self, error: ParseError, recovering: &mut bool) {
        if !*recovering {
            log::warn!("{error}");
            self.errors.push(error);
        }
        *recovering = true;
    }

    /// Returns to `start` after a failed construct and discards exactly one
    /// token, recording `error` unless this failure continues an earlier one.
    fn recover(
        &mut self,
        start: usize,
        error: ParseError,
        recovering: &mut bool,
    ) {
        self.report(error, recovering);
        self.cursor.rewind(start);
        self.state = ScanState::Normal;
        self.cursor.advance();
    }

    fn at_word(&mut self, text: &str) -> bool {
        self.peek().is_some_and(|token| token.is_word(text))
    }

    fn at_keyword(&mut self, text: &str) -> bool {
        self.peek().is_some_and(|token| token.is_keyword(text))
    }

    fn expect_word(&mut self, text: &str) -> Result<(), ParseError> {
        if self.at_word(text) {
            self.cursor.advance();
            Ok(())
        } else {
            Err(self.cursor.unexpected(&format!("`{text}`")))
        }
    }

    fn expect_one_of(
        &mut self,
        words: &[&str],
        expected: &str,
    ) -> Result<(), ParseError> {
        let found = self.peek().is_some_and(|token| {
            words.iter().any(|&word| token.is_word(word))
        });
        if found {
            self.cursor.advance();
            Ok(())
        } else {
            Err(self.cursor.unexpected(expected))
        }
    }

    fn expect_name(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(token) if is_name(token) => {
                let name = token.text.clone();
                self.cursor.advance();
                Ok(name)
            }
            _ => Err(self.cursor.unexpected(expected)),
        }
    }

    fn expect_region(&mut self) -> Result<String, ParseError> {
        let name = self.expect_name("a memory region name")?;
        Ok(region_name(&name))
    }

    fn skip_separator(&mut self) {
        if self.at_word(";") || self.at_word(",") {
            self.cursor.advance();
        }
    }

    fn parse_literal(&mut self) -> Result<u64, ParseError> {
        let result = match self.peek() {
            Some(token) => literal_value(token),
            None => return Err(self.cursor.unexpected("a numeric literal")),
        };
        match result {
            Ok(value) => {
                self.cursor.advance();
                Ok(value)
            }
            Err(LiteralError::NotALiteral) => {
                Err(self.cursor.unexpected("a numeric literal"))
            }
            Err(error) => Err(self.cursor.error(error.to_string())),
        }
    }

    /// Skips everything up to and including the `}` that matches an
    /// already-consumed `{`, returning the text of the closing token (which
    /// may carry a fused placement, as in `}>RAM`).
    fn skip_braced_body(&mut self) -> Result<String, ParseError> {
        let mut depth: usize = 1;
        while let Some(token) = self.next_token() {
            if token.is_word("{") {
                depth += 1;
            } else if token.kind == TokenKind::Word
                && token.text.starts_with('}')
            {
                depth -= 1;
                if depth == 0 {
                    return Ok(token.text);
                }
            }
        }
        Err(self.cursor.unexpected("`}`"))
    }

    //=======================================================================//

    fn top_level_item(&mut self) -> Option<TopLevel> {
        let token = self.peek()?;
        Some(if token.is_word("MEMORY") {
            TopLevel::Memory
        } else if token.is_word("SECTIONS") {
            TopLevel::Sections
        } else if token.is_keyword("/DISCARD/") {
            TopLevel::Discard
        } else if token.kind == TokenKind::Word && token.text.starts_with('_')
        {
            TopLevel::Constant
        } else {
            TopLevel::Other
        })
    }

    fn parse_constant(&mut self) -> Result<Constant, ParseError> {
        let name = self.expect_name("a symbol name")?;
        self.expect_word("=")?;
        let (kind, value) = match self.peek() {
            Some(token)
                if matches!(token.kind, TokenKind::Hex | TokenKind::Decimal) =>
            {
                (token.kind, token.text.clone())
            }
            _ => {
                let expected = format!("a numeric value for `{name}`");
                return Err(self.cursor.unexpected(&expected));
            }
        };
        self.cursor.advance();
        if self.at_word(";") {
            self.cursor.advance();
        }
        log::trace!("constant {name} = {} {value}", kind.name());
        Ok(Constant { name, kind, value })
    }

    /// Skips a `/DISCARD/` output section, including its body.
    fn skip_discard(&mut self) {
        self.cursor.advance();
        if self.at_word(":") {
            self.cursor.advance();
        }
        let result = self
            .expect_word("{")
            .and_then(|()| self.skip_braced_body().map(|_| ()));
        if let Err(error) = result {
            log::warn!("{error}");
            self.errors.push(error);
        }
        self.skip_separator();
    }

    //=======================================================================//

    fn parse_memory_block(&mut self) -> Vec<MemoryRegion> {
        self.cursor.advance();
        if let Err(error) = self.expect_word("{") {
            self.errors.push(error);
            return Vec::new();
        }
        let mut regions = Vec::new();
        let mut recovering = false;
        loop {
            if self.peek().is_none() {
                self.errors.push(self.cursor.unexpected("`}`"));
                break;
            }
            if self.at_word("}") {
                self.cursor.advance();
                break;
            }
            let start = self.mark();
            match self.parse_region() {
                Ok(region) => {
                    log::trace!(
                        "region {} at {:#x}, {} bytes",
                        region.name,
                        region.origin,
                        region.length
                    );
                    regions.push(region);
                    recovering = false;
                }
                Err(error) => self.recover(start, error, &mut recovering),
            }
        }
        regions
    }

    fn parse_region(&mut self) -> Result<MemoryRegion, ParseError> {
        let name = self.expect_name("a memory region name")?;
        let has_attributes = self
            .peek()
            .is_some_and(|token| token.kind == TokenKind::Word)
            && !self.at_word(":");
        let access_attributes = if has_attributes {
            self.next_token().map(|token| token.text)
        } else {
            None
        };
        self.expect_word(":")?;
        self.expect_one_of(ORIGIN_KEYWORDS, "`ORIGIN`")?;
        self.expect_word("=")?;
        let origin = self.parse_literal()?;
        if self.at_word(",") {
            self.cursor.advance();
        }
        self.expect_one_of(LENGTH_KEYWORDS, "`LENGTH`")?;
        self.expect_word("=")?;
        let length = self.parse_literal()?;
        if origin.checked_add(length).is_none() {
            return Err(self.cursor.error(format!(
                "memory region `{name}` extends past the end of the \
                 address space"
            )));
        }
        self.skip_separator();
        Ok(MemoryRegion { name, access_attributes, origin, length })
    }

    //=======================================================================//

    fn parse_sections_block(&mut self) -> Vec<SectionDefinition> {
        self.cursor.advance();
        if let Err(error) = self.expect_word("{") {
            self.errors.push(error);
            return Vec::new();
        }
        let mut sections = Vec::new();
        let mut recovering = false;
        loop {
            if self.peek().is_none() {
                self.errors.push(self.cursor.unexpected("`}`"));
                break;
            }
            if self.at_word("}") {
                self.cursor.advance();
                break;
            }
            if self.at_keyword("/DISCARD/") {
                self.skip_discard();
                recovering = false;
                continue;
            }
            if self.at_assignment() {
                self.skip_assignment();
                recovering = false;
                continue;
            }
            if self.at_word("{") {
                // A body whose header was malformed.  Its `}` must not close
                // the block.
                let error = self.cursor.unexpected("a section name");
                self.report(error, &mut recovering);
                self.cursor.advance();
                if let Err(error) = self.skip_braced_body() {
                    self.report(error, &mut recovering);
                }
                continue;
            }
            let start = self.mark();
            let name = match self.parse_section_header() {
                Ok(name) => name,
                Err(error) => {
                    self.recover(start, error, &mut recovering);
                    continue;
                }
            };
            // Past the header, a failure resumes where it happened, since
            // the body has already been consumed.
            match self.parse_section_tail(name) {
                Ok(section) => {
                    log::trace!(
                        "section {} in {:?}",
                        section.name,
                        section.memory_region
                    );
                    sections.push(section);
                    recovering = false;
                }
                Err(error) => self.report(error, &mut recovering),
            }
        }
        sections
    }

    /// Returns true at a symbol assignment between output sections, such as
    /// `. = ALIGN(4);` or `_sidata = LOADADDR(.data);`.
    fn at_assignment(&mut self) -> bool {
        self.peek().is_some_and(is_name)
            && self
                .cursor
                .peek_at(1)
                .is_some_and(|token| token.is_word("="))
    }

    /// Skips a symbol assignment through its terminating `;`.  A numeric
    /// literal also ends it, since the lexer trims a `;` fused to one, unless
    /// an operator follows.
    fn skip_assignment(&mut self) {
        let start = self.cursor.describe_current();
        while let Some(token) = self.next_token() {
            let done = if token.kind.is_numeric() {
                !self.at_operator()
            } else {
                token.kind == TokenKind::Word && token.text.ends_with(';')
            };
            if done || self.at_word("}") {
                break;
            }
        }
        self.skip_separator();
        log::trace!("skipped assignment starting at {start}");
    }

    fn at_operator(&mut self) -> bool {
        self.peek().is_some_and(|token| {
            OPERATORS.iter().any(|&operator| token.is_word(operator))
        })
    }

    /// Parses a section's name, its optional address and type, and the `:`
    /// and `{` that open its body.
    fn parse_section_header(&mut self) -> Result<String, ParseError> {
        let name = self.expect_name("a section name")?;
        // Optional address and type, as in `.ARM.attributes 0 (NOLOAD) :`.
        if self.peek().is_some_and(|token| token.kind.is_numeric()) {
            self.cursor.advance();
        }
        if self.peek().is_some_and(|token| {
            token.kind == TokenKind::Word && token.text.starts_with('(')
        }) {
            self.cursor.advance();
        }
        self.expect_word(":")?;
        self.expect_word("{")?;
        Ok(name)
    }

    /// Parses the rest of a section whose body has just been opened.
    fn parse_section_tail(
        &mut self,
        name: String,
    ) -> Result<SectionDefinition, ParseError> {
        let closing = self.skip_braced_body()?;
        let memory_region = match closing.split_once('>') {
            Some((_, "")) => Some(self.expect_region()?),
            Some((_, region)) => Some(region_name(region)),
            None => self.parse_placement()?,
        };
        let load_region = self.parse_load_placement()?;
        self.skip_separator();
        Ok(SectionDefinition { name, memory_region, load_region })
    }

    /// Parses an optional `> REGION` (or `>REGION`) placement.
    fn parse_placement(&mut self) -> Result<Option<String>, ParseError> {
        let fused = match self.peek() {
            Some(token)
                if token.kind == TokenKind::Word
                    && token.text.starts_with('>') =>
            {
                token.text[1..].to_string()
            }
            _ => return Ok(None),
        };
        self.cursor.advance();
        if fused.is_empty() {
            self.expect_region().map(Some)
        } else {
            Ok(Some(region_name(&fused)))
        }
    }

    /// Parses an optional `AT > REGION` load placement, in any of its
    /// spellings (`AT > R`, `AT >R`, `AT>R`).
    fn parse_load_placement(&mut self) -> Result<Option<String>, ParseError> {
        let fused = match self.peek() {
            Some(token) if token.is_word("AT") => None,
            Some(token)
                if token.kind == TokenKind::Word
                    && token.text.starts_with("AT>") =>
            {
                Some(token.text[3..].to_string())
            }
            _ => return Ok(None),
        };
        self.cursor.advance();
        match fused {
            Some(region) if !region.is_empty() => {
                Ok(Some(region_name(&region)))
            }
            Some(_) => self.expect_region().map(Some),
            None => match self.parse_placement()? {
                Some(region) => Ok(Some(region)),
                None => Err(self.cursor.unexpected("`>` after `AT`")),
            },
        }
    }
}

//===========================================================================//


//===========================================================================//
