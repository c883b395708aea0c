//! Facilities for parsing GNU ld link-time memory map reports.

use super::atom::{RowShape, starts_row};
use super::cursor::TokenCursor;
use super::expr::literal_value;
use super::lex::{Dialect, Token, TokenKind, tokenize};
use super::types::{MemoryRegion, ParseError, Parsed};
use crate::usage::{AddressIndex, RegionUsage};

//===========================================================================//

/// The abstract syntax tree for a memory map report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MapFileAst {
    /// Rows of the "Memory Configuration" table, in order.
    pub memories: Vec<MemoryRegion>,
    /// Output section rows of the memory map listing, in order.
    pub sections: Vec<SectionRecord>,
    /// Input section rows that name their object file, in order.
    pub symbols: Vec<Symbol>,
}

impl MapFileAst {
    /// Parses the part of a map report that follows its "Memory
    /// Configuration" heading.
    pub fn parse_source(source: &str) -> Parsed<MapFileAst> {
        MapFileAst::parse_with_starter(
            source,
            Dialect::MapFile.default_starter(),
        )
    }

    /// Parses the part of a map report that follows the first occurrence of
    /// `starter`.  An empty `starter` parses the whole report.
    pub fn parse_with_starter(
        source: &str,
        starter: &str,
    ) -> Parsed<MapFileAst> {
        let tokens = tokenize(source, starter, Dialect::MapFile);
        MapFileAst::parse_tokens(tokens)
    }

    /// Parses an already-tokenized map report.
    pub fn parse_tokens(tokens: Vec<Token>) -> Parsed<MapFileAst> {
        log::debug!("parsing map report of {} tokens", tokens.len());
        MapParser::new(tokens).parse()
    }

    /// Returns the first memory row that contains `address`.
    pub fn region_for(&self, address: u64) -> Option<&MemoryRegion> {
        AddressIndex::new(&self.memories).containing(address)
    }

    /// Groups symbols by the memory row that contains their address.  Rows
    /// appear in table order (including rows with no symbols), followed by
    /// the symbols that lie outside every row.
    pub fn symbols_by_region(&self) -> SymbolsByRegion<'_> {
        let index = AddressIndex::new(&self.memories);
        let mut placed: Vec<(&MemoryRegion, Vec<&Symbol>)> =
            self.memories.iter().map(|region| (region, Vec::new())).collect();
        let mut unplaced = Vec::new();
        for symbol in &self.symbols {
            match index.position_containing(symbol.address) {
                Some(position) => placed[position].1.push(symbol),
                None => unplaced.push(symbol),
            }
        }
        SymbolsByRegion { placed, unplaced }
    }

    /// Reports, for each memory row, how many bytes are taken by the output
    /// sections that start inside it.
    pub fn usage_report(&self) -> Vec<RegionUsage> {
        let index = AddressIndex::new(&self.memories);
        let mut used = vec![0u64; self.memories.len()];
        for section in &self.sections {
            if let Some(position) = index.position_containing(section.address)
            {
                used[position] = used[position].saturating_add(section.size);
            }
        }
        self.memories
            .iter()
            .zip(used)
            .map(|(region, used)| {
                let (origin, length) = (region.origin, region.length);
                RegionUsage::new(&region.name, origin, length, used)
            })
            .collect()
    }
}

//===========================================================================//

/// An output section row of the memory map listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectionRecord {
    /// The section name, e.g. `.text`.
    pub name: String,
    /// The run-time start address.
    pub address: u64,
    /// The size, in bytes.
    pub size: u64,
    /// The load address, for rows like `.data 0x.. 0x.. load address 0x..`.
    pub load_address: Option<u64>,
}

/// An input section row that names the object file it came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Symbol {
    /// The input section name, e.g. `.text.main`.
    pub name: String,
    /// The start address.
    pub address: u64,
    /// The size, in bytes.
    pub size: u64,
    /// The object file that contributed this input section.
    pub object_file: Option<String>,
    /// The function defined at the start of this input section, if listed.
    pub function: Option<SymbolFunction>,
}

/// The address (and name, when listed) of the function that a symbol row
/// resolves to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolFunction {
    /// The function's address.
    pub address: u64,
    /// The function's name.
    pub name: Option<String>,
}

/// Symbols of a map report grouped by memory row; see
/// `MapFileAst::symbols_by_region`.
#[derive(Debug)]
pub struct SymbolsByRegion<'a> {
    /// Each memory row with the symbols it contains, in table order.
    pub placed: Vec<(&'a MemoryRegion, Vec<&'a Symbol>)>,
    /// Symbols outside every memory row.
    pub unplaced: Vec<&'a Symbol>,
}

//===========================================================================//

struct MapParser {
    cursor: TokenCursor,
    errors: Vec<ParseError>,
}

impl MapParser {
    fn new(tokens: Vec<Token>) -> MapParser {
        MapParser { cursor: TokenCursor::new(tokens), errors: Vec::new() }
    }

    fn parse(mut self) -> Parsed<MapFileAst> {
        let mut memories = Vec::new();
        let mut sections = Vec::new();
        let mut symbols = Vec::new();
        while !self.cursor.is_at_end() {
            if self.at_phrase("Name", "Origin") {
                log::trace!("memory configuration table");
                self.cursor.advance_by(4);
                memories.extend(self.parse_memory_table());
            } else if self.at_phrase("Linker", "script") {
                log::trace!("linker script and memory map");
                self.cursor.advance_by(5);
                let (new_sections, new_symbols) = self.parse_memory_map();
                sections.extend(new_sections);
                symbols.extend(new_symbols);
            } else if self.at_phrase("Cross", "Reference") {
                log::debug!("reached cross reference table; stopping");
                break;
            } else {
                self.cursor.advance();
            }
        }
        Parsed {
            ast: MapFileAst { memories, sections, symbols },
            errors: self.errors,
        }
    }

    fn at_keyword(&self, offset: usize, word: &str) -> bool {
        self.cursor.peek_at(offset).is_some_and(|token| token.is_keyword(word))
    }

    fn at_phrase(&self, first: &str, second: &str) -> bool {
        self.at_keyword(0, first) && self.at_keyword(1, second)
    }

    /// Evaluates a hex token of a recognized row.
    fn value(&mut self, token: &Token) -> Option<u64> {
        match literal_value(token) {
            Ok(value) => Some(value),
            Err(error) => {
                let error = self.cursor.error(error.to_string());
                log::warn!("{error}");
                self.errors.push(error);
                None
            }
        }
    }

    //=======================================================================//

    fn parse_memory_table(&mut self) -> Vec<MemoryRegion> {
        let mut regions = Vec::new();
        while let Some(token) = self.cursor.peek() {
            if token.is_keyword("*default*")
                || self.at_phrase("Linker", "script")
            {
                break;
            }
            match self.cursor.remaining() {
                [name, origin, length, attributes, ..]
                    if name.kind == TokenKind::Word
                        && origin.kind == TokenKind::Hex
                        && length.kind == TokenKind::Hex
                        && attributes.kind == TokenKind::Word =>
                {
                    let (name, origin, length, attributes) = (
                        name.clone(),
                        origin.clone(),
                        length.clone(),
                        attributes.clone(),
                    );
                    if let Some(region) =
                        self.memory_row(name, &origin, &length, attributes)
                    {
                        regions.push(region);
                    }
                    self.cursor.advance_by(4);
                }
                _ => {
                    self.cursor.advance();
                }
            }
        }
        regions
    }

    fn memory_row(
        &mut self,
        name: Token,
        origin: &Token,
        length: &Token,
        attributes: Token,
    ) -> Option<MemoryRegion> {
        let origin = self.value(origin)?;
        let length = self.value(length)?;
        if origin.checked_add(length).is_none() {
            let error = self.cursor.error(format!(
                "memory row `{}` extends past the end of the address space",
                name.text
            ));
            self.errors.push(error);
            return None;
        }
        log::trace!("memory row {} at {origin:#x}, {length} bytes", name.text);
        Some(MemoryRegion {
            name: name.text,
            access_attributes: Some(attributes.text),
            origin,
            length,
        })
    }

    //=======================================================================//

    fn parse_memory_map(&mut self) -> (Vec<SectionRecord>, Vec<Symbol>) {
        let mut sections = Vec::new();
        let mut symbols = Vec::new();
        while let Some(token) = self.cursor.peek() {
            if token.is_keyword("/DISCARD/") {
                log::debug!("reached /DISCARD/; skipping to the end");
                let rest = self.cursor.remaining().len();
                self.cursor.advance_by(rest);
                break;
            }
            if self.at_phrase("Cross", "Reference") {
                break;
            }
            if token.is_keyword("LOAD") {
                self.cursor.advance_by(2);
                continue;
            }
            match RowShape::recognize(self.cursor.remaining()) {
                Some(row) => {
                    let count = row.token_count();
                    match row {
                        RowShape::Section {
                            name,
                            address,
                            size,
                            load_address,
                        } => {
                            if let Some(section) = self.section_row(
                                name,
                                &address,
                                &size,
                                load_address.as_ref(),
                            ) {
                                sections.push(section);
                            }
                        }
                        RowShape::Symbol {
                            name,
                            address,
                            size,
                            object_file,
                            function_address,
                        } => {
                            let function_name = self.function_name(count);
                            if let Some(symbol) = self.symbol_row(
                                name,
                                &address,
                                &size,
                                object_file,
                                &function_address,
                                function_name,
                            ) {
                                symbols.push(symbol);
                            }
                        }
                    }
                    self.cursor.advance_by(count);
                }
                None => {
                    self.cursor.advance();
                }
            }
        }
        (sections, symbols)
    }

    /// Returns the word following a symbol row of `count` tokens, if it names
    /// the row's function rather than starting another row.
    fn function_name(&self, count: usize) -> Option<String> {
        let token = self.cursor.peek_at(count)?;
        let rest = &self.cursor.remaining()[count..];
        if token.kind == TokenKind::Word
            && !starts_row(rest)
            && !token.is_keyword("LOAD")
            && !token.is_keyword("/DISCARD/")
        {
            Some(token.text.clone())
        } else {
            None
        }
    }

    fn section_row(
        &mut self,
        name: Token,
        address: &Token,
        size: &Token,
        load_address: Option<&Token>,
    ) -> Option<SectionRecord> {
        let address = self.value(address)?;
        let size = self.value(size)?;
        let load_address = match load_address {
            Some(token) => Some(self.value(token)?),
            None => None,
        };
        log::trace!("section {} at {address:#x}, {size} bytes", name.text);
        Some(SectionRecord { name: name.text, address, size, load_address })
    }

    fn symbol_row(
        &mut self,
        name: Token,
        address: &Token,
        size: &Token,
        object_file: Token,
        function_address: &Token,
        function_name: Option<String>,
    ) -> Option<Symbol> {
        let address = self.value(address)?;
        let size = self.value(size)?;
        let function_address = self.value(function_address)?;
        log::trace!("symbol {} from {}", name.text, object_file.text);
        Some(Symbol {
            name: name.text,
            address,
            size,
            object_file: Some(object_file.text),
            function: Some(SymbolFunction {
                address: function_address,
                name: function_name,
            }),
        })
    }
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{MapFileAst, SectionRecord, Symbol, SymbolFunction};
    use crate::parse::MemoryRegion;

    const MEMORY_TABLE: &str = "\
Memory Configuration

Name             Origin             Length             Attributes
FLASH            0x08000000         0x00080000         xr
RAM              0x20000000         0x00020000         xrw
*default*        0x00000000         0xffffffff
";

    fn parse(source: &str) -> MapFileAst {
        let parsed = MapFileAst::parse_source(source);
        assert_eq!(parsed.errors, vec![]);
        parsed.ast
    }

    fn with_body(body: &str) -> String {
        format!("{MEMORY_TABLE}\nLinker script and memory map\n\n{body}")
    }

    #[test]
    fn memory_configuration_table() {
        let ast = parse(MEMORY_TABLE);
        assert_eq!(
            ast.memories,
            vec![
                MemoryRegion {
                    name: "FLASH".to_string(),
                    access_attributes: Some("xr".to_string()),
                    origin: 0x0800_0000,
                    length: 0x8_0000,
                },
                MemoryRegion {
                    name: "RAM".to_string(),
                    access_attributes: Some("xrw".to_string()),
                    origin: 0x2000_0000,
                    length: 0x2_0000,
                },
            ]
        );
    }

    #[test]
    fn missing_starter_yields_empty_ast() {
        let parsed = MapFileAst::parse_source("Linker script and memory map");
        assert!(parsed.is_clean());
        assert_eq!(parsed.ast, MapFileAst::default());
    }

    #[test]
    fn sections_and_symbols() {
        let ast = parse(&with_body(
            "LOAD build/startup.o\n\
             LOAD build/main.o\n\
             .isr_vector     0x08000000      0x188\n\
                             0x08000000                . = ALIGN (0x4)\n\
             *(.isr_vector)\n\
             .text           0x08000188      0x1234\n\
                             0x08000188                . = ALIGN (0x4)\n\
             .text.main      0x08000200      0x20 build/main.o\n\
                             0x08000200                main\n\
             .text.Reset_Handler\n\
                             0x08000220      0x50 build/startup.o\n\
                             0x08000220                Reset_Handler\n\
             .data           0x20000000       0x10 load address 0x080013bc\n",
        ));
        assert_eq!(
            ast.sections,
            vec![
                SectionRecord {
                    name: ".isr_vector".to_string(),
                    address: 0x0800_0000,
                    size: 0x188,
                    load_address: None,
                },
                SectionRecord {
                    name: ".text".to_string(),
                    address: 0x0800_0188,
                    size: 0x1234,
                    load_address: None,
                },
                SectionRecord {
                    name: ".data".to_string(),
                    address: 0x2000_0000,
                    size: 0x10,
                    load_address: Some(0x0800_13BC),
                },
            ]
        );
        assert_eq!(
            ast.symbols,
            vec![
                Symbol {
                    name: ".text.main".to_string(),
                    address: 0x0800_0200,
                    size: 0x20,
                    object_file: Some("build/main.o".to_string()),
                    function: Some(SymbolFunction {
                        address: 0x0800_0200,
                        name: Some("main".to_string()),
                    }),
                },
                Symbol {
                    name: ".text.Reset_Handler".to_string(),
                    address: 0x0800_0220,
                    size: 0x50,
                    object_file: Some("build/startup.o".to_string()),
                    function: Some(SymbolFunction {
                        address: 0x0800_0220,
                        name: Some("Reset_Handler".to_string()),
                    }),
                },
            ]
        );
    }

    #[test]
    fn function_name_is_not_taken_from_next_row() {
        let ast = parse(&with_body(
            ".text.a 0x100 0x10 a.o 0x100\n\
             .text.b 0x110 0x10 b.o 0x110 b\n",
        ));
        assert_eq!(ast.symbols.len(), 2);
        assert_eq!(ast.symbols[0].function.as_ref().unwrap().name, None);
        assert_eq!(
            ast.symbols[1].function.as_ref().unwrap().name.as_deref(),
            Some("b")
        );
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let ast = parse(&with_body(
            "0x3 0x4 0x5 0x6\n\
             .a 0x1 0x2\n\
             *(.a) *(.b)\n\
             .b 0x10 0x20 *(.b) .c\n\
             .d 0x30 0x40 0x50\n",
        ));
        let names: Vec<&str> =
            ast.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![".d"]);
    }

    #[test]
    fn stops_at_cross_reference() {
        let ast = parse(&with_body(
            ".text 0x08000000 0x100 0x08000000\n\
             Cross Reference Table\n\n\
             Symbol File\n\
             .bss 0x20000000 0x100 0x20000000\n",
        ));
        assert_eq!(ast.sections.len(), 1);
    }

    #[test]
    fn stops_at_discard() {
        let ast = parse(&with_body(
            ".text 0x08000000 0x100 0x08000000\n\
             /DISCARD/\n\
             \x20*(.ARM.exidx)\n\
             .bss 0x20000000 0x100 0x20000000\n",
        ));
        assert_eq!(ast.sections.len(), 1);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let ast = parse(
            "Memory Configuration\nNAME ORIGIN LENGTH ATTRIBUTES\n\
             RAM 0x20000000 0x1000 rw\n\
             LINKER SCRIPT AND MEMORY MAP\n\
             load foo.o\n\
             .bss 0x20000000 0x100 0x20000000\n",
        );
        assert_eq!(ast.memories.len(), 1);
        assert_eq!(ast.sections.len(), 1);
    }

    #[test]
    fn overflowing_memory_row_is_an_error() {
        let parsed = MapFileAst::parse_source(
            "Memory Configuration\nName Origin Length Attributes\n\
             BIG 0xffffffffffffffff 0x10 rw\n\
             HUGE 0x10000000000000000 0x10 rw\n\
             RAM 0x20000000 0x1000 rw\n",
        );
        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.ast.memories.len(), 1);
        assert_eq!(parsed.ast.memories[0].name, "RAM");
    }

    #[test]
    fn region_queries() {
        let ast = parse(&with_body(
            ".text 0x08000000 0x1000 0x08000000\n\
             .text.main 0x08000000 0x20 main.o 0x08000000 main\n\
             .data 0x20000000 0x200 0x20000000\n\
             .bss 0x20000200 0x600 0x20000200\n\
             .stray 0x40000000 0x4 x.o 0x40000000\n",
        ));
        assert_eq!(
            ast.region_for(0x2000_0100).map(|r| r.name.as_str()),
            Some("RAM")
        );
        assert!(ast.region_for(0x1000_0000).is_none());

        let grouped = ast.symbols_by_region();
        assert_eq!(grouped.placed.len(), 2);
        assert_eq!(grouped.placed[0].0.name, "FLASH");
        assert_eq!(grouped.placed[0].1.len(), 1);
        assert!(grouped.placed[1].1.is_empty());
        assert_eq!(grouped.unplaced.len(), 1);
        assert_eq!(grouped.unplaced[0].name, ".stray");

        let report = ast.usage_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].region, "FLASH");
        assert_eq!(report[0].used, 0x1000);
        assert_eq!(report[1].region, "RAM");
        assert_eq!(report[1].used, 0x800);
        assert_eq!(report[1].free, 0x2_0000 - 0x800);
        assert_eq!(report[1].usage_percent.to_string(), "1.56");
    }
}

//===========================================================================//
