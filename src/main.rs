use anyhow::Context;
use clap::{Parser, Subcommand};
use linkview::parse::{
    Dialect, LinkerScriptAst, MapFileAst, MemoryRegion, Parsed, Symbol,
    parse_literal,
};
use linkview::usage::AddressIndex;
use std::fs;
use std::path::{Path, PathBuf};

//===========================================================================//

#[derive(Parser)]
#[clap(author, about, long_about = None, version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the memory regions, sections, and constants of a linker script.
    Script {
        /// The linker script to read.
        file: PathBuf,
        /// The marker after which parsing begins.
        #[clap(long, default_value = SCRIPT_STARTER)]
        starter: String,
    },
    /// Lists the memory rows and sections of a map report, with the space
    /// the sections use in each memory row.
    Map {
        /// The map report to read.
        file: PathBuf,
        /// The marker after which parsing begins.
        #[clap(long, default_value = Dialect::MapFile.default_starter())]
        starter: String,
        /// Also lists the symbols placed in each memory row.
        #[clap(long)]
        symbols: bool,
    },
    /// Reports how much of the region containing an address a budget of
    /// bytes would use.
    Usage {
        /// The linker script declaring the memory regions.
        script: PathBuf,
        /// The start address, e.g. 0x20000000.
        address: String,
        /// The number of bytes, e.g. 65536, 0x10000, or 64K.
        #[clap(value_parser = parse_bytes)]
        budget: u64,
    },
    /// Reports how much of a budget the regions named after a memory type
    /// (e.g. RAM) declare.
    Declared {
        /// The linker script declaring the memory regions.
        script: PathBuf,
        /// The region name to match, ignoring case.
        memory_type: String,
        /// The number of bytes, e.g. 262144, 0x40000, or 256K.
        #[clap(value_parser = parse_bytes)]
        budget: u64,
    },
}

const SCRIPT_STARTER: &str = Dialect::LinkerScript.default_starter();

fn parse_bytes(text: &str) -> Result<u64, String> {
    parse_literal(text).map_err(|error| error.to_string())
}

//===========================================================================//

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Script { file, starter } => {
            let ast = load_script(&file, &starter)?;
            print_script(&ast);
        }
        Command::Map { file, starter, symbols } => {
            let source = read_source(&file)?;
            let parsed = MapFileAst::parse_with_starter(&source, &starter);
            report_errors(&file, &parsed);
            warn_overlaps(&file, &parsed.ast.memories);
            print_map(&parsed.ast, symbols);
        }
        Command::Usage { script, address, budget } => {
            let ast = load_script(&script, SCRIPT_STARTER)?;
            let usage = ast.region_usage_str(&address, budget)?;
            println!("{usage}");
        }
        Command::Declared { script, memory_type, budget } => {
            let ast = load_script(&script, SCRIPT_STARTER)?;
            let usage = ast.declared_usage(&memory_type, budget)?;
            println!("{usage}");
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
}

fn load_script(
    path: &Path,
    starter: &str,
) -> anyhow::Result<LinkerScriptAst> {
    let source = read_source(path)?;
    let parsed = LinkerScriptAst::parse_with_starter(&source, starter);
    report_errors(path, &parsed);
    warn_overlaps(path, &parsed.ast.memories);
    Ok(parsed.ast)
}

fn report_errors<T>(path: &Path, parsed: &Parsed<T>) {
    for error in &parsed.errors {
        eprintln!("warning: {}: {error}", path.display());
    }
}

fn warn_overlaps(path: &Path, regions: &[MemoryRegion]) {
    for (first, second) in AddressIndex::new(regions).overlaps() {
        eprintln!(
            "warning: {}: regions {} and {} overlap; lookups use {}",
            path.display(),
            first.name,
            second.name,
            first.name
        );
    }
}

//===========================================================================//

fn print_region(region: &MemoryRegion) {
    println!(
        "  {:<12} {:<8} {} {:>10} bytes",
        region.name,
        region.access_attributes.as_deref().unwrap_or(""),
        region.range(),
        region.length
    );
}

fn print_script(ast: &LinkerScriptAst) {
    println!("MEMORY");
    for region in &ast.memories {
        print_region(region);
    }
    println!("SECTIONS");
    for section in &ast.sections {
        let placement = section.memory_region.as_deref().unwrap_or("-");
        match &section.load_region {
            Some(load) => {
                println!("  {:<20} > {placement} AT > {load}", section.name);
            }
            None => println!("  {:<20} > {placement}", section.name),
        }
    }
    println!("CONSTANTS");
    for constant in &ast.constants {
        match constant.int_value() {
            Ok(value) => println!("  {} = 0x{value:x}", constant.name),
            Err(error) => println!("  {} = ? ({error})", constant.name),
        }
    }
}

fn print_map(ast: &MapFileAst, symbols: bool) {
    println!("MEMORY");
    for region in &ast.memories {
        print_region(region);
    }
    println!("SECTIONS");
    for section in &ast.sections {
        let load = match section.load_address {
            Some(address) => format!(" (load 0x{address:08x})"),
            None => String::new(),
        };
        println!(
            "  {:<20} 0x{:08x} {:>10} bytes{load}",
            section.name, section.address, section.size
        );
    }
    println!("USAGE");
    for usage in ast.usage_report() {
        println!("  {usage}");
    }
    if symbols {
        let grouped = ast.symbols_by_region();
        for (region, symbols) in &grouped.placed {
            println!("SYMBOLS IN {}", region.name);
            for symbol in symbols {
                print_symbol(symbol);
            }
        }
        if !grouped.unplaced.is_empty() {
            println!("SYMBOLS OUTSIDE MEMORY");
            for symbol in &grouped.unplaced {
                print_symbol(symbol);
            }
        }
    }
}

fn print_symbol(symbol: &Symbol) {
    let function = symbol
        .function
        .as_ref()
        .and_then(|function| function.name.as_deref())
        .unwrap_or("");
    println!(
        "  {:<32} 0x{:08x} {:>8} {:<24} {function}",
        symbol.name,
        symbol.address,
        symbol.size,
        symbol.object_file.as_deref().unwrap_or("")
    );
}

//===========================================================================//
