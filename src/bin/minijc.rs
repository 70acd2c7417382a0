//! minijc command-line driver.
//!
//! Reads a type-checked syntax tree as JSON and writes assembly for the chosen target.

use clap::{ArgAction, Parser};
use minijc::ast::Program;
use minijc::{runtime, Arch, CodegenOptions, CodegenSession, CompileError};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status for internal compiler defects.
const EXIT_INTERNAL: u8 = 70;
/// Exit status for unreadable input or unwritable output.
const EXIT_IO: u8 = 74;

#[derive(Parser)]
#[command(name = "minijc")]
#[command(about = "MiniJava assembly backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Syntax tree in JSON, `-` for stdin
    input: PathBuf,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target architecture
    #[arg(short, long, value_enum, default_value_t = Arch::X86_64)]
    target: Arch,

    /// Leave trailing comments out of the listing
    #[arg(long)]
    no_comments: bool,

    /// Also write the C runtime the output links against
    #[arg(long, value_name = "PATH")]
    emit_runtime: Option<PathBuf>,

    /// More logging; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn read_input(path: &PathBuf) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    let text = read_input(&cli.input)?;
    let program: Program = serde_json::from_str(&text)?;

    let mut options = CodegenOptions::for_arch(cli.target);
    if cli.no_comments {
        options = options.without_comments();
    }
    let unit = CodegenSession::new(options)?.compile(&program)?;

    match &cli.output {
        Some(path) => fs::write(path, &unit.assembly)?,
        None => io::stdout().write_all(unit.assembly.as_bytes())?,
    }
    if let Some(path) = &cli.emit_runtime {
        fs::write(path, runtime::BOOT_C)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("minijc: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            if e.is_internal() {
                ExitCode::from(EXIT_INTERNAL)
            } else {
                ExitCode::from(EXIT_IO)
            }
        }
    }
}
