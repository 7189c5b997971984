use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use rox::analysis::analyze;
use rox::ast_printer::AstPrinter;
use rox::error::{ConsoleReporter, LoxError, Tally};
use rox::lox::{is_expression, Lox, RunOutcome};
use rox::parser::Parser;
use rox::scanner::Scanner;

#[derive(ClapParser, Debug)]
#[command(version, about = "Interpreter and tooling for the Lox language", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Write debug logs to ./app.log (RUST_LOG refines the filter)
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every token of a file, one per line
    Tokenize { filename: Option<PathBuf> },

    /// Print the syntax tree of a file holding one expression
    Parse { filename: Option<PathBuf> },

    /// Print the value of a file holding one expression
    Evaluate { filename: Option<PathBuf> },

    /// Execute a file as a program
    Run { filename: Option<PathBuf> },

    /// Prints diagnostics, symbols, semantic tokens and outline as JSON
    Analyze { filename: Option<PathBuf> },

    /// Reads and runs one line at a time
    Repl,
}

const EXIT_STATIC_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;

/// Reads the contents of a file as UTF‑8 text.
fn read_file(filename: PathBuf) -> Result<String> {
    let file = File::open(&filename).with_context(|| format!("Cannot open {}", filename.display()))?;

    let mut contents = Vec::new();
    let read = BufReader::new(file)
        .read_to_end(&mut contents)
        .with_context(|| format!("Cannot read {}", filename.display()))?;

    info!("Loaded {} byte(s) from {}", read, filename.display());

    String::from_utf8(contents)
        .map_err(LoxError::from)
        .with_context(|| format!("{} is not valid UTF-8", filename.display()))
}

/// The file's text, or exit quietly when no file was given.
fn source_or_exit(filename: Option<PathBuf>) -> Result<String> {
    match filename {
        Some(filename) => read_file(filename),
        None => {
            info!("Nothing to do without a file");
            eprintln!("No input file given.");
            std::process::exit(0);
        }
    }
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("rox::").unwrap_or(module);
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env() // RUST_LOG overrides
        .init();

    info!("Logging to app.log");
    Ok(())
}

fn tokenize(source: &str) {
    let mut failed = false;

    for result in Scanner::new(source) {
        match result {
            Ok(token) => println!("{}", token),
            Err(error) => {
                failed = true;
                eprintln!("{}", error);
            }
        }
    }

    if failed {
        debug!("Lexical errors, exiting with {}", EXIT_STATIC_ERROR);
        std::process::exit(EXIT_STATIC_ERROR);
    }
}

fn parse(source: &str) {
    let mut console = ConsoleReporter;
    let mut tally = Tally::new(&mut console);

    let expr = Parser::new(Scanner::new(source), &mut tally).parse_expression();

    match expr {
        Some(expr) if !tally.had_error() => {
            let ast = AstPrinter::print(&expr);
            debug!("AST: {}", ast);
            println!("{}", ast);
        }
        _ => std::process::exit(EXIT_STATIC_ERROR),
    }
}

fn evaluate(source: &str) {
    let mut console = ConsoleReporter;
    let mut lox = Lox::new(Tally::new(&mut console));

    match lox.evaluate_expression(source) {
        Some(value) => println!("{}", value),
        None if lox.reporter().had_runtime_error() => std::process::exit(EXIT_RUNTIME_ERROR),
        None => std::process::exit(EXIT_STATIC_ERROR),
    }
}

fn run(source: &str) {
    let mut lox = Lox::new(ConsoleReporter);

    match lox.run(source) {
        RunOutcome::Completed => info!("Program executed successfully"),
        RunOutcome::StaticError => std::process::exit(EXIT_STATIC_ERROR),
        RunOutcome::RuntimeError => std::process::exit(EXIT_RUNTIME_ERROR),
    }
}

fn repl() -> Result<()> {
    let mut lox = Lox::new(ConsoleReporter);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("Failed to flush prompt")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 {
            println!();
            return Ok(());
        }

        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        // expressions are echoed, anything else runs as a program
        if is_expression(line) {
            if let Some(value) = lox.evaluate_expression(line) {
                println!("{}", value);
            }
        } else {
            let outcome = lox.run(line);
            debug!("REPL line finished: {:?}", outcome);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    debug!("{:?}", cli);

    match cli.commands {
        Commands::Tokenize { filename } => tokenize(&source_or_exit(filename)?),

        Commands::Parse { filename } => parse(&source_or_exit(filename)?),

        Commands::Evaluate { filename } => evaluate(&source_or_exit(filename)?),

        Commands::Run { filename } => {
            let source = source_or_exit(filename)?;
            info!("Provided input:\n {}", source);
            run(&source);
        }

        Commands::Analyze { filename } => {
            let analysis = analyze(&source_or_exit(filename)?);
            let json = serde_json::to_string_pretty(&analysis).context("Failed to encode analysis")?;
            println!("{}", json);
        }

        Commands::Repl => repl()?,
    }

    Ok(())
}
