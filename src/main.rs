use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::Subcommand;
use lox_expr::{Expr, LexerConfig, Phase, lex};
use miette::{Diagnostic, IntoDiagnostic, NamedSource, WrapErr};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Tokenize, parse and evaluate Lox expressions")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log every character the lexer examines
    #[arg(long, global = true)]
    trace_lexer: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Tokenize { filename: PathBuf },
    Parse { filename: PathBuf },
    Evaluate { filename: PathBuf },
}

impl Commands {
    fn filename(&self) -> &Path {
        match self {
            Commands::Tokenize { filename }
            | Commands::Parse { filename }
            | Commands::Evaluate { filename } => filename,
        }
    }
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.trace_lexer);

    let config = LexerConfig {
        trace: args.trace_lexer,
        ..LexerConfig::default()
    };
    let filename = args.command.filename();
    let file_contents = fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;

    let outcome = match &args.command {
        Commands::Tokenize { .. } => tokenize(&file_contents, config),
        Commands::Parse { .. } => {
            front_end(filename, &file_contents, config).map(|expr| println!("{expr}"))
        }
        Commands::Evaluate { .. } => {
            front_end(filename, &file_contents, config).and_then(|expr| {
                match lox_expr::evaluate(Some(&expr)) {
                    Ok(value) => {
                        println!("{value}");
                        Ok(())
                    }
                    Err(e) => {
                        eprintln!("{:?}", report(e, filename, &file_contents));
                        Err(Phase::Runtime)
                    }
                }
            })
        }
    };

    if let Err(phase) = outcome {
        tracing::debug!(?phase, "exiting after failure");
        std::process::exit(phase.exit_code());
    }
    Ok(())
}

/// Prints every token and every lexical error, in source order.
fn tokenize(source: &str, config: LexerConfig) -> Result<(), Phase> {
    let lexed = lex(source, config);
    for entry in &lexed.entries {
        match entry {
            Ok(token) => println!("{token}"),
            Err(e) => eprintln!("{e}"),
        }
    }

    if lexed.has_errors() {
        return Err(Phase::Lex);
    }
    Ok(())
}

/// Lexes and parses `source`, reporting the first stage that fails.
fn front_end<'de>(filename: &Path, source: &'de str, config: LexerConfig) -> Result<Expr<'de>, Phase> {
    let tokens = match lex(source, config).into_tokens() {
        Ok(tokens) => tokens,
        Err(errors) => {
            for e in errors {
                eprintln!("{:?}", report(e, filename, source));
            }
            return Err(Phase::Lex);
        }
    };

    lox_expr::parse(&tokens).map_err(|e| {
        eprintln!("{:?}", report(e, filename, source));
        Phase::Parse
    })
}

fn report(
    error: impl Diagnostic + Send + Sync + 'static,
    filename: &Path,
    source: &str,
) -> miette::Report {
    miette::Report::new(error).with_source_code(NamedSource::new(
        filename.display().to_string(),
        source.to_string(),
    ))
}

fn init_tracing(verbose: u8, trace_lexer: bool) {
    let default = match (verbose, trace_lexer) {
        (_, true) | (2.., _) => "trace",
        (1, _) => "debug",
        (0, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
