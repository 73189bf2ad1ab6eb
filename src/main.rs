use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use lintloop::analysis::{CatalogLookup, DiagnosticExtractor, DiagnosticLookup, NoCatalog};
use lintloop::config::Config;
use lintloop::fragment;
use lintloop::improve::Improver;
use lintloop::logging;
use lintloop::refactor::{RefactorReport, Refactorer, RefactorError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "lintloop",
    about = "Lint-driven rewriting of Python files through an LLM",
    version
)]
struct Cli {
    /// Config file (defaults to ~/.config/lintloop/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output; repeat for debug
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rewrite a file round by round until the analyzer is satisfied
    Improve(ImproveArgs),
    /// Refactor selected top-level functions in place
    Refactor(RefactorArgs),
    /// List top-level functions with their line spans
    Functions(FileArgs),
    /// Show analyzer findings with their descriptions
    Diagnostics(FileArgs),
}

#[derive(Args, Debug)]
struct ImproveArgs {
    file: PathBuf,
    #[arg(long)]
    iterations: Option<u32>,
    /// Where revisions are written (defaults to the file's directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RefactorArgs {
    file: PathBuf,
    /// Function to refactor; may be repeated
    #[arg(long = "function", required_unless_present = "line", conflicts_with = "line")]
    functions: Vec<String>,
    /// Refactor the function spanning this 1-based line
    #[arg(long)]
    line: Option<usize>,
}

#[derive(Args, Debug)]
struct FileArgs {
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = Config::load(cli.config.as_deref());

    match cli.command {
        Commands::Improve(args) => run_improve(&config, args).await,
        Commands::Refactor(args) => run_refactor(&config, args).await,
        Commands::Functions(args) => run_functions(&args.file),
        Commands::Diagnostics(args) => run_diagnostics(&config, &args.file),
    }
}

fn lookup(config: &Config) -> Result<Box<dyn DiagnosticLookup>> {
    match &config.catalog.path {
        Some(path) => {
            let catalog = CatalogLookup::load(path)?;
            if catalog.is_empty() {
                warn!(path = %path.display(), "diagnostic catalog has no entries");
            } else {
                info!(path = %path.display(), entries = catalog.len(), "diagnostic catalog loaded");
            }
            Ok(Box::new(catalog))
        }
        None => Ok(Box::new(NoCatalog)),
    }
}

fn api_key() -> Result<String> {
    Config::get_api_key()
        .context("No OpenRouter API key. Set OPENROUTER_API_KEY or store one in the system keychain")
}

fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    Ok(())
}

async fn run_improve(config: &Config, args: ImproveArgs) -> Result<()> {
    require_file(&args.file)?;
    let oracle = config.oracle(api_key()?);
    let analyzer = config.analyzer();
    let formatter = config.format_chain();
    let lookup = lookup(config)?;

    let mut settings = config.improve_settings();
    if let Some(iterations) = args.iterations {
        settings.max_iterations = iterations;
    }
    if args.output_dir.is_some() {
        settings.output_dir = args.output_dir;
    }

    let improver = Improver::new(&analyzer, lookup.as_ref(), &formatter, &oracle, settings);
    let outcome = improver.run(&args.file).await?;

    println!(
        "{} after {} round(s), {} revision(s)",
        outcome.stop.describe(),
        outcome.rounds,
        outcome.log.len()
    );
    for revision in &outcome.log.revisions {
        println!(
            "  {:>2}. {} ({} diagnostics)",
            revision.iteration,
            revision.path.display(),
            revision.diagnostic_count
        );
    }
    println!("Final: {}", outcome.final_path().display());
    Ok(())
}

async fn run_refactor(config: &Config, args: RefactorArgs) -> Result<()> {
    require_file(&args.file)?;
    let oracle = config.oracle(api_key()?);
    let refactorer = Refactorer::new(&oracle, config.refactor_settings());

    let results: Vec<(String, std::result::Result<RefactorReport, RefactorError>)> =
        match args.line {
            Some(line) => {
                let result = refactorer.refactor_at_line(&args.file, line).await;
                vec![(format!("line {line}"), result)]
            }
            None => refactorer.refactor_functions(&args.file, &args.functions).await,
        };

    let mut failed = 0;
    for (target, result) in &results {
        match result {
            Ok(report) => println!(
                "+ {} (lines {}-{}): {} -> {} lines in file",
                report.name,
                report.replaced.start_line,
                report.replaced.end_line,
                report.lines_before,
                report.lines_after
            ),
            Err(err) => {
                failed += 1;
                println!("x {target}: {err}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} refactor(s) failed", results.len());
    }
    info!(count = results.len(), "refactor complete");
    Ok(())
}

fn run_functions(path: &Path) -> Result<()> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    for span in fragment::list_functions(&source)? {
        println!("{:>5}-{:<5} {}", span.start_line, span.end_line, span.name);
    }
    Ok(())
}

fn run_diagnostics(config: &Config, path: &Path) -> Result<()> {
    require_file(path)?;
    let analyzer = config.analyzer();
    let lookup = lookup(config)?;
    let extractor = DiagnosticExtractor::new(&analyzer, lookup.as_ref());
    let (diagnostics, score) = extractor.extract_with_score(path)?;

    if diagnostics.is_empty() {
        println!("No diagnostics.");
    } else {
        println!("{}", diagnostics.format_for_prompt());
    }
    if let Some(score) = score {
        println!("Score: {score:.2}/10");
    }
    Ok(())
}
