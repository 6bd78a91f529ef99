use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_lctr::app::{App, RunResult, list_rank_cache};
use kira_lctr::config::{ConfigLoader, ConfigOverrides};
use kira_lctr::error::LctrError;
use kira_lctr::ncbi::NcbiHttpClient;
use kira_lctr::output::{JsonOutput, LogProgress, OutputMode};
use kira_lctr::store::Store;

#[derive(Parser)]
#[command(name = "kira-lctr")]
#[command(about = "Best hits, lowest common taxonomic rank and NCBI ranks for BLAST results")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the full consensus pipeline")]
    Run(RunArgs),
    #[command(about = "List cached taxon ranks")]
    Cache(CacheArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    project: Option<String>,

    #[arg(long)]
    input: Option<String>,

    #[arg(long)]
    fasta: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    rank_cache: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    min_coverage: Option<f64>,
}

#[derive(Args)]
struct CacheArgs {
    #[arg(long)]
    rank_cache: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LctrError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LctrError) -> u8 {
    match error {
        LctrError::MissingConfig | LctrError::MissingInput(_) => 2,
        LctrError::NcbiHttp(_) | LctrError::NcbiStatus { .. } | LctrError::NcbiDecode(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_pipeline(args, output_mode),
        Commands::Cache(args) => run_cache(args, output_mode),
    }
}

fn run_pipeline(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let overrides = ConfigOverrides {
        project: args.project,
        input: args.input,
        fasta: args.fasta,
        output_dir: args.output_dir,
        rank_cache: args.rank_cache,
        workers: args.workers,
        min_query_coverage: args.min_coverage,
    };
    let resolved = ConfigLoader::resolve(args.config.as_deref(), overrides)?;
    let store = Store::new(resolved.output_dir.clone())?;
    let client = NcbiHttpClient::new(&resolved.ncbi)?;
    let app = App::new(store, client);

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&resolved, &JsonOutput)?;
            JsonOutput::print_run(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.run(&resolved, &LogProgress)?;
            print_run_summary(&result);
        }
    }
    Ok(())
}

fn run_cache(args: CacheArgs, output_mode: OutputMode) -> miette::Result<()> {
    let path = match args.rank_cache {
        Some(path) => Utf8PathBuf::from(path),
        None => Store::new(Utf8PathBuf::from("."))?.default_rank_cache_path(),
    };
    let listing = list_rank_cache(&path);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_cache(&listing).into_diagnostic()?,
        OutputMode::Interactive => {
            println!("Rank cache: {} ({} entries)", listing.path, listing.entries.len());
            for entry in &listing.entries {
                println!("{}\t{}", entry.taxon, entry.rank);
            }
        }
    }
    Ok(())
}

fn print_run_summary(result: &RunResult) {
    println!("Project: {}", result.project);
    println!(
        "Hits: {} read, {} after coverage filter",
        result.input_hits, result.hits_passing_coverage
    );
    if result.skipped_blast_rows > 0 {
        println!("Warning: {} malformed BLAST rows skipped", result.skipped_blast_rows);
    }
    println!(
        "Taxonomy: {} of {} ids resolved ({} failed batches)",
        result.taxonomy_records, result.unique_taxids, result.failed_taxonomy_batches
    );
    println!(
        "Queries: {} ({} species-level, {} unresolved)",
        result.queries, result.species_level, result.unresolved
    );
    println!(
        "Ranks: {} cached, {} looked up ({} not found, {} errors)",
        result.rank_lookup.cached,
        result.rank_lookup.looked_up,
        result.rank_lookup.not_found,
        result.rank_lookup.lookup_errors
    );
    if !result.rank_cache_saved {
        println!("Warning: rank cache {} was not saved", result.rank_cache);
    }
    println!("Outputs:");
    println!("  {}", result.outputs.taxonomy);
    println!("  {}", result.outputs.merged);
    println!("  {}", result.outputs.best_hits);
    println!("  {}", result.outputs.consensus);
    println!("  {}", result.outputs.ranked_consensus);
}
