//! trailcheck - Lint commit messages and resolve the work they reference
//!
//! `trailcheck check` validates a message (summary, body, trailers) and
//! looks up every ticket, changeset and username it mentions.
//! `trailcheck lsp` serves the same over the language server protocol.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use figue as args;
use trailcheck::config::{Config, default_config_path, load_config};
use trailcheck::output::{OutputFormat, render_report};
use trailcheck::{HttpFetcher, Resolver};

/// CLI arguments
#[derive(Debug, facet::Facet)]
struct Args {
    /// Subcommand to run
    #[facet(args::subcommand)]
    command: Command,

    /// Path to config file (default: .config/trailcheck/config.yaml)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[facet(args::named, args::short = 'v', default)]
    verbose: bool,
}

/// Subcommands
#[derive(Debug, facet::Facet)]
#[repr(u8)]
enum Command {
    /// Check a commit message file (or stdin)
    Check {
        /// Message file, e.g. .git/COMMIT_EDITMSG
        #[facet(args::positional, default)]
        file: Option<PathBuf>,

        /// Only validate the grammar, don't look anything up
        #[facet(args::named, default)]
        offline: bool,

        /// Output format: text, json
        #[facet(args::named, args::short = 'f', default)]
        format: Option<String>,
    },

    /// Run the language server over stdio
    Lsp {},
}

fn main() -> Result<()> {
    let args: Args =
        figue::from_std_args().wrap_err("Failed to parse command line arguments")?;

    setup_tracing(args.verbose);

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path(
            &std::env::current_dir().wrap_err("Failed to get current directory")?,
        ),
    };
    let config = load_config(&config_path)?;

    // Lookups interleave on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("Failed to start async runtime")?;

    match args.command {
        Command::Check {
            file,
            offline,
            format,
        } => runtime.block_on(run_check(&config, file, offline, format)),
        Command::Lsp {} => runtime.block_on(trailcheck::lsp::run(config)),
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    // stdout carries reports and LSP traffic
    let filter = EnvFilter::try_from_env("TRAILCHECK_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("trailcheck=debug")
        } else {
            EnvFilter::new("trailcheck=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_check(
    config: &Config,
    file: Option<PathBuf>,
    offline: bool,
    format: Option<String>,
) -> Result<()> {
    let format = match format {
        Some(name) => OutputFormat::from_str(&name)
            .ok_or_else(|| {
                eyre::eyre!("Unknown output format '{}' (expected text or json)", name)
            })?,
        None => OutputFormat::default(),
    };

    let (source, text) = match file {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
            (path.display().to_string(), text)
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .wrap_err("Failed to read commit message from stdin")?;
            ("<stdin>".to_string(), text)
        }
    };

    let resolver = (!offline).then(|| {
        let fetch = Arc::new(HttpFetcher::new(config.fetch_timeout()));
        Resolver::from_config(config, fetch)
    });

    let report = trailcheck::check(source, &text, resolver).await;
    print!("{}", render_report(&report, format)?);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}
