//! `catalog` binary: command-line front end for the harvester.

use anyhow::Result;
use catalog_runtime::cli::{extract_cmd, learn_cmd, scan_cmd};
use catalog_runtime::config::PipelineConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Find the product pages of a storefront and extract them")]
#[command(version)]
struct Cli {
    /// Machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Only print results, no progress or summary
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging and detailed summaries
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (default: ~/.catalog/config.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Per-run settings that take precedence over the config file.
#[derive(Args)]
struct Overrides {
    /// Requests per second against the target host
    #[arg(long, global = true)]
    rps: Option<f64>,

    /// Extraction worker count
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Stop the run after this many seconds
    #[arg(long, global = true)]
    deadline: Option<u64>,

    /// Stop once this share of URLs has failed (0.0 - 1.0)
    #[arg(long, global = true)]
    failure_threshold: Option<f64>,

    /// Ignore robots.txt Allow/Disallow and Crawl-delay
    #[arg(long, global = true)]
    ignore_robots: bool,
}

impl Overrides {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(rps) = self.rps {
            config.requests_per_second = rps;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout_ms {
            config.request_timeout_ms = timeout;
        }
        if let Some(deadline) = self.deadline {
            config.run_deadline_secs = Some(deadline);
        }
        if let Some(threshold) = self.failure_threshold {
            config.failure_threshold = Some(threshold);
        }
        if self.ignore_robots {
            config.respect_robots = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Full run: discover, learn, extract, and write a JSONL product log
    Scan {
        /// Site root, e.g. loja.com.br
        site: String,

        /// Output file (default: ~/.catalog/runs/<run-id>.jsonl)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Discover candidate URLs and learn the product pattern only
    Learn {
        /// Site root, e.g. loja.com.br
        site: String,

        /// Matched URLs to list
        #[arg(long, default_value_t = 10)]
        show: usize,
    },

    /// Fetch one page and print the extracted product
    Extract {
        /// Product page URL
        url: String,
    },
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "catalog_runtime=debug"
    } else if cli.quiet || cli.json {
        "catalog_runtime=warn"
    } else {
        "catalog_runtime=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Output helpers read these
    if cli.json {
        std::env::set_var("CATALOG_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("CATALOG_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("CATALOG_VERBOSE", "1");
    }

    init_tracing(&cli);

    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command {
        Commands::Scan { site, output } => scan_cmd::run(&site, config, output).await,
        Commands::Learn { site, show } => learn_cmd::run(&site, config, show).await,
        Commands::Extract { url } => extract_cmd::run(&url, config).await,
    }
}
