mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use exediff_common::types::ComparisonPolicy;
use tracing::error;

use commands::RunOptions;

#[derive(Parser)]
#[command(name = "exediff")]
#[command(about = "exediff - Run functional test executables and compare their output with reference files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test cases (all discovered cases when no names are given)
    Run {
        /// Case names (e.g., chart_layout01 or test_chart_layout01)
        names: Vec<String>,

        /// Harness config file (defaults to config/harness.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Per-case timeout in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Comparison policy (exact, xlsx)
        #[arg(short, long)]
        policy: Option<ComparisonPolicy>,

        /// Leave produced files on disk
        #[arg(long, default_value = "false")]
        keep_output: bool,

        /// Print the suite report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List discoverable test cases
    List {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compare two files directly
    Diff {
        /// File produced by a test run
        got: PathBuf,

        /// Reference file
        expected: PathBuf,

        /// Comparison policy (derived from GOT's extension by default)
        #[arg(short, long)]
        policy: Option<ComparisonPolicy>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so `--json` output on stdout stays parseable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if std::env::var("EXEDIFF_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let outcome = match cli.command {
        Commands::Run {
            names,
            config,
            timeout_ms,
            policy,
            keep_output,
            json,
        } => {
            let options = RunOptions {
                names,
                timeout_ms,
                policy,
                keep_output,
                json,
            };
            commands::run_cases(config.as_deref(), options).await
        }
        Commands::List { config } => commands::list_cases(config.as_deref()).map(|()| true),
        Commands::Diff {
            got,
            expected,
            policy,
        } => commands::diff_files(&got, &expected, policy).await,
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}
