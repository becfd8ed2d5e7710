mod commands;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "trackdb-cli")]
#[command(about = "Multi-carrier shipment tracking command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Look up a shipment live without storing it
    Query {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        options: LookupOptions,
    },
    /// Look up a shipment and store the result
    Track {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        options: LookupOptions,
    },
    /// Show the stored record for a shipment
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Stop tracking a shipment and delete its record
    Untrack {
        #[command(flatten)]
        target: Target,
    },
    /// Show record counts by carrier
    Stats,
    /// List carriers with configured credentials
    Carriers,
    /// Run one reconciliation pass over stale records
    Reconcile,
    /// Build a report from stored records
    Report {
        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,
        /// Carrier and ids as `carrier:id1,id2`; repeat for more carriers
        #[arg(long = "ids", required = true)]
        ids: Vec<String>,
        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<std::path::PathBuf>,
    },
}

#[derive(Debug, Args)]
struct Target {
    /// Carrier id, e.g. `ups` or `purolator`
    carrier: String,
    tracking_number: String,
}

#[derive(Debug, Default, Args)]
struct LookupOptions {
    /// Start of the search window (YYYY-MM-DD)
    #[arg(long)]
    date_from: Option<NaiveDate>,
    /// End of the search window (YYYY-MM-DD)
    #[arg(long)]
    date_to: Option<NaiveDate>,
    /// Ask the carrier for proof-of-delivery details
    #[arg(long)]
    proof_of_delivery: bool,
    #[arg(long)]
    include_detailed_view: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = trackdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Migrate => commands::run_migrate(&config).await,
        Commands::Query { target, options } => {
            commands::run_query(&config, &target, &options).await
        }
        Commands::Track { target, options } => {
            commands::run_track(&config, &target, &options).await
        }
        Commands::Status { target } => commands::run_status(&config, &target).await,
        Commands::Untrack { target } => commands::run_untrack(&config, &target).await,
        Commands::Stats => commands::run_stats(&config).await,
        Commands::Carriers => commands::run_carriers(&config),
        Commands::Reconcile => commands::run_reconcile(&config).await,
        Commands::Report {
            format,
            ids,
            output,
        } => commands::run_report(&config, format, &ids, output.as_deref()).await,
    }
}
