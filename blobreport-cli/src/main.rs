use anyhow::{Context, Result, bail};
use blobreport_cli::{DEFAULT_CONFIG_FILE, HostConfig};
use blobreport_cloud::AzureBlobPublisher;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "blobreport", version, about = "Publish visual regression reports to Azure Blob Storage")]
struct Arguments {
    /// Host configuration file.
    #[arg(short, long, global = true, env = "BLOBREPORT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Compute results without writing anything remotely.
    #[arg(long, global = true)]
    no_emit: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload the working directory under KEY and print the report URL.
    Publish { key: String },
    /// Download the snapshots published under KEY into the expected directory.
    Fetch { key: String },
    /// Print a freshly signed access token.
    Sign,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let host = HostConfig::load(&args.config)?;
    let root = args
        .config
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let publisher = AzureBlobPublisher::init(host.create_options(&root, args.no_emit)?)
        .context("initializing publisher")?;

    match args.command {
        Command::Publish { key } => {
            let outcome = publisher.publish(&key).await?;
            match outcome.report_url {
                Some(url) => println!("{url}"),
                None => tracing::warn!("published {key}, but the report has no index.html"),
            }
        }
        Command::Fetch { key } => {
            let fetched = publisher.fetch(&key).await?;
            tracing::info!("fetched {} snapshots of {key}", fetched.len());
        }
        Command::Sign => match publisher.issue_token().await? {
            Some(token) => println!("?{token}"),
            None => bail!("signing is not configured: set accountName and sasExpiryHour"),
        },
    }

    Ok(())
}
