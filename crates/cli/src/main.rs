use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info};

mod offline;
mod serve;

#[derive(Parser, Debug)]
#[command(name = "conduitctl", version, about = "Messaging ownership operator and admission webhook")]
struct Cli {
    /// Restrict watches to one namespace (default: all namespaces)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the admission webhook and, unless disabled, the reconciliation controller
    Serve(serve::ServeArgs),
    /// Print the custom resource definitions as multi-document YAML
    Crds,
    /// Check that tool credentials resolve (values are redacted)
    Credentials {
        /// Secret mount directory (default: CONDUKTOR_SECRET_PATH or /var/run/secrets/conduktor)
        #[arg(long = "secret-dir")]
        secret_dir: Option<PathBuf>,
    },
    /// Validate a file of resources offline and print the target resources they produce
    Render {
        /// YAML file with one or more resources ("-" for stdin)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Validate, transform and apply a file of resources through the command tool
    Apply {
        /// YAML file with one or more resources ("-" for stdin)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        /// Ask the tool to validate without applying
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("CONDUIT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CONDUIT_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CONDUIT_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve::run(args, cli.namespace).await?,
        Commands::Crds => print!("{}", conduit_schema::render_crds()?),
        Commands::Credentials { secret_dir } => {
            let loaded = match secret_dir {
                Some(dir) => conduit_apply::Credentials::load_from(&dir),
                None => conduit_apply::Credentials::load(),
            };
            match loaded {
                Ok(creds) => {
                    info!("credentials resolved");
                    println!("{:#?}", creds);
                }
                Err(e) => {
                    error!(error = %e, "credentials incomplete");
                    return Err(e.into());
                }
            }
        }
        Commands::Render { file } => offline::render(&file).await?,
        Commands::Apply { file, dry_run } => offline::apply(&file, dry_run).await?,
    }
    Ok(())
}
