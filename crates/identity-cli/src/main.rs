//! didkit - AT Protocol identity lookups from the command line
//!
//! Resolves handles and DIDs, verifies handles, checks account status on the
//! PDS, and reads the PLC directory's audit logs and export stream. Results are
//! printed to stdout as JSON lines; logs go to stderr.

mod commands;
mod config;
mod error;

use std::io;

use atproto_identity::IdentityResolver;
use clap::{Parser, Subcommand};
use plc_directory::{PlcImporter, Since};
use tracing::{debug, error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::{Config, Overrides};
use crate::error::Result;

/// AT Protocol identity toolkit
#[derive(Parser)]
#[command(name = "didkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a handle to a DID
    Resolve {
        /// Handle such as alice.bsky.social (a leading @ is allowed)
        handle: String,
    },
    /// Fetch and print the identity document of a DID or handle
    Document {
        /// DID or handle
        input: String,
    },
    /// Find the first handle in the document that resolves back to the DID
    Verify {
        /// DID or handle
        input: String,
    },
    /// Ask the account's PDS whether its repository is active
    Status {
        /// DID or handle
        input: String,
    },
    /// Print the full operation history of a did:plc
    AuditLog {
        did: String,
    },
    /// Stream operations from the PLC directory export
    Export {
        /// "beginning", "now" or an RFC 3339 timestamp
        #[arg(long, default_value = "now")]
        since: Since,

        /// Skip malformed records instead of stopping
        #[arg(long)]
        lenient: bool,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
}

fn init_logging(config: &Config) -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("identity_cli=info".parse()?)
        .add_directive("atproto_identity=info".parse()?)
        .add_directive("plc_directory=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if config.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    }

    Ok(())
}

fn plc_importer(config: &Config, since: Since) -> PlcImporter {
    PlcImporter::new(since)
        .with_plc_directory(config.plc_directory_url.clone())
        .with_request_options(config.request_options())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let resolver = IdentityResolver::from_config(config.resolver_config());
    let mut out = io::stdout().lock();

    match cli.command {
        Command::Resolve { handle } => commands::resolve(&resolver, &handle, &mut out).await,
        Command::Document { input } => commands::document(&resolver, &input, &mut out).await,
        Command::Verify { input } => commands::verify(&resolver, &input, &mut out).await,
        Command::Status { input } => commands::status(&resolver, &input, &mut out).await,
        Command::AuditLog { did } => {
            commands::audit_log(&mut plc_importer(&config, Since::Now), &did, &mut out).await
        }
        Command::Export {
            since,
            lenient,
            max_pages,
        } => {
            let mut importer = plc_importer(&config, since);
            if lenient {
                importer = importer.on_error(|json, _| debug!("Discarded record: {}", json));
            }
            commands::export(&mut importer, max_pages, &mut out)
                .await
                .map(|_| ())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config.with_overrides(cli.overrides.clone()),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    info!("PLC directory: {}", config.plc_directory_url);

    if let Err(e) = run(cli, config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
