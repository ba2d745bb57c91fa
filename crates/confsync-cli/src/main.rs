//! confsync command-line tool
//!
//! Inspects the configuration subscription document, validates variables
//! bundles and replays recorded payloads through the client pipeline.

mod commands;
mod config;
mod error;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use confsync_client::ClientConfig;
use formatter::OutputFormat;

/// confsync command-line tool
#[derive(Parser, Debug)]
#[command(name = "confsync")]
#[command(version, about = "Configuration subscription tools")]
pub struct Args {
    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the ConfigurationSubscription descriptor
    Document,

    /// Validate a variables JSON file
    Validate {
        /// Variables file
        #[arg(long)]
        variables: PathBuf,
    },

    /// Replay recorded payloads (one JSON object per line)
    Replay {
        /// Payload file
        #[arg(long)]
        payloads: PathBuf,

        /// Variables file; defaults to page 1 of 10 for every selector
        #[arg(long)]
        variables: Option<PathBuf>,

        #[command(flatten)]
        client: config::ClientArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("confsync=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), error::CliError> {
    let formatter = formatter::create_formatter(args.format);

    match &args.command {
        Command::Document => println!("{}", commands::document(&*formatter)?),
        Command::Validate { variables } => {
            println!("{}", commands::validate(variables, &*formatter)?)
        }
        Command::Replay {
            payloads,
            variables,
            client,
        } => {
            let config = ClientConfig::from(client);
            config.validate()?;
            println!(
                "{}",
                commands::replay(payloads, variables.as_deref(), config, &*formatter).await?
            );
        }
    }

    Ok(())
}
