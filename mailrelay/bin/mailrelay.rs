//! Command-line entry point for the mail forwarder
//!
//! - `process`: handle a queue event, as delivered by the queue
//! - `forward`: forward one stored message directly, for debugging
//! - `ledger show`: inspect the processing state of a queue message

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use mailrelay::{Controller, Mailrelay, find_config_file};
use mailrelay_common::logging;
use mailrelay_delivery::{Outcome, QueueEvent, StorageNotification};

/// Forward inbound mail announced on a queue
#[derive(Parser, Debug)]
#[command(name = "mailrelay")]
#[command(about = "Forward inbound mail announced on a queue", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to MAILRELAY_CONFIG, then the standard
    /// locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process a queue event file
    Process {
        /// JSON document with a `Records` array
        #[arg(short, long)]
        event: PathBuf,

        /// Write records that were not acknowledged to this file
        #[arg(long)]
        requeue: Option<PathBuf>,
    },
    /// Forward one stored message without the ledger or queue
    Forward {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        key: String,
    },
    /// Ledger inspection
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Print the ledger entry of a queue message
    Show {
        message_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let controller = Controller::new(Mailrelay::load(&config_path)?);

    match cli.command {
        Commands::Process { event, requeue } => process(&controller, event, requeue).await,
        Commands::Forward { bucket, key } => {
            let delivered = controller
                .forward(&StorageNotification { bucket, key })
                .await?;
            println!(
                "Forwarded as {} to {}",
                delivered.provider_message_id,
                delivered.destinations.join(", ")
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ledger {
            action: LedgerAction::Show { message_id },
        } => match controller.ledger_entry(&message_id).await? {
            Some(entry) => {
                for (field, value) in entry.fields() {
                    println!("{field:<17} {value}");
                }
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("No ledger entry for {message_id}");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

async fn process(
    controller: &Controller,
    event: PathBuf,
    requeue: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let bytes = tokio::fs::read(&event)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read event from {}: {e}", event.display()))?;
    let processed = controller.process(QueueEvent::from_slice(&bytes)?).await?;

    for record in &processed.report.records {
        match &record.result {
            Ok(Outcome::Forwarded(delivered)) => println!(
                "{}: forwarded as {} to {}",
                record.message_id,
                delivered.provider_message_id,
                delivered.destinations.join(", ")
            ),
            Ok(Outcome::Duplicate) => println!("{}: duplicate, acknowledged", record.message_id),
            Err(e) => println!("{}: failed: {e}", record.message_id),
        }
    }
    println!("{}", processed.report);

    if let Some(path) = requeue {
        let event = QueueEvent {
            records: processed.unacknowledged,
        };
        tokio::fs::write(&path, event.to_vec()?).await?;
        println!(
            "Wrote {} unacknowledged records to {}",
            event.records.len(),
            path.display()
        );
    }

    Ok(if processed.report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
