//! Transfer command - Moves a file through the revision transfer engine
//!
//! Both endpoints are local files; `--strategy` decides how they are
//! presented to the engine so each transfer shape can be exercised:
//! - `upload`: stream-backed source into a stream-backed destination
//! - `download`: opaque source pulled through the destination stream
//! - `relay`: both sides opaque, bridged by the bounded pipe

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use syncroot_core::config::Config;
use syncroot_core::ports::{DestinationRevision, SourceRevision};
use syncroot_transfer::{LocalFileDestination, LocalFileRevision, TransferEngine};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output::{format_bytes, OutputFormat};

/// How the two files are presented to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Upload,
    Download,
    Relay,
}

/// Copy a file through the transfer engine
#[derive(Debug, Args)]
pub struct TransferCommand {
    /// File to read
    pub source: PathBuf,

    /// File to write; replaced only when the transfer succeeds
    pub destination: PathBuf,

    /// Transfer shape to use
    #[arg(long, value_enum, default_value = "upload")]
    pub strategy: StrategyArg,

    /// Shorthand for `--strategy relay`
    #[arg(long, conflicts_with = "strategy")]
    pub relay: bool,
}

impl TransferCommand {
    fn strategy(&self) -> StrategyArg {
        if self.relay {
            StrategyArg::Relay
        } else {
            self.strategy
        }
    }

    fn revisions(&self) -> (SourceRevision, DestinationRevision) {
        let source = LocalFileRevision::new(&self.source);
        let destination = LocalFileDestination::new(&self.destination);
        match self.strategy() {
            StrategyArg::Upload => (
                SourceRevision::StreamBacked(Box::new(source)),
                DestinationRevision::StreamBacked(Box::new(destination)),
            ),
            StrategyArg::Download => (
                SourceRevision::OpaqueRemote(Box::new(source)),
                DestinationRevision::StreamBacked(Box::new(destination)),
            ),
            StrategyArg::Relay => (
                SourceRevision::OpaqueRemote(Box::new(source)),
                DestinationRevision::OpaqueRemote(Box::new(destination)),
            ),
        }
    }

    /// Execute the transfer; Ctrl-C cancels it and leaves the destination untouched
    pub async fn execute(&self, format: OutputFormat, config: &Config) -> Result<()> {
        let formatter = format.formatter();
        let engine = TransferEngine::from_config(&config.transfer);

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        info!(
            source = %self.source.display(),
            destination = %self.destination.display(),
            strategy = ?self.strategy(),
            "Starting transfer"
        );
        let (source, destination) = self.revisions();

        match engine.transfer(source, destination, &cancel).await {
            Ok(report) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "strategy": report.strategy.to_string(),
                        "bytes": report.bytes,
                        "destination": self.destination.display().to_string(),
                    }));
                } else {
                    formatter.success(&format!(
                        "Transferred {} ({})",
                        format_bytes(report.bytes),
                        report.strategy
                    ));
                    formatter.info(&format!("Written to {}", self.destination.display()));
                }
                Ok(())
            }
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "cancelled": e.is_cancellation(),
                        "error": e.to_string(),
                    }));
                }
                Err(anyhow::Error::new(e).context("transfer failed"))
            }
        }
    }
}
