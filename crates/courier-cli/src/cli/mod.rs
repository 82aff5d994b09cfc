//! CLI for the courier download queue.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use courier_core::config;
use courier_core::{Courier, QualitySpec};

use crate::adapters::{DirDelivery, HttpExtractor};
use commands::{
    run_cancel, run_jobs, run_stats, run_status, run_submit, run_user_stats, run_workers,
};

/// Top-level CLI for the courier download queue.
#[derive(Debug, Parser)]
#[command(name = "courier")]
#[command(about = "courier: bounded, fair download-and-delivery job queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Submit a new download job for a user.
    Submit {
        /// Requesting user id.
        owner: String,

        /// HTTP/HTTPS source URL.
        url: String,

        /// Requested quality: best, hd, sd480, sd360, audio.
        #[arg(long, default_value = "best")]
        quality: QualitySpec,

        /// Display name recorded on the user's profile.
        #[arg(long)]
        name: Option<String>,
    },

    /// Run the worker pool until the queue drains.
    Run {
        /// Override the configured worker count.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Show one job by its ID.
    Status {
        /// Job identifier.
        id: u64,
    },

    /// List a user's jobs, newest first.
    Jobs {
        /// User id.
        owner: String,
    },

    /// Cancel a queued or running job by its ID.
    Cancel {
        /// Job identifier.
        id: u64,
    },

    /// Show global usage statistics.
    Stats,

    /// Show one user's usage statistics.
    UserStats {
        /// User id.
        owner: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        if let CliCommand::Run {
            workers: Some(n), ..
        } = &cli.command
        {
            cfg.workers = *n;
        }

        let delivered_root = cfg.state_dir()?.join("delivered");
        let max_artifact_bytes = cfg.max_artifact_bytes;
        let courier = Courier::open(
            cfg,
            Arc::new(HttpExtractor::new()),
            Arc::new(DirDelivery::new(delivered_root, max_artifact_bytes)),
        )
        .await?;

        match cli.command {
            CliCommand::Submit {
                owner,
                url,
                quality,
                name,
            } => run_submit(&courier, &owner, name.as_deref(), &url, quality).await?,
            CliCommand::Run { .. } => run_workers(&courier).await?,
            CliCommand::Status { id } => run_status(&courier, id).await?,
            CliCommand::Jobs { owner } => run_jobs(&courier, &owner).await?,
            CliCommand::Cancel { id } => run_cancel(&courier, id).await?,
            CliCommand::Stats => run_stats(&courier).await?,
            CliCommand::UserStats { owner } => run_user_stats(&courier, &owner).await?,
        }

        Ok(())
    }
}
