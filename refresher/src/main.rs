//! Data refresh service binary.
//!
//! Periodically rebuilds the dormant donor database when a new HLA nomenclature version is
//! published, and exposes the administrative entry points for forcing, continuing and cleaning
//! up refreshes.

use clap::{Parser, Subcommand};
use ::config::shared::RefresherConfig;
use telemetry::tracing::init_tracing;
use tracing::{debug, error};

use crate::config::load_refresher_config;
use crate::core::start_refresher_with_config;
use crate::error::{RefresherError, RefresherResult};

mod config;
mod core;
mod error;
mod migrations;
mod notification;
mod services;

#[derive(Parser, Debug)]
#[command(name = "refresher", about = "Refreshes the dormant donor database")]
struct Args {
    /// Defaults to `run` when omitted.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Continue an interrupted refresh, then check for new nomenclature versions on a schedule
    Run,
    /// Refresh once if a newer nomenclature version is available
    Refresh,
    /// Refresh at the latest nomenclature version even if the active database already uses it
    ForceRefresh,
    /// Continue the refresh left in progress by a previous process
    Continue,
    /// Tear down refreshes whose process stopped sending heartbeats
    Cleanup {
        /// Also tear down refreshes that still send heartbeats
        #[arg(long)]
        force: bool,
    },
}

fn main() -> RefresherResult<()> {
    let args = Args::parse();

    let refresher_config = load_refresher_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(RefresherError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(
            refresher_config,
            args.command.unwrap_or(Command::Run),
        ))?;

    Ok(())
}

async fn async_main(refresher_config: RefresherConfig, command: Command) -> RefresherResult<()> {
    if let Err(err) = start_refresher_with_config(refresher_config, command).await {
        error!(category = err.category(), "{err}");
        if let Some(backtrace) = err.captured_backtrace() {
            debug!(%backtrace, "refresher error backtrace");
        }
        return Err(err);
    }

    Ok(())
}
