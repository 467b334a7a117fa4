//! Command-line interface
//!
//! clap-based subcommand CLI: spot quotes, candle dumps, position listing
//! with live valuation, a combined watch mode, and open/close transactions.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

use crate::config::AppConfig;
use crate::logging;
use commands::candles::{CandlesArgs, CandlesCommand};
use commands::close::{CloseArgs, CloseCommand};
use commands::open::{OpenArgs, OpenCommand};
use commands::positions::{PositionsArgs, PositionsCommand};
use commands::price::{PriceArgs, PriceCommand};
use commands::watch::{WatchArgs, WatchCommand};

#[derive(Parser)]
#[command(name = "perpdesk")]
#[command(version)]
#[command(about = "Headless client for the Pharos testnet futures exchange", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (JSON); defaults cover the public testnet
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current spot price for an instrument
    Price(PriceArgs),

    /// Dump the OHLC candle sequence for an instrument
    Candles(CandlesArgs),

    /// List open positions with live PnL
    Positions(PositionsArgs),

    /// Watch prices and positions continuously
    Watch(WatchArgs),

    /// Open a position
    Open(OpenArgs),

    /// Close a position by slot
    Close(CloseArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        logging::init_logging(self.verbose)?;
        let config = AppConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Price(args) => PriceCommand::new(args).execute(&config).await,
            Commands::Candles(args) => CandlesCommand::new(args).execute(&config).await,
            Commands::Positions(args) => PositionsCommand::new(args).execute(&config).await,
            Commands::Watch(args) => WatchCommand::new(args).execute(&config).await,
            Commands::Open(args) => OpenCommand::new(args).execute(&config).await,
            Commands::Close(args) => CloseCommand::new(args).execute(&config).await,
        }
    }
}
