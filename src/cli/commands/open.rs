use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use rust_decimal::Decimal;
use tokio::time::Duration;

use crate::chain::{RpcClient, WalletSession};
use crate::config::AppConfig;
use crate::instruments;
use crate::store::start_position_store;
use crate::types::PositionSide;

#[derive(Args)]
pub struct OpenArgs {
    /// Instrument to trade (pair name, symbol or feed id)
    pub instrument: String,

    /// Direction: long or short
    #[arg(long)]
    pub side: String,

    /// Leverage multiplier (1-100)
    #[arg(long, default_value_t = 10)]
    pub leverage: u64,

    /// Margin in the native token
    #[arg(long)]
    pub margin: Decimal,
}

pub struct OpenCommand {
    args: OpenArgs,
}

impl OpenCommand {
    pub fn new(args: OpenArgs) -> Self {
        Self { args }
    }

    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let instrument = instruments::find_instrument(&self.args.instrument)
            .ok_or_else(|| anyhow!("unknown instrument '{}'", self.args.instrument))?;
        let side = match self.args.side.to_lowercase().as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            other => bail!("side must be 'long' or 'short', got '{}'", other),
        };
        if !(1..=100).contains(&self.args.leverage) {
            bail!("leverage must be between 1 and 100");
        }
        if self.args.margin <= Decimal::ZERO {
            bail!("margin must be positive");
        }

        let rpc = Arc::new(RpcClient::new(&config.network.rpc_url));
        let session = WalletSession::connect_from_env(&config.network, rpc).await?;
        let ledger = Arc::new(session.exchange(&config.network)?);

        let store = start_position_store(
            ledger,
            config.store.max_position_slots,
            Duration::from_secs(config.store.refresh_interval_secs),
        );
        store.set_account(session.address()).await?;

        println!(
            "Opening {} {} at {}x with {} {} margin...",
            side,
            instrument.name,
            self.args.leverage,
            self.args.margin,
            config.network.native_symbol
        );
        store
            .open_position(
                instrument.name.clone(),
                side == PositionSide::Long,
                self.args.leverage,
                self.args.margin,
            )
            .await?;

        let positions = store.refresh().await?;
        println!("Position opened. {} active position(s).", positions.len());
        store.stop().await;
        Ok(())
    }
}
