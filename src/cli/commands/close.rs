use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio::time::Duration;

use crate::chain::{RpcClient, WalletSession};
use crate::config::AppConfig;
use crate::store::start_position_store;

#[derive(Args)]
pub struct CloseArgs {
    /// Slot index of the position to close (see `perpdesk positions`)
    pub slot: u64,
}

pub struct CloseCommand {
    args: CloseArgs,
}

impl CloseCommand {
    pub fn new(args: CloseArgs) -> Self {
        Self { args }
    }

    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let rpc = Arc::new(RpcClient::new(&config.network.rpc_url));
        let session = WalletSession::connect_from_env(&config.network, rpc).await?;
        let ledger = Arc::new(session.exchange(&config.network)?);

        let store = start_position_store(
            ledger,
            config.store.max_position_slots,
            Duration::from_secs(config.store.refresh_interval_secs),
        );
        store.set_account(session.address()).await?;

        println!("Closing position at slot {}...", self.args.slot);
        store.close_position(self.args.slot).await?;

        let positions = store.refresh().await?;
        println!(
            "Position closed. {} active position(s) remain.",
            positions.len()
        );
        store.stop().await;
        Ok(())
    }
}
