use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::chain::{PositionReader, RpcClient, WalletSession};
use crate::config::AppConfig;
use crate::feed::{FeedClient, PriceSnapshot};
use crate::instruments;
use crate::valuation::{format_amount, format_margin, format_pnl, format_usd, valuate};

#[derive(Args)]
pub struct PositionsArgs {}

pub struct PositionsCommand {
    _args: PositionsArgs,
}

impl PositionsCommand {
    pub fn new(args: PositionsArgs) -> Self {
        Self { _args: args }
    }

    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let rpc = Arc::new(RpcClient::new(&config.network.rpc_url));
        let session = WalletSession::connect_from_env(&config.network, rpc.clone()).await?;
        println!(
            "Account {:?} | balance {}",
            session.address(),
            format_margin(session.balance(), &config.network.native_symbol)
        );

        let ledger = Arc::new(session.exchange(&config.network)?);
        let reader = PositionReader::new(ledger, config.store.max_position_slots);
        let positions = reader.list_positions(session.address()).await;

        if positions.is_empty() {
            println!("No active positions.");
            return Ok(());
        }

        // one spot fetch per distinct pair; a pair with no feed match shows
        // no mark price or PnL rather than failing the listing
        let feed = FeedClient::new(&config.feed.base_url);
        let mut snapshots: HashMap<String, PriceSnapshot> = HashMap::new();
        for position in &positions {
            if snapshots.contains_key(&position.pair) {
                continue;
            }
            if let Some(instrument) = instruments::find_instrument(&position.pair) {
                match feed.fetch_spot(&instrument).await {
                    Ok(snapshot) => {
                        snapshots.insert(position.pair.clone(), snapshot);
                    }
                    Err(e) => eprintln!("warning: no price for {}: {}", position.pair, e),
                }
            }
        }

        println!(
            "{:<5} {:<10} {:<6} {:>10} {:>12} {:>12} {:>12} {:>14} {:>22}",
            "Slot", "Pair", "Side", "Size", "Entry", "Mark", "Liq.", "Margin", "PnL"
        );
        for position in &positions {
            let snapshot = snapshots.get(&position.pair);
            let (mark, pnl) = match snapshot {
                Some(snapshot) => (
                    format_usd(snapshot.spot_price),
                    format_pnl(&valuate(position, snapshot)),
                ),
                None => ("...".to_string(), "...".to_string()),
            };
            println!(
                "{:<5} {:<10} {:<6} {:>10} {:>12} {:>12} {:>12} {:>14} {:>22}",
                position.slot,
                position.pair,
                position.side.to_string(),
                format_amount(position.size),
                format_usd(position.entry_price),
                mark,
                format_usd(position.liquidation_price),
                format_margin(position.margin, &config.network.native_symbol),
                pnl,
            );
        }
        Ok(())
    }
}
