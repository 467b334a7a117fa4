use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use tokio::time::Duration;
use tracing::warn;

use crate::chain::{RpcClient, WalletSession};
use crate::config::AppConfig;
use crate::errors::ChainError;
use crate::feed::{start_price_poller, FeedClient, FeedView};
use crate::instruments;
use crate::store::AccountView;
use crate::valuation::{format_pnl, format_usd, valuate};

#[derive(Args)]
pub struct WatchArgs {
    /// Instrument to watch (pair name, symbol or feed id)
    pub instrument: String,
}

pub struct WatchCommand {
    args: WatchArgs,
}

impl WatchCommand {
    pub fn new(args: WatchArgs) -> Self {
        Self { args }
    }

    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let instrument = instruments::find_instrument(&self.args.instrument)
            .ok_or_else(|| anyhow!("unknown instrument '{}'", self.args.instrument))?;

        let feed_client = Arc::new(FeedClient::new(&config.feed.base_url));
        let feed = start_price_poller(
            feed_client,
            Duration::from_secs(config.feed.poll_interval_secs),
            config.feed.candle_lookback_days,
        );
        feed.select(instrument.clone()).await?;

        // positions are optional here: without a key the watch degrades to a
        // price ticker instead of failing
        let rpc = Arc::new(RpcClient::new(&config.network.rpc_url));
        let store = match WalletSession::connect_from_env(&config.network, rpc).await {
            Ok(session) => {
                let ledger = Arc::new(session.exchange(&config.network)?);
                let store = crate::store::start_position_store(
                    ledger,
                    config.store.max_position_slots,
                    Duration::from_secs(config.store.refresh_interval_secs),
                );
                store.set_account(session.address()).await?;
                Some(store)
            }
            Err(ChainError::WalletUnavailable) => {
                warn!("No wallet key set; watching prices only");
                None
            }
            Err(e) => return Err(e.into()),
        };

        println!("Watching {} (ctrl-c to stop)", instrument.name);
        let mut feed_rx = feed.subscribe();
        let mut store_rx = store.as_ref().map(|s| s.subscribe());

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,

                changed = feed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = feed_rx.borrow().clone();
                    print_ticker(&view);
                    if let Some(store) = &store {
                        print_positions(&view, &store.view());
                    }
                }

                changed = recv_store(&mut store_rx) => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(rx) = &store_rx {
                        print_positions(&feed_rx.borrow().clone(), &rx.borrow().clone());
                    }
                }
            }
        }

        feed.stop().await;
        if let Some(store) = &store {
            store.stop().await;
        }
        println!("Stopped.");
        Ok(())
    }
}

/// Wait on the store subscription when there is one; pend forever otherwise
async fn recv_store(
    rx: &mut Option<tokio::sync::watch::Receiver<AccountView>>,
) -> Result<(), tokio::sync::watch::error::RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

fn print_ticker(view: &FeedView) {
    if let Some(snapshot) = &view.snapshot {
        println!(
            "{} {} ({:+.2}% 24h)",
            view.instrument
                .as_ref()
                .map(|i| i.name.as_str())
                .unwrap_or("?"),
            format_usd(snapshot.spot_price),
            snapshot.change_24h_pct
        );
    }
    if let Some(error) = &view.last_error {
        println!("feed degraded: {} (showing last known price)", error);
    }
}

fn print_positions(feed: &FeedView, account: &AccountView) {
    let Some(snapshot) = &feed.snapshot else {
        return;
    };
    let watched = feed.instrument.as_ref().map(|i| i.name.as_str());
    for position in &account.positions {
        if Some(position.pair.as_str()) != watched {
            continue;
        }
        let valuation = valuate(position, snapshot);
        let state = account
            .close_states
            .get(&position.slot)
            .map(|s| format!(" [{:?}]", s))
            .unwrap_or_default();
        println!(
            "  slot {} {} {} entry {} pnl {}{}",
            position.slot,
            position.side,
            position.pair,
            format_usd(position.entry_price),
            format_pnl(&valuation),
            state,
        );
    }
}
