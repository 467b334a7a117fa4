use anyhow::{anyhow, Result};
use clap::Args;

use crate::config::AppConfig;
use crate::feed::FeedClient;
use crate::instruments;
use crate::valuation::format_usd;

#[derive(Args)]
pub struct PriceArgs {
    /// Instrument to quote (pair name, symbol or feed id, e.g. ETH or BTC/USD)
    pub instrument: String,
}

pub struct PriceCommand {
    args: PriceArgs,
}

impl PriceCommand {
    pub fn new(args: PriceArgs) -> Self {
        Self { args }
    }

    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let instrument = instruments::find_instrument(&self.args.instrument)
            .ok_or_else(|| anyhow!("unknown instrument '{}'", self.args.instrument))?;

        let client = FeedClient::new(&config.feed.base_url);
        let snapshot = client.fetch_spot(&instrument).await?;

        println!(
            "{:<10} {:>12} {:>9} {:>12} {:>12} {:>16}",
            "Pair", "Price", "24h %", "24h High", "24h Low", "24h Volume"
        );
        println!(
            "{:<10} {:>12} {:>8.2}% {:>12} {:>12} {:>16.0}",
            instrument.name,
            format_usd(snapshot.spot_price),
            snapshot.change_24h_pct,
            format_usd(snapshot.high_24h),
            format_usd(snapshot.low_24h),
            snapshot.volume_24h,
        );
        Ok(())
    }
}
