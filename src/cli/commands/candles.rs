use anyhow::{anyhow, Result};
use clap::Args;

use crate::config::AppConfig;
use crate::feed::FeedClient;
use crate::instruments;

#[derive(Args)]
pub struct CandlesArgs {
    /// Instrument to chart (pair name, symbol or feed id)
    pub instrument: String,

    /// Lookback window in days
    #[arg(long, default_value_t = 30)]
    pub days: u32,
}

pub struct CandlesCommand {
    args: CandlesArgs,
}

impl CandlesCommand {
    pub fn new(args: CandlesArgs) -> Self {
        Self { args }
    }

    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let instrument = instruments::find_instrument(&self.args.instrument)
            .ok_or_else(|| anyhow!("unknown instrument '{}'", self.args.instrument))?;

        let client = FeedClient::new(&config.feed.base_url);
        let candles = client.fetch_candles(&instrument, self.args.days).await?;

        println!(
            "{:<20} {:>12} {:>12} {:>12} {:>12} {:>16}",
            "Time", "Open", "High", "Low", "Close", "Volume"
        );
        for candle in &candles {
            println!(
                "{:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>16.0}",
                candle.timestamp.format("%Y-%m-%d %H:%M"),
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
            );
        }
        println!(
            "{} candles over {} days for {}",
            candles.len(),
            self.args.days,
            instrument.name
        );
        Ok(())
    }
}
