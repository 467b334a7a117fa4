//! Price polling service
//!
//! Actor task that polls the spot price for the selected instrument every
//! `poll_interval` and publishes the latest view over a watch channel.
//! Selecting a new instrument cancels the old poll atomically: every fetch
//! is tagged with the generation it was issued under, and results from a
//! stale generation are discarded rather than applied.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::errors::FeedError;
use crate::feed::client::FeedClient;
use crate::feed::types::{Candle, PriceSnapshot};
use crate::instruments::Instrument;

/// Commands accepted by the poller
#[derive(Debug)]
enum FeedCommand {
    /// Switch polling to a new instrument
    Select(Instrument),
    /// Stop the service
    Stop,
}

/// Published feed state
///
/// `last_error` is advisory: a failed poll sets it but leaves the previous
/// snapshot and candles in place.
#[derive(Debug, Clone, Default)]
pub struct FeedView {
    pub instrument: Option<Instrument>,
    pub snapshot: Option<PriceSnapshot>,
    pub candles: Vec<Candle>,
    pub last_error: Option<String>,
}

/// Completed fetches routed back into the actor loop
#[derive(Debug)]
enum FetchOutcome {
    Spot {
        generation: u64,
        result: Result<PriceSnapshot, FeedError>,
    },
    Candles {
        generation: u64,
        result: Result<Vec<Candle>, FeedError>,
    },
}

/// Generation-tagged feed state
///
/// Kept separate from the actor loop so the stale-response handling is
/// directly testable.
struct FeedState {
    generation: u64,
    view: FeedView,
}

impl FeedState {
    fn new() -> Self {
        Self {
            generation: 0,
            view: FeedView::default(),
        }
    }

    /// Start a new generation for `instrument`, dropping all state derived
    /// from the previous one
    fn select(&mut self, instrument: Instrument) -> u64 {
        self.generation += 1;
        self.view = FeedView {
            instrument: Some(instrument),
            ..FeedView::default()
        };
        self.generation
    }

    /// Apply a spot fetch result; returns false when it was stale
    fn apply_spot(&mut self, generation: u64, result: Result<PriceSnapshot, FeedError>) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding stale spot response (generation {} != {})",
                generation, self.generation
            );
            return false;
        }
        match result {
            Ok(snapshot) => {
                self.view.snapshot = Some(snapshot);
                self.view.last_error = None;
            }
            Err(e) => {
                // keep the last-known snapshot, surface the failure as status
                warn!("Spot poll failed: {}", e);
                self.view.last_error = Some(e.to_string());
            }
        }
        true
    }

    /// Apply a candle fetch result; returns false when it was stale
    fn apply_candles(&mut self, generation: u64, result: Result<Vec<Candle>, FeedError>) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding stale candle response (generation {} != {})",
                generation, self.generation
            );
            return false;
        }
        match result {
            Ok(candles) => {
                // full-sequence replace, never an incremental append
                self.view.candles = candles;
            }
            Err(e) => {
                warn!("Candle fetch failed: {}", e);
                self.view.last_error = Some(e.to_string());
            }
        }
        true
    }
}

/// Price polling actor
struct PricePoller {
    client: Arc<FeedClient>,
    poll_interval: Duration,
    candle_lookback_days: u32,
    state: FeedState,
    cmd_rx: mpsc::Receiver<FeedCommand>,
    view_tx: watch::Sender<FeedView>,
}

impl PricePoller {
    async fn run(mut self) {
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<FetchOutcome>(16);
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => {
                    match command {
                        Some(FeedCommand::Select(instrument)) => {
                            info!("Switching price feed to {}", instrument.name);
                            let generation = self.state.select(instrument.clone());
                            self.publish();
                            // candles are fetched once per switch, not polled
                            self.spawn_candle_fetch(generation, instrument, &outcome_tx);
                            // fresh ticker fires immediately for the first spot fetch
                            ticker = interval(self.poll_interval);
                        }
                        Some(FeedCommand::Stop) | None => {
                            debug!("Price poller stopping");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if let Some(instrument) = self.state.view.instrument.clone() {
                        self.spawn_spot_fetch(self.state.generation, instrument, &outcome_tx);
                    }
                }

                Some(outcome) = outcome_rx.recv() => {
                    let applied = match outcome {
                        FetchOutcome::Spot { generation, result } => {
                            self.state.apply_spot(generation, result)
                        }
                        FetchOutcome::Candles { generation, result } => {
                            self.state.apply_candles(generation, result)
                        }
                    };
                    if applied {
                        self.publish();
                    }
                }
            }
        }
    }

    fn publish(&self) {
        let _ = self.view_tx.send(self.state.view.clone());
    }

    fn spawn_spot_fetch(
        &self,
        generation: u64,
        instrument: Instrument,
        outcome_tx: &mpsc::Sender<FetchOutcome>,
    ) {
        let client = self.client.clone();
        let tx = outcome_tx.clone();
        tokio::spawn(async move {
            let result = client.fetch_spot(&instrument).await;
            let _ = tx.send(FetchOutcome::Spot { generation, result }).await;
        });
    }

    fn spawn_candle_fetch(
        &self,
        generation: u64,
        instrument: Instrument,
        outcome_tx: &mpsc::Sender<FetchOutcome>,
    ) {
        let client = self.client.clone();
        let tx = outcome_tx.clone();
        let days = self.candle_lookback_days;
        tokio::spawn(async move {
            let result = client.fetch_candles(&instrument, days).await;
            let _ = tx.send(FetchOutcome::Candles { generation, result }).await;
        });
    }
}

/// Handle for the price polling service
#[derive(Clone)]
pub struct PriceFeedHandle {
    cmd_tx: mpsc::Sender<FeedCommand>,
    view_rx: watch::Receiver<FeedView>,
}

impl PriceFeedHandle {
    /// Switch polling to a new instrument
    pub async fn select(&self, instrument: Instrument) -> Result<(), FeedError> {
        self.cmd_tx
            .send(FeedCommand::Select(instrument))
            .await
            .map_err(|_| FeedError::Network("price poller has stopped".to_string()))
    }

    /// Latest published view
    pub fn view(&self) -> FeedView {
        self.view_rx.borrow().clone()
    }

    /// Subscribe to view updates
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view_rx.clone()
    }

    /// Stop the service; in-flight fetches are discarded
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Stop).await;
    }
}

/// Spawn the price polling service and return its handle
pub fn start_price_poller(
    client: Arc<FeedClient>,
    poll_interval: Duration,
    candle_lookback_days: u32,
) -> PriceFeedHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (view_tx, view_rx) = watch::channel(FeedView::default());

    let poller = PricePoller {
        client,
        poll_interval,
        candle_lookback_days,
        state: FeedState::new(),
        cmd_rx,
        view_tx,
    };

    tokio::spawn(poller.run());

    PriceFeedHandle { cmd_tx, view_rx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::find_instrument;
    use rust_decimal_macros::dec;

    fn snapshot(price: rust_decimal::Decimal) -> PriceSnapshot {
        PriceSnapshot {
            spot_price: price,
            change_24h_pct: dec!(0),
            high_24h: dec!(0),
            low_24h: dec!(0),
            volume_24h: dec!(0),
        }
    }

    #[test]
    fn test_stale_spot_response_discarded_after_switch() {
        let mut state = FeedState::new();
        let eth_generation = state.select(find_instrument("ETH").unwrap());
        assert!(state.apply_spot(eth_generation, Ok(snapshot(dec!(3300)))));

        // switch instruments while an ETH poll is still in flight
        let btc_generation = state.select(find_instrument("BTC").unwrap());
        assert!(state.apply_spot(btc_generation, Ok(snapshot(dec!(65000)))));

        // the late ETH response must not overwrite BTC's price
        assert!(!state.apply_spot(eth_generation, Ok(snapshot(dec!(3301)))));
        assert_eq!(state.view.snapshot.as_ref().unwrap().spot_price, dec!(65000));
        assert_eq!(state.view.instrument.as_ref().unwrap().symbol, "BTC");
    }

    #[test]
    fn test_failed_poll_retains_last_snapshot() {
        let mut state = FeedState::new();
        let generation = state.select(find_instrument("ETH").unwrap());
        assert!(state.apply_spot(generation, Ok(snapshot(dec!(3300)))));

        assert!(state.apply_spot(
            generation,
            Err(FeedError::Network("connection refused".to_string()))
        ));

        // stale-but-available beats blank
        assert_eq!(state.view.snapshot.as_ref().unwrap().spot_price, dec!(3300));
        assert!(state
            .view
            .last_error
            .as_ref()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_successful_poll_clears_error() {
        let mut state = FeedState::new();
        let generation = state.select(find_instrument("ETH").unwrap());
        state.apply_spot(generation, Err(FeedError::EmptyResult("ethereum".into())));
        assert!(state.view.last_error.is_some());

        state.apply_spot(generation, Ok(snapshot(dec!(3310))));
        assert!(state.view.last_error.is_none());
        assert_eq!(state.view.snapshot.as_ref().unwrap().spot_price, dec!(3310));
    }

    #[test]
    fn test_stale_candles_discarded_and_replaced_wholesale() {
        let mut state = FeedState::new();
        let eth_generation = state.select(find_instrument("ETH").unwrap());

        let candle = Candle {
            timestamp: chrono::Utc::now(),
            open: dec!(1),
            high: dec!(2),
            low: dec!(1),
            close: dec!(2),
            volume: dec!(10),
        };
        assert!(state.apply_candles(eth_generation, Ok(vec![candle.clone(), candle.clone()])));
        assert_eq!(state.view.candles.len(), 2);

        let btc_generation = state.select(find_instrument("BTC").unwrap());
        // switching cleared the old instrument's candles
        assert!(state.view.candles.is_empty());

        assert!(!state.apply_candles(eth_generation, Ok(vec![candle.clone()])));
        assert!(state.view.candles.is_empty());

        assert!(state.apply_candles(btc_generation, Ok(vec![candle])));
        assert_eq!(state.view.candles.len(), 1);
    }

    #[tokio::test]
    async fn test_poller_task_lifecycle() {
        // no instrument selected: the poller idles without fetching
        let client = Arc::new(FeedClient::new("http://127.0.0.1:1"));
        let handle = start_price_poller(client, Duration::from_secs(10), 30);
        assert!(handle.view().instrument.is_none());
        handle.stop().await;
    }
}
