//! Account position store actor
//!
//! Owns the displayed position list for the connected account. Refreshes it
//! from the ledger every `refresh_interval`, after every confirmed close or
//! open, and on demand. All mutation goes through this actor: each refresh
//! replaces the whole list (last-writer-wins), and results issued under an
//! older account generation are discarded instead of applied.

use std::sync::Arc;

use chrono::Utc;
use ethers_core::types::{Address, U256};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::chain::ledger::Ledger;
use crate::chain::reader::PositionReader;
use crate::errors::StoreError;
use crate::store::types::{AccountView, CloseState};
use crate::types::Position;
use crate::valuation::to_wei;

/// Commands accepted by the store
#[derive(Debug)]
enum StoreCommand {
    SetAccount {
        trader: Address,
    },
    Disconnect,
    Refresh {
        response: oneshot::Sender<Result<Vec<Position>, StoreError>>,
    },
    GetPositions {
        response: oneshot::Sender<Vec<Position>>,
    },
    ClosePosition {
        slot: u64,
        response: oneshot::Sender<Result<(), StoreError>>,
    },
    OpenPosition {
        pair: String,
        is_long: bool,
        leverage: u64,
        margin: Decimal,
        response: oneshot::Sender<Result<(), StoreError>>,
    },
    Shutdown,
}

/// Internal events from spawned refresh/transaction tasks
#[derive(Debug)]
enum StoreEvent {
    RefreshDone {
        generation: u64,
        positions: Vec<Position>,
    },
    CloseAdvanced {
        slot: u64,
        state: CloseState,
    },
    CloseFinished {
        slot: u64,
        success: bool,
        error: Option<String>,
    },
    OpenFinished {
        success: bool,
    },
}

struct PositionStore {
    ledger: Arc<dyn Ledger>,
    reader: Arc<PositionReader>,
    refresh_interval: Duration,
    cmd_rx: mpsc::Receiver<StoreCommand>,
    view_tx: watch::Sender<AccountView>,
    view: AccountView,
    /// Bumped on every account change; tags refreshes so stale results are
    /// recognizable
    generation: u64,
    refresh_in_flight: bool,
    pending_refresh: Vec<oneshot::Sender<Result<Vec<Position>, StoreError>>>,
}

impl PositionStore {
    async fn run(mut self) {
        let (event_tx, mut event_rx) = mpsc::channel::<StoreEvent>(32);
        let mut ticker = interval(self.refresh_interval);

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => {
                    match command {
                        Some(StoreCommand::Shutdown) | None => {
                            info!("Position store stopping");
                            break;
                        }
                        Some(command) => self.handle_command(command, &event_tx),
                    }
                }

                _ = ticker.tick() => {
                    if self.view.account.is_some() {
                        self.spawn_refresh(&event_tx);
                    }
                }

                Some(event) = event_rx.recv() => {
                    self.handle_event(event, &event_tx);
                }
            }
        }
    }

    fn handle_command(&mut self, command: StoreCommand, event_tx: &mpsc::Sender<StoreEvent>) {
        match command {
            StoreCommand::SetAccount { trader } => {
                info!("Position store now tracking {:?}", trader);
                self.change_account(Some(trader));
                self.spawn_refresh(event_tx);
            }

            StoreCommand::Disconnect => {
                info!("Position store disconnected");
                self.change_account(None);
            }

            StoreCommand::Refresh { response } => {
                if self.view.account.is_none() {
                    let _ = response.send(Err(StoreError::NotConnected));
                    return;
                }
                self.pending_refresh.push(response);
                self.spawn_refresh(event_tx);
            }

            StoreCommand::GetPositions { response } => {
                let _ = response.send(self.view.positions.clone());
            }

            StoreCommand::ClosePosition { slot, response } => {
                if self.view.account.is_none() {
                    let _ = response.send(Err(StoreError::NotConnected));
                    return;
                }
                if self.view.close_in_flight(slot) {
                    let _ = response.send(Err(StoreError::CloseInFlight(slot)));
                    return;
                }
                // marked before the task spawns so a second close command
                // for the slot is refused immediately
                self.view.close_states.insert(slot, CloseState::Submitting);
                self.publish();
                self.spawn_close(slot, response, event_tx);
            }

            StoreCommand::OpenPosition {
                pair,
                is_long,
                leverage,
                margin,
                response,
            } => {
                if self.view.account.is_none() {
                    let _ = response.send(Err(StoreError::NotConnected));
                    return;
                }
                self.spawn_open(pair, is_long, leverage, margin, response, event_tx);
            }

            StoreCommand::Shutdown => unreachable!("handled in run loop"),
        }
    }

    fn handle_event(&mut self, event: StoreEvent, event_tx: &mpsc::Sender<StoreEvent>) {
        match event {
            StoreEvent::RefreshDone {
                generation,
                positions,
            } => {
                self.refresh_in_flight = false;
                if generation != self.generation {
                    debug!(
                        "Discarding refresh for stale account generation {} (now {})",
                        generation, self.generation
                    );
                    return;
                }
                for responder in self.pending_refresh.drain(..) {
                    let _ = responder.send(Ok(positions.clone()));
                }
                self.view.positions = positions;
                self.view.last_refresh = Some(Utc::now());
                self.publish();
            }

            StoreEvent::CloseAdvanced { slot, state } => {
                self.view.close_states.insert(slot, state);
                self.publish();
            }

            StoreEvent::CloseFinished {
                slot,
                success,
                error,
            } => {
                let state = if success {
                    CloseState::Closed
                } else {
                    CloseState::Failed
                };
                self.view.close_states.insert(slot, state);
                self.view.last_error = error;
                self.publish();
                if success {
                    // the confirmed close changed the slot array on chain
                    self.spawn_refresh(event_tx);
                }
            }

            StoreEvent::OpenFinished { success } => {
                if success {
                    self.spawn_refresh(event_tx);
                }
            }
        }
    }

    /// Reset all account-derived state and start a new generation
    fn change_account(&mut self, account: Option<Address>) {
        self.generation += 1;
        self.refresh_in_flight = false;
        for responder in self.pending_refresh.drain(..) {
            let _ = responder.send(Err(StoreError::Superseded));
        }
        self.view = AccountView {
            account,
            ..AccountView::default()
        };
        self.publish();
    }

    /// Kick off a background read unless one is already running
    ///
    /// Overlapping triggers coalesce into the refresh in flight; its result
    /// answers every waiter.
    fn spawn_refresh(&mut self, event_tx: &mpsc::Sender<StoreEvent>) {
        let Some(trader) = self.view.account else {
            return;
        };
        if self.refresh_in_flight {
            debug!("Refresh already in flight, coalescing");
            return;
        }
        self.refresh_in_flight = true;

        let generation = self.generation;
        let reader = self.reader.clone();
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let positions = reader.list_positions(trader).await;
            let _ = tx
                .send(StoreEvent::RefreshDone {
                    generation,
                    positions,
                })
                .await;
        });
    }

    fn spawn_close(
        &self,
        slot: u64,
        response: oneshot::Sender<Result<(), StoreError>>,
        event_tx: &mpsc::Sender<StoreEvent>,
    ) {
        let ledger = self.ledger.clone();
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let tx_hash = ledger.submit_close(slot).await?;
                let _ = tx
                    .send(StoreEvent::CloseAdvanced {
                        slot,
                        state: CloseState::Confirming,
                    })
                    .await;
                ledger.wait_for_finality(tx_hash).await?;
                Ok::<(), StoreError>(())
            }
            .await;

            match result {
                Ok(()) => {
                    info!("Position at slot {} closed", slot);
                    let _ = tx
                        .send(StoreEvent::CloseFinished {
                            slot,
                            success: true,
                            error: None,
                        })
                        .await;
                    let _ = response.send(Ok(()));
                }
                Err(e) => {
                    warn!("Close for slot {} failed: {}", slot, e);
                    let _ = tx
                        .send(StoreEvent::CloseFinished {
                            slot,
                            success: false,
                            error: Some(e.to_string()),
                        })
                        .await;
                    let _ = response.send(Err(e));
                }
            }
        });
    }

    fn spawn_open(
        &self,
        pair: String,
        is_long: bool,
        leverage: u64,
        margin: Decimal,
        response: oneshot::Sender<Result<(), StoreError>>,
        event_tx: &mpsc::Sender<StoreEvent>,
    ) {
        let ledger = self.ledger.clone();
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let margin_wei: U256 = to_wei(margin)?;
                let tx_hash = ledger
                    .submit_open(&pair, is_long, leverage, margin_wei)
                    .await?;
                ledger.wait_for_finality(tx_hash).await?;
                Ok::<(), StoreError>(())
            }
            .await;

            match &result {
                Ok(()) => info!("Opened {} position on {}", if is_long { "long" } else { "short" }, pair),
                Err(e) => warn!("Open on {} failed: {}", pair, e),
            }
            let _ = tx
                .send(StoreEvent::OpenFinished {
                    success: result.is_ok(),
                })
                .await;
            let _ = response.send(result);
        });
    }

    fn publish(&self) {
        let _ = self.view_tx.send(self.view.clone());
    }
}

/// Handle for the position store service
#[derive(Clone)]
pub struct PositionStoreHandle {
    cmd_tx: mpsc::Sender<StoreCommand>,
    view_rx: watch::Receiver<AccountView>,
}

impl PositionStoreHandle {
    async fn send(&self, command: StoreCommand) -> Result<(), StoreError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| StoreError::ServiceStopped)
    }

    /// Track a new account; clears state derived from any previous one
    pub async fn set_account(&self, trader: Address) -> Result<(), StoreError> {
        self.send(StoreCommand::SetAccount { trader }).await
    }

    /// Drop the tracked account and all derived state
    pub async fn disconnect(&self) -> Result<(), StoreError> {
        self.send(StoreCommand::Disconnect).await
    }

    /// Force a refresh and wait for its result
    pub async fn refresh(&self) -> Result<Vec<Position>, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::Refresh { response: tx }).await?;
        rx.await.map_err(|_| StoreError::ServiceStopped)?
    }

    /// Current displayed position list
    pub async fn positions(&self) -> Result<Vec<Position>, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::GetPositions { response: tx }).await?;
        rx.await.map_err(|_| StoreError::ServiceStopped)
    }

    /// Close the position at `slot`; resolves once the close reaches
    /// finality (or fails)
    pub async fn close_position(&self, slot: u64) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::ClosePosition { slot, response: tx })
            .await?;
        rx.await.map_err(|_| StoreError::ServiceStopped)?
    }

    /// Open a position; resolves at finality
    pub async fn open_position(
        &self,
        pair: String,
        is_long: bool,
        leverage: u64,
        margin: Decimal,
    ) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::OpenPosition {
            pair,
            is_long,
            leverage,
            margin,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| StoreError::ServiceStopped)?
    }

    /// Latest published view
    pub fn view(&self) -> AccountView {
        self.view_rx.borrow().clone()
    }

    /// Subscribe to view updates
    pub fn subscribe(&self) -> watch::Receiver<AccountView> {
        self.view_rx.clone()
    }

    /// Stop the service
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(StoreCommand::Shutdown).await;
    }
}

/// Spawn the position store service and return its handle
pub fn start_position_store(
    ledger: Arc<dyn Ledger>,
    max_slots: u64,
    refresh_interval: Duration,
) -> PositionStoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (view_tx, view_rx) = watch::channel(AccountView::default());

    let store = PositionStore {
        reader: Arc::new(PositionReader::new(ledger.clone(), max_slots)),
        ledger,
        refresh_interval,
        cmd_rx,
        view_tx,
        view: AccountView::default(),
        generation: 0,
        refresh_in_flight: false,
        pending_refresh: Vec::new(),
    };

    tokio::spawn(async move {
        store.run().await;
    });

    PositionStoreHandle { cmd_tx, view_rx }
}
