//! The bingo hall: registry of running tables and the client/admin surface.

use crate::bingo::round::RoundSettings;
use crate::bingo::table::{TableContext, TableHandle};
use crate::bingo::types::{CardId, MarkOutcome, PlayerView, RoundPhase, RoundSnapshot, SeatTicket, TableId};
use crate::config::{BingoConfig, LedgerBackend};
use crate::errors::{BingoResult, LedgerResult, RoundError, RoundResult};
use crate::events::HallEvent;
use crate::ledger::types::SettlementRecord;
use crate::ledger::{
    LedgerCoordinator, LedgerStore, MemoryLedgerStore, Money, PayoutOutcome, PlayerId, RocksLedgerStore,
    RoundId, Wallet, WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};
use crate::metrics::HallMetrics;
use crate::storage::OptimizedStorage;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// Attempts to find a joinable table before giving up
const JOIN_ATTEMPTS: usize = 3;

/// Shared lookup tables. Table tasks remove their own entries when they exit.
#[derive(Default)]
pub struct HallRegistry {
    pub tables: DashMap<TableId, TableHandle>,
    /// Table currently accepting joins per tier
    pub open: DashMap<Money, TableId>,
    /// Where each player is seated; a player sits at one round at a time
    pub seats: DashMap<PlayerId, TableId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub table_id: TableId,
    pub round_id: RoundId,
    pub tier: Money,
    pub phase: RoundPhase,
    pub admitted: usize,
    pub waiting: usize,
    pub capacity: usize,
    pub total_stake: Money,
    pub prize_pool: Money,
    pub commission: Money,
}

/// Dashboard totals across running tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSummary {
    pub tables: Vec<TableSummary>,
    pub active_players: usize,
    pub waiting_players: usize,
    pub total_stake: Money,
    pub prize_pool: Money,
    pub commission: Money,
    pub pending_withdrawals: usize,
}

pub struct BingoHall {
    config: BingoConfig,
    tiers: Vec<Money>,
    ledger: Arc<LedgerCoordinator>,
    registry: Arc<HallRegistry>,
    events: broadcast::Sender<HallEvent>,
    metrics: Arc<HallMetrics>,
    settings: RoundSettings,
    seeds: std::sync::Mutex<StdRng>,
    open_lock: Mutex<()>,
}

impl BingoHall {
    /// Build a hall with the ledger backend named in `config`.
    pub fn from_config(config: BingoConfig) -> BingoResult<Self> {
        let store: Arc<dyn LedgerStore> = match config.ledger.backend {
            LedgerBackend::Memory => Arc::new(MemoryLedgerStore::new()),
            LedgerBackend::RocksDb => {
                let storage = OptimizedStorage::new_with_config(&config.storage)?;
                info!("Ledger stored at {}", config.storage.data_directory);
                Arc::new(RocksLedgerStore::new(storage))
            }
        };
        Self::new(config, store)
    }

    pub fn new(config: BingoConfig, store: Arc<dyn LedgerStore>) -> BingoResult<Self> {
        Self::with_seed(config, store, rand::random())
    }

    /// Hall whose table seeds come from `seed`, for reproducible rounds.
    pub fn with_seed(config: BingoConfig, store: Arc<dyn LedgerStore>, seed: u64) -> BingoResult<Self> {
        config
            .validate()
            .map_err(|e| crate::errors::ConfigurationError::ValidationFailed(e.to_string()))?;

        let metrics = Arc::new(HallMetrics::new()?);
        let ledger = Arc::new(LedgerCoordinator::new(
            store,
            config.min_withdrawal(),
            metrics.clone(),
        ));
        let (events, _) = broadcast::channel(config.api.event_channel_capacity);

        Ok(Self {
            tiers: config.stake_tiers(),
            settings: config.round_settings(),
            config,
            ledger,
            registry: Arc::new(HallRegistry::default()),
            events,
            metrics,
            seeds: std::sync::Mutex::new(StdRng::seed_from_u64(seed)),
            open_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &BingoConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<LedgerCoordinator> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<HallMetrics> {
        &self.metrics
    }

    pub fn stake_tiers(&self) -> &[Money] {
        &self.tiers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HallEvent> {
        self.events.subscribe()
    }

    fn next_seed(&self) -> u64 {
        match self.seeds.lock() {
            Ok(mut rng) => rng.gen(),
            Err(_) => rand::random(),
        }
    }

    fn table_context(&self) -> TableContext {
        TableContext {
            ledger: self.ledger.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            settings: self.settings.clone(),
            auto_verify: self.config.game.auto_verify,
            settlement_retry: self.config.settlement_retry(),
        }
    }

    // ----- players and wallets -----

    pub fn register_player(&self, phone: &str) -> LedgerResult<Wallet> {
        self.ledger.register_player(phone)
    }

    pub fn wallet(&self, player: &PlayerId) -> LedgerResult<Wallet> {
        self.ledger.wallet(player)
    }

    pub fn request_withdrawal(&self, player: &PlayerId, amount: Money, destination: &str) -> LedgerResult<WithdrawalRequest> {
        self.ledger.request_withdrawal(player, amount, destination)
    }

    // ----- tables -----

    /// The open table for `tier`, opening a fresh one if needed.
    async fn open_table(&self, tier: Money) -> TableHandle {
        let _guard = self.open_lock.lock().await;
        let current = self
            .registry
            .open
            .get(&tier)
            .and_then(|id| self.registry.tables.get(&*id).map(|h| h.clone()));
        if let Some(handle) = current {
            if !handle.is_closed() {
                return handle;
            }
        }

        let handle = TableHandle::spawn(tier, self.next_seed(), self.table_context());
        self.registry.tables.insert(handle.table_id(), handle.clone());
        self.registry.open.insert(tier, handle.table_id());
        handle
    }

    fn retire(&self, tier: Money, table_id: TableId) {
        self.registry.open.remove_if(&tier, |_, open| *open == table_id);
    }

    /// Buy into the open round of `tier`.
    ///
    /// Retrying a join returns the same ticket without a second debit.
    pub async fn join_table(&self, player: &PlayerId, tier: Money) -> RoundResult<SeatTicket> {
        if !self.tiers.contains(&tier) {
            return Err(RoundError::UnknownStakeTier(tier));
        }
        self.ledger.wallet(player)?;

        for _ in 0..JOIN_ATTEMPTS {
            // Already seated: same tier gets the existing ticket back.
            if let Some(existing) = self.seated_table(player) {
                if existing.tier() == tier {
                    return existing.join(player.clone()).await;
                }
                return Err(RoundError::AlreadySeated {
                    player: player.clone(),
                    table_id: existing.table_id(),
                });
            }

            let handle = self.open_table(tier).await;
            let table_id = handle.table_id();
            match self.registry.seats.entry(player.clone()) {
                Entry::Occupied(mut seat) if *seat.get() != table_id => {
                    // Raced with another join of the same player.
                    if self.registry.tables.contains_key(seat.get()) {
                        continue;
                    }
                    seat.insert(table_id);
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(seat) => {
                    seat.insert(table_id);
                }
            }

            match handle.join(player.clone()).await {
                Ok(ticket) => return Ok(ticket),
                Err(RoundError::RoundClosed | RoundError::TableFull | RoundError::TableUnavailable(_)) => {
                    self.registry.seats.remove_if(player, |_, seated| *seated == table_id);
                    self.retire(tier, table_id);
                }
                Err(e) => {
                    self.registry.seats.remove_if(player, |_, seated| *seated == table_id);
                    return Err(e);
                }
            }
        }

        warn!("No joinable table for {} at tier {}", player, tier);
        Err(RoundError::RoundClosed)
    }

    fn seated_table(&self, player: &PlayerId) -> Option<TableHandle> {
        let table_id = *self.registry.seats.get(player)?;
        self.registry.tables.get(&table_id).map(|h| h.clone())
    }

    fn table_for(&self, player: &PlayerId) -> RoundResult<TableHandle> {
        self.seated_table(player)
            .ok_or_else(|| RoundError::NotSeated(player.clone()))
    }

    fn table(&self, table_id: &TableId) -> RoundResult<TableHandle> {
        self.registry
            .tables
            .get(table_id)
            .map(|h| h.clone())
            .ok_or(RoundError::TableNotFound(*table_id))
    }

    pub async fn mark_cell(&self, player: &PlayerId, card_id: CardId, cell: usize) -> RoundResult<MarkOutcome> {
        self.table_for(player)?.mark(player.clone(), card_id, cell).await
    }

    pub async fn unmark_cell(&self, player: &PlayerId, card_id: CardId, cell: usize) -> RoundResult<MarkOutcome> {
        self.table_for(player)?.unmark(player.clone(), card_id, cell).await
    }

    pub async fn set_auto_mark(&self, player: &PlayerId, enabled: bool) -> RoundResult<()> {
        self.table_for(player)?.set_auto_mark(player.clone(), enabled).await
    }

    pub async fn player_view(&self, player: &PlayerId) -> RoundResult<PlayerView> {
        self.table_for(player)?.player_view(player.clone()).await
    }

    pub async fn table_snapshot(&self, table_id: &TableId) -> RoundResult<RoundSnapshot> {
        self.table(table_id)?.snapshot().await
    }

    /// Snapshots of every running table, ordered by tier.
    pub async fn list_tables(&self) -> Vec<RoundSnapshot> {
        let handles: Vec<TableHandle> = self.registry.tables.iter().map(|e| e.value().clone()).collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(snapshot) = handle.snapshot().await {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| (s.tier, s.table_id));
        snapshots
    }

    pub fn settlement(&self, round_id: &RoundId) -> LedgerResult<Option<SettlementRecord>> {
        self.ledger.settlement(round_id)
    }

    // ----- admin -----

    pub async fn verify_player(&self, player: &PlayerId) -> RoundResult<()> {
        self.table_for(player)?.verify(player.clone()).await
    }

    pub async fn revoke_verification(&self, player: &PlayerId) -> RoundResult<()> {
        self.table_for(player)?.revoke(player.clone()).await
    }

    /// Tear down a table's round. Wallets are not touched.
    pub async fn reset_table(&self, table_id: &TableId) -> RoundResult<RoundSnapshot> {
        let snapshot = self.table(table_id)?.reset().await?;
        info!("Table {} reset by admin", table_id);
        Ok(snapshot)
    }

    pub fn adjust_balance(&self, player: &PlayerId, delta: i64, note: &str) -> LedgerResult<Wallet> {
        self.ledger.adjust_balance(player, delta, note)
    }

    pub fn mark_withdrawal_paid(&self, id: &WithdrawalId) -> LedgerResult<PayoutOutcome> {
        self.ledger.mark_withdrawal_paid(id)
    }

    pub fn list_withdrawals(&self, status: Option<WithdrawalStatus>) -> LedgerResult<Vec<WithdrawalRequest>> {
        self.ledger.list_withdrawals(status)
    }

    pub async fn admin_summary(&self) -> LedgerResult<AdminSummary> {
        let tables: Vec<TableSummary> = self
            .list_tables()
            .await
            .into_iter()
            .map(|s| TableSummary {
                table_id: s.table_id,
                round_id: s.round_id,
                tier: s.tier,
                phase: s.phase,
                admitted: s.admitted,
                waiting: s.waiting,
                capacity: self.settings.max_players,
                total_stake: s.total_stake,
                prize_pool: s.prize_pool,
                commission: s.commission,
            })
            .collect();
        let pending_withdrawals = self.ledger.list_withdrawals(Some(WithdrawalStatus::Pending))?.len();

        Ok(AdminSummary {
            active_players: tables.iter().map(|t| t.admitted).sum(),
            waiting_players: tables.iter().map(|t| t.waiting).sum(),
            total_stake: tables.iter().map(|t| t.total_stake).sum(),
            prize_pool: tables.iter().map(|t| t.prize_pool).sum(),
            commission: tables.iter().map(|t| t.commission).sum(),
            pending_withdrawals,
            tables,
        })
    }
}
