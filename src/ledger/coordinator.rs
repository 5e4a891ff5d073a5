//! Ledger coordinator: every movement of money goes through here.
//!
//! Mutations of one wallet are serialized by a per-key lock map; the store
//! commits each mutation atomically with its idempotency key, so retries
//! never double-charge or double-pay.

use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{
    EntryReason, IdempotencyKey, LedgerEntry, Money, PlayerId, RoundId, SettlementRecord,
    SettlementRequest, Wallet, WalletDelta, WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};
use crate::metrics::HallMetrics;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Proof of a stake debit. A retried debit returns the same receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReceipt {
    pub player: PlayerId,
    pub round_id: RoundId,
    pub amount: Money,
    pub key: IdempotencyKey,
    pub balance_after: Money,
    pub replayed: bool,
}

/// Result of marking a withdrawal paid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    Paid(WithdrawalRequest),
    AlreadyPaid(WithdrawalRequest),
}

pub struct LedgerCoordinator {
    store: Arc<dyn LedgerStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    min_withdrawal: Money,
    metrics: Arc<HallMetrics>,
}

impl LedgerCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, min_withdrawal: Money, metrics: Arc<HallMetrics>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            min_withdrawal,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The entry is dropped again once no other caller holds or waits on it,
    /// so the map only grows with concurrent work.
    fn with_lock<T>(&self, key: String, f: impl FnOnce() -> LedgerResult<T>) -> LedgerResult<T> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(LedgerError::Storage("wallet lock poisoned".to_string())),
        };
        drop(lock);
        self.locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    fn wallet_lock(player: &PlayerId) -> String {
        format!("wallet:{}", player)
    }

    /// Load the wallet for `phone`, creating an empty one on first login.
    pub fn register_player(&self, phone: &str) -> LedgerResult<Wallet> {
        let player = PlayerId::parse(phone)?;
        self.with_lock(Self::wallet_lock(&player), || {
            if let Some(wallet) = self.store.load_wallet(&player)? {
                return Ok(wallet);
            }
            let wallet = Wallet::open(player.clone());
            self.store.create_wallet(&wallet)?;
            info!("Opened wallet for {}", player);
            Ok(wallet)
        })
    }

    pub fn wallet(&self, player: &PlayerId) -> LedgerResult<Wallet> {
        self.store
            .load_wallet(player)?
            .ok_or_else(|| LedgerError::WalletNotFound(player.clone()))
    }

    /// Debit the tier once per `(round, player, tier)`.
    pub fn debit_stake(&self, player: &PlayerId, round_id: &RoundId, tier: Money) -> LedgerResult<StakeReceipt> {
        let key = IdempotencyKey::stake(round_id, player, tier);
        let delta = WalletDelta {
            player: player.clone(),
            delta: -tier.as_delta(),
            key: key.clone(),
            reason: EntryReason::Stake { round_id: *round_id },
        };

        let outcome = self.with_lock(Self::wallet_lock(player), || self.store.apply_wallet_delta(&delta))?;
        let replayed = outcome.is_duplicate();
        if replayed {
            warn!("Stake for {} in round {} already debited", player, round_id);
        } else {
            self.metrics.stakes_collected.inc_by(tier.minor());
        }

        Ok(StakeReceipt {
            player: player.clone(),
            round_id: *round_id,
            amount: tier,
            key,
            balance_after: outcome.wallet().balance,
            replayed,
        })
    }

    /// Archive a decided round and pay its winner exactly once.
    ///
    /// Fails with `AlreadySettled` on a second call. After a transient
    /// failure, check [`LedgerCoordinator::settlement`] before retrying.
    pub fn settle_round(&self, request: &SettlementRequest) -> LedgerResult<SettlementRecord> {
        let paid = if request.winner.is_some() {
            request.prize_pool
        } else {
            Money::ZERO
        };
        let record = SettlementRecord {
            round_id: request.round_id,
            table_id: request.table_id,
            tier: request.tier,
            winner: request.winner.clone(),
            prize_pool: request.prize_pool,
            total_stake: request.total_stake,
            commission: request.total_stake.saturating_sub(paid),
            forfeited_stake: request.forfeited_stake,
            drawn_numbers: request.drawn_numbers.clone(),
            caller_state: request.caller_state,
            settled_at: Utc::now(),
        };

        let round_lock = format!("round:{}", request.round_id);
        self.with_lock(round_lock, || match &record.winner {
            Some(winner) => self.with_lock(Self::wallet_lock(&winner.player), || {
                self.store.record_settlement(&record)
            }),
            None => self.store.record_settlement(&record),
        })?;

        self.metrics.prizes_paid.inc_by(paid.minor());
        self.metrics.commission_retained.inc_by(record.commission.minor());
        self.metrics.forfeited_retained.inc_by(record.forfeited_stake.minor());
        info!(
            "Settled round {}: prize {} commission {} forfeited {}",
            record.round_id, paid, record.commission, record.forfeited_stake
        );
        Ok(record)
    }

    /// Completion check for settlement retries
    pub fn settlement(&self, round_id: &RoundId) -> LedgerResult<Option<SettlementRecord>> {
        self.store.load_settlement(round_id)
    }

    pub fn request_withdrawal(
        &self,
        player: &PlayerId,
        amount: Money,
        destination: &str,
    ) -> LedgerResult<WithdrawalRequest> {
        if amount < self.min_withdrawal {
            return Err(LedgerError::BelowMinimum {
                amount,
                minimum: self.min_withdrawal,
            });
        }
        let destination = PlayerId::parse(destination)?;

        self.with_lock(Self::wallet_lock(player), || {
            let wallet = self.wallet(player)?;
            if wallet.balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available: wallet.balance,
                });
            }

            let request = WithdrawalRequest {
                id: WithdrawalId::new(),
                player: player.clone(),
                amount,
                destination: destination.clone(),
                status: WithdrawalStatus::Pending,
                created_at: Utc::now(),
                paid_at: None,
            };
            self.store.create_withdrawal(&request)?;
            self.metrics.withdrawals_requested.inc();
            info!("Withdrawal {} of {} requested by {}", request.id, amount, player);
            Ok(request)
        })
    }

    /// Pending -> Paid. A repeated call reports `AlreadyPaid` and changes nothing.
    pub fn mark_withdrawal_paid(&self, id: &WithdrawalId) -> LedgerResult<PayoutOutcome> {
        self.with_lock(format!("withdrawal:{}", id), || {
            match self.store.update_withdrawal_status(id, WithdrawalStatus::Paid, Utc::now()) {
                Ok(request) => {
                    info!("Withdrawal {} marked paid", id);
                    Ok(PayoutOutcome::Paid(request))
                }
                Err(LedgerError::AlreadyPaid(_)) => {
                    warn!("Withdrawal {} was already paid", id);
                    let request = self
                        .store
                        .load_withdrawal(id)?
                        .ok_or(LedgerError::WithdrawalNotFound(*id))?;
                    Ok(PayoutOutcome::AlreadyPaid(request))
                }
                Err(e) => Err(e),
            }
        })
    }

    pub fn list_withdrawals(&self, status: Option<WithdrawalStatus>) -> LedgerResult<Vec<WithdrawalRequest>> {
        self.store.list_withdrawals(status)
    }

    /// Admin balance override. Never drives a balance below zero.
    pub fn adjust_balance(&self, player: &PlayerId, delta: i64, note: &str) -> LedgerResult<Wallet> {
        let change = WalletDelta {
            player: player.clone(),
            delta,
            key: IdempotencyKey::adjustment(),
            reason: EntryReason::Adjustment {
                note: note.to_string(),
            },
        };
        let outcome = self.with_lock(Self::wallet_lock(player), || self.store.apply_wallet_delta(&change))?;
        info!("Adjusted {} by {} minor units ({})", player, delta, note);
        Ok(outcome.wallet().clone())
    }

    pub fn journal(&self, player: &PlayerId) -> LedgerResult<Vec<LedgerEntry>> {
        self.store.journal(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bingo::caller::CallerState;
    use crate::bingo::patterns::PatternKind;
    use crate::bingo::types::{CardId, PlayerRoundId, TableId};
    use crate::ledger::store::MemoryLedgerStore;
    use crate::ledger::types::WinnerRecord;

    fn coordinator() -> LedgerCoordinator {
        LedgerCoordinator::new(
            Arc::new(MemoryLedgerStore::new()),
            Money::whole(50),
            Arc::new(HallMetrics::new().unwrap()),
        )
    }

    fn funded(ledger: &LedgerCoordinator, phone: &str, whole: i64) -> PlayerId {
        let wallet = ledger.register_player(phone).unwrap();
        ledger
            .adjust_balance(&wallet.player, whole * 100, "deposit")
            .unwrap();
        wallet.player
    }

    #[test]
    fn test_register_is_idempotent_and_validates_phone() {
        let ledger = coordinator();
        let first = ledger.register_player("0911111111").unwrap();
        let second = ledger.register_player("0911111111").unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            ledger.register_player("12345"),
            Err(LedgerError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_stake_debited_once_per_round() {
        let ledger = coordinator();
        let player = funded(&ledger, "0911111111", 30);
        let round = RoundId::new();

        let first = ledger.debit_stake(&player, &round, Money::whole(10)).unwrap();
        let retry = ledger.debit_stake(&player, &round, Money::whole(10)).unwrap();

        assert!(!first.replayed);
        assert!(retry.replayed);
        assert_eq!(first.key, retry.key);
        assert_eq!(ledger.wallet(&player).unwrap().balance, Money::whole(20));
    }

    #[test]
    fn test_stake_requires_funds() {
        let ledger = coordinator();
        let player = funded(&ledger, "0911111111", 5);
        let err = ledger
            .debit_stake(&player, &RoundId::new(), Money::whole(10))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    fn settlement(round_id: RoundId, winner: Option<PlayerId>) -> SettlementRequest {
        SettlementRequest {
            round_id,
            table_id: TableId::new(),
            tier: Money::whole(10),
            winner: winner.map(|player| WinnerRecord {
                player,
                player_round_id: PlayerRoundId::new(),
                card_id: CardId(0),
                pattern: PatternKind::Diagonal,
            }),
            total_stake: Money::whole(50),
            prize_pool: Money::whole(35),
            forfeited_stake: Money::ZERO,
            drawn_numbers: vec![1, 2, 3],
            caller_state: CallerState::Halted,
        }
    }

    #[test]
    fn test_prize_paid_exactly_once() {
        let ledger = coordinator();
        let winner = funded(&ledger, "0911111111", 0);
        let round = RoundId::new();
        let request = settlement(round, Some(winner.clone()));

        let record = ledger.settle_round(&request).unwrap();
        assert_eq!(record.commission, Money::whole(15));
        assert_eq!(
            ledger.settle_round(&request),
            Err(LedgerError::AlreadySettled(round))
        );
        assert_eq!(ledger.wallet(&winner).unwrap().balance, Money::whole(35));
        assert!(ledger.settlement(&round).unwrap().is_some());
    }

    #[test]
    fn test_no_winner_keeps_whole_stake() {
        let ledger = coordinator();
        let record = ledger.settle_round(&settlement(RoundId::new(), None)).unwrap();
        assert_eq!(record.commission, Money::whole(50));
        assert_eq!(record.winner, None);
    }

    #[test]
    fn test_forfeited_stakes_kept_beside_commission() {
        let ledger = coordinator();
        let winner = funded(&ledger, "0911111111", 0);
        let mut request = settlement(RoundId::new(), Some(winner));
        request.forfeited_stake = Money::whole(20);

        let record = ledger.settle_round(&request).unwrap();
        assert_eq!(record.commission, Money::whole(15));
        assert_eq!(record.forfeited_stake, Money::whole(20));
        assert_eq!(ledger.metrics.commission_retained.get(), Money::whole(15).minor());
        assert_eq!(ledger.metrics.forfeited_retained.get(), Money::whole(20).minor());
    }

    #[test]
    fn test_lock_map_does_not_grow_with_history() {
        let ledger = coordinator();
        let player = funded(&ledger, "0911111111", 10_000);

        for _ in 0..50 {
            let round = RoundId::new();
            ledger.debit_stake(&player, &round, Money::whole(10)).unwrap();
            ledger.settle_round(&settlement(round, Some(player.clone()))).unwrap();
            ledger.settle_round(&settlement(RoundId::new(), None)).unwrap();
            let withdrawal = ledger
                .request_withdrawal(&player, Money::whole(50), "0922222222")
                .unwrap();
            ledger.mark_withdrawal_paid(&withdrawal.id).unwrap();
        }
        assert!(ledger.locks.is_empty());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        let round = RoundId::new();
                        ledger.debit_stake(&player, &round, Money::whole(1)).unwrap();
                        ledger.settle_round(&settlement(round, Some(player.clone()))).unwrap();
                    }
                });
            }
        });
        assert!(ledger.locks.is_empty());
    }

    #[test]
    fn test_withdrawal_rules() {
        let ledger = coordinator();
        let player = funded(&ledger, "0911111111", 30);

        assert_eq!(
            ledger.request_withdrawal(&player, Money::whole(40), "0911111111"),
            Err(LedgerError::BelowMinimum {
                amount: Money::whole(40),
                minimum: Money::whole(50)
            })
        );
        assert_eq!(
            ledger.request_withdrawal(&player, Money::whole(60), "0911111111"),
            Err(LedgerError::InsufficientFunds {
                required: Money::whole(60),
                available: Money::whole(30)
            })
        );
        assert_eq!(ledger.wallet(&player).unwrap().balance, Money::whole(30));
        assert!(ledger.list_withdrawals(None).unwrap().is_empty());
    }

    #[test]
    fn test_withdrawal_paid_once() {
        let ledger = coordinator();
        let player = funded(&ledger, "0911111111", 80);
        let request = ledger
            .request_withdrawal(&player, Money::whole(50), "0922222222")
            .unwrap();
        assert_eq!(ledger.wallet(&player).unwrap().balance, Money::whole(30));

        assert!(matches!(
            ledger.mark_withdrawal_paid(&request.id).unwrap(),
            PayoutOutcome::Paid(_)
        ));
        assert!(matches!(
            ledger.mark_withdrawal_paid(&request.id).unwrap(),
            PayoutOutcome::AlreadyPaid(_)
        ));
        assert_eq!(ledger.wallet(&player).unwrap().balance, Money::whole(30));
        assert_eq!(
            ledger.list_withdrawals(Some(WithdrawalStatus::Paid)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_adjustment_cannot_go_negative() {
        let ledger = coordinator();
        let player = funded(&ledger, "0911111111", 10);
        assert!(ledger.adjust_balance(&player, -2_000, "chargeback").is_err());
        assert_eq!(ledger.wallet(&player).unwrap().balance, Money::whole(10));
        assert_eq!(ledger.journal(&player).unwrap().len(), 1);
    }
}
