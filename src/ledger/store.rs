//! Persistence seam for wallets, withdrawals and settlements.

use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::types::{
    DeltaOutcome, EntryReason, IdempotencyKey, LedgerEntry, Money, PlayerId, RoundId,
    SettlementRecord, Wallet, WalletDelta, WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Storage contract for the ledger.
///
/// Each mutating call must commit atomically: a balance never moves without
/// its journal entry, and the journal key is checked in the same step so a
/// replayed key is reported as [`DeltaOutcome::Duplicate`]. Callers serialize
/// mutations of the same wallet.
pub trait LedgerStore: Send + Sync {
    fn load_wallet(&self, player: &PlayerId) -> LedgerResult<Option<Wallet>>;

    /// Fails with `WalletExists` if the player already has one.
    fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<()>;

    fn apply_wallet_delta(&self, delta: &WalletDelta) -> LedgerResult<DeltaOutcome>;

    /// Debit the amount and persist the Pending request together.
    fn create_withdrawal(&self, request: &WithdrawalRequest) -> LedgerResult<Wallet>;

    fn load_withdrawal(&self, id: &WithdrawalId) -> LedgerResult<Option<WithdrawalRequest>>;

    /// Fails with `AlreadyPaid` when moving a Paid request.
    fn update_withdrawal_status(
        &self,
        id: &WithdrawalId,
        status: WithdrawalStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<WithdrawalRequest>;

    fn list_withdrawals(&self, status: Option<WithdrawalStatus>) -> LedgerResult<Vec<WithdrawalRequest>>;

    /// Credit the winner (if any) and archive the round together. Fails with
    /// `AlreadySettled` if the round has a record.
    fn record_settlement(&self, record: &SettlementRecord) -> LedgerResult<Option<Wallet>>;

    fn load_settlement(&self, round_id: &RoundId) -> LedgerResult<Option<SettlementRecord>>;

    /// Journal of one player, oldest first.
    fn journal(&self, player: &PlayerId) -> LedgerResult<Vec<LedgerEntry>>;
}

/// Compute the wallet and journal row a delta produces.
pub(crate) fn prepare_delta(
    wallet: &Wallet,
    delta: &WalletDelta,
    now: DateTime<Utc>,
) -> LedgerResult<(Wallet, LedgerEntry)> {
    let balance = wallet
        .balance
        .apply(delta.delta)
        .ok_or(LedgerError::InsufficientFunds {
            required: Money::from_minor(delta.delta.unsigned_abs()),
            available: wallet.balance,
        })?;

    let updated = Wallet {
        balance,
        updated_at: now,
        ..wallet.clone()
    };
    let entry = LedgerEntry {
        key: delta.key.clone(),
        player: delta.player.clone(),
        delta: delta.delta,
        reason: delta.reason.clone(),
        balance_after: balance,
        recorded_at: now,
    };
    Ok((updated, entry))
}

/// Prize credit belonging to a settlement record, if it has a winner.
pub(crate) fn prize_delta(record: &SettlementRecord) -> Option<WalletDelta> {
    record.winner.as_ref().map(|winner| WalletDelta {
        player: winner.player.clone(),
        delta: record.prize_pool.as_delta(),
        key: IdempotencyKey::prize(&record.round_id),
        reason: EntryReason::Prize {
            round_id: record.round_id,
        },
    })
}

/// Withdrawal debit belonging to a request
pub(crate) fn withdrawal_delta(request: &WithdrawalRequest) -> WalletDelta {
    WalletDelta {
        player: request.player.clone(),
        delta: -request.amount.as_delta(),
        key: IdempotencyKey::withdrawal(&request.id),
        reason: EntryReason::Withdrawal {
            withdrawal_id: request.id,
        },
    }
}

/// Status change of a withdrawal; `Paid` is terminal.
pub(crate) fn transition_withdrawal(
    mut request: WithdrawalRequest,
    status: WithdrawalStatus,
    at: DateTime<Utc>,
) -> LedgerResult<WithdrawalRequest> {
    if request.status == WithdrawalStatus::Paid {
        return Err(LedgerError::AlreadyPaid(request.id));
    }
    request.status = status;
    if status == WithdrawalStatus::Paid {
        request.paid_at = Some(at);
    }
    Ok(request)
}

#[derive(Default)]
struct MemoryState {
    wallets: HashMap<PlayerId, Wallet>,
    journal: HashMap<IdempotencyKey, LedgerEntry>,
    journal_by_player: HashMap<PlayerId, Vec<IdempotencyKey>>,
    withdrawals: HashMap<WithdrawalId, WithdrawalRequest>,
    settlements: HashMap<RoundId, SettlementRecord>,
}

impl MemoryState {
    fn wallet(&self, player: &PlayerId) -> LedgerResult<&Wallet> {
        self.wallets
            .get(player)
            .ok_or_else(|| LedgerError::WalletNotFound(player.clone()))
    }

    fn commit(&mut self, wallet: Wallet, entry: LedgerEntry) {
        self.journal_by_player
            .entry(entry.player.clone())
            .or_default()
            .push(entry.key.clone());
        self.journal.insert(entry.key.clone(), entry);
        self.wallets.insert(wallet.player.clone(), wallet);
    }
}

/// Process-local ledger; everything is lost on restart.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Storage("memory ledger lock poisoned".to_string()))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load_wallet(&self, player: &PlayerId) -> LedgerResult<Option<Wallet>> {
        Ok(self.lock()?.wallets.get(player).cloned())
    }

    fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<()> {
        let mut state = self.lock()?;
        if state.wallets.contains_key(&wallet.player) {
            return Err(LedgerError::WalletExists(wallet.player.clone()));
        }
        state.wallets.insert(wallet.player.clone(), wallet.clone());
        Ok(())
    }

    fn apply_wallet_delta(&self, delta: &WalletDelta) -> LedgerResult<DeltaOutcome> {
        let mut state = self.lock()?;
        let current = state.wallet(&delta.player)?.clone();
        if state.journal.contains_key(&delta.key) {
            return Ok(DeltaOutcome::Duplicate(current));
        }

        let (wallet, entry) = prepare_delta(&current, delta, Utc::now())?;
        state.commit(wallet.clone(), entry);
        Ok(DeltaOutcome::Applied(wallet))
    }

    fn create_withdrawal(&self, request: &WithdrawalRequest) -> LedgerResult<Wallet> {
        let mut state = self.lock()?;
        let delta = withdrawal_delta(request);
        let current = state.wallet(&delta.player)?.clone();

        let (wallet, entry) = prepare_delta(&current, &delta, request.created_at)?;
        state.commit(wallet.clone(), entry);
        state.withdrawals.insert(request.id, request.clone());
        Ok(wallet)
    }

    fn load_withdrawal(&self, id: &WithdrawalId) -> LedgerResult<Option<WithdrawalRequest>> {
        Ok(self.lock()?.withdrawals.get(id).cloned())
    }

    fn update_withdrawal_status(
        &self,
        id: &WithdrawalId,
        status: WithdrawalStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<WithdrawalRequest> {
        let mut state = self.lock()?;
        let current = state
            .withdrawals
            .get(id)
            .cloned()
            .ok_or(LedgerError::WithdrawalNotFound(*id))?;

        let updated = transition_withdrawal(current, status, at)?;
        state.withdrawals.insert(*id, updated.clone());
        Ok(updated)
    }

    fn list_withdrawals(&self, status: Option<WithdrawalStatus>) -> LedgerResult<Vec<WithdrawalRequest>> {
        let state = self.lock()?;
        let mut list: Vec<WithdrawalRequest> = state
            .withdrawals
            .values()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .cloned()
            .collect();
        list.sort_by_key(|w| w.created_at);
        Ok(list)
    }

    fn record_settlement(&self, record: &SettlementRecord) -> LedgerResult<Option<Wallet>> {
        let mut state = self.lock()?;
        if state.settlements.contains_key(&record.round_id) {
            return Err(LedgerError::AlreadySettled(record.round_id));
        }

        let credited = match prize_delta(record) {
            Some(delta) if !state.journal.contains_key(&delta.key) => {
                let current = state.wallet(&delta.player)?.clone();
                let (wallet, entry) = prepare_delta(&current, &delta, record.settled_at)?;
                state.commit(wallet.clone(), entry);
                Some(wallet)
            }
            _ => None,
        };
        state.settlements.insert(record.round_id, record.clone());
        Ok(credited)
    }

    fn load_settlement(&self, round_id: &RoundId) -> LedgerResult<Option<SettlementRecord>> {
        Ok(self.lock()?.settlements.get(round_id).cloned())
    }

    fn journal(&self, player: &PlayerId) -> LedgerResult<Vec<LedgerEntry>> {
        let state = self.lock()?;
        let keys = state.journal_by_player.get(player).cloned().unwrap_or_default();
        Ok(keys
            .iter()
            .filter_map(|key| state.journal.get(key).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(store: &MemoryLedgerStore, phone: &str, amount: Money) -> PlayerId {
        let player = PlayerId::parse(phone).unwrap();
        store.create_wallet(&Wallet::open(player.clone())).unwrap();
        store
            .apply_wallet_delta(&WalletDelta {
                player: player.clone(),
                delta: amount.as_delta(),
                key: IdempotencyKey::adjustment(),
                reason: EntryReason::Adjustment {
                    note: "deposit".to_string(),
                },
            })
            .unwrap();
        player
    }

    #[test]
    fn test_replayed_key_is_duplicate() {
        let store = MemoryLedgerStore::new();
        let player = funded(&store, "0911111111", Money::whole(30));
        let delta = WalletDelta {
            player: player.clone(),
            delta: -Money::whole(10).as_delta(),
            key: IdempotencyKey::stake(&RoundId::new(), &player, Money::whole(10)),
            reason: EntryReason::Stake {
                round_id: RoundId::new(),
            },
        };

        assert!(!store.apply_wallet_delta(&delta).unwrap().is_duplicate());
        let again = store.apply_wallet_delta(&delta).unwrap();
        assert!(again.is_duplicate());
        assert_eq!(again.wallet().balance, Money::whole(20));
        assert_eq!(store.journal(&player).unwrap().len(), 2);
    }

    #[test]
    fn test_overdraft_leaves_wallet_untouched() {
        let store = MemoryLedgerStore::new();
        let player = funded(&store, "0911111111", Money::whole(5));
        let err = store
            .apply_wallet_delta(&WalletDelta {
                player: player.clone(),
                delta: -Money::whole(10).as_delta(),
                key: IdempotencyKey::adjustment(),
                reason: EntryReason::Adjustment {
                    note: "test".to_string(),
                },
            })
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                required: Money::whole(10),
                available: Money::whole(5)
            }
        );
        assert_eq!(store.load_wallet(&player).unwrap().unwrap().balance, Money::whole(5));
    }

    #[test]
    fn test_duplicate_wallet_rejected() {
        let store = MemoryLedgerStore::new();
        let player = funded(&store, "0911111111", Money::ZERO);
        assert_eq!(
            store.create_wallet(&Wallet::open(player.clone())),
            Err(LedgerError::WalletExists(player))
        );
    }
}
