//! Ledger records stored in RocksDB as JSON values.
//!
//! Key layout:
//! - `wallet:{phone}`
//! - `journal:key:{idempotency key}` (the exactly-once guard)
//! - `journal:player:{phone}:{micros:020}:{idempotency key}`
//! - `withdrawal:{id}`
//! - `settlement:{round id}`

use crate::errors::{LedgerError, LedgerResult, StorageError};
use crate::ledger::store::{prepare_delta, prize_delta, transition_withdrawal, withdrawal_delta, LedgerStore};
use crate::ledger::types::{
    DeltaOutcome, IdempotencyKey, LedgerEntry, PlayerId, RoundId, SettlementRecord, Wallet, WalletDelta,
    WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};
use crate::storage::{BatchOp, OptimizedStorage};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

const WALLET_PREFIX: &str = "wallet:";
const JOURNAL_KEY_PREFIX: &str = "journal:key:";
const JOURNAL_PLAYER_PREFIX: &str = "journal:player:";
const WITHDRAWAL_PREFIX: &str = "withdrawal:";
const SETTLEMENT_PREFIX: &str = "settlement:";

/// Upper bound on rows returned by a single prefix scan
const SCAN_LIMIT: usize = 100_000;

fn wallet_key(player: &PlayerId) -> Vec<u8> {
    format!("{}{}", WALLET_PREFIX, player).into_bytes()
}

fn journal_key(key: &IdempotencyKey) -> Vec<u8> {
    format!("{}{}", JOURNAL_KEY_PREFIX, key).into_bytes()
}

fn journal_player_prefix(player: &PlayerId) -> Vec<u8> {
    format!("{}{}:", JOURNAL_PLAYER_PREFIX, player).into_bytes()
}

fn journal_player_key(entry: &LedgerEntry) -> Vec<u8> {
    // Zero-padded micros keep the index in recording order.
    let micros = entry.recorded_at.timestamp_micros().max(0);
    format!("{}{}:{:020}:{}", JOURNAL_PLAYER_PREFIX, entry.player, micros, entry.key).into_bytes()
}

fn withdrawal_key(id: &WithdrawalId) -> Vec<u8> {
    format!("{}{}", WITHDRAWAL_PREFIX, id).into_bytes()
}

fn settlement_key(round_id: &RoundId) -> Vec<u8> {
    format!("{}{}", SETTLEMENT_PREFIX, round_id).into_bytes()
}

fn encode<T: Serialize>(what: &str, value: &T) -> LedgerResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)).into())
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> LedgerResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)).into())
}

/// [`LedgerStore`] over [`OptimizedStorage`]. Every mutation is one `WriteBatch`.
#[derive(Clone)]
pub struct RocksLedgerStore {
    storage: OptimizedStorage,
}

impl RocksLedgerStore {
    pub fn new(storage: OptimizedStorage) -> Self {
        Self { storage }
    }

    fn load<T: DeserializeOwned>(&self, what: &str, key: &[u8]) -> LedgerResult<Option<T>> {
        match self.storage.get(key)? {
            Some(bytes) => decode(what, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn require_wallet(&self, player: &PlayerId) -> LedgerResult<Wallet> {
        self.load("wallet", &wallet_key(player))?
            .ok_or_else(|| LedgerError::WalletNotFound(player.clone()))
    }

    fn journaled(&self, key: &IdempotencyKey) -> LedgerResult<bool> {
        Ok(self.storage.get(&journal_key(key))?.is_some())
    }

    /// Batch ops persisting a wallet together with its journal row.
    fn delta_ops(&self, wallet: &Wallet, entry: &LedgerEntry) -> LedgerResult<Vec<BatchOp>> {
        let entry_bytes = encode("journal entry", entry)?;
        Ok(vec![
            BatchOp::Put(wallet_key(&wallet.player), encode("wallet", wallet)?),
            BatchOp::Put(journal_key(&entry.key), entry_bytes.clone()),
            BatchOp::Put(journal_player_key(entry), entry_bytes),
        ])
    }
}

impl LedgerStore for RocksLedgerStore {
    fn load_wallet(&self, player: &PlayerId) -> LedgerResult<Option<Wallet>> {
        self.load("wallet", &wallet_key(player))
    }

    fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<()> {
        let key = wallet_key(&wallet.player);
        if self.storage.get(&key)?.is_some() {
            return Err(LedgerError::WalletExists(wallet.player.clone()));
        }
        self.storage.put(&key, &encode("wallet", wallet)?)?;
        Ok(())
    }

    fn apply_wallet_delta(&self, delta: &WalletDelta) -> LedgerResult<DeltaOutcome> {
        let current = self.require_wallet(&delta.player)?;
        if self.journaled(&delta.key)? {
            return Ok(DeltaOutcome::Duplicate(current));
        }

        let (wallet, entry) = prepare_delta(&current, delta, Utc::now())?;
        self.storage.batch_write(self.delta_ops(&wallet, &entry)?)?;
        Ok(DeltaOutcome::Applied(wallet))
    }

    fn create_withdrawal(&self, request: &WithdrawalRequest) -> LedgerResult<Wallet> {
        let delta = withdrawal_delta(request);
        let current = self.require_wallet(&delta.player)?;

        let (wallet, entry) = prepare_delta(&current, &delta, request.created_at)?;
        let mut ops = self.delta_ops(&wallet, &entry)?;
        ops.push(BatchOp::Put(withdrawal_key(&request.id), encode("withdrawal", request)?));
        self.storage.batch_write(ops)?;
        Ok(wallet)
    }

    fn load_withdrawal(&self, id: &WithdrawalId) -> LedgerResult<Option<WithdrawalRequest>> {
        self.load("withdrawal", &withdrawal_key(id))
    }

    fn update_withdrawal_status(
        &self,
        id: &WithdrawalId,
        status: WithdrawalStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<WithdrawalRequest> {
        let current = self
            .load_withdrawal(id)?
            .ok_or(LedgerError::WithdrawalNotFound(*id))?;

        let updated = transition_withdrawal(current, status, at)?;
        self.storage
            .put(&withdrawal_key(id), &encode("withdrawal", &updated)?)?;
        Ok(updated)
    }

    fn list_withdrawals(&self, status: Option<WithdrawalStatus>) -> LedgerResult<Vec<WithdrawalRequest>> {
        let rows = self.storage.scan_prefix(WITHDRAWAL_PREFIX.as_bytes(), SCAN_LIMIT)?;
        let mut list = Vec::with_capacity(rows.len());
        for (_key, value) in rows {
            let request: WithdrawalRequest = decode("withdrawal", &value)?;
            if status.map_or(true, |s| request.status == s) {
                list.push(request);
            }
        }
        list.sort_by_key(|w| w.created_at);
        Ok(list)
    }

    fn record_settlement(&self, record: &SettlementRecord) -> LedgerResult<Option<Wallet>> {
        let key = settlement_key(&record.round_id);
        if self.storage.get(&key)?.is_some() {
            return Err(LedgerError::AlreadySettled(record.round_id));
        }

        let mut ops = Vec::new();
        let mut credited = None;
        if let Some(delta) = prize_delta(record) {
            if !self.journaled(&delta.key)? {
                let current = self.require_wallet(&delta.player)?;
                let (wallet, entry) = prepare_delta(&current, &delta, record.settled_at)?;
                ops.extend(self.delta_ops(&wallet, &entry)?);
                credited = Some(wallet);
            }
        }
        ops.push(BatchOp::Put(key, encode("settlement", record)?));

        self.storage.batch_write(ops)?;
        Ok(credited)
    }

    fn load_settlement(&self, round_id: &RoundId) -> LedgerResult<Option<SettlementRecord>> {
        self.load("settlement", &settlement_key(round_id))
    }

    fn journal(&self, player: &PlayerId) -> LedgerResult<Vec<LedgerEntry>> {
        self.storage
            .scan_prefix(&journal_player_prefix(player), SCAN_LIMIT)?
            .into_iter()
            .map(|(_key, value)| decode("journal entry", &value))
            .collect()
    }
}
