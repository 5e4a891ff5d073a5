//! Error types for the bingo hall
//!
//! Domain errors (`LedgerError`, `RoundError`) are what callers match on;
//! `BingoError` is the root used at process boundaries (startup, storage
//! bootstrap, binaries).

use crate::bingo::types::{CardId, TableId};
use crate::ledger::types::{Money, PlayerId, RoundId, WithdrawalId};
use thiserror::Error;

/// Root error type for all bingo hall operations
#[derive(Debug, Error)]
pub enum BingoError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Storage system errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Money movement errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Gameplay errors
    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    /// Metrics registry errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Ledger errors. Every variant leaves wallets untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },

    #[error("Amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },

    #[error("Withdrawal {0} already paid")]
    AlreadyPaid(WithdrawalId),

    #[error("Round {0} already settled")]
    AlreadySettled(RoundId),

    #[error("Wallet not found for player {0}")]
    WalletNotFound(PlayerId),

    #[error("Wallet already exists for player {0}")]
    WalletExists(PlayerId),

    #[error("Withdrawal {0} not found")]
    WithdrawalNotFound(WithdrawalId),

    #[error("Invalid phone number: '{0}'")]
    InvalidPhone(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Corrupted ledger record: {0}")]
    Corrupted(String),
}

impl LedgerError {
    /// Whether the operation may be retried after a completion check
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }
}

/// Round and table errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("Player {0} is waiting for payment verification")]
    NotVerified(PlayerId),

    #[error("Player {0} is not seated at any table")]
    NotSeated(PlayerId),

    #[error("Player {player} is already seated at table {table_id}")]
    AlreadySeated { player: PlayerId, table_id: TableId },

    #[error("Player {0} is already verified")]
    AlreadyVerified(PlayerId),

    #[error("Unknown stake tier {0}")]
    UnknownStakeTier(Money),

    #[error("Card {0} does not belong to the player")]
    UnknownCard(CardId),

    #[error("Cell index {0} is outside the 5x5 grid")]
    CellOutOfRange(usize),

    #[error("Number {0} has not been called")]
    NumberNotCalled(u8),

    #[error("The FREE cell is always marked")]
    FreeCellLocked,

    #[error("Round is not drawing numbers")]
    NotInProgress,

    #[error("Round no longer accepts this action")]
    RoundClosed,

    #[error("Table is full")]
    TableFull,

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table {0} stopped responding")]
    TableUnavailable(TableId),

    #[error("Round {0} has a winner awaiting settlement")]
    SettlementPending(RoundId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// External error conversions
impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<rocksdb::Error> for BingoError {
    fn from(e: rocksdb::Error) -> Self {
        BingoError::Storage(e.into())
    }
}

impl From<std::io::Error> for BingoError {
    fn from(e: std::io::Error) -> Self {
        BingoError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for BingoError {
    fn from(e: serde_json::Error) -> Self {
        BingoError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<toml::de::Error> for BingoError {
    fn from(e: toml::de::Error) -> Self {
        BingoError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::CorruptedData(msg) => LedgerError::Corrupted(msg),
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

// Convenience type aliases for Results
pub type BingoResult<T> = Result<T, BingoError>;
pub type LedgerResult<T> = Result<T, LedgerError>;
pub type RoundResult<T> = Result<T, RoundError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let config_error = ConfigurationError::ValidationFailed("test".to_string());
        let root = BingoError::Configuration(config_error);

        assert!(root.to_string().contains("Configuration error"));
        assert!(root.to_string().contains("test"));
    }

    #[test]
    fn test_insufficient_funds_details() {
        let err = LedgerError::InsufficientFunds {
            required: Money::whole(40),
            available: Money::whole(30),
        };

        assert!(err.to_string().contains("required 40.00"));
        assert!(err.to_string().contains("available 30.00"));
    }

    #[test]
    fn test_ledger_error_lifts_into_round_error() {
        let err: RoundError = LedgerError::WalletNotFound(PlayerId::new_unchecked("0911000000")).into();
        assert!(matches!(err, RoundError::Ledger(LedgerError::WalletNotFound(_))));
    }

    #[test]
    fn test_error_source() {
        let root: BingoError = StorageError::ReadFailed("disk".to_string()).into();
        assert!(root.source().is_some());
    }

    #[test]
    fn test_only_storage_failures_are_transient() {
        assert!(LedgerError::Storage("io".to_string()).is_transient());
        assert!(!LedgerError::AlreadySettled(RoundId::new()).is_transient());
    }
}
