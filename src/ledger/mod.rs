//! Wallets, withdrawals and round settlement

pub mod coordinator;
pub mod rocks;
pub mod store;
pub mod types;

pub use coordinator::{LedgerCoordinator, PayoutOutcome, StakeReceipt};
pub use rocks::RocksLedgerStore;
pub use store::{LedgerStore, MemoryLedgerStore};
pub use types::{Money, PlayerId, RoundId, Wallet, WithdrawalId, WithdrawalRequest, WithdrawalStatus};
