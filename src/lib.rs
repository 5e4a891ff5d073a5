//! Bingohall - real-money 75-ball bingo engine
//!
//! Players buy into a table's round with a fixed stake, receive generated
//! cards, and mark called numbers until one card completes a line. The
//! winner is paid from the pooled stakes minus the house commission.
//!
//! - [`bingo`]: cards, win patterns, the number caller, the round state
//!   machine and the table tasks that drive it
//! - [`ledger`]: wallets, the journal, withdrawals and settlements
//! - [`hall`]: the registry of running tables and the operations the API calls
//! - [`api`]: HTTP and WebSocket surface

pub mod api;
pub mod bingo;
pub mod config;
pub mod errors;
pub mod events;
pub mod hall;
pub mod ledger;
pub mod metrics;
pub mod storage;

pub use config::BingoConfig;
pub use errors::{BingoError, BingoResult};
pub use hall::BingoHall;
