//! Bingo gameplay: cards, win patterns, the caller, rounds and table tasks

pub mod caller;
pub mod card;
pub mod patterns;
pub mod round;
pub mod table;
pub mod types;

pub use card::Card;
pub use round::{Round, RoundSettings};
pub use table::{TableCommand, TableHandle};
pub use types::{CardId, PlayerView, RoundPhase, RoundSnapshot, SeatTicket, TableId};
