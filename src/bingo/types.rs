use crate::bingo::caller::CallerState;
use crate::bingo::card::{Card, CELL_COUNT, FREE_INDEX, MAX_NUMBER};
use crate::ledger::types::{uuid_id, Money, PlayerId, RoundId};
use serde::{Deserialize, Serialize};
use std::fmt;

uuid_id!(
    /// A table hosts one round at a time
    TableId
);
uuid_id!(
    /// A player's seat in one round
    PlayerRoundId
);

/// Card index within a seat (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub u8);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marked cells of one card as a 25-bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellSet(u32);

impl CellSet {
    /// A fresh card has only the FREE cell marked.
    pub fn with_free() -> Self {
        Self(1 << FREE_INDEX)
    }

    pub const fn from_mask(mask: u32) -> Self {
        Self(mask)
    }

    pub const fn mask(self) -> u32 {
        self.0
    }

    pub fn contains(self, index: usize) -> bool {
        index < CELL_COUNT && self.0 & (1 << index) != 0
    }

    /// Returns `true` if the cell was not marked before.
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= CELL_COUNT {
            return false;
        }
        let was_marked = self.contains(index);
        self.0 |= 1 << index;
        !was_marked
    }

    /// Returns `true` if the cell was marked before.
    pub fn remove(&mut self, index: usize) -> bool {
        let was_marked = self.contains(index);
        self.0 &= !(1 << index);
        was_marked
    }

    pub fn contains_all(self, other: CellSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..CELL_COUNT).filter(move |i| self.contains(*i))
    }
}

/// Set of called numbers 1..=75
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberSet(u128);

impl NumberSet {
    pub fn contains(self, number: u8) -> bool {
        (1..=MAX_NUMBER).contains(&number) && self.0 & (1u128 << number) != 0
    }

    /// Returns `true` if the number was not present before.
    pub fn insert(&mut self, number: u8) -> bool {
        if !(1..=MAX_NUMBER).contains(&number) {
            return false;
        }
        let fresh = !self.contains(number);
        self.0 |= 1u128 << number;
        fresh
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<u8> for NumberSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = NumberSet::default();
        for n in iter {
            set.insert(n);
        }
        set
    }
}

/// Payment verification state of a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    Waiting,
    Active,
}

/// Lifecycle phase of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Waiting,
    Countdown,
    InProgress,
    Settled,
}

impl RoundPhase {
    /// Whether new players may still buy in
    pub fn accepts_joins(self) -> bool {
        matches!(self, RoundPhase::Waiting | RoundPhase::Countdown)
    }
}

/// One card as seen by its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub card_id: CardId,
    pub card: Card,
    pub marked: Vec<usize>,
}

/// Returned from a join; the same ticket comes back for a retried join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTicket {
    pub table_id: TableId,
    pub round_id: RoundId,
    pub player_round_id: PlayerRoundId,
    pub tier: Money,
    pub verification: Verification,
    pub cards: Vec<CardView>,
}

/// Everything a seated player needs to render their game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub ticket: SeatTicket,
    pub auto_mark: bool,
    pub phase: RoundPhase,
    pub drawn_numbers: Vec<u8>,
    pub prize_pool: Money,
}

/// Result of a mark or unmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOutcome {
    pub card_id: CardId,
    pub cell: usize,
    pub marked: bool,
    pub bingo: bool,
}

/// Public state of a table's round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub table_id: TableId,
    pub round_id: RoundId,
    pub tier: Money,
    pub phase: RoundPhase,
    pub admitted: usize,
    pub waiting: usize,
    pub total_stake: Money,
    pub prize_pool: Money,
    pub commission: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_remaining_ms: Option<u64>,
    pub drawn_numbers: Vec<u8>,
    pub caller_state: CallerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}
