//! Events broadcast by tables to subscribers (WebSocket clients, tests).

use crate::bingo::card::Card;
use crate::bingo::patterns::PatternKind;
use crate::bingo::types::{CardId, TableId, Verification};
use crate::ledger::types::{Money, PlayerId, RoundId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    PlayerSeated {
        player: PlayerId,
        verification: Verification,
    },
    PlayerVerified {
        player: PlayerId,
        admitted: usize,
    },
    VerificationRevoked {
        player: PlayerId,
        admitted: usize,
    },
    CountdownStarted {
        ends_in_ms: u64,
    },
    CountdownAborted {
        admitted: usize,
    },
    DrawingStarted {
        admitted: usize,
        total_stake: Money,
        prize_pool: Money,
    },
    NumberDrawn {
        number: u8,
        letter: char,
        sequence: usize,
    },
    WinnerFound {
        player: PlayerId,
        card_id: CardId,
        card: Card,
        pattern: PatternKind,
    },
    PoolExhausted,
    SettlementDelayed {
        reason: String,
    },
    RoundSettled {
        winner: Option<PlayerId>,
        prize: Money,
        commission: Money,
        forfeited: Money,
    },
    TableReset,
}

/// A round event tagged with where it happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallEvent {
    pub table_id: TableId,
    pub round_id: RoundId,
    pub tier: Money,
    #[serde(flatten)]
    pub event: RoundEvent,
}
