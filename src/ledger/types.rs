//! Ledger value types: money, identifiers and persisted record shapes.

use crate::bingo::caller::CallerState;
use crate::bingo::patterns::PatternKind;
use crate::bingo::types::{CardId, PlayerRoundId, TableId};
use crate::errors::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Amount of money in minor currency units (1 whole unit = 100 minor units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub const MINOR_PER_WHOLE: u64 = 100;

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub const fn whole(units: u64) -> Self {
        Self(units * Self::MINOR_PER_WHOLE)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Apply a signed delta; `None` if the result would be negative or overflow.
    pub fn apply(self, delta: i64) -> Option<Money> {
        if delta >= 0 {
            self.0.checked_add(delta as u64).map(Money)
        } else {
            self.0.checked_sub(delta.unsigned_abs()).map(Money)
        }
    }

    /// Floor of `self * bps / 10_000`.
    pub fn share_bps(self, bps: u32) -> Money {
        Money(((self.0 as u128 * bps as u128) / 10_000) as u64)
    }

    /// Signed delta of this amount, saturating at `i64::MAX`.
    pub fn as_delta(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / Self::MINOR_PER_WHOLE,
            self.0 % Self::MINOR_PER_WHOLE
        )
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        Money(iter.map(|m| m.0).sum())
    }
}

/// Player identifier: the phone number the wallet is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    /// Local mobile numbers: `09` followed by eight digits.
    pub fn parse(phone: &str) -> Result<Self, LedgerError> {
        let phone = phone.trim();
        let valid = phone.len() == 10
            && phone.starts_with("09")
            && phone.bytes().all(|b| b.is_ascii_digit());
        if valid {
            Ok(Self(phone.to_string()))
        } else {
            Err(LedgerError::InvalidPhone(phone.to_string()))
        }
    }

    #[cfg(test)]
    pub(crate) fn new_unchecked(phone: &str) -> Self {
        Self(phone.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PlayerId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PlayerId::parse(&value)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

impl FromStr for PlayerId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayerId::parse(s)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

pub(crate) use uuid_id;

uuid_id!(
    /// One round of bingo on one table
    RoundId
);
uuid_id!(
    /// Withdrawal request identifier
    WithdrawalId
);

/// Exactly-once guard for wallet mutations. A key is journaled atomically
/// with the balance change it protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn stake(round_id: &RoundId, player: &PlayerId, tier: Money) -> Self {
        Self(format!("stake:{}:{}:{}", round_id, player, tier.minor()))
    }

    pub fn prize(round_id: &RoundId) -> Self {
        Self(format!("prize:{}", round_id))
    }

    pub fn withdrawal(id: &WithdrawalId) -> Self {
        Self(format!("withdrawal:{}", id))
    }

    pub fn adjustment() -> Self {
        Self(format!("adjust:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wallet record keyed by phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub player: PlayerId,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn open(player: PlayerId) -> Self {
        let now = Utc::now();
        Self {
            player,
            balance: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Why a wallet balance moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryReason {
    Stake { round_id: RoundId },
    Prize { round_id: RoundId },
    Withdrawal { withdrawal_id: WithdrawalId },
    Adjustment { note: String },
}

/// Journal row written with every wallet mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: IdempotencyKey,
    pub player: PlayerId,
    pub delta: i64,
    pub reason: EntryReason,
    pub balance_after: Money,
    pub recorded_at: DateTime<Utc>,
}

/// A requested balance change
#[derive(Debug, Clone)]
pub struct WalletDelta {
    pub player: PlayerId,
    pub delta: i64,
    pub key: IdempotencyKey,
    pub reason: EntryReason,
}

/// Result of applying a [`WalletDelta`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The balance moved; carries the wallet after the change.
    Applied(Wallet),
    /// The key was already journaled; nothing moved.
    Duplicate(Wallet),
}

impl DeltaOutcome {
    pub fn wallet(&self) -> &Wallet {
        match self {
            DeltaOutcome::Applied(w) | DeltaOutcome::Duplicate(w) => w,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DeltaOutcome::Duplicate(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
}

/// Cash-out request; the wallet is debited when the request is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub player: PlayerId,
    pub amount: Money,
    pub destination: PlayerId,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Winning seat of a settled round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub player: PlayerId,
    pub player_round_id: PlayerRoundId,
    pub card_id: CardId,
    pub pattern: PatternKind,
}

/// What a table hands to the coordinator once its round is decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub round_id: RoundId,
    pub table_id: TableId,
    pub tier: Money,
    pub winner: Option<WinnerRecord>,
    pub total_stake: Money,
    pub prize_pool: Money,
    /// Stakes of seats that were never admitted to the pool
    pub forfeited_stake: Money,
    pub drawn_numbers: Vec<u8>,
    pub caller_state: CallerState,
}

/// Archived outcome of a round, committed together with the prize credit.
/// Without a winner the whole stake is kept as commission. Forfeited stakes
/// are retained by the house on top of the commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub round_id: RoundId,
    pub table_id: TableId,
    pub tier: Money,
    pub winner: Option<WinnerRecord>,
    pub prize_pool: Money,
    pub total_stake: Money,
    pub commission: Money,
    #[serde(default)]
    pub forfeited_stake: Money,
    pub drawn_numbers: Vec<u8>,
    pub caller_state: CallerState,
    pub settled_at: DateTime<Utc>,
}
