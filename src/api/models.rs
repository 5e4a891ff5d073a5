//! API Request and Response Models
//!
//! Amounts on the wire are integers in minor currency units.

use crate::bingo::types::TableId;
use crate::ledger::types::{Money, WithdrawalRequest, WithdrawalStatus};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub tables: usize,
}

/// POST /players
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub phone: String,
}

/// POST /players/:phone/join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub tier: Money,
}

/// POST /players/:phone/mark and /unmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkRequest {
    pub card_id: u8,
    pub cell: usize,
}

/// POST /players/:phone/auto-mark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMarkRequest {
    pub enabled: bool,
}

/// POST /players/:phone/withdrawals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Money,
    pub destination: String,
}

/// POST /admin/players/:phone/adjust
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    /// Signed change in minor units
    pub delta: i64,
    #[serde(default)]
    pub note: String,
}

/// GET /admin/withdrawals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
}

/// Response of POST /admin/withdrawals/:id/paid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutResponse {
    pub withdrawal: WithdrawalRequest,
    pub already_paid: bool,
}

/// GET /ws
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsQuery {
    pub table_id: Option<TableId>,
}

/// Acknowledgement for commands without a richer result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
