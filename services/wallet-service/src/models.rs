use crate::errors::{Result, WalletServiceError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Persisted wallet row. Balance is kept in minor units (cents).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Wallet {
    pub wallet_id: Uuid,
    pub balance: i64,
}

impl Wallet {
    pub fn empty(wallet_id: Uuid) -> Self {
        Wallet {
            wallet_id,
            balance: 0,
        }
    }
}

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deposit,
    Withdraw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "DEPOSIT",
            OperationKind::Withdraw => "WITHDRAW",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = WalletServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DEPOSIT" => Ok(OperationKind::Deposit),
            "WITHDRAW" => Ok(OperationKind::Withdraw),
            _ => Err(WalletServiceError::InvalidOperationType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Success,
    InsufficientBalance,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "SUCCESS",
            OperationStatus::InsufficientBalance => "INSUFFICIENT_BALANCE",
        }
    }
}

/// Outcome of a single balance mutation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub wallet_id: Uuid,
    pub balance_cents: i64,
    pub status: OperationStatus,
}

/// `POST /api/v1/wallets` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationRequest {
    pub wallet_id: String,
    pub operation_type: String,
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub wallet_id: String,
    pub balance: String,
    pub operation_status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&OperationResult> for OperationResponse {
    fn from(result: &OperationResult) -> Self {
        OperationResponse {
            wallet_id: result.wallet_id.to_string(),
            balance: format_cents(result.balance_cents),
            operation_status: result.status,
            error: match result.status {
                OperationStatus::Success => None,
                OperationStatus::InsufficientBalance => Some("not_enough_money".to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub wallet_id: String,
    pub balance: String,
}

impl From<&Wallet> for BalanceResponse {
    fn from(wallet: &Wallet) -> Self {
        BalanceResponse {
            wallet_id: wallet.wallet_id.to_string(),
            balance: format_cents(wallet.balance),
        }
    }
}

/// Converts a major-unit decimal string ("12.34", "1e2") into minor units,
/// rounding half away from zero.
pub fn parse_amount_cents(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WalletServiceError::InvalidAmount);
    }

    let amount = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| WalletServiceError::InvalidAmount)?;

    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or(WalletServiceError::InvalidAmount)
}

/// Formats minor units as a major-unit string with two decimals.
pub fn format_cents(cents: i64) -> String {
    format!("{:.2}", Decimal::new(cents, 2))
}
