//! Wire types exchanged with the solver.
//!
//! Plain data only: ids are strings, amounts are f64. The solver sees these
//! as opaque serialized bytes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    pub request_id: Uuid,
    pub created_at_utc: DateTime<Utc>,
    /// SHA-256 hex of the canonical specification JSON.
    pub spec_hash: String,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Infeasible,
    LicenseError,
    ValidationError,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveStatus {
    pub code: StatusCode,
    pub message: String,
    #[serde(default)]
    pub log: String,
}

impl SolveStatus {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
            log: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Optimal result for one account / period (both `None` for single-account).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimalPortfolio {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub period: Option<u32>,
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub utility: f64,
    pub turnover: f64,
    #[serde(default)]
    pub penalty: f64,
    #[serde(default)]
    pub transaction_cost: f64,
    #[serde(default)]
    pub beta: f64,
    pub holdings: BTreeMap<String, f64>,
}

/// Per-constraint diagnostic returned by the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackInfo {
    pub constraint_id: String,
    pub slack: f64,
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotPosition {
    pub lot_id: String,
    pub asset: String,
    pub age_days: u32,
    pub cost_basis: f64,
    pub shares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WashSaleDetail {
    pub sold_lot_id: String,
    pub replacement_lot_id: String,
    pub asset: String,
    pub shares: f64,
    pub disallowed_loss: f64,
    pub age_carried_days: u32,
}

/// Realized gain/loss for one (group value, category) cell.
/// `group` is `None` for portfolio totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainLossRow {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// `LONG_TERM` / `SHORT_TERM`.
    pub category: String,
    pub gain: f64,
    pub loss: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxOutput {
    #[serde(default)]
    pub account: Option<String>,
    pub remaining_lots: Vec<LotPosition>,
    pub new_lots: Vec<LotPosition>,
    pub disallowed_shares: f64,
    pub wash_sales: Vec<WashSaleDetail>,
    pub gain_loss: Vec<GainLossRow>,
    pub total_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub request_id: Uuid,
    pub status: SolveStatus,
    #[serde(default)]
    pub portfolios: Vec<OptimalPortfolio>,
    #[serde(default)]
    pub slacks: Vec<SlackInfo>,
    #[serde(default)]
    pub tax: Vec<TaxOutput>,
}

impl SolveResponse {
    pub fn slack_map(&self) -> BTreeMap<&str, f64> {
        self.slacks
            .iter()
            .map(|s| (s.constraint_id.as_str(), s.slack))
            .collect()
    }
}
