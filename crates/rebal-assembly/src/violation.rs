//! Assembly-time validation failures.

use std::fmt;

use rebal_constraints::BoundError;
use rebal_model::{LedgerError, RiskModelIssue};
use rebal_tax::RuleError;

/// One problem found while assembling. Assembly collects all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    UnknownAsset { context: String, asset: String },
    UnknownPortfolio { context: String, portfolio: String },
    UnknownRiskModel { context: String, risk_model: String },
    UnknownFactor {
        context: String,
        risk_model: String,
        factor: String,
    },
    DuplicateConstraintId { scope: String, id: String },
    Bound { scope: String, error: BoundError },
    MultipleCashAssets { assets: Vec<String> },
    MissingCompositePortfolio { asset: String },
    InvalidPenalty {
        constraint: String,
        reason: &'static str,
    },
    NonIntegralBound { constraint: String, value: f64 },
    QuadraticShape {
        constraint: String,
        expected: usize,
        got: usize,
    },
    QuadraticNotPositiveSemidefinite { constraint: String, eigenvalue: f64 },
    InvalidConstraint {
        constraint: String,
        reason: &'static str,
    },
    InvalidScenarios { scope: String, reason: &'static str },
    InvalidCovarianceWeight {
        scope: String,
        key: String,
        reason: &'static str,
    },
    RiskModel {
        risk_model: String,
        issue: RiskModelIssue,
    },
    InvalidAversion { scope: String, value: f64 },
    InvalidTaxRule { scope: String, reason: &'static str },
    MissingTaxRules { unit: String },
    TaxRule { unit: String, error: RuleError },
    Ledger { error: LedgerError },
    InvalidTaxLot {
        portfolio: String,
        lot_id: String,
        reason: &'static str,
    },
    DuplicateLotId { portfolio: String, lot_id: String },
    InvalidWashSaleRecord {
        portfolio: String,
        asset: String,
        reason: &'static str,
    },
    InvalidBaseValue { unit: String, value: f64 },
    MissingInitialPortfolio,
    MixedTopology,
    DuplicateAccount { id: String },
    DuplicateAccountGroup { id: String },
    DuplicatePeriod { index: u32 },
    UnknownAccountGroup { account: String, group: String },
    Serialization { message: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAsset { context, asset } => {
                write!(f, "{context}: asset '{asset}' is not in the universe")
            }
            Self::UnknownPortfolio { context, portfolio } => {
                write!(f, "{context}: portfolio '{portfolio}' is not in the ledger")
            }
            Self::UnknownRiskModel {
                context,
                risk_model,
            } => write!(f, "{context}: risk model '{risk_model}' is not bound"),
            Self::UnknownFactor {
                context,
                risk_model,
                factor,
            } => write!(
                f,
                "{context}: factor '{factor}' is not in risk model '{risk_model}'"
            ),
            Self::DuplicateConstraintId { scope, id } => {
                write!(f, "{scope}: constraint id '{id}' is used more than once")
            }
            Self::Bound { scope, error } => write!(f, "{scope}: {error}"),
            Self::MultipleCashAssets { assets } => {
                write!(f, "at most one cash asset allowed, found {}", assets.join(", "))
            }
            Self::MissingCompositePortfolio { asset } => {
                write!(f, "composite asset '{asset}' has no look-through portfolio")
            }
            Self::InvalidPenalty { constraint, reason } => {
                write!(f, "constraint '{constraint}': penalty {reason}")
            }
            Self::NonIntegralBound { constraint, value } => {
                write!(f, "constraint '{constraint}': count bound {value} is not a whole number")
            }
            Self::QuadraticShape {
                constraint,
                expected,
                got,
            } => write!(
                f,
                "constraint '{constraint}': expected dimension {expected}, got {got}"
            ),
            Self::QuadraticNotPositiveSemidefinite { constraint, eigenvalue } => write!(
                f,
                "constraint '{constraint}': quadratic matrix is not positive semidefinite (eigenvalue {eigenvalue:.3e})"
            ),
            Self::InvalidConstraint { constraint, reason } => {
                write!(f, "constraint '{constraint}': {reason}")
            }
            Self::InvalidScenarios { scope, reason } => write!(f, "{scope}: {reason}"),
            Self::InvalidCovarianceWeight { scope, key, reason } => {
                write!(f, "{scope}: covariance weight '{key}' {reason}")
            }
            Self::RiskModel { risk_model, issue } => {
                write!(f, "risk model '{risk_model}': {issue}")
            }
            Self::InvalidAversion { scope, value } => {
                write!(f, "{scope}: risk aversion {value} must be finite and >= 0")
            }
            Self::InvalidTaxRule { scope, reason } => write!(f, "{scope}: tax rule {reason}"),
            Self::MissingTaxRules { unit } => {
                write!(f, "{unit}: holds tax lots but no tax rules are set")
            }
            Self::TaxRule { unit, error } => write!(f, "{unit}: {error}"),
            Self::Ledger { error } => write!(f, "{error}"),
            Self::InvalidTaxLot {
                portfolio,
                lot_id,
                reason,
            } => write!(f, "tax lot '{lot_id}' of portfolio '{portfolio}': {reason}"),
            Self::DuplicateLotId { portfolio, lot_id } => {
                write!(f, "portfolio '{portfolio}': lot id '{lot_id}' is used more than once")
            }
            Self::InvalidWashSaleRecord {
                portfolio,
                asset,
                reason,
            } => write!(f, "wash sale record for '{asset}' in portfolio '{portfolio}': {reason}"),
            Self::InvalidBaseValue { unit, value } => {
                write!(f, "{unit}: base value {value} must be finite and > 0")
            }
            Self::MissingInitialPortfolio => {
                write!(f, "no initial portfolio set for a single-account or multi-period run")
            }
            Self::MixedTopology => write!(f, "accounts and periods cannot be combined"),
            Self::DuplicateAccount { id } => write!(f, "account '{id}' is defined twice"),
            Self::DuplicateAccountGroup { id } => {
                write!(f, "account group '{id}' is defined twice")
            }
            Self::DuplicatePeriod { index } => write!(f, "period {index} is defined twice"),
            Self::UnknownAccountGroup { account, group } => {
                write!(f, "account '{account}': account group '{group}' is not defined")
            }
            Self::Serialization { message } => {
                write!(f, "specification could not be serialized: {message}")
            }
        }
    }
}

/// Every violation found. Never empty when returned by `assemble`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub Vec<Violation>);

impl ValidationError {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed with {} violation(s)", self.0.len())?;
        for v in &self.0 {
            write!(f, "\n  - {v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
