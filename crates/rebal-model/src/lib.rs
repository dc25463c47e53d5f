//! rebal-model
//!
//! Construction-phase data model for one rebalance request:
//! - phantom-typed identifiers and typed attribute maps
//! - asset universe with bound factor risk models
//! - portfolio ledger (holdings, tax lots, wash-sale records)
//!
//! Pure deterministic logic (no IO, no solver wiring). Everything here is
//! built once, handed to the assembler, and read-only from then on.

mod attributes;
mod ids;
mod linalg;
mod portfolio;
mod risk_model;
mod universe;

pub mod ledger;

pub use attributes::{
    AlphaMap, AttrKind, AttrMap, AttrRole, AttrScalar, AttrValue, AttributeError, AttributeStore,
    CoefficientMap, GroupTagMap, PriceMap, RoundLotMap,
};
pub use ids::{
    AssetId, AssetKey, ConstraintId, ConstraintKey, FactorId, FactorKey, Id, PortfolioId,
    PortfolioKey, RiskModelId, RiskModelKey,
};
pub use ledger::{LedgerError, PortfolioLedger};
pub use linalg::{check_psd, MatrixError, PsdVerdict, SymMatrix};
pub use portfolio::{GainType, Portfolio, TaxCategory, TaxLot, WashSaleRecord};
pub use risk_model::{RiskDecomposition, RiskModel, RiskModelIssue};
pub use universe::{Asset, AssetType, AssetUniverse, UniverseError};

/// Default tolerance for weight comparisons across the workspace.
pub const WEIGHT_EPS: f64 = 1e-12;
