//! Portfolio ledger: named portfolios, their holdings and tax lots.
//!
//! # Rules
//! - `add_holding` is an idempotent set: re-adding an asset replaces its weight.
//! - Tax-lot portfolios derive their weights from lots:
//!   weight(a) = Σ shares·price over a's lots / Σ shares·price over all lots.
//!   Adding a lot marks the derived weights stale until
//!   [`PortfolioLedger::recompute_weights_from_lots`] runs again.
//! - Every mutation is checked first; a failed call leaves the ledger untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attributes::PriceMap;
use crate::ids::{AssetId, PortfolioId};
use crate::portfolio::{Portfolio, WashSaleRecord};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    DuplicatePortfolio { portfolio: PortfolioId },
    UnknownPortfolio { portfolio: String },
    NonFiniteWeight { asset: AssetId, weight: f64 },
    NonPositiveShares { asset: AssetId, shares: f64 },
    InvalidCostBasis { asset: AssetId, cost_basis: f64 },
    InvalidWashSale { asset: AssetId, reason: &'static str },
    MissingPrice { asset: AssetId },
    ZeroPortfolioValue { portfolio: PortfolioId },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicatePortfolio { portfolio } => {
                write!(f, "portfolio '{portfolio}' already exists")
            }
            Self::UnknownPortfolio { portfolio } => {
                write!(f, "portfolio '{portfolio}' does not exist")
            }
            Self::NonFiniteWeight { asset, weight } => {
                write!(f, "weight for '{asset}' must be finite, got {weight}")
            }
            Self::NonPositiveShares { asset, shares } => {
                write!(f, "tax lot shares for '{asset}' must be > 0, got {shares}")
            }
            Self::InvalidCostBasis { asset, cost_basis } => write!(
                f,
                "tax lot cost basis for '{asset}' must be finite and >= 0, got {cost_basis}"
            ),
            Self::InvalidWashSale { asset, reason } => {
                write!(f, "wash sale record for '{asset}': {reason}")
            }
            Self::MissingPrice { asset } => {
                write!(f, "no price for '{asset}'; cannot value its tax lots")
            }
            Self::ZeroPortfolioValue { portfolio } => {
                write!(f, "portfolio '{portfolio}' has zero lot value")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLedger {
    portfolios: BTreeMap<PortfolioId, Portfolio>,
}

impl PortfolioLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_portfolio<S: Into<PortfolioId>>(&mut self, id: S) -> Result<(), LedgerError> {
        let id = id.into();
        if self.portfolios.contains_key(&id) {
            return Err(LedgerError::DuplicatePortfolio { portfolio: id });
        }
        self.portfolios.insert(id.clone(), Portfolio::new(id));
        Ok(())
    }

    /// Insert an already-built portfolio (benchmarks, fixtures).
    pub fn insert_portfolio(&mut self, portfolio: Portfolio) -> Result<(), LedgerError> {
        if self.portfolios.contains_key(portfolio.id()) {
            return Err(LedgerError::DuplicatePortfolio {
                portfolio: portfolio.id().clone(),
            });
        }
        self.portfolios.insert(portfolio.id().clone(), portfolio);
        Ok(())
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Portfolio, LedgerError> {
        self.portfolios
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownPortfolio {
                portfolio: id.to_string(),
            })
    }

    pub fn add_holding<A: Into<AssetId>>(
        &mut self,
        portfolio: &str,
        asset: A,
        weight: f64,
    ) -> Result<(), LedgerError> {
        let asset = asset.into();
        if !weight.is_finite() {
            return Err(LedgerError::NonFiniteWeight { asset, weight });
        }
        self.get_mut(portfolio)?.set_holding(asset, weight);
        Ok(())
    }

    /// Returns the new lot's id (`<asset>#<n>`, unique within the portfolio).
    pub fn add_tax_lot<A: Into<AssetId>>(
        &mut self,
        portfolio: &str,
        asset: A,
        age_days: u32,
        cost_basis: f64,
        shares: f64,
    ) -> Result<String, LedgerError> {
        let asset = asset.into();
        if !(shares > 0.0 && shares.is_finite()) {
            return Err(LedgerError::NonPositiveShares { asset, shares });
        }
        if !(cost_basis >= 0.0 && cost_basis.is_finite()) {
            return Err(LedgerError::InvalidCostBasis { asset, cost_basis });
        }
        Ok(self
            .get_mut(portfolio)?
            .push_lot(asset, age_days, cost_basis, shares))
    }

    pub fn add_wash_sale_record(
        &mut self,
        portfolio: &str,
        record: WashSaleRecord,
    ) -> Result<(), LedgerError> {
        if !(record.shares > 0.0 && record.shares.is_finite()) {
            return Err(LedgerError::InvalidWashSale {
                asset: record.asset,
                reason: "shares must be > 0",
            });
        }
        if !(record.loss_per_share >= 0.0 && record.loss_per_share.is_finite()) {
            return Err(LedgerError::InvalidWashSale {
                asset: record.asset,
                reason: "loss per share must be finite and >= 0",
            });
        }
        self.get_mut(portfolio)?.push_wash_sale(record);
        Ok(())
    }

    /// Derive holding weights from lots. Returns the portfolio value.
    ///
    /// Deterministic; assets without lots drop out of the holdings.
    pub fn recompute_weights_from_lots(
        &mut self,
        portfolio: &str,
        prices: &PriceMap,
    ) -> Result<f64, LedgerError> {
        let pf = self.get_mut(portfolio)?;

        let mut values: BTreeMap<AssetId, f64> = BTreeMap::new();
        for lot in pf.lots() {
            let px = prices
                .get(lot.asset.as_str())
                .map_err(|_| LedgerError::MissingPrice {
                    asset: lot.asset.clone(),
                })?;
            *values.entry(lot.asset.clone()).or_insert(0.0) += lot.value_at(px);
        }

        let total: f64 = values.values().sum();
        if total == 0.0 {
            return Err(LedgerError::ZeroPortfolioValue {
                portfolio: pf.id().clone(),
            });
        }

        let weights = values.into_iter().map(|(a, v)| (a, v / total)).collect();
        pf.replace_holdings(weights);
        Ok(total)
    }

    pub fn portfolio(&self, id: &str) -> Option<&Portfolio> {
        self.portfolios.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.portfolios.contains_key(id)
    }

    pub fn portfolios(&self) -> impl Iterator<Item = &Portfolio> + '_ {
        self.portfolios.values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(id: &str) -> PortfolioLedger {
        let mut l = PortfolioLedger::new();
        l.create_portfolio(id).unwrap();
        l
    }

    #[test]
    fn add_holding_replaces_weight() {
        let mut l = ledger_with("P");
        l.add_holding("P", "A", 0.2).unwrap();
        l.add_holding("P", "A", 0.5).unwrap();
        let p = l.portfolio("P").unwrap();
        assert_eq!(p.holdings().len(), 1);
        assert_eq!(p.weight("A"), 0.5);
    }

    #[test]
    fn negative_weight_is_a_short() {
        let mut l = ledger_with("P");
        l.add_holding("P", "A", -0.1).unwrap();
        assert_eq!(l.portfolio("P").unwrap().weight("A"), -0.1);
    }

    #[test]
    fn unknown_portfolio_is_reported() {
        let mut l = PortfolioLedger::new();
        assert!(matches!(
            l.add_holding("X", "A", 0.1),
            Err(LedgerError::UnknownPortfolio { .. })
        ));
    }

    #[test]
    fn duplicate_portfolio_is_rejected() {
        let mut l = ledger_with("P");
        assert!(matches!(
            l.create_portfolio("P"),
            Err(LedgerError::DuplicatePortfolio { .. })
        ));
    }

    #[test]
    fn lot_ids_are_sequential_per_asset() {
        let mut l = ledger_with("P");
        assert_eq!(l.add_tax_lot("P", "A", 10, 5.0, 1.0).unwrap(), "A#1");
        assert_eq!(l.add_tax_lot("P", "B", 10, 5.0, 1.0).unwrap(), "B#1");
        assert_eq!(l.add_tax_lot("P", "A", 3, 5.0, 1.0).unwrap(), "A#2");
    }

    #[test]
    fn invalid_lots_are_rejected_without_mutation() {
        let mut l = ledger_with("P");
        assert!(matches!(
            l.add_tax_lot("P", "A", 1, 5.0, 0.0),
            Err(LedgerError::NonPositiveShares { .. })
        ));
        assert!(matches!(
            l.add_tax_lot("P", "A", 1, -1.0, 3.0),
            Err(LedgerError::InvalidCostBasis { .. })
        ));
        assert!(l.portfolio("P").unwrap().lots().is_empty());
    }

    #[test]
    fn weights_derive_from_lot_values() {
        let mut l = ledger_with("P");
        l.add_tax_lot("P", "A", 100, 10.0, 30.0).unwrap();
        l.add_tax_lot("P", "A", 400, 8.0, 10.0).unwrap();
        l.add_tax_lot("P", "B", 50, 20.0, 10.0).unwrap();
        assert!(l.portfolio("P").unwrap().lot_weights_stale());

        let px = PriceMap::new().with("A", 10.0).with("B", 60.0);
        let value = l.recompute_weights_from_lots("P", &px).unwrap();
        // A: 40 * 10 = 400, B: 10 * 60 = 600
        assert!((value - 1000.0).abs() < 1e-9);
        let p = l.portfolio("P").unwrap();
        assert!((p.weight("A") - 0.4).abs() < 1e-12);
        assert!((p.weight("B") - 0.6).abs() < 1e-12);
        assert!(!p.lot_weights_stale());
    }

    #[test]
    fn zero_value_portfolio_fails() {
        let mut l = ledger_with("P");
        l.add_tax_lot("P", "A", 1, 10.0, 5.0).unwrap();
        let px = PriceMap::new().with("A", 0.0);
        assert!(matches!(
            l.recompute_weights_from_lots("P", &px),
            Err(LedgerError::ZeroPortfolioValue { .. })
        ));
    }

    #[test]
    fn empty_lot_portfolio_has_zero_value() {
        let mut l = ledger_with("P");
        assert!(matches!(
            l.recompute_weights_from_lots("P", &PriceMap::new()),
            Err(LedgerError::ZeroPortfolioValue { .. })
        ));
    }

    #[test]
    fn missing_price_names_the_asset() {
        let mut l = ledger_with("P");
        l.add_tax_lot("P", "A", 1, 10.0, 5.0).unwrap();
        let err = l
            .recompute_weights_from_lots("P", &PriceMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::MissingPrice {
                asset: AssetId::new("A")
            }
        );
    }

    #[test]
    fn wash_sale_records_are_kept() {
        let mut l = ledger_with("P");
        l.add_wash_sale_record(
            "P",
            WashSaleRecord {
                asset: AssetId::new("A"),
                age_days: 12,
                loss_per_share: 1.5,
                shares: 20.0,
                disqualified: false,
            },
        )
        .unwrap();
        assert_eq!(l.portfolio("P").unwrap().wash_sales().len(), 1);
    }
}
