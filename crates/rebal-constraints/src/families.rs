//! One builder per constraint family.
//!
//! Every builder returns a [`ConstraintInfo`] with a deterministic default id
//! and no bounds; callers chain `with_bounds` / `with_upper_mode` / `soft` etc.

use std::collections::BTreeSet;

use rebal_model::{
    AssetId, CoefficientMap, FactorId, GainType, PortfolioId, RiskModelId, SymMatrix, TaxCategory,
};

use crate::info::{
    ConstraintInfo, ConstraintKind, CountTarget, GroupScope, RiskComponent, Side, ThresholdKind,
};

// ─── Asset / cash ─────────────────────────────────────────────────────────────

pub fn asset_range<A: Into<AssetId>>(asset: A) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::AssetRange {
        asset: asset.into(),
    })
}

/// The same bound on every non-cash asset.
pub fn non_cash_range() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::NonCashRange)
}

pub fn asset_trade_size<A: Into<AssetId>>(asset: A) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::AssetTradeSize {
        asset: asset.into(),
    })
}

// ─── Factor / beta / group / linear ───────────────────────────────────────────

pub fn factor_range<M: Into<RiskModelId>, F: Into<FactorId>>(risk_model: M, factor: F) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::FactorRange {
        risk_model: risk_model.into(),
        factor: factor.into(),
    })
}

pub fn beta<M: Into<RiskModelId>, P: Into<PortfolioId>>(risk_model: M, benchmark: P) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Beta {
        risk_model: risk_model.into(),
        benchmark: benchmark.into(),
    })
}

pub fn group(scope: GroupScope) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Group {
        scope,
        coefficients: None,
    })
}

pub fn weighted_group(scope: GroupScope, coefficients: CoefficientMap) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Group {
        scope,
        coefficients: Some(coefficients),
    })
}

/// General linear functional Σ cᵢ·wᵢ (custom betas, attribute exposures).
pub fn linear<S: Into<String>>(name: S, coefficients: CoefficientMap) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Linear {
        name: name.into(),
        coefficients,
    })
}

/// Σ βᵢ·wᵢ with per-asset shortfall betas. Cash carries no beta, so leave it
/// out of `betas`.
pub fn shortfall_beta(betas: CoefficientMap) -> ConstraintInfo {
    linear("shortfall-beta", betas).with_id("shortfall-beta")
}

/// Starts a piecewise linear function of `asset`'s weight, zero at `start`.
/// Add pieces with `with_downside_slope` / `with_upside_slope`, innermost
/// first.
pub fn piecewise_linear<A: Into<AssetId>>(asset: A, start: f64) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::PiecewiseLinear {
        asset: asset.into(),
        start,
        downside: Vec::new(),
        upside: Vec::new(),
    })
}

// ─── Ratio / quadratic ────────────────────────────────────────────────────────

pub fn ratio<S: Into<String>>(
    name: S,
    numerator: CoefficientMap,
    denominator: Option<CoefficientMap>,
) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Ratio {
        name: name.into(),
        numerator,
        denominator,
    })
}

pub fn group_ratio(scope: GroupScope, coefficients: CoefficientMap) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::GroupRatio {
        scope,
        coefficients,
    })
}

pub fn quadratic<S: Into<String>>(
    name: S,
    assets: Vec<AssetId>,
    q: SymMatrix,
    linear: Vec<f64>,
    benchmark: Option<PortfolioId>,
) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Quadratic {
        name: name.into(),
        assets,
        q,
        linear,
        benchmark,
    })
}

// ─── Turnover / leverage ──────────────────────────────────────────────────────

pub fn turnover(side: Side) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Turnover {
        side,
        scope: None,
        cross_period: false,
    })
}

pub fn group_turnover(side: Side, scope: GroupScope) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Turnover {
        side,
        scope: Some(scope),
        cross_period: false,
    })
}

/// Turnover summed over every period of a multi-period request.
pub fn cross_period_turnover(side: Side) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Turnover {
        side,
        scope: None,
        cross_period: true,
    })
}

pub fn leverage(side: Side) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Leverage { side, scope: None })
}

pub fn group_leverage(side: Side, scope: GroupScope) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Leverage {
        side,
        scope: Some(scope),
    })
}

// ─── Risk ─────────────────────────────────────────────────────────────────────

pub fn risk_budget<M: Into<RiskModelId>>(
    risk_model: M,
    component: RiskComponent,
    benchmark: Option<PortfolioId>,
) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::RiskBudget {
        risk_model: risk_model.into(),
        component,
        benchmark,
    })
}

/// Risk of a set of assets; `additive` attributes total risk, otherwise the
/// assets are measured on their own.
pub fn asset_risk_budget<M, I, A>(
    risk_model: M,
    assets: I,
    benchmark: Option<PortfolioId>,
    additive: bool,
) -> ConstraintInfo
where
    M: Into<RiskModelId>,
    I: IntoIterator<Item = A>,
    A: Into<AssetId>,
{
    ConstraintInfo::new(ConstraintKind::AssetRiskBudget {
        risk_model: risk_model.into(),
        assets: assets.into_iter().map(Into::into).collect(),
        benchmark,
        additive,
    })
}

/// Bound on expected shortfall over the profile's return scenarios.
pub fn expected_shortfall() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::ExpectedShortfall)
}

// ─── Paring ───────────────────────────────────────────────────────────────────

pub fn num_assets() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Cardinality {
        target: CountTarget::Assets,
        scope: None,
    })
}

pub fn num_trades() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Cardinality {
        target: CountTarget::Trades,
        scope: None,
    })
}

pub fn group_cardinality(target: CountTarget, scope: GroupScope) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Cardinality {
        target,
        scope: Some(scope),
    })
}

/// Minimum holding / transaction size; pass the threshold as the lower bound.
pub fn threshold(kind: ThresholdKind, scope: Option<GroupScope>) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::Threshold { kind, scope })
}

// ─── Tax ──────────────────────────────────────────────────────────────────────

pub fn tax_arbitrage(
    category: TaxCategory,
    gain_type: GainType,
    scope: Option<GroupScope>,
) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::TaxArbitrage {
        category: Some(category),
        gain_type,
        scope,
    })
}

/// Gain/loss summed over both tax categories.
pub fn total_tax_arbitrage(gain_type: GainType, scope: Option<GroupScope>) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::TaxArbitrage {
        category: None,
        gain_type,
        scope,
    })
}

pub fn tax_limit() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::TaxLimit)
}

pub fn transaction_cost() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::TransactionCost)
}

// ─── Concentration / issuer ───────────────────────────────────────────────────

pub fn concentration<I, A>(top_n: usize, excluded: I) -> ConstraintInfo
where
    I: IntoIterator<Item = A>,
    A: Into<AssetId>,
{
    let excluded: BTreeSet<AssetId> = excluded.into_iter().map(Into::into).collect();
    ConstraintInfo::new(ConstraintKind::Concentration { top_n, excluded })
}

pub fn issuer_holding<S: Into<String>>(issuer: S) -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::IssuerHolding {
        issuer: Some(issuer.into()),
    })
}

/// Same bound on every issuer's total weight.
pub fn all_issuers_holding() -> ConstraintInfo {
    ConstraintInfo::new(ConstraintKind::IssuerHolding { issuer: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::ConstraintCategory;
    use crate::info::SlopeSegment;

    #[test]
    fn builders_carry_family_and_category() {
        let c = factor_range("GEM", "Factor_1A").with_bounds(-0.1, 0.1);
        assert_eq!(c.kind.family(), "factor_range");
        assert_eq!(c.category(), ConstraintCategory::Factor);
        assert_eq!(c.id.as_str(), "factor/GEM/Factor_1A");

        let h = leverage(Side::Long).with_upper(1.3);
        assert_eq!(h.category(), ConstraintCategory::Hedge);

        let t = threshold(ThresholdKind::MinHoldingLong, None).with_lower(0.04);
        assert_eq!(t.category(), ConstraintCategory::HoldingLevelParing);
    }

    #[test]
    fn concentration_collects_exclusions() {
        let c = concentration(3, ["E", "F"]);
        match &c.kind {
            ConstraintKind::Concentration { top_n, excluded } => {
                assert_eq!(*top_n, 3);
                assert_eq!(excluded.len(), 2);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn piecewise_pieces_append_innermost_first() {
        let c = piecewise_linear("USA11I1", 0.0)
            .with_downside_slope(-0.01, Some(-0.05))
            .with_downside_slope(-0.03, None)
            .with_upside_slope(0.02, Some(0.04))
            .with_bounds(0.0, 0.25);
        match &c.kind {
            ConstraintKind::PiecewiseLinear { downside, upside, .. } => {
                assert_eq!(downside.len(), 2);
                assert_eq!(downside[1], SlopeSegment::new(-0.03, None));
                assert_eq!(upside[0].breakpoint, Some(0.04));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(c.id.as_str(), "piecewise/USA11I1");

        let untouched = tax_limit().with_upside_slope(1.0, None);
        assert_eq!(untouched, tax_limit());
    }

    #[test]
    fn shortfall_beta_is_a_named_linear_constraint() {
        let c = shortfall_beta(CoefficientMap::new().with("USA11I1", 0.9)).with_bounds(0.9, 0.9);
        assert_eq!(c.kind.family(), "linear");
        assert_eq!(c.id.as_str(), "shortfall-beta");
        assert_eq!(expected_shortfall().id.as_str(), "expected-shortfall");
    }

    #[test]
    fn cross_period_turnover_has_distinct_id() {
        assert_ne!(
            turnover(Side::Total).id,
            cross_period_turnover(Side::Total).id
        );
    }
}
