//! The one constraint contract every family is normalized to.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use rebal_model::{
    AssetId, CoefficientMap, ConstraintId, FactorId, GainType, PortfolioId, RiskModelId,
    SymMatrix, TaxCategory,
};

use crate::hierarchy::ConstraintCategory;

// ─── Bounds ───────────────────────────────────────────────────────────────────

/// How a raw bound combines with the reference portfolio's functional value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelativeMode {
    #[default]
    Absolute,
    Plus,
    Multiple,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    #[serde(default)]
    pub mode: RelativeMode,
}

impl Bound {
    pub fn absolute(value: f64) -> Self {
        Self {
            value,
            mode: RelativeMode::Absolute,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyShape {
    Linear,
    Quadratic,
}

/// Soft-constraint penalty: zero at `target`, growing outside `[lower, upper]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub target: f64,
    pub lower: f64,
    pub upper: f64,
    pub shape: PenaltyShape,
    pub multiplier: f64,
}

impl Penalty {
    pub fn new(target: f64, lower: f64, upper: f64) -> Self {
        Self {
            target,
            lower,
            upper,
            shape: PenaltyShape::Linear,
            multiplier: 1.0,
        }
    }

    pub fn quadratic(mut self) -> Self {
        self.shape = PenaltyShape::Quadratic;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.lower <= self.target && self.target <= self.upper) {
            return Err("penalty requires lower <= target <= upper");
        }
        if !(self.multiplier >= 0.0 && self.multiplier.is_finite()) {
            return Err("penalty multiplier must be finite and >= 0");
        }
        Ok(())
    }
}

// ─── Family parameters ────────────────────────────────────────────────────────

/// `(group attribute, value)` selector, e.g. `(GICS_SECTOR, Energy)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupScope {
    pub group: String,
    pub value: String,
}

impl GroupScope {
    pub fn new<G: Into<String>, V: Into<String>>(group: G, value: V) -> Self {
        Self {
            group: group.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for GroupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
    Total,
    Net,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Total => "total",
            Self::Net => "net",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskComponent {
    Total,
    Factor,
    Specific,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountTarget {
    Assets,
    Trades,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdKind {
    MinHoldingLong,
    MinHoldingShort,
    MinTransactionLong,
    MinTransactionShort,
}

impl ThresholdKind {
    pub fn is_holding(&self) -> bool {
        matches!(self, Self::MinHoldingLong | Self::MinHoldingShort)
    }

    fn slug(&self) -> &'static str {
        match self {
            Self::MinHoldingLong => "min-holding-long",
            Self::MinHoldingShort => "min-holding-short",
            Self::MinTransactionLong => "min-transaction-long",
            Self::MinTransactionShort => "min-transaction-short",
        }
    }
}

/// One piece of a piecewise linear function. `breakpoint` is the weight where
/// the piece ends; the outermost piece may leave it open.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlopeSegment {
    pub slope: f64,
    #[serde(default)]
    pub breakpoint: Option<f64>,
}

impl SlopeSegment {
    pub fn new(slope: f64, breakpoint: Option<f64>) -> Self {
        Self { slope, breakpoint }
    }
}

/// Checks a piecewise linear definition: finite values, downside breakpoints
/// strictly decreasing below `start`, upside ones strictly increasing above
/// it, and only the outermost piece on each side left open.
pub fn validate_piecewise(start: f64, downside: &[SlopeSegment], upside: &[SlopeSegment]) -> Result<(), &'static str> {
    if !start.is_finite() {
        return Err("starting point must be finite");
    }
    for (segments, below) in [(downside, true), (upside, false)] {
        let mut edge = start;
        for (k, seg) in segments.iter().enumerate() {
            if !seg.slope.is_finite() {
                return Err("slopes must be finite");
            }
            match seg.breakpoint {
                Some(b) if !b.is_finite() => return Err("breakpoints must be finite"),
                Some(b) if below && b >= edge => {
                    return Err("downside breakpoints must decrease away from the starting point")
                }
                Some(b) if !below && b <= edge => {
                    return Err("upside breakpoints must increase away from the starting point")
                }
                Some(b) => edge = b,
                None if k + 1 < segments.len() => {
                    return Err("only the outermost slope may omit its breakpoint")
                }
                None => {}
            }
        }
    }
    Ok(())
}

/// Family and its distinguishing parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Bound on one asset's weight.
    AssetRange { asset: AssetId },
    /// Blanket bound applied to every non-cash asset individually.
    NonCashRange,
    /// Bound on |trade| of one asset.
    AssetTradeSize { asset: AssetId },
    FactorRange {
        risk_model: RiskModelId,
        factor: FactorId,
    },
    /// Bound on Σ wᵢ·βᵢ, betas predicted against `benchmark`.
    Beta {
        risk_model: RiskModelId,
        benchmark: PortfolioId,
    },
    /// Σ cᵢ·wᵢ over a group; cᵢ = 1 without coefficients.
    Group {
        scope: GroupScope,
        #[serde(default)]
        coefficients: Option<CoefficientMap>,
    },
    /// Σ cᵢ·wᵢ over the coefficient map's assets.
    Linear {
        name: String,
        coefficients: CoefficientMap,
    },
    /// Σ nᵢ·wᵢ / Σ dᵢ·wᵢ. Without a denominator, Σ wᵢ over the numerator's assets.
    Ratio {
        name: String,
        numerator: CoefficientMap,
        #[serde(default)]
        denominator: Option<CoefficientMap>,
    },
    /// Σ cᵢ·wᵢ / Σ wᵢ, both over the group.
    GroupRatio {
        scope: GroupScope,
        coefficients: CoefficientMap,
    },
    /// Piecewise linear function of one asset's weight, zero at `start`.
    /// Downside pieces apply below `start`, upside pieces above it; past the
    /// last breakpoint the last slope continues.
    PiecewiseLinear {
        asset: AssetId,
        start: f64,
        #[serde(default)]
        downside: Vec<SlopeSegment>,
        #[serde(default)]
        upside: Vec<SlopeSegment>,
    },
    /// (w−b)ᵀQ(w−b) + qᵀ(w−b) over `assets` (matrix row order).
    Quadratic {
        name: String,
        assets: Vec<AssetId>,
        q: SymMatrix,
        #[serde(default)]
        linear: Vec<f64>,
        #[serde(default)]
        benchmark: Option<PortfolioId>,
    },
    Turnover {
        side: Side,
        #[serde(default)]
        scope: Option<GroupScope>,
        #[serde(default)]
        cross_period: bool,
    },
    /// Leverage / hedge bound on the holdings by side.
    Leverage {
        side: Side,
        #[serde(default)]
        scope: Option<GroupScope>,
    },
    RiskBudget {
        risk_model: RiskModelId,
        component: RiskComponent,
        #[serde(default)]
        benchmark: Option<PortfolioId>,
    },
    /// Risk attributed to a set of assets. Additive: the assets' share of
    /// total risk, Σᵢ wᵢ·(Σw)ᵢ / σ(w). Otherwise the standalone risk of the
    /// sub-portfolio holding only those assets.
    AssetRiskBudget {
        risk_model: RiskModelId,
        assets: BTreeSet<AssetId>,
        #[serde(default)]
        benchmark: Option<PortfolioId>,
        #[serde(default)]
        additive: bool,
    },
    /// Expected shortfall over the profile's return scenarios.
    ExpectedShortfall,
    /// Integer bound on the count of non-zero holdings or trades.
    Cardinality {
        target: CountTarget,
        #[serde(default)]
        scope: Option<GroupScope>,
    },
    /// Minimum magnitude below which a holding / trade must be zero.
    /// Only the lower bound is used.
    Threshold {
        kind: ThresholdKind,
        #[serde(default)]
        scope: Option<GroupScope>,
    },
    /// Realized gain/loss in one (category × gain type × group) cell.
    /// `category: None` is the total across categories.
    TaxArbitrage {
        #[serde(default)]
        category: Option<TaxCategory>,
        gain_type: GainType,
        #[serde(default)]
        scope: Option<GroupScope>,
    },
    /// Bound on total tax liability, in currency.
    TaxLimit,
    TransactionCost,
    /// Σ of the `top_n` largest weights, `excluded` assets and cash never counted.
    Concentration {
        top_n: usize,
        #[serde(default)]
        excluded: BTreeSet<AssetId>,
    },
    /// Σ weight of one issuer, or (issuer: None) a per-issuer blanket.
    IssuerHolding {
        #[serde(default)]
        issuer: Option<String>,
    },
}

impl ConstraintKind {
    pub fn family(&self) -> &'static str {
        match self {
            Self::AssetRange { .. } => "asset_range",
            Self::NonCashRange => "non_cash_range",
            Self::AssetTradeSize { .. } => "asset_trade_size",
            Self::FactorRange { .. } => "factor_range",
            Self::Beta { .. } => "beta",
            Self::Group { .. } => "group",
            Self::Linear { .. } => "linear",
            Self::Ratio { .. } => "ratio",
            Self::GroupRatio { .. } => "group_ratio",
            Self::PiecewiseLinear { .. } => "piecewise_linear",
            Self::Quadratic { .. } => "quadratic",
            Self::Turnover { .. } => "turnover",
            Self::Leverage { .. } => "leverage",
            Self::RiskBudget { .. } => "risk_budget",
            Self::AssetRiskBudget { .. } => "asset_risk_budget",
            Self::ExpectedShortfall => "expected_shortfall",
            Self::Cardinality { .. } => "cardinality",
            Self::Threshold { .. } => "threshold",
            Self::TaxArbitrage { .. } => "tax_arbitrage",
            Self::TaxLimit => "tax_limit",
            Self::TransactionCost => "transaction_cost",
            Self::Concentration { .. } => "concentration",
            Self::IssuerHolding { .. } => "issuer_holding",
        }
    }

    /// Deterministic id used when the caller does not set one.
    pub fn default_id(&self) -> String {
        let scoped = |base: String, scope: &Option<GroupScope>| match scope {
            Some(s) => format!("{base}/{s}"),
            None => base,
        };
        match self {
            Self::AssetRange { asset } => format!("asset/{asset}"),
            Self::NonCashRange => "asset/non-cash".to_string(),
            Self::AssetTradeSize { asset } => format!("trade-size/{asset}"),
            Self::FactorRange { risk_model, factor } => format!("factor/{risk_model}/{factor}"),
            Self::Beta {
                risk_model,
                benchmark,
            } => format!("beta/{risk_model}/{benchmark}"),
            Self::Group { scope, .. } => format!("group/{scope}"),
            Self::Linear { name, .. } => format!("linear/{name}"),
            Self::Ratio { name, .. } => format!("ratio/{name}"),
            Self::GroupRatio { scope, .. } => format!("group-ratio/{scope}"),
            Self::PiecewiseLinear { asset, .. } => format!("piecewise/{asset}"),
            Self::Quadratic { name, .. } => format!("quadratic/{name}"),
            Self::Turnover {
                side,
                scope,
                cross_period,
            } => {
                let base = if *cross_period {
                    format!("cross-period/turnover/{}", side.as_str())
                } else {
                    format!("turnover/{}", side.as_str())
                };
                scoped(base, scope)
            }
            Self::Leverage { side, scope } => scoped(format!("leverage/{}", side.as_str()), scope),
            Self::RiskBudget {
                risk_model,
                component,
                benchmark,
            } => {
                let c = match component {
                    RiskComponent::Total => "total",
                    RiskComponent::Factor => "factor",
                    RiskComponent::Specific => "specific",
                };
                match benchmark {
                    Some(b) => format!("risk/{risk_model}/{c}/{b}"),
                    None => format!("risk/{risk_model}/{c}"),
                }
            }
            Self::AssetRiskBudget {
                risk_model,
                assets,
                benchmark,
                additive,
            } => {
                let names: Vec<&str> = assets.iter().map(|a| a.as_str()).collect();
                let def = if *additive { "additive" } else { "standalone" };
                let base = format!("risk/{risk_model}/assets/{}/{def}", names.join("+"));
                match benchmark {
                    Some(b) => format!("{base}/{b}"),
                    None => base,
                }
            }
            Self::ExpectedShortfall => "expected-shortfall".to_string(),
            Self::Cardinality { target, scope } => {
                let t = match target {
                    CountTarget::Assets => "assets",
                    CountTarget::Trades => "trades",
                };
                scoped(format!("paring/{t}"), scope)
            }
            Self::Threshold { kind, scope } => scoped(format!("threshold/{}", kind.slug()), scope),
            Self::TaxArbitrage {
                category,
                gain_type,
                scope,
            } => {
                let c = match category {
                    Some(TaxCategory::LongTerm) => "long-term",
                    Some(TaxCategory::ShortTerm) => "short-term",
                    None => "total",
                };
                let g = match gain_type {
                    GainType::CapitalGain => "gain",
                    GainType::CapitalLoss => "loss",
                    GainType::CapitalNet => "net",
                };
                scoped(format!("tax-arbitrage/{c}/{g}"), scope)
            }
            Self::TaxLimit => "tax-limit".to_string(),
            Self::TransactionCost => "transaction-cost".to_string(),
            Self::Concentration { top_n, .. } => format!("concentration/top-{top_n}"),
            Self::IssuerHolding { issuer } => match issuer {
                Some(i) => format!("issuer/{i}"),
                None => "issuer/all".to_string(),
            },
        }
    }

    pub fn category(&self) -> ConstraintCategory {
        match self {
            Self::FactorRange { .. } | Self::Beta { .. } => ConstraintCategory::Factor,
            Self::Turnover { .. } => ConstraintCategory::Turnover,
            Self::TransactionCost => ConstraintCategory::TransactionCost,
            Self::Leverage { .. } => ConstraintCategory::Hedge,
            Self::RiskBudget { .. } | Self::AssetRiskBudget { .. } | Self::ExpectedShortfall => {
                ConstraintCategory::Risk
            }
            Self::Cardinality { .. } => ConstraintCategory::AssetParing,
            Self::Threshold { kind, .. } if kind.is_holding() => {
                ConstraintCategory::HoldingLevelParing
            }
            Self::Threshold { .. } => ConstraintCategory::TransactionLevelParing,
            _ => ConstraintCategory::Linear,
        }
    }

    /// Count-valued families take whole-number bounds.
    pub fn requires_integral_bounds(&self) -> bool {
        matches!(self, Self::Cardinality { .. })
    }

    pub fn referenced_assets(&self) -> Vec<&str> {
        match self {
            Self::AssetRange { asset }
            | Self::AssetTradeSize { asset }
            | Self::PiecewiseLinear { asset, .. } => vec![asset.as_str()],
            Self::Group {
                coefficients: Some(c),
                ..
            }
            | Self::Linear {
                coefficients: c, ..
            }
            | Self::GroupRatio {
                coefficients: c, ..
            } => c.keys().collect(),
            Self::Ratio {
                numerator,
                denominator,
                ..
            } => {
                let mut v: Vec<&str> = numerator.keys().collect();
                if let Some(d) = denominator {
                    v.extend(d.keys());
                }
                v
            }
            Self::Quadratic { assets, .. } => assets.iter().map(|a| a.as_str()).collect(),
            Self::Concentration { excluded, .. } => excluded.iter().map(|a| a.as_str()).collect(),
            Self::AssetRiskBudget { assets, .. } => assets.iter().map(|a| a.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn referenced_portfolios(&self) -> Vec<&PortfolioId> {
        match self {
            Self::Beta { benchmark, .. } => vec![benchmark],
            Self::Quadratic {
                benchmark: Some(b), ..
            }
            | Self::RiskBudget {
                benchmark: Some(b), ..
            }
            | Self::AssetRiskBudget {
                benchmark: Some(b), ..
            } => vec![b],
            _ => Vec::new(),
        }
    }

    /// `(risk model, optional factor)` pairs the family reads.
    pub fn referenced_risk(&self) -> Vec<(&RiskModelId, Option<&FactorId>)> {
        match self {
            Self::FactorRange { risk_model, factor } => vec![(risk_model, Some(factor))],
            Self::Beta { risk_model, .. }
            | Self::RiskBudget { risk_model, .. }
            | Self::AssetRiskBudget { risk_model, .. } => vec![(risk_model, None)],
            _ => Vec::new(),
        }
    }
}

// ─── ConstraintInfo ───────────────────────────────────────────────────────────

/// Uniform contract: id, family, bounds, relative modes, reference, softness.
///
/// Missing bounds mean −∞ / +∞. Relative modes apply to lower and upper
/// independently; any non-absolute mode requires `reference`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub lower: Option<Bound>,
    #[serde(default)]
    pub upper: Option<Bound>,
    #[serde(default)]
    pub reference: Option<PortfolioId>,
    #[serde(default)]
    pub soft: bool,
    #[serde(default)]
    pub penalty: Option<Penalty>,
}

impl ConstraintInfo {
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            id: ConstraintId::new(kind.default_id()),
            kind,
            lower: None,
            upper: None,
            reference: None,
            soft: false,
            penalty: None,
        }
    }

    pub fn with_id<S: Into<ConstraintId>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_lower(mut self, value: f64) -> Self {
        self.lower = Some(Bound::absolute(value));
        self
    }

    pub fn with_upper(mut self, value: f64) -> Self {
        self.upper = Some(Bound::absolute(value));
        self
    }

    pub fn with_bounds(self, lower: f64, upper: f64) -> Self {
        self.with_lower(lower).with_upper(upper)
    }

    pub fn with_lower_mode(mut self, value: f64, mode: RelativeMode) -> Self {
        self.lower = Some(Bound { value, mode });
        self
    }

    pub fn with_upper_mode(mut self, value: f64, mode: RelativeMode) -> Self {
        self.upper = Some(Bound { value, mode });
        self
    }

    pub fn with_reference<P: Into<PortfolioId>>(mut self, portfolio: P) -> Self {
        self.reference = Some(portfolio.into());
        self
    }

    pub fn soft(mut self) -> Self {
        self.soft = true;
        self
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = Some(penalty);
        self
    }

    /// Appends a piece below the starting point. No-op on other families.
    pub fn with_downside_slope(mut self, slope: f64, breakpoint: Option<f64>) -> Self {
        if let ConstraintKind::PiecewiseLinear { downside, .. } = &mut self.kind {
            downside.push(SlopeSegment::new(slope, breakpoint));
        }
        self
    }

    /// Appends a piece above the starting point. No-op on other families.
    pub fn with_upside_slope(mut self, slope: f64, breakpoint: Option<f64>) -> Self {
        if let ConstraintKind::PiecewiseLinear { upside, .. } = &mut self.kind {
            upside.push(SlopeSegment::new(slope, breakpoint));
        }
        self
    }

    pub fn category(&self) -> ConstraintCategory {
        self.kind.category()
    }

    pub fn is_relative(&self) -> bool {
        [self.lower, self.upper]
            .iter()
            .flatten()
            .any(|b| b.mode != RelativeMode::Absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ids_are_deterministic() {
        let a = ConstraintInfo::new(ConstraintKind::AssetRange {
            asset: AssetId::new("USA11I1"),
        });
        assert_eq!(a.id.as_str(), "asset/USA11I1");

        let t = ConstraintInfo::new(ConstraintKind::Turnover {
            side: Side::Short,
            scope: Some(GroupScope::new("GICS_SECTOR", "Energy")),
            cross_period: false,
        });
        assert_eq!(t.id.as_str(), "turnover/short/GICS_SECTOR/Energy");
    }

    #[test]
    fn with_id_overrides_default() {
        let c = ConstraintInfo::new(ConstraintKind::TaxLimit).with_id("my-tax-cap");
        assert_eq!(c.id.as_str(), "my-tax-cap");
    }

    #[test]
    fn paring_kinds_map_to_their_categories() {
        let hold = ConstraintKind::Threshold {
            kind: ThresholdKind::MinHoldingLong,
            scope: None,
        };
        let tx = ConstraintKind::Threshold {
            kind: ThresholdKind::MinTransactionShort,
            scope: None,
        };
        assert_eq!(hold.category(), ConstraintCategory::HoldingLevelParing);
        assert_eq!(tx.category(), ConstraintCategory::TransactionLevelParing);
    }

    #[test]
    fn penalty_ordering_is_checked() {
        assert!(Penalty::new(0.0, -0.1, 0.1).validate().is_ok());
        assert!(Penalty::new(0.2, -0.1, 0.1).validate().is_err());
        assert!(Penalty::new(0.0, -0.1, 0.1)
            .with_multiplier(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn kind_roundtrips_through_json() {
        let k = ConstraintKind::Group {
            scope: GroupScope::new("SECTOR", "Tech"),
            coefficients: None,
        };
        let s = serde_json::to_string(&k).unwrap();
        assert!(s.contains("\"family\":\"group\""), "{s}");
        let back: ConstraintKind = serde_json::from_str(&s).unwrap();
        assert_eq!(back, k);
    }

    #[test]
    fn piecewise_breakpoints_must_move_away_from_start() {
        let down = [SlopeSegment::new(-0.01, Some(0.05)), SlopeSegment::new(-0.03, None)];
        let up = [SlopeSegment::new(0.02, Some(0.04)), SlopeSegment::new(0.03, None)];
        assert!(validate_piecewise(0.03, &down, &up).is_ok());

        // 0.06 is not below the 0.05 start
        assert!(validate_piecewise(0.05, &[SlopeSegment::new(-0.01, Some(0.06))], &[]).is_err());
        assert!(validate_piecewise(0.05, &[], &[SlopeSegment::new(0.01, Some(0.05))]).is_err());
        let open_inner = [SlopeSegment::new(0.02, None), SlopeSegment::new(0.03, Some(0.2))];
        assert!(validate_piecewise(0.0, &[], &open_inner).is_err());
        assert!(validate_piecewise(f64::NAN, &[], &[]).is_err());
    }

    #[test]
    fn asset_risk_budget_id_lists_assets_in_order() {
        let k = ConstraintKind::AssetRiskBudget {
            risk_model: RiskModelId::new("GEM"),
            assets: [AssetId::new("USA13Y1"), AssetId::new("USA11I1")].into_iter().collect(),
            benchmark: None,
            additive: true,
        };
        assert_eq!(k.default_id(), "risk/GEM/assets/USA11I1+USA13Y1/additive");
        assert_eq!(k.category(), ConstraintCategory::Risk);
    }

    #[test]
    fn relative_detection() {
        let c = ConstraintInfo::new(ConstraintKind::NonCashRange).with_bounds(0.0, 0.1);
        assert!(!c.is_relative());
        let c = c.with_upper_mode(1.5, RelativeMode::Multiple);
        assert!(c.is_relative());
    }
}
