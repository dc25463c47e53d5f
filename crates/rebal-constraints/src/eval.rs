//! Functional evaluation of constraint families on portfolios.
//!
//! Holding functionals need one portfolio; trade functionals also need the
//! initial portfolio. Families with no scalar functional (blanket ranges,
//! thresholds, tax cells, transaction cost) are rejected here and checked
//! elsewhere.

use std::collections::{BTreeMap, BTreeSet};

use rebal_model::{AssetId, AssetUniverse, Portfolio, PortfolioLedger, RiskModel, WEIGHT_EPS};

use crate::info::{ConstraintKind, CountTarget, GroupScope, RiskComponent, Side, SlopeSegment};
use crate::shortfall::ScenarioSet;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The family has no scalar value on a portfolio.
    NotPortfolioFunctional { family: &'static str },
    /// The family is a trade functional; an initial portfolio is required.
    NeedsInitialPortfolio { family: &'static str },
    UnknownRiskModel { risk_model: String },
    UnknownPortfolio { portfolio: String },
    ZeroDenominator,
    DimensionMismatch { expected: usize, got: usize },
    /// Expected shortfall needs return scenarios.
    MissingScenarios,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPortfolioFunctional { family } => {
                write!(f, "'{family}' has no single-portfolio value")
            }
            Self::NeedsInitialPortfolio { family } => {
                write!(f, "'{family}' is a trade functional and needs an initial portfolio")
            }
            Self::UnknownRiskModel { risk_model } => {
                write!(f, "risk model '{risk_model}' is not bound")
            }
            Self::UnknownPortfolio { portfolio } => {
                write!(f, "portfolio '{portfolio}' is not in the ledger")
            }
            Self::ZeroDenominator => write!(f, "ratio denominator is zero"),
            Self::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected {expected}, got {got}")
            }
            Self::MissingScenarios => write!(f, "expected shortfall needs return scenarios"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Read-only view of the universe and ledger used to evaluate functionals,
/// plus the return scenarios of the profile being evaluated.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    universe: &'a AssetUniverse,
    ledger: &'a PortfolioLedger,
    scenarios: Option<&'a ScenarioSet>,
}

impl<'a> EvalContext<'a> {
    pub fn new(universe: &'a AssetUniverse, ledger: &'a PortfolioLedger) -> Self {
        Self {
            universe,
            ledger,
            scenarios: None,
        }
    }

    pub fn with_scenarios(mut self, scenarios: &'a ScenarioSet) -> Self {
        self.scenarios = Some(scenarios);
        self
    }

    pub fn scenarios(&self) -> Option<&'a ScenarioSet> {
        self.scenarios
    }

    pub fn universe(&self) -> &'a AssetUniverse {
        self.universe
    }

    pub fn ledger(&self) -> &'a PortfolioLedger {
        self.ledger
    }

    pub fn portfolio(&self, id: &str) -> Result<&'a Portfolio, EvalError> {
        self.ledger
            .portfolio(id)
            .ok_or_else(|| EvalError::UnknownPortfolio {
                portfolio: id.to_string(),
            })
    }

    fn risk_model(&self, id: &str) -> Result<&'a RiskModel, EvalError> {
        self.universe
            .risk_model(id)
            .ok_or_else(|| EvalError::UnknownRiskModel {
                risk_model: id.to_string(),
            })
    }

    pub fn in_scope(&self, asset: &str, scope: Option<&GroupScope>) -> bool {
        match scope {
            None => true,
            Some(s) => self.universe.group_value(asset, &s.group) == Some(s.value.as_str()),
        }
    }

    fn non_cash(&self, asset: &str) -> bool {
        !self.universe.is_cash(asset)
    }

    /// Evaluate the family's functional on `portfolio`.
    ///
    /// `initial` is only consulted by trade functionals.
    pub fn evaluate(
        &self,
        kind: &ConstraintKind,
        portfolio: &Portfolio,
        initial: Option<&Portfolio>,
    ) -> Result<f64, EvalError> {
        let w = portfolio.holdings();
        match kind {
            ConstraintKind::AssetRange { asset } => Ok(portfolio.weight(asset.as_str())),

            ConstraintKind::AssetTradeSize { asset } => {
                let init = initial.ok_or(EvalError::NeedsInitialPortfolio {
                    family: kind.family(),
                })?;
                Ok((portfolio.weight(asset.as_str()) - init.weight(asset.as_str())).abs())
            }

            ConstraintKind::FactorRange { risk_model, factor } => {
                let rm = self.risk_model(risk_model.as_str())?;
                Ok(rm.portfolio_exposure(w, factor.as_str()))
            }

            ConstraintKind::Beta {
                risk_model,
                benchmark,
            } => {
                let rm = self.risk_model(risk_model.as_str())?;
                let bench = self.portfolio(benchmark.as_str())?.holdings();
                Ok(w.iter().map(|(a, wa)| wa * rm.beta(a, bench)).sum())
            }

            ConstraintKind::Group {
                scope,
                coefficients,
            } => Ok(w
                .iter()
                .filter(|(a, _)| self.in_scope(a.as_str(), Some(scope)))
                .map(|(a, wa)| {
                    let c = match coefficients {
                        Some(m) => m.get(a.as_str()).unwrap_or(0.0),
                        None => 1.0,
                    };
                    c * wa
                })
                .sum()),

            ConstraintKind::Linear { coefficients, .. } => Ok(coefficients
                .iter()
                .map(|(a, c)| c * portfolio.weight(a))
                .sum()),

            ConstraintKind::Ratio {
                numerator,
                denominator,
                ..
            } => {
                let num: f64 = numerator.iter().map(|(a, c)| c * portfolio.weight(a)).sum();
                let den: f64 = match denominator {
                    Some(d) => d.iter().map(|(a, c)| c * portfolio.weight(a)).sum(),
                    None => numerator.keys().map(|a| portfolio.weight(a)).sum(),
                };
                ratio(num, den)
            }

            ConstraintKind::GroupRatio {
                scope,
                coefficients,
            } => {
                let mut num = 0.0;
                let mut den = 0.0;
                for (a, wa) in w {
                    if self.in_scope(a.as_str(), Some(scope)) {
                        num += coefficients.get(a.as_str()).unwrap_or(0.0) * wa;
                        den += wa;
                    }
                }
                ratio(num, den)
            }

            ConstraintKind::PiecewiseLinear {
                asset,
                start,
                downside,
                upside,
            } => Ok(piecewise_value(portfolio.weight(asset.as_str()), *start, downside, upside)),

            ConstraintKind::Quadratic {
                assets,
                q,
                linear,
                benchmark,
                ..
            } => {
                if !linear.is_empty() && linear.len() != assets.len() {
                    return Err(EvalError::DimensionMismatch {
                        expected: assets.len(),
                        got: linear.len(),
                    });
                }
                let bench = match benchmark {
                    Some(b) => Some(self.portfolio(b.as_str())?),
                    None => None,
                };
                let x: Vec<f64> = assets
                    .iter()
                    .map(|a| {
                        portfolio.weight(a.as_str())
                            - bench.map(|b| b.weight(a.as_str())).unwrap_or(0.0)
                    })
                    .collect();
                let lin: f64 = linear.iter().zip(&x).map(|(c, xi)| c * xi).sum();
                let quad = q.quad_form(&x).ok_or(EvalError::DimensionMismatch {
                    expected: assets.len(),
                    got: q.dim(),
                })?;
                Ok(quad + lin)
            }

            ConstraintKind::Turnover { side, scope, .. } => {
                let init = initial.ok_or(EvalError::NeedsInitialPortfolio {
                    family: kind.family(),
                })?;
                let trades = self.trades(init, portfolio, scope.as_ref());
                Ok(match side {
                    Side::Long => trades.values().map(|d| d.max(0.0)).sum(),
                    Side::Short => trades.values().map(|d| (-d).max(0.0)).sum(),
                    Side::Total => trades.values().map(|d| d.abs()).sum(),
                    Side::Net => trades.values().sum::<f64>().abs(),
                })
            }

            ConstraintKind::Leverage { side, scope } => {
                let ws = w
                    .iter()
                    .filter(|(a, _)| self.non_cash(a.as_str()))
                    .filter(|(a, _)| self.in_scope(a.as_str(), scope.as_ref()))
                    .map(|(_, x)| *x);
                Ok(match side {
                    Side::Long => ws.map(|x| x.max(0.0)).sum(),
                    Side::Short => ws.map(|x| (-x).max(0.0)).sum(),
                    Side::Total => ws.map(f64::abs).sum(),
                    Side::Net => ws.sum(),
                })
            }

            ConstraintKind::RiskBudget {
                risk_model,
                component,
                benchmark,
            } => {
                let rm = self.risk_model(risk_model.as_str())?;
                let active = match benchmark {
                    Some(b) => active_weights(w, self.portfolio(b.as_str())?.holdings()),
                    None => w.clone(),
                };
                let d = rm.decompose(&active);
                Ok(match component {
                    RiskComponent::Total => d.total_risk(),
                    RiskComponent::Factor => d.factor_variance.max(0.0).sqrt(),
                    RiskComponent::Specific => d.specific_variance.max(0.0).sqrt(),
                })
            }

            ConstraintKind::AssetRiskBudget {
                risk_model,
                assets,
                benchmark,
                additive,
            } => {
                let rm = self.risk_model(risk_model.as_str())?;
                let active = match benchmark {
                    Some(b) => active_weights(w, self.portfolio(b.as_str())?.holdings()),
                    None => w.clone(),
                };
                if *additive {
                    let total = rm.decompose(&active).total_risk();
                    if total <= 0.0 {
                        return Ok(0.0);
                    }
                    let contribution: f64 = active
                        .iter()
                        .filter(|(a, _)| assets.contains(*a))
                        .map(|(a, x)| x * rm.asset_portfolio_covariance(a, &active))
                        .sum();
                    Ok(contribution / total)
                } else {
                    let sub: BTreeMap<AssetId, f64> = active
                        .into_iter()
                        .filter(|(a, _)| assets.contains(a))
                        .collect();
                    Ok(rm.decompose(&sub).total_risk())
                }
            }

            ConstraintKind::ExpectedShortfall => self
                .scenarios
                .and_then(|s| s.expected_shortfall(w))
                .ok_or(EvalError::MissingScenarios),

            ConstraintKind::Cardinality { target, scope } => match target {
                CountTarget::Assets => Ok(w
                    .iter()
                    .filter(|(a, x)| {
                        self.non_cash(a.as_str())
                            && self.in_scope(a.as_str(), scope.as_ref())
                            && x.abs() > WEIGHT_EPS
                    })
                    .count() as f64),
                CountTarget::Trades => {
                    let init = initial.ok_or(EvalError::NeedsInitialPortfolio {
                        family: kind.family(),
                    })?;
                    Ok(self
                        .trades(init, portfolio, scope.as_ref())
                        .values()
                        .filter(|d| d.abs() > WEIGHT_EPS)
                        .count() as f64)
                }
            },

            ConstraintKind::Concentration { top_n, excluded } => {
                Ok(self.top_n_sum(portfolio, *top_n, excluded))
            }

            ConstraintKind::IssuerHolding { issuer: Some(i) } => Ok(w
                .iter()
                .filter(|(a, _)| {
                    self.universe
                        .asset(a.as_str())
                        .and_then(|x| x.issuer.as_deref())
                        == Some(i.as_str())
                })
                .map(|(_, x)| x)
                .sum()),

            ConstraintKind::NonCashRange
            | ConstraintKind::Threshold { .. }
            | ConstraintKind::TaxArbitrage { .. }
            | ConstraintKind::TaxLimit
            | ConstraintKind::TransactionCost
            | ConstraintKind::IssuerHolding { issuer: None } => {
                Err(EvalError::NotPortfolioFunctional {
                    family: kind.family(),
                })
            }
        }
    }

    /// Target − initial per non-cash asset in scope (union of both books).
    pub fn trades(
        &self,
        initial: &Portfolio,
        target: &Portfolio,
        scope: Option<&GroupScope>,
    ) -> BTreeMap<AssetId, f64> {
        let mut out = BTreeMap::new();
        let names: BTreeSet<&AssetId> = initial
            .holdings()
            .keys()
            .chain(target.holdings().keys())
            .collect();
        for a in names {
            if !self.non_cash(a.as_str()) || !self.in_scope(a.as_str(), scope) {
                continue;
            }
            out.insert(
                a.clone(),
                target.weight(a.as_str()) - initial.weight(a.as_str()),
            );
        }
        out
    }

    /// Sum of the `n` largest weights. Excluded assets and cash never enter
    /// the ranking; ties rank by asset id.
    pub fn top_n_sum(&self, portfolio: &Portfolio, n: usize, excluded: &BTreeSet<AssetId>) -> f64 {
        let mut ws: Vec<(&AssetId, f64)> = portfolio
            .holdings()
            .iter()
            .filter(|(a, _)| !excluded.contains(*a) && self.non_cash(a.as_str()))
            .map(|(a, w)| (a, *w))
            .collect();
        ws.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(y.0)));
        ws.iter().take(n).map(|(_, w)| w).sum()
    }

    /// Σ weight per issuer over non-cash assets with an issuer id.
    pub fn issuer_weights(&self, portfolio: &Portfolio) -> BTreeMap<String, f64> {
        let mut out: BTreeMap<String, f64> = BTreeMap::new();
        for (a, w) in portfolio.holdings() {
            if let Some(i) = self.universe.asset(a.as_str()).and_then(|x| x.issuer.clone()) {
                *out.entry(i).or_insert(0.0) += w;
            }
        }
        out
    }
}

/// Value at `x` of the piecewise linear function that is zero at `start`.
pub fn piecewise_value(x: f64, start: f64, downside: &[SlopeSegment], upside: &[SlopeSegment]) -> f64 {
    let mut value = 0.0;
    if x >= start {
        let mut from = start;
        for (k, seg) in upside.iter().enumerate() {
            let last = k + 1 == upside.len();
            let to = match seg.breakpoint {
                Some(b) if !last => b.min(x),
                _ => x,
            };
            value += seg.slope * (to - from).max(0.0);
            if to >= x {
                break;
            }
            from = to;
        }
    } else {
        let mut from = start;
        for (k, seg) in downside.iter().enumerate() {
            let last = k + 1 == downside.len();
            let to = match seg.breakpoint {
                Some(b) if !last => b.max(x),
                _ => x,
            };
            // Moving down by (from - to) changes the value by -slope per unit.
            value -= seg.slope * (from - to).max(0.0);
            if to <= x {
                break;
            }
            from = to;
        }
    }
    value
}

fn ratio(num: f64, den: f64) -> Result<f64, EvalError> {
    if den.abs() <= WEIGHT_EPS {
        return Err(EvalError::ZeroDenominator);
    }
    Ok(num / den)
}

fn active_weights(
    w: &BTreeMap<AssetId, f64>,
    bench: &BTreeMap<AssetId, f64>,
) -> BTreeMap<AssetId, f64> {
    let mut out = w.clone();
    for (a, b) in bench {
        *out.entry(a.clone()).or_insert(0.0) -= b;
    }
    out
}
