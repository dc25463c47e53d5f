//! Ex-post constraint checking.
//!
//! The solver enforces constraints while it optimizes; this module verifies a
//! finished portfolio after the fact and produces violation reports, used to
//! audit solver output and in tests. All functions are pure.
//!
//! Tax cells and transaction cost have no portfolio-only value and are left
//! to the tax report.

use std::collections::BTreeMap;

use rebal_model::{AssetId, Portfolio, WEIGHT_EPS};

use crate::catalog::{ConstraintCatalog, FiveTenForty};
use crate::eval::{EvalContext, EvalError};
use crate::info::{ConstraintInfo, ConstraintKind, ThresholdKind};
use crate::resolve::{resolve_bounds, BoundError, ResolvedBounds};

/// Tolerance used when comparing a functional to its bounds.
pub const CHECK_TOLERANCE: f64 = 1e-9;

// ─── ConstraintViolation ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintViolation {
    /// Functional value outside its resolved bounds. `subject` names the asset
    /// or issuer for blanket families.
    BoundBreached {
        id: String,
        subject: Option<String>,
        value: f64,
        lower: Option<f64>,
        upper: Option<f64>,
        soft: bool,
    },
    /// Non-zero holding or trade smaller than its minimum.
    ThresholdBreached {
        id: String,
        asset: AssetId,
        magnitude: f64,
        threshold: f64,
    },
    /// One issuer above the single-issuer cap.
    IssuerAboveCap {
        issuer: String,
        weight: f64,
        limit: f64,
    },
    /// Issuers above the threshold together above the aggregate cap.
    IssuerAggregateExceeded { total: f64, limit: f64 },
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = |b: &Option<f64>, inf: &str| match b {
            Some(v) => format!("{v:.6}"),
            None => inf.to_string(),
        };
        match self {
            Self::BoundBreached {
                id,
                subject,
                value,
                lower,
                upper,
                soft,
            } => {
                let kind = if *soft { "soft constraint" } else { "constraint" };
                match subject {
                    Some(s) => write!(f, "{kind} '{id}' on '{s}': ")?,
                    None => write!(f, "{kind} '{id}': ")?,
                }
                write!(
                    f,
                    "value {value:.6} outside [{}, {}]",
                    side(lower, "-inf"),
                    side(upper, "+inf")
                )
            }
            Self::ThresholdBreached {
                id,
                asset,
                magnitude,
                threshold,
            } => write!(
                f,
                "constraint '{id}': '{asset}' magnitude {magnitude:.6} below minimum {threshold:.6}"
            ),
            Self::IssuerAboveCap {
                issuer,
                weight,
                limit,
            } => write!(f, "issuer '{issuer}' weight {weight:.4} exceeds cap {limit:.4}"),
            Self::IssuerAggregateExceeded { total, limit } => write!(
                f,
                "issuers above threshold total {total:.4}, exceeds aggregate cap {limit:.4}"
            ),
        }
    }
}

/// Why a constraint could not be checked at all.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckError {
    Bounds(BoundError),
    Evaluation { id: String, source: EvalError },
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounds(e) => write!(f, "{e}"),
            Self::Evaluation { id, source } => write!(f, "constraint '{id}': {source}"),
        }
    }
}

impl std::error::Error for CheckError {}

impl From<BoundError> for CheckError {
    fn from(e: BoundError) -> Self {
        Self::Bounds(e)
    }
}

// ─── Per-constraint ───────────────────────────────────────────────────────────

fn breach(
    info: &ConstraintInfo,
    subject: Option<&str>,
    value: f64,
    bounds: &ResolvedBounds,
) -> Option<ConstraintViolation> {
    if bounds.contains(value, CHECK_TOLERANCE) {
        return None;
    }
    Some(ConstraintViolation::BoundBreached {
        id: info.id.to_string(),
        subject: subject.map(str::to_string),
        value,
        lower: bounds.lower,
        upper: bounds.upper,
        soft: info.soft,
    })
}

/// Check one constraint against `target` using already-resolved bounds.
///
/// `initial` is required for trade functionals and transaction thresholds.
pub fn check_constraint(
    info: &ConstraintInfo,
    bounds: &ResolvedBounds,
    ctx: &EvalContext<'_>,
    target: &Portfolio,
    initial: Option<&Portfolio>,
    grandfather: bool,
) -> Result<Vec<ConstraintViolation>, CheckError> {
    let mut out = Vec::new();
    match &info.kind {
        ConstraintKind::NonCashRange => {
            for asset in ctx.universe().assets() {
                if asset.is_cash() {
                    continue;
                }
                let w = target.weight(asset.id.as_str());
                out.extend(breach(info, Some(asset.id.as_str()), w, bounds));
            }
        }
        ConstraintKind::IssuerHolding { issuer: None } => {
            for (issuer, w) in ctx.issuer_weights(target) {
                out.extend(breach(info, Some(&issuer), w, bounds));
            }
        }
        ConstraintKind::Threshold { .. } => {
            out.extend(check_thresholds(info, bounds, ctx, target, initial, grandfather)?);
        }
        ConstraintKind::TaxArbitrage { .. }
        | ConstraintKind::TaxLimit
        | ConstraintKind::TransactionCost => {}
        kind => {
            let value = ctx
                .evaluate(kind, target, initial)
                .map_err(|source| CheckError::Evaluation {
                    id: info.id.to_string(),
                    source,
                })?;
            out.extend(breach(info, None, value, bounds));
        }
    }
    Ok(out)
}

/// Minimum holding / transaction check.
///
/// The threshold is the resolved lower bound. A holding or trade on the
/// constrained side must be zero or at least the threshold. With the
/// grandfather rule, holdings already present on the same side of the initial
/// portfolio are exempt from the holding minimum.
pub fn check_thresholds(
    info: &ConstraintInfo,
    bounds: &ResolvedBounds,
    ctx: &EvalContext<'_>,
    target: &Portfolio,
    initial: Option<&Portfolio>,
    grandfather: bool,
) -> Result<Vec<ConstraintViolation>, CheckError> {
    let (kind, scope) = match &info.kind {
        ConstraintKind::Threshold { kind, scope } => (*kind, scope.as_ref()),
        _ => return Ok(Vec::new()),
    };
    let Some(threshold) = bounds.lower else {
        return Ok(Vec::new());
    };

    let magnitudes: BTreeMap<AssetId, f64> = if kind.is_holding() {
        target
            .holdings()
            .iter()
            .filter(|(a, _)| !ctx.universe().is_cash(a.as_str()))
            .filter(|(a, _)| ctx.in_scope(a.as_str(), scope))
            .map(|(a, w)| (a.clone(), *w))
            .collect()
    } else {
        let init = initial.ok_or_else(|| CheckError::Evaluation {
            id: info.id.to_string(),
            source: EvalError::NeedsInitialPortfolio {
                family: info.kind.family(),
            },
        })?;
        ctx.trades(init, target, scope)
    };

    let mut out = Vec::new();
    for (asset, x) in magnitudes {
        let on_side = match kind {
            ThresholdKind::MinHoldingLong | ThresholdKind::MinTransactionLong => x > WEIGHT_EPS,
            ThresholdKind::MinHoldingShort | ThresholdKind::MinTransactionShort => x < -WEIGHT_EPS,
        };
        if !on_side || x.abs() + CHECK_TOLERANCE >= threshold {
            continue;
        }
        if grandfather && kind.is_holding() {
            let before = initial.map(|p| p.weight(asset.as_str())).unwrap_or(0.0);
            if before * x > 0.0 {
                continue;
            }
        }
        out.push(ConstraintViolation::ThresholdBreached {
            id: info.id.to_string(),
            asset,
            magnitude: x.abs(),
            threshold,
        });
    }
    Ok(out)
}

/// Issuer diversification check; one violation per issuer above the cap,
/// plus one if the aggregate of large issuers is too high.
pub fn check_five_ten_forty(
    rule: &FiveTenForty,
    ctx: &EvalContext<'_>,
    target: &Portfolio,
) -> Vec<ConstraintViolation> {
    let mut out = Vec::new();
    let mut large = 0.0;
    for (issuer, w) in ctx.issuer_weights(target) {
        if w > rule.max_single + CHECK_TOLERANCE {
            out.push(ConstraintViolation::IssuerAboveCap {
                issuer: issuer.clone(),
                weight: w,
                limit: rule.max_single,
            });
        }
        if w > rule.threshold + CHECK_TOLERANCE {
            large += w;
        }
    }
    if large > rule.max_aggregate + CHECK_TOLERANCE {
        out.push(ConstraintViolation::IssuerAggregateExceeded {
            total: large,
            limit: rule.max_aggregate,
        });
    }
    out
}

/// Resolve and check every constraint of `catalog`, plus the catalog's
/// issuer rule. Stops at the first constraint that cannot be checked.
pub fn check_all(
    catalog: &ConstraintCatalog,
    ctx: &EvalContext<'_>,
    target: &Portfolio,
    initial: Option<&Portfolio>,
) -> Result<Vec<ConstraintViolation>, CheckError> {
    let mut out = Vec::new();
    for info in catalog.constraints() {
        let bounds = resolve_bounds(info, ctx)?;
        out.extend(check_constraint(
            info,
            &bounds,
            ctx,
            target,
            initial,
            catalog.grandfather_rule,
        )?);
    }
    if let Some(rule) = &catalog.five_ten_forty {
        out.extend(check_five_ten_forty(rule, ctx, target));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{
        all_issuers_holding, asset_range, non_cash_range, num_assets, threshold, turnover,
    };
    use crate::info::Side;
    use rebal_model::{Asset, AssetUniverse, PortfolioLedger};

    fn universe() -> AssetUniverse {
        let mut u = AssetUniverse::new();
        for (id, issuer) in [("A", "I1"), ("B", "I1"), ("C", "I2"), ("D", "I3")] {
            u.add_asset(Asset::regular(id).with_issuer(issuer)).unwrap();
        }
        u.add_asset(Asset::cash("CASH")).unwrap();
        u
    }

    fn pf(items: &[(&str, f64)]) -> Portfolio {
        Portfolio::from_weights("P", items.iter().map(|(a, w)| (*a, *w)))
    }

    fn run(
        catalog: &ConstraintCatalog,
        target: &Portfolio,
        initial: Option<&Portfolio>,
    ) -> Vec<ConstraintViolation> {
        let u = universe();
        let l = PortfolioLedger::new();
        check_all(catalog, &EvalContext::new(&u, &l), target, initial).unwrap()
    }

    #[test]
    fn clean_portfolio_has_no_violations() {
        let cat = ConstraintCatalog::new()
            .with(asset_range("A").with_bounds(0.0, 0.5))
            .with(num_assets().with_upper(4.0));
        let v = run(&cat, &pf(&[("A", 0.4), ("C", 0.6)]), None);
        assert!(v.is_empty(), "{v:?}");
    }

    #[test]
    fn asset_bound_breach_is_reported() {
        let cat = ConstraintCatalog::new().with(asset_range("A").with_upper(0.1));
        let v = run(&cat, &pf(&[("A", 0.4)]), None);
        assert_eq!(v.len(), 1);
        assert!(matches!(&v[0], ConstraintViolation::BoundBreached { id, .. } if id == "asset/A"));
    }

    #[test]
    fn blanket_range_checks_every_non_cash_asset() {
        let cat = ConstraintCatalog::new().with(non_cash_range().with_bounds(0.0, 0.3));
        let v = run(&cat, &pf(&[("A", 0.4), ("B", 0.35), ("C", 0.1), ("CASH", 0.15)]), None);
        let subjects: Vec<_> = v
            .iter()
            .filter_map(|x| match x {
                ConstraintViolation::BoundBreached { subject, .. } => subject.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(subjects, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn turnover_breach_uses_initial() {
        let cat = ConstraintCatalog::new().with(turnover(Side::Total).with_upper(0.2));
        let init = pf(&[("A", 0.5), ("C", 0.5)]);
        let v = run(&cat, &pf(&[("A", 0.2), ("C", 0.8)]), Some(&init));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn min_holding_flags_small_positions() {
        let cat = ConstraintCatalog::new()
            .with(threshold(ThresholdKind::MinHoldingLong, None).with_lower(0.05));
        let v = run(&cat, &pf(&[("A", 0.02), ("B", 0.5), ("C", -0.01)]), None);
        assert_eq!(v.len(), 1);
        assert!(matches!(
            &v[0],
            ConstraintViolation::ThresholdBreached { asset, .. } if asset.as_str() == "A"
        ));
    }

    #[test]
    fn grandfather_rule_exempts_existing_holdings() {
        let base = ConstraintCatalog::new()
            .with(threshold(ThresholdKind::MinHoldingLong, None).with_lower(0.05));
        let init = pf(&[("A", 0.03)]);
        let target = pf(&[("A", 0.02), ("B", 0.01)]);

        let strict = run(&base, &target, Some(&init));
        assert_eq!(strict.len(), 2);

        let lenient = run(&base.with_grandfather_rule(), &target, Some(&init));
        assert_eq!(lenient.len(), 1);
        assert!(matches!(
            &lenient[0],
            ConstraintViolation::ThresholdBreached { asset, .. } if asset.as_str() == "B"
        ));
    }

    #[test]
    fn min_transaction_checks_trades() {
        let cat = ConstraintCatalog::new()
            .with(threshold(ThresholdKind::MinTransactionShort, None).with_lower(0.05));
        let init = pf(&[("A", 0.5), ("C", 0.5)]);
        // A sells 0.01 (too small), C sells 0.2 (fine)
        let v = run(&cat, &pf(&[("A", 0.49), ("C", 0.3)]), Some(&init));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn five_ten_forty_reports_per_issuer() {
        let cat = ConstraintCatalog::new().with_five_ten_forty(FiveTenForty::default());
        // I1 = 0.25, I2 = 0.2, I3 = 0.09: two above cap, aggregate 0.54
        let v = run(&cat, &pf(&[("A", 0.15), ("B", 0.1), ("C", 0.2), ("D", 0.09)]), None);
        let caps = v
            .iter()
            .filter(|x| matches!(x, ConstraintViolation::IssuerAboveCap { .. }))
            .count();
        assert_eq!(caps, 2);
        assert!(v
            .iter()
            .any(|x| matches!(x, ConstraintViolation::IssuerAggregateExceeded { .. })));
    }

    #[test]
    fn blanket_issuer_bound_is_per_issuer() {
        let cat = ConstraintCatalog::new().with(all_issuers_holding().with_upper(0.2));
        let v = run(&cat, &pf(&[("A", 0.15), ("B", 0.1), ("C", 0.2)]), None);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn soft_flag_is_carried_into_the_report() {
        let cat = ConstraintCatalog::new().with(asset_range("A").with_upper(0.1).soft());
        let v = run(&cat, &pf(&[("A", 0.4)]), None);
        assert!(matches!(&v[0], ConstraintViolation::BoundBreached { soft: true, .. }));
        assert!(v[0].to_string().starts_with("soft constraint"));
    }
}
