//! Scripted solver backend.
//!
//! Does not optimize. Each unit is moved to a scripted target (or held), then
//! the response is built the way a real solver reports it: metrics per
//! optimal portfolio, slacks for every scalar constraint, INFEASIBLE when a
//! hard constraint is breached, and lot-level tax output for tax-aware units.
//!
//! Multi-period units chain: period k starts from the target of period k-1.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use rebal_assembly::{AssembledUnit, ResolvedCatalog, Topology};
use rebal_constraints::{
    check_constraint, families, ConstraintInfo, ConstraintKind, ConstraintViolation, EvalContext,
    ResolvedBounds, Side,
};
use rebal_gateway::codec::{decode_request, encode_response, SolveRequest};
use rebal_gateway::{BackendFailure, SolverBackend};
use rebal_model::{AssetId, Portfolio, PriceMap, RiskModel};
use rebal_schemas::{OptimalPortfolio, SlackInfo, SolveResponse, SolveStatus, StatusCode};
use rebal_tax::{LotBook, TaxReport, TradeoffPolicy, SHARE_EPS};

pub type Weights = BTreeMap<String, f64>;

pub fn weights(pairs: &[(&str, f64)]) -> Weights {
    pairs.iter().map(|(a, w)| (a.to_string(), *w)).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum UnitKey {
    Account(String),
    Period(u32),
}

#[derive(Clone, Debug)]
enum Script {
    Targets {
        default: Option<Weights>,
        per_unit: BTreeMap<UnitKey, Weights>,
    },
    Status { code: StatusCode, message: String },
    Failure(String),
}

pub struct ScriptedSolver {
    script: Script,
    tradeoff: TradeoffPolicy,
    gain_loss_group: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSolver {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            tradeoff: TradeoffPolicy::default(),
            gain_loss_group: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every unit keeps its initial weights.
    pub fn hold() -> Self {
        Self::with_script(Script::Targets {
            default: None,
            per_unit: BTreeMap::new(),
        })
    }

    /// Every unit moves to `target` unless a per-unit target says otherwise.
    pub fn targeting(target: Weights) -> Self {
        Self::with_script(Script::Targets {
            default: Some(target),
            per_unit: BTreeMap::new(),
        })
    }

    /// Reply with `code` and nothing else.
    pub fn replying<S: Into<String>>(code: StatusCode, message: S) -> Self {
        Self::with_script(Script::Status {
            code,
            message: message.into(),
        })
    }

    /// Fail at the transport level.
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::with_script(Script::Failure(message.into()))
    }

    pub fn with_account_target<S: Into<String>>(self, account: S, target: Weights) -> Self {
        self.with_unit_target(UnitKey::Account(account.into()), target)
    }

    pub fn with_period_target(self, period: u32, target: Weights) -> Self {
        self.with_unit_target(UnitKey::Period(period), target)
    }

    fn with_unit_target(mut self, key: UnitKey, target: Weights) -> Self {
        if let Script::Targets { per_unit, .. } = &mut self.script {
            per_unit.insert(key, target);
        }
        self
    }

    pub fn with_tradeoff_policy(mut self, policy: TradeoffPolicy) -> Self {
        self.tradeoff = policy;
        self
    }

    /// Adds per-value gain/loss rows for this group attribute.
    pub fn with_gain_loss_group<S: Into<String>>(mut self, group: S) -> Self {
        self.gain_loss_group = Some(group.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn target_for(&self, unit: &AssembledUnit, initial: &Portfolio) -> Weights {
        let Script::Targets { default, per_unit } = &self.script else {
            return Weights::new();
        };
        let key = match (&unit.account, unit.period) {
            (Some(a), _) => Some(UnitKey::Account(a.clone())),
            (None, Some(p)) => Some(UnitKey::Period(p)),
            (None, None) => None,
        };
        key.and_then(|k| per_unit.get(&k))
            .or(default.as_ref())
            .cloned()
            .unwrap_or_else(|| {
                initial
                    .holdings()
                    .iter()
                    .map(|(a, w)| (a.to_string(), *w))
                    .collect()
            })
    }

    fn respond(&self, request: &SolveRequest) -> Result<SolveResponse, String> {
        let body = &request.payload;
        let ctx = EvalContext::new(&body.universe, &body.ledger);
        let prices = body.universe.price_map();

        let mut run = Run::default();
        let mut previous: Option<Portfolio> = None;

        for unit in &body.units {
            let ctx = match &unit.expected_shortfall {
                Some(scenarios) => ctx.with_scenarios(scenarios),
                None => ctx,
            };
            let chained = unit.period.is_some() && !unit.is_tax_aware();
            let initial = match previous.take() {
                Some(p) if chained => p,
                _ => ctx.portfolio(unit.initial_portfolio.as_str()).map_err(|e| e.to_string())?.clone(),
            };
            let target = Portfolio::from_weights(format!("optimal/{}", unit.label()), self.target_for(unit, &initial));
            let prefix = slack_prefix(body.topology, unit);

            run.check_catalog(&ctx, &unit.constraints, &prefix, &unit.label(), &target, &initial)?;

            if unit.is_tax_aware() {
                let report = self.book_trades(unit, &ctx, &initial, &target, &prices)?;
                for v in report.check(&unit.constraints.catalog, &body.universe) {
                    run.breach(&unit.label(), &v);
                }
                if let Some(account) = &unit.account {
                    run.account_tax.insert(account.clone(), report.total_tax);
                }
                run.tax.push(report.to_output(
                    unit.account.as_deref(),
                    &body.universe,
                    self.gain_loss_group.as_deref(),
                ));
            }

            run.portfolios.push(metrics(&ctx, body.alpha.iter(), unit, &initial, &target));
            if unit.period.is_some() {
                run.period_pairs.push((initial, target.clone()));
            }
            previous = Some(target);
        }

        if body.topology == Topology::MultiPeriod {
            run.check_cross_period(&ctx, &body.cross_period)?;
        }
        for group in &body.account_groups {
            let joint: f64 = group
                .members
                .iter()
                .filter_map(|m| run.account_tax.get(m))
                .sum();
            run.check_joint_tax(&group.id, &group.constraints, joint);
        }

        debug!(
            request_id = %request.request_id,
            units = body.units.len(),
            breaches = run.breaches.len(),
            "scripted solve"
        );

        let status = if run.breaches.is_empty() {
            SolveStatus {
                code: StatusCode::Ok,
                message: "optimal".to_string(),
                log: run.log(),
            }
        } else {
            SolveStatus {
                code: StatusCode::Infeasible,
                message: format!("{} hard constraint(s) breached", run.breaches.len()),
                log: run.breaches.join("\n"),
            }
        };
        Ok(SolveResponse {
            request_id: request.request_id,
            status,
            portfolios: run.portfolios,
            slacks: run.slacks,
            tax: run.tax,
        })
    }

    /// Sells first, then buys, in asset-id order, at the unit's base value.
    fn book_trades(
        &self,
        unit: &AssembledUnit,
        ctx: &EvalContext<'_>,
        initial: &Portfolio,
        target: &Portfolio,
        prices: &PriceMap,
    ) -> Result<TaxReport, String> {
        let mut book = LotBook::from_portfolio(initial);
        let mut shares: Vec<(AssetId, f64, f64)> = Vec::new();
        for (asset, dw) in ctx.trades(initial, target, None) {
            let price = prices
                .get(asset.as_str())
                .map_err(|_| format!("no price for '{asset}'"))?;
            if price > 0.0 {
                shares.push((asset, dw * unit.base_value / price, price));
            }
        }

        let mut slices = Vec::new();
        let mut adjustments = Vec::new();
        let mut new_lots = Vec::new();

        for (asset, qty, price) in shares.iter().filter(|(_, q, _)| *q < -SHARE_EPS) {
            let rule = unit
                .tax_rules
                .get(asset)
                .ok_or_else(|| format!("sell of '{asset}' without a tax rule"))?;
            let order = unit.selling_orders.get(asset).copied().unwrap_or_default();
            let qty = (-qty).min(book.shares_of(asset.as_str()));
            if qty <= SHARE_EPS {
                continue;
            }
            let outcome = book
                .sell(asset, qty, *price, rule, order, 0.0)
                .map_err(|e| e.to_string())?
                .choose(self.tradeoff);
            book.commit(&outcome);
            slices.extend(outcome.slices);
            adjustments.extend(outcome.adjustments);
        }
        for (asset, qty, price) in shares.iter().filter(|(_, q, _)| *q > SHARE_EPS) {
            let window = unit.tax_rules.get(asset).and_then(|r| r.wash_sale.window_days());
            let bought = book.buy(asset, *qty, *price, window).map_err(|e| e.to_string())?;
            new_lots.extend(bought.lot_ids);
            adjustments.extend(bought.adjustments);
        }

        Ok(TaxReport::new(book, slices, adjustments, new_lots, &unit.tax_rules))
    }
}

impl SolverBackend for ScriptedSolver {
    fn solve(&self, request: &[u8]) -> Result<Vec<u8>, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let request = decode_request(request).map_err(|e| BackendFailure::new(e.to_string()))?;

        let response = match &self.script {
            Script::Failure(message) => return Err(BackendFailure::new(message.clone())),
            Script::Status { code, message } => status_only(request.request_id, *code, message.clone()),
            Script::Targets { .. } => self
                .respond(&request)
                .unwrap_or_else(|message| status_only(request.request_id, StatusCode::InternalError, message)),
        };
        encode_response(&response).map_err(|e| BackendFailure::new(e.to_string()))
    }
}

// ─── Response assembly ────────────────────────────────────────────────────────

#[derive(Default)]
struct Run {
    portfolios: Vec<OptimalPortfolio>,
    slacks: Vec<SlackInfo>,
    tax: Vec<rebal_schemas::TaxOutput>,
    breaches: Vec<String>,
    account_tax: BTreeMap<String, f64>,
    period_pairs: Vec<(Portfolio, Portfolio)>,
}

impl Run {
    fn breach(&mut self, scope: &str, v: &ConstraintViolation) {
        let hard = !matches!(v, ConstraintViolation::BoundBreached { soft: true, .. });
        if hard {
            self.breaches.push(format!("{scope}: {v}"));
        }
    }

    fn check_catalog(
        &mut self,
        ctx: &EvalContext<'_>,
        resolved: &ResolvedCatalog,
        prefix: &str,
        scope: &str,
        target: &Portfolio,
        initial: &Portfolio,
    ) -> Result<(), String> {
        for info in resolved.catalog.constraints() {
            let Some(bounds) = resolved.bounds.get(&info.id) else {
                continue;
            };
            if let Ok(value) = ctx.evaluate(&info.kind, target, Some(initial)) {
                self.slacks.push(slack(prefix, info, value, bounds));
            }
            let found = check_constraint(
                info,
                bounds,
                ctx,
                target,
                Some(initial),
                resolved.catalog.grandfather_rule,
            )
            .map_err(|e| e.to_string())?;
            for v in &found {
                self.breach(scope, v);
            }
        }
        Ok(())
    }

    /// Cross-period constraints read the sum of the per-period values.
    fn check_cross_period(&mut self, ctx: &EvalContext<'_>, resolved: &ResolvedCatalog) -> Result<(), String> {
        for info in resolved.catalog.constraints() {
            let Some(bounds) = resolved.bounds.get(&info.id) else {
                continue;
            };
            let mut value = 0.0;
            for (initial, target) in &self.period_pairs {
                value += ctx
                    .evaluate(&info.kind, target, Some(initial))
                    .map_err(|e| format!("cross-period '{}': {e}", info.id))?;
            }
            self.record(info, "", "cross-period", value, bounds);
        }
        Ok(())
    }

    fn check_joint_tax(&mut self, group: &str, resolved: &ResolvedCatalog, joint: f64) {
        for info in resolved.catalog.constraints() {
            if !matches!(info.kind, ConstraintKind::TaxLimit) {
                continue;
            }
            if let Some(bounds) = resolved.bounds.get(&info.id) {
                self.record(info, &format!("{group}/"), group, joint, bounds);
            }
        }
    }

    fn record(&mut self, info: &ConstraintInfo, prefix: &str, scope: &str, value: f64, bounds: &ResolvedBounds) {
        self.slacks.push(slack(prefix, info, value, bounds));
        if !bounds.contains(value, rebal_constraints::CHECK_TOLERANCE) {
            self.breach(
                scope,
                &ConstraintViolation::BoundBreached {
                    id: info.id.to_string(),
                    subject: None,
                    value,
                    lower: bounds.lower,
                    upper: bounds.upper,
                    soft: info.soft,
                },
            );
        }
    }

    fn log(&self) -> String {
        format!(
            "units={} slacks={} tax_outputs={}",
            self.portfolios.len(),
            self.slacks.len(),
            self.tax.len()
        )
    }
}

fn status_only(request_id: Uuid, code: StatusCode, message: String) -> SolveResponse {
    SolveResponse {
        request_id,
        status: SolveStatus {
            code,
            message,
            log: String::new(),
        },
        portfolios: Vec::new(),
        slacks: Vec::new(),
        tax: Vec::new(),
    }
}

/// Slack ids are plain constraint ids for single-account requests and
/// `<account>/<id>` or `period-<n>/<id>` otherwise.
fn slack_prefix(topology: Topology, unit: &AssembledUnit) -> String {
    match (topology, &unit.account, unit.period) {
        (Topology::Single, ..) => String::new(),
        (_, Some(a), _) => format!("{a}/"),
        (_, None, Some(p)) => format!("period-{p}/"),
        (_, None, None) => String::new(),
    }
}

/// Distance to the nearer bound; negative when breached.
fn slack(prefix: &str, info: &ConstraintInfo, value: f64, bounds: &ResolvedBounds) -> SlackInfo {
    let below = bounds.lower.map(|lo| value - lo);
    let above = bounds.upper.map(|hi| hi - value);
    let slack = match (below, above) {
        (Some(b), Some(a)) => b.min(a),
        (Some(s), None) | (None, Some(s)) => s,
        (None, None) => f64::INFINITY,
    };
    SlackInfo {
        constraint_id: format!("{prefix}{}", info.id),
        slack,
        lower_bound: bounds.lower,
        upper_bound: bounds.upper,
    }
}

fn metrics<'a>(
    ctx: &EvalContext<'_>,
    alpha: impl Iterator<Item = (&'a str, f64)>,
    unit: &AssembledUnit,
    initial: &Portfolio,
    target: &Portfolio,
) -> OptimalPortfolio {
    let w = target.holdings();
    let expected_return: f64 = alpha.map(|(a, x)| x * target.weight(a)).sum();
    let turnover = ctx
        .evaluate(&families::turnover(Side::Total).kind, target, Some(initial))
        .unwrap_or(0.0);

    let mut risk = 0.0;
    let mut beta = 0.0;
    let mut utility = unit.utility.alpha_weight * expected_return;
    for (i, term) in unit.utility.risk_terms().enumerate() {
        let Some(rm) = ctx.universe().risk_model(term.risk_model.as_str()) else {
            continue;
        };
        let bench = term
            .benchmark
            .as_ref()
            .and_then(|b| ctx.ledger().portfolio(b.as_str()))
            .map(|p| p.holdings().clone())
            .unwrap_or_default();
        let active = active_weights(w, &bench);
        let d = rm.decompose(&active);
        utility -= term.common_factor_aversion * d.factor_variance + term.specific_aversion * d.specific_variance;
        if i == 0 {
            risk = d.total_risk();
            beta = portfolio_beta(rm, w, &bench);
        }
    }
    for term in &unit.utility.covariance_terms {
        let Some(rm) = ctx.universe().risk_model(term.risk_model.as_str()) else {
            continue;
        };
        let bench = term
            .benchmark
            .as_ref()
            .and_then(|b| ctx.ledger().portfolio(b.as_str()))
            .map(|p| p.holdings().clone())
            .unwrap_or_default();
        utility -= term.aversion * term.variance(rm, &active_weights(w, &bench));
    }
    if let Some(es) = ctx.scenarios().and_then(|s| s.expected_shortfall(w)) {
        utility -= unit.utility.expected_shortfall_weight * es;
    }

    OptimalPortfolio {
        account: unit.account.clone(),
        period: unit.period,
        risk,
        expected_return,
        utility,
        turnover,
        penalty: 0.0,
        transaction_cost: 0.0,
        beta,
        holdings: w.iter().map(|(a, x)| (a.to_string(), *x)).collect(),
    }
}

fn active_weights(w: &BTreeMap<AssetId, f64>, bench: &BTreeMap<AssetId, f64>) -> BTreeMap<AssetId, f64> {
    let mut out = w.clone();
    for (a, b) in bench {
        *out.entry(a.clone()).or_insert(0.0) -= b;
    }
    out
}

fn portfolio_beta(rm: &RiskModel, w: &BTreeMap<AssetId, f64>, bench: &BTreeMap<AssetId, f64>) -> f64 {
    if bench.is_empty() {
        return 0.0;
    }
    w.iter().map(|(a, x)| x * rm.beta(a, bench)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_is_distance_to_nearer_bound() {
        let info = families::asset_range("A");
        let b = ResolvedBounds {
            lower: Some(0.1),
            upper: Some(0.5),
        };
        assert!((slack("", &info, 0.4, &b).slack - 0.1).abs() < 1e-12);
        assert!((slack("x/", &info, 0.6, &b).slack + 0.1).abs() < 1e-12);
        assert_eq!(slack("x/", &info, 0.6, &b).constraint_id, "x/asset/A");
    }

    #[test]
    fn soft_breaches_do_not_count() {
        let mut run = Run::default();
        let v = |soft| ConstraintViolation::BoundBreached {
            id: "c".into(),
            subject: None,
            value: 1.0,
            lower: None,
            upper: Some(0.5),
            soft,
        };
        run.breach("u", &v(true));
        assert!(run.breaches.is_empty());
        run.breach("u", &v(false));
        assert_eq!(run.breaches.len(), 1);
    }

    #[test]
    fn active_weights_subtract_benchmark() {
        let w: BTreeMap<AssetId, f64> = [(AssetId::new("A"), 0.6)].into_iter().collect();
        let b: BTreeMap<AssetId, f64> = [(AssetId::new("A"), 0.5), (AssetId::new("B"), 0.5)]
            .into_iter()
            .collect();
        let a = active_weights(&w, &b);
        assert!((a[&AssetId::new("A")] - 0.1).abs() < 1e-12);
        assert_eq!(a[&AssetId::new("B")], -0.5);
    }
}
