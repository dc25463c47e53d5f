//! `assemble`: validate a `RebalanceRequest` and freeze it into a
//! `Specification`.
//!
//! Assembly is all-or-nothing. Every check runs and every violation is
//! collected; a `Specification` exists only when the list is empty.
//!
//! Hashing: `spec_hash` = SHA-256 hex over the canonical JSON of the body
//! (object keys sorted). `request_id` = UUIDv5 of the hash, so identical
//! inputs always produce the same id.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rebal_constraints::{
    resolve_bounds, validate_piecewise, ConstraintCatalog, ConstraintHierarchy, ConstraintInfo,
    ConstraintKind, EvalContext, ResolvedBounds, ScenarioSet,
};
use rebal_model::{
    check_psd, AlphaMap, AssetId, AssetType, AssetUniverse, ConstraintId, Portfolio, PortfolioId,
    PortfolioLedger, PsdVerdict,
};
use rebal_tax::{SellingOrder, SellingOrderTable, TaxRule, TaxRuleResolver};

use crate::profile::{CovarianceForm, JobParams, RebalanceProfile, Utility};
use crate::request::{AccountGroup, RebalanceRequest, Topology};
use crate::violation::{ValidationError, Violation};

pub const DEFAULT_PSD_TOLERANCE: f64 = 1e-10;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssemblyOptions {
    /// Relative tolerance of the semidefiniteness checks.
    pub psd_tolerance: f64,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            psd_tolerance: DEFAULT_PSD_TOLERANCE,
        }
    }
}

// ─── Output types ─────────────────────────────────────────────────────────────

/// A catalog together with the bounds its constraints resolved to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCatalog {
    pub catalog: ConstraintCatalog,
    pub bounds: BTreeMap<ConstraintId, ResolvedBounds>,
}

/// One account or period, fully resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssembledUnit {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub period: Option<u32>,
    #[serde(default)]
    pub account_group: Option<String>,
    pub initial_portfolio: PortfolioId,
    pub base_value: f64,
    pub profile_id: String,
    pub utility: Utility,
    pub hierarchy: ConstraintHierarchy,
    pub constraints: ResolvedCatalog,
    /// Per held asset; empty unless the initial portfolio carries tax lots.
    #[serde(default)]
    pub tax_rules: BTreeMap<AssetId, TaxRule>,
    #[serde(default)]
    pub selling_orders: BTreeMap<AssetId, SellingOrder>,
    /// Return scenarios for expected-shortfall terms and constraints.
    #[serde(default)]
    pub expected_shortfall: Option<ScenarioSet>,
}

impl AssembledUnit {
    pub fn label(&self) -> String {
        unit_label(self.account.as_deref(), self.period, &self.initial_portfolio)
    }

    pub fn is_tax_aware(&self) -> bool {
        !self.tax_rules.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssembledGroup {
    pub id: String,
    pub members: Vec<String>,
    pub constraints: ResolvedCatalog,
}

/// Everything the solver receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecificationBody {
    pub topology: Topology,
    pub universe: AssetUniverse,
    /// Lot-derived weights already recomputed.
    pub ledger: PortfolioLedger,
    pub alpha: AlphaMap,
    pub job: JobParams,
    pub units: Vec<AssembledUnit>,
    #[serde(default)]
    pub account_groups: Vec<AssembledGroup>,
    #[serde(default)]
    pub cross_period: ResolvedCatalog,
}

/// Validated, immutable description of one optimization request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Specification {
    request_id: Uuid,
    spec_hash: String,
    body: SpecificationBody,
}

impl Specification {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn spec_hash(&self) -> &str {
        &self.spec_hash
    }

    pub fn body(&self) -> &SpecificationBody {
        &self.body
    }

    pub fn topology(&self) -> Topology {
        self.body.topology
    }

    pub fn units(&self) -> &[AssembledUnit] {
        &self.body.units
    }

    pub fn unit_for_account(&self, account: &str) -> Option<&AssembledUnit> {
        self.body
            .units
            .iter()
            .find(|u| u.account.as_deref() == Some(account))
    }

    pub fn unit_for_period(&self, period: u32) -> Option<&AssembledUnit> {
        self.body.units.iter().find(|u| u.period == Some(period))
    }

    /// The exact bytes `spec_hash` was computed over.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        canonical_json(&self.body)
    }
}

// ─── Entry points ─────────────────────────────────────────────────────────────

pub fn assemble(request: &RebalanceRequest) -> Result<Specification, ValidationError> {
    assemble_with(request, AssemblyOptions::default())
}

pub fn assemble_with(
    request: &RebalanceRequest,
    options: AssemblyOptions,
) -> Result<Specification, ValidationError> {
    let mut v = Vec::new();

    let topology = request.topology();
    if topology.is_none() {
        v.push(Violation::MixedTopology);
    }

    check_universe(request, &options, &mut v);
    check_alpha(&request.universe, &request.alpha, &mut v);
    let (ledger, lot_values) = prepare_ledger(request, &mut v);
    let ctx = EvalContext::new(&request.universe, &ledger);

    let mut profiles = ProfileCache::default();
    let mut build = UnitBuilder {
        request,
        ctx,
        options,
        lot_values: &lot_values,
        profiles: &mut profiles,
    };
    let units = match topology {
        Some(Topology::Single) => build.single(&mut v),
        Some(Topology::MultiAccount) => build.accounts(&mut v),
        Some(Topology::MultiPeriod) => build.periods(&mut v),
        None => Vec::new(),
    };

    let account_groups = assemble_groups(request, ctx, &options, &mut v);
    let cross_period = check_catalog("cross-period", &request.cross_period, ctx, &options, &mut v);

    if !v.is_empty() {
        warn!(violations = v.len(), "assembly rejected");
        return Err(ValidationError(v));
    }

    let body = SpecificationBody {
        // Mixed topology always carries a violation, so this is reached with Some.
        topology: topology.unwrap_or(Topology::Single),
        universe: request.universe.clone(),
        ledger,
        alpha: request.alpha.clone(),
        job: request.job.clone(),
        units,
        account_groups,
        cross_period,
    };

    let canonical = canonical_json(&body).map_err(|e| {
        ValidationError(vec![Violation::Serialization {
            message: e.to_string(),
        }])
    })?;
    let spec_hash = sha256_hex(canonical.as_bytes());
    let request_id = derive_request_id(&spec_hash);

    info!(
        spec_hash = %spec_hash,
        request_id = %request_id,
        units = body.units.len(),
        "specification assembled"
    );

    Ok(Specification {
        request_id,
        spec_hash,
        body,
    })
}

// ─── Units ────────────────────────────────────────────────────────────────────

fn unit_label(account: Option<&str>, period: Option<u32>, portfolio: &PortfolioId) -> String {
    match (account, period) {
        (Some(a), _) => format!("account '{a}'"),
        (None, Some(p)) => format!("period {p}"),
        (None, None) => format!("portfolio '{portfolio}'"),
    }
}

/// Profiles shared by several units are checked once.
#[derive(Default)]
struct ProfileCache<'r> {
    seen: Vec<(&'r RebalanceProfile, ResolvedCatalog)>,
}

impl<'r> ProfileCache<'r> {
    fn resolve(
        &mut self,
        profile: &'r RebalanceProfile,
        ctx: EvalContext<'_>,
        options: &AssemblyOptions,
        v: &mut Vec<Violation>,
    ) -> ResolvedCatalog {
        if let Some((_, c)) = self.seen.iter().find(|(p, _)| *p == profile) {
            return c.clone();
        }
        let c = check_profile(profile, ctx, options, v);
        self.seen.push((profile, c.clone()));
        c
    }
}

struct UnitInput<'r> {
    account: Option<&'r str>,
    period: Option<u32>,
    group: Option<&'r AccountGroup>,
    initial: &'r PortfolioId,
    base_value: Option<f64>,
    /// Used when neither an explicit value nor lots give one.
    fallback_base_value: Option<f64>,
    profile: &'r RebalanceProfile,
}

struct UnitBuilder<'r, 'c> {
    request: &'r RebalanceRequest,
    ctx: EvalContext<'c>,
    options: AssemblyOptions,
    lot_values: &'c BTreeMap<PortfolioId, f64>,
    profiles: &'c mut ProfileCache<'r>,
}

impl<'r, 'c> UnitBuilder<'r, 'c> {
    fn single(&mut self, v: &mut Vec<Violation>) -> Vec<AssembledUnit> {
        let req = self.request;
        let Some(initial) = req.initial_portfolio.as_ref() else {
            v.push(Violation::MissingInitialPortfolio);
            self.profiles.resolve(&req.profile, self.ctx, &self.options, v);
            return Vec::new();
        };
        let input = UnitInput {
            account: None,
            period: None,
            group: None,
            initial,
            base_value: req.job.base_value,
            fallback_base_value: None,
            profile: &req.profile,
        };
        self.build(input, v).into_iter().collect()
    }

    fn accounts(&mut self, v: &mut Vec<Violation>) -> Vec<AssembledUnit> {
        let req = self.request;
        let mut seen = BTreeSet::new();
        let mut units = Vec::new();
        for a in &req.accounts {
            if !seen.insert(a.id.as_str()) {
                v.push(Violation::DuplicateAccount { id: a.id.clone() });
                continue;
            }
            let group = match &a.group {
                Some(g) => {
                    let found = req.account_group(g);
                    if found.is_none() {
                        v.push(Violation::UnknownAccountGroup {
                            account: a.id.clone(),
                            group: g.clone(),
                        });
                    }
                    found
                }
                None => None,
            };
            let input = UnitInput {
                account: Some(&a.id),
                period: None,
                group,
                initial: &a.initial_portfolio,
                base_value: a.base_value,
                fallback_base_value: req.job.base_value,
                profile: a.profile.as_ref().unwrap_or(&req.profile),
            };
            units.extend(self.build(input, v));
        }
        units
    }

    fn periods(&mut self, v: &mut Vec<Violation>) -> Vec<AssembledUnit> {
        let req = self.request;
        let initial = req.initial_portfolio.as_ref();
        if initial.is_none() {
            v.push(Violation::MissingInitialPortfolio);
        }
        let mut seen = BTreeSet::new();
        let mut periods: Vec<_> = req.periods.iter().collect();
        periods.sort_by_key(|p| p.index);

        let mut units = Vec::new();
        for p in periods {
            if !seen.insert(p.index) {
                v.push(Violation::DuplicatePeriod { index: p.index });
                continue;
            }
            // Without an initial portfolio no unit is built, but every
            // period's profile is still checked.
            let Some(initial) = initial else {
                self.profiles.resolve(&p.profile, self.ctx, &self.options, v);
                continue;
            };
            let input = UnitInput {
                account: None,
                period: Some(p.index),
                group: None,
                initial,
                base_value: req.job.base_value,
                fallback_base_value: None,
                profile: &p.profile,
            };
            units.extend(self.build(input, v));
        }
        units
    }

    fn build(&mut self, input: UnitInput<'r>, v: &mut Vec<Violation>) -> Option<AssembledUnit> {
        let label = unit_label(input.account, input.period, input.initial);
        let constraints = self.profiles.resolve(input.profile, self.ctx, &self.options, v);

        let Some(portfolio) = self.ctx.ledger().portfolio(input.initial.as_str()) else {
            v.push(Violation::UnknownPortfolio {
                context: label,
                portfolio: input.initial.to_string(),
            });
            return None;
        };

        let base_value = input
            .base_value
            .or_else(|| self.lot_values.get(input.initial).copied())
            .or(input.fallback_base_value);
        let base_value = match base_value {
            Some(b) if b.is_finite() && b > 0.0 => b,
            other => {
                v.push(Violation::InvalidBaseValue {
                    unit: label,
                    value: other.unwrap_or(0.0),
                });
                return None;
            }
        };

        let (tax_rules, selling_orders) = if portfolio.is_tax_aware() {
            let rules = input
                .profile
                .tax_rules
                .as_ref()
                .or_else(|| input.group.and_then(|g| g.tax_rules.as_ref()));
            resolve_unit_tax(
                &label,
                portfolio,
                rules,
                input.profile.selling_orders.as_ref(),
                &self.request.universe,
                v,
            )
        } else {
            (BTreeMap::new(), BTreeMap::new())
        };

        debug!(unit = %label, base_value, tax_aware = portfolio.is_tax_aware(), "unit resolved");

        Some(AssembledUnit {
            account: input.account.map(str::to_string),
            period: input.period,
            account_group: input.group.map(|g| g.id.clone()),
            initial_portfolio: input.initial.clone(),
            base_value,
            profile_id: input.profile.id.clone(),
            utility: input.profile.utility.clone(),
            hierarchy: input.profile.hierarchy.clone(),
            constraints,
            tax_rules,
            selling_orders,
            expected_shortfall: input.profile.expected_shortfall.clone(),
        })
    }
}

/// Tax and selling-order rule for every asset held in lots.
/// An empty selling-order table means FIFO throughout.
fn resolve_unit_tax(
    unit: &str,
    portfolio: &Portfolio,
    rules: Option<&TaxRuleResolver>,
    orders: Option<&SellingOrderTable>,
    universe: &AssetUniverse,
    v: &mut Vec<Violation>,
) -> (BTreeMap<AssetId, TaxRule>, BTreeMap<AssetId, SellingOrder>) {
    let mut tax = BTreeMap::new();
    let mut sell = BTreeMap::new();

    let Some(rules) = rules else {
        v.push(Violation::MissingTaxRules {
            unit: unit.to_string(),
        });
        return (tax, sell);
    };

    let held: BTreeSet<&AssetId> = portfolio
        .lots()
        .iter()
        .map(|l| &l.asset)
        .filter(|a| universe.contains(a.as_str()))
        .collect();

    for asset in held {
        match rules.resolve_id(universe, asset.as_str()) {
            Ok(r) => {
                tax.insert(asset.clone(), *r);
            }
            Err(error) => v.push(Violation::TaxRule {
                unit: unit.to_string(),
                error,
            }),
        }
        let order = match orders.filter(|t| !t.is_empty()) {
            None => SellingOrder::default(),
            Some(t) => match t.resolve_id(universe, asset.as_str()) {
                Ok(o) => *o,
                Err(error) => {
                    v.push(Violation::TaxRule {
                        unit: unit.to_string(),
                        error,
                    });
                    continue;
                }
            },
        };
        sell.insert(asset.clone(), order);
    }
    (tax, sell)
}

fn assemble_groups(
    request: &RebalanceRequest,
    ctx: EvalContext<'_>,
    options: &AssemblyOptions,
    v: &mut Vec<Violation>,
) -> Vec<AssembledGroup> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for g in &request.account_groups {
        if !seen.insert(g.id.as_str()) {
            v.push(Violation::DuplicateAccountGroup { id: g.id.clone() });
            continue;
        }
        let scope = format!("account group '{}'", g.id);
        if let Some(rules) = &g.tax_rules {
            check_tax_table(&scope, rules, v);
        }
        let constraints = check_catalog(&scope, &g.catalog, ctx, options, v);
        let members = request
            .accounts
            .iter()
            .filter(|a| a.group.as_deref() == Some(g.id.as_str()))
            .map(|a| a.id.clone())
            .collect();
        out.push(AssembledGroup {
            id: g.id.clone(),
            members,
            constraints,
        });
    }
    out
}

// ─── Profile / catalog checks ─────────────────────────────────────────────────

fn check_profile(
    profile: &RebalanceProfile,
    ctx: EvalContext<'_>,
    options: &AssemblyOptions,
    v: &mut Vec<Violation>,
) -> ResolvedCatalog {
    let scope = format!("profile '{}'", profile.id);
    check_utility(&scope, profile, ctx, v);
    if let Some(rules) = &profile.tax_rules {
        check_tax_table(&scope, rules, v);
    }
    let ctx = match &profile.expected_shortfall {
        Some(scenarios) => {
            check_scenarios(&scope, scenarios, ctx, v);
            ctx.with_scenarios(scenarios)
        }
        None => ctx,
    };
    check_catalog(&scope, &profile.catalog, ctx, options, v)
}

fn check_utility(scope: &str, profile: &RebalanceProfile, ctx: EvalContext<'_>, v: &mut Vec<Violation>) {
    let utility = &profile.utility;
    for term in utility.risk_terms() {
        if ctx.universe().risk_model(term.risk_model.as_str()).is_none() {
            v.push(Violation::UnknownRiskModel {
                context: format!("{scope} utility"),
                risk_model: term.risk_model.to_string(),
            });
        }
        if let Some(b) = &term.benchmark {
            if !ctx.ledger().contains(b.as_str()) {
                v.push(Violation::UnknownPortfolio {
                    context: format!("{scope} utility"),
                    portfolio: b.to_string(),
                });
            }
        }
        for value in [term.common_factor_aversion, term.specific_aversion] {
            if !(value.is_finite() && value >= 0.0) {
                v.push(Violation::InvalidAversion {
                    scope: scope.to_string(),
                    value,
                });
            }
        }
    }

    let context = || format!("{scope} covariance term");
    for term in &utility.covariance_terms {
        let model = ctx.universe().risk_model(term.risk_model.as_str());
        if model.is_none() {
            v.push(Violation::UnknownRiskModel {
                context: context(),
                risk_model: term.risk_model.to_string(),
            });
        }
        if let Some(b) = &term.benchmark {
            if !ctx.ledger().contains(b.as_str()) {
                v.push(Violation::UnknownPortfolio {
                    context: context(),
                    portfolio: b.to_string(),
                });
            }
        }
        if !(term.aversion.is_finite() && term.aversion >= 0.0) {
            v.push(Violation::InvalidAversion {
                scope: context(),
                value: term.aversion,
            });
        }
        for (key, w) in &term.weights {
            if !w.is_finite() {
                v.push(Violation::InvalidCovarianceWeight {
                    scope: context(),
                    key: key.clone(),
                    reason: "must be finite",
                });
            }
            match term.form {
                CovarianceForm::Wxfxw if !ctx.universe().contains(key) => {
                    v.push(Violation::UnknownAsset {
                        context: context(),
                        asset: key.clone(),
                    })
                }
                CovarianceForm::Xwfwx => {
                    if model.is_some_and(|m| !m.has_factor(key)) {
                        v.push(Violation::UnknownFactor {
                            context: context(),
                            risk_model: term.risk_model.to_string(),
                            factor: key.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    let es = utility.expected_shortfall_weight;
    if !(es.is_finite() && es >= 0.0) {
        v.push(Violation::InvalidAversion {
            scope: format!("{scope} expected shortfall"),
            value: es,
        });
    } else if es > 0.0 && profile.expected_shortfall.is_none() {
        v.push(Violation::InvalidScenarios {
            scope: scope.to_string(),
            reason: "expected shortfall is weighted but no return scenarios are given",
        });
    }
}

fn check_scenarios(scope: &str, scenarios: &ScenarioSet, ctx: EvalContext<'_>, v: &mut Vec<Violation>) {
    if let Err(reason) = scenarios.validate() {
        v.push(Violation::InvalidScenarios {
            scope: scope.to_string(),
            reason,
        });
    }
    for asset in scenarios.referenced_assets() {
        if !ctx.universe().contains(asset) {
            v.push(Violation::UnknownAsset {
                context: format!("{scope} scenarios"),
                asset: asset.to_string(),
            });
        }
    }
}

fn check_tax_table(scope: &str, rules: &TaxRuleResolver, v: &mut Vec<Violation>) {
    for entry in rules.entries() {
        if let Err(reason) = entry.rule.validate() {
            v.push(Violation::InvalidTaxRule {
                scope: format!("{scope} rule {}", entry.pattern),
                reason,
            });
        }
    }
}

fn check_catalog(
    scope: &str,
    catalog: &ConstraintCatalog,
    ctx: EvalContext<'_>,
    options: &AssemblyOptions,
    v: &mut Vec<Violation>,
) -> ResolvedCatalog {
    for id in catalog.duplicate_ids() {
        v.push(Violation::DuplicateConstraintId {
            scope: scope.to_string(),
            id: id.to_string(),
        });
    }

    let mut bounds = BTreeMap::new();
    for info in catalog.constraints() {
        let before = v.len();
        check_references(info, ctx, v);
        check_shape(info, options, v);
        if v.len() > before {
            continue;
        }
        match resolve_bounds(info, &ctx) {
            Ok(b) => {
                bounds.insert(info.id.clone(), b);
            }
            Err(error) => v.push(Violation::Bound {
                scope: scope.to_string(),
                error,
            }),
        }
    }

    ResolvedCatalog {
        catalog: catalog.clone(),
        bounds,
    }
}

fn check_references(info: &ConstraintInfo, ctx: EvalContext<'_>, v: &mut Vec<Violation>) {
    let context = || format!("constraint '{}'", info.id);
    let universe = ctx.universe();
    let ledger = ctx.ledger();

    for asset in info.kind.referenced_assets() {
        if !universe.contains(asset) {
            v.push(Violation::UnknownAsset {
                context: context(),
                asset: asset.to_string(),
            });
        }
    }

    let portfolios = info
        .kind
        .referenced_portfolios()
        .into_iter()
        .chain(info.reference.as_ref());
    for p in portfolios {
        if !ledger.contains(p.as_str()) {
            v.push(Violation::UnknownPortfolio {
                context: context(),
                portfolio: p.to_string(),
            });
        }
    }

    if matches!(info.kind, ConstraintKind::ExpectedShortfall) && ctx.scenarios().is_none() {
        v.push(Violation::InvalidConstraint {
            constraint: info.id.to_string(),
            reason: "expected shortfall needs return scenarios on the profile",
        });
    }

    for (model, factor) in info.kind.referenced_risk() {
        match universe.risk_model(model.as_str()) {
            None => v.push(Violation::UnknownRiskModel {
                context: context(),
                risk_model: model.to_string(),
            }),
            Some(m) => {
                if let Some(f) = factor {
                    if !m.has_factor(f.as_str()) {
                        v.push(Violation::UnknownFactor {
                            context: context(),
                            risk_model: model.to_string(),
                            factor: f.to_string(),
                        });
                    }
                }
            }
        }
    }
}

fn check_shape(info: &ConstraintInfo, options: &AssemblyOptions, v: &mut Vec<Violation>) {
    let id = || info.id.to_string();

    if let Some(p) = &info.penalty {
        if let Err(reason) = p.validate() {
            v.push(Violation::InvalidPenalty {
                constraint: id(),
                reason,
            });
        }
    }

    if info.kind.requires_integral_bounds() {
        for b in [info.lower, info.upper].iter().flatten() {
            if b.value.fract() != 0.0 {
                v.push(Violation::NonIntegralBound {
                    constraint: id(),
                    value: b.value,
                });
            }
        }
    }

    if let ConstraintKind::Quadratic {
        assets, q, linear, ..
    } = &info.kind
    {
        if q.dim() != assets.len() {
            v.push(Violation::QuadraticShape {
                constraint: id(),
                expected: assets.len(),
                got: q.dim(),
            });
        } else if let PsdVerdict::Indefinite { eigenvalue, .. } = check_psd(q, options.psd_tolerance) {
            v.push(Violation::QuadraticNotPositiveSemidefinite {
                constraint: id(),
                eigenvalue,
            });
        }
        if !linear.is_empty() && linear.len() != assets.len() {
            v.push(Violation::QuadraticShape {
                constraint: id(),
                expected: assets.len(),
                got: linear.len(),
            });
        }
    }

    match &info.kind {
        ConstraintKind::PiecewiseLinear {
            start,
            downside,
            upside,
            ..
        } => {
            if let Err(reason) = validate_piecewise(*start, downside, upside) {
                v.push(Violation::InvalidConstraint {
                    constraint: id(),
                    reason,
                });
            }
        }
        ConstraintKind::AssetRiskBudget { assets, .. } if assets.is_empty() => {
            v.push(Violation::InvalidConstraint {
                constraint: id(),
                reason: "asset set must not be empty",
            });
        }
        _ => {}
    }
}

// ─── Universe / ledger ────────────────────────────────────────────────────────

fn check_universe(request: &RebalanceRequest, options: &AssemblyOptions, v: &mut Vec<Violation>) {
    let universe = &request.universe;

    let cash = universe.cash_assets();
    if cash.len() > 1 {
        v.push(Violation::MultipleCashAssets {
            assets: cash.iter().map(|a| a.to_string()).collect(),
        });
    }

    for asset in universe.assets() {
        if !matches!(asset.asset_type, AssetType::Composite | AssetType::CompositeFutures) {
            continue;
        }
        match &asset.composite {
            None => v.push(Violation::MissingCompositePortfolio {
                asset: asset.id.to_string(),
            }),
            Some(p) if !request.ledger.contains(p.as_str()) => v.push(Violation::UnknownPortfolio {
                context: format!("composite asset '{}'", asset.id),
                portfolio: p.to_string(),
            }),
            Some(_) => {}
        }
    }

    for model in universe.risk_models() {
        for issue in model.validate(options.psd_tolerance) {
            v.push(Violation::RiskModel {
                risk_model: model.id().to_string(),
                issue,
            });
        }
    }
}

fn check_alpha(universe: &AssetUniverse, alpha: &AlphaMap, v: &mut Vec<Violation>) {
    for asset in alpha.keys() {
        if !universe.contains(asset) {
            v.push(Violation::UnknownAsset {
                context: "alpha".to_string(),
                asset: asset.to_string(),
            });
        }
    }
}

/// Copy of the ledger with lot-derived weights recomputed, plus the lot value
/// of every tax-aware portfolio.
fn prepare_ledger(
    request: &RebalanceRequest,
    v: &mut Vec<Violation>,
) -> (PortfolioLedger, BTreeMap<PortfolioId, f64>) {
    let universe = &request.universe;
    let mut ledger = request.ledger.clone();
    let mut recompute = Vec::new();

    for p in ledger.portfolios() {
        let before = v.len();
        let mut unknown = |context: String, asset: &AssetId| {
            if !universe.contains(asset.as_str()) {
                v.push(Violation::UnknownAsset {
                    context,
                    asset: asset.to_string(),
                });
            }
        };
        for asset in p.holdings().keys() {
            unknown(format!("portfolio '{}'", p.id()), asset);
        }
        for lot in p.lots() {
            unknown(format!("tax lot '{}' of portfolio '{}'", lot.lot_id, p.id()), &lot.asset);
        }
        for r in p.wash_sales() {
            unknown(format!("wash sale record of portfolio '{}'", p.id()), &r.asset);
        }
        check_lots(p, v);
        if p.is_tax_aware() && v.len() == before {
            recompute.push(p.id().clone());
        }
    }

    let prices = universe.price_map();
    let mut values = BTreeMap::new();
    for id in recompute {
        match ledger.recompute_weights_from_lots(id.as_str(), &prices) {
            Ok(value) => {
                values.insert(id, value);
            }
            Err(error) => v.push(Violation::Ledger { error }),
        }
    }
    (ledger, values)
}

/// Lots and wash-sale records arrive deserialized, past the ledger's own
/// checks, so they are held to the same rules here.
fn check_lots(p: &Portfolio, v: &mut Vec<Violation>) {
    let mut ids = BTreeSet::new();
    for lot in p.lots() {
        let bad = |reason| Violation::InvalidTaxLot {
            portfolio: p.id().to_string(),
            lot_id: lot.lot_id.clone(),
            reason,
        };
        if !lot.shares.is_finite() {
            v.push(bad("shares must be finite"));
        } else if lot.shares <= 0.0 {
            v.push(bad("shares must be > 0"));
        }
        if !lot.cost_basis.is_finite() {
            v.push(bad("cost basis must be finite"));
        } else if lot.cost_basis < 0.0 {
            v.push(bad("cost basis must be >= 0"));
        }
        if !ids.insert(lot.lot_id.as_str()) {
            v.push(Violation::DuplicateLotId {
                portfolio: p.id().to_string(),
                lot_id: lot.lot_id.clone(),
            });
        }
    }
    for r in p.wash_sales() {
        let reason = if !(r.shares.is_finite() && r.shares > 0.0) {
            Some("shares must be finite and > 0")
        } else if !(r.loss_per_share.is_finite() && r.loss_per_share >= 0.0) {
            Some("loss per share must be finite and >= 0")
        } else {
            None
        };
        if let Some(reason) = reason {
            v.push(Violation::InvalidWashSaleRecord {
                portfolio: p.id().to_string(),
                asset: r.asset.to_string(),
                reason,
            });
        }
    }
}

// ─── Hashing ──────────────────────────────────────────────────────────────────

fn canonical_json(body: &SpecificationBody) -> Result<String, serde_json::Error> {
    // Going through Value sorts every object's keys.
    let value = serde_json::to_value(body)?;
    serde_json::to_string(&value)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn derive_request_id(spec_hash: &str) -> Uuid {
    let data = format!("rebal-assembly.spec.v1|{spec_hash}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}
