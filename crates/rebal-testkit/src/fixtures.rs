//! Tutorial-sized fixtures: eleven assets (one cash), a three-factor "GEM"
//! risk model, a benchmark, one plain and three tax-lot portfolios.
//!
//! Numbers follow the classic optimizer tutorial data set so results stay
//! recognisable; factor exposures are synthetic.

use anyhow::Result;

use rebal_assembly::{
    AccountGroup, AccountSpec, JobParams, PeriodSpec, RebalanceProfile, RebalanceRequest, RiskTerm,
    Utility,
};
use rebal_constraints::{families, ConstraintCatalog, Side};
use rebal_model::{AlphaMap, Asset, AssetUniverse, PortfolioLedger, RiskModel};
use rebal_tax::{SellingOrder, SellingOrderTable, TaxRule, TaxRuleResolver, WashSaleRule, WILDCARD};

pub const CASH: &str = "CASH";
pub const RISK_MODEL: &str = "GEM";
pub const SECTOR: &str = "GICS_SECTOR";

pub const INITIAL: &str = "Initial";
pub const BENCHMARK: &str = "Benchmark";
pub const TAX_LOTS: &str = "TaxLots";
pub const ACCOUNT_PORTFOLIOS: [&str; 3] = ["Account1", "Account2", "Account3"];
pub const HOUSEHOLD: &str = "Household";

pub const FACTORS: [&str; 3] = ["Factor_1A", "Factor_1B", "Factor_1C"];

pub const BASE_VALUE: f64 = 1_000_000.0;

/// (id, sector, issuer, price, alpha, benchmark weight, specific variance)
#[rustfmt::skip]
pub const ASSETS: [(&str, &str, &str, f64, f64, f64, f64); 11] = [
    (CASH,      "",                       "1", 1.00,   0.0,          0.0,       0.0),
    ("USA11I1", "Financials",             "2", 23.99,  1.576034e-2,  0.169809,  3.247204e-2),
    ("USA13Y1", "Information Technology", "2", 34.19,  2.919658e-3,  0.0658566, 3.470769e-2),
    ("USA1LI1", "Information Technology", "2", 67.24,  6.419658e-3,  0.160816,  1.313338e-1),
    ("USA1TY1", "Industrials",            "3", 375.51, 4.420342e-3,  0.0989991, 9.180900e-2),
    ("USA2ND1", "Minerals",               "3", 70.06,  9.996575e-4,  0.0776341, 3.059001e-2),
    ("USA3351", "Utilities",              "4", 17.48,  3.320342e-3,  0.0768613, 6.996025e-2),
    ("USA37C1", "Minerals",               "4", 17.66,  2.700342e-3,  0.0725244, 4.507129e-2),
    ("USA39K1", "Health Care",            "5", 32.96,  1.849966e-2,  0.2774998, 5.225796e-2),
    ("USA45V1", "Utilities",              "5", 14.73,  1.459658e-3,  0.0,       5.631129e-2),
    ("USA4GF1", "Information Technology", "6", 34.48,  6.079658e-3,  0.0,       7.017201e-2),
];

#[rustfmt::skip]
const EXPOSURES: [[f64; 3]; 10] = [
    [ 1.02,  0.31, -0.12],
    [ 0.94, -0.22,  0.41],
    [ 1.21, -0.48,  0.35],
    [ 0.88,  0.15, -0.05],
    [ 0.76,  0.62, -0.30],
    [ 0.55,  0.44,  0.10],
    [ 0.81,  0.58, -0.22],
    [ 0.67, -0.10,  0.27],
    [ 0.49,  0.37,  0.02],
    [ 1.14, -0.35,  0.48],
];

#[rustfmt::skip]
const FACTOR_COVARIANCE: [[f64; 3]; 3] = [
    [0.0025, 0.0004, 0.0000],
    [0.0004, 0.0016, 0.0002],
    [0.0000, 0.0002, 0.0009],
];

/// Initial weights of the plain portfolio.
pub const INITIAL_WEIGHTS: [(&str, f64); 2] = [("USA11I1", 0.5605964), ("USA13Y1", 0.4394036)];

/// Open lots per tax-aware portfolio: (asset, age in days, cost basis, shares).
#[rustfmt::skip]
pub const TAX_LOT_BOOKS: [(&str, &[(&str, u32, f64, f64)]); 4] = [
    (TAX_LOTS, &[
        ("USA11I1", 937,  28.22, 50.0),
        ("USA11I1", 832,  25.37, 50.0),
        ("USA13Y1", 1641, 15.19, 20.0),
        ("USA13Y1", 295,  18.90, 35.0),
    ]),
    ("Account1", &[
        ("USA11I1", 937,  28.22, 50.0),
        ("USA11I1", 832,  25.37, 50.0),
        ("USA13Y1", 1641, 15.19, 20.0),
        ("USA13Y1", 295,  18.90, 35.0),
    ]),
    ("Account2", &[
        ("USA13Y1", 512,  26.56, 50.0),
        ("USA13Y1", 435,  27.49, 31.0),
        ("USA1LI1", 295,  18.90, 100.0),
        ("USA1LI1", 937,  32.53, 30.0),
    ]),
    ("Account3", &[
        ("USA1LI1", 937,  32.53, 130.0),
    ]),
];

pub fn asset_ids() -> impl Iterator<Item = &'static str> {
    ASSETS.iter().map(|a| a.0)
}

pub fn tutorial_risk_model() -> RiskModel {
    let mut rm = RiskModel::new(RISK_MODEL);
    for (i, fi) in FACTORS.iter().enumerate() {
        for (j, fj) in FACTORS.iter().enumerate().skip(i) {
            rm.set_factor_covariance(*fi, *fj, FACTOR_COVARIANCE[i][j]);
        }
    }
    for ((id, ..), row) in ASSETS.iter().skip(1).zip(EXPOSURES.iter()) {
        for (f, x) in FACTORS.iter().zip(row) {
            rm.set_exposure(*id, *f, *x);
        }
    }
    for (id, .., spec_var) in ASSETS.iter().skip(1) {
        rm.set_specific_variance(*id, *spec_var);
    }
    rm
}

pub fn tutorial_universe() -> Result<AssetUniverse> {
    let mut u = AssetUniverse::new();
    for (id, sector, issuer, price, ..) in ASSETS {
        let asset = if id == CASH {
            Asset::cash(id).with_price(price)
        } else {
            Asset::regular(id)
                .with_price(price)
                .with_issuer(issuer)
                .with_group(SECTOR, sector)
        };
        u.add_asset(asset)?;
    }
    u.add_risk_model(tutorial_risk_model())?;
    Ok(u)
}

pub fn tutorial_alpha() -> AlphaMap {
    AlphaMap::from_pairs(ASSETS.iter().map(|a| (a.0, a.4)))
}

/// Plain initial, benchmark, and every tax-lot portfolio.
pub fn tutorial_ledger() -> Result<PortfolioLedger> {
    let mut l = PortfolioLedger::new();
    l.create_portfolio(INITIAL)?;
    for (asset, w) in INITIAL_WEIGHTS {
        l.add_holding(INITIAL, asset, w)?;
    }
    l.create_portfolio(BENCHMARK)?;
    for (id, .., bm, _) in ASSETS {
        if bm > 0.0 {
            l.add_holding(BENCHMARK, id, bm)?;
        }
    }
    for (pf, lots) in TAX_LOT_BOOKS {
        l.create_portfolio(pf)?;
        for (asset, age, basis, shares) in lots {
            l.add_tax_lot(pf, *asset, *age, *basis, *shares)?;
        }
    }
    Ok(l)
}

/// Two-rate 24.3% / 42.3% with 30-day disallowing wash sales.
pub fn tutorial_tax_rule() -> TaxRule {
    TaxRule::two_rate(0.243, 0.423).with_wash_sale(WashSaleRule::Disallowed { window_days: 30 })
}

pub fn tutorial_tax_rules() -> Result<TaxRuleResolver> {
    Ok(TaxRuleResolver::new().with_rule(WILDCARD, WILDCARD, tutorial_tax_rule())?)
}

pub fn fifo_everywhere() -> Result<SellingOrderTable> {
    Ok(SellingOrderTable::new().with_rule(WILDCARD, WILDCARD, SellingOrder::Fifo)?)
}

/// Benchmark-relative risk, full alpha, long only.
pub fn tutorial_profile<S: Into<String>>(id: S) -> RebalanceProfile {
    let utility = Utility::new()
        .with_primary_risk(RiskTerm::new(RISK_MODEL, 0.0075, 0.0075).against(BENCHMARK))
        .with_alpha_weight(1.0);
    RebalanceProfile::new(id)
        .with_utility(utility)
        .with_catalog(ConstraintCatalog::new().with(families::non_cash_range().with_bounds(0.0, 1.0)))
}

pub fn tutorial_request() -> Result<RebalanceRequest> {
    Ok(
        RebalanceRequest::new(tutorial_universe()?, tutorial_ledger()?, tutorial_profile("tutorial"))
            .with_alpha(tutorial_alpha())
            .with_initial_portfolio(INITIAL)
            .with_job(JobParams::new().with_base_value(BASE_VALUE)),
    )
}

/// Tax-lot initial portfolio; the base value comes from the lots.
pub fn tax_aware_request() -> Result<RebalanceRequest> {
    let profile = tutorial_profile("tax-aware")
        .with_tax_rules(tutorial_tax_rules()?)
        .with_selling_orders(fifo_everywhere()?);
    Ok(RebalanceRequest::new(tutorial_universe()?, tutorial_ledger()?, profile)
        .with_alpha(tutorial_alpha())
        .with_initial_portfolio(TAX_LOTS))
}

/// Three accounts in one household; tax rules live on the group.
pub fn multi_account_request() -> Result<RebalanceRequest> {
    let household = AccountGroup::new(HOUSEHOLD).with_tax_rules(tutorial_tax_rules()?);
    let mut req = RebalanceRequest::new(
        tutorial_universe()?,
        tutorial_ledger()?,
        tutorial_profile("household").with_selling_orders(fifo_everywhere()?),
    )
    .with_alpha(tutorial_alpha())
    .with_account_group(household);
    for (i, pf) in ACCOUNT_PORTFOLIOS.iter().enumerate() {
        req = req.with_account(AccountSpec::new(format!("A{}", i + 1), *pf).in_group(HOUSEHOLD));
    }
    Ok(req)
}

/// Two periods from the plain initial portfolio with a total turnover cap
/// across both.
pub fn multi_period_request(cross_period_turnover: f64) -> Result<RebalanceRequest> {
    Ok(RebalanceRequest::new(tutorial_universe()?, tutorial_ledger()?, tutorial_profile("unused"))
        .with_alpha(tutorial_alpha())
        .with_initial_portfolio(INITIAL)
        .with_job(JobParams::new().with_base_value(BASE_VALUE))
        .with_period(PeriodSpec::new(1, tutorial_profile("period-1")))
        .with_period(PeriodSpec::new(2, tutorial_profile("period-2")))
        .with_cross_period(
            ConstraintCatalog::new()
                .with(families::cross_period_turnover(Side::Total).with_upper(cross_period_turnover)),
        ))
}
