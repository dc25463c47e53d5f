//! Scenario: assembly is all-or-nothing and deterministic.
//!
//! GREEN when:
//! - a request with several independent faults fails with one
//!   `ValidationError` naming every fault, and no `Specification` exists;
//! - fixing exactly those faults makes the same request assemble;
//! - two assemblies of equal requests agree on `spec_hash` and `request_id`;
//! - the hash is the SHA-256 of `canonical_json()`.

use rebal_assembly::{
    assemble, AccountGroup, AccountSpec, JobParams, RebalanceProfile, RebalanceRequest, RiskTerm,
    Topology, Utility, Violation,
};
use rebal_constraints::{families, ConstraintCatalog, Side};
use rebal_model::{Asset, AssetUniverse, PortfolioLedger, RiskModel};
use sha2::{Digest, Sha256};

fn universe() -> AssetUniverse {
    let mut u = AssetUniverse::new();
    u.add_asset(Asset::cash("CASH").with_price(1.0)).unwrap();
    for (id, px, sector) in [("IBM", 120.0, "Tech"), ("MSFT", 300.0, "Tech"), ("XOM", 60.0, "Energy")] {
        u.add_asset(Asset::regular(id).with_price(px).with_group("SECTOR", sector))
            .unwrap();
    }
    let mut m = RiskModel::new("GEM");
    m.set_factor_covariance("Market", "Market", 0.03);
    for a in ["IBM", "MSFT", "XOM"] {
        m.set_exposure(a, "Market", 1.0);
        m.set_specific_variance(a, 0.02);
    }
    u.add_risk_model(m).unwrap();
    u
}

fn ledger() -> PortfolioLedger {
    let mut l = PortfolioLedger::new();
    for (p, w) in [("Acct1", [0.3, 0.3, 0.4]), ("Acct2", [0.5, 0.25, 0.25]), ("Bench", [1.0 / 3.0; 3])] {
        l.create_portfolio(p).unwrap();
        for (a, w) in ["IBM", "MSFT", "XOM"].into_iter().zip(w) {
            l.add_holding(p, a, w).unwrap();
        }
    }
    l
}

fn profile(catalog: ConstraintCatalog) -> RebalanceProfile {
    RebalanceProfile::new("house")
        .with_utility(Utility::new().with_primary_risk(RiskTerm::new("GEM", 0.0075, 0.0075).against("Bench")))
        .with_catalog(catalog)
}

fn request(catalog: ConstraintCatalog, group_catalog: ConstraintCatalog) -> RebalanceRequest {
    RebalanceRequest::new(universe(), ledger(), profile(catalog))
        .with_account(AccountSpec::new("A1", "Acct1").in_group("household"))
        .with_account(AccountSpec::new("A2", "Acct2").in_group("household"))
        .with_account_group(AccountGroup::new("household").with_catalog(group_catalog))
        .with_job(JobParams::new().with_base_value(250_000.0))
}

#[test]
fn scenario_every_fault_is_reported_and_fixing_them_assembles() {
    let broken = request(
        ConstraintCatalog::new()
            .with(families::asset_range("AAPL").with_upper(0.1))
            .with(families::beta("GEM", "Missing").with_bounds(0.9, 1.1))
            .with(families::turnover(Side::Total).with_bounds(0.3, 0.2)),
        ConstraintCatalog::new().with(families::factor_range("GEM", "Size").with_upper(0.5)),
    );

    let err = assemble(&broken).unwrap_err();
    let v = err.violations();
    assert_eq!(v.len(), 4, "{err}");
    assert!(v.iter().any(|x| matches!(x, Violation::UnknownAsset { asset, .. } if asset == "AAPL")));
    assert!(v.iter().any(|x| matches!(x, Violation::UnknownPortfolio { portfolio, .. } if portfolio == "Missing")));
    assert!(v.iter().any(|x| matches!(x, Violation::Bound { .. })));
    assert!(v.iter().any(|x| matches!(x, Violation::UnknownFactor { factor, .. } if factor == "Size")));
    assert!(err.to_string().starts_with("validation failed with 4 violation(s)"));

    let fixed = request(
        ConstraintCatalog::new()
            .with(families::asset_range("IBM").with_upper(0.1))
            .with(families::beta("GEM", "Bench").with_bounds(0.9, 1.1))
            .with(families::turnover(Side::Total).with_bounds(0.0, 0.2)),
        ConstraintCatalog::new().with(families::factor_range("GEM", "Market").with_upper(0.5)),
    );
    let spec = assemble(&fixed).unwrap();
    assert_eq!(spec.topology(), Topology::MultiAccount);
    assert_eq!(spec.units().len(), 2);
    assert_eq!(spec.body().account_groups[0].members, vec!["A1".to_string(), "A2".to_string()]);
    assert_eq!(spec.unit_for_account("A2").unwrap().account_group.as_deref(), Some("household"));
}

#[test]
fn scenario_hash_is_stable_and_canonical() {
    let build = || {
        request(
            ConstraintCatalog::new().with(families::asset_range("XOM").with_bounds(0.1, 0.3)),
            ConstraintCatalog::new(),
        )
    };
    let a = assemble(&build()).unwrap();
    let b = assemble(&build()).unwrap();
    assert_eq!(a.spec_hash(), b.spec_hash());
    assert_eq!(a.request_id(), b.request_id());

    let canonical = a.canonical_json().unwrap();
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    assert_eq!(digest, a.spec_hash());
}
