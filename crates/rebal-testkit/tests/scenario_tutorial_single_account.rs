//! Scenario: the tutorial request goes end to end through the gateway.
//!
//! GREEN when:
//! - holding the initial portfolio solves OK with one optimal portfolio whose
//!   holdings and expected return match the initial weights and alpha;
//! - the asset bound on USA11I1 is reported as a slack under its plain id;
//! - a target above that bound comes back INFEASIBLE carrying a negative slack;
//! - assembling twice yields the same request id (same spec, same id).

use rebal_assembly::assemble;
use rebal_constraints::families;
use rebal_gateway::{GatewayError, SolverGateway};
use rebal_testkit::fixtures::{self, INITIAL_WEIGHTS};
use rebal_testkit::{weights, ScriptedSolver};

fn request_with_bound(upper: f64) -> rebal_assembly::RebalanceRequest {
    let mut req = fixtures::tutorial_request().unwrap();
    req.profile.catalog =
        std::mem::take(&mut req.profile.catalog).with(families::asset_range("USA11I1").with_upper(upper));
    req
}

#[tokio::test]
async fn hold_solves_with_slack_and_metrics() {
    let spec = assemble(&request_with_bound(0.6)).unwrap();
    let again = assemble(&request_with_bound(0.6)).unwrap();
    assert_eq!(spec.request_id(), again.request_id());

    let gw = SolverGateway::new(ScriptedSolver::hold());
    let out = gw.solve(&spec).await.unwrap();
    assert_eq!(gw.backend().call_count(), 1);
    assert_eq!(out.spec_hash, spec.spec_hash());

    let p = out.portfolio().unwrap();
    for (asset, w) in INITIAL_WEIGHTS {
        assert!((p.holdings[asset] - w).abs() < 1e-12, "{asset}");
    }
    let expected = 0.5605964 * 1.576034e-2 + 0.4394036 * 2.919658e-3;
    assert!((p.expected_return - expected).abs() < 1e-12);
    assert_eq!(p.turnover, 0.0);
    assert!(p.risk > 0.0, "benchmark-relative risk of a two-stock portfolio");

    let slack = out.slack("asset/USA11I1").unwrap();
    assert!((slack - (0.6 - 0.5605964)).abs() < 1e-9, "{slack}");
}

#[tokio::test]
async fn target_above_bound_is_infeasible() {
    let spec = assemble(&request_with_bound(0.6)).unwrap();
    let target = weights(&[("USA11I1", 0.7), ("USA13Y1", 0.3)]);
    let gw = SolverGateway::new(ScriptedSolver::targeting(target));

    match gw.solve(&spec).await.unwrap_err() {
        GatewayError::Infeasible { slacks, message } => {
            assert!(message.contains("1 hard constraint"), "{message}");
            let s = slacks.iter().find(|s| s.constraint_id == "asset/USA11I1").unwrap();
            assert!((s.slack + 0.1).abs() < 1e-9);
            assert_eq!(s.upper_bound, Some(0.6));
        }
        other => panic!("expected Infeasible, got {other:?}"),
    }
}

#[tokio::test]
async fn soft_bound_breach_still_solves() {
    let mut req = fixtures::tutorial_request().unwrap();
    req.profile.catalog = std::mem::take(&mut req.profile.catalog)
        .with(families::asset_range("USA11I1").with_upper(0.6).soft());
    let spec = assemble(&req).unwrap();

    let target = weights(&[("USA11I1", 0.7), ("USA13Y1", 0.3)]);
    let out = SolverGateway::new(ScriptedSolver::targeting(target))
        .solve(&spec)
        .await
        .unwrap();
    assert!(out.slack("asset/USA11I1").unwrap() < 0.0);
}
