//! Scenario: periods chain and share one turnover budget.
//!
//! GREEN when:
//! - a two-period request assembles into two units ordered by period;
//! - period 2 starts from period 1's result, so repeating the same target
//!   costs no further turnover;
//! - total turnover 0.4 fits under a 0.5 cap (slack 0.1) and breaks a 0.3 cap.

use rebal_assembly::{assemble, Topology};
use rebal_gateway::{GatewayError, SolverGateway};
use rebal_testkit::fixtures;
use rebal_testkit::{weights, ScriptedSolver, Weights};

const CAP_ID: &str = "cross-period/turnover/total";

fn shifted() -> Weights {
    weights(&[("USA11I1", 0.3605964), ("USA13Y1", 0.4394036), ("USA39K1", 0.2)])
}

#[tokio::test]
async fn second_period_repeats_first_without_turnover() {
    let spec = assemble(&fixtures::multi_period_request(0.5).unwrap()).unwrap();
    assert_eq!(spec.topology(), Topology::MultiPeriod);
    let periods: Vec<_> = spec.units().iter().map(|u| u.period).collect();
    assert_eq!(periods, vec![Some(1), Some(2)]);

    let gw = SolverGateway::new(ScriptedSolver::targeting(shifted()));
    let out = gw.solve(&spec).await.unwrap();

    let p1 = out.portfolio_for_period(1).unwrap();
    let p2 = out.portfolio_for_period(2).unwrap();
    assert!((p1.turnover - 0.4).abs() < 1e-9, "{}", p1.turnover);
    assert!(p2.turnover.abs() < 1e-12, "{}", p2.turnover);
    assert_eq!(p1.holdings, p2.holdings);

    let slack = out.slack(CAP_ID).unwrap();
    assert!((slack - 0.1).abs() < 1e-9, "{slack}");
}

#[tokio::test]
async fn tight_cap_is_infeasible() {
    let spec = assemble(&fixtures::multi_period_request(0.3).unwrap()).unwrap();
    let err = SolverGateway::new(ScriptedSolver::targeting(shifted()))
        .solve(&spec)
        .await
        .unwrap_err();
    match err {
        GatewayError::Infeasible { slacks, message } => {
            assert!(message.contains("hard constraint"));
            let s = slacks.iter().find(|s| s.constraint_id == CAP_ID).unwrap();
            assert!((s.slack + 0.1).abs() < 1e-9);
        }
        other => panic!("expected Infeasible, got {other:?}"),
    }
}

#[tokio::test]
async fn per_period_targets_apply_to_their_period() {
    let spec = assemble(&fixtures::multi_period_request(1.0).unwrap()).unwrap();
    let solver = ScriptedSolver::hold().with_period_target(2, shifted());
    let out = SolverGateway::new(solver).solve(&spec).await.unwrap();
    assert_eq!(out.portfolio_for_period(1).unwrap().turnover, 0.0);
    assert!((out.portfolio_for_period(2).unwrap().turnover - 0.4).abs() < 1e-9);
    assert!((out.slack(CAP_ID).unwrap() - 0.6).abs() < 1e-9);
}
