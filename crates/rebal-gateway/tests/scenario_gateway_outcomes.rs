//! Scenario: every solver outcome maps onto exactly one gateway result.
//!
//! GREEN when:
//! - OK with a portfolio per unit yields `SolveOutcome` (slacks addressable by id);
//! - INFEASIBLE yields `Infeasible` carrying the slack report;
//! - a backend slower than the timeout yields a retryable `Timeout`;
//! - a response for another request id is an `Internal` error;
//! - an invalid request never reaches the backend and lists its violations;
//! - a LICENSE_ERROR stops a batch and the remaining jobs are skipped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rebal_assembly::{assemble, JobParams, RebalanceProfile, RebalanceRequest, Specification};
use rebal_constraints::{families, ConstraintCatalog};
use rebal_gateway::codec::{decode_request, encode_response, SolveRequest};
use rebal_gateway::{run_batch, BackendFailure, GatewayError, SolverBackend, SolverGateway};
use rebal_model::{Asset, AssetUniverse, PortfolioLedger};
use rebal_schemas::{OptimalPortfolio, SlackInfo, SolveResponse, SolveStatus, StatusCode};
use uuid::Uuid;

struct Scripted<F> {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    reply: F,
}

impl<F> SolverBackend for Scripted<F>
where
    F: Fn(&SolveRequest) -> SolveResponse + Send + Sync + 'static,
{
    fn solve(&self, request: &[u8]) -> Result<Vec<u8>, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let req = decode_request(request).map_err(|e| BackendFailure::new(e.to_string()))?;
        encode_response(&(self.reply)(&req)).map_err(|e| BackendFailure::new(e.to_string()))
    }
}

fn scripted<F>(reply: F) -> (Scripted<F>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Scripted {
            calls: Arc::clone(&calls),
            delay: Duration::ZERO,
            reply,
        },
        calls,
    )
}

fn response(req: &SolveRequest, code: StatusCode) -> SolveResponse {
    SolveResponse {
        request_id: req.request_id,
        status: SolveStatus {
            code,
            message: format!("{code:?}"),
            log: String::new(),
        },
        portfolios: Vec::new(),
        slacks: Vec::new(),
        tax: Vec::new(),
    }
}

fn request(upper: f64) -> RebalanceRequest {
    let mut u = AssetUniverse::new();
    u.add_asset(Asset::cash("CASH")).unwrap();
    u.add_asset(Asset::regular("IBM").with_price(120.0)).unwrap();
    let mut l = PortfolioLedger::new();
    l.create_portfolio("Initial").unwrap();
    l.add_holding("Initial", "IBM", 1.0).unwrap();
    let profile = RebalanceProfile::new("p")
        .with_catalog(ConstraintCatalog::new().with(families::asset_range("IBM").with_upper(upper)));
    RebalanceRequest::new(u, l, profile)
        .with_initial_portfolio("Initial")
        .with_job(JobParams::new().with_base_value(1_000.0))
}

fn spec(upper: f64) -> Specification {
    assemble(&request(upper)).unwrap()
}

#[tokio::test]
async fn scenario_ok_and_infeasible() {
    let (backend, _) = scripted(|req: &SolveRequest| {
        let mut r = response(req, StatusCode::Ok);
        r.portfolios.push(OptimalPortfolio {
            holdings: [("IBM".to_string(), 0.5)].into_iter().collect(),
            ..Default::default()
        });
        r.slacks.push(SlackInfo {
            constraint_id: "asset/IBM".into(),
            slack: 0.0,
            lower_bound: None,
            upper_bound: Some(0.5),
        });
        r
    });
    let gw = SolverGateway::new(backend);
    let s = spec(0.5);
    let out = gw.solve(&s).await.unwrap();
    assert_eq!(out.request_id, s.request_id());
    assert_eq!(out.slack("asset/IBM"), Some(0.0));
    assert_eq!(out.portfolio().unwrap().holdings["IBM"], 0.5);

    let (backend, _) = scripted(|req: &SolveRequest| {
        let mut r = response(req, StatusCode::Infeasible);
        r.slacks.push(SlackInfo {
            constraint_id: "asset/IBM".into(),
            slack: -0.1,
            lower_bound: None,
            upper_bound: Some(0.5),
        });
        r
    });
    let err = SolverGateway::new(backend).solve(&s).await.unwrap_err();
    match err {
        GatewayError::Infeasible { slacks, .. } => assert_eq!(slacks[0].slack, -0.1),
        other => panic!("expected Infeasible, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_timeout_and_mismatched_id() {
    let (mut backend, _) = scripted(|req: &SolveRequest| response(req, StatusCode::Ok));
    backend.delay = Duration::from_millis(500);
    let gw = SolverGateway::new(backend).with_timeout(Duration::from_millis(20));
    let err = gw.solve(&spec(0.5)).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");

    let (backend, _) = scripted(|req: &SolveRequest| {
        let mut r = response(req, StatusCode::Ok);
        r.request_id = Uuid::nil();
        r
    });
    let err = SolverGateway::new(backend).solve(&spec(0.5)).await.unwrap_err();
    assert_eq!(err.kind(), "internal");
}

#[tokio::test]
async fn scenario_invalid_request_never_reaches_backend() {
    let (backend, calls) = scripted(|req: &SolveRequest| response(req, StatusCode::Ok));
    let gw = SolverGateway::new(backend);
    let mut bad = request(0.5);
    bad.initial_portfolio = None;
    match gw.assemble_and_solve(&bad).await.unwrap_err() {
        GatewayError::Validation { violations, .. } => assert!(!violations.is_empty()),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_license_error_stops_batch() {
    let (backend, calls) = scripted(|req: &SolveRequest| response(req, StatusCode::LicenseError));
    let gw = SolverGateway::new(backend);
    let specs = vec![spec(0.5), spec(0.6), spec(0.7)];
    let report = run_batch(&gw, &specs).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.skipped, vec![specs[1].request_id(), specs[2].request_id()]);
    assert!(report.aborted_by().is_some_and(|e| e.is_fatal()));
}
