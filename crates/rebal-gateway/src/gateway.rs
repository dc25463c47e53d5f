//! `SolverGateway`: the only path from a `Specification` to a solver.
//!
//! ```text
//! Specification ──encode──► spawn_blocking(backend.solve) ──┐
//!                                                             ├─ timeout ─► GatewayError::Timeout
//! SolveOutcome ◄──interpret── decode ◄───────────────────────┘
//! ```
//!
//! The backend call runs on a blocking worker. When the timeout fires the
//! gateway stops waiting; the worker is left to finish on its own and its
//! result is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use rebal_assembly::{assemble, AssembledUnit, RebalanceRequest, Specification};
use rebal_schemas::{OptimalPortfolio, SlackInfo, SolveResponse, StatusCode, TaxOutput};

use crate::backend::SolverBackend;
use crate::codec::{decode_response, encode_request};
use crate::error::GatewayError;

pub const DEFAULT_SOLVE_TIMEOUT: Duration = Duration::from_secs(300);

/// A successful solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub request_id: Uuid,
    pub spec_hash: String,
    pub portfolios: Vec<OptimalPortfolio>,
    pub slacks: Vec<SlackInfo>,
    pub tax: Vec<TaxOutput>,
    pub log: String,
    pub elapsed: Duration,
}

impl SolveOutcome {
    /// The single-portfolio result.
    pub fn portfolio(&self) -> Option<&OptimalPortfolio> {
        self.portfolios
            .iter()
            .find(|p| p.account.is_none() && p.period.is_none())
    }

    pub fn portfolio_for_account(&self, account: &str) -> Option<&OptimalPortfolio> {
        self.portfolios
            .iter()
            .find(|p| p.account.as_deref() == Some(account))
    }

    pub fn portfolio_for_period(&self, period: u32) -> Option<&OptimalPortfolio> {
        self.portfolios.iter().find(|p| p.period == Some(period))
    }

    pub fn slack(&self, constraint_id: &str) -> Option<f64> {
        self.slacks
            .iter()
            .find(|s| s.constraint_id == constraint_id)
            .map(|s| s.slack)
    }

    pub fn tax_for_account(&self, account: Option<&str>) -> Option<&TaxOutput> {
        self.tax.iter().find(|t| t.account.as_deref() == account)
    }
}

pub struct SolverGateway<B: SolverBackend> {
    backend: Arc<B>,
    timeout: Duration,
}

impl<B: SolverBackend> SolverGateway<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            timeout: DEFAULT_SOLVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Assemble `request` and solve it. Assembly failures surface as
    /// `GatewayError::Validation` with every violation attached.
    pub async fn assemble_and_solve(&self, request: &RebalanceRequest) -> Result<SolveOutcome, GatewayError> {
        let spec = assemble(request)?;
        self.solve(&spec).await
    }

    pub async fn solve(&self, spec: &Specification) -> Result<SolveOutcome, GatewayError> {
        let started = Instant::now();
        let request = encode_request(spec, Utc::now())?;

        let backend = Arc::clone(&self.backend);
        let worker = tokio::task::spawn_blocking(move || backend.solve(&request));

        let raw = match tokio::time::timeout(self.timeout, worker).await {
            Err(_) => {
                warn!(
                    request_id = %spec.request_id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "solver timed out"
                );
                return Err(GatewayError::Timeout {
                    after: self.timeout,
                });
            }
            Ok(Err(join)) => {
                return Err(GatewayError::Internal {
                    message: format!("solver worker failed: {join}"),
                })
            }
            Ok(Ok(Err(failure))) => {
                return Err(GatewayError::Internal {
                    message: failure.to_string(),
                })
            }
            Ok(Ok(Ok(bytes))) => bytes,
        };

        let response = decode_response(&raw)?;
        let elapsed = started.elapsed();
        info!(
            request_id = %spec.request_id(),
            elapsed_ms = elapsed.as_millis() as u64,
            status = ?response.status.code,
            "solver responded"
        );
        interpret(spec, response, elapsed)
    }
}

/// Map a decoded response onto the outcome / error taxonomy.
fn interpret(spec: &Specification, response: SolveResponse, elapsed: Duration) -> Result<SolveOutcome, GatewayError> {
    if response.request_id != spec.request_id() {
        return Err(GatewayError::Internal {
            message: format!(
                "response request_id {} does not match {}",
                response.request_id,
                spec.request_id()
            ),
        });
    }

    let message = response.status.message;
    match response.status.code {
        StatusCode::Ok => {}
        StatusCode::Infeasible => {
            return Err(GatewayError::Infeasible {
                message,
                slacks: response.slacks,
            })
        }
        StatusCode::LicenseError => return Err(GatewayError::License { message }),
        StatusCode::ValidationError => {
            return Err(GatewayError::Validation {
                message,
                violations: Vec::new(),
            })
        }
        StatusCode::InternalError => return Err(GatewayError::Internal { message }),
    }

    for unit in spec.units() {
        if !response.portfolios.iter().any(|p| covers(unit, p)) {
            return Err(GatewayError::Internal {
                message: format!("response has no optimal portfolio for {}", unit.label()),
            });
        }
    }

    Ok(SolveOutcome {
        request_id: response.request_id,
        spec_hash: spec.spec_hash().to_string(),
        portfolios: response.portfolios,
        slacks: response.slacks,
        tax: response.tax,
        log: response.status.log,
        elapsed,
    })
}

fn covers(unit: &AssembledUnit, p: &OptimalPortfolio) -> bool {
    p.account == unit.account && p.period == unit.period
}
