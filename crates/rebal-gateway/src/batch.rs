//! Sequential multi-job driver.
//!
//! Jobs run one after another. A fatal error (license) stops the batch and
//! every job not yet started is reported as skipped.

use tracing::{error, info};
use uuid::Uuid;

use rebal_assembly::Specification;

use crate::backend::SolverBackend;
use crate::error::GatewayError;
use crate::gateway::{SolveOutcome, SolverGateway};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub request_id: Uuid,
    pub result: Result<SolveOutcome, GatewayError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub skipped: Vec<Uuid>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &SolveOutcome> + '_ {
        self.entries.iter().filter_map(|e| e.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Uuid, &GatewayError)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.result.as_ref().err().map(|err| (&e.request_id, err)))
    }

    /// The fatal error that stopped the batch, if any.
    pub fn aborted_by(&self) -> Option<&GatewayError> {
        self.failed().map(|(_, e)| e).find(|e| e.is_fatal())
    }
}

pub async fn run_batch<B: SolverBackend>(gateway: &SolverGateway<B>, specs: &[Specification]) -> BatchReport {
    let mut report = BatchReport::default();

    for (i, spec) in specs.iter().enumerate() {
        let result = gateway.solve(spec).await;
        let fatal = matches!(&result, Err(e) if e.is_fatal());
        report.entries.push(BatchEntry {
            request_id: spec.request_id(),
            result,
        });
        if fatal {
            report.skipped = specs[i + 1..].iter().map(|s| s.request_id()).collect();
            error!(
                request_id = %spec.request_id(),
                skipped = report.skipped.len(),
                "batch aborted on fatal solver error"
            );
            return report;
        }
    }

    info!(
        jobs = specs.len(),
        failed = report.failed().count(),
        "batch complete"
    );
    report
}
