//! The solver seam.
//!
//! A backend is one blocking request/response exchange: encoded
//! specification in, encoded `SolveResponse` out. Transport failures come
//! back as `BackendFailure`; solver-level outcomes (infeasible, license, ...)
//! travel inside the response status.

use std::fmt;

/// Transport-level failure of a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub message: String,
}

impl BackendFailure {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BACKEND_FAILURE: {}", self.message)
    }
}

impl std::error::Error for BackendFailure {}

/// Implemented by whatever actually runs the optimization (native solver
/// binding, remote service client, scripted test double).
///
/// Called from a blocking worker thread; may block for as long as it likes.
/// The gateway stops waiting at its timeout.
pub trait SolverBackend: Send + Sync + 'static {
    fn solve(&self, request: &[u8]) -> Result<Vec<u8>, BackendFailure>;
}

impl<B: SolverBackend + ?Sized> SolverBackend for Box<B> {
    fn solve(&self, request: &[u8]) -> Result<Vec<u8>, BackendFailure> {
        (**self).solve(request)
    }
}
