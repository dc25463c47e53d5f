//! rebal-gateway
//!
//! Boundary between assembled specifications and whatever solves them:
//! - `SolverBackend`: blocking bytes-in / bytes-out seam
//! - `SolverGateway`: encode, call on a blocking worker with a timeout, decode, interpret
//! - `GatewayError`: validation / infeasible / license / internal / timeout / codec
//! - `run_batch`: sequential jobs, stopped by a fatal (license) error
mod backend;
mod batch;
mod error;
mod gateway;

pub mod codec;

pub use backend::{BackendFailure, SolverBackend};
pub use batch::{run_batch, BatchEntry, BatchReport};
pub use error::GatewayError;
pub use gateway::{SolveOutcome, SolverGateway, DEFAULT_SOLVE_TIMEOUT};
