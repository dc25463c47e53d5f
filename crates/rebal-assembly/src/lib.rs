//! rebal-assembly
//!
//! Turns a mutable `RebalanceRequest` into an immutable, hashed `Specification`:
//! - single-portfolio, multi-account and multi-period topologies
//! - every reference, bound, rule and matrix checked before anything is frozen
//! - all violations reported together; no partial specification ever exists
//! - deterministic `spec_hash` / `request_id` over canonical JSON
//!
//! No solver wiring and no IO.
mod assembler;
mod violation;

pub mod profile;
pub mod request;

pub use assembler::{
    assemble, assemble_with, AssembledGroup, AssembledUnit, AssemblyOptions, ResolvedCatalog,
    Specification, SpecificationBody, DEFAULT_PSD_TOLERANCE,
};
pub use profile::{CovarianceForm, CovarianceTerm, JobParams, RebalanceProfile, RiskTerm, Utility};
pub use request::{AccountGroup, AccountSpec, PeriodSpec, RebalanceRequest, Topology};
pub use violation::{ValidationError, Violation};
