//! rebal-constraints
//!
//! Every constraint family normalized to one contract:
//! - `ConstraintInfo`: id, family, bounds, relative modes, reference, softness
//! - builders per family with deterministic default ids
//! - relative-mode bound resolution (ABSOLUTE / PLUS / MULTIPLE)
//! - relaxation hierarchy across constraint categories
//! - ex-post checks of a finished portfolio
//! - scenario-based expected shortfall
//!
//! Pure deterministic logic; the solver enforces, this crate describes and audits.

mod eval;
mod info;
mod resolve;
mod shortfall;

pub mod catalog;
pub mod checks;
pub mod families;
pub mod hierarchy;

pub use catalog::{ConstraintCatalog, FiveTenForty, TransactionType};
pub use checks::{
    check_all, check_constraint, check_five_ten_forty, check_thresholds, CheckError,
    ConstraintViolation, CHECK_TOLERANCE,
};
pub use eval::{piecewise_value, EvalContext, EvalError};
pub use hierarchy::{ConstraintCategory, ConstraintHierarchy, Priority};
pub use info::{
    Bound, ConstraintInfo, ConstraintKind, CountTarget, GroupScope, Penalty, PenaltyShape,
    RelativeMode, RiskComponent, Side, SlopeSegment, ThresholdKind, validate_piecewise,
};
pub use resolve::{apply_mode, resolve_bounds, BoundError, ResolvedBounds};
pub use shortfall::ScenarioSet;
