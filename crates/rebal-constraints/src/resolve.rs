//! Relative-mode bound resolution.
//!
//! resolved = ABSOLUTE → raw
//!            PLUS     → raw + reference.functional(target)
//!            MULTIPLE → raw × reference.functional(target)
//!
//! applied independently to lower and upper. A missing bound stays
//! unbounded and is never shifted.

use serde::{Deserialize, Serialize};

use rebal_model::ConstraintId;

use crate::eval::{EvalContext, EvalError};
use crate::info::{Bound, ConstraintInfo, RelativeMode};

/// Bounds after relative-mode application. `None` = unbounded on that side.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ResolvedBounds {
    pub fn contains(&self, value: f64, eps: f64) -> bool {
        self.lower.map_or(true, |lo| value >= lo - eps) && self.upper.map_or(true, |hi| value <= hi + eps)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundError {
    MissingReference {
        id: ConstraintId,
    },
    UnknownReference {
        id: ConstraintId,
        portfolio: String,
    },
    RelativeModeUnsupported {
        id: ConstraintId,
        family: &'static str,
    },
    Evaluation {
        id: ConstraintId,
        source: EvalError,
    },
    NonFinite {
        id: ConstraintId,
    },
    Inconsistent {
        id: ConstraintId,
        lower: f64,
        upper: f64,
    },
}

impl BoundError {
    pub fn constraint_id(&self) -> &ConstraintId {
        match self {
            Self::MissingReference { id }
            | Self::UnknownReference { id, .. }
            | Self::RelativeModeUnsupported { id, .. }
            | Self::Evaluation { id, .. }
            | Self::NonFinite { id }
            | Self::Inconsistent { id, .. } => id,
        }
    }
}

impl std::fmt::Display for BoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingReference { id } => {
                write!(f, "constraint '{id}': relative bound without a reference portfolio")
            }
            Self::UnknownReference { id, portfolio } => write!(
                f,
                "constraint '{id}': reference portfolio '{portfolio}' does not exist"
            ),
            Self::RelativeModeUnsupported { id, family } => write!(
                f,
                "constraint '{id}': family '{family}' only accepts ABSOLUTE bounds"
            ),
            Self::Evaluation { id, source } => {
                write!(f, "constraint '{id}': reference evaluation failed: {source}")
            }
            Self::NonFinite { id } => write!(f, "constraint '{id}': bound is not finite"),
            Self::Inconsistent { id, lower, upper } => write!(
                f,
                "constraint '{id}': resolved lower {lower} exceeds resolved upper {upper}"
            ),
        }
    }
}

impl std::error::Error for BoundError {}

pub fn apply_mode(raw: f64, mode: RelativeMode, reference_value: f64) -> f64 {
    match mode {
        RelativeMode::Absolute => raw,
        RelativeMode::Plus => raw + reference_value,
        RelativeMode::Multiple => raw * reference_value,
    }
}

/// Resolve both bounds of `info`.
///
/// The reference functional is evaluated only when a non-absolute mode is
/// present, so absolute bounds resolve to their raw values exactly.
pub fn resolve_bounds(info: &ConstraintInfo, ctx: &EvalContext<'_>) -> Result<ResolvedBounds, BoundError> {
    let id = &info.id;

    for b in [info.lower, info.upper].iter().flatten() {
        if !b.value.is_finite() {
            return Err(BoundError::NonFinite { id: id.clone() });
        }
    }

    let reference_value = if info.is_relative() {
        let pid = info
            .reference
            .as_ref()
            .ok_or_else(|| BoundError::MissingReference { id: id.clone() })?;
        let reference = ctx
            .portfolio(pid.as_str())
            .map_err(|_| BoundError::UnknownReference {
                id: id.clone(),
                portfolio: pid.to_string(),
            })?;
        match ctx.evaluate(&info.kind, reference, None) {
            Ok(v) => v,
            Err(EvalError::NotPortfolioFunctional { family })
            | Err(EvalError::NeedsInitialPortfolio { family }) => {
                return Err(BoundError::RelativeModeUnsupported {
                    id: id.clone(),
                    family,
                })
            }
            Err(source) => {
                return Err(BoundError::Evaluation {
                    id: id.clone(),
                    source,
                })
            }
        }
    } else {
        0.0
    };

    let side = |b: Option<Bound>| b.map(|b| apply_mode(b.value, b.mode, reference_value));
    let resolved = ResolvedBounds {
        lower: side(info.lower),
        upper: side(info.upper),
    };

    if let (Some(lo), Some(hi)) = (resolved.lower, resolved.upper) {
        if lo > hi {
            return Err(BoundError::Inconsistent {
                id: id.clone(),
                lower: lo,
                upper: hi,
            });
        }
    }
    Ok(resolved)
}
