use std::fmt;
use std::time::Duration;

use rebal_assembly::{ValidationError, Violation};
use rebal_schemas::SlackInfo;

/// Every way a solve can fail. Nothing here is retried automatically.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Rejected before or by the solver. `violations` is empty when the
    /// solver itself reported the problem.
    Validation {
        message: String,
        violations: Vec<Violation>,
    },
    Infeasible {
        message: String,
        slacks: Vec<SlackInfo>,
    },
    License { message: String },
    Internal { message: String },
    Timeout { after: Duration },
    Codec { message: String },
}

impl GatewayError {
    /// Nothing later in a batch can succeed either.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::License { .. })
    }

    /// Resubmitting the same specification may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Infeasible { .. } => "infeasible",
            Self::License { .. } => "license",
            Self::Internal { .. } => "internal",
            Self::Timeout { .. } => "timeout",
            Self::Codec { .. } => "codec",
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation {
                message,
                violations,
            } => {
                write!(f, "SOLVE_VALIDATION: {message}")?;
                for v in violations {
                    write!(f, "\n  - {v}")?;
                }
                Ok(())
            }
            Self::Infeasible { message, slacks } => {
                write!(f, "SOLVE_INFEASIBLE: {message} ({} slack entries)", slacks.len())
            }
            Self::License { message } => write!(f, "SOLVE_LICENSE: {message}"),
            Self::Internal { message } => write!(f, "SOLVE_INTERNAL: {message}"),
            Self::Timeout { after } => {
                write!(f, "SOLVE_TIMEOUT: no response after {}ms", after.as_millis())
            }
            Self::Codec { message } => write!(f, "SOLVE_CODEC: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<ValidationError> for GatewayError {
    fn from(e: ValidationError) -> Self {
        Self::Validation {
            message: format!("{} violation(s) found during assembly", e.len()),
            violations: e.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_license_is_fatal_and_only_timeout_retryable() {
        let all = [
            GatewayError::Validation {
                message: "x".into(),
                violations: Vec::new(),
            },
            GatewayError::Infeasible {
                message: "x".into(),
                slacks: Vec::new(),
            },
            GatewayError::License {
                message: "x".into(),
            },
            GatewayError::Internal {
                message: "x".into(),
            },
            GatewayError::Timeout {
                after: Duration::from_secs(1),
            },
            GatewayError::Codec {
                message: "x".into(),
            },
        ];
        let fatal: Vec<_> = all.iter().filter(|e| e.is_fatal()).map(|e| e.kind()).collect();
        let retry: Vec<_> = all.iter().filter(|e| e.is_retryable()).map(|e| e.kind()).collect();
        assert_eq!(fatal, vec!["license"]);
        assert_eq!(retry, vec!["timeout"]);
    }

    #[test]
    fn assembly_failure_keeps_every_violation() {
        let e: GatewayError = ValidationError(vec![
            Violation::MissingInitialPortfolio,
            Violation::MixedTopology,
        ])
        .into();
        let text = e.to_string();
        assert!(text.starts_with("SOLVE_VALIDATION: 2 violation(s)"));
        assert_eq!(text.lines().count(), 3);
    }
}
