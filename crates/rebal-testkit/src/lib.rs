//! rebal-testkit
//!
//! Shared test support for the workspace:
//! - tutorial-sized fixtures (universe, risk model, ledger, tax rules, requests)
//! - `ScriptedSolver`, a `SolverBackend` that reports like a solver without optimizing
//! - helpers to write requests to disk for CLI scenarios

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use rebal_assembly::RebalanceRequest;

pub mod fixtures;
mod solver;

pub use solver::{weights, ScriptedSolver, Weights};

/// Pretty JSON, the format `rebal validate --problem` reads.
pub fn write_request_json(request: &RebalanceRequest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(request).context("serialize request")?;
    fs::write(path, json).with_context(|| format!("write request: {}", path.display()))?;
    Ok(())
}

pub fn load_request_json(path: &Path) -> Result<RebalanceRequest> {
    let s = fs::read_to_string(path).with_context(|| format!("read request: {}", path.display()))?;
    let req = serde_json::from_str(&s).context("parse request json")?;
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_survives_disk() {
        let dir = std::env::temp_dir().join(format!("rebal-testkit-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("req.json");
        let req = fixtures::tax_aware_request().unwrap();
        write_request_json(&req, &path).unwrap();
        let back = load_request_json(&path).unwrap();
        assert_eq!(back.initial_portfolio, req.initial_portfolio);
        assert_eq!(back.topology(), req.topology());
        assert_eq!(
            back.ledger.portfolio(fixtures::TAX_LOTS).unwrap().lots().len(),
            req.ledger.portfolio(fixtures::TAX_LOTS).unwrap().lots().len()
        );
        fs::remove_dir_all(&dir).unwrap();
    }
}
