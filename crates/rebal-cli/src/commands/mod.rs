//! Command handler modules for the `rebal` CLI.
//!
//! Shared loading helpers live here; command-specific logic lives in the
//! submodules.

pub mod lots;
pub mod validate;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rebal_assembly::{RebalanceRequest, Topology};
use rebal_config::{LoadedConfig, RunConfig, RunMode};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Read a problem file; the extension picks JSON or YAML.
pub fn load_problem(path: &str) -> Result<RebalanceRequest> {
    let raw = fs::read_to_string(path).with_context(|| format!("read problem failed: {path}"))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => serde_json::from_str(&raw).with_context(|| format!("problem is not valid JSON: {path}")),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&raw).with_context(|| format!("problem is not valid YAML: {path}"))
        }
        _ => bail!("unsupported problem file '{path}'. expected .json, .yaml or .yml"),
    }
}

/// No paths means no config layer: `RunConfig` defaults apply.
pub fn load_config(paths: &[String]) -> Result<Option<(LoadedConfig, RunConfig)>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = rebal_config::load_layered_yaml(&path_refs)?;
    let run_config = loaded.run_config()?;
    Ok(Some((loaded, run_config)))
}

pub fn run_mode(topology: Topology) -> RunMode {
    match topology {
        Topology::Single => RunMode::Single,
        Topology::MultiAccount => RunMode::MultiAccount,
        Topology::MultiPeriod => RunMode::MultiPeriod,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("problem.toml");
        fs::write(&p, "x = 1").unwrap();
        let err = load_problem(p.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("unsupported problem file"));
    }

    #[test]
    fn no_config_paths_means_no_config() {
        assert!(load_config(&[]).unwrap().is_none());
    }
}
