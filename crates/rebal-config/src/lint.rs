//! Unused-key lint.
//!
//! Each topology reads a fixed set of top-level sections through
//! `RunConfig`. A scalar outside every section the run reads is unused:
//! a `/multi_period` key in a multi-account job is most likely a mistake.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pointer::{covers, scalar_leaves};

/// Sections every topology reads.
const SHARED_SECTIONS: [&str; 4] = ["/gateway", "/job", "/tax", "/validation"];

/// Unused pointers named in a `Fail` error.
const ERROR_PREVIEW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Single,
    MultiAccount,
    MultiPeriod,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Single => "SINGLE",
            RunMode::MultiAccount => "MULTI_ACCOUNT",
            RunMode::MultiPeriod => "MULTI_PERIOD",
        }
    }

    /// Sorted.
    pub fn read_sections(&self) -> Vec<&'static str> {
        let own = match self {
            RunMode::Single => None,
            RunMode::MultiAccount => Some("/multi_account"),
            RunMode::MultiPeriod => Some("/multi_period"),
        };
        let mut sections: Vec<&'static str> = SHARED_SECTIONS.iter().copied().chain(own).collect();
        sections.sort_unstable();
        sections
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Sections the mode reads, sorted.
    pub consumed_prefixes: Vec<String>,
    /// Sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// `Warn` always returns the report; `Fail` errors when anything is unused.
pub fn report_unused_keys(mode: RunMode, config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let sections = mode.read_sections();
    let mut unused: Vec<String> = scalar_leaves(config_json)
        .into_iter()
        .map(|(pointer, _)| pointer)
        .filter(|pointer| !sections.iter().any(|s| covers(s, pointer)))
        .collect();
    unused.sort();
    unused.dedup();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        let preview: Vec<&str> = unused.iter().take(ERROR_PREVIEW).map(String::as_str).collect();
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} unused key(s) for this topology: {}",
            mode.as_str(),
            unused.len(),
            preview.join(", ")
        );
    }

    Ok(UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes: sections.into_iter().map(str::to_string).collect(),
        unused_leaf_pointers: unused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_topology_reads_its_own_section() {
        assert_eq!(RunMode::Single.read_sections(), SHARED_SECTIONS.to_vec());
        assert!(RunMode::MultiAccount.read_sections().contains(&"/multi_account"));
        assert!(!RunMode::MultiAccount.read_sections().contains(&"/multi_period"));
    }

    #[test]
    fn warn_reports_without_failing() {
        let cfg = serde_json::json!({"job": {"base_value": 1}, "multi_account": {"joint_tax_limit": 4}});
        let r = report_unused_keys(RunMode::Single, &cfg, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(r.unused_leaf_pointers, vec!["/multi_account/joint_tax_limit".to_string()]);
        assert!(!r.is_clean());
    }
}
