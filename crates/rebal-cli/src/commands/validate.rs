//! `rebal validate`: assemble a problem without solving it.

use std::fs;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rebal_assembly::{assemble_with, AssemblyOptions};
use rebal_config::UnusedKeyPolicy;
use tracing::warn;

use super::{load_config, load_problem, run_mode};

pub fn run(problem: &str, config_paths: &[String], policy: UnusedKeyPolicy, out: Option<&str>) -> Result<()> {
    let mut request = load_problem(problem)?;
    let mut options = AssemblyOptions::default();

    if let Some((loaded, cfg)) = load_config(config_paths)? {
        println!("config_hash={}", loaded.config_hash);
        if let Some(topology) = request.topology() {
            let report = rebal_config::report_unused_keys(run_mode(topology), &loaded.config_json, policy)?;
            for p in &report.unused_leaf_pointers {
                warn!(pointer = %p, mode = %report.mode, "unused config key");
                println!("unused_key={p}");
            }
        }
        options = cfg.assembly_options();
        request = cfg.apply(request);
    }

    let spec = match assemble_with(&request, options) {
        Ok(spec) => spec,
        Err(e) => {
            println!("valid=false violations={}", e.len());
            for v in e.violations() {
                println!("violation={v}");
            }
            bail!("PROBLEM_INVALID: {} violation(s) in {problem}", e.len());
        }
    };

    println!("valid=true");
    println!("request_id={}", spec.request_id());
    println!("spec_hash={}", spec.spec_hash());
    println!("topology={}", run_mode(spec.topology()).as_str());
    println!("validated_at_utc={}", Utc::now().to_rfc3339());
    for unit in spec.units() {
        println!(
            "unit={} initial={} base_value={} tax_aware={} constraints={}",
            unit.label(),
            unit.initial_portfolio,
            unit.base_value,
            unit.is_tax_aware(),
            unit.constraints.catalog.len()
        );
    }

    if let Some(path) = out {
        let json = spec.canonical_json().context("serialize specification failed")?;
        fs::write(path, json).with_context(|| format!("write specification failed: {path}"))?;
        println!("spec_path={path}");
    }

    Ok(())
}
