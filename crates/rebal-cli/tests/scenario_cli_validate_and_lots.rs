//! Scenario: the `rebal` binary validates problems and simulates lot sales.
//!
//! GREEN when:
//! - `validate` on the tutorial problem prints `valid=true` with its request id;
//! - a tax-aware problem without tax rules fails with `valid=false` and the
//!   missing-rules violation, then passes once a config default rule is layered in;
//! - `--unused-keys fail` rejects config keys the run mode never reads;
//! - `lots` on the tax-lot portfolio prints the FIFO gains and the two-rate tax;
//! - `config-hash` is stable across runs.

use std::fs;
use std::path::Path;

use predicates::prelude::*;
use rebal_testkit::fixtures;
use rebal_testkit::write_request_json;

fn rebal() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("rebal").unwrap()
}

fn write(dir: &Path, name: &str, body: &str) -> String {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p.to_str().unwrap().to_string()
}

#[test]
fn validate_tutorial_problem() {
    let dir = tempfile::tempdir().unwrap();
    let problem = dir.path().join("tutorial.json");
    write_request_json(&fixtures::tutorial_request().unwrap(), &problem).unwrap();
    let out = dir.path().join("spec.json");

    rebal()
        .args(["validate", "--problem", problem.to_str().unwrap()])
        .args(["--out", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid=true"))
        .stdout(predicate::str::contains("request_id="))
        .stdout(predicate::str::contains("topology=SINGLE"));

    let spec: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(spec["topology"], "SINGLE");
    assert_eq!(spec["units"].as_array().unwrap().len(), 1);
}

#[test]
fn missing_tax_rules_fail_until_config_supplies_them() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = fixtures::tax_aware_request().unwrap();
    req.profile.tax_rules = None;
    let problem = dir.path().join("tax.json");
    write_request_json(&req, &problem).unwrap();

    rebal()
        .args(["validate", "--problem", problem.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("valid=false"))
        .stdout(predicate::str::contains("violation="));

    let cfg = write(
        dir.path(),
        "tax.yaml",
        "tax:\n  default_rule: { enable_two_rate: true, long_term_rate: 0.15, short_term_rate: 0.35 }\n",
    );
    rebal()
        .args(["validate", "--problem", problem.to_str().unwrap(), "--config", &cfg])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("tax_aware=true"));
}

#[test]
fn unused_keys_fail_policy_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let problem = dir.path().join("tutorial.json");
    write_request_json(&fixtures::tutorial_request().unwrap(), &problem).unwrap();
    let cfg = write(dir.path(), "extra.yaml", "multi_period:\n  cross_period_turnover: 0.3\n");

    rebal()
        .args(["validate", "--problem", problem.to_str().unwrap(), "--config", &cfg])
        .assert()
        .success()
        .stdout(predicate::str::contains("unused_key=/multi_period/cross_period_turnover"));

    rebal()
        .args(["validate", "--problem", problem.to_str().unwrap(), "--config", &cfg])
        .args(["--unused-keys", "fail"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn lots_prints_fifo_gains_and_tax() {
    let dir = tempfile::tempdir().unwrap();
    let problem = dir.path().join("tax.json");
    write_request_json(&fixtures::tax_aware_request().unwrap(), &problem).unwrap();

    rebal()
        .args(["lots", "--problem", problem.to_str().unwrap()])
        .args(["--portfolio", fixtures::TAX_LOTS, "--asset", "USA13Y1"])
        .args(["--shares", "55", "--price", "34.19"])
        .assert()
        .success()
        .stdout(predicate::str::contains("long_term_net=380.00"))
        .stdout(predicate::str::contains("short_term_net=535.15"))
        .stdout(predicate::str::contains("tax=318.72"))
        .stdout(predicate::str::contains("remaining_shares=0"));
}

#[test]
fn lots_rejects_overselling() {
    let dir = tempfile::tempdir().unwrap();
    let problem = dir.path().join("tax.json");
    write_request_json(&fixtures::tax_aware_request().unwrap(), &problem).unwrap();

    rebal()
        .args(["lots", "--problem", problem.to_str().unwrap()])
        .args(["--portfolio", fixtures::TAX_LOTS, "--asset", "USA13Y1"])
        .args(["--shares", "56", "--price", "34.19"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sale of 56 'USA13Y1' failed"));
}

#[test]
fn config_hash_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let base = write(dir.path(), "base.yaml", "job:\n  base_value: 1000000\n");
    let desk = write(dir.path(), "desk.yaml", "gateway:\n  timeout_secs: 60\n");

    let first = rebal().args(["config-hash", &base, &desk]).assert().success();
    let second = rebal().args(["config-hash", &base, &desk]).assert().success();
    let line = |o: &assert_cmd::assert::Assert| {
        String::from_utf8(o.get_output().stdout.clone())
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string()
    };
    assert!(line(&first).starts_with("config_hash="));
    assert_eq!(line(&first), line(&second));
}
