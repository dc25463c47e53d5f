//! Scenario: secret literals are refused and unused keys are reported per run mode.
//!
//! GREEN when:
//! - a literal license string anywhere in the config fails with
//!   CONFIG_SECRET_DETECTED and the message never echoes the value;
//! - an env var name in `/gateway/license_env` loads fine;
//! - `/multi_period` keys are unused in MULTI_ACCOUNT mode and consumed in
//!   MULTI_PERIOD mode;
//! - WARN returns the report, FAIL errors with CONFIG_UNUSED_KEYS.

use rebal_config::{load_layered_yaml_from_strings, report_unused_keys, RunMode, UnusedKeyPolicy};

const WITH_SECRET: &str = r#"
gateway:
  license_env: "LIC-8842-ACME-PROD-KEY"
"#;

const WITH_ENV_NAME: &str = r#"
gateway:
  license_env: "REBAL_SOLVER_LICENSE"
"#;

const MIXED: &str = r#"
job:
  base_value: 1000000
multi_account:
  joint_tax_limit: 40
multi_period:
  cross_period_turnover: 0.3
reporting:
  verbose: true
"#;

#[test]
fn literal_secret_is_rejected_without_echo() {
    let err = load_layered_yaml_from_strings(&[WITH_SECRET]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_SECRET_DETECTED"));
    assert!(msg.contains("/gateway/license_env"));
    assert!(!msg.contains("ACME"));

    let ok = load_layered_yaml_from_strings(&[WITH_ENV_NAME]).unwrap();
    assert!(ok.canonical_json.contains("REBAL_SOLVER_LICENSE"));
}

#[test]
fn secret_in_overlay_is_caught_too() {
    let err = load_layered_yaml_from_strings(&[WITH_ENV_NAME, WITH_SECRET]).unwrap_err();
    assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"));
}

#[test]
fn unused_keys_depend_on_mode() {
    let loaded = load_layered_yaml_from_strings(&[MIXED]).unwrap();

    let ma = report_unused_keys(RunMode::MultiAccount, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        ma.unused_leaf_pointers,
        vec![
            "/multi_period/cross_period_turnover".to_string(),
            "/reporting/verbose".to_string()
        ]
    );

    let mp = report_unused_keys(RunMode::MultiPeriod, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        mp.unused_leaf_pointers,
        vec![
            "/multi_account/joint_tax_limit".to_string(),
            "/reporting/verbose".to_string()
        ]
    );
    assert_eq!(mp.mode, "MULTI_PERIOD");

    let err = report_unused_keys(RunMode::Single, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS (mode=SINGLE)"));
    assert!(msg.contains("3 unused"));
}

#[test]
fn clean_config_passes_fail_policy() {
    let loaded = load_layered_yaml_from_strings(&[WITH_ENV_NAME]).unwrap();
    let r = report_unused_keys(RunMode::Single, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(r.is_clean());
}
