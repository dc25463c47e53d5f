//! rebal-config
//!
//! Run configuration for rebalance jobs, read from YAML layers:
//! - `layering`: documents merged in order, later ones win; credential
//!   literals refused; canonical JSON and SHA-256 `config_hash`
//! - `lint`: keys the job's topology never reads, reported or fatal
//! - `run_config`: the typed view applied onto a `RebalanceRequest`
//! - `secrets`: the solver license, looked up through an env var name

mod layering;
mod lint;
mod pointer;
mod run_config;
pub mod secrets;

pub use layering::{load_layered_yaml, load_layered_yaml_from_strings, LoadedConfig};
pub use lint::{report_unused_keys, RunMode, UnusedKeyPolicy, UnusedKeyReport};
pub use run_config::{
    GatewaySection, JobSection, MultiAccountSection, MultiPeriodSection, RunConfig, TaxSection, ValidationSection,
};
