//! Typed view of the merged configuration and how it fills in a request.
//!
//! Config values are defaults only: anything the request already states wins.
//!
//! ```yaml
//! job:
//!   base_value: 1000000
//!   cashflow_weight: 0.0
//! tax:
//!   default_rule: { enable_two_rate: true, long_term_rate: 0.15, short_term_rate: 0.35 }
//!   selling_order: FIFO
//! gateway:
//!   timeout_secs: 300
//!   license_env: REBAL_SOLVER_LICENSE
//! validation:
//!   psd_tolerance: 1.0e-10
//! multi_account:
//!   joint_tax_limit: 40.0
//! multi_period:
//!   cross_period_turnover: 0.3
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rebal_assembly::{AssemblyOptions, RebalanceProfile, RebalanceRequest, DEFAULT_PSD_TOLERANCE};
use rebal_constraints::{families, ConstraintCatalog, ConstraintKind, Side};
use rebal_tax::{SellingOrder, SellingOrderTable, TaxRule, TaxRuleResolver, WILDCARD};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LICENSE_ENV: &str = "REBAL_SOLVER_LICENSE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSection {
    pub base_value: Option<f64>,
    pub cashflow_weight: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxSection {
    /// Catch-all `(*, *)` rule for tax-aware units that bring none.
    pub default_rule: Option<TaxRule>,
    pub selling_order: Option<SellingOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub timeout_secs: u64,
    /// Name of the env var holding the solver license (never the license itself).
    pub license_env: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            license_env: DEFAULT_LICENSE_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub psd_tolerance: f64,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            psd_tolerance: DEFAULT_PSD_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiAccountSection {
    /// Upper bound for a joint tax limit on every account group without one.
    pub joint_tax_limit: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiPeriodSection {
    /// Upper bound on total turnover summed over all periods.
    pub cross_period_turnover: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub job: JobSection,
    pub tax: TaxSection,
    pub gateway: GatewaySection,
    pub validation: ValidationSection,
    pub multi_account: MultiAccountSection,
    pub multi_period: MultiPeriodSection,
}

impl RunConfig {
    /// Unknown top-level keys are ignored here; `report_unused_keys` flags them.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: RunConfig =
            serde_json::from_value(config_json.clone()).context("CONFIG_INVALID: run config does not parse")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if let Some(b) = self.job.base_value {
            if !(b.is_finite() && b > 0.0) {
                bail!("CONFIG_INVALID field=/job/base_value reason=must be finite and > 0");
            }
        }
        if let Some(rule) = &self.tax.default_rule {
            if let Err(reason) = rule.validate() {
                bail!("CONFIG_INVALID field=/tax/default_rule reason={reason}");
            }
        }
        if self.gateway.timeout_secs == 0 {
            bail!("CONFIG_INVALID field=/gateway/timeout_secs reason=must be > 0");
        }
        if self.gateway.license_env.trim().is_empty() {
            bail!("CONFIG_INVALID field=/gateway/license_env reason=must name an env var");
        }
        let tol = self.validation.psd_tolerance;
        if !(tol.is_finite() && tol > 0.0) {
            bail!("CONFIG_INVALID field=/validation/psd_tolerance reason=must be finite and > 0");
        }
        Ok(())
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_secs)
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            psd_tolerance: self.validation.psd_tolerance,
        }
    }

    pub fn default_tax_rules(&self) -> Option<TaxRuleResolver> {
        let rule = self.tax.default_rule?;
        let mut t = TaxRuleResolver::new();
        t.add_rule(WILDCARD, WILDCARD, rule).ok()?;
        Some(t)
    }

    fn default_selling_orders(&self) -> Option<SellingOrderTable> {
        let order = self.tax.selling_order?;
        let mut t = SellingOrderTable::new();
        t.add_rule(WILDCARD, WILDCARD, order).ok()?;
        Some(t)
    }

    /// Fill the gaps of `request` with configured defaults.
    ///
    /// Tax rules land where the assembler would look last: account groups
    /// without rules, and profiles of units no group covers.
    pub fn apply(&self, mut request: RebalanceRequest) -> RebalanceRequest {
        if request.job.base_value.is_none() {
            request.job.base_value = self.job.base_value;
        }
        if let Some(w) = self.job.cashflow_weight {
            if request.job.cashflow_weight == 0.0 {
                request.job.cashflow_weight = w;
            }
        }

        let rules = self.default_tax_rules();
        let orders = self.default_selling_orders();
        let fill = |p: &mut RebalanceProfile, with_rules: bool| {
            if with_rules && p.tax_rules.is_none() {
                p.tax_rules = rules.clone();
            }
            if p.selling_orders.is_none() {
                p.selling_orders = orders.clone();
            }
        };

        for g in &mut request.account_groups {
            if g.tax_rules.is_none() {
                g.tax_rules = rules.clone();
            }
            if let Some(limit) = self.multi_account.joint_tax_limit {
                add_missing(&mut g.catalog, |k| matches!(k, ConstraintKind::TaxLimit), || {
                    families::tax_limit().with_upper(limit)
                });
            }
        }

        if request.accounts.is_empty() {
            fill(&mut request.profile, true);
        } else {
            let base = request.profile.clone();
            let grouped: Vec<bool> = request
                .accounts
                .iter()
                .map(|a| a.group.as_deref().is_some_and(|g| request.account_group(g).is_some()))
                .collect();
            for (a, in_group) in request.accounts.iter_mut().zip(grouped) {
                let p = a.profile.get_or_insert_with(|| base.clone());
                fill(p, !in_group);
            }
        }
        for p in &mut request.periods {
            fill(&mut p.profile, true);
        }

        if let Some(limit) = self.multi_period.cross_period_turnover {
            if !request.periods.is_empty() {
                add_missing(
                    &mut request.cross_period,
                    |k| matches!(k, ConstraintKind::Turnover { cross_period: true, .. }),
                    || families::cross_period_turnover(Side::Total).with_upper(limit),
                );
            }
        }

        request
    }
}

fn add_missing<P, F>(catalog: &mut ConstraintCatalog, present: P, make: F)
where
    P: Fn(&ConstraintKind) -> bool,
    F: FnOnce() -> rebal_constraints::ConstraintInfo,
{
    if !catalog.constraints().iter().any(|c| present(&c.kind)) {
        *catalog = std::mem::take(catalog).with(make());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_assembly::{AccountGroup, AccountSpec, PeriodSpec};
    use rebal_model::{AssetUniverse, PortfolioLedger};

    fn cfg(json: Value) -> RunConfig {
        RunConfig::from_json(&json).unwrap()
    }

    fn request() -> RebalanceRequest {
        RebalanceRequest::new(AssetUniverse::new(), PortfolioLedger::new(), RebalanceProfile::new("base"))
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let c = cfg(serde_json::json!({}));
        assert_eq!(c, RunConfig::default());
        assert_eq!(c.gateway_timeout(), Duration::from_secs(300));
        assert_eq!(c.assembly_options(), AssemblyOptions::default());
        assert!(c.default_tax_rules().is_none());
    }

    #[test]
    fn invalid_values_are_rejected_with_field() {
        let err = RunConfig::from_json(&serde_json::json!({"gateway": {"timeout_secs": 0}})).unwrap_err();
        assert!(err.to_string().contains("/gateway/timeout_secs"));
        let err = RunConfig::from_json(&serde_json::json!({
            "tax": {"default_rule": {"enable_two_rate": false, "long_term_rate": 1.5, "short_term_rate": 0.2}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("/tax/default_rule"));
    }

    #[test]
    fn request_values_win_over_config() {
        let c = cfg(serde_json::json!({"job": {"base_value": 10.0, "cashflow_weight": 0.5}}));
        let r = c.apply(request());
        assert_eq!(r.job.base_value, Some(10.0));
        assert_eq!(r.job.cashflow_weight, 0.5);

        let mut explicit = request();
        explicit.job.base_value = Some(99.0);
        assert_eq!(c.apply(explicit).job.base_value, Some(99.0));
    }

    #[test]
    fn grouped_accounts_take_rules_from_their_group() {
        let c = cfg(serde_json::json!({
            "tax": {
                "default_rule": {"enable_two_rate": true, "long_term_rate": 0.15, "short_term_rate": 0.35},
                "selling_order": "HIFO"
            },
            "multi_account": {"joint_tax_limit": 40.0}
        }));
        let r = c.apply(
            request()
                .with_account(AccountSpec::new("A1", "P1").in_group("G"))
                .with_account(AccountSpec::new("A2", "P2"))
                .with_account_group(AccountGroup::new("G")),
        );
        let a1 = r.accounts[0].profile.as_ref().unwrap();
        let a2 = r.accounts[1].profile.as_ref().unwrap();
        assert!(a1.tax_rules.is_none());
        assert!(a1.selling_orders.is_some());
        assert!(a2.tax_rules.is_some());
        assert!(r.account_groups[0].tax_rules.is_some());
        assert_eq!(r.account_groups[0].catalog.len(), 1);

        let again = c.apply(r.clone());
        assert_eq!(again.account_groups[0].catalog.len(), 1);
    }

    #[test]
    fn cross_period_turnover_only_for_periods() {
        let c = cfg(serde_json::json!({"multi_period": {"cross_period_turnover": 0.3}}));
        assert!(c.apply(request()).cross_period.is_empty());
        let r = c.apply(request().with_period(PeriodSpec::new(1, RebalanceProfile::new("p1"))));
        assert_eq!(r.cross_period.len(), 1);
    }
}
