//! Objective terms and per-profile settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rebal_constraints::{ConstraintCatalog, ConstraintHierarchy, ScenarioSet};
use rebal_model::{AssetId, PortfolioId, RiskModel, RiskModelId};
use rebal_tax::{SellingOrderTable, TaxRuleResolver};

/// One quadratic risk penalty in the utility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskTerm {
    pub risk_model: RiskModelId,
    /// Active risk against this portfolio; total risk when `None`.
    #[serde(default)]
    pub benchmark: Option<PortfolioId>,
    pub common_factor_aversion: f64,
    pub specific_aversion: f64,
}

impl RiskTerm {
    pub fn new<M: Into<RiskModelId>>(risk_model: M, common_factor_aversion: f64, specific_aversion: f64) -> Self {
        Self {
            risk_model: risk_model.into(),
            benchmark: None,
            common_factor_aversion,
            specific_aversion,
        }
    }

    pub fn against<P: Into<PortfolioId>>(mut self, benchmark: P) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }
}

/// Where the weight matrix W of a [`CovarianceTerm`] sits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CovarianceForm {
    /// (w−b)ᵀ·W·X·F·Xᵀ·W·(w−b), W diagonal over assets.
    Wxfxw,
    /// (w−b)ᵀ·X·W·F·W·Xᵀ·(w−b), W diagonal over factors.
    Xwfwx,
}

/// Extra factor-covariance penalty with a diagonal weight matrix. Ids missing
/// from `weights` weigh zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovarianceTerm {
    pub risk_model: RiskModelId,
    pub form: CovarianceForm,
    pub aversion: f64,
    #[serde(default)]
    pub benchmark: Option<PortfolioId>,
    /// Asset ids for `Wxfxw`, factor ids for `Xwfwx`.
    pub weights: BTreeMap<String, f64>,
}

impl CovarianceTerm {
    pub fn new<M, I, S>(risk_model: M, form: CovarianceForm, aversion: f64, weights: I) -> Self
    where
        M: Into<RiskModelId>,
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            risk_model: risk_model.into(),
            form,
            aversion,
            benchmark: None,
            weights: weights.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn against<P: Into<PortfolioId>>(mut self, benchmark: P) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }

    fn weight(&self, id: &str) -> f64 {
        self.weights.get(id).copied().unwrap_or(0.0)
    }

    /// The quadratic form on already-active weights, before the aversion.
    pub fn variance(&self, rm: &RiskModel, active: &BTreeMap<AssetId, f64>) -> f64 {
        let factors = rm.factors();
        let exposures: Vec<f64> = match self.form {
            CovarianceForm::Wxfxw => {
                let scaled: BTreeMap<AssetId, f64> = active
                    .iter()
                    .map(|(a, x)| (a.clone(), x * self.weight(a.as_str())))
                    .collect();
                factors
                    .iter()
                    .map(|f| rm.portfolio_exposure(&scaled, f.as_str()))
                    .collect()
            }
            CovarianceForm::Xwfwx => factors
                .iter()
                .map(|f| rm.portfolio_exposure(active, f.as_str()) * self.weight(f.as_str()))
                .collect(),
        };
        let mut var = 0.0;
        for (i, fi) in factors.iter().enumerate() {
            for (j, fj) in factors.iter().enumerate() {
                var += exposures[i] * rm.factor_covariance(fi, fj) * exposures[j];
            }
        }
        var
    }
}

/// Objective: alpha minus risk, transaction-cost and tax terms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utility {
    #[serde(default)]
    pub primary_risk: Option<RiskTerm>,
    #[serde(default)]
    pub secondary_risk: Option<RiskTerm>,
    pub alpha_weight: f64,
    pub transaction_cost_weight: f64,
    #[serde(default)]
    pub loss_benefit_weight: f64,
    #[serde(default)]
    pub covariance_terms: Vec<CovarianceTerm>,
    /// Multiplier on expected shortfall; needs the profile's scenarios when > 0.
    #[serde(default)]
    pub expected_shortfall_weight: f64,
}

impl Default for Utility {
    fn default() -> Self {
        Self {
            primary_risk: None,
            secondary_risk: None,
            alpha_weight: 1.0,
            transaction_cost_weight: 1.0,
            loss_benefit_weight: 0.0,
            covariance_terms: Vec::new(),
            expected_shortfall_weight: 0.0,
        }
    }
}

impl Utility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_risk(mut self, term: RiskTerm) -> Self {
        self.primary_risk = Some(term);
        self
    }

    pub fn with_secondary_risk(mut self, term: RiskTerm) -> Self {
        self.secondary_risk = Some(term);
        self
    }

    pub fn with_alpha_weight(mut self, w: f64) -> Self {
        self.alpha_weight = w;
        self
    }

    pub fn with_transaction_cost_weight(mut self, w: f64) -> Self {
        self.transaction_cost_weight = w;
        self
    }

    pub fn with_loss_benefit_weight(mut self, w: f64) -> Self {
        self.loss_benefit_weight = w;
        self
    }

    pub fn with_covariance_term(mut self, term: CovarianceTerm) -> Self {
        self.covariance_terms.push(term);
        self
    }

    pub fn with_expected_shortfall_weight(mut self, w: f64) -> Self {
        self.expected_shortfall_weight = w;
        self
    }

    pub fn risk_terms(&self) -> impl Iterator<Item = &RiskTerm> + '_ {
        self.primary_risk.iter().chain(self.secondary_risk.iter())
    }
}

/// Utility, constraints, relaxation order and tax tables of one case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RebalanceProfile {
    pub id: String,
    #[serde(default)]
    pub utility: Utility,
    #[serde(default)]
    pub catalog: ConstraintCatalog,
    #[serde(default)]
    pub hierarchy: ConstraintHierarchy,
    #[serde(default)]
    pub tax_rules: Option<TaxRuleResolver>,
    #[serde(default)]
    pub selling_orders: Option<SellingOrderTable>,
    /// Return scenarios for expected shortfall terms and constraints.
    #[serde(default)]
    pub expected_shortfall: Option<ScenarioSet>,
}

impl RebalanceProfile {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            utility: Utility::default(),
            catalog: ConstraintCatalog::default(),
            hierarchy: ConstraintHierarchy::default(),
            tax_rules: None,
            selling_orders: None,
            expected_shortfall: None,
        }
    }

    pub fn with_utility(mut self, utility: Utility) -> Self {
        self.utility = utility;
        self
    }

    pub fn with_catalog(mut self, catalog: ConstraintCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: ConstraintHierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn with_tax_rules(mut self, rules: TaxRuleResolver) -> Self {
        self.tax_rules = Some(rules);
        self
    }

    pub fn with_selling_orders(mut self, orders: SellingOrderTable) -> Self {
        self.selling_orders = Some(orders);
        self
    }

    pub fn with_expected_shortfall(mut self, scenarios: ScenarioSet) -> Self {
        self.expected_shortfall = Some(scenarios);
        self
    }
}

/// Run-wide numeric parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Currency value of the portfolio. Derived from lots when `None`.
    #[serde(default)]
    pub base_value: Option<f64>,
    #[serde(default)]
    pub cashflow_weight: f64,
    /// Passed through to the solver untouched.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_value(mut self, value: f64) -> Self {
        self.base_value = Some(value);
        self
    }

    pub fn with_cashflow_weight(mut self, w: f64) -> Self {
        self.cashflow_weight = w;
        self
    }

    pub fn with_option<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> RiskModel {
        let mut m = RiskModel::new("M2");
        m.set_factor_covariance("F1", "F1", 0.04);
        m.set_factor_covariance("F2", "F2", 0.09);
        m.set_factor_covariance("F1", "F2", 0.01);
        m.set_exposure("A", "F1", 1.0);
        m.set_exposure("B", "F2", 2.0);
        m
    }

    fn w(items: &[(&str, f64)]) -> BTreeMap<AssetId, f64> {
        items.iter().map(|(a, x)| (AssetId::new(*a), *x)).collect()
    }

    #[test]
    fn unit_asset_weights_give_factor_variance() {
        let rm = model();
        let active = w(&[("A", 0.5), ("B", 0.25)]);
        let term = CovarianceTerm::new("M2", CovarianceForm::Wxfxw, 0.0075, [("A", 1.0), ("B", 1.0)]);
        let want = rm.decompose(&active).factor_variance;
        assert!((term.variance(&rm, &active) - want).abs() < 1e-12);
    }

    #[test]
    fn asset_weights_scale_and_drop_assets() {
        let rm = model();
        let active = w(&[("A", 0.5), ("B", 0.25)]);
        let term = CovarianceTerm::new("M2", CovarianceForm::Wxfxw, 1.0, [("A", 2.0)]);
        // only A, doubled: exposure F1 = 1.0
        assert!((term.variance(&rm, &active) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn factor_weights_select_factors() {
        let rm = model();
        let active = w(&[("A", 0.5), ("B", 0.25)]);
        // exposures F1 0.5, F2 0.5; keep F2 only
        let term = CovarianceTerm::new("M2", CovarianceForm::Xwfwx, 1.0, [("F2", 1.0)]);
        assert!((term.variance(&rm, &active) - 0.25 * 0.09).abs() < 1e-12);
    }

    #[test]
    fn utility_defaults_leave_new_terms_off() {
        let u: Utility = serde_json::from_str(r#"{"alpha_weight":1.0,"transaction_cost_weight":1.0}"#).unwrap();
        assert!(u.covariance_terms.is_empty());
        assert_eq!(u.expected_shortfall_weight, 0.0);
    }
}
