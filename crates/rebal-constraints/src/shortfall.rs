//! Scenario-based expected shortfall.
//!
//! Each scenario is one vector of asset returns. A portfolio's loss in a
//! scenario is `-Σ wᵢ·rᵢ`; expected shortfall at confidence `c` is the mean
//! loss over the worst `(1 − c)` fraction of scenarios, with the boundary
//! scenario counted fractionally.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use rebal_model::{AssetId, CoefficientMap};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub confidence: f64,
    /// Per-asset mean the scenarios are re-centred on. Without it the
    /// scenarios are used as given.
    #[serde(default)]
    pub target_mean_returns: Option<CoefficientMap>,
    #[serde(default)]
    pub scenarios: Vec<CoefficientMap>,
}

impl ScenarioSet {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            target_mean_returns: None,
            scenarios: Vec::new(),
        }
    }

    pub fn with_target_mean_returns(mut self, means: CoefficientMap) -> Self {
        self.target_mean_returns = Some(means);
        self
    }

    pub fn with_scenario(mut self, returns: CoefficientMap) -> Self {
        self.scenarios.push(returns);
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err("confidence level must be inside (0, 1)");
        }
        if self.scenarios.is_empty() {
            return Err("at least one return scenario is required");
        }
        let finite = |m: &CoefficientMap| m.iter().all(|(_, r)| r.is_finite());
        if !self.scenarios.iter().all(finite) || !self.target_mean_returns.iter().all(finite) {
            return Err("scenario and target returns must be finite");
        }
        Ok(())
    }

    /// Every asset named by a scenario or the target means.
    pub fn referenced_assets(&self) -> BTreeSet<&str> {
        self.scenarios
            .iter()
            .chain(self.target_mean_returns.iter())
            .flat_map(|m| m.keys())
            .collect()
    }

    /// Mean of each asset's return across scenarios; missing entries read 0.
    pub fn scenario_means(&self) -> BTreeMap<&str, f64> {
        let n = self.scenarios.len() as f64;
        let mut out: BTreeMap<&str, f64> = BTreeMap::new();
        for a in self.referenced_assets() {
            let total: f64 = self.scenarios.iter().map(|s| s.get(a).unwrap_or(0.0)).sum();
            out.insert(a, if n > 0.0 { total / n } else { 0.0 });
        }
        out
    }

    /// Loss of `weights` in every scenario, after re-centring on the target
    /// means when they are set.
    pub fn losses(&self, weights: &BTreeMap<AssetId, f64>) -> Vec<f64> {
        let shift: BTreeMap<&str, f64> = match &self.target_mean_returns {
            Some(target) => self
                .scenario_means()
                .into_iter()
                .map(|(a, mean)| (a, target.get(a).unwrap_or(0.0) - mean))
                .collect(),
            None => BTreeMap::new(),
        };
        self.scenarios
            .iter()
            .map(|s| {
                let ret: f64 = weights
                    .iter()
                    .map(|(a, w)| {
                        let r = s.get(a.as_str()).unwrap_or(0.0) + shift.get(a.as_str()).copied().unwrap_or(0.0);
                        w * r
                    })
                    .sum();
                -ret
            })
            .collect()
    }

    /// `None` without scenarios.
    pub fn expected_shortfall(&self, weights: &BTreeMap<AssetId, f64>) -> Option<f64> {
        let mut losses = self.losses(weights);
        if losses.is_empty() {
            return None;
        }
        losses.sort_by(|a, b| b.total_cmp(a));

        let tail = (1.0 - self.confidence) * losses.len() as f64;
        if tail <= 0.0 {
            return losses.first().copied();
        }
        let whole = tail.floor() as usize;
        let mut sum: f64 = losses.iter().take(whole).sum();
        let frac = tail - whole as f64;
        if frac > 0.0 {
            if let Some(next) = losses.get(whole) {
                sum += frac * next;
            }
        }
        Some(sum / tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(items: &[(&str, f64)]) -> BTreeMap<AssetId, f64> {
        items.iter().map(|(a, x)| (AssetId::new(*a), *x)).collect()
    }

    fn ten_scenarios() -> ScenarioSet {
        // asset A returns -10%, -9%, ..., -1%
        (1..=10).fold(ScenarioSet::new(0.8), |s, k| {
            s.with_scenario(CoefficientMap::new().with("A", -(11 - k) as f64 / 100.0))
        })
    }

    #[test]
    fn worst_tail_is_averaged() {
        // worst 20% of 10 scenarios: losses 0.10 and 0.09
        let es = ten_scenarios().expected_shortfall(&w(&[("A", 1.0)])).unwrap();
        assert!((es - 0.095).abs() < 1e-12);
    }

    #[test]
    fn fractional_tail_weights_the_boundary_scenario() {
        let mut s = ten_scenarios();
        s.confidence = 0.85;
        // tail 1.5 scenarios: (0.10 + 0.5 * 0.09) / 1.5
        let es = s.expected_shortfall(&w(&[("A", 1.0)])).unwrap();
        assert!((es - 0.145 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn target_means_recentre_scenarios() {
        let s = ScenarioSet::new(0.5)
            .with_scenario(CoefficientMap::new().with("A", 0.02))
            .with_scenario(CoefficientMap::new().with("A", -0.04))
            .with_target_mean_returns(CoefficientMap::new().with("A", 0.01));
        // mean -0.01, shifted by +0.02: returns 0.04 and -0.02
        let es = s.expected_shortfall(&w(&[("A", 1.0)])).unwrap();
        assert!((es - 0.02).abs() < 1e-12);
    }

    #[test]
    fn validation_rules() {
        assert!(ten_scenarios().validate().is_ok());
        assert!(ScenarioSet::new(0.9).validate().is_err());
        let mut s = ten_scenarios();
        s.confidence = 1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn no_scenarios_has_no_value() {
        assert_eq!(ScenarioSet::new(0.9).expected_shortfall(&w(&[("A", 1.0)])), None);
    }
}
