//! Factor risk model binding.
//!
//! Covariance entries are stored once under the canonical `(min, max)` factor
//! pair, so `set_factor_covariance(f1, f2, v)` is automatically visible as
//! `(f2, f1)`. Exposures are sparse; a missing exposure reads as 0.
//!
//! Nothing here is validated on insertion. [`RiskModel::validate`] reports
//! every structural problem at assembly time and never corrects one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{AssetId, FactorId, RiskModelId};
use crate::linalg::{check_psd, PsdVerdict, SymMatrix};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskModel {
    id: RiskModelId,
    /// Upper triangle only: `covariance[a][b]` with `a <= b`.
    covariance: BTreeMap<FactorId, BTreeMap<FactorId, f64>>,
    exposures: BTreeMap<AssetId, BTreeMap<FactorId, f64>>,
    specific_variance: BTreeMap<AssetId, f64>,
    /// Off-diagonal specific covariance, canonical order as above.
    specific_covariance: BTreeMap<AssetId, BTreeMap<AssetId, f64>>,
    factor_blocks: BTreeMap<String, Vec<FactorId>>,
    numeraire: Option<FactorId>,
}

/// Variance split of a weight vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskDecomposition {
    pub factor_variance: f64,
    pub specific_variance: f64,
}

impl RiskDecomposition {
    pub fn total_variance(&self) -> f64 {
        self.factor_variance + self.specific_variance
    }

    /// Total risk as a standard deviation.
    pub fn total_risk(&self) -> f64 {
        self.total_variance().max(0.0).sqrt()
    }
}

/// Structural problem found by [`RiskModel::validate`].
#[derive(Clone, Debug, PartialEq)]
pub enum RiskModelIssue {
    UnknownExposureFactor { asset: AssetId, factor: FactorId },
    NegativeSpecificVariance { asset: AssetId, value: f64 },
    NonFiniteEntry { what: String },
    NotPositiveSemidefinite { factor: FactorId, eigenvalue: f64 },
    UnknownBlockFactor { block: String, factor: FactorId },
    UnknownNumeraire { factor: FactorId },
}

impl fmt::Display for RiskModelIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownExposureFactor { asset, factor } => write!(
                f,
                "exposure of '{asset}' references factor '{factor}' missing from covariance"
            ),
            Self::NegativeSpecificVariance { asset, value } => {
                write!(f, "specific variance of '{asset}' is negative ({value})")
            }
            Self::NonFiniteEntry { what } => write!(f, "non-finite value in {what}"),
            Self::NotPositiveSemidefinite { factor, eigenvalue } => write!(
                f,
                "factor covariance is not positive semidefinite (eigenvalue {eigenvalue:.3e}, mostly '{factor}')"
            ),
            Self::UnknownBlockFactor { block, factor } => {
                write!(f, "factor block '{block}' references unknown factor '{factor}'")
            }
            Self::UnknownNumeraire { factor } => {
                write!(f, "numeraire factor '{factor}' is not in the covariance matrix")
            }
        }
    }
}

fn canonical<T: Ord + Clone>(a: &T, b: &T) -> (T, T) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl RiskModel {
    pub fn new<S: Into<RiskModelId>>(id: S) -> Self {
        Self {
            id: id.into(),
            covariance: BTreeMap::new(),
            exposures: BTreeMap::new(),
            specific_variance: BTreeMap::new(),
            specific_covariance: BTreeMap::new(),
            factor_blocks: BTreeMap::new(),
            numeraire: None,
        }
    }

    pub fn id(&self) -> &RiskModelId {
        &self.id
    }

    // ─── Setters ──────────────────────────────────────────────────────────

    pub fn set_factor_covariance<A, B>(&mut self, f1: A, f2: B, value: f64)
    where
        A: Into<FactorId>,
        B: Into<FactorId>,
    {
        let (a, b) = canonical(&f1.into(), &f2.into());
        self.covariance.entry(a).or_default().insert(b, value);
    }

    pub fn set_exposure<A, F>(&mut self, asset: A, factor: F, value: f64)
    where
        A: Into<AssetId>,
        F: Into<FactorId>,
    {
        self.exposures
            .entry(asset.into())
            .or_default()
            .insert(factor.into(), value);
    }

    pub fn set_specific_variance<A: Into<AssetId>>(&mut self, asset: A, value: f64) {
        self.specific_variance.insert(asset.into(), value);
    }

    pub fn set_specific_covariance<A, B>(&mut self, a1: A, a2: B, value: f64)
    where
        A: Into<AssetId>,
        B: Into<AssetId>,
    {
        let a1 = a1.into();
        let a2 = a2.into();
        if a1 == a2 {
            self.specific_variance.insert(a1, value);
            return;
        }
        let (a, b) = canonical(&a1, &a2);
        self.specific_covariance.entry(a).or_default().insert(b, value);
    }

    pub fn add_factor_block<S, I, F>(&mut self, name: S, factors: I)
    where
        S: Into<String>,
        I: IntoIterator<Item = F>,
        F: Into<FactorId>,
    {
        self.factor_blocks
            .insert(name.into(), factors.into_iter().map(Into::into).collect());
    }

    pub fn set_numeraire<F: Into<FactorId>>(&mut self, factor: F) {
        self.numeraire = Some(factor.into());
    }

    // ─── Reads ────────────────────────────────────────────────────────────

    /// Every factor named by a covariance entry, sorted.
    pub fn factors(&self) -> Vec<FactorId> {
        let mut set: BTreeSet<FactorId> = BTreeSet::new();
        for (a, row) in &self.covariance {
            set.insert(a.clone());
            for b in row.keys() {
                set.insert(b.clone());
            }
        }
        set.into_iter().collect()
    }

    pub fn has_factor(&self, factor: &str) -> bool {
        self.covariance.contains_key(factor)
            || self.covariance.values().any(|row| row.contains_key(factor))
    }

    pub fn factor_covariance(&self, f1: &FactorId, f2: &FactorId) -> f64 {
        let (a, b) = if f1 <= f2 { (f1, f2) } else { (f2, f1) };
        self.covariance
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn exposure(&self, asset: &str, factor: &str) -> f64 {
        self.exposures
            .get(asset)
            .and_then(|row| row.get(factor))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn exposures_of(&self, asset: &str) -> Option<&BTreeMap<FactorId, f64>> {
        self.exposures.get(asset)
    }

    pub fn specific_variance(&self, asset: &str) -> f64 {
        self.specific_variance.get(asset).copied().unwrap_or(0.0)
    }

    fn specific_covariance(&self, a1: &AssetId, a2: &AssetId) -> f64 {
        if a1 == a2 {
            return self.specific_variance(a1.as_str());
        }
        let (a, b) = if a1 <= a2 { (a1, a2) } else { (a2, a1) };
        self.specific_covariance
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn factor_blocks(&self) -> &BTreeMap<String, Vec<FactorId>> {
        &self.factor_blocks
    }

    pub fn numeraire(&self) -> Option<&FactorId> {
        self.numeraire.as_ref()
    }

    /// Assets carrying at least one exposure or a specific variance.
    pub fn covered_assets(&self) -> BTreeSet<AssetId> {
        self.exposures
            .keys()
            .chain(self.specific_variance.keys())
            .cloned()
            .collect()
    }

    pub fn covariance_matrix(&self) -> (Vec<FactorId>, SymMatrix) {
        let factors = self.factors();
        let mut m = SymMatrix::zeros(factors.len());
        for (i, fi) in factors.iter().enumerate() {
            for (j, fj) in factors.iter().enumerate().skip(i) {
                m.set(i, j, self.factor_covariance(fi, fj));
            }
        }
        (factors, m)
    }

    // ─── Functionals ──────────────────────────────────────────────────────

    /// Σ wᵢ·x(i, factor)
    pub fn portfolio_exposure(&self, weights: &BTreeMap<AssetId, f64>, factor: &str) -> f64 {
        weights
            .iter()
            .map(|(a, w)| w * self.exposure(a.as_str(), factor))
            .sum()
    }

    /// Factor and specific variance of a weight vector.
    pub fn decompose(&self, weights: &BTreeMap<AssetId, f64>) -> RiskDecomposition {
        let factors = self.factors();
        let exp: Vec<f64> = factors
            .iter()
            .map(|f| self.portfolio_exposure(weights, f.as_str()))
            .collect();

        let mut factor_variance = 0.0;
        for (i, fi) in factors.iter().enumerate() {
            for (j, fj) in factors.iter().enumerate() {
                factor_variance += exp[i] * self.factor_covariance(fi, fj) * exp[j];
            }
        }

        let mut specific_variance = 0.0;
        for (a, wa) in weights {
            specific_variance += wa * wa * self.specific_variance(a.as_str());
        }
        for (a, row) in &self.specific_covariance {
            let wa = weights.get(a).copied().unwrap_or(0.0);
            for (b, c) in row {
                let wb = weights.get(b).copied().unwrap_or(0.0);
                specific_variance += 2.0 * wa * wb * c;
            }
        }

        RiskDecomposition {
            factor_variance,
            specific_variance,
        }
    }

    /// Covariance between one asset and a portfolio.
    pub fn asset_portfolio_covariance(&self, asset: &AssetId, weights: &BTreeMap<AssetId, f64>) -> f64 {
        let factors = self.factors();
        let mut acc = 0.0;
        for fi in &factors {
            let xa = self.exposure(asset.as_str(), fi.as_str());
            if xa == 0.0 {
                continue;
            }
            for fj in &factors {
                let xp = self.portfolio_exposure(weights, fj.as_str());
                acc += xa * self.factor_covariance(fi, fj) * xp;
            }
        }
        for (b, wb) in weights {
            acc += self.specific_covariance(asset, b) * wb;
        }
        acc
    }

    /// Predicted beta of `asset` against `benchmark`; 0 for a zero-risk benchmark.
    pub fn beta(&self, asset: &AssetId, benchmark: &BTreeMap<AssetId, f64>) -> f64 {
        let var = self.decompose(benchmark).total_variance();
        if var <= 0.0 {
            return 0.0;
        }
        self.asset_portfolio_covariance(asset, benchmark) / var
    }

    // ─── Validation ───────────────────────────────────────────────────────

    pub fn validate(&self, psd_tolerance: f64) -> Vec<RiskModelIssue> {
        let mut issues = Vec::new();

        for (a, row) in &self.covariance {
            for (b, v) in row {
                if !v.is_finite() {
                    issues.push(RiskModelIssue::NonFiniteEntry {
                        what: format!("covariance({a},{b})"),
                    });
                }
            }
        }

        for (asset, row) in &self.exposures {
            for (factor, v) in row {
                if !self.has_factor(factor.as_str()) {
                    issues.push(RiskModelIssue::UnknownExposureFactor {
                        asset: asset.clone(),
                        factor: factor.clone(),
                    });
                }
                if !v.is_finite() {
                    issues.push(RiskModelIssue::NonFiniteEntry {
                        what: format!("exposure({asset},{factor})"),
                    });
                }
            }
        }

        for (asset, v) in &self.specific_variance {
            if !v.is_finite() {
                issues.push(RiskModelIssue::NonFiniteEntry {
                    what: format!("specific_variance({asset})"),
                });
            } else if *v < 0.0 {
                issues.push(RiskModelIssue::NegativeSpecificVariance {
                    asset: asset.clone(),
                    value: *v,
                });
            }
        }

        for (block, members) in &self.factor_blocks {
            for f in members {
                if !self.has_factor(f.as_str()) {
                    issues.push(RiskModelIssue::UnknownBlockFactor {
                        block: block.clone(),
                        factor: f.clone(),
                    });
                }
            }
        }

        if let Some(n) = &self.numeraire {
            if !self.has_factor(n.as_str()) {
                issues.push(RiskModelIssue::UnknownNumeraire { factor: n.clone() });
            }
        }

        // PSD only makes sense on a finite matrix.
        if issues
            .iter()
            .all(|i| !matches!(i, RiskModelIssue::NonFiniteEntry { .. }))
        {
            let (factors, m) = self.covariance_matrix();
            if let PsdVerdict::Indefinite { index, eigenvalue } = check_psd(&m, psd_tolerance) {
                issues.push(RiskModelIssue::NotPositiveSemidefinite {
                    factor: factors[index].clone(),
                    eigenvalue,
                });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(items: &[(&str, f64)]) -> BTreeMap<AssetId, f64> {
        items.iter().map(|(a, v)| (AssetId::new(*a), *v)).collect()
    }

    fn two_factor_model() -> RiskModel {
        let mut m = RiskModel::new("GEM");
        m.set_factor_covariance("F1", "F1", 0.04);
        m.set_factor_covariance("F2", "F1", 0.01);
        m.set_factor_covariance("F2", "F2", 0.09);
        m.set_exposure("A", "F1", 1.0);
        m.set_exposure("B", "F2", 1.0);
        m.set_specific_variance("A", 0.01);
        m.set_specific_variance("B", 0.02);
        m
    }

    #[test]
    fn covariance_is_mirrored() {
        let m = two_factor_model();
        let f1 = FactorId::new("F1");
        let f2 = FactorId::new("F2");
        assert_eq!(m.factor_covariance(&f1, &f2), 0.01);
        assert_eq!(m.factor_covariance(&f2, &f1), 0.01);
    }

    #[test]
    fn missing_exposure_reads_zero() {
        let m = two_factor_model();
        assert_eq!(m.exposure("A", "F2"), 0.0);
        assert_eq!(m.exposure("NOPE", "F1"), 0.0);
    }

    #[test]
    fn clean_model_has_no_issues() {
        assert!(two_factor_model().validate(1e-10).is_empty());
    }

    #[test]
    fn validate_reports_every_issue() {
        let mut m = two_factor_model();
        m.set_exposure("A", "F9", 0.5);
        m.set_specific_variance("B", -0.1);
        m.add_factor_block("Style", ["F1", "F7"]);
        m.set_numeraire("F8");
        let issues = m.validate(1e-10);
        assert_eq!(issues.len(), 4, "{issues:?}");
        assert!(issues
            .iter()
            .any(|i| matches!(i, RiskModelIssue::UnknownExposureFactor { factor, .. } if factor.as_str() == "F9")));
        assert!(issues
            .iter()
            .any(|i| matches!(i, RiskModelIssue::NegativeSpecificVariance { .. })));
    }

    #[test]
    fn non_psd_covariance_is_reported_not_fixed() {
        let mut m = RiskModel::new("BAD");
        m.set_factor_covariance("F1", "F1", 1.0);
        m.set_factor_covariance("F2", "F2", 1.0);
        m.set_factor_covariance("F1", "F2", 2.0);
        let issues = m.validate(1e-10);
        assert!(issues
            .iter()
            .any(|i| matches!(i, RiskModelIssue::NotPositiveSemidefinite { .. })));
        assert_eq!(
            m.factor_covariance(&FactorId::new("F1"), &FactorId::new("F2")),
            2.0
        );
    }

    #[test]
    fn decomposition_of_single_asset() {
        let m = two_factor_model();
        let d = m.decompose(&w(&[("A", 1.0)]));
        assert!((d.factor_variance - 0.04).abs() < 1e-12);
        assert!((d.specific_variance - 0.01).abs() < 1e-12);
        assert!((d.total_risk() - 0.05_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn beta_of_benchmark_against_itself_is_one() {
        let m = two_factor_model();
        let bench = w(&[("A", 0.5), ("B", 0.5)]);
        let port_beta: f64 = bench
            .iter()
            .map(|(a, wa)| wa * m.beta(a, &bench))
            .sum();
        assert!((port_beta - 1.0).abs() < 1e-12, "got {port_beta}");
    }
}
