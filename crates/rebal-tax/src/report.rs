//! Realized gain/loss aggregation and tax liability.

use std::collections::{BTreeMap, BTreeSet};

use rebal_constraints::{ConstraintCatalog, ConstraintKind, ConstraintViolation, RelativeMode, CHECK_TOLERANCE};
use rebal_model::{AssetId, AssetUniverse, GainType, TaxCategory, TaxLot};
use rebal_schemas::{GainLossRow, LotPosition, TaxOutput, WashSaleDetail};

use crate::accountant::{ConsumedSlice, LotBook, WashSaleAdjustment};
use crate::rules::TaxRule;

/// Realized gain and loss, both non-negative.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GainLoss {
    pub gain: f64,
    pub loss: f64,
}

impl GainLoss {
    pub fn add(&mut self, amount: f64) {
        if amount >= 0.0 {
            self.gain += amount;
        } else {
            self.loss -= amount;
        }
    }

    pub fn net(&self) -> f64 {
        self.gain - self.loss
    }

    pub fn value(&self, gain_type: GainType) -> f64 {
        match gain_type {
            GainType::CapitalGain => self.gain,
            GainType::CapitalLoss => self.loss,
            GainType::CapitalNet => self.net(),
        }
    }

    fn merge(&mut self, other: &GainLoss) {
        self.gain += other.gain;
        self.loss += other.loss;
    }
}

/// Gain/loss split by tax category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GainLossSummary {
    by_category: BTreeMap<TaxCategory, GainLoss>,
}

impl GainLossSummary {
    /// Disallowed slices are skipped.
    pub fn from_slices<'a, I: IntoIterator<Item = &'a ConsumedSlice>>(slices: I) -> Self {
        let mut s = Self::default();
        for slice in slices.into_iter().filter(|s| !s.is_disallowed()) {
            s.by_category.entry(slice.category).or_default().add(slice.gain());
        }
        s
    }

    pub fn category(&self, c: TaxCategory) -> GainLoss {
        self.by_category.get(&c).copied().unwrap_or_default()
    }

    pub fn total(&self) -> GainLoss {
        let mut t = GainLoss::default();
        for gl in self.by_category.values() {
            t.merge(gl);
        }
        t
    }

    /// `category: None` sums both categories.
    pub fn value(&self, category: Option<TaxCategory>, gain_type: GainType) -> f64 {
        match category {
            Some(c) => self.category(c).value(gain_type),
            None => self.total().value(gain_type),
        }
    }

    /// Two-rate: each category's net at its rate. Single rate: the long-term
    /// rate on the combined net. Negative when losses dominate.
    pub fn tax(&self, rule: &TaxRule) -> f64 {
        if rule.enable_two_rate {
            [TaxCategory::LongTerm, TaxCategory::ShortTerm]
                .iter()
                .map(|c| self.category(*c).net() * rule.rate_for(*c))
                .sum()
        } else {
            self.total().net() * rule.long_term_rate
        }
    }
}

/// Everything a trade simulation produced for one portfolio.
#[derive(Clone, Debug, PartialEq)]
pub struct TaxReport {
    pub book: LotBook,
    pub slices: Vec<ConsumedSlice>,
    pub adjustments: Vec<WashSaleAdjustment>,
    pub new_lot_ids: Vec<String>,
    pub summary: GainLossSummary,
    /// Σ over assets of the asset's own rule applied to its gain/loss.
    pub total_tax: f64,
}

impl TaxReport {
    pub fn new(
        book: LotBook,
        slices: Vec<ConsumedSlice>,
        adjustments: Vec<WashSaleAdjustment>,
        new_lot_ids: Vec<String>,
        rules: &BTreeMap<AssetId, TaxRule>,
    ) -> Self {
        let mut per_asset: BTreeMap<&AssetId, Vec<&ConsumedSlice>> = BTreeMap::new();
        for s in &slices {
            per_asset.entry(&s.asset).or_default().push(s);
        }
        let total_tax = per_asset
            .iter()
            .filter_map(|(a, ss)| {
                rules
                    .get(*a)
                    .map(|r| GainLossSummary::from_slices(ss.iter().copied()).tax(r))
            })
            .sum();
        let summary = GainLossSummary::from_slices(slices.iter());
        Self {
            book,
            slices,
            adjustments,
            new_lot_ids,
            summary,
            total_tax,
        }
    }

    pub fn disallowed_shares(&self) -> f64 {
        self.slices
            .iter()
            .filter(|s| s.is_disallowed())
            .map(|s| s.shares)
            .sum()
    }

    /// Summary per value of `group`; assets without the attribute are left out.
    pub fn by_group(&self, universe: &AssetUniverse, group: &str) -> BTreeMap<String, GainLossSummary> {
        let mut buckets: BTreeMap<String, Vec<&ConsumedSlice>> = BTreeMap::new();
        for s in &self.slices {
            if let Some(v) = universe.group_value(s.asset.as_str(), group) {
                buckets.entry(v.to_string()).or_default().push(s);
            }
        }
        buckets
            .into_iter()
            .map(|(v, ss)| (v, GainLossSummary::from_slices(ss)))
            .collect()
    }

    /// Ex-post check of tax-arbitrage and tax-limit constraints.
    ///
    /// Only absolute bounds are read; relative bounds on these families are
    /// rejected at assembly.
    pub fn check(&self, catalog: &ConstraintCatalog, universe: &AssetUniverse) -> Vec<ConstraintViolation> {
        let mut out = Vec::new();
        for info in catalog.constraints() {
            let value = match &info.kind {
                ConstraintKind::TaxArbitrage {
                    category,
                    gain_type,
                    scope,
                } => match scope {
                    Some(s) => self
                        .by_group(universe, &s.group)
                        .get(&s.value)
                        .map(|g| g.value(*category, *gain_type))
                        .unwrap_or(0.0),
                    None => self.summary.value(*category, *gain_type),
                },
                ConstraintKind::TaxLimit => self.total_tax,
                _ => continue,
            };
            let absolute = |b: Option<rebal_constraints::Bound>| {
                b.filter(|b| b.mode == RelativeMode::Absolute).map(|b| b.value)
            };
            let (lower, upper) = (absolute(info.lower), absolute(info.upper));
            let below = lower.is_some_and(|lo| value < lo - CHECK_TOLERANCE);
            let above = upper.is_some_and(|hi| value > hi + CHECK_TOLERANCE);
            if below || above {
                out.push(ConstraintViolation::BoundBreached {
                    id: info.id.to_string(),
                    subject: None,
                    value,
                    lower,
                    upper,
                    soft: info.soft,
                });
            }
        }
        out
    }

    /// Wire form. `group` adds per-value rows after the totals.
    pub fn to_output(&self, account: Option<&str>, universe: &AssetUniverse, group: Option<&str>) -> TaxOutput {
        let position = |l: &TaxLot| LotPosition {
            lot_id: l.lot_id.clone(),
            asset: l.asset.to_string(),
            age_days: l.age_days,
            cost_basis: l.cost_basis,
            shares: l.shares,
        };
        let new_ids: BTreeSet<&str> = self.new_lot_ids.iter().map(String::as_str).collect();
        let lots: Vec<&TaxLot> = self.book.lots().map(|t| &t.lot).collect();

        let rows = |g: Option<(&str, &str)>, s: &GainLossSummary| {
            [TaxCategory::LongTerm, TaxCategory::ShortTerm]
                .into_iter()
                .map(|c| {
                    let gl = s.category(c);
                    GainLossRow {
                        group: g.map(|(n, _)| n.to_string()),
                        value: g.map(|(_, v)| v.to_string()),
                        category: match c {
                            TaxCategory::LongTerm => "LONG_TERM".to_string(),
                            TaxCategory::ShortTerm => "SHORT_TERM".to_string(),
                        },
                        gain: gl.gain,
                        loss: gl.loss,
                        net: gl.net(),
                    }
                })
                .collect::<Vec<_>>()
        };
        let mut gain_loss = rows(None, &self.summary);
        if let Some(g) = group {
            for (v, s) in self.by_group(universe, g) {
                gain_loss.extend(rows(Some((g, v.as_str())), &s));
            }
        }

        TaxOutput {
            account: account.map(str::to_string),
            remaining_lots: lots.iter().map(|&l| position(l)).collect(),
            new_lots: lots
                .iter()
                .filter(|l| new_ids.contains(l.lot_id.as_str()))
                .map(|&l| position(l))
                .collect(),
            disallowed_shares: self.disallowed_shares(),
            wash_sales: self
                .adjustments
                .iter()
                .map(|a| WashSaleDetail {
                    sold_lot_id: a.sold_lot_id.clone().unwrap_or_default(),
                    replacement_lot_id: a.replacement.to_string(),
                    asset: a.asset.to_string(),
                    shares: a.shares,
                    disallowed_loss: a.disallowed_loss,
                    age_carried_days: a.age_carried_days,
                })
                .collect(),
            gain_loss,
            total_tax: self.total_tax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accountant::LotState;

    fn slice(asset: &str, category: TaxCategory, basis: f64, price: f64, shares: f64) -> ConsumedSlice {
        ConsumedSlice {
            lot_id: format!("{asset}#1"),
            asset: AssetId::new(asset),
            age_days: 0,
            cost_basis: basis,
            shares,
            sale_price: price,
            category,
            state: LotState::Realized,
        }
    }

    #[test]
    fn summary_splits_gain_and_loss_per_category() {
        let s = GainLossSummary::from_slices(&[
            slice("A", TaxCategory::LongTerm, 10.0, 15.0, 2.0),
            slice("B", TaxCategory::LongTerm, 10.0, 8.0, 1.0),
            slice("C", TaxCategory::ShortTerm, 10.0, 4.0, 1.0),
        ]);
        let lt = s.category(TaxCategory::LongTerm);
        assert_eq!((lt.gain, lt.loss), (10.0, 2.0));
        assert_eq!(s.value(None, GainType::CapitalLoss), 8.0);
        assert_eq!(s.value(Some(TaxCategory::ShortTerm), GainType::CapitalNet), -6.0);
    }

    #[test]
    fn two_rate_and_single_rate_tax() {
        let s = GainLossSummary::from_slices(&[
            slice("A", TaxCategory::LongTerm, 10.0, 20.0, 10.0),
            slice("B", TaxCategory::ShortTerm, 10.0, 15.0, 10.0),
        ]);
        let two = TaxRule::two_rate(0.15, 0.35);
        assert!((s.tax(&two) - (100.0 * 0.15 + 50.0 * 0.35)).abs() < 1e-9);
        let one = TaxRule::single_rate(0.2);
        assert!((s.tax(&one) - 150.0 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn disallowed_slices_never_count() {
        let mut d = slice("A", TaxCategory::LongTerm, 10.0, 5.0, 1.0);
        d.state = LotState::Disallowed;
        let s = GainLossSummary::from_slices(&[d]);
        assert_eq!(s.total(), GainLoss::default());
    }
}
