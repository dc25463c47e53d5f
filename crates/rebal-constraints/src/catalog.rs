use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rebal_model::ConstraintId;

use crate::hierarchy::ConstraintCategory;
use crate::info::ConstraintInfo;

/// Which trades the solver may place.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    #[default]
    AllowAll,
    BuyNone,
    SellNone,
    ShortNone,
    BuyFromUniverse,
    SellNoneBuyFromUniverse,
    BuyShortFromUniverse,
    DisallowBuyShort,
    DisallowSellCover,
}

/// Issuer diversification: no issuer above `max_single`, and issuers above
/// `threshold` together at most `max_aggregate` (the 5/10/40 rule by default).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiveTenForty {
    pub threshold: f64,
    pub max_single: f64,
    pub max_aggregate: f64,
}

impl Default for FiveTenForty {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            max_single: 0.10,
            max_aggregate: 0.40,
        }
    }
}

/// Every constraint of one profile plus profile-wide paring settings.
///
/// Built by value: each combinator consumes the catalog and returns a new one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintCatalog {
    constraints: Vec<ConstraintInfo>,
    #[serde(default)]
    pub transaction_type: TransactionType,
    /// Pre-existing holdings are exempt from minimum holding thresholds.
    #[serde(default)]
    pub grandfather_rule: bool,
    /// Utility penalty per trade beyond the cardinality bound.
    #[serde(default)]
    pub penalty_per_extra_trade: Option<f64>,
    #[serde(default)]
    pub five_ten_forty: Option<FiveTenForty>,
    #[serde(default)]
    pub roundlotting: bool,
}

impl ConstraintCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, constraint: ConstraintInfo) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_all<I: IntoIterator<Item = ConstraintInfo>>(mut self, constraints: I) -> Self {
        self.constraints.extend(constraints);
        self
    }

    pub fn with_transaction_type(mut self, t: TransactionType) -> Self {
        self.transaction_type = t;
        self
    }

    pub fn with_grandfather_rule(mut self) -> Self {
        self.grandfather_rule = true;
        self
    }

    pub fn with_penalty_per_extra_trade(mut self, penalty: f64) -> Self {
        self.penalty_per_extra_trade = Some(penalty);
        self
    }

    pub fn with_five_ten_forty(mut self, rule: FiveTenForty) -> Self {
        self.five_ten_forty = Some(rule);
        self
    }

    pub fn with_roundlotting(mut self) -> Self {
        self.roundlotting = true;
        self
    }

    /// Constraints of `other` appended after ours; our settings are kept.
    pub fn merged(mut self, other: &ConstraintCatalog) -> Self {
        self.constraints.extend(other.constraints.iter().cloned());
        self
    }

    pub fn constraints(&self) -> &[ConstraintInfo] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ConstraintInfo> {
        self.constraints.iter().find(|c| c.id.as_str() == id)
    }

    /// Ids used more than once, each reported once, sorted.
    pub fn duplicate_ids(&self) -> Vec<ConstraintId> {
        let mut seen: BTreeMap<&ConstraintId, usize> = BTreeMap::new();
        for c in &self.constraints {
            *seen.entry(&c.id).or_insert(0) += 1;
        }
        seen.into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn by_category(&self) -> BTreeMap<ConstraintCategory, Vec<&ConstraintInfo>> {
        let mut out: BTreeMap<ConstraintCategory, Vec<&ConstraintInfo>> = BTreeMap::new();
        for c in &self.constraints {
            out.entry(c.category()).or_default().push(c);
        }
        out
    }

    pub fn has_paring(&self) -> bool {
        self.constraints.iter().any(|c| {
            matches!(
                c.category(),
                ConstraintCategory::AssetParing
                    | ConstraintCategory::HoldingLevelParing
                    | ConstraintCategory::TransactionLevelParing
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{asset_range, num_assets, turnover};
    use crate::info::Side;

    #[test]
    fn duplicate_ids_reported_once_each() {
        let cat = ConstraintCatalog::new()
            .with(asset_range("A").with_bounds(0.0, 0.1))
            .with(asset_range("A").with_bounds(0.0, 0.2))
            .with(asset_range("A").with_upper(0.3))
            .with(asset_range("B").with_upper(0.3));
        let d = cat.duplicate_ids();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].as_str(), "asset/A");
    }

    #[test]
    fn overriding_id_removes_duplicate() {
        let cat = ConstraintCatalog::new()
            .with(asset_range("A").with_upper(0.1))
            .with(asset_range("A").with_upper(0.2).with_id("asset/A/second"));
        assert!(cat.duplicate_ids().is_empty());
    }

    #[test]
    fn catalog_groups_by_category() {
        let cat = ConstraintCatalog::new()
            .with(turnover(Side::Total).with_upper(0.2))
            .with(num_assets().with_upper(8.0))
            .with(asset_range("A").with_upper(0.1));
        let g = cat.by_category();
        assert_eq!(g.len(), 3);
        assert!(cat.has_paring());
    }

    #[test]
    fn merged_keeps_own_settings() {
        let base = ConstraintCatalog::new()
            .with_grandfather_rule()
            .with(asset_range("A").with_upper(0.1));
        let extra = ConstraintCatalog::new()
            .with_transaction_type(TransactionType::ShortNone)
            .with(asset_range("B").with_upper(0.1));
        let m = base.merged(&extra);
        assert_eq!(m.len(), 2);
        assert!(m.grandfather_rule);
        assert_eq!(m.transaction_type, TransactionType::AllowAll);
    }
}
