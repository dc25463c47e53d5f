use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::{GroupTagMap, PriceMap, RoundLotMap};
use crate::ids::{AssetId, PortfolioId, RiskModelId};
use crate::risk_model::RiskModel;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Cash,
    Regular,
    Composite,
    CompositeFutures,
}

/// One tradable instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub asset_type: AssetType,
    /// Portfolio a COMPOSITE / COMPOSITE_FUTURES asset looks through to.
    #[serde(default)]
    pub composite: Option<PortfolioId>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub round_lot: Option<i64>,
    /// Group attribute name -> value, e.g. `GICS_SECTOR -> Energy`.
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
}

impl Asset {
    fn with_type<S: Into<AssetId>>(id: S, asset_type: AssetType) -> Self {
        Self {
            id: id.into(),
            asset_type,
            composite: None,
            issuer: None,
            price: None,
            round_lot: None,
            groups: BTreeMap::new(),
        }
    }

    pub fn regular<S: Into<AssetId>>(id: S) -> Self {
        Self::with_type(id, AssetType::Regular)
    }

    pub fn cash<S: Into<AssetId>>(id: S) -> Self {
        let mut a = Self::with_type(id, AssetType::Cash);
        a.price = Some(1.0);
        a
    }

    pub fn composite<S: Into<AssetId>, P: Into<PortfolioId>>(id: S, portfolio: P) -> Self {
        let mut a = Self::with_type(id, AssetType::Composite);
        a.composite = Some(portfolio.into());
        a
    }

    pub fn composite_futures<S: Into<AssetId>, P: Into<PortfolioId>>(id: S, portfolio: P) -> Self {
        let mut a = Self::with_type(id, AssetType::CompositeFutures);
        a.composite = Some(portfolio.into());
        a
    }

    pub fn with_issuer<S: Into<String>>(mut self, issuer: S) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_round_lot(mut self, lot: i64) -> Self {
        self.round_lot = Some(lot);
        self
    }

    pub fn with_group<G: Into<String>, V: Into<String>>(mut self, group: G, value: V) -> Self {
        self.groups.insert(group.into(), value.into());
        self
    }

    pub fn is_cash(&self) -> bool {
        self.asset_type == AssetType::Cash
    }

    pub fn group(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseError {
    DuplicateAsset { asset: AssetId },
    DuplicateRiskModel { model: RiskModelId },
    UnknownAsset { asset: String },
}

impl fmt::Display for UniverseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateAsset { asset } => write!(f, "asset '{asset}' already in universe"),
            Self::DuplicateRiskModel { model } => {
                write!(f, "risk model '{model}' already bound")
            }
            Self::UnknownAsset { asset } => write!(f, "asset '{asset}' is not in the universe"),
        }
    }
}

impl std::error::Error for UniverseError {}

/// Tradable assets plus the risk models bound to them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetUniverse {
    assets: BTreeMap<AssetId, Asset>,
    risk_models: BTreeMap<RiskModelId, RiskModel>,
}

impl AssetUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&mut self, asset: Asset) -> Result<(), UniverseError> {
        if self.assets.contains_key(&asset.id) {
            return Err(UniverseError::DuplicateAsset { asset: asset.id });
        }
        self.assets.insert(asset.id.clone(), asset);
        Ok(())
    }

    pub fn add_risk_model(&mut self, model: RiskModel) -> Result<(), UniverseError> {
        if self.risk_models.contains_key(model.id()) {
            return Err(UniverseError::DuplicateRiskModel {
                model: model.id().clone(),
            });
        }
        self.risk_models.insert(model.id().clone(), model);
        Ok(())
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> + '_ {
        self.assets.values()
    }

    pub fn cash_assets(&self) -> Vec<&AssetId> {
        self.assets
            .values()
            .filter(|a| a.is_cash())
            .map(|a| &a.id)
            .collect()
    }

    pub fn is_cash(&self, id: &str) -> bool {
        self.assets.get(id).map(Asset::is_cash).unwrap_or(false)
    }

    pub fn risk_model(&self, id: &str) -> Option<&RiskModel> {
        self.risk_models.get(id)
    }

    pub fn risk_model_mut(&mut self, id: &str) -> Option<&mut RiskModel> {
        self.risk_models.get_mut(id)
    }

    pub fn risk_models(&self) -> impl Iterator<Item = &RiskModel> + '_ {
        self.risk_models.values()
    }

    pub fn group_value(&self, asset: &str, group: &str) -> Option<&str> {
        self.assets.get(asset).and_then(|a| a.group(group))
    }

    /// Copy a group-tag map onto the assets as group attribute `group`.
    ///
    /// Fails on the first id that is not in the universe; earlier tags stay applied.
    pub fn apply_group_tags(&mut self, group: &str, tags: &GroupTagMap) -> Result<(), UniverseError> {
        for (asset, value) in tags.iter() {
            let a = self
                .assets
                .get_mut(asset)
                .ok_or_else(|| UniverseError::UnknownAsset {
                    asset: asset.to_string(),
                })?;
            a.groups.insert(group.to_string(), value);
        }
        Ok(())
    }

    pub fn apply_prices(&mut self, prices: &PriceMap) -> Result<(), UniverseError> {
        for (asset, px) in prices.iter() {
            let a = self
                .assets
                .get_mut(asset)
                .ok_or_else(|| UniverseError::UnknownAsset {
                    asset: asset.to_string(),
                })?;
            a.price = Some(px);
        }
        Ok(())
    }

    pub fn apply_round_lots(&mut self, lots: &RoundLotMap) -> Result<(), UniverseError> {
        for (asset, lot) in lots.iter() {
            let a = self
                .assets
                .get_mut(asset)
                .ok_or_else(|| UniverseError::UnknownAsset {
                    asset: asset.to_string(),
                })?;
            a.round_lot = Some(lot);
        }
        Ok(())
    }

    /// Prices carried on the assets themselves.
    pub fn price_map(&self) -> PriceMap {
        let mut m = PriceMap::new();
        for a in self.assets.values() {
            if let Some(px) = a.price {
                m.set(&a.id, px);
            }
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_asset_is_rejected() {
        let mut u = AssetUniverse::new();
        u.add_asset(Asset::regular("A")).unwrap();
        assert_eq!(
            u.add_asset(Asset::regular("A")).unwrap_err(),
            UniverseError::DuplicateAsset {
                asset: AssetId::new("A")
            }
        );
    }

    #[test]
    fn group_tags_land_on_assets() {
        let mut u = AssetUniverse::new();
        u.add_asset(Asset::regular("A")).unwrap();
        u.add_asset(Asset::regular("B")).unwrap();
        let tags = GroupTagMap::new()
            .with("A", "Tech".to_string())
            .with("B", "Energy".to_string());
        u.apply_group_tags("SECTOR", &tags).unwrap();
        assert_eq!(u.group_value("A", "SECTOR"), Some("Tech"));
        assert_eq!(u.group_value("B", "COUNTRY"), None);
    }

    #[test]
    fn unknown_asset_in_price_map_fails() {
        let mut u = AssetUniverse::new();
        u.add_asset(Asset::regular("A")).unwrap();
        let px = PriceMap::new().with("A", 10.0).with("Z", 1.0);
        assert!(matches!(
            u.apply_prices(&px),
            Err(UniverseError::UnknownAsset { .. })
        ));
        assert_eq!(u.asset("A").and_then(|a| a.price), Some(10.0));
    }

    #[test]
    fn cash_asset_is_priced_at_one() {
        let mut u = AssetUniverse::new();
        u.add_asset(Asset::cash("CASH")).unwrap();
        assert!(u.is_cash("CASH"));
        assert_eq!(u.price_map().get("CASH").unwrap(), 1.0);
    }
}
