use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{AssetId, PortfolioId};

/// Holding-period bucket of a realized gain or loss.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxCategory {
    LongTerm,
    ShortTerm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GainType {
    CapitalGain,
    CapitalLoss,
    CapitalNet,
}

/// A block of shares with one acquisition age and cost basis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxLot {
    pub lot_id: String,
    pub asset: AssetId,
    pub age_days: u32,
    /// Per share.
    pub cost_basis: f64,
    pub shares: f64,
    /// A disqualified lot cannot absorb a wash-sale disallowance.
    #[serde(default)]
    pub disqualified: bool,
}

impl TaxLot {
    pub fn value_at(&self, price: f64) -> f64 {
        self.shares * price
    }

    pub fn total_basis(&self) -> f64 {
        self.shares * self.cost_basis
    }
}

/// A disallowed loss carried into this rebalance from earlier sales.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WashSaleRecord {
    pub asset: AssetId,
    pub age_days: u32,
    pub loss_per_share: f64,
    pub shares: f64,
    #[serde(default)]
    pub disqualified: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    id: PortfolioId,
    holdings: BTreeMap<AssetId, f64>,
    #[serde(default)]
    lots: Vec<TaxLot>,
    #[serde(default)]
    wash_sales: Vec<WashSaleRecord>,
    /// Lots changed since weights were last derived from them.
    #[serde(default)]
    lot_weights_stale: bool,
    #[serde(default)]
    next_lot_seq: BTreeMap<AssetId, u32>,
}

impl Portfolio {
    pub fn new<S: Into<PortfolioId>>(id: S) -> Self {
        Self {
            id: id.into(),
            holdings: BTreeMap::new(),
            lots: Vec::new(),
            wash_sales: Vec::new(),
            lot_weights_stale: false,
            next_lot_seq: BTreeMap::new(),
        }
    }

    /// Build from weights directly (benchmarks, targets, test fixtures).
    pub fn from_weights<S, I, A>(id: S, weights: I) -> Self
    where
        S: Into<PortfolioId>,
        I: IntoIterator<Item = (A, f64)>,
        A: Into<AssetId>,
    {
        let mut p = Self::new(id);
        for (a, w) in weights {
            p.holdings.insert(a.into(), w);
        }
        p
    }

    pub fn id(&self) -> &PortfolioId {
        &self.id
    }

    pub fn holdings(&self) -> &BTreeMap<AssetId, f64> {
        &self.holdings
    }

    /// Weight of `asset`; 0 when not held.
    pub fn weight(&self, asset: &str) -> f64 {
        self.holdings.get(asset).copied().unwrap_or(0.0)
    }

    pub fn lots(&self) -> &[TaxLot] {
        &self.lots
    }

    pub fn lots_of<'a>(&'a self, asset: &'a str) -> impl Iterator<Item = &'a TaxLot> + 'a {
        self.lots.iter().filter(move |l| l.asset.as_str() == asset)
    }

    pub fn wash_sales(&self) -> &[WashSaleRecord] {
        &self.wash_sales
    }

    pub fn is_tax_aware(&self) -> bool {
        !self.lots.is_empty()
    }

    pub fn lot_weights_stale(&self) -> bool {
        self.lot_weights_stale
    }

    pub fn total_shares(&self, asset: &str) -> f64 {
        self.lots_of(asset).map(|l| l.shares).sum()
    }

    pub(crate) fn set_holding(&mut self, asset: AssetId, weight: f64) {
        self.holdings.insert(asset, weight);
    }

    pub(crate) fn replace_holdings(&mut self, holdings: BTreeMap<AssetId, f64>) {
        self.holdings = holdings;
        self.lot_weights_stale = false;
    }

    pub(crate) fn push_lot(
        &mut self,
        asset: AssetId,
        age_days: u32,
        cost_basis: f64,
        shares: f64,
    ) -> String {
        let seq = self.next_lot_seq.entry(asset.clone()).or_insert(0);
        *seq += 1;
        let lot_id = format!("{}#{}", asset, seq);
        self.lots.push(TaxLot {
            lot_id: lot_id.clone(),
            asset,
            age_days,
            cost_basis,
            shares,
            disqualified: false,
        });
        self.lot_weights_stale = true;
        lot_id
    }

    pub(crate) fn push_wash_sale(&mut self, record: WashSaleRecord) {
        self.wash_sales.push(record);
    }
}
