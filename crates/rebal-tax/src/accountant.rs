//! Lot-level sale and purchase simulation.
//!
//! # Lot lifecycle
//!
//! ```text
//!    Open ──Consume(rest > 0)──► PartiallyConsumed ──Consume──► …
//!      │                                 │
//!      └──────Consume(rest = 0)──────────┴──► FullyConsumed
//!                                                 │
//!                                  Realize ◄──────┴──────► Disallow
//!                                     │                        │
//!                              Realized (term.)        Disallowed (term.)
//! ```
//!
//! Every consumed slice ends Realized (gain/loss booked) or Disallowed
//! (wash-sale blocked loss). A slice is split when only part of its loss
//! finds replacement shares, so each slice is wholly one or the other.
//!
//! `LotBook::sell` is pure: it returns the outcome together with the book
//! after the sale and leaves `self` untouched. `commit` installs a chosen
//! outcome. Under a TRADEOFF wash-sale rule both outcomes come back and the
//! caller picks.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use rebal_model::{AssetId, AssetUniverse, Portfolio, PortfolioId, PriceMap, TaxCategory, TaxLot};

use crate::report::{GainLossSummary, TaxReport};
use crate::rules::{RuleError, SellingOrder, SellingOrderTable, TaxRule, TaxRuleResolver, WashSaleRule};

/// Share quantities closer than this are treated as equal.
pub const SHARE_EPS: f64 = 1e-9;

// ─── LotState ─────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotState {
    Open,
    PartiallyConsumed,
    FullyConsumed,
    /// Gain or loss booked. **Terminal.**
    Realized,
    /// Loss blocked by a wash sale. **Terminal.**
    Disallowed,
}

impl LotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Realized | Self::Disallowed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LotEvent {
    Consume { remaining: f64 },
    Realize,
    Disallow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: LotState,
    pub event: String,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal lot transition: {:?} + {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

pub fn transition(from: LotState, event: &LotEvent) -> Result<LotState, TransitionError> {
    use LotEvent::*;
    use LotState::*;

    match (from, event) {
        (Open | PartiallyConsumed, Consume { remaining }) if *remaining > SHARE_EPS => {
            Ok(PartiallyConsumed)
        }
        (Open | PartiallyConsumed, Consume { .. }) => Ok(FullyConsumed),
        (FullyConsumed, Realize) => Ok(Realized),
        (FullyConsumed, Disallow) => Ok(Disallowed),
        (from, event) => Err(TransitionError {
            from,
            event: format!("{event:?}"),
        }),
    }
}

// ─── AccountingError ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum AccountingError {
    InvalidQuantity { asset: AssetId, shares: f64 },
    InvalidPrice { asset: AssetId, price: f64 },
    InsufficientShares {
        asset: AssetId,
        requested: f64,
        available: f64,
    },
    MissingPrice { asset: AssetId },
    Rule(RuleError),
    Transition(TransitionError),
}

impl fmt::Display for AccountingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidQuantity { asset, shares } => {
                write!(f, "'{asset}': share quantity {shares} must be finite and > 0")
            }
            Self::InvalidPrice { asset, price } => {
                write!(f, "'{asset}': price {price} must be finite and >= 0")
            }
            Self::InsufficientShares {
                asset,
                requested,
                available,
            } => write!(
                f,
                "'{asset}': cannot sell {requested} shares, only {available} held in lots"
            ),
            Self::MissingPrice { asset } => write!(f, "'{asset}': no price for trade"),
            Self::Rule(e) => write!(f, "{e}"),
            Self::Transition(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AccountingError {}

impl From<RuleError> for AccountingError {
    fn from(e: RuleError) -> Self {
        Self::Rule(e)
    }
}

impl From<TransitionError> for AccountingError {
    fn from(e: TransitionError) -> Self {
        Self::Transition(e)
    }
}

// ─── Outcome types ────────────────────────────────────────────────────────────

/// Shares cut from one lot by a sale.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsumedSlice {
    pub lot_id: String,
    pub asset: AssetId,
    pub age_days: u32,
    pub cost_basis: f64,
    pub shares: f64,
    pub sale_price: f64,
    pub category: TaxCategory,
    pub state: LotState,
}

impl ConsumedSlice {
    /// (sale price − cost basis) × shares, before any disallowance.
    pub fn gain(&self) -> f64 {
        (self.sale_price - self.cost_basis) * self.shares
    }

    pub fn is_disallowed(&self) -> bool {
        self.state == LotState::Disallowed
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "lot_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Replacement {
    Lot(String),
    /// A purchase announced to the sale; adjusted when it is booked.
    PlannedPurchase,
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lot(id) => write!(f, "{id}"),
            Self::PlannedPurchase => write!(f, "planned"),
        }
    }
}

/// One share-for-share wash-sale match.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WashSaleAdjustment {
    /// Sold lot, or `None` for a record carried in from before this run.
    pub sold_lot_id: Option<String>,
    pub replacement: Replacement,
    pub asset: AssetId,
    pub shares: f64,
    /// Added to the replacement's total cost basis.
    pub disallowed_loss: f64,
    pub age_carried_days: u32,
}

/// Disallowed loss waiting for a purchase to absorb it.
#[derive(Clone, Debug, PartialEq, Serialize)]
struct PendingDisallowance {
    asset: AssetId,
    sold_lot_id: Option<String>,
    loss_per_share: f64,
    shares: f64,
    /// Days since the loss sale.
    sale_age_days: u32,
    carried_age_days: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaleOutcome {
    pub asset: AssetId,
    pub slices: Vec<ConsumedSlice>,
    pub adjustments: Vec<WashSaleAdjustment>,
    book: LotBook,
}

impl SaleOutcome {
    /// Gain/loss over realized slices only.
    pub fn summary(&self) -> GainLossSummary {
        GainLossSummary::from_slices(self.slices.iter())
    }

    /// Loss before any disallowance, as a positive amount.
    pub fn gross_loss(&self) -> f64 {
        self.slices.iter().map(|s| (-s.gain()).max(0.0)).sum()
    }

    pub fn disallowed_loss(&self) -> f64 {
        self.slices
            .iter()
            .filter(|s| s.is_disallowed())
            .map(|s| -s.gain())
            .sum()
    }

    pub fn disallowed_shares(&self) -> f64 {
        self.slices
            .iter()
            .filter(|s| s.is_disallowed())
            .map(|s| s.shares)
            .sum()
    }

    /// The book as it stands after this sale.
    pub fn book(&self) -> &LotBook {
        &self.book
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SaleResult {
    Settled(SaleOutcome),
    /// TRADEOFF rule: both outcomes; the caller commits one.
    Tradeoff {
        disallowed: SaleOutcome,
        allowed: SaleOutcome,
    },
}

impl SaleResult {
    pub fn choose(self, policy: TradeoffPolicy) -> SaleOutcome {
        match self {
            Self::Settled(o) => o,
            Self::Tradeoff {
                disallowed,
                allowed,
            } => match policy {
                TradeoffPolicy::Disallow => disallowed,
                TradeoffPolicy::Allow => allowed,
            },
        }
    }
}

/// Which TRADEOFF outcome a batch simulation commits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeoffPolicy {
    #[default]
    Disallow,
    Allow,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuyOutcome {
    pub lot_ids: Vec<String>,
    pub adjustments: Vec<WashSaleAdjustment>,
}

// ─── LotBook ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedLot {
    pub lot: TaxLot,
    pub state: LotState,
}

/// Open lots of one portfolio plus disallowances waiting for a purchase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LotBook {
    portfolio: PortfolioId,
    lots: Vec<TrackedLot>,
    pending: Vec<PendingDisallowance>,
    next_seq: BTreeMap<AssetId, u32>,
}

fn lot_seq(lot_id: &str) -> Option<u32> {
    lot_id.rsplit_once('#').and_then(|(_, n)| n.parse().ok())
}

impl LotBook {
    pub fn new<P: Into<PortfolioId>>(portfolio: P) -> Self {
        Self {
            portfolio: portfolio.into(),
            lots: Vec::new(),
            pending: Vec::new(),
            next_seq: BTreeMap::new(),
        }
    }

    /// Lots start Open; non-disqualified wash-sale records become pending
    /// disallowances.
    pub fn from_portfolio(p: &Portfolio) -> Self {
        let mut book = Self::new(p.id().clone());
        for lot in p.lots() {
            book.bump_seq(&lot.asset, &lot.lot_id);
            book.lots.push(TrackedLot {
                lot: lot.clone(),
                state: LotState::Open,
            });
        }
        for r in p.wash_sales().iter().filter(|r| !r.disqualified) {
            book.pending.push(PendingDisallowance {
                asset: r.asset.clone(),
                sold_lot_id: None,
                loss_per_share: r.loss_per_share,
                shares: r.shares,
                sale_age_days: r.age_days,
                carried_age_days: 0,
            });
        }
        book
    }

    fn bump_seq(&mut self, asset: &AssetId, lot_id: &str) {
        let n = lot_seq(lot_id).unwrap_or(0);
        let next = self.next_seq.entry(asset.clone()).or_insert(1);
        *next = (*next).max(n + 1);
    }

    fn next_lot_id(&mut self, asset: &AssetId) -> String {
        let next = self.next_seq.entry(asset.clone()).or_insert(1);
        let id = format!("{asset}#{next}");
        *next += 1;
        id
    }

    pub fn portfolio(&self) -> &PortfolioId {
        &self.portfolio
    }

    pub fn lots(&self) -> impl Iterator<Item = &TrackedLot> + '_ {
        self.lots.iter()
    }

    pub fn lots_of<'a>(&'a self, asset: &'a str) -> impl Iterator<Item = &'a TaxLot> + 'a {
        self.lots
            .iter()
            .filter(move |t| t.lot.asset.as_str() == asset)
            .map(|t| &t.lot)
    }

    pub fn lot(&self, lot_id: &str) -> Option<&TaxLot> {
        self.lots.iter().map(|t| &t.lot).find(|l| l.lot_id == lot_id)
    }

    pub fn shares_of(&self, asset: &str) -> f64 {
        self.lots_of(asset).map(|l| l.shares).sum()
    }

    pub fn pending_shares(&self, asset: &str) -> f64 {
        self.pending
            .iter()
            .filter(|p| p.asset.as_str() == asset)
            .map(|p| p.shares)
            .sum()
    }

    /// Install the book left by a chosen sale outcome.
    pub fn commit(&mut self, outcome: &SaleOutcome) {
        *self = outcome.book.clone();
    }

    // ─── Sell ─────────────────────────────────────────────────────────────

    /// Simulate selling `shares` of `asset` at `price`.
    ///
    /// `planned_purchase` shares of the same asset, bought later inside the
    /// wash-sale window, count as replacements alongside young open lots.
    pub fn sell(
        &self,
        asset: &AssetId,
        shares: f64,
        price: f64,
        rule: &TaxRule,
        order: SellingOrder,
        planned_purchase: f64,
    ) -> Result<SaleResult, AccountingError> {
        if !(shares > 0.0 && shares.is_finite()) {
            return Err(AccountingError::InvalidQuantity {
                asset: asset.clone(),
                shares,
            });
        }
        if !(planned_purchase >= 0.0 && planned_purchase.is_finite()) {
            return Err(AccountingError::InvalidQuantity {
                asset: asset.clone(),
                shares: planned_purchase,
            });
        }
        if !(price >= 0.0 && price.is_finite()) {
            return Err(AccountingError::InvalidPrice {
                asset: asset.clone(),
                price,
            });
        }
        let available = self.shares_of(asset.as_str());
        if shares > available + SHARE_EPS {
            return Err(AccountingError::InsufficientShares {
                asset: asset.clone(),
                requested: shares,
                available,
            });
        }

        let run = |window| self.execute(asset, shares, price, rule, order, planned_purchase, window);
        Ok(match rule.wash_sale {
            WashSaleRule::None => SaleResult::Settled(run(None)?),
            WashSaleRule::Disallowed { window_days } => SaleResult::Settled(run(Some(window_days))?),
            WashSaleRule::Tradeoff { window_days } => SaleResult::Tradeoff {
                disallowed: run(Some(window_days))?,
                allowed: run(None)?,
            },
        })
    }

    /// `(index, shares)` pairs in consumption order.
    fn consumption_plan(&self, asset: &AssetId, shares: f64, order: SellingOrder) -> Vec<(usize, f64)> {
        let mut idx: Vec<usize> = (0..self.lots.len())
            .filter(|&i| self.lots[i].lot.asset == *asset && self.lots[i].lot.shares > SHARE_EPS)
            .collect();

        if order == SellingOrder::Proportional {
            let available: f64 = idx.iter().map(|&i| self.lots[i].lot.shares).sum();
            let everything = (shares - available).abs() <= SHARE_EPS;
            return idx
                .into_iter()
                .map(|i| {
                    let held = self.lots[i].lot.shares;
                    (i, if everything { held } else { shares * held / available })
                })
                .collect();
        }

        let lot = |i: &usize| &self.lots[*i].lot;
        match order {
            SellingOrder::Fifo => idx.sort_by(|a, b| lot(b).age_days.cmp(&lot(a).age_days)),
            SellingOrder::Lifo => idx.sort_by(|a, b| lot(a).age_days.cmp(&lot(b).age_days)),
            SellingOrder::Hifo => idx.sort_by(|a, b| lot(b).cost_basis.total_cmp(&lot(a).cost_basis)),
            SellingOrder::Lofo => idx.sort_by(|a, b| lot(a).cost_basis.total_cmp(&lot(b).cost_basis)),
            SellingOrder::Proportional => {}
        }

        let mut need = shares;
        let mut plan = Vec::new();
        for i in idx {
            if need <= SHARE_EPS {
                break;
            }
            let held = self.lots[i].lot.shares;
            let take = if held - need <= SHARE_EPS { held } else { need };
            plan.push((i, take));
            need -= take;
        }
        plan
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        asset: &AssetId,
        shares: f64,
        price: f64,
        rule: &TaxRule,
        order: SellingOrder,
        planned_purchase: f64,
        window: Option<u32>,
    ) -> Result<SaleOutcome, AccountingError> {
        let mut book = self.clone();
        let plan = book.consumption_plan(asset, shares, order);

        // Each cut piece is wholly consumed; its state moves on when booked.
        let mut cut: Vec<(TaxLot, LotState)> = Vec::new();
        for (i, take) in plan {
            let tracked = &mut book.lots[i];
            let remaining = tracked.lot.shares - take;
            tracked.state = transition(tracked.state, &LotEvent::Consume { remaining })?;
            let mut piece = tracked.lot.clone();
            piece.shares = take;
            tracked.lot.shares = remaining.max(0.0);
            cut.push((piece, LotState::FullyConsumed));
        }
        book.lots.retain(|t| t.state != LotState::FullyConsumed);

        // Replacement capacity is what each lot still holds after the sale,
        // earliest acquired first, then planned purchases.
        let mut capacity: Vec<(usize, f64)> = match window {
            Some(w) => {
                let mut c: Vec<usize> = (0..book.lots.len())
                    .filter(|&i| {
                        let l = &book.lots[i].lot;
                        l.asset == *asset && !l.disqualified && l.age_days <= w
                    })
                    .collect();
                c.sort_by(|a, b| book.lots[*b].lot.age_days.cmp(&book.lots[*a].lot.age_days));
                c.into_iter().map(|i| (i, book.lots[i].lot.shares)).collect()
            }
            None => Vec::new(),
        };
        let mut planned_left = if window.is_some() { planned_purchase } else { 0.0 };

        struct Match {
            lot: Option<usize>,
            shares: f64,
            loss_per_share: f64,
            sold_age: u32,
            sold_lot_id: String,
        }
        let mut matches: Vec<Match> = Vec::new();
        let mut slices: Vec<ConsumedSlice> = Vec::new();

        for (piece, state) in cut {
            let category = rule.category_for(piece.age_days);
            let loss_per_share = piece.cost_basis - price;
            let mut matched = 0.0;

            if window.is_some() && loss_per_share > 0.0 {
                let mut need = piece.shares;
                for (i, cap) in capacity.iter_mut() {
                    if need <= SHARE_EPS {
                        break;
                    }
                    // A lot never replaces shares cut from itself.
                    if book.lots[*i].lot.lot_id == piece.lot_id {
                        continue;
                    }
                    let take = cap.min(need);
                    if take <= SHARE_EPS {
                        continue;
                    }
                    *cap -= take;
                    need -= take;
                    matches.push(Match {
                        lot: Some(*i),
                        shares: take,
                        loss_per_share,
                        sold_age: piece.age_days,
                        sold_lot_id: piece.lot_id.clone(),
                    });
                }
                let take = planned_left.min(need);
                if take > SHARE_EPS {
                    planned_left -= take;
                    need -= take;
                    matches.push(Match {
                        lot: None,
                        shares: take,
                        loss_per_share,
                        sold_age: piece.age_days,
                        sold_lot_id: piece.lot_id.clone(),
                    });
                }
                matched = piece.shares - need;
            }

            let slice = |shares: f64, event: LotEvent| -> Result<ConsumedSlice, TransitionError> {
                Ok(ConsumedSlice {
                    lot_id: piece.lot_id.clone(),
                    asset: piece.asset.clone(),
                    age_days: piece.age_days,
                    cost_basis: piece.cost_basis,
                    shares,
                    sale_price: price,
                    category,
                    state: transition(state, &event)?,
                })
            };
            if matched > SHARE_EPS {
                slices.push(slice(matched, LotEvent::Disallow)?);
            }
            let rest = piece.shares - matched;
            if rest > SHARE_EPS {
                slices.push(slice(rest, LotEvent::Realize)?);
            }
        }

        let mut adjustments = Vec::new();
        for m in matches {
            let replacement = match m.lot {
                Some(i) => {
                    let id = book.adjust_replacement(i, m.shares, m.loss_per_share, m.sold_age);
                    Replacement::Lot(id)
                }
                None => {
                    book.pending.push(PendingDisallowance {
                        asset: asset.clone(),
                        sold_lot_id: Some(m.sold_lot_id.clone()),
                        loss_per_share: m.loss_per_share,
                        shares: m.shares,
                        sale_age_days: 0,
                        carried_age_days: m.sold_age,
                    });
                    Replacement::PlannedPurchase
                }
            };
            adjustments.push(WashSaleAdjustment {
                sold_lot_id: Some(m.sold_lot_id),
                replacement,
                asset: asset.clone(),
                shares: m.shares,
                disallowed_loss: m.shares * m.loss_per_share,
                age_carried_days: m.sold_age,
            });
        }

        Ok(SaleOutcome {
            asset: asset.clone(),
            slices,
            adjustments,
            book,
        })
    }

    /// Raise basis and age on `shares` of lot `i`, splitting it when only part
    /// is matched. Returns the id of the adjusted lot.
    fn adjust_replacement(&mut self, i: usize, shares: f64, loss_per_share: f64, sold_age: u32) -> String {
        let held = self.lots[i].lot.shares;
        if held - shares <= SHARE_EPS {
            let l = &mut self.lots[i].lot;
            l.cost_basis += loss_per_share;
            l.age_days = l.age_days.saturating_add(sold_age);
            l.disqualified = true;
            return l.lot_id.clone();
        }
        let asset = self.lots[i].lot.asset.clone();
        let id = self.next_lot_id(&asset);
        let original = &mut self.lots[i];
        original.lot.shares = held - shares;
        let mut adjusted = original.lot.clone();
        adjusted.lot_id = id.clone();
        adjusted.shares = shares;
        adjusted.cost_basis += loss_per_share;
        adjusted.age_days = adjusted.age_days.saturating_add(sold_age);
        adjusted.disqualified = true;
        self.lots.push(TrackedLot {
            lot: adjusted,
            state: LotState::Open,
        });
        id
    }

    // ─── Buy ──────────────────────────────────────────────────────────────

    /// Open a lot of `shares` at age 0 and basis `price`.
    ///
    /// Pending disallowances on the asset within `window_days` are absorbed
    /// share for share; the absorbed part becomes its own disqualified lot.
    pub fn buy(
        &mut self,
        asset: &AssetId,
        shares: f64,
        price: f64,
        window_days: Option<u32>,
    ) -> Result<BuyOutcome, AccountingError> {
        if !(shares > 0.0 && shares.is_finite()) {
            return Err(AccountingError::InvalidQuantity {
                asset: asset.clone(),
                shares,
            });
        }
        if !(price >= 0.0 && price.is_finite()) {
            return Err(AccountingError::InvalidPrice {
                asset: asset.clone(),
                price,
            });
        }

        let mut left = shares;
        let mut lot_ids = Vec::new();
        let mut adjustments = Vec::new();

        if let Some(w) = window_days {
            for p in self.pending.iter_mut() {
                if left <= SHARE_EPS {
                    break;
                }
                if p.asset != *asset || p.sale_age_days > w || p.shares <= SHARE_EPS {
                    continue;
                }
                let take = p.shares.min(left);
                p.shares -= take;
                left -= take;
                let lot_id = {
                    let next = self.next_seq.entry(asset.clone()).or_insert(1);
                    let id = format!("{asset}#{next}");
                    *next += 1;
                    id
                };
                self.lots.push(TrackedLot {
                    lot: TaxLot {
                        lot_id: lot_id.clone(),
                        asset: asset.clone(),
                        age_days: p.carried_age_days,
                        cost_basis: price + p.loss_per_share,
                        shares: take,
                        disqualified: true,
                    },
                    state: LotState::Open,
                });
                adjustments.push(WashSaleAdjustment {
                    sold_lot_id: p.sold_lot_id.clone(),
                    replacement: Replacement::Lot(lot_id.clone()),
                    asset: asset.clone(),
                    shares: take,
                    disallowed_loss: take * p.loss_per_share,
                    age_carried_days: p.carried_age_days,
                });
                lot_ids.push(lot_id);
            }
            self.pending.retain(|p| p.shares > SHARE_EPS);
        }

        if left > SHARE_EPS {
            let lot_id = self.next_lot_id(asset);
            self.lots.push(TrackedLot {
                lot: TaxLot {
                    lot_id: lot_id.clone(),
                    asset: asset.clone(),
                    age_days: 0,
                    cost_basis: price,
                    shares: left,
                    disqualified: false,
                },
                state: LotState::Open,
            });
            lot_ids.push(lot_id);
        }

        Ok(BuyOutcome {
            lot_ids,
            adjustments,
        })
    }
}

// ─── TaxLotAccountant ─────────────────────────────────────────────────────────

/// Resolves rules per asset and drives a `LotBook` through a set of trades.
#[derive(Clone, Copy)]
pub struct TaxLotAccountant<'a> {
    universe: &'a AssetUniverse,
    tax_rules: &'a TaxRuleResolver,
    selling_orders: &'a SellingOrderTable,
}

impl<'a> TaxLotAccountant<'a> {
    pub fn new(
        universe: &'a AssetUniverse,
        tax_rules: &'a TaxRuleResolver,
        selling_orders: &'a SellingOrderTable,
    ) -> Self {
        Self {
            universe,
            tax_rules,
            selling_orders,
        }
    }

    pub fn tax_rule(&self, asset: &str) -> Result<&'a TaxRule, AccountingError> {
        Ok(self.tax_rules.resolve_id(self.universe, asset)?)
    }

    /// Falls back to FIFO when the selling-order table is empty.
    pub fn selling_order(&self, asset: &str) -> Result<SellingOrder, AccountingError> {
        if self.selling_orders.is_empty() {
            return Ok(SellingOrder::default());
        }
        Ok(*self.selling_orders.resolve_id(self.universe, asset)?)
    }

    pub fn sell(
        &self,
        book: &LotBook,
        asset: &AssetId,
        shares: f64,
        price: f64,
        planned_purchase: f64,
    ) -> Result<SaleResult, AccountingError> {
        let rule = self.tax_rule(asset.as_str())?;
        let order = self.selling_order(asset.as_str())?;
        book.sell(asset, shares, price, rule, order, planned_purchase)
    }

    pub fn buy(
        &self,
        book: &mut LotBook,
        asset: &AssetId,
        shares: f64,
        price: f64,
    ) -> Result<BuyOutcome, AccountingError> {
        let window = self.tax_rule(asset.as_str())?.wash_sale.window_days();
        book.buy(asset, shares, price, window)
    }

    /// Apply net share trades (negative = sell): every sell first, then every
    /// buy, each in asset-id order.
    pub fn apply_trades(
        &self,
        book: &LotBook,
        trades: &BTreeMap<AssetId, f64>,
        prices: &PriceMap,
        policy: TradeoffPolicy,
    ) -> Result<TaxReport, AccountingError> {
        let price_of = |a: &AssetId| {
            prices
                .get(a.as_str())
                .map_err(|_| AccountingError::MissingPrice { asset: a.clone() })
        };

        let mut book = book.clone();
        let mut slices = Vec::new();
        let mut adjustments = Vec::new();
        let mut new_lots = Vec::new();

        for (asset, qty) in trades.iter().filter(|(_, q)| **q < -SHARE_EPS) {
            let outcome = self
                .sell(&book, asset, -qty, price_of(asset)?, 0.0)?
                .choose(policy);
            book.commit(&outcome);
            slices.extend(outcome.slices);
            adjustments.extend(outcome.adjustments);
        }
        for (asset, qty) in trades.iter().filter(|(_, q)| **q > SHARE_EPS) {
            let bought = self.buy(&mut book, asset, *qty, price_of(asset)?)?;
            new_lots.extend(bought.lot_ids);
            adjustments.extend(bought.adjustments);
        }

        let mut rules = BTreeMap::new();
        for s in &slices {
            if !rules.contains_key(&s.asset) {
                rules.insert(s.asset.clone(), *self.tax_rule(s.asset.as_str())?);
            }
        }
        Ok(TaxReport::new(book, slices, adjustments, new_lots, &rules))
    }
}
