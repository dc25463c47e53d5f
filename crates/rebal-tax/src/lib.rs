//! rebal-tax
//!
//! Tax rule resolution and tax-lot bookkeeping for tax-aware rebalances:
//! - specificity-ranked `(group, value)` rule tables for tax and selling-order rules
//! - lot consumption by selling order with long/short-term categorization
//! - wash-sale disallowance onto replacement lots (TRADEOFF returns both outcomes)
//! - realized gain/loss summaries, tax liability, ex-post tax constraint checks
//!
//! Pure deterministic logic (no IO, no solver wiring).

mod report;

pub mod accountant;
pub mod rules;

pub use accountant::{
    transition, AccountingError, BuyOutcome, ConsumedSlice, LotBook, LotEvent, LotState,
    Replacement, SaleOutcome, SaleResult, TaxLotAccountant, TrackedLot, TradeoffPolicy,
    TransitionError, WashSaleAdjustment, SHARE_EPS,
};
pub use report::{GainLoss, GainLossSummary, TaxReport};
pub use rules::{
    Pattern, RuleEntry, RuleError, RuleTable, SellingOrder, SellingOrderTable, TaxRule,
    TaxRuleResolver, WashSaleRule, DEFAULT_SHORT_TERM_PERIOD_DAYS, DEFAULT_WASH_SALE_WINDOW_DAYS,
    WILDCARD,
};
