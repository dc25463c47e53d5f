//! Scenario: rule resolution feeding lot-level sales across a small universe.
//!
//! GREEN when:
//! - a Tech asset resolves the (SECTOR, Tech) rules and everything else the
//!   (*, *) rules; removing the Tech rule falls back to (*, *);
//! - FIFO sells the oldest lot first and leaves the remainder intact;
//! - the 364/365-day boundary splits short- and long-term gains;
//! - a wash-sale loss of $X is removed from reported loss and lands on the
//!   replacement lot's total cost basis;
//! - `apply_trades` books sells before buys and reports tax per asset rule.

use std::collections::BTreeMap;

use rebal_model::{Asset, AssetId, AssetUniverse, PortfolioLedger, PriceMap, TaxCategory};
use rebal_tax::{
    LotBook, SaleResult, SellingOrder, SellingOrderTable, TaxLotAccountant, TaxRule,
    TaxRuleResolver, TradeoffPolicy, WashSaleRule,
};

fn universe() -> AssetUniverse {
    let mut u = AssetUniverse::new();
    u.add_asset(Asset::regular("MSFT").with_group("SECTOR", "Tech")).unwrap();
    u.add_asset(Asset::regular("XOM").with_group("SECTOR", "Energy")).unwrap();
    u.add_asset(Asset::regular("IBM").with_group("SECTOR", "Tech")).unwrap();
    u.add_asset(Asset::cash("CASH")).unwrap();
    u
}

fn ledger() -> PortfolioLedger {
    let mut l = PortfolioLedger::new();
    l.create_portfolio("Account").unwrap();
    l.add_tax_lot("Account", "MSFT", 400, 200.0, 10.0).unwrap();
    l.add_tax_lot("Account", "MSFT", 100, 260.0, 10.0).unwrap();
    l.add_tax_lot("Account", "XOM", 364, 50.0, 20.0).unwrap();
    l.add_tax_lot("Account", "XOM", 365, 50.0, 20.0).unwrap();
    l.add_tax_lot("Account", "IBM", 500, 150.0, 10.0).unwrap();
    l.add_tax_lot("Account", "IBM", 12, 118.0, 10.0).unwrap();
    l
}

fn tax_rules() -> TaxRuleResolver {
    TaxRuleResolver::new()
        .with_rule("*", "*", TaxRule::two_rate(0.15, 0.35))
        .unwrap()
        .with_rule(
            "SECTOR",
            "Tech",
            TaxRule::two_rate(0.20, 0.40).with_wash_sale(WashSaleRule::Disallowed { window_days: 30 }),
        )
        .unwrap()
}

#[test]
fn scenario_rule_precedence_and_removal() {
    let u = universe();
    let mut rules = tax_rules();
    let tech = rules.resolve_id(&u, "MSFT").unwrap();
    assert_eq!(tech.long_term_rate, 0.20);
    let other = rules.resolve_id(&u, "XOM").unwrap();
    assert_eq!(other.long_term_rate, 0.15);

    rules.remove_rule("SECTOR", "Tech").unwrap();
    assert_eq!(rules.resolve_id(&u, "MSFT").unwrap().long_term_rate, 0.15);
}

#[test]
fn scenario_fifo_and_category_boundary() {
    let u = universe();
    let l = ledger();
    let rules = tax_rules();
    let orders = SellingOrderTable::new()
        .with_rule("*", "*", SellingOrder::Fifo)
        .unwrap();
    let acct = TaxLotAccountant::new(&u, &rules, &orders);
    let book = LotBook::from_portfolio(l.portfolio("Account").unwrap());

    // XOM lots: 364 days then 365 days; FIFO takes the 365-day lot first.
    let out = acct
        .sell(&book, &AssetId::new("XOM"), 30.0, 60.0, 0.0)
        .unwrap()
        .choose(TradeoffPolicy::Disallow);
    assert_eq!(out.slices[0].age_days, 365);
    assert_eq!(out.slices[0].category, TaxCategory::LongTerm);
    assert_eq!(out.slices[1].age_days, 364);
    assert_eq!(out.slices[1].category, TaxCategory::ShortTerm);
    let s = out.summary();
    assert!((s.category(TaxCategory::LongTerm).gain - 200.0).abs() < 1e-9);
    assert!((s.category(TaxCategory::ShortTerm).gain - 100.0).abs() < 1e-9);
    let rest: Vec<_> = out.book().lots_of("XOM").map(|l| (l.age_days, l.shares)).collect();
    assert_eq!(rest, vec![(364, 10.0)]);
}

#[test]
fn scenario_wash_sale_moves_loss() {
    let u = universe();
    let l = ledger();
    let rules = tax_rules();
    let orders = SellingOrderTable::new();
    let acct = TaxLotAccountant::new(&u, &rules, &orders);
    let book = LotBook::from_portfolio(l.portfolio("Account").unwrap());

    // IBM: old lot basis 150 sold at 120 => $300 loss, 12-day lot is the replacement.
    let out = match acct.sell(&book, &AssetId::new("IBM"), 10.0, 120.0, 0.0).unwrap() {
        SaleResult::Settled(o) => o,
        other => panic!("expected settled, got {other:?}"),
    };
    let x = 300.0;
    assert!((out.gross_loss() - x).abs() < 1e-9);
    assert!((out.disallowed_loss() - x).abs() < 1e-9);
    assert!((out.summary().total().loss - (out.gross_loss() - x)).abs() < 1e-9);

    let before = book.lot("IBM#2").unwrap().total_basis();
    let after = out.book().lot("IBM#2").unwrap().total_basis();
    assert!((after - before - x).abs() < 1e-9);
    assert_eq!(out.book().lot("IBM#2").unwrap().age_days, 512);
}

#[test]
fn scenario_apply_trades_reports_tax() {
    let u = universe();
    let l = ledger();
    let rules = tax_rules();
    let orders = SellingOrderTable::new()
        .with_rule("*", "*", SellingOrder::Hifo)
        .unwrap();
    let acct = TaxLotAccountant::new(&u, &rules, &orders);
    let book = LotBook::from_portfolio(l.portfolio("Account").unwrap());

    let prices = PriceMap::new()
        .with("MSFT", 300.0)
        .with("XOM", 60.0)
        .with("IBM", 130.0);
    let mut trades = BTreeMap::new();
    trades.insert(AssetId::new("MSFT"), -10.0);
    trades.insert(AssetId::new("XOM"), 5.0);

    let report = acct
        .apply_trades(&book, &trades, &prices, TradeoffPolicy::Disallow)
        .unwrap();

    // HIFO sells the 260-basis MSFT lot: short-term gain 400 at 40%.
    assert!((report.summary.category(TaxCategory::ShortTerm).gain - 400.0).abs() < 1e-9);
    assert!((report.total_tax - 160.0).abs() < 1e-9);
    assert_eq!(report.new_lot_ids, vec!["XOM#3".to_string()]);

    let out = report.to_output(Some("Account"), &u, Some("SECTOR"));
    assert_eq!(out.new_lots.len(), 1);
    assert!(out.gain_loss.iter().any(|r| r.value.as_deref() == Some("Tech")));
}
