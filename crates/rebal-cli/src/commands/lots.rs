//! `rebal lots`: sell shares out of one portfolio's tax lots and print the
//! realized gains, wash sales and tax.

use anyhow::{Context, Result};
use rebal_assembly::{RebalanceProfile, RebalanceRequest};
use rebal_model::{AssetId, TaxCategory};
use rebal_tax::{LotBook, SellingOrderTable, TaxLotAccountant, TaxRuleResolver, TradeoffPolicy};

use super::{load_config, load_problem};

pub struct SaleArgs<'a> {
    pub portfolio: &'a str,
    pub asset: &'a str,
    pub shares: f64,
    pub price: f64,
    pub policy: TradeoffPolicy,
}

pub fn run(problem: &str, config_paths: &[String], args: SaleArgs<'_>) -> Result<()> {
    let mut request = load_problem(problem)?;
    if let Some((_, cfg)) = load_config(config_paths)? {
        request = cfg.apply(request);
    }

    let portfolio = request
        .ledger
        .portfolio(args.portfolio)
        .with_context(|| format!("portfolio '{}' not in the problem's ledger", args.portfolio))?;
    let (rules, orders) = tax_tables(&request, args.portfolio)?;

    let accountant = TaxLotAccountant::new(&request.universe, &rules, &orders);
    let asset = AssetId::from(args.asset);
    let book = LotBook::from_portfolio(portfolio);
    let held = book.shares_of(args.asset);

    let outcome = accountant
        .sell(&book, &asset, args.shares, args.price, 0.0)
        .with_context(|| format!("sale of {} '{}' failed", args.shares, args.asset))?
        .choose(args.policy);
    let rule = accountant.tax_rule(args.asset)?;
    let summary = outcome.summary();

    println!(
        "portfolio={} asset={} shares_requested={} shares_held={}",
        args.portfolio, args.asset, args.shares, held
    );
    for s in &outcome.slices {
        println!(
            "slice lot_id={} age_days={} category={} shares={} gain={:.2} state={:?}",
            s.lot_id,
            s.age_days,
            category_str(s.category),
            s.shares,
            s.gain(),
            s.state
        );
    }
    for a in &outcome.adjustments {
        println!(
            "wash_sale sold_lot={} replacement={} shares={} disallowed_loss={:.2}",
            a.sold_lot_id.as_deref().unwrap_or("-"),
            a.replacement,
            a.shares,
            a.disallowed_loss
        );
    }
    println!("long_term_net={:.2}", summary.category(TaxCategory::LongTerm).net());
    println!("short_term_net={:.2}", summary.category(TaxCategory::ShortTerm).net());
    println!("disallowed_loss={:.2}", outcome.disallowed_loss());
    println!("disallowed_shares={}", outcome.disallowed_shares());
    println!("tax={:.2}", summary.tax(rule));
    println!("remaining_shares={}", outcome.book().shares_of(args.asset));

    Ok(())
}

/// Rules for the portfolio's owner: an account's own profile, then its
/// group, then the request's base profile.
fn tax_tables(request: &RebalanceRequest, portfolio: &str) -> Result<(TaxRuleResolver, SellingOrderTable)> {
    let account = request
        .accounts
        .iter()
        .find(|a| a.initial_portfolio.as_str() == portfolio);
    let profile: &RebalanceProfile = account
        .and_then(|a| a.profile.as_ref())
        .unwrap_or(&request.profile);

    let group_rules = account
        .and_then(|a| a.group.as_deref())
        .and_then(|g| request.account_group(g))
        .and_then(|g| g.tax_rules.clone());
    let rules = profile
        .tax_rules
        .clone()
        .or(group_rules)
        .with_context(|| format!("no tax rules apply to portfolio '{portfolio}'. add them to the problem or set tax.default_rule in config"))?;
    let orders = profile.selling_orders.clone().unwrap_or_default();
    Ok((rules, orders))
}

fn category_str(c: TaxCategory) -> &'static str {
    match c {
        TaxCategory::LongTerm => "LONG_TERM",
        TaxCategory::ShortTerm => "SHORT_TERM",
    }
}
