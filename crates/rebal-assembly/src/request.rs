//! Assembly inputs: the universe, ledger and profiles plus the
//! account / period topology they are spread over.
//!
//! Every combinator consumes the request and returns a new one; nothing is
//! shared between accounts or periods by reference.

use serde::{Deserialize, Serialize};

use rebal_constraints::ConstraintCatalog;
use rebal_model::{AlphaMap, AssetUniverse, PortfolioId, PortfolioLedger};
use rebal_tax::TaxRuleResolver;

use crate::profile::{JobParams, RebalanceProfile};

/// One account of a multi-account rebalance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub id: String,
    pub initial_portfolio: PortfolioId,
    #[serde(default)]
    pub base_value: Option<f64>,
    /// Replaces the request's base profile for this account.
    #[serde(default)]
    pub profile: Option<RebalanceProfile>,
    #[serde(default)]
    pub group: Option<String>,
}

impl AccountSpec {
    pub fn new<S: Into<String>, P: Into<PortfolioId>>(id: S, initial_portfolio: P) -> Self {
        Self {
            id: id.into(),
            initial_portfolio: initial_portfolio.into(),
            base_value: None,
            profile: None,
            group: None,
        }
    }

    pub fn with_base_value(mut self, value: f64) -> Self {
        self.base_value = Some(value);
        self
    }

    pub fn with_profile(mut self, profile: RebalanceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn in_group<S: Into<String>>(mut self, group: S) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Accounts taxed together, e.g. under a joint tax limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub id: String,
    /// Used by member accounts whose profile carries no tax rules.
    #[serde(default)]
    pub tax_rules: Option<TaxRuleResolver>,
    /// Constraints spanning every member account.
    #[serde(default)]
    pub catalog: ConstraintCatalog,
}

impl AccountGroup {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            tax_rules: None,
            catalog: ConstraintCatalog::default(),
        }
    }

    pub fn with_tax_rules(mut self, rules: TaxRuleResolver) -> Self {
        self.tax_rules = Some(rules);
        self
    }

    pub fn with_catalog(mut self, catalog: ConstraintCatalog) -> Self {
        self.catalog = catalog;
        self
    }
}

/// One step of a multi-period rebalance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodSpec {
    pub index: u32,
    pub profile: RebalanceProfile,
}

impl PeriodSpec {
    pub fn new(index: u32, profile: RebalanceProfile) -> Self {
        Self { index, profile }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topology {
    Single,
    MultiAccount,
    MultiPeriod,
}

/// Everything `assemble` reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RebalanceRequest {
    pub universe: AssetUniverse,
    pub ledger: PortfolioLedger,
    #[serde(default)]
    pub alpha: AlphaMap,
    /// Starting holdings for single-account and multi-period runs.
    #[serde(default)]
    pub initial_portfolio: Option<PortfolioId>,
    pub profile: RebalanceProfile,
    #[serde(default)]
    pub accounts: Vec<AccountSpec>,
    #[serde(default)]
    pub account_groups: Vec<AccountGroup>,
    #[serde(default)]
    pub periods: Vec<PeriodSpec>,
    /// Constraints spanning every period.
    #[serde(default)]
    pub cross_period: ConstraintCatalog,
    #[serde(default)]
    pub job: JobParams,
}

impl RebalanceRequest {
    pub fn new(universe: AssetUniverse, ledger: PortfolioLedger, profile: RebalanceProfile) -> Self {
        Self {
            universe,
            ledger,
            alpha: AlphaMap::new(),
            initial_portfolio: None,
            profile,
            accounts: Vec::new(),
            account_groups: Vec::new(),
            periods: Vec::new(),
            cross_period: ConstraintCatalog::default(),
            job: JobParams::default(),
        }
    }

    pub fn with_alpha(mut self, alpha: AlphaMap) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_initial_portfolio<P: Into<PortfolioId>>(mut self, portfolio: P) -> Self {
        self.initial_portfolio = Some(portfolio.into());
        self
    }

    pub fn with_account(mut self, account: AccountSpec) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_account_group(mut self, group: AccountGroup) -> Self {
        self.account_groups.push(group);
        self
    }

    pub fn with_period(mut self, period: PeriodSpec) -> Self {
        self.periods.push(period);
        self
    }

    pub fn with_cross_period(mut self, catalog: ConstraintCatalog) -> Self {
        self.cross_period = catalog;
        self
    }

    pub fn with_job(mut self, job: JobParams) -> Self {
        self.job = job;
        self
    }

    /// `None` when both accounts and periods are present.
    pub fn topology(&self) -> Option<Topology> {
        match (self.accounts.is_empty(), self.periods.is_empty()) {
            (true, true) => Some(Topology::Single),
            (false, true) => Some(Topology::MultiAccount),
            (true, false) => Some(Topology::MultiPeriod),
            (false, false) => None,
        }
    }

    pub fn account_group(&self, id: &str) -> Option<&AccountGroup> {
        self.account_groups.iter().find(|g| g.id == id)
    }
}
