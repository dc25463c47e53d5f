//! Specificity-ranked `(group, value)` rule tables.
//!
//! Patterns, most specific first:
//!
//! ```text
//!   (group, value)   exact match on one group attribute     specificity 2
//!   (group, "*")     asset carries the group attribute      specificity 1
//!   ("*",   "*")     every asset                             specificity 0
//! ```
//!
//! `("*", value)` is malformed. Identical patterns are rejected on insert, so
//! the only way two rules can tie is an asset matching rules on two different
//! groups; `resolve` reports that as `AmbiguousRule` instead of picking one.

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use rebal_model::{Asset, AssetUniverse, TaxCategory};

pub const WILDCARD: &str = "*";

// ─── Pattern ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PatternRepr", into = "PatternRepr")]
pub enum Pattern {
    Exact { group: String, value: String },
    AnyValue { group: String },
    Any,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PatternRepr {
    group: String,
    value: String,
}

impl TryFrom<PatternRepr> for Pattern {
    type Error = RuleError;

    fn try_from(r: PatternRepr) -> Result<Self, Self::Error> {
        Pattern::parse(&r.group, &r.value)
    }
}

impl From<Pattern> for PatternRepr {
    fn from(p: Pattern) -> Self {
        let (group, value) = match p {
            Pattern::Exact { group, value } => (group, value),
            Pattern::AnyValue { group } => (group, WILDCARD.to_string()),
            Pattern::Any => (WILDCARD.to_string(), WILDCARD.to_string()),
        };
        PatternRepr { group, value }
    }
}

impl Pattern {
    pub fn parse(group: &str, value: &str) -> Result<Self, RuleError> {
        match (group == WILDCARD, value == WILDCARD) {
            (true, true) => Ok(Self::Any),
            (false, true) => Ok(Self::AnyValue {
                group: group.to_string(),
            }),
            (false, false) => Ok(Self::Exact {
                group: group.to_string(),
                value: value.to_string(),
            }),
            (true, false) => Err(RuleError::MalformedPattern {
                group: group.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn specificity(&self) -> u8 {
        match self {
            Self::Exact { .. } => 2,
            Self::AnyValue { .. } => 1,
            Self::Any => 0,
        }
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        match self {
            Self::Exact { group, value } => asset.group(group) == Some(value.as_str()),
            Self::AnyValue { group } => asset.group(group).is_some(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { group, value } => write!(f, "({group}, {value})"),
            Self::AnyValue { group } => write!(f, "({group}, *)"),
            Self::Any => write!(f, "(*, *)"),
        }
    }
}

// ─── RuleError ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    MalformedPattern { group: String, value: String },
    DuplicatePattern { pattern: Pattern },
    UnknownAsset { asset: String },
    NoMatchingRule { asset: String },
    AmbiguousRule { asset: String, patterns: Vec<Pattern> },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPattern { group, value } => write!(
                f,
                "malformed rule pattern ({group}, {value}): a wildcard group needs a wildcard value"
            ),
            Self::DuplicatePattern { pattern } => {
                write!(f, "a rule for pattern {pattern} already exists")
            }
            Self::UnknownAsset { asset } => write!(f, "asset '{asset}' is not in the universe"),
            Self::NoMatchingRule { asset } => write!(f, "no rule matches asset '{asset}'"),
            Self::AmbiguousRule { asset, patterns } => {
                write!(f, "asset '{asset}' matches equally specific rules")?;
                for p in patterns {
                    write!(f, " {p}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RuleError {}

// ─── RuleTable ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry<R> {
    pub pattern: Pattern,
    pub rule: R,
}

/// Entries kept sorted by descending specificity, then pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleTable<R> {
    entries: Vec<RuleEntry<R>>,
}

impl<R> Default for RuleTable<R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<R> RuleTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: Pattern, rule: R) -> Result<(), RuleError> {
        if self.entries.iter().any(|e| e.pattern == pattern) {
            return Err(RuleError::DuplicatePattern { pattern });
        }
        let key = |p: &Pattern| (Reverse(p.specificity()), p.clone());
        let new_key = key(&pattern);
        let pos = self
            .entries
            .iter()
            .position(|e| new_key < key(&e.pattern))
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, RuleEntry { pattern, rule });
        Ok(())
    }

    pub fn add_rule(&mut self, group: &str, value: &str, rule: R) -> Result<(), RuleError> {
        self.insert(Pattern::parse(group, value)?, rule)
    }

    pub fn with_rule(mut self, group: &str, value: &str, rule: R) -> Result<Self, RuleError> {
        self.add_rule(group, value, rule)?;
        Ok(self)
    }

    pub fn remove_rule(&mut self, group: &str, value: &str) -> Result<Option<R>, RuleError> {
        let pattern = Pattern::parse(group, value)?;
        Ok(self
            .entries
            .iter()
            .position(|e| e.pattern == pattern)
            .map(|i| self.entries.remove(i).rule))
    }

    /// The single most specific rule matching `asset`.
    pub fn resolve(&self, asset: &Asset) -> Result<&R, RuleError> {
        let mut matches = self.entries.iter().filter(|e| e.pattern.matches(asset));
        let Some(best) = matches.next() else {
            return Err(RuleError::NoMatchingRule {
                asset: asset.id.to_string(),
            });
        };
        let tied: Vec<Pattern> = matches
            .take_while(|e| e.pattern.specificity() == best.pattern.specificity())
            .map(|e| e.pattern.clone())
            .collect();
        if !tied.is_empty() {
            let mut patterns = vec![best.pattern.clone()];
            patterns.extend(tied);
            return Err(RuleError::AmbiguousRule {
                asset: asset.id.to_string(),
                patterns,
            });
        }
        Ok(&best.rule)
    }

    pub fn resolve_id(&self, universe: &AssetUniverse, asset: &str) -> Result<&R, RuleError> {
        let a = universe.asset(asset).ok_or_else(|| RuleError::UnknownAsset {
            asset: asset.to_string(),
        })?;
        self.resolve(a)
    }

    pub fn entries(&self) -> &[RuleEntry<R>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<R: Serialize> Serialize for RuleTable<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de, R: Deserialize<'de>> Deserialize<'de> for RuleTable<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<RuleEntry<R>>::deserialize(deserializer)?;
        let mut table = RuleTable::new();
        for e in raw {
            table
                .insert(e.pattern, e.rule)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(table)
    }
}

// ─── Rules ────────────────────────────────────────────────────────────────────

pub const DEFAULT_SHORT_TERM_PERIOD_DAYS: u32 = 365;
pub const DEFAULT_WASH_SALE_WINDOW_DAYS: u32 = 30;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WashSaleRule {
    #[default]
    None,
    /// Losses with a replacement inside the window are disallowed.
    Disallowed { window_days: u32 },
    /// Both outcomes are computed; the caller picks one.
    Tradeoff { window_days: u32 },
}

impl WashSaleRule {
    pub fn window_days(&self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Disallowed { window_days } | Self::Tradeoff { window_days } => Some(*window_days),
        }
    }
}

/// Rate schedule, holding period and wash-sale policy for matching assets.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxRule {
    pub enable_two_rate: bool,
    pub long_term_rate: f64,
    pub short_term_rate: f64,
    #[serde(default = "default_short_term_period")]
    pub short_term_period_days: u32,
    #[serde(default)]
    pub wash_sale: WashSaleRule,
}

fn default_short_term_period() -> u32 {
    DEFAULT_SHORT_TERM_PERIOD_DAYS
}

impl TaxRule {
    pub fn two_rate(long_term_rate: f64, short_term_rate: f64) -> Self {
        Self {
            enable_two_rate: true,
            long_term_rate,
            short_term_rate,
            short_term_period_days: DEFAULT_SHORT_TERM_PERIOD_DAYS,
            wash_sale: WashSaleRule::None,
        }
    }

    /// Everything taxed at `rate`.
    pub fn single_rate(rate: f64) -> Self {
        Self {
            enable_two_rate: false,
            long_term_rate: rate,
            short_term_rate: rate,
            short_term_period_days: DEFAULT_SHORT_TERM_PERIOD_DAYS,
            wash_sale: WashSaleRule::None,
        }
    }

    pub fn with_short_term_period(mut self, days: u32) -> Self {
        self.short_term_period_days = days;
        self
    }

    pub fn with_wash_sale(mut self, rule: WashSaleRule) -> Self {
        self.wash_sale = rule;
        self
    }

    /// LONG_TERM iff the lot has been held at least the short-term period.
    pub fn category_for(&self, age_days: u32) -> TaxCategory {
        if age_days >= self.short_term_period_days {
            TaxCategory::LongTerm
        } else {
            TaxCategory::ShortTerm
        }
    }

    pub fn rate_for(&self, category: TaxCategory) -> f64 {
        match (self.enable_two_rate, category) {
            (true, TaxCategory::ShortTerm) => self.short_term_rate,
            _ => self.long_term_rate,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        let ok = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        if !ok(self.long_term_rate) || !ok(self.short_term_rate) {
            return Err("tax rates must lie in [0, 1]");
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellingOrder {
    #[default]
    Fifo,
    Lifo,
    Hifo,
    Lofo,
    Proportional,
}

pub type TaxRuleResolver = RuleTable<TaxRule>;
pub type SellingOrderTable = RuleTable<SellingOrder>;
