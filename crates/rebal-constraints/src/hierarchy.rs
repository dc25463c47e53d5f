//! Relaxation order across constraint categories.
//!
//! A total preorder: categories may share an order, meaning the solver
//! relaxes them together. Unset categories sit at `Last`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintCategory {
    Linear,
    Factor,
    Turnover,
    TransactionCost,
    Hedge,
    AssetParing,
    HoldingLevelParing,
    TransactionLevelParing,
    Risk,
    Roundlotting,
}

impl ConstraintCategory {
    pub const ALL: [ConstraintCategory; 10] = [
        Self::Linear,
        Self::Factor,
        Self::Turnover,
        Self::TransactionCost,
        Self::Hedge,
        Self::AssetParing,
        Self::HoldingLevelParing,
        Self::TransactionLevelParing,
        Self::Risk,
        Self::Roundlotting,
    ];
}

/// Relaxation order; `First` is loosened first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
    Seventh,
    Eighth,
    Ninth,
    Last,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintHierarchy {
    orders: BTreeMap<ConstraintCategory, Priority>,
}

impl ConstraintHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_priority(&mut self, category: ConstraintCategory, order: Priority) {
        self.orders.insert(category, order);
    }

    pub fn with_priority(mut self, category: ConstraintCategory, order: Priority) -> Self {
        self.set_priority(category, order);
        self
    }

    pub fn priority(&self, category: ConstraintCategory) -> Priority {
        self.orders.get(&category).copied().unwrap_or(Priority::Last)
    }

    pub fn is_explicit(&self, category: ConstraintCategory) -> bool {
        self.orders.contains_key(&category)
    }

    /// Every category grouped by order, earliest relaxed first.
    pub fn relaxation_sequence(&self) -> Vec<(Priority, Vec<ConstraintCategory>)> {
        let mut by_order: BTreeMap<Priority, Vec<ConstraintCategory>> = BTreeMap::new();
        for c in ConstraintCategory::ALL {
            by_order.entry(self.priority(c)).or_default().push(c);
        }
        by_order.into_iter().collect()
    }
}
