//! Phantom-typed identifiers.
//!
//! Every entity id is a string underneath, but the kind marker keeps an
//! asset id from being handed to an API that expects a factor id.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A string identifier tagged with the entity kind `K`.
pub struct Id<K> {
    raw: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Id<K> {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self {
            raw: raw.into(),
            _kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

// Manual impls: derives would demand the same trait on the marker type.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl<K> Borrow<str> for Id<K> {
    fn borrow(&self) -> &str {
        &self.raw
    }
}

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.raw)
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<K> From<&str> for Id<K> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<K> From<String> for Id<K> {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl<K> From<&Id<K>> for Id<K> {
    fn from(id: &Id<K>) -> Self {
        id.clone()
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

// ─── Kind markers ─────────────────────────────────────────────────────────────

pub enum AssetKey {}
pub enum FactorKey {}
pub enum PortfolioKey {}
pub enum RiskModelKey {}
pub enum ConstraintKey {}

pub type AssetId = Id<AssetKey>;
pub type FactorId = Id<FactorKey>;
pub type PortfolioId = Id<PortfolioKey>;
pub type RiskModelId = Id<RiskModelKey>;
pub type ConstraintId = Id<ConstraintKey>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn ids_compare_by_raw_string() {
        let a = AssetId::new("USA11I1");
        let b: AssetId = "USA11I1".into();
        assert_eq!(a, b);
        assert!(AssetId::new("A") < AssetId::new("B"));
    }

    #[test]
    fn map_lookup_by_str_borrow() {
        let mut m: BTreeMap<AssetId, f64> = BTreeMap::new();
        m.insert(AssetId::new("CASH"), 0.1);
        assert_eq!(m.get("CASH"), Some(&0.1));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = FactorId::new("Factor_1A");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"Factor_1A\"");
        let back: FactorId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }
}
