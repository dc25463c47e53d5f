//! Attribute stores.
//!
//! [`AttributeStore`] is the one generic `entity id -> value` container. It
//! remembers insertion order and fixes its value kind at creation. The typed
//! maps ([`AlphaMap`], [`PriceMap`], [`CoefficientMap`], [`GroupTagMap`],
//! [`RoundLotMap`]) wrap it so a coefficient map cannot be passed where a
//! price map is expected.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{AssetKey, Id};

// ─── Values ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    Double,
    Integer,
    Text,
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Double => "double",
            Self::Integer => "integer",
            Self::Text => "text",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Integer(i64),
    Double(f64),
    Text(String),
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            Self::Integer(_) => AttrKind::Integer,
            Self::Double(_) => AttrKind::Double,
            Self::Text(_) => AttrKind::Text,
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    NotFound {
        id: String,
    },
    TypeMismatch {
        id: String,
        expected: AttrKind,
        found: AttrKind,
    },
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "attribute not found for '{id}'"),
            Self::TypeMismatch {
                id,
                expected,
                found,
            } => write!(
                f,
                "attribute type mismatch for '{id}': store holds {expected}, got {found}"
            ),
        }
    }
}

impl std::error::Error for AttributeError {}

// ─── AttributeStore ───────────────────────────────────────────────────────────

/// Untyped-by-id, kind-checked attribute container.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeStore {
    kind: AttrKind,
    order: Vec<String>,
    values: HashMap<String, AttrValue>,
}

impl AttributeStore {
    pub fn new(kind: AttrKind) -> Self {
        Self {
            kind,
            order: Vec::new(),
            values: HashMap::new(),
        }
    }

    pub fn kind(&self) -> AttrKind {
        self.kind
    }

    /// Insert or overwrite. Overwriting keeps the original insertion slot.
    /// The value's kind must equal the store's; nothing is converted.
    pub fn set<S: Into<String>>(&mut self, id: S, value: AttrValue) -> Result<(), AttributeError> {
        let id = id.into();
        if value.kind() != self.kind {
            return Err(AttributeError::TypeMismatch {
                id,
                expected: self.kind,
                found: value.kind(),
            });
        }
        self.put(id, value);
        Ok(())
    }

    fn put(&mut self, id: String, value: AttrValue) {
        if !self.values.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.values.insert(id, value);
    }

    pub fn get(&self, id: &str) -> Result<&AttrValue, AttributeError> {
        self.values.get(id).ok_or_else(|| AttributeError::NotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    /// Ids in insertion order. Each call starts a fresh pass.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> + '_ {
        self.order
            .iter()
            .filter_map(|k| self.values.get(k).map(|v| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct StoreRepr {
    kind: AttrKind,
    entries: Vec<(String, AttrValue)>,
}

impl Serialize for AttributeStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = StoreRepr {
            kind: self.kind,
            entries: self.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributeStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = StoreRepr::deserialize(deserializer)?;
        let mut store = AttributeStore::new(repr.kind);
        for (id, v) in repr.entries {
            store.set(id, v).map_err(serde::de::Error::custom)?;
        }
        Ok(store)
    }
}

// ─── Typed maps ───────────────────────────────────────────────────────────────

/// Scalar types a typed map can hold.
pub trait AttrScalar: Sized + Clone {
    const KIND: AttrKind;
    fn into_value(self) -> AttrValue;
    fn from_value(v: &AttrValue) -> Option<Self>;
}

impl AttrScalar for f64 {
    const KIND: AttrKind = AttrKind::Double;
    fn into_value(self) -> AttrValue {
        AttrValue::Double(self)
    }
    fn from_value(v: &AttrValue) -> Option<Self> {
        match v {
            AttrValue::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl AttrScalar for i64 {
    const KIND: AttrKind = AttrKind::Integer;
    fn into_value(self) -> AttrValue {
        AttrValue::Integer(self)
    }
    fn from_value(v: &AttrValue) -> Option<Self> {
        match v {
            AttrValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl AttrScalar for String {
    const KIND: AttrKind = AttrKind::Text;
    fn into_value(self) -> AttrValue {
        AttrValue::Text(self)
    }
    fn from_value(v: &AttrValue) -> Option<Self> {
        match v {
            AttrValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Role of a typed map: which entity it keys and which scalar it holds.
pub trait AttrRole {
    const NAME: &'static str;
    type Key;
    type Value: AttrScalar;
}

pub struct Alpha;
pub struct Price;
pub struct Coefficient;
pub struct RoundLot;
pub struct GroupTag;

impl AttrRole for Alpha {
    const NAME: &'static str = "alpha";
    type Key = AssetKey;
    type Value = f64;
}

impl AttrRole for Price {
    const NAME: &'static str = "price";
    type Key = AssetKey;
    type Value = f64;
}

impl AttrRole for Coefficient {
    const NAME: &'static str = "coefficient";
    type Key = AssetKey;
    type Value = f64;
}

impl AttrRole for RoundLot {
    const NAME: &'static str = "round_lot";
    type Key = AssetKey;
    type Value = i64;
}

impl AttrRole for GroupTag {
    const NAME: &'static str = "group_tag";
    type Key = AssetKey;
    type Value = String;
}

pub type AlphaMap = AttrMap<Alpha>;
pub type PriceMap = AttrMap<Price>;
pub type CoefficientMap = AttrMap<Coefficient>;
pub type RoundLotMap = AttrMap<RoundLot>;
pub type GroupTagMap = AttrMap<GroupTag>;

/// A kind-safe view over one [`AttributeStore`].
pub struct AttrMap<R: AttrRole> {
    store: AttributeStore,
    _role: PhantomData<fn() -> R>,
}

impl<R: AttrRole> AttrMap<R> {
    pub fn new() -> Self {
        Self {
            store: AttributeStore::new(<R::Value as AttrScalar>::KIND),
            _role: PhantomData,
        }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, R::Value)>,
        S: Into<Id<R::Key>>,
    {
        let mut m = Self::new();
        for (id, v) in pairs {
            m.set(id, v);
        }
        m
    }

    pub fn set<S: Into<Id<R::Key>>>(&mut self, id: S, value: R::Value) {
        self.store.put(id.into().into_string(), value.into_value());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with<S: Into<Id<R::Key>>>(mut self, id: S, value: R::Value) -> Self {
        self.set(id, value);
        self
    }

    pub fn get(&self, id: &str) -> Result<R::Value, AttributeError> {
        let v = self.store.get(id)?;
        R::Value::from_value(v).ok_or_else(|| AttributeError::TypeMismatch {
            id: id.to_string(),
            expected: <R::Value as AttrScalar>::KIND,
            found: v.kind(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.store.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, R::Value)> + '_ {
        self.store
            .iter()
            .filter_map(|(k, v)| R::Value::from_value(v).map(|x| (k, x)))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn role(&self) -> &'static str {
        R::NAME
    }

    pub fn as_store(&self) -> &AttributeStore {
        &self.store
    }
}

impl<R: AttrRole> Default for AttrMap<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AttrRole> Clone for AttrMap<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _role: PhantomData,
        }
    }
}

impl<R: AttrRole> PartialEq for AttrMap<R> {
    fn eq(&self, other: &Self) -> bool {
        self.store == other.store
    }
}

impl<R: AttrRole> fmt::Debug for AttrMap<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.store.iter()).finish()
    }
}

// Typed maps travel as plain `{ "id": value }` objects.

impl<R: AttrRole> Serialize for AttrMap<R>
where
    R::Value: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, &v)?;
        }
        map.end()
    }
}

impl<'de, R: AttrRole> Deserialize<'de> for AttrMap<R>
where
    R::Value: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor<R>(PhantomData<fn() -> R>);

        impl<'de, R: AttrRole> Visitor<'de> for MapVisitor<R>
        where
            R::Value: Deserialize<'de>,
        {
            type Value = AttrMap<R>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of {} attributes", R::NAME)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = AttrMap::<R>::new();
                while let Some((k, v)) = access.next_entry::<String, R::Value>()? {
                    out.set(k, v);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(MapVisitor::<R>(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_is_not_found() {
        let s = AttributeStore::new(AttrKind::Double);
        assert_eq!(
            s.get("X").unwrap_err(),
            AttributeError::NotFound { id: "X".into() }
        );
    }

    #[test]
    fn set_wrong_kind_is_type_mismatch() {
        let mut s = AttributeStore::new(AttrKind::Text);
        let err = s.set("A", AttrValue::Double(1.0)).unwrap_err();
        assert!(matches!(
            err,
            AttributeError::TypeMismatch {
                expected: AttrKind::Text,
                found: AttrKind::Double,
                ..
            }
        ));
        assert!(s.is_empty(), "failed set must not insert");
    }

    #[test]
    fn overwrite_keeps_insertion_slot() {
        let mut s = AttributeStore::new(AttrKind::Integer);
        s.set("B", AttrValue::Integer(1)).unwrap();
        s.set("A", AttrValue::Integer(2)).unwrap();
        s.set("B", AttrValue::Integer(3)).unwrap();
        let keys: Vec<&str> = s.keys().collect();
        assert_eq!(keys, vec!["B", "A"]);
        assert_eq!(s.get("B").unwrap(), &AttrValue::Integer(3));
    }

    #[test]
    fn keys_is_restartable() {
        let mut s = AttributeStore::new(AttrKind::Double);
        s.set("A", AttrValue::Double(1.0)).unwrap();
        s.set("B", AttrValue::Double(2.0)).unwrap();
        let first: Vec<&str> = s.keys().collect();
        let second: Vec<&str> = s.keys().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn integer_into_double_store_is_type_mismatch() {
        let mut s = AttributeStore::new(AttrKind::Double);
        let err = s.set("x", AttrValue::Integer(1)).unwrap_err();
        assert_eq!(
            err,
            AttributeError::TypeMismatch {
                id: "x".into(),
                expected: AttrKind::Double,
                found: AttrKind::Integer,
            }
        );
        assert!(s.is_empty());

        let mut s = AttributeStore::new(AttrKind::Integer);
        assert!(s.set("x", AttrValue::Double(1.0)).is_err());
    }

    #[test]
    fn double_store_deserialize_rejects_integer_entries() {
        let raw = r#"{"kind":"double","entries":[["A",1]]}"#;
        assert!(serde_json::from_str::<AttributeStore>(raw).is_err());
        let raw = r#"{"kind":"double","entries":[["A",1.0]]}"#;
        assert!(serde_json::from_str::<AttributeStore>(raw).is_ok());
    }

    #[test]
    fn typed_map_roundtrips_in_insertion_order() {
        let alpha = AlphaMap::new().with("Z", 0.1).with("A", -0.2);
        assert_eq!(alpha.get("A").unwrap(), -0.2);
        let ks: Vec<&str> = alpha.keys().collect();
        assert_eq!(ks, vec!["Z", "A"]);
        assert_eq!(alpha.role(), "alpha");
    }

    #[test]
    fn group_tags_hold_text() {
        let tags = GroupTagMap::from_pairs([("A", "Tech".to_string()), ("B", "Energy".to_string())]);
        assert_eq!(tags.get("B").unwrap(), "Energy");
        assert!(matches!(tags.get("C"), Err(AttributeError::NotFound { .. })));
    }

    #[test]
    fn typed_map_serializes_as_object() {
        let p = PriceMap::new().with("A", 10.0);
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, r#"{"A":10.0}"#);
        let back: PriceMap = serde_json::from_str(&s).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn store_deserialize_rejects_mixed_kinds() {
        let raw = r#"{"kind":"integer","entries":[["A",1],["B","text"]]}"#;
        assert!(serde_json::from_str::<AttributeStore>(raw).is_err());
    }
}
