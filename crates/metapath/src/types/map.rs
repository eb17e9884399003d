use std::sync::Arc;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use super::{AtomicValue, Sequence};
use crate::error::{MetapathError, codes};

/// Normalized map key implementing the "same key" relation: numeric keys
/// compare by value regardless of type, string-like keys compare as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MapKey {
    String(String),
    Number(Decimal),
    Double(u64),
    NaN,
    Boolean(bool),
    Other(&'static str, String),
}

impl MapKey {
    fn of(key: &AtomicValue) -> MapKey {
        if let Some(s) = key.as_str() {
            return MapKey::String(s.to_string());
        }
        match key {
            AtomicValue::Integer(i) => MapKey::Number(Decimal::from(*i)),
            AtomicValue::Decimal(d) => MapKey::Number(d.normalize()),
            AtomicValue::Double(d) if d.is_nan() => MapKey::NaN,
            AtomicValue::Double(d) => match Decimal::from_f64(*d) {
                Some(dec) if d.is_finite() => MapKey::Number(dec.normalize()),
                _ => MapKey::Double(d.to_bits()),
            },
            AtomicValue::Boolean(b) => MapKey::Boolean(*b),
            other => MapKey::Other(other.type_name(), other.to_string_value()),
        }
    }
}

/// Whether two atomic values are the same map key.
pub(crate) fn same_key(a: &AtomicValue, b: &AtomicValue) -> bool {
    MapKey::of(a) == MapKey::of(b)
}

/// An immutable map. Every modifying operation returns a new map and leaves
/// the receiver untouched.
#[derive(Debug, Clone, Default)]
pub struct XdmMap {
    entries: Arc<IndexMap<MapKey, (AtomicValue, Sequence)>>,
}

impl XdmMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map; a later entry replaces an earlier one with the same key.
    pub fn from_entries(entries: impl IntoIterator<Item = (AtomicValue, Sequence)>) -> Self {
        let mut map = IndexMap::new();
        for (key, value) in entries {
            map.insert(MapKey::of(&key), (key, value));
        }
        Self {
            entries: Arc::new(map),
        }
    }

    /// Builds a map, failing with `XQDY0137` on duplicate keys as a map
    /// constructor must.
    pub fn try_from_entries(
        entries: impl IntoIterator<Item = (AtomicValue, Sequence)>,
    ) -> Result<Self, MetapathError> {
        let mut map = IndexMap::new();
        for (key, value) in entries {
            let normalized = MapKey::of(&key);
            if map.contains_key(&normalized) {
                return Err(MetapathError::invalid_value(
                    codes::XQDY0137,
                    format!("Duplicate map key '{}'", key),
                ));
            }
            map.insert(normalized, (key, value));
        }
        Ok(Self {
            entries: Arc::new(map),
        })
    }

    pub fn get(&self, key: &AtomicValue) -> Option<&Sequence> {
        self.entries.get(&MapKey::of(key)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &AtomicValue) -> bool {
        self.entries.contains_key(&MapKey::of(key))
    }

    pub fn put(&self, key: AtomicValue, value: Sequence) -> Self {
        let mut entries = (*self.entries).clone();
        entries.insert(MapKey::of(&key), (key, value));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// A map without the given keys. Absent keys are ignored.
    pub fn remove<'k>(&self, keys: impl IntoIterator<Item = &'k AtomicValue>) -> Self {
        let mut entries = (*self.entries).clone();
        for key in keys {
            entries.shift_remove(&MapKey::of(key));
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &AtomicValue> {
        self.entries.values().map(|(k, _)| k)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&AtomicValue, &Sequence)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for XdmMap {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.entries, &other.entries) {
            return true;
        }
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, (_, v))| other.entries.get(k).is_some_and(|(_, ov)| v == ov))
    }
}
