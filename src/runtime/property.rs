use crate::types::{JsValue, PropertyKey};
use indexmap::IndexMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;

pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// A (possibly partial) property descriptor. Absent fields mean "not
/// specified" when the descriptor is an input to DefineOwnProperty;
/// descriptors stored in a table are always complete.
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn data_default(value: JsValue) -> Self {
        Self::data(value, true, true, true)
    }

    pub fn accessor(
        get: Option<JsValue>,
        set: Option<JsValue>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Self {
            value: None,
            writable: None,
            get,
            set,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_data_descriptor() && !self.is_accessor_descriptor()
    }

    /// CompletePropertyDescriptor: fill absent fields with defaults, keeping
    /// the data/accessor shape.
    pub fn complete(mut self) -> Self {
        if self.is_accessor_descriptor() {
            self.value = None;
            self.writable = None;
        } else {
            self.value.get_or_insert(JsValue::Undefined);
            self.writable.get_or_insert(false);
        }
        self.enumerable.get_or_insert(false);
        self.configurable.get_or_insert(false);
        self
    }

    pub fn writable(&self) -> bool {
        self.writable == Some(true)
    }

    pub fn enumerable(&self) -> bool {
        self.enumerable == Some(true)
    }

    pub fn configurable(&self) -> bool {
        self.configurable == Some(true)
    }
}

/// Ordered key -> descriptor storage. Insertion order is kept by the
/// underlying IndexMap; `own_keys` re-sorts into the spec's three buckets:
/// integer indices ascending, then strings by insertion order, then symbols
/// by insertion order.
#[derive(Debug, Default)]
pub struct PropertyTable {
    entries: FxIndexMap<PropertyKey, PropertyDescriptor>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self {
            entries: FxIndexMap::default(),
        }
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut PropertyDescriptor> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stored descriptors are completed so every attribute reads definitively.
    pub fn insert(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        self.entries.insert(key, desc.complete());
    }

    /// Removal preserves the relative insertion order of the survivors.
    pub fn remove(&mut self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &PropertyDescriptor)> {
        self.entries.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut PropertyDescriptor> {
        self.entries.values_mut()
    }

    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        let mut strings: Vec<PropertyKey> = Vec::new();
        let mut symbols: Vec<PropertyKey> = Vec::new();
        for key in self.entries.keys() {
            match key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::String(_) => strings.push(key.clone()),
                PropertyKey::Symbol(_) => symbols.push(key.clone()),
            }
        }
        indices.sort_unstable();
        let mut keys: Vec<PropertyKey> =
            indices.into_iter().map(PropertyKey::Index).collect();
        keys.extend(strings);
        keys.extend(symbols);
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsSymbol, JsValue};

    fn data(v: f64) -> PropertyDescriptor {
        PropertyDescriptor::data_default(JsValue::Number(v))
    }

    #[test]
    fn own_keys_three_bucket_order() {
        let mut t = PropertyTable::new();
        t.insert(PropertyKey::string("b"), data(1.0));
        t.insert(PropertyKey::index(10), data(2.0));
        t.insert(
            PropertyKey::symbol(JsSymbol {
                id: 100,
                description: None,
            }),
            data(3.0),
        );
        t.insert(PropertyKey::string("a"), data(4.0));
        t.insert(PropertyKey::index(2), data(5.0));

        let keys = t.own_keys();
        assert_eq!(
            keys,
            vec![
                PropertyKey::Index(2),
                PropertyKey::Index(10),
                PropertyKey::string("b"),
                PropertyKey::string("a"),
                PropertyKey::Symbol(JsSymbol {
                    id: 100,
                    description: None
                }),
            ]
        );
    }

    #[test]
    fn numeric_strings_collapse_to_indices() {
        let mut t = PropertyTable::new();
        t.insert(PropertyKey::string("1"), data(1.0));
        t.insert(PropertyKey::index(1), data(2.0));
        assert_eq!(t.len(), 1);
        assert_eq!(
            t.get(&PropertyKey::Index(1)).and_then(|d| d.value.clone()).map(|v| format!("{v}")),
            Some("2".to_string())
        );
    }

    #[test]
    fn complete_fills_defaults() {
        let d = PropertyDescriptor {
            value: Some(JsValue::Number(1.0)),
            ..Default::default()
        }
        .complete();
        assert_eq!(d.writable, Some(false));
        assert_eq!(d.enumerable, Some(false));
        assert_eq!(d.configurable, Some(false));

        let a = PropertyDescriptor {
            get: Some(JsValue::Undefined),
            ..Default::default()
        }
        .complete();
        assert!(a.value.is_none());
        assert!(a.is_accessor_descriptor());
    }
}
