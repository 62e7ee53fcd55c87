//! The smaller exotic object kinds: mapped arguments, String wrappers, and
//! module namespaces. Each overrides only a few internal methods and leans
//! on the ordinary algorithms for the rest.

use super::object::is_compatible_property_descriptor;
use super::{Exotic, JsResult, JsObjectData, PropertyDescriptor, Realm};
use crate::types::{JsString, JsValue, PropertyKey, WellKnownSymbol};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A mutable binding cell shared between a mapped arguments object and its
/// function environment.
pub type BindingSlot = Rc<RefCell<JsValue>>;

/// Index -> binding-slot aliasing for a mapped arguments object. Entries
/// leave the map (and never return) when the aliasing is broken.
#[derive(Debug, Default)]
pub(crate) struct ArgumentsMap {
    slots: Vec<BindingSlot>,
    mapped: FxHashMap<u32, usize>,
}

impl ArgumentsMap {
    /// Arena handles held by the binding slots, for the collector.
    pub(crate) fn trace_object_ids(&self, out: &mut Vec<u64>) {
        for slot in &self.slots {
            if let Some(id) = slot.borrow().object_id() {
                out.push(id);
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct NamespaceData {
    /// Export names in their fixed, sorted order.
    pub(crate) exports: Vec<JsString>,
}

impl Realm {
    // ---- mapped arguments ----------------------------------------------

    /// A mapped arguments object whose indexed properties alias the given
    /// binding slots. Writes through either side stay visible to both
    /// until the aliasing for that index is broken.
    pub fn create_mapped_arguments(&mut self, slots: Vec<BindingSlot>) -> JsValue {
        let mut data = JsObjectData::new();
        data.class_name = "Arguments".to_string();
        data.prototype = self.intrinsics.object_prototype;
        let mut map = ArgumentsMap::default();
        for (i, slot) in slots.iter().enumerate() {
            data.table.insert(
                PropertyKey::index(i as u32),
                PropertyDescriptor::data_default(slot.borrow().clone()),
            );
            map.mapped.insert(i as u32, i);
        }
        data.table.insert(
            PropertyKey::string("length"),
            PropertyDescriptor::data(JsValue::Number(slots.len() as f64), true, false, true),
        );
        map.slots = slots;
        data.exotic = Exotic::Arguments(map);
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    fn arguments_mapped_slot(&self, id: u64, index: u32) -> Option<BindingSlot> {
        let obj = self.get_object(id)?;
        let b = obj.borrow();
        match &b.exotic {
            Exotic::Arguments(map) => map
                .mapped
                .get(&index)
                .and_then(|slot| map.slots.get(*slot))
                .cloned(),
            _ => None,
        }
    }

    fn arguments_unmap(&mut self, id: u64, index: u32) {
        if let Some(obj) = self.get_object(id) {
            let mut b = obj.borrow_mut();
            if let Exotic::Arguments(map) = &mut b.exotic {
                map.mapped.remove(&index);
            }
        }
    }

    /// Break every remaining alias, syncing the table from the slots first.
    pub(crate) fn arguments_unmap_all(&mut self, id: u64) {
        let Some(obj) = self.get_object(id) else {
            return;
        };
        let mut b = obj.borrow_mut();
        let pairs: Vec<(u32, JsValue)> = match &mut b.exotic {
            Exotic::Arguments(map) => {
                let pairs = map
                    .mapped
                    .iter()
                    .filter_map(|(i, slot)| {
                        map.slots.get(*slot).map(|s| (*i, s.borrow().clone()))
                    })
                    .collect();
                map.mapped.clear();
                pairs
            }
            _ => return,
        };
        for (i, v) in pairs {
            if let Some(desc) = b.table.get_mut(&PropertyKey::index(i)) {
                desc.value = Some(v);
            }
        }
    }

    pub(crate) fn arguments_get(
        &mut self,
        id: u64,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        if let Some(index) = key.as_index()
            && let Some(slot) = self.arguments_mapped_slot(id, index)
        {
            return Ok(slot.borrow().clone());
        }
        self.ordinary_get(id, key, receiver)
    }

    pub(crate) fn arguments_set(
        &mut self,
        id: u64,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        let direct = receiver.object_id() == Some(id);
        if direct
            && let Some(index) = key.as_index()
            && let Some(slot) = self.arguments_mapped_slot(id, index)
        {
            *slot.borrow_mut() = value.clone();
        }
        self.ordinary_set(id, key, value, receiver)
    }

    pub(crate) fn arguments_get_own_property(
        &self,
        id: u64,
        key: &PropertyKey,
    ) -> Option<PropertyDescriptor> {
        let mut desc = self.ordinary_get_own_property(id, key)?;
        if let Some(index) = key.as_index()
            && let Some(slot) = self.arguments_mapped_slot(id, index)
        {
            desc.value = Some(slot.borrow().clone());
        }
        Some(desc)
    }

    // §10.4.4.2: an accessor redefinition or a writable:false narrowing
    // breaks the aliasing for that index.
    pub(crate) fn arguments_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        let index = key.as_index();
        let slot = index.and_then(|i| self.arguments_mapped_slot(id, i));

        let mut to_apply = desc.clone();
        if let Some(slot) = &slot
            && desc.is_data_descriptor()
            && desc.value.is_none()
            && desc.writable == Some(false)
        {
            // Capture the live slot value before the alias breaks.
            to_apply.value = Some(slot.borrow().clone());
        }
        if !self.ordinary_define_own_property(id, key, to_apply) {
            return Ok(false);
        }
        if let (Some(index), Some(slot)) = (index, slot) {
            if desc.is_accessor_descriptor() {
                self.arguments_unmap(id, index);
            } else {
                if let Some(v) = &desc.value {
                    *slot.borrow_mut() = v.clone();
                }
                if desc.writable == Some(false) {
                    self.arguments_unmap(id, index);
                }
            }
        }
        Ok(true)
    }

    pub(crate) fn arguments_delete(&mut self, id: u64, key: &PropertyKey) -> bool {
        let removed = self.ordinary_delete(id, key);
        if removed && let Some(index) = key.as_index() {
            self.arguments_unmap(id, index);
        }
        removed
    }

    // ---- String wrappers -----------------------------------------------

    /// A String wrapper object: immutable indexed character properties
    /// synthesized from the boxed primitive.
    pub fn create_string_object(&mut self, value: &JsString) -> JsValue {
        let mut data = JsObjectData::new();
        data.class_name = "String".to_string();
        data.prototype = self.intrinsics.string_prototype;
        data.primitive_value = Some(JsValue::String(value.clone()));
        data.exotic = Exotic::StringWrapper;
        data.table.insert(
            PropertyKey::string("length"),
            PropertyDescriptor::data(JsValue::Number(value.len() as f64), false, false, false),
        );
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    fn string_wrapper_value(&self, id: u64) -> Option<JsString> {
        let obj = self.get_object(id)?;
        let b = obj.borrow();
        match &b.primitive_value {
            Some(JsValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    // §10.4.3.5 StringGetOwnProperty
    fn string_synthesized_descriptor(&self, id: u64, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let index = key.as_index()? as usize;
        let s = self.string_wrapper_value(id)?;
        let unit = s.code_unit_at(index)?;
        Some(
            PropertyDescriptor::data(
                JsValue::String(JsString {
                    code_units: vec![unit],
                }),
                false,
                true,
                false,
            )
            .complete(),
        )
    }

    pub(crate) fn string_wrapper_get(
        &mut self,
        id: u64,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        self.ordinary_get(id, key, receiver)
    }

    pub(crate) fn string_wrapper_get_own_property(
        &self,
        id: u64,
        key: &PropertyKey,
    ) -> Option<PropertyDescriptor> {
        match self.ordinary_get_own_property(id, key) {
            Some(desc) => Some(desc),
            None => self.string_synthesized_descriptor(id, key),
        }
    }

    // Character properties only accept redefinitions compatible with their
    // synthesized (non-writable, non-configurable) descriptor; nothing is
    // ever stored for them.
    pub(crate) fn string_wrapper_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        if let Some(synth) = self.string_synthesized_descriptor(id, &key) {
            let extensible = self.ordinary_is_extensible(id);
            return Ok(is_compatible_property_descriptor(
                extensible,
                &desc,
                Some(&synth),
            ));
        }
        Ok(self.ordinary_define_own_property(id, key, desc))
    }

    pub(crate) fn string_wrapper_own_keys(&self, id: u64) -> Vec<PropertyKey> {
        let char_count = self.string_wrapper_value(id).map(|s| s.len()).unwrap_or(0) as u32;
        let mut indices: Vec<u32> = (0..char_count).collect();
        let mut strings = Vec::new();
        let mut symbols = Vec::new();
        if let Some(obj) = self.get_object(id) {
            for key in obj.borrow().table.own_keys() {
                match &key {
                    // Indices beyond the character range can be defined as
                    // ordinary properties.
                    PropertyKey::Index(i) => indices.push(*i),
                    PropertyKey::String(_) => strings.push(key),
                    PropertyKey::Symbol(_) => symbols.push(key),
                }
            }
        }
        indices.sort_unstable();
        indices.dedup();
        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        keys.extend(strings);
        keys.extend(symbols);
        keys
    }

    // ---- module namespaces ---------------------------------------------

    /// A module namespace object: null prototype, never extensible, export
    /// bindings exposed as writable, enumerable, non-configurable data
    /// properties in sorted name order.
    pub fn create_namespace(&mut self, mut exports: Vec<(JsString, JsValue)>) -> JsValue {
        exports.sort_by(|a, b| a.0.code_units.cmp(&b.0.code_units));
        let mut data = JsObjectData::new();
        data.class_name = "Module".to_string();
        data.prototype = None;
        data.extensible = false;
        let mut names = Vec::with_capacity(exports.len());
        for (name, value) in exports {
            data.table.insert(
                PropertyKey::from_js_string(name.clone()),
                PropertyDescriptor::data(value, true, true, false),
            );
            names.push(name);
        }
        let tag = self.well_known_symbol(WellKnownSymbol::ToStringTag);
        data.table.insert(
            PropertyKey::symbol(tag),
            PropertyDescriptor::data(JsValue::string("Module"), false, false, false),
        );
        data.exotic = Exotic::Namespace(NamespaceData { exports: names });
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    /// Rebind an export's value in place; how module evaluation updates
    /// live bindings.
    pub fn namespace_update_binding(
        &mut self,
        namespace: &JsValue,
        name: &JsString,
        value: JsValue,
    ) -> JsResult<()> {
        let id = self.expect_object(namespace, "namespace binding update")?;
        let known = {
            let Some(obj) = self.get_object(id) else {
                return Ok(());
            };
            let b = obj.borrow();
            match &b.exotic {
                Exotic::Namespace(ns) => ns.exports.iter().any(|n| n == name),
                _ => false,
            }
        };
        if !known {
            return Err(self.create_type_error(&format!("no export named '{name}'")));
        }
        if let Some(obj) = self.get_object(id)
            && let Some(desc) = obj
                .borrow_mut()
                .table
                .get_mut(&PropertyKey::from_js_string(name.clone()))
        {
            desc.value = Some(value);
        }
        Ok(())
    }

    // §10.4.6.6: exports admit only redefinitions that change nothing.
    pub(crate) fn namespace_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        if key.is_symbol() {
            return Ok(self.ordinary_define_own_property(id, key, desc));
        }
        if desc.is_accessor_descriptor()
            || desc.configurable == Some(true)
            || desc.enumerable == Some(false)
            || desc.writable == Some(false)
        {
            return Ok(false);
        }
        let current = match self.ordinary_get_own_property(id, &key) {
            Some(c) => c,
            None => return Ok(false),
        };
        match &desc.value {
            Some(v) => Ok(super::same_value(
                v,
                current.value.as_ref().unwrap_or(&JsValue::Undefined),
            )),
            None => Ok(true),
        }
    }

    pub(crate) fn namespace_delete(&mut self, id: u64, key: &PropertyKey) -> bool {
        if key.is_symbol() {
            return self.ordinary_delete(id, key);
        }
        self.ordinary_get_own_property(id, key).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_arguments_alias_both_ways() {
        let mut realm = Realm::new();
        let slot = Rc::new(RefCell::new(JsValue::Number(1.0)));
        let args = realm.create_mapped_arguments(vec![slot.clone()]);

        // Binding write shows through the object.
        *slot.borrow_mut() = JsValue::Number(2.0);
        let v = realm.get(&args, &PropertyKey::index(0)).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 2.0));

        // Object write shows through the binding.
        realm
            .set(&args, &PropertyKey::index(0), JsValue::Number(3.0))
            .unwrap();
        assert!(matches!(&*slot.borrow(), JsValue::Number(n) if *n == 3.0));
    }

    #[test]
    fn non_writable_redefinition_breaks_alias() {
        let mut realm = Realm::new();
        let slot = Rc::new(RefCell::new(JsValue::Number(1.0)));
        let args = realm.create_mapped_arguments(vec![slot.clone()]);

        realm
            .define_property(
                &args,
                PropertyKey::index(0),
                PropertyDescriptor {
                    writable: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        // Alias is broken: the binding no longer feeds the property.
        *slot.borrow_mut() = JsValue::Number(99.0);
        let v = realm.get(&args, &PropertyKey::index(0)).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 1.0));
    }

    #[test]
    fn string_wrapper_characters() {
        let mut realm = Realm::new();
        let s = realm.create_string_object(&JsString::from_str("hi"));

        let v = realm.get(&s, &PropertyKey::index(0)).unwrap();
        assert!(matches!(v, JsValue::String(ref js) if js.to_rust_string() == "h"));
        let len = realm.get(&s, &PropertyKey::string("length")).unwrap();
        assert!(matches!(len, JsValue::Number(n) if n == 2.0));

        // Characters refuse incompatible redefinition but nothing throws.
        let ok = realm
            .define_property(
                &s,
                PropertyKey::index(0),
                PropertyDescriptor::data_default(JsValue::string("x")),
            )
            .unwrap();
        assert!(!ok);

        let keys = realm.own_keys(&s).unwrap();
        assert_eq!(
            keys,
            vec![
                PropertyKey::index(0),
                PropertyKey::index(1),
                PropertyKey::string("length"),
            ]
        );
    }

    #[test]
    fn namespace_is_sealed_shaped() {
        let mut realm = Realm::new();
        let ns = realm.create_namespace(vec![
            (JsString::from_str("b"), JsValue::Number(2.0)),
            (JsString::from_str("a"), JsValue::Number(1.0)),
        ]);

        // Exports come back sorted.
        let keys = realm.own_keys(&ns).unwrap();
        assert_eq!(keys[0], PropertyKey::string("a"));
        assert_eq!(keys[1], PropertyKey::string("b"));

        // Writes refuse, deletes of exports refuse, unknown deletes succeed.
        assert!(!realm
            .set(&ns, &PropertyKey::string("a"), JsValue::Number(9.0))
            .unwrap());
        assert!(!realm.delete_property(&ns, &PropertyKey::string("a")).unwrap());
        assert!(realm.delete_property(&ns, &PropertyKey::string("zz")).unwrap());
        assert!(!realm.is_extensible(&ns).unwrap());
        assert!(realm.get_prototype_of(&ns).unwrap().is_null());

        // Live binding updates show through reads.
        realm
            .namespace_update_binding(&ns, &JsString::from_str("a"), JsValue::Number(7.0))
            .unwrap();
        let v = realm.get(&ns, &PropertyKey::string("a")).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 7.0));
    }
}
