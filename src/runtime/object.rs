//! The ordinary object algorithms: the eight fundamental internal methods
//! over a `PropertyTable`, plus the integrity-level operations built on them.

use super::{ExoticKind, JsResult, PropertyDescriptor, Realm, same_value};
use crate::types::{JsValue, PropertyKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityLevel {
    Sealed,
    Frozen,
}

/// §10.1.6.3 ValidateAndApplyPropertyDescriptor, with the "apply" half
/// returned as the descriptor to store. `None` means the definition must
/// be rejected.
pub(crate) fn validate_and_apply(
    extensible: bool,
    current: Option<&PropertyDescriptor>,
    desc: &PropertyDescriptor,
) -> Option<PropertyDescriptor> {
    let current = match current {
        None => {
            if !extensible {
                return None;
            }
            return Some(desc.clone().complete());
        }
        Some(c) => c,
    };

    if desc.value.is_none()
        && desc.writable.is_none()
        && desc.get.is_none()
        && desc.set.is_none()
        && desc.enumerable.is_none()
        && desc.configurable.is_none()
    {
        return Some(current.clone());
    }

    if !current.configurable() {
        if desc.configurable == Some(true) {
            return None;
        }
        if let Some(e) = desc.enumerable
            && e != current.enumerable()
        {
            return None;
        }
        if !desc.is_generic_descriptor()
            && desc.is_accessor_descriptor() != current.is_accessor_descriptor()
        {
            return None;
        }
        if current.is_accessor_descriptor() {
            // Once non-configurable, an accessor's get/set never change.
            if let Some(ref g) = desc.get
                && !same_value(g, current.get.as_ref().unwrap_or(&JsValue::Undefined))
            {
                return None;
            }
            if let Some(ref s) = desc.set
                && !same_value(s, current.set.as_ref().unwrap_or(&JsValue::Undefined))
            {
                return None;
            }
        } else if !current.writable() {
            // writable only narrows true -> false; value frozen thereafter.
            if desc.writable == Some(true) {
                return None;
            }
            if let Some(ref v) = desc.value
                && !same_value(v, current.value.as_ref().unwrap_or(&JsValue::Undefined))
            {
                return None;
            }
        }
    }

    // Apply: merge over the current descriptor, flipping shape if needed.
    let mut result = current.clone();
    if desc.is_accessor_descriptor() && !current.is_accessor_descriptor() {
        result.value = None;
        result.writable = None;
        result.get = Some(JsValue::Undefined);
        result.set = Some(JsValue::Undefined);
    } else if desc.is_data_descriptor() && current.is_accessor_descriptor() {
        result.get = None;
        result.set = None;
        result.value = Some(JsValue::Undefined);
        result.writable = Some(false);
    }
    if let Some(v) = desc.value.clone() {
        result.value = Some(v);
    }
    if let Some(w) = desc.writable {
        result.writable = Some(w);
    }
    if let Some(g) = desc.get.clone() {
        result.get = Some(g);
    }
    if let Some(s) = desc.set.clone() {
        result.set = Some(s);
    }
    if let Some(e) = desc.enumerable {
        result.enumerable = Some(e);
    }
    if let Some(c) = desc.configurable {
        result.configurable = Some(c);
    }
    Some(result)
}

/// §10.1.6.2 IsCompatiblePropertyDescriptor
pub(crate) fn is_compatible_property_descriptor(
    extensible: bool,
    desc: &PropertyDescriptor,
    current: Option<&PropertyDescriptor>,
) -> bool {
    validate_and_apply(extensible, current, desc).is_some()
}

impl Realm {
    // §10.1.8.1 OrdinaryGet
    pub(crate) fn ordinary_get(
        &mut self,
        id: u64,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        let desc = self.object_get_own_property(id, key)?;
        let desc = match desc {
            Some(d) => d,
            None => {
                return match self.object_get_prototype_of(id)? {
                    JsValue::Object(parent) => self.object_get(parent.id, key, receiver),
                    _ => Ok(JsValue::Undefined),
                };
            }
        };
        if desc.is_data_descriptor() {
            return Ok(desc.value.unwrap_or(JsValue::Undefined));
        }
        match desc.get {
            Some(getter) if !getter.is_undefined() => self.call(&getter, &receiver.clone(), &[]),
            _ => Ok(JsValue::Undefined),
        }
    }

    // §10.1.9.2 OrdinarySetWithOwnDescriptor. Accessors are invoked on the
    // receiver, not on the object that defines them.
    pub(crate) fn ordinary_set(
        &mut self,
        id: u64,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        let own = self.object_get_own_property(id, key)?;
        let own = match own {
            Some(d) => d,
            None => match self.object_get_prototype_of(id)? {
                JsValue::Object(parent) => {
                    return self.object_set(parent.id, key, value, receiver);
                }
                _ => PropertyDescriptor::data_default(JsValue::Undefined),
            },
        };

        if own.is_data_descriptor() {
            if !own.writable() {
                return Ok(false);
            }
            let receiver_id = match receiver.object_id() {
                Some(rid) => rid,
                None => return Ok(false),
            };
            match self.object_get_own_property(receiver_id, key)? {
                Some(existing) => {
                    if existing.is_accessor_descriptor() || !existing.writable() {
                        return Ok(false);
                    }
                    let value_only = PropertyDescriptor {
                        value: Some(value),
                        ..Default::default()
                    };
                    self.object_define_own_property(receiver_id, key.clone(), value_only)
                }
                None => self.object_define_own_property(
                    receiver_id,
                    key.clone(),
                    PropertyDescriptor::data_default(value),
                ),
            }
        } else {
            match own.set {
                Some(setter) if !setter.is_undefined() => {
                    self.call(&setter, &receiver.clone(), &[value])?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    pub(crate) fn ordinary_get_own_property(
        &self,
        id: u64,
        key: &PropertyKey,
    ) -> Option<PropertyDescriptor> {
        self.get_object(id)
            .and_then(|obj| obj.borrow().table.get(key).cloned())
    }

    // §10.1.6 OrdinaryDefineOwnProperty
    pub(crate) fn ordinary_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> bool {
        let obj = match self.get_object(id) {
            Some(o) => o,
            None => return false,
        };
        let mut b = obj.borrow_mut();
        let current = b.table.get(&key).cloned();
        let extensible = b.extensible;
        match validate_and_apply(extensible, current.as_ref(), &desc) {
            Some(stored) => {
                b.table.insert(key, stored);
                true
            }
            None => false,
        }
    }

    // §10.1.10 OrdinaryDelete
    pub(crate) fn ordinary_delete(&mut self, id: u64, key: &PropertyKey) -> bool {
        let obj = match self.get_object(id) {
            Some(o) => o,
            None => return true,
        };
        let mut b = obj.borrow_mut();
        match b.table.get(key) {
            None => true,
            Some(desc) if desc.configurable() => {
                b.table.remove(key);
                true
            }
            Some(_) => false,
        }
    }

    pub(crate) fn ordinary_own_keys(&self, id: u64) -> Vec<PropertyKey> {
        self.get_object(id)
            .map(|obj| obj.borrow().table.own_keys())
            .unwrap_or_default()
    }

    pub(crate) fn ordinary_get_prototype_of(&self, id: u64) -> JsValue {
        match self.get_object(id).and_then(|o| o.borrow().prototype) {
            Some(p) => JsValue::object(p),
            None => JsValue::Null,
        }
    }

    // §10.1.2.1 OrdinarySetPrototypeOf, with the cycle walk cut short at
    // the first exotic (proxy) link.
    pub(crate) fn ordinary_set_prototype_of(
        &mut self,
        id: u64,
        proto: &JsValue,
    ) -> JsResult<bool> {
        let new_proto = proto.object_id();
        let obj = match self.get_object(id) {
            Some(o) => o,
            None => return Ok(false),
        };
        let (current, extensible) = {
            let b = obj.borrow();
            (b.prototype, b.extensible)
        };
        if current == new_proto {
            return Ok(true);
        }
        if !extensible {
            return Ok(false);
        }
        let mut p = new_proto;
        while let Some(pid) = p {
            if pid == id {
                return Ok(false);
            }
            if self.exotic_kind(pid) == ExoticKind::Proxy {
                break;
            }
            p = self.get_object(pid).and_then(|o| o.borrow().prototype);
        }
        obj.borrow_mut().prototype = new_proto;
        Ok(true)
    }

    pub(crate) fn ordinary_is_extensible(&self, id: u64) -> bool {
        self.get_object(id)
            .map(|o| o.borrow().extensible)
            .unwrap_or(false)
    }

    /// Once extensible flips to false it never flips back; no new own keys
    /// may be added, ever.
    pub(crate) fn ordinary_prevent_extensions(&mut self, id: u64) -> bool {
        if let Some(obj) = self.get_object(id) {
            obj.borrow_mut().extensible = false;
        }
        true
    }

    // ---- integrity levels ----------------------------------------------

    /// §7.3.16 SetIntegrityLevel. For non-proxy targets the narrowings are
    /// applied directly to the table after a feasibility check, so a
    /// failing freeze leaves no partial mutation behind; proxy targets get
    /// the observable trap-by-trap algorithm.
    pub fn set_integrity_level(
        &mut self,
        target: &JsValue,
        level: IntegrityLevel,
    ) -> JsResult<bool> {
        let id = self.expect_object(target, "setIntegrityLevel")?;
        let kind = self.exotic_kind(id);

        if kind == ExoticKind::Proxy {
            if !self.object_prevent_extensions(id)? {
                return Ok(false);
            }
            for key in self.object_own_keys(id)? {
                let narrowing = if level == IntegrityLevel::Sealed {
                    PropertyDescriptor {
                        configurable: Some(false),
                        ..Default::default()
                    }
                } else {
                    match self.object_get_own_property(id, &key)? {
                        None => continue,
                        Some(current) if current.is_accessor_descriptor() => PropertyDescriptor {
                            configurable: Some(false),
                            ..Default::default()
                        },
                        Some(_) => PropertyDescriptor {
                            configurable: Some(false),
                            writable: Some(false),
                            ..Default::default()
                        },
                    }
                };
                if !self.object_define_own_property(id, key.clone(), narrowing)? {
                    return Err(
                        self.create_type_error(&format!("Cannot redefine property: {key}"))
                    );
                }
            }
            return Ok(true);
        }

        // Feasibility before mutation: integer-indexed elements of a live
        // typed array can never be made non-configurable.
        if kind == ExoticKind::TypedArray && self.typed_array_visible_length(id) > 0 {
            return Ok(false);
        }
        // Fast element storage holds configurable properties; migrate them
        // into the table so the narrowing below covers them.
        if kind == ExoticKind::Array {
            self.array_to_dictionary(id);
        }
        if kind == ExoticKind::Arguments {
            self.arguments_unmap_all(id);
        }

        self.object_prevent_extensions(id)?;
        if let Some(obj) = self.get_object(id) {
            let mut b = obj.borrow_mut();
            for desc in b.table.values_mut() {
                if level == IntegrityLevel::Frozen && desc.is_data_descriptor() {
                    desc.writable = Some(false);
                }
                desc.configurable = Some(false);
            }
        }
        Ok(true)
    }

    // §7.3.17 TestIntegrityLevel
    pub fn test_integrity_level(
        &mut self,
        target: &JsValue,
        level: IntegrityLevel,
    ) -> JsResult<bool> {
        let id = self.expect_object(target, "testIntegrityLevel")?;
        if self.object_is_extensible(id)? {
            return Ok(false);
        }
        for key in self.object_own_keys(id)? {
            if let Some(desc) = self.object_get_own_property(id, &key)? {
                if desc.configurable() {
                    return Ok(false);
                }
                if level == IntegrityLevel::Frozen && desc.is_data_descriptor() && desc.writable()
                {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Object.freeze: idempotent; TypeError when the level cannot be set.
    pub fn freeze(&mut self, target: &JsValue) -> JsResult<()> {
        if self.set_integrity_level(target, IntegrityLevel::Frozen)? {
            Ok(())
        } else {
            Err(self.create_type_error("Cannot freeze"))
        }
    }

    pub fn seal(&mut self, target: &JsValue) -> JsResult<()> {
        if self.set_integrity_level(target, IntegrityLevel::Sealed)? {
            Ok(())
        } else {
            Err(self.create_type_error("Cannot seal"))
        }
    }

    pub fn is_frozen(&mut self, target: &JsValue) -> JsResult<bool> {
        self.test_integrity_level(target, IntegrityLevel::Frozen)
    }

    pub fn is_sealed(&mut self, target: &JsValue) -> JsResult<bool> {
        self.test_integrity_level(target, IntegrityLevel::Sealed)
    }
}
