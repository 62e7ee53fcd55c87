//! Proxy exotic objects. Every internal method consults the handler for a
//! trap, forwards to the target when the trap is absent, and validates the
//! trap's answer against the essential invariants before surfacing it.
//! A lying trap produces a TypeError, never a corrupted object graph.

use super::object::is_compatible_property_descriptor;
use super::{Exotic, JsObjectData, JsResult, PropertyDescriptor, Realm, same_value, to_boolean};
use crate::types::{JsValue, PropertyKey};

#[derive(Debug)]
pub(crate) struct ProxyData {
    /// Arena handles; cleared on revocation so the collector can reclaim
    /// the target and handler regardless of the proxy's own lifetime.
    pub(crate) target: Option<u64>,
    pub(crate) handler: Option<u64>,
    pub(crate) revoked: bool,
}

impl Realm {
    /// `Proxy(target, handler)`: both arguments must be objects.
    pub fn create_proxy(&mut self, target: &JsValue, handler: &JsValue) -> JsResult {
        let target_id = match target.object_id() {
            Some(id) => id,
            None => {
                return Err(
                    self.create_type_error("Cannot create proxy with a non-object as target")
                );
            }
        };
        let handler_id = match handler.object_id() {
            Some(id) => id,
            None => {
                return Err(
                    self.create_type_error("Cannot create proxy with a non-object as handler")
                );
            }
        };
        let mut data = JsObjectData::new();
        data.class_name = "Proxy".to_string();
        data.prototype = None;
        data.exotic = Exotic::Proxy(ProxyData {
            target: Some(target_id),
            handler: Some(handler_id),
            revoked: false,
        });
        let id = self.allocate_raw(data);
        Ok(JsValue::object(id))
    }

    /// `Proxy.revocable`: the proxy plus a revoker function. Revocation is
    /// idempotent and permanent.
    pub fn create_revocable_proxy(
        &mut self,
        target: &JsValue,
        handler: &JsValue,
    ) -> JsResult<(JsValue, JsValue)> {
        let proxy = self.create_proxy(target, handler)?;
        let proxy_for_revoker = proxy.clone();
        let revoker = self.create_function(super::JsFunction::native(
            "revoke",
            0,
            move |realm, _this, _args| {
                realm.revoke_proxy(&proxy_for_revoker);
                Ok(JsValue::Undefined)
            },
        ));
        Ok((proxy, revoker))
    }

    pub fn revoke_proxy(&mut self, proxy: &JsValue) {
        if let Some(obj) = proxy.object_id().and_then(|id| self.get_object(id)) {
            let mut b = obj.borrow_mut();
            if let Exotic::Proxy(p) = &mut b.exotic {
                p.revoked = true;
                p.target = None;
                p.handler = None;
            }
        }
    }

    /// Revoked check, then GetMethod(handler, trap). `None` for the trap
    /// means forward to the target.
    fn proxy_trap(&mut self, id: u64, trap_name: &str) -> JsResult<(u64, JsValue, Option<JsValue>)> {
        let (target, handler, revoked) = match self.get_object(id) {
            Some(obj) => match &obj.borrow().exotic {
                Exotic::Proxy(p) => (p.target, p.handler, p.revoked),
                _ => (None, None, true),
            },
            None => (None, None, true),
        };
        if revoked {
            return Err(self.create_type_error(&format!(
                "Cannot perform '{trap_name}' on a proxy that has been revoked"
            )));
        }
        let (target, handler) = match (target, handler) {
            (Some(t), Some(h)) => (t, h),
            _ => {
                return Err(self.create_type_error(&format!(
                    "Cannot perform '{trap_name}' on a proxy that has been revoked"
                )));
            }
        };
        let handler_val = JsValue::object(handler);
        let trap = self.object_get(handler, &PropertyKey::string(trap_name), &handler_val)?;
        let trap = if trap.is_nullish() {
            None
        } else if self.is_callable(&trap) {
            Some(trap)
        } else {
            return Err(self.create_type_error(&format!("'{trap_name}' trap is not a function")));
        };
        Ok((target, handler_val, trap))
    }

    fn call_trap(
        &mut self,
        trap: &JsValue,
        handler: &JsValue,
        args: &[JsValue],
    ) -> JsResult {
        self.call(trap, handler, args)
    }

    // ---- the thirteen internal methods ---------------------------------

    pub(crate) fn proxy_get(
        &mut self,
        id: u64,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        let (target, handler, trap) = self.proxy_trap(id, "get")?;
        let Some(trap) = trap else {
            return self.object_get(target, key, receiver);
        };
        let result = self.call_trap(
            &trap,
            &handler,
            &[JsValue::object(target), key.to_value(), receiver.clone()],
        )?;
        if let Some(target_desc) = self.object_get_own_property(target, key)?
            && !target_desc.configurable()
        {
            if target_desc.is_data_descriptor() && !target_desc.writable() {
                let frozen = target_desc.value.as_ref().unwrap_or(&JsValue::Undefined);
                if !same_value(&result, frozen) {
                    return Err(self.create_type_error(&format!(
                        "'get' on proxy: property '{key}' is a read-only and non-configurable \
                         data property on the proxy target but the proxy did not return its \
                         actual value"
                    )));
                }
            }
            if target_desc.is_accessor_descriptor()
                && target_desc.get.as_ref().is_none_or(|g| g.is_undefined())
                && !result.is_undefined()
            {
                return Err(self.create_type_error(&format!(
                    "'get' on proxy: property '{key}' is a non-configurable accessor property \
                     on the proxy target without a getter, but the trap did not return undefined"
                )));
            }
        }
        Ok(result)
    }

    pub(crate) fn proxy_set(
        &mut self,
        id: u64,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "set")?;
        let Some(trap) = trap else {
            return self.object_set(target, key, value, receiver);
        };
        let answer = self.call_trap(
            &trap,
            &handler,
            &[
                JsValue::object(target),
                key.to_value(),
                value.clone(),
                receiver.clone(),
            ],
        )?;
        if !to_boolean(&answer) {
            return Ok(false);
        }
        if let Some(target_desc) = self.object_get_own_property(target, key)?
            && !target_desc.configurable()
        {
            if target_desc.is_data_descriptor() && !target_desc.writable() {
                let frozen = target_desc.value.as_ref().unwrap_or(&JsValue::Undefined);
                if !same_value(&value, frozen) {
                    return Err(self.create_type_error(&format!(
                        "'set' on proxy: trap returned truish for property '{key}' which \
                         exists in the proxy target as a non-configurable and non-writable \
                         data property with a different value"
                    )));
                }
            }
            if target_desc.is_accessor_descriptor()
                && target_desc.set.as_ref().is_none_or(|s| s.is_undefined())
            {
                return Err(self.create_type_error(&format!(
                    "'set' on proxy: trap returned truish for property '{key}' which exists \
                     in the proxy target as a non-configurable accessor property without a setter"
                )));
            }
        }
        Ok(true)
    }

    pub(crate) fn proxy_get_own_property(
        &mut self,
        id: u64,
        key: &PropertyKey,
    ) -> JsResult<Option<PropertyDescriptor>> {
        let (target, handler, trap) = self.proxy_trap(id, "getOwnPropertyDescriptor")?;
        let Some(trap) = trap else {
            return self.object_get_own_property(target, key);
        };
        let result = self.call_trap(&trap, &handler, &[JsValue::object(target), key.to_value()])?;
        if !result.is_undefined() && !result.is_object() {
            return Err(self.create_type_error(
                "'getOwnPropertyDescriptor' on proxy: trap returned neither object nor undefined",
            ));
        }
        let target_desc = self.object_get_own_property(target, key)?;
        if result.is_undefined() {
            let Some(td) = target_desc else {
                return Ok(None);
            };
            if !td.configurable() {
                return Err(self.create_type_error(&format!(
                    "'getOwnPropertyDescriptor' on proxy: trap returned undefined for property \
                     '{key}' which is non-configurable in the proxy target"
                )));
            }
            if !self.object_is_extensible(target)? {
                return Err(self.create_type_error(&format!(
                    "'getOwnPropertyDescriptor' on proxy: trap returned undefined for property \
                     '{key}' which exists in the non-extensible proxy target"
                )));
            }
            return Ok(None);
        }
        let extensible = self.object_is_extensible(target)?;
        let result_desc = self.to_property_descriptor(&result)?.complete();
        if !is_compatible_property_descriptor(extensible, &result_desc, target_desc.as_ref()) {
            return Err(self.create_type_error(&format!(
                "'getOwnPropertyDescriptor' on proxy: trap returned descriptor for property \
                 '{key}' that is incompatible with the existing property in the proxy target"
            )));
        }
        if !result_desc.configurable() {
            let truly_non_configurable =
                target_desc.as_ref().is_some_and(|td| !td.configurable());
            if !truly_non_configurable {
                return Err(self.create_type_error(&format!(
                    "'getOwnPropertyDescriptor' on proxy: trap reported non-configurability \
                     for property '{key}' which is either non-existent or configurable in the \
                     proxy target"
                )));
            }
            if result_desc.is_data_descriptor()
                && !result_desc.writable()
                && target_desc.as_ref().is_some_and(|td| td.writable())
            {
                return Err(self.create_type_error(&format!(
                    "'getOwnPropertyDescriptor' on proxy: trap reported non-configurable and \
                     non-writable for property '{key}' which is writable in the proxy target"
                )));
            }
        }
        Ok(Some(result_desc))
    }

    pub(crate) fn proxy_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "defineProperty")?;
        let Some(trap) = trap else {
            return self.object_define_own_property(target, key, desc);
        };
        let desc_obj = self.from_property_descriptor(&desc);
        let answer = self.call_trap(
            &trap,
            &handler,
            &[JsValue::object(target), key.to_value(), desc_obj],
        )?;
        if !to_boolean(&answer) {
            return Ok(false);
        }
        let target_desc = self.object_get_own_property(target, &key)?;
        let extensible = self.object_is_extensible(target)?;
        let setting_config_false = desc.configurable == Some(false);
        match &target_desc {
            None => {
                if !extensible {
                    return Err(self.create_type_error(&format!(
                        "'defineProperty' on proxy: trap returned truish for adding property \
                         '{key}' to the non-extensible proxy target"
                    )));
                }
                if setting_config_false {
                    return Err(self.create_type_error(&format!(
                        "'defineProperty' on proxy: trap returned truish for defining \
                         non-configurable property '{key}' which is non-existent in the proxy \
                         target"
                    )));
                }
            }
            Some(td) => {
                if !is_compatible_property_descriptor(extensible, &desc, Some(td)) {
                    return Err(self.create_type_error(&format!(
                        "'defineProperty' on proxy: trap returned truish for property '{key}' \
                         that is incompatible with the existing property in the proxy target"
                    )));
                }
                if setting_config_false && td.configurable() {
                    return Err(self.create_type_error(&format!(
                        "'defineProperty' on proxy: trap returned truish for defining \
                         non-configurable property '{key}' which is configurable in the proxy \
                         target"
                    )));
                }
                if td.is_data_descriptor()
                    && !td.configurable()
                    && td.writable()
                    && desc.writable == Some(false)
                {
                    return Err(self.create_type_error(&format!(
                        "'defineProperty' on proxy: trap returned truish for defining \
                         non-writable property '{key}' which is writable in the proxy target"
                    )));
                }
            }
        }
        Ok(true)
    }

    pub(crate) fn proxy_has(&mut self, id: u64, key: &PropertyKey) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "has")?;
        let Some(trap) = trap else {
            return self.object_has_property(target, key);
        };
        let answer = self.call_trap(&trap, &handler, &[JsValue::object(target), key.to_value()])?;
        let answer = to_boolean(&answer);
        if !answer && let Some(td) = self.object_get_own_property(target, key)? {
            if !td.configurable() {
                return Err(self.create_type_error(&format!(
                    "'has' on proxy: trap returned falsish for property '{key}' which exists \
                     in the proxy target as non-configurable"
                )));
            }
            if !self.object_is_extensible(target)? {
                return Err(self.create_type_error(&format!(
                    "'has' on proxy: trap returned falsish for property '{key}' but the proxy \
                     target is not extensible"
                )));
            }
        }
        Ok(answer)
    }

    pub(crate) fn proxy_delete(&mut self, id: u64, key: &PropertyKey) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "deleteProperty")?;
        let Some(trap) = trap else {
            return self.object_delete(target, key);
        };
        let answer = self.call_trap(&trap, &handler, &[JsValue::object(target), key.to_value()])?;
        if !to_boolean(&answer) {
            return Ok(false);
        }
        let Some(td) = self.object_get_own_property(target, key)? else {
            return Ok(true);
        };
        if !td.configurable() {
            return Err(self.create_type_error(&format!(
                "'deleteProperty' on proxy: trap returned truish for property '{key}' which \
                 is non-configurable in the proxy target"
            )));
        }
        if !self.object_is_extensible(target)? {
            return Err(self.create_type_error(&format!(
                "'deleteProperty' on proxy: trap returned truish for property '{key}' but \
                 the proxy target is non-extensible"
            )));
        }
        Ok(true)
    }

    pub(crate) fn proxy_own_keys(&mut self, id: u64) -> JsResult<Vec<PropertyKey>> {
        let (target, handler, trap) = self.proxy_trap(id, "ownKeys")?;
        let Some(trap) = trap else {
            return self.object_own_keys(target);
        };
        let result = self.call_trap(&trap, &handler, &[JsValue::object(target)])?;
        let trap_keys = self.key_list_from_array_like(&result)?;

        let target_keys = self.object_own_keys(target)?;
        let mut configurable_keys = Vec::new();
        let mut non_configurable_keys = Vec::new();
        for key in &target_keys {
            match self.object_get_own_property(target, key)? {
                Some(td) if !td.configurable() => non_configurable_keys.push(key.clone()),
                Some(_) => configurable_keys.push(key.clone()),
                None => {}
            }
        }

        let mut unchecked = trap_keys.clone();
        for key in &non_configurable_keys {
            match unchecked.iter().position(|k| k == key) {
                Some(pos) => {
                    unchecked.remove(pos);
                }
                None => {
                    return Err(self.create_type_error(&format!(
                        "'ownKeys' on proxy: trap result did not include '{key}' which is \
                         non-configurable in the proxy target"
                    )));
                }
            }
        }
        if self.object_is_extensible(target)? {
            return Ok(trap_keys);
        }
        for key in &configurable_keys {
            match unchecked.iter().position(|k| k == key) {
                Some(pos) => {
                    unchecked.remove(pos);
                }
                None => {
                    return Err(self.create_type_error(&format!(
                        "'ownKeys' on proxy: trap result did not include '{key}' of the \
                         non-extensible proxy target"
                    )));
                }
            }
        }
        if !unchecked.is_empty() {
            return Err(self.create_type_error(
                "'ownKeys' on proxy: trap returned extra keys but proxy target is non-extensible",
            ));
        }
        Ok(trap_keys)
    }

    pub(crate) fn proxy_get_prototype_of(&mut self, id: u64) -> JsResult {
        let (target, handler, trap) = self.proxy_trap(id, "getPrototypeOf")?;
        let Some(trap) = trap else {
            return self.object_get_prototype_of(target);
        };
        let result = self.call_trap(&trap, &handler, &[JsValue::object(target)])?;
        if !result.is_null() && !result.is_object() {
            return Err(self.create_type_error(
                "'getPrototypeOf' on proxy: trap returned neither object nor null",
            ));
        }
        if self.object_is_extensible(target)? {
            return Ok(result);
        }
        let target_proto = self.object_get_prototype_of(target)?;
        if !same_value(&result, &target_proto) {
            return Err(self.create_type_error(
                "'getPrototypeOf' on proxy: proxy target is non-extensible but the trap did \
                 not return its actual prototype",
            ));
        }
        Ok(result)
    }

    pub(crate) fn proxy_set_prototype_of(&mut self, id: u64, proto: &JsValue) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "setPrototypeOf")?;
        let Some(trap) = trap else {
            return self.object_set_prototype_of(target, proto);
        };
        let answer =
            self.call_trap(&trap, &handler, &[JsValue::object(target), proto.clone()])?;
        if !to_boolean(&answer) {
            return Ok(false);
        }
        if self.object_is_extensible(target)? {
            return Ok(true);
        }
        let target_proto = self.object_get_prototype_of(target)?;
        if !same_value(proto, &target_proto) {
            return Err(self.create_type_error(
                "'setPrototypeOf' on proxy: trap returned truish for setting a new prototype \
                 on the non-extensible proxy target",
            ));
        }
        Ok(true)
    }

    pub(crate) fn proxy_is_extensible(&mut self, id: u64) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "isExtensible")?;
        let Some(trap) = trap else {
            return self.object_is_extensible(target);
        };
        let answer = self.call_trap(&trap, &handler, &[JsValue::object(target)])?;
        let answer = to_boolean(&answer);
        if answer != self.object_is_extensible(target)? {
            return Err(self.create_type_error(&format!(
                "'isExtensible' on proxy: trap result does not reflect extensibility of proxy \
                 target (which is '{}')",
                !answer
            )));
        }
        Ok(answer)
    }

    pub(crate) fn proxy_prevent_extensions(&mut self, id: u64) -> JsResult<bool> {
        let (target, handler, trap) = self.proxy_trap(id, "preventExtensions")?;
        let Some(trap) = trap else {
            return self.object_prevent_extensions(target);
        };
        let answer = self.call_trap(&trap, &handler, &[JsValue::object(target)])?;
        let answer = to_boolean(&answer);
        if answer && self.object_is_extensible(target)? {
            return Err(self.create_type_error(
                "'preventExtensions' on proxy: trap returned truish but the proxy target is \
                 extensible",
            ));
        }
        Ok(answer)
    }

    pub(crate) fn proxy_apply(&mut self, id: u64, this: &JsValue, args: &[JsValue]) -> JsResult {
        let (target, handler, trap) = self.proxy_trap(id, "apply")?;
        let target_val = JsValue::object(target);
        if !self.is_callable(&target_val) {
            return Err(self.create_type_error("proxy target is not a function"));
        }
        let Some(trap) = trap else {
            return self.call(&target_val, this, args);
        };
        let args_array = self.create_array(args.to_vec());
        self.call_trap(&trap, &handler, &[target_val, this.clone(), args_array])
    }

    pub(crate) fn proxy_construct(&mut self, id: u64, args: &[JsValue]) -> JsResult {
        let (target, handler, trap) = self.proxy_trap(id, "construct")?;
        let target_val = JsValue::object(target);
        if !self.is_constructor(&target_val) {
            return Err(self.create_type_error("proxy target is not a constructor"));
        }
        let Some(trap) = trap else {
            return self.construct(&target_val, args);
        };
        let args_array = self.create_array(args.to_vec());
        let result = self.call_trap(
            &trap,
            &handler,
            &[target_val.clone(), args_array, target_val],
        )?;
        if !result.is_object() {
            return Err(
                self.create_type_error("'construct' on proxy: trap returned non-object")
            );
        }
        Ok(result)
    }

    /// CreateListFromArrayLike restricted to property keys, with the
    /// ownKeys duplicate check folded in.
    fn key_list_from_array_like(&mut self, val: &JsValue) -> JsResult<Vec<PropertyKey>> {
        let id = self.expect_object(val, "ownKeys trap result")?;
        let len_val = self.object_get(id, &PropertyKey::string("length"), val)?;
        let len = self.to_index(&len_val)?;
        let mut keys = Vec::with_capacity(len.min(1024));
        for i in 0..len {
            let element = self.object_get(id, &PropertyKey::index(i as u32), val)?;
            let key = self.to_property_key(&element)?;
            if keys.contains(&key) {
                return Err(self.create_type_error(
                    "'ownKeys' on proxy: trap returned duplicate entries",
                ));
            }
            keys.push(key);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::JsFunction;

    fn handler_with_trap(
        realm: &mut Realm,
        name: &str,
        f: impl Fn(&mut Realm, &JsValue, &[JsValue]) -> JsResult + 'static,
    ) -> JsValue {
        let handler = realm.create_object();
        let trap = realm.create_function(JsFunction::native(name, 3, f));
        realm
            .set(&handler, &PropertyKey::string(name), trap)
            .unwrap();
        handler
    }

    #[test]
    fn missing_trap_forwards() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .set(&target, &PropertyKey::string("x"), JsValue::Number(7.0))
            .unwrap();
        let handler = realm.create_object();
        let proxy = realm.create_proxy(&target, &handler).unwrap();

        let v = realm.get(&proxy, &PropertyKey::string("x")).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 7.0));
        assert!(realm.has(&proxy, &PropertyKey::string("x")).unwrap());
    }

    #[test]
    fn get_trap_overrides_but_frozen_property_is_checked() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .define_property(
                &target,
                PropertyKey::string("locked"),
                PropertyDescriptor::data(JsValue::Number(1.0), false, true, false),
            )
            .unwrap();
        let handler = handler_with_trap(&mut realm, "get", |_realm, _this, _args| {
            Ok(JsValue::Number(42.0))
        });
        let proxy = realm.create_proxy(&target, &handler).unwrap();

        // Free lies are fine for keys the target does not pin down.
        let v = realm.get(&proxy, &PropertyKey::string("free")).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 42.0));

        // Lying about a non-configurable non-writable data property throws.
        let err = realm.get(&proxy, &PropertyKey::string("locked")).unwrap_err();
        assert!(realm.format_error(&err).starts_with("TypeError"));
    }

    #[test]
    fn own_keys_must_include_non_configurable() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        realm
            .define_property(
                &target,
                PropertyKey::string("pinned"),
                PropertyDescriptor::data(JsValue::Number(1.0), true, true, false),
            )
            .unwrap();
        let handler = handler_with_trap(&mut realm, "ownKeys", |realm, _this, _args| {
            Ok(realm.create_array(vec![JsValue::string("other")]))
        });
        let proxy = realm.create_proxy(&target, &handler).unwrap();

        let err = realm.own_keys(&proxy).unwrap_err();
        assert!(realm.format_error(&err).contains("pinned"));
    }

    #[test]
    fn revoked_proxy_throws() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let handler = realm.create_object();
        let (proxy, revoker) = realm.create_revocable_proxy(&target, &handler).unwrap();

        assert!(realm.get(&proxy, &PropertyKey::string("x")).is_ok());
        realm.call(&revoker, &JsValue::Undefined, &[]).unwrap();
        let err = realm.get(&proxy, &PropertyKey::string("x")).unwrap_err();
        assert!(realm.format_error(&err).contains("revoked"));
        // Revoking twice is harmless.
        realm.call(&revoker, &JsValue::Undefined, &[]).unwrap();
    }

    #[test]
    fn is_extensible_must_agree() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let handler = handler_with_trap(&mut realm, "isExtensible", |_realm, _this, _args| {
            Ok(JsValue::Boolean(false))
        });
        let proxy = realm.create_proxy(&target, &handler).unwrap();
        assert!(realm.is_extensible(&proxy).is_err());
    }

    #[test]
    fn define_property_trap_refusal_reports_false() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let handler = handler_with_trap(&mut realm, "defineProperty", |_realm, _this, _args| {
            Ok(JsValue::Boolean(false))
        });
        let proxy = realm.create_proxy(&target, &handler).unwrap();
        let ok = realm
            .define_property(
                &proxy,
                PropertyKey::string("x"),
                PropertyDescriptor::data_default(JsValue::Number(1.0)),
            )
            .unwrap();
        assert!(!ok);
    }
}
