//! WeakRef and FinalizationRegistry.
//!
//! Weak edges are the collector's business: after a sweep it clears dead
//! WeakRef targets and moves registry cells from live to cleanup-pending,
//! then enqueues one cleanup job per affected registry. Nothing here ever
//! fires a callback during collection.

use super::{Exotic, JsObjectData, JsResult, Realm, same_value};
use crate::types::JsValue;
use std::cell::Cell;

#[derive(Debug)]
pub(crate) struct WeakRefData {
    /// Cleared (to `None`) by the collector when the target dies.
    pub(crate) target: Cell<Option<u64>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CellState {
    Live,
    /// Target collected; waiting for a cleanup callback.
    Pending,
    /// Callback fired; never fires again.
    Finalized,
}

#[derive(Debug)]
pub(crate) struct WeakCell {
    pub(crate) target: u64,
    pub(crate) held: JsValue,
    pub(crate) token: Option<u64>,
    pub(crate) state: CellState,
}

#[derive(Debug)]
pub(crate) struct RegistryData {
    pub(crate) callback: JsValue,
    pub(crate) cells: Vec<WeakCell>,
}

impl Realm {
    /// `new WeakRef(target)`.
    pub fn create_weak_ref(&mut self, target: &JsValue) -> JsResult {
        let target_id = match target.object_id() {
            Some(id) => id,
            None => {
                return Err(self.create_type_error("WeakRef target must be an object"));
            }
        };
        let mut data = JsObjectData::new();
        data.class_name = "WeakRef".to_string();
        data.prototype = self.intrinsics.weak_ref_prototype;
        data.exotic = Exotic::WeakRef(WeakRefData {
            target: Cell::new(Some(target_id)),
        });
        let id = self.allocate_raw(data);
        Ok(JsValue::object(id))
    }

    /// `WeakRef.prototype.deref`: the target, or undefined once cleared.
    /// A successful deref pins the target on the kept-alive list, so it
    /// cannot be collected before the current job ends.
    pub fn weak_ref_deref(&mut self, weak_ref: &JsValue) -> JsResult {
        let id = self.expect_object(weak_ref, "deref")?;
        let target = {
            let obj = self.get_object(id);
            match obj.as_ref().map(|o| o.borrow()) {
                Some(b) => match &b.exotic {
                    Exotic::WeakRef(w) => w.target.get(),
                    _ => {
                        drop(b);
                        return Err(self.create_type_error("deref called on a non-WeakRef"));
                    }
                },
                None => None,
            }
        };
        match target {
            Some(target_id) => {
                self.kept_alive.push(target_id);
                Ok(JsValue::object(target_id))
            }
            None => Ok(JsValue::Undefined),
        }
    }

    /// `new FinalizationRegistry(cleanupCallback)`.
    pub fn create_finalization_registry(&mut self, callback: &JsValue) -> JsResult {
        if !self.is_callable(callback) {
            return Err(self.create_type_error("cleanup must be callable"));
        }
        let mut data = JsObjectData::new();
        data.class_name = "FinalizationRegistry".to_string();
        data.prototype = self.intrinsics.finalization_registry_prototype;
        data.exotic = Exotic::FinalizationRegistry(RegistryData {
            callback: callback.clone(),
            cells: Vec::new(),
        });
        let id = self.allocate_raw(data);
        Ok(JsValue::object(id))
    }

    fn with_registry<T>(
        &mut self,
        registry: &JsValue,
        f: impl FnOnce(&mut RegistryData) -> T,
    ) -> JsResult<T> {
        let id = self.expect_object(registry, "FinalizationRegistry operation")?;
        let obj = self.get_object(id);
        let result = obj.and_then(|obj| {
            let mut b = obj.borrow_mut();
            match &mut b.exotic {
                Exotic::FinalizationRegistry(data) => Some(f(data)),
                _ => None,
            }
        });
        match result {
            Some(r) => Ok(r),
            None => Err(self.create_type_error("value is not a FinalizationRegistry")),
        }
    }

    /// `register(target, heldValue, unregisterToken?)`. The held value may
    /// be anything except the target itself; a held value identical to the
    /// target would keep it alive forever.
    pub fn registry_register(
        &mut self,
        registry: &JsValue,
        target: &JsValue,
        held: JsValue,
        token: Option<&JsValue>,
    ) -> JsResult<()> {
        let target_id = match target.object_id() {
            Some(id) => id,
            None => {
                return Err(self.create_type_error("target must be an object"));
            }
        };
        if same_value(target, &held) {
            return Err(
                self.create_type_error("target and holdings must not be same")
            );
        }
        let token_id = match token {
            None => None,
            Some(t) if t.is_undefined() => None,
            Some(t) => match t.object_id() {
                Some(id) => Some(id),
                None => {
                    return Err(
                        self.create_type_error("unregisterToken must be an object")
                    );
                }
            },
        };
        self.with_registry(registry, |data| {
            data.cells.push(WeakCell {
                target: target_id,
                held,
                token: token_id,
                state: CellState::Live,
            });
        })
    }

    /// `unregister(token)`: drop matching cells, fired or not, without
    /// calling anything. Reports whether any cell matched.
    pub fn registry_unregister(&mut self, registry: &JsValue, token: &JsValue) -> JsResult<bool> {
        let token_id = match token.object_id() {
            Some(id) => id,
            None => {
                return Err(self.create_type_error("unregisterToken must be an object"));
            }
        };
        self.with_registry(registry, |data| {
            let before = data.cells.len();
            data.cells.retain(|cell| cell.token != Some(token_id));
            before != data.cells.len()
        })
    }

    /// `cleanupSome(callback?)`: synchronously drain cleanup-pending cells.
    /// One cell is taken per iteration and the callback runs with no
    /// registry borrow held, so a callback that registers, unregisters, or
    /// calls `cleanup_some` again is fine.
    pub fn registry_cleanup_some(
        &mut self,
        registry: &JsValue,
        callback: Option<&JsValue>,
    ) -> JsResult<()> {
        if let Some(cb) = callback
            && !self.is_callable(cb)
        {
            return Err(self.create_type_error("callback must be callable"));
        }
        loop {
            let next = self.with_registry(registry, |data| {
                for cell in data.cells.iter_mut() {
                    if cell.state == CellState::Pending {
                        cell.state = CellState::Finalized;
                        return Some(cell.held.clone());
                    }
                }
                None
            })?;
            let Some(held) = next else { break };
            let cb = match callback {
                Some(cb) => cb.clone(),
                None => self.with_registry(registry, |data| data.callback.clone())?,
            };
            self.call(&cb, &JsValue::Undefined, &[held])?;
        }
        // Finalized cells without a token have nothing left to do.
        self.with_registry(registry, |data| {
            data.cells
                .retain(|c| c.state != CellState::Finalized || c.token.is_some());
        })?;
        Ok(())
    }

    /// The cleanup job the collector enqueues.
    pub(crate) fn run_registry_cleanup(&mut self, registry_id: u64) -> JsResult<()> {
        let registry = JsValue::object(registry_id);
        if self.get_object(registry_id).is_none() {
            return Ok(());
        }
        self.registry_cleanup_some(&registry, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::JsFunction;
    use crate::types::PropertyKey;

    #[test]
    fn register_rejects_target_as_held_value() {
        let mut realm = Realm::new();
        let cb = realm.create_function(JsFunction::native("cb", 1, |_, _, _| {
            Ok(JsValue::Undefined)
        }));
        let registry = realm.create_finalization_registry(&cb).unwrap();
        let target = realm.create_object();

        let err = realm
            .registry_register(&registry, &target, target.clone(), None)
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("TypeError"));
        // A different held value is fine.
        realm
            .registry_register(&registry, &target, JsValue::string("held"), None)
            .unwrap();
    }

    #[test]
    fn unregister_removes_without_firing() {
        let mut realm = Realm::new();
        let fired = realm.create_object();
        let fired_clone = fired.clone();
        let cb = realm.create_function(JsFunction::native("cb", 1, move |realm, _, _| {
            realm.set(
                &fired_clone,
                &PropertyKey::string("fired"),
                JsValue::Boolean(true),
            )?;
            Ok(JsValue::Undefined)
        }));
        let registry = realm.create_finalization_registry(&cb).unwrap();
        let target = realm.create_object();
        let token = realm.create_object();
        realm.root(fired.clone());
        realm.root(token.clone());
        realm.root(registry.clone());

        realm
            .registry_register(&registry, &target, JsValue::string("held"), Some(&token))
            .unwrap();
        assert!(realm.registry_unregister(&registry, &token).unwrap());
        assert!(!realm.registry_unregister(&registry, &token).unwrap());

        drop(target);
        realm.collect_garbage();
        realm.run_jobs();
        assert!(realm
            .get(&fired, &PropertyKey::string("fired"))
            .unwrap()
            .is_undefined());
    }

    #[test]
    fn weak_ref_requires_object_target() {
        let mut realm = Realm::new();
        assert!(realm.create_weak_ref(&JsValue::Number(1.0)).is_err());
        let target = realm.create_object();
        let wr = realm.create_weak_ref(&target).unwrap();
        let v = realm.weak_ref_deref(&wr).unwrap();
        assert!(v.is_object());
    }
}
