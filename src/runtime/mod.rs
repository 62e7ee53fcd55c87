//! The runtime core: a per-agent `Realm` owning the object arena, the
//! intrinsic prototypes, the job queue, and the weak-reference tracker.
//!
//! Every internal method of the specification enters through the dispatch
//! functions here (`object_get`, `object_set`, ...) which route to the
//! ordinary algorithms or to the exotic overrides by object kind.

use crate::types::{
    FIRST_USER_SYMBOL_ID, JsString, JsSymbol, JsValue, PropertyKey, WellKnownSymbol,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

mod helpers;
pub(crate) use helpers::*;

pub mod property;
pub use property::{PropertyDescriptor, PropertyTable};

mod object;
pub use object::IntegrityLevel;
mod array;
pub use array::ElementsKind;
pub(crate) use array::ArrayStorage;
mod exotic;
pub use exotic::BindingSlot;
pub(crate) use exotic::{ArgumentsMap, NamespaceData};
mod proxy;
pub(crate) use proxy::ProxyData;
mod buffer;
pub use buffer::{ByteOrder, SharedBytes};
pub(crate) use buffer::{BufferData, BufferStorage};
mod typed_array;
pub use typed_array::TypedArrayKind;
pub(crate) use typed_array::ViewData;
mod atomics;
pub use atomics::WaitOutcome;
pub(crate) use atomics::PendingWait;
mod jobs;
pub(crate) use jobs::Job;
mod weak;
pub(crate) use weak::{RegistryData, WeakRefData};
mod gc;

pub type JsResult<T = JsValue> = Result<T, JsValue>;

pub type ObjRef = Rc<RefCell<JsObjectData>>;

type NativeFnImpl = dyn Fn(&mut Realm, &JsValue, &[JsValue]) -> JsResult;

/// A host function. The core has no parser, so every callable — accessor,
/// proxy trap, coercion hook, cleanup callback — is native.
pub struct JsFunction {
    pub name: String,
    pub arity: usize,
    pub is_constructor: bool,
    func: Rc<NativeFnImpl>,
}

impl JsFunction {
    pub fn native(
        name: &str,
        arity: usize,
        f: impl Fn(&mut Realm, &JsValue, &[JsValue]) -> JsResult + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            arity,
            is_constructor: false,
            func: Rc::new(f),
        }
    }

    pub fn constructor(
        name: &str,
        arity: usize,
        f: impl Fn(&mut Realm, &JsValue, &[JsValue]) -> JsResult + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            arity,
            is_constructor: true,
            func: Rc::new(f),
        }
    }
}

impl Clone for JsFunction {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            arity: self.arity,
            is_constructor: self.is_constructor,
            func: self.func.clone(),
        }
    }
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsFunction({:?}, {})", self.name, self.arity)
    }
}

/// The exotic payload. A closed set of kinds; each overrides only the
/// internal methods it must, delegating the rest to the ordinary algorithms
/// over the embedded property table.
#[derive(Debug)]
pub enum Exotic {
    Ordinary,
    Array(ArrayStorage),
    Arguments(ArgumentsMap),
    StringWrapper,
    Namespace(NamespaceData),
    Proxy(ProxyData),
    ArrayBuffer(BufferData),
    TypedArray(ViewData),
    DataView(ViewData),
    WeakRef(WeakRefData),
    FinalizationRegistry(RegistryData),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExoticKind {
    Ordinary,
    Array,
    Arguments,
    StringWrapper,
    Namespace,
    Proxy,
    ArrayBuffer,
    TypedArray,
    DataView,
    WeakRef,
    FinalizationRegistry,
}

impl Exotic {
    pub(crate) fn kind(&self) -> ExoticKind {
        match self {
            Exotic::Ordinary => ExoticKind::Ordinary,
            Exotic::Array(_) => ExoticKind::Array,
            Exotic::Arguments(_) => ExoticKind::Arguments,
            Exotic::StringWrapper => ExoticKind::StringWrapper,
            Exotic::Namespace(_) => ExoticKind::Namespace,
            Exotic::Proxy(_) => ExoticKind::Proxy,
            Exotic::ArrayBuffer(_) => ExoticKind::ArrayBuffer,
            Exotic::TypedArray(_) => ExoticKind::TypedArray,
            Exotic::DataView(_) => ExoticKind::DataView,
            Exotic::WeakRef(_) => ExoticKind::WeakRef,
            Exotic::FinalizationRegistry(_) => ExoticKind::FinalizationRegistry,
        }
    }
}

#[derive(Debug)]
pub struct JsObjectData {
    pub id: Option<u64>,
    pub class_name: String,
    /// Prototype as an arena handle; strong edges are plain handles the
    /// collector traces, so prototype cycles cannot leak.
    pub prototype: Option<u64>,
    pub extensible: bool,
    pub table: PropertyTable,
    pub callable: Option<JsFunction>,
    pub primitive_value: Option<JsValue>,
    pub exotic: Exotic,
}

impl JsObjectData {
    pub(crate) fn new() -> Self {
        Self {
            id: None,
            class_name: "Object".to_string(),
            prototype: None,
            extensible: true,
            table: PropertyTable::new(),
            callable: None,
            primitive_value: None,
            exotic: Exotic::Ordinary,
        }
    }
}

/// Per-realm intrinsic objects, created once at realm construction and
/// threaded through by reference — never module-level singletons, so
/// multiple realms coexist without aliasing.
#[derive(Debug, Default)]
pub struct Intrinsics {
    pub object_prototype: Option<u64>,
    pub function_prototype: Option<u64>,
    pub array_prototype: Option<u64>,
    pub string_prototype: Option<u64>,
    pub error_prototype: Option<u64>,
    pub array_buffer_prototype: Option<u64>,
    pub shared_array_buffer_prototype: Option<u64>,
    pub typed_array_prototype: Option<u64>,
    pub data_view_prototype: Option<u64>,
    pub weak_ref_prototype: Option<u64>,
    pub finalization_registry_prototype: Option<u64>,
}

impl Intrinsics {
    pub(crate) fn all(&self) -> impl Iterator<Item = u64> {
        [
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.string_prototype,
            self.error_prototype,
            self.array_buffer_prototype,
            self.shared_array_buffer_prototype,
            self.typed_array_prototype,
            self.data_view_prototype,
            self.weak_ref_prototype,
            self.finalization_registry_prototype,
        ]
        .into_iter()
        .flatten()
    }
}

/// One agent's runtime state. Execution is run-to-completion: nothing here
/// is shared across threads except SharedArrayBuffer storage, which lives
/// behind its own lock (`buffer::SharedBytes`).
pub struct Realm {
    pub(crate) objects: Vec<Option<ObjRef>>,
    pub(crate) free_list: Vec<usize>,
    pub intrinsics: Intrinsics,
    pub(crate) next_symbol_id: u64,
    pub(crate) roots: Vec<JsValue>,
    pub(crate) jobs: VecDeque<Job>,
    pub(crate) kept_alive: Vec<u64>,
    pub(crate) unhandled_errors: Vec<JsValue>,
    pub(crate) pending_waits: Vec<PendingWait>,
    pub(crate) can_block: bool,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl Realm {
    pub fn new() -> Self {
        Self::with_can_block(true)
    }

    /// An agent that may not block (a UI agent) gets `can_block = false`;
    /// `Atomics.wait` then throws TypeError.
    pub fn with_can_block(can_block: bool) -> Self {
        let mut realm = Self {
            objects: Vec::new(),
            free_list: Vec::new(),
            intrinsics: Intrinsics::default(),
            next_symbol_id: FIRST_USER_SYMBOL_ID,
            roots: Vec::new(),
            jobs: VecDeque::new(),
            kept_alive: Vec::new(),
            unhandled_errors: Vec::new(),
            pending_waits: Vec::new(),
            can_block,
        };
        realm.setup_intrinsics();
        realm
    }

    fn setup_intrinsics(&mut self) {
        let object_proto = self.allocate_raw(JsObjectData::new());
        self.intrinsics.object_prototype = Some(object_proto);

        let mut mk = |realm: &mut Realm, class_name: &str| {
            let mut data = JsObjectData::new();
            data.class_name = class_name.to_string();
            data.prototype = Some(object_proto);
            realm.allocate_raw(data)
        };
        self.intrinsics.function_prototype = Some(mk(self, "Function"));
        self.intrinsics.array_prototype = Some(mk(self, "Array"));
        self.intrinsics.string_prototype = Some(mk(self, "String"));
        self.intrinsics.error_prototype = Some(mk(self, "Error"));
        self.intrinsics.array_buffer_prototype = Some(mk(self, "ArrayBuffer"));
        self.intrinsics.shared_array_buffer_prototype = Some(mk(self, "SharedArrayBuffer"));
        self.intrinsics.typed_array_prototype = Some(mk(self, "TypedArray"));
        self.intrinsics.data_view_prototype = Some(mk(self, "DataView"));
        self.intrinsics.weak_ref_prototype = Some(mk(self, "WeakRef"));
        self.intrinsics.finalization_registry_prototype = Some(mk(self, "FinalizationRegistry"));
    }

    pub(crate) fn get_object(&self, id: u64) -> Option<ObjRef> {
        self.objects.get(id as usize).and_then(|slot| slot.clone())
    }

    pub(crate) fn expect_object(&mut self, val: &JsValue, what: &str) -> JsResult<u64> {
        match val.object_id() {
            Some(id) if self.get_object(id).is_some() => Ok(id),
            _ => Err(self.create_type_error(&format!("{what} called on non-object"))),
        }
    }

    pub(crate) fn exotic_kind(&self, id: u64) -> ExoticKind {
        self.get_object(id)
            .map(|o| o.borrow().exotic.kind())
            .unwrap_or(ExoticKind::Ordinary)
    }

    // ---- allocation ----------------------------------------------------

    pub(crate) fn allocate_raw(&mut self, data: JsObjectData) -> u64 {
        self.allocate_object_slot(Rc::new(RefCell::new(data)))
    }

    pub(crate) fn create_object_data(&mut self) -> (u64, ObjRef) {
        let mut data = JsObjectData::new();
        data.prototype = self.intrinsics.object_prototype;
        let obj = Rc::new(RefCell::new(data));
        let id = self.allocate_object_slot(obj.clone());
        (id, obj)
    }

    /// A fresh ordinary object with the realm's %Object.prototype%.
    pub fn create_object(&mut self) -> JsValue {
        let (id, _) = self.create_object_data();
        JsValue::object(id)
    }

    pub fn create_object_with_prototype(&mut self, prototype: &JsValue) -> JsResult {
        let proto = match prototype {
            JsValue::Null => None,
            JsValue::Object(o) => Some(o.id),
            _ => {
                return Err(
                    self.create_type_error("Object prototype may only be an Object or null")
                );
            }
        };
        let mut data = JsObjectData::new();
        data.prototype = proto;
        let id = self.allocate_raw(data);
        Ok(JsValue::object(id))
    }

    pub fn create_function(&mut self, func: JsFunction) -> JsValue {
        let name = func.name.clone();
        let arity = func.arity;
        let mut data = JsObjectData::new();
        data.class_name = "Function".to_string();
        data.prototype = self.intrinsics.function_prototype;
        data.callable = Some(func);
        data.table.insert(
            PropertyKey::string("length"),
            PropertyDescriptor::data(JsValue::Number(arity as f64), false, false, true),
        );
        data.table.insert(
            PropertyKey::string("name"),
            PropertyDescriptor::data(JsValue::string(&name), false, false, true),
        );
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    pub fn create_symbol(&mut self, description: Option<&str>) -> JsSymbol {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        JsSymbol {
            id,
            description: description.map(JsString::from_str),
        }
    }

    pub fn well_known_symbol(&self, which: WellKnownSymbol) -> JsSymbol {
        which.to_symbol()
    }

    // ---- errors --------------------------------------------------------

    pub(crate) fn create_error(&mut self, name: &str, msg: &str) -> JsValue {
        let mut data = JsObjectData::new();
        data.class_name = name.to_string();
        data.prototype = self.intrinsics.error_prototype;
        data.table.insert(
            PropertyKey::string("name"),
            PropertyDescriptor::data(JsValue::string(name), true, false, true),
        );
        data.table.insert(
            PropertyKey::string("message"),
            PropertyDescriptor::data(JsValue::string(msg), true, false, true),
        );
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    pub(crate) fn create_type_error(&mut self, msg: &str) -> JsValue {
        self.create_error("TypeError", msg)
    }

    pub(crate) fn create_range_error(&mut self, msg: &str) -> JsValue {
        self.create_error("RangeError", msg)
    }

    /// "TypeError: msg" for an error produced by this realm, or the
    /// display form of whatever value was thrown.
    pub fn format_error(&self, err: &JsValue) -> String {
        if let JsValue::Object(o) = err
            && let Some(obj) = self.get_object(o.id)
        {
            let b = obj.borrow();
            let name = b
                .table
                .get(&PropertyKey::string("name"))
                .and_then(|d| d.value.clone());
            let msg = b
                .table
                .get(&PropertyKey::string("message"))
                .and_then(|d| d.value.clone());
            if let (Some(n), Some(m)) = (name, msg) {
                return format!("{n}: {m}");
            }
        }
        format!("{err}")
    }

    // ---- calling -------------------------------------------------------

    pub fn is_callable(&self, val: &JsValue) -> bool {
        match val.object_id().and_then(|id| self.get_object(id)) {
            Some(obj) => {
                let b = obj.borrow();
                match &b.exotic {
                    // A proxy is callable exactly when its target is.
                    Exotic::Proxy(p) => {
                        let target = p.target;
                        drop(b);
                        target
                            .map(|t| self.is_callable(&JsValue::object(t)))
                            .unwrap_or(false)
                    }
                    _ => b.callable.is_some(),
                }
            }
            None => false,
        }
    }

    pub fn is_constructor(&self, val: &JsValue) -> bool {
        match val.object_id().and_then(|id| self.get_object(id)) {
            Some(obj) => {
                let b = obj.borrow();
                match &b.exotic {
                    Exotic::Proxy(p) => {
                        let target = p.target;
                        drop(b);
                        target
                            .map(|t| self.is_constructor(&JsValue::object(t)))
                            .unwrap_or(false)
                    }
                    _ => b.callable.as_ref().is_some_and(|f| f.is_constructor),
                }
            }
            None => false,
        }
    }

    pub fn call(&mut self, func: &JsValue, this: &JsValue, args: &[JsValue]) -> JsResult {
        let id = match func.object_id() {
            Some(id) => id,
            None => return Err(self.create_type_error("value is not a function")),
        };
        if self.exotic_kind(id) == ExoticKind::Proxy {
            return self.proxy_apply(id, this, args);
        }
        let f = self
            .get_object(id)
            .and_then(|o| o.borrow().callable.clone());
        match f {
            Some(f) => (f.func)(self, this, args),
            None => Err(self.create_type_error("value is not a function")),
        }
    }

    pub fn construct(&mut self, func: &JsValue, args: &[JsValue]) -> JsResult {
        let id = match func.object_id() {
            Some(id) => id,
            None => return Err(self.create_type_error("value is not a constructor")),
        };
        if self.exotic_kind(id) == ExoticKind::Proxy {
            return self.proxy_construct(id, args);
        }
        let f = self
            .get_object(id)
            .and_then(|o| o.borrow().callable.clone());
        match f {
            Some(f) if f.is_constructor => (f.func)(self, &JsValue::Undefined, args),
            _ => Err(self.create_type_error("value is not a constructor")),
        }
    }

    // ---- GC roots ------------------------------------------------------

    /// Pin a value so the collector treats it as reachable.
    pub fn root(&mut self, val: JsValue) {
        self.roots.push(val);
    }

    /// Drop the first pinned occurrence of `val`.
    pub fn unroot(&mut self, val: &JsValue) {
        if let Some(pos) = self.roots.iter().position(|r| strict_equality(r, val)) {
            self.roots.swap_remove(pos);
        }
    }

    pub fn take_unhandled_errors(&mut self) -> Vec<JsValue> {
        std::mem::take(&mut self.unhandled_errors)
    }

    // ---- internal method dispatch --------------------------------------

    pub(crate) fn object_get(
        &mut self,
        id: u64,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_get(id, key, receiver),
            ExoticKind::TypedArray => self.typed_array_get(id, key, receiver),
            ExoticKind::StringWrapper => self.string_wrapper_get(id, key, receiver),
            ExoticKind::Arguments => self.arguments_get(id, key, receiver),
            _ => self.ordinary_get(id, key, receiver),
        }
    }

    pub(crate) fn object_set(
        &mut self,
        id: u64,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_set(id, key, value, receiver),
            ExoticKind::TypedArray => self.typed_array_set(id, key, value, receiver),
            ExoticKind::Namespace => Ok(false),
            ExoticKind::Arguments => self.arguments_set(id, key, value, receiver),
            _ => self.ordinary_set(id, key, value, receiver),
        }
    }

    pub(crate) fn object_get_own_property(
        &mut self,
        id: u64,
        key: &PropertyKey,
    ) -> JsResult<Option<PropertyDescriptor>> {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_get_own_property(id, key),
            ExoticKind::Array => Ok(self.array_get_own_property(id, key)),
            ExoticKind::TypedArray => Ok(self.typed_array_get_own_property(id, key)),
            ExoticKind::StringWrapper => Ok(self.string_wrapper_get_own_property(id, key)),
            ExoticKind::Arguments => Ok(self.arguments_get_own_property(id, key)),
            _ => Ok(self.ordinary_get_own_property(id, key)),
        }
    }

    pub(crate) fn object_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_define_own_property(id, key, desc),
            ExoticKind::Array => self.array_define_own_property(id, key, desc),
            ExoticKind::TypedArray => self.typed_array_define_own_property(id, key, desc),
            ExoticKind::Namespace => self.namespace_define_own_property(id, key, desc),
            ExoticKind::StringWrapper => self.string_wrapper_define_own_property(id, key, desc),
            ExoticKind::Arguments => self.arguments_define_own_property(id, key, desc),
            _ => Ok(self.ordinary_define_own_property(id, key, desc)),
        }
    }

    pub(crate) fn object_delete(&mut self, id: u64, key: &PropertyKey) -> JsResult<bool> {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_delete(id, key),
            ExoticKind::Array => Ok(self.array_delete(id, key)),
            ExoticKind::TypedArray => Ok(self.typed_array_delete(id, key)),
            ExoticKind::Namespace => Ok(self.namespace_delete(id, key)),
            ExoticKind::Arguments => Ok(self.arguments_delete(id, key)),
            _ => Ok(self.ordinary_delete(id, key)),
        }
    }

    pub(crate) fn object_has_property(&mut self, id: u64, key: &PropertyKey) -> JsResult<bool> {
        if self.exotic_kind(id) == ExoticKind::Proxy {
            return self.proxy_has(id, key);
        }
        if self.object_get_own_property(id, key)?.is_some() {
            return Ok(true);
        }
        match self.object_get_prototype_of(id)? {
            JsValue::Object(proto) => self.object_has_property(proto.id, key),
            _ => Ok(false),
        }
    }

    pub(crate) fn object_own_keys(&mut self, id: u64) -> JsResult<Vec<PropertyKey>> {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_own_keys(id),
            ExoticKind::Array => Ok(self.array_own_keys(id)),
            ExoticKind::TypedArray => Ok(self.typed_array_own_keys(id)),
            ExoticKind::StringWrapper => Ok(self.string_wrapper_own_keys(id)),
            _ => Ok(self.ordinary_own_keys(id)),
        }
    }

    pub(crate) fn object_get_prototype_of(&mut self, id: u64) -> JsResult {
        if self.exotic_kind(id) == ExoticKind::Proxy {
            return self.proxy_get_prototype_of(id);
        }
        Ok(self.ordinary_get_prototype_of(id))
    }

    pub(crate) fn object_set_prototype_of(&mut self, id: u64, proto: &JsValue) -> JsResult<bool> {
        match self.exotic_kind(id) {
            ExoticKind::Proxy => self.proxy_set_prototype_of(id, proto),
            ExoticKind::Namespace => Ok(proto.is_null()),
            _ => self.ordinary_set_prototype_of(id, proto),
        }
    }

    pub(crate) fn object_is_extensible(&mut self, id: u64) -> JsResult<bool> {
        if self.exotic_kind(id) == ExoticKind::Proxy {
            return self.proxy_is_extensible(id);
        }
        Ok(self.ordinary_is_extensible(id))
    }

    pub(crate) fn object_prevent_extensions(&mut self, id: u64) -> JsResult<bool> {
        if self.exotic_kind(id) == ExoticKind::Proxy {
            return self.proxy_prevent_extensions(id);
        }
        Ok(self.ordinary_prevent_extensions(id))
    }

    // ---- public reflection surface -------------------------------------

    pub fn get(&mut self, target: &JsValue, key: &PropertyKey) -> JsResult {
        let id = self.expect_object(target, "get")?;
        self.object_get(id, key, target)
    }

    pub fn get_with_receiver(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        let id = self.expect_object(target, "get")?;
        self.object_get(id, key, receiver)
    }

    /// Reports whether the write succeeded; exotic objects and
    /// non-writable properties refuse without throwing.
    pub fn set(&mut self, target: &JsValue, key: &PropertyKey, value: JsValue) -> JsResult<bool> {
        let id = self.expect_object(target, "set")?;
        self.object_set(id, key, value, &target.clone())
    }

    pub fn set_with_receiver(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        let id = self.expect_object(target, "set")?;
        self.object_set(id, key, value, receiver)
    }

    pub fn has(&mut self, target: &JsValue, key: &PropertyKey) -> JsResult<bool> {
        let id = self.expect_object(target, "has")?;
        self.object_has_property(id, key)
    }

    pub fn define_property(
        &mut self,
        target: &JsValue,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        let id = self.expect_object(target, "defineProperty")?;
        self.object_define_own_property(id, key, desc)
    }

    /// `define_property` that throws TypeError on refusal, the
    /// `Object.defineProperty` flavor.
    pub fn define_property_or_throw(
        &mut self,
        target: &JsValue,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<()> {
        if self.define_property(target, key.clone(), desc)? {
            Ok(())
        } else {
            Err(self.create_type_error(&format!("Cannot define property {key}")))
        }
    }

    pub fn delete_property(&mut self, target: &JsValue, key: &PropertyKey) -> JsResult<bool> {
        let id = self.expect_object(target, "deleteProperty")?;
        self.object_delete(id, key)
    }

    pub fn get_own_property_descriptor(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
    ) -> JsResult<Option<PropertyDescriptor>> {
        let id = self.expect_object(target, "getOwnPropertyDescriptor")?;
        self.object_get_own_property(id, key)
    }

    pub fn own_keys(&mut self, target: &JsValue) -> JsResult<Vec<PropertyKey>> {
        let id = self.expect_object(target, "ownKeys")?;
        self.object_own_keys(id)
    }

    pub fn get_prototype_of(&mut self, target: &JsValue) -> JsResult {
        let id = self.expect_object(target, "getPrototypeOf")?;
        self.object_get_prototype_of(id)
    }

    pub fn set_prototype_of(&mut self, target: &JsValue, proto: &JsValue) -> JsResult<bool> {
        let id = self.expect_object(target, "setPrototypeOf")?;
        if !matches!(proto, JsValue::Null | JsValue::Object(_)) {
            return Err(
                self.create_type_error("Object prototype may only be an Object or null")
            );
        }
        self.object_set_prototype_of(id, proto)
    }

    pub fn is_extensible(&mut self, target: &JsValue) -> JsResult<bool> {
        let id = self.expect_object(target, "isExtensible")?;
        self.object_is_extensible(id)
    }

    pub fn prevent_extensions(&mut self, target: &JsValue) -> JsResult<bool> {
        let id = self.expect_object(target, "preventExtensions")?;
        self.object_prevent_extensions(id)
    }
}
