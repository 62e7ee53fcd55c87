//! Array exotic objects. Dense arrays keep their elements in a flat
//! copy-on-write buffer outside the property table; any definition the flat
//! representation cannot express (holes, non-default attributes, accessors)
//! migrates the elements into the table and the array stays in dictionary
//! mode from then on.

use super::{Exotic, JsResult, PropertyDescriptor, Realm};
use crate::types::{JsValue, PropertyKey, number_ops};
use std::cell::RefCell;
use std::rc::Rc;

/// Advisory tag for the flat buffer; generalizes monotonically
/// Int32 -> Double -> Other and never narrows back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementsKind {
    Int32,
    Double,
    Other,
}

impl ElementsKind {
    fn of(value: &JsValue) -> ElementsKind {
        match value {
            JsValue::Number(n) if n.trunc() == *n && *n >= i32::MIN as f64 && *n <= i32::MAX as f64 =>
            {
                // -0.0 is not an int32 value
                if *n == 0.0 && n.is_sign_negative() {
                    ElementsKind::Double
                } else {
                    ElementsKind::Int32
                }
            }
            JsValue::Number(_) => ElementsKind::Double,
            _ => ElementsKind::Other,
        }
    }
}

/// A window onto a shared element buffer. Writers copy the window out into
/// a private buffer first whenever the buffer is shared or the window does
/// not span it exactly.
#[derive(Debug, Clone)]
pub(crate) struct CowElements {
    buf: Rc<RefCell<Vec<JsValue>>>,
    start: usize,
    len: usize,
}

impl CowElements {
    fn new() -> Self {
        Self {
            buf: Rc::new(RefCell::new(Vec::new())),
            start: 0,
            len: 0,
        }
    }

    fn from_values(values: Vec<JsValue>) -> Self {
        let len = values.len();
        Self {
            buf: Rc::new(RefCell::new(values)),
            start: 0,
            len,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Option<JsValue> {
        if index < self.len {
            self.buf.borrow().get(self.start + index).cloned()
        } else {
            None
        }
    }

    fn window(&self, start: usize, len: usize) -> CowElements {
        debug_assert!(start + len <= self.len);
        Self {
            buf: self.buf.clone(),
            start: self.start + start,
            len,
        }
    }

    fn is_shared(&self) -> bool {
        Rc::strong_count(&self.buf) > 1
    }

    fn make_unique(&mut self) {
        if self.is_shared() || self.start != 0 || self.len != self.buf.borrow().len() {
            let copy: Vec<JsValue> = self.buf.borrow()[self.start..self.start + self.len].to_vec();
            self.buf = Rc::new(RefCell::new(copy));
            self.start = 0;
        }
    }

    /// Overwrite or append; `index` must be `<= len`.
    fn write(&mut self, index: usize, value: JsValue) {
        self.make_unique();
        let mut b = self.buf.borrow_mut();
        if index < self.len {
            b[index] = value;
        } else {
            b.push(value);
            self.len += 1;
        }
    }

    fn truncate(&mut self, new_len: usize) {
        if new_len >= self.len {
            return;
        }
        self.make_unique();
        self.buf.borrow_mut().truncate(new_len);
        self.len = new_len;
    }

    fn take_values(&mut self) -> Vec<JsValue> {
        self.make_unique();
        std::mem::take(&mut *self.buf.borrow_mut())
    }
}

#[derive(Debug)]
pub(crate) struct ArrayStorage {
    /// `Some` while the array is dense; `None` once in dictionary mode
    /// (elements live in the property table like any other key).
    elems: Option<CowElements>,
    kind: ElementsKind,
}

impl ArrayStorage {
    fn new(elems: CowElements, kind: ElementsKind) -> Self {
        Self {
            elems: Some(elems),
            kind,
        }
    }

    /// Arena handles held by the dense elements, for the collector.
    pub(crate) fn trace_object_ids(&self, out: &mut Vec<u64>) {
        if let Some(elems) = &self.elems {
            let buf = elems.buf.borrow();
            for value in &buf[elems.start..elems.start + elems.len] {
                if let Some(id) = value.object_id() {
                    out.push(id);
                }
            }
        }
    }
}

const LENGTH: &str = "length";

fn is_plain_data_desc(desc: &PropertyDescriptor) -> bool {
    desc.value.is_some()
        && desc.get.is_none()
        && desc.set.is_none()
        && desc.writable != Some(false)
        && desc.enumerable != Some(false)
        && desc.configurable != Some(false)
}

impl Realm {
    /// A fresh dense array. `length` starts at the element count.
    pub fn create_array(&mut self, values: Vec<JsValue>) -> JsValue {
        let kind = values
            .iter()
            .map(ElementsKind::of)
            .max()
            .unwrap_or(ElementsKind::Int32);
        let len = values.len() as u32;
        let mut data = super::JsObjectData::new();
        data.class_name = "Array".to_string();
        data.prototype = self.intrinsics.array_prototype;
        data.exotic = Exotic::Array(ArrayStorage::new(CowElements::from_values(values), kind));
        data.table.insert(
            PropertyKey::string(LENGTH),
            PropertyDescriptor::data(JsValue::Number(len as f64), true, false, false),
        );
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    pub fn create_array_with_length(&mut self, length: u32) -> JsValue {
        let arr = self.create_array(Vec::new());
        if let Some(id) = arr.object_id()
            && let Some(obj) = self.get_object(id)
        {
            obj.borrow_mut().table.insert(
                PropertyKey::string(LENGTH),
                PropertyDescriptor::data(JsValue::Number(length as f64), true, false, false),
            );
        }
        arr
    }

    /// The advisory elements kind, `None` once in dictionary mode.
    pub fn array_elements_kind(&self, array: &JsValue) -> Option<ElementsKind> {
        let obj = array.object_id().and_then(|id| self.get_object(id))?;
        let b = obj.borrow();
        match &b.exotic {
            Exotic::Array(s) if s.elems.is_some() => Some(s.kind),
            _ => None,
        }
    }

    pub(crate) fn array_length_parts(&self, id: u64) -> (u32, bool) {
        let Some(obj) = self.get_object(id) else {
            return (0, false);
        };
        let b = obj.borrow();
        match b.table.get(&PropertyKey::string(LENGTH)) {
            Some(d) => {
                let len = match d.value {
                    Some(JsValue::Number(n)) => n as u32,
                    _ => 0,
                };
                (len, d.writable())
            }
            None => (0, false),
        }
    }

    pub fn array_length(&self, array: &JsValue) -> u32 {
        array
            .object_id()
            .map(|id| self.array_length_parts(id).0)
            .unwrap_or(0)
    }

    fn set_length_raw(&mut self, id: u64, len: u32, writable: bool) {
        if let Some(obj) = self.get_object(id) {
            obj.borrow_mut().table.insert(
                PropertyKey::string(LENGTH),
                PropertyDescriptor::data(JsValue::Number(len as f64), writable, false, false),
            );
        }
    }

    /// Migrate the flat elements into the property table. One-way door.
    pub(crate) fn array_to_dictionary(&mut self, id: u64) {
        let Some(obj) = self.get_object(id) else {
            return;
        };
        let values = {
            let mut b = obj.borrow_mut();
            match &mut b.exotic {
                Exotic::Array(s) => match s.elems.take() {
                    Some(mut e) => e.take_values(),
                    None => return,
                },
                _ => return,
            }
        };
        let mut b = obj.borrow_mut();
        for (i, v) in values.into_iter().enumerate() {
            b.table
                .insert(PropertyKey::index(i as u32), PropertyDescriptor::data_default(v));
        }
    }

    // §10.4.2.1 Array [[DefineOwnProperty]]
    pub(crate) fn array_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        if key == PropertyKey::string(LENGTH) {
            return self.array_set_length(id, desc);
        }
        let index = match key.as_index() {
            Some(i) => i,
            None => return Ok(self.ordinary_define_own_property(id, key, desc)),
        };

        let (length, length_writable) = self.array_length_parts(id);
        if index >= length && !length_writable {
            return Ok(false);
        }

        // Fast path: default-attribute data write at or just past the
        // dense prefix.
        if is_plain_data_desc(&desc) {
            let obj = self.get_object(id);
            if let Some(obj) = obj {
                let mut b = obj.borrow_mut();
                let extensible = b.extensible;
                if let Exotic::Array(storage) = &mut b.exotic
                    && let Some(elems) = &mut storage.elems
                    && (index as usize) <= elems.len()
                {
                    if index as usize == elems.len() && !extensible {
                        return Ok(false);
                    }
                    let value = desc.value.unwrap_or(JsValue::Undefined);
                    storage.kind = storage.kind.max(ElementsKind::of(&value));
                    elems.write(index as usize, value);
                    drop(b);
                    if index >= length {
                        self.set_length_raw(id, index + 1, length_writable);
                    }
                    return Ok(true);
                }
            }
        }

        // Anything the flat buffer cannot express: go to dictionary mode
        // and let the ordinary algorithm decide.
        self.array_to_dictionary(id);
        let ok = self.ordinary_define_own_property(id, PropertyKey::index(index), desc);
        if ok && index >= length {
            self.set_length_raw(id, index + 1, length_writable);
        }
        Ok(ok)
    }

    // §10.4.2.4 ArraySetLength. Truncation deletes from the top down and
    // stops at the first non-configurable survivor, leaving length just
    // above it and reporting failure.
    fn array_set_length(&mut self, id: u64, desc: PropertyDescriptor) -> JsResult<bool> {
        let (old_len, length_writable) = self.array_length_parts(id);

        let new_len = match &desc.value {
            None => {
                // Attribute-only change; validate against the current
                // length descriptor.
                let key = PropertyKey::string(LENGTH);
                return Ok(self.ordinary_define_own_property(id, key, desc));
            }
            Some(v) => {
                let number = self.to_number(v)?;
                let as_u32 = number_ops::to_uint32(number);
                if as_u32 as f64 != number {
                    return Err(self.create_range_error("Invalid array length"));
                }
                as_u32
            }
        };

        if desc.get.is_some() || desc.set.is_some() {
            return Ok(false);
        }
        if desc.configurable == Some(true) || desc.enumerable == Some(true) {
            return Ok(false);
        }
        let new_writable = desc.writable.unwrap_or(length_writable);

        if new_len >= old_len {
            if !length_writable && (new_len != old_len || desc.writable == Some(true)) {
                return Ok(false);
            }
            self.set_length_raw(id, new_len, new_writable);
            return Ok(true);
        }

        if !length_writable {
            return Ok(false);
        }

        // Dense prefix: every element is configurable, truncation cannot
        // fail partway.
        let fast_done = {
            let obj = self.get_object(id);
            match obj {
                Some(obj) => {
                    let mut b = obj.borrow_mut();
                    match &mut b.exotic {
                        Exotic::Array(storage) => match &mut storage.elems {
                            Some(elems) => {
                                elems.truncate(new_len as usize);
                                true
                            }
                            None => false,
                        },
                        _ => false,
                    }
                }
                None => true,
            }
        };
        if fast_done {
            self.set_length_raw(id, new_len, new_writable);
            return Ok(true);
        }

        // Dictionary mode: walk doomed indices from the highest down.
        let mut doomed: Vec<u32> = self
            .get_object(id)
            .map(|obj| {
                obj.borrow()
                    .table
                    .iter()
                    .filter_map(|(k, _)| k.as_index())
                    .filter(|i| *i >= new_len)
                    .collect()
            })
            .unwrap_or_default();
        doomed.sort_unstable_by(|a, b| b.cmp(a));

        for index in doomed {
            if !self.ordinary_delete(id, &PropertyKey::index(index)) {
                // Survivor found: length lands one above it.
                self.set_length_raw(id, index + 1, new_writable);
                return Ok(false);
            }
        }
        self.set_length_raw(id, new_len, new_writable);
        Ok(true)
    }

    pub(crate) fn array_get_own_property(
        &self,
        id: u64,
        key: &PropertyKey,
    ) -> Option<PropertyDescriptor> {
        if let Some(index) = key.as_index()
            && let Some(obj) = self.get_object(id)
        {
            let b = obj.borrow();
            if let Exotic::Array(storage) = &b.exotic
                && let Some(elems) = &storage.elems
            {
                return elems
                    .get(index as usize)
                    .map(|v| PropertyDescriptor::data_default(v).complete());
            }
        }
        self.ordinary_get_own_property(id, key)
    }

    pub(crate) fn array_delete(&mut self, id: u64, key: &PropertyKey) -> bool {
        let index = match key.as_index() {
            Some(i) => i,
            None => return self.ordinary_delete(id, key),
        };
        let in_dense_prefix = {
            let obj = self.get_object(id);
            match obj {
                Some(obj) => {
                    let mut b = obj.borrow_mut();
                    match &mut b.exotic {
                        Exotic::Array(storage) => match &mut storage.elems {
                            Some(elems) if (index as usize) < elems.len() => {
                                if index as usize == elems.len() - 1 {
                                    // Dropping the last element keeps the
                                    // prefix dense.
                                    elems.truncate(index as usize);
                                    return true;
                                }
                                true
                            }
                            _ => false,
                        },
                        _ => false,
                    }
                }
                None => return true,
            }
        };
        if in_dense_prefix {
            // A hole in the middle: dictionary mode from here on.
            self.array_to_dictionary(id);
        }
        self.ordinary_delete(id, key)
    }

    pub(crate) fn array_own_keys(&self, id: u64) -> Vec<PropertyKey> {
        let dense_len = self
            .get_object(id)
            .and_then(|obj| {
                let b = obj.borrow();
                match &b.exotic {
                    Exotic::Array(storage) => storage.elems.as_ref().map(|e| e.len()),
                    _ => None,
                }
            })
            .unwrap_or(0);
        // In dense mode the table holds no index keys, so the buckets
        // concatenate cleanly.
        let mut keys: Vec<PropertyKey> = (0..dense_len as u32).map(PropertyKey::index).collect();
        keys.extend(self.ordinary_own_keys(id));
        keys
    }

    /// A new array sharing element storage with `array` until either side
    /// writes. Bounds are clamped to the dense prefix; dictionary-mode
    /// arrays are copied element by element.
    pub fn array_slice(&mut self, array: &JsValue, start: u32, end: u32) -> JsResult {
        let id = self.expect_object(array, "slice")?;
        let (length, _) = self.array_length_parts(id);
        let start = start.min(length);
        let end = end.min(length).max(start);

        let shared = self.get_object(id).and_then(|obj| {
            let b = obj.borrow();
            match &b.exotic {
                Exotic::Array(storage) => storage.elems.as_ref().map(|elems| {
                    let lo = (start as usize).min(elems.len());
                    let hi = (end as usize).min(elems.len());
                    (elems.window(lo, hi - lo), storage.kind)
                }),
                _ => None,
            }
        });

        if let Some((window, kind)) = shared {
            let len = window.len() as u32;
            let mut data = super::JsObjectData::new();
            data.class_name = "Array".to_string();
            data.prototype = self.intrinsics.array_prototype;
            data.exotic = Exotic::Array(ArrayStorage::new(window, kind));
            data.table.insert(
                PropertyKey::string(LENGTH),
                PropertyDescriptor::data(JsValue::Number(len as f64), true, false, false),
            );
            let new_id = self.allocate_raw(data);
            return Ok(JsValue::object(new_id));
        }

        let mut values = Vec::with_capacity((end - start) as usize);
        for i in start..end {
            values.push(self.object_get(id, &PropertyKey::index(i), array)?);
        }
        Ok(self.create_array(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_read_write_and_length() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![JsValue::Number(1.0), JsValue::Number(2.0)]);
        assert_eq!(realm.array_length(&arr), 2);

        let v = realm.get(&arr, &PropertyKey::index(1)).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 2.0));

        // Append extends length.
        assert!(realm
            .set(&arr, &PropertyKey::index(2), JsValue::Number(3.0))
            .unwrap());
        assert_eq!(realm.array_length(&arr), 3);
        assert_eq!(realm.array_elements_kind(&arr), Some(ElementsKind::Int32));
    }

    #[test]
    fn elements_kind_generalizes() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![JsValue::Number(1.0)]);
        assert_eq!(realm.array_elements_kind(&arr), Some(ElementsKind::Int32));
        realm
            .set(&arr, &PropertyKey::index(0), JsValue::Number(1.5))
            .unwrap();
        assert_eq!(realm.array_elements_kind(&arr), Some(ElementsKind::Double));
        realm
            .set(&arr, &PropertyKey::index(0), JsValue::string("x"))
            .unwrap();
        assert_eq!(realm.array_elements_kind(&arr), Some(ElementsKind::Other));
    }

    #[test]
    fn slice_shares_until_write() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![
            JsValue::Number(10.0),
            JsValue::Number(20.0),
            JsValue::Number(30.0),
        ]);
        let sub = realm.array_slice(&arr, 1, 3).unwrap();
        assert_eq!(realm.array_length(&sub), 2);
        let v = realm.get(&sub, &PropertyKey::index(0)).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 20.0));

        // Writing the parent must not show through the slice.
        realm
            .set(&arr, &PropertyKey::index(1), JsValue::Number(99.0))
            .unwrap();
        let v = realm.get(&sub, &PropertyKey::index(0)).unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 20.0));
    }

    #[test]
    fn length_truncation_stops_at_non_configurable() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![
            JsValue::Number(0.0),
            JsValue::Number(1.0),
            JsValue::Number(2.0),
            JsValue::Number(3.0),
        ]);
        // Pin index 2 as non-configurable; forces dictionary mode.
        realm
            .define_property(
                &arr,
                PropertyKey::index(2),
                PropertyDescriptor::data(JsValue::Number(2.0), true, true, false),
            )
            .unwrap();

        let ok = realm
            .define_property(
                &arr,
                PropertyKey::string("length"),
                PropertyDescriptor {
                    value: Some(JsValue::Number(0.0)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!ok);
        // Length lands just above the survivor.
        assert_eq!(realm.array_length(&arr), 3);
        assert!(realm.has(&arr, &PropertyKey::index(2)).unwrap());
        assert!(!realm.has(&arr, &PropertyKey::index(3)).unwrap());
    }

    #[test]
    fn non_writable_length_blocks_growth() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![JsValue::Number(1.0)]);
        realm
            .define_property(
                &arr,
                PropertyKey::string("length"),
                PropertyDescriptor {
                    writable: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        let ok = realm
            .set(&arr, &PropertyKey::index(5), JsValue::Number(9.0))
            .unwrap();
        assert!(!ok);
        assert_eq!(realm.array_length(&arr), 1);
    }

    #[test]
    fn delete_in_middle_goes_sparse() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![
            JsValue::Number(0.0),
            JsValue::Number(1.0),
            JsValue::Number(2.0),
        ]);
        assert!(realm.delete_property(&arr, &PropertyKey::index(1)).unwrap());
        assert_eq!(realm.array_elements_kind(&arr), None);
        assert!(!realm.has(&arr, &PropertyKey::index(1)).unwrap());
        assert!(realm.has(&arr, &PropertyKey::index(2)).unwrap());
        assert_eq!(realm.array_length(&arr), 3);
    }

    #[test]
    fn own_keys_order() {
        let mut realm = Realm::new();
        let arr = realm.create_array(vec![JsValue::Number(0.0), JsValue::Number(1.0)]);
        realm
            .set(&arr, &PropertyKey::string("x"), JsValue::Number(9.0))
            .unwrap();
        let keys = realm.own_keys(&arr).unwrap();
        assert_eq!(
            keys,
            vec![
                PropertyKey::index(0),
                PropertyKey::index(1),
                PropertyKey::string("length"),
                PropertyKey::string("x"),
            ]
        );
    }
}
