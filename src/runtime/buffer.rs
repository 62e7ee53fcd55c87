//! ArrayBuffer and SharedArrayBuffer storage, plus DataView access.
//!
//! Local buffers are single-agent `RefCell` byte vectors; shared buffers
//! put their bytes behind a `parking_lot::Mutex` shared across agents via
//! `Arc`, with the waiter table and condvar for `Atomics.wait` riding
//! alongside. Views hold an `Rc` to the storage and re-validate their
//! bounds on every access, so resizes never chase down dependent views.

use super::{Exotic, JsObjectData, JsResult, Realm, ViewData};
use crate::types::{JsValue, PropertyKey};
use parking_lot::{Condvar, Mutex};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// One registered `Atomics.wait` sleeper.
pub(crate) struct WaiterEntry {
    pub(crate) id: u64,
    pub(crate) addr: usize,
    pub(crate) woken: bool,
}

#[derive(Default)]
pub(crate) struct WaiterTable {
    pub(crate) next_id: u64,
    pub(crate) entries: Vec<WaiterEntry>,
}

/// The cross-agent face of a SharedArrayBuffer. Lock order is always
/// `data` before `waiters`.
pub struct SharedBytes {
    pub(crate) data: Mutex<Vec<u8>>,
    pub(crate) max_byte_length: Option<usize>,
    pub(crate) waiters: Mutex<WaiterTable>,
    pub(crate) condvar: Condvar,
}

impl std::fmt::Debug for SharedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBytes")
            .field("byte_length", &self.data.lock().len())
            .field("max_byte_length", &self.max_byte_length)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum BufferStorage {
    Local {
        bytes: RefCell<Vec<u8>>,
        max_byte_length: Option<usize>,
        detached: Cell<bool>,
    },
    Shared(Arc<SharedBytes>),
}

impl BufferStorage {
    pub(crate) fn byte_length(&self) -> usize {
        match self {
            BufferStorage::Local { bytes, detached, .. } => {
                if detached.get() {
                    0
                } else {
                    bytes.borrow().len()
                }
            }
            BufferStorage::Shared(shared) => shared.data.lock().len(),
        }
    }

    pub(crate) fn max_byte_length(&self) -> Option<usize> {
        match self {
            BufferStorage::Local { max_byte_length, .. } => *max_byte_length,
            BufferStorage::Shared(shared) => shared.max_byte_length,
        }
    }

    pub(crate) fn is_detached(&self) -> bool {
        match self {
            BufferStorage::Local { detached, .. } => detached.get(),
            BufferStorage::Shared(_) => false,
        }
    }

    pub(crate) fn is_shared(&self) -> bool {
        matches!(self, BufferStorage::Shared(_))
    }

    pub(crate) fn shared(&self) -> Option<&Arc<SharedBytes>> {
        match self {
            BufferStorage::Shared(s) => Some(s),
            _ => None,
        }
    }

    /// Copy `len` bytes out; `None` when the range is out of bounds or the
    /// buffer is detached.
    pub(crate) fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        match self {
            BufferStorage::Local { bytes, detached, .. } => {
                if detached.get() {
                    return None;
                }
                let b = bytes.borrow();
                b.get(offset..offset + len).map(|s| s.to_vec())
            }
            BufferStorage::Shared(shared) => {
                let b = shared.data.lock();
                b.get(offset..offset + len).map(|s| s.to_vec())
            }
        }
    }

    pub(crate) fn write(&self, offset: usize, src: &[u8]) -> bool {
        match self {
            BufferStorage::Local { bytes, detached, .. } => {
                if detached.get() {
                    return false;
                }
                let mut b = bytes.borrow_mut();
                match b.get_mut(offset..offset + src.len()) {
                    Some(dst) => {
                        dst.copy_from_slice(src);
                        true
                    }
                    None => false,
                }
            }
            BufferStorage::Shared(shared) => {
                let mut b = shared.data.lock();
                match b.get_mut(offset..offset + src.len()) {
                    Some(dst) => {
                        dst.copy_from_slice(src);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct BufferData {
    pub(crate) storage: Rc<BufferStorage>,
}

impl Realm {
    /// `new ArrayBuffer(byteLength, { maxByteLength })`. A `max_byte_length`
    /// makes the buffer resizable.
    pub fn create_array_buffer(
        &mut self,
        byte_length: usize,
        max_byte_length: Option<usize>,
    ) -> JsResult {
        if let Some(max) = max_byte_length
            && byte_length > max
        {
            return Err(self.create_range_error("byteLength exceeds maxByteLength"));
        }
        let storage = BufferStorage::Local {
            bytes: RefCell::new(vec![0; byte_length]),
            max_byte_length,
            detached: Cell::new(false),
        };
        Ok(self.allocate_buffer_object("ArrayBuffer", self.intrinsics.array_buffer_prototype, storage))
    }

    /// `new SharedArrayBuffer(byteLength, { maxByteLength })`. A growable
    /// shared buffer reserves nothing up front; growth reallocates under
    /// the data lock.
    pub fn create_shared_array_buffer(
        &mut self,
        byte_length: usize,
        max_byte_length: Option<usize>,
    ) -> JsResult {
        if let Some(max) = max_byte_length
            && byte_length > max
        {
            return Err(self.create_range_error("byteLength exceeds maxByteLength"));
        }
        let storage = BufferStorage::Shared(Arc::new(SharedBytes {
            data: Mutex::new(vec![0; byte_length]),
            max_byte_length,
            waiters: Mutex::new(WaiterTable::default()),
            condvar: Condvar::new(),
        }));
        Ok(self.allocate_buffer_object(
            "SharedArrayBuffer",
            self.intrinsics.shared_array_buffer_prototype,
            storage,
        ))
    }

    /// A fresh SharedArrayBuffer object in this realm wrapping storage
    /// already shared with another agent.
    pub fn adopt_shared_bytes(&mut self, shared: Arc<SharedBytes>) -> JsValue {
        self.allocate_buffer_object(
            "SharedArrayBuffer",
            self.intrinsics.shared_array_buffer_prototype,
            BufferStorage::Shared(shared),
        )
    }

    /// The storage handle for shipping to another agent (thread).
    pub fn share_buffer(&mut self, buffer: &JsValue) -> JsResult<Arc<SharedBytes>> {
        let storage = self.buffer_storage_of(buffer)?;
        match storage.shared() {
            Some(s) => Ok(s.clone()),
            None => Err(self.create_type_error("buffer is not shared")),
        }
    }

    fn allocate_buffer_object(
        &mut self,
        class_name: &str,
        prototype: Option<u64>,
        storage: BufferStorage,
    ) -> JsValue {
        let mut data = JsObjectData::new();
        data.class_name = class_name.to_string();
        data.prototype = prototype;
        data.exotic = Exotic::ArrayBuffer(BufferData {
            storage: Rc::new(storage),
        });
        let id = self.allocate_raw(data);
        JsValue::object(id)
    }

    pub(crate) fn buffer_storage(&self, id: u64) -> Option<Rc<BufferStorage>> {
        let obj = self.get_object(id)?;
        let b = obj.borrow();
        match &b.exotic {
            Exotic::ArrayBuffer(data) => Some(data.storage.clone()),
            _ => None,
        }
    }

    pub(crate) fn buffer_storage_of(&mut self, buffer: &JsValue) -> JsResult<Rc<BufferStorage>> {
        let id = self.expect_object(buffer, "buffer operation")?;
        match self.buffer_storage(id) {
            Some(s) => Ok(s),
            None => Err(self.create_type_error("value is not an ArrayBuffer")),
        }
    }

    pub fn buffer_byte_length(&mut self, buffer: &JsValue) -> JsResult<usize> {
        Ok(self.buffer_storage_of(buffer)?.byte_length())
    }

    pub fn buffer_max_byte_length(&mut self, buffer: &JsValue) -> JsResult<Option<usize>> {
        Ok(self.buffer_storage_of(buffer)?.max_byte_length())
    }

    pub fn is_detached(&mut self, buffer: &JsValue) -> JsResult<bool> {
        Ok(self.buffer_storage_of(buffer)?.is_detached())
    }

    /// DetachArrayBuffer. Shared buffers cannot detach. Idempotent.
    pub fn detach_array_buffer(&mut self, buffer: &JsValue) -> JsResult<()> {
        let storage = self.buffer_storage_of(buffer)?;
        match &*storage {
            BufferStorage::Local { bytes, detached, .. } => {
                detached.set(true);
                bytes.borrow_mut().clear();
                Ok(())
            }
            BufferStorage::Shared(_) => {
                Err(self.create_type_error("SharedArrayBuffer cannot be detached"))
            }
        }
    }

    /// `ArrayBuffer.prototype.resize`: in place, both directions, zero
    /// filling on growth. Dependent views are not touched; they re-validate
    /// lazily on their next access.
    pub fn resize_array_buffer(&mut self, buffer: &JsValue, new_byte_length: usize) -> JsResult<()> {
        let storage = self.buffer_storage_of(buffer)?;
        match &*storage {
            BufferStorage::Local {
                bytes,
                max_byte_length,
                detached,
            } => {
                if detached.get() {
                    return Err(self.create_type_error("Cannot resize a detached ArrayBuffer"));
                }
                let max = match max_byte_length {
                    Some(max) => *max,
                    None => {
                        return Err(
                            self.create_type_error("ArrayBuffer is not resizable")
                        );
                    }
                };
                if new_byte_length > max {
                    return Err(
                        self.create_range_error("resize length exceeds maxByteLength")
                    );
                }
                bytes.borrow_mut().resize(new_byte_length, 0);
                Ok(())
            }
            BufferStorage::Shared(_) => {
                Err(self.create_type_error("SharedArrayBuffer.prototype.grow must be used"))
            }
        }
    }

    /// `SharedArrayBuffer.prototype.grow`: monotonic, never shrinks.
    pub fn grow_shared_array_buffer(
        &mut self,
        buffer: &JsValue,
        new_byte_length: usize,
    ) -> JsResult<()> {
        let storage = self.buffer_storage_of(buffer)?;
        match &*storage {
            BufferStorage::Shared(shared) => {
                let max = match shared.max_byte_length {
                    Some(max) => max,
                    None => {
                        return Err(
                            self.create_type_error("SharedArrayBuffer is not growable")
                        );
                    }
                };
                if new_byte_length > max {
                    return Err(self.create_range_error("grow length exceeds maxByteLength"));
                }
                let mut data = shared.data.lock();
                if new_byte_length < data.len() {
                    return Err(
                        self.create_type_error("SharedArrayBuffer can only grow")
                    );
                }
                data.resize(new_byte_length, 0);
                Ok(())
            }
            BufferStorage::Local { .. } => {
                Err(self.create_type_error("ArrayBuffer.prototype.resize must be used"))
            }
        }
    }

    /// `ArrayBuffer.prototype.transfer`: move the bytes into a fresh
    /// buffer and detach the source.
    pub fn transfer_array_buffer(
        &mut self,
        buffer: &JsValue,
        new_byte_length: Option<usize>,
    ) -> JsResult {
        let storage = self.buffer_storage_of(buffer)?;
        let (mut bytes, max) = match &*storage {
            BufferStorage::Local {
                bytes,
                max_byte_length,
                detached,
            } => {
                if detached.get() {
                    return Err(self.create_type_error("Cannot transfer a detached ArrayBuffer"));
                }
                detached.set(true);
                (std::mem::take(&mut *bytes.borrow_mut()), *max_byte_length)
            }
            BufferStorage::Shared(_) => {
                return Err(self.create_type_error("SharedArrayBuffer cannot be transferred"));
            }
        };
        if let Some(len) = new_byte_length {
            bytes.resize(len, 0);
        }
        let new_storage = BufferStorage::Local {
            bytes: RefCell::new(bytes),
            max_byte_length: max,
            detached: Cell::new(false),
        };
        Ok(self.allocate_buffer_object(
            "ArrayBuffer",
            self.intrinsics.array_buffer_prototype,
            new_storage,
        ))
    }

    // ---- DataView -------------------------------------------------------

    /// `new DataView(buffer, byteOffset, byteLength)`. Omitted length makes
    /// the view track the buffer's tail through resizes.
    pub fn create_data_view(
        &mut self,
        buffer: &JsValue,
        byte_offset: usize,
        byte_length: Option<usize>,
    ) -> JsResult {
        let buffer_id = self.expect_object(buffer, "DataView")?;
        let storage = match self.buffer_storage(buffer_id) {
            Some(s) => s,
            None => return Err(self.create_type_error("first argument must be an ArrayBuffer")),
        };
        if storage.is_detached() {
            return Err(self.create_type_error("Cannot construct a DataView on a detached buffer"));
        }
        let buffer_len = storage.byte_length();
        if byte_offset > buffer_len {
            return Err(self.create_range_error("byteOffset is outside the buffer"));
        }
        if let Some(len) = byte_length
            && byte_offset + len > buffer_len
        {
            return Err(self.create_range_error("byteLength is outside the buffer"));
        }
        let mut data = JsObjectData::new();
        data.class_name = "DataView".to_string();
        data.prototype = self.intrinsics.data_view_prototype;
        data.exotic = Exotic::DataView(ViewData::for_data_view(
            storage,
            buffer_id,
            byte_offset,
            byte_length,
        ));
        let id = self.allocate_raw(data);
        Ok(JsValue::object(id))
    }

    pub(crate) fn data_view_data(&mut self, view: &JsValue) -> JsResult<ViewData> {
        let id = self.expect_object(view, "DataView operation")?;
        let obj = self.get_object(id);
        let data = obj.and_then(|obj| {
            let b = obj.borrow();
            match &b.exotic {
                Exotic::DataView(v) => Some(v.clone()),
                _ => None,
            }
        });
        match data {
            Some(v) => Ok(v),
            None => Err(self.create_type_error("value is not a DataView")),
        }
    }

    /// DataView byte length under the current buffer size, `None` when the
    /// view no longer fits.
    pub fn data_view_byte_length(&mut self, view: &JsValue) -> JsResult<Option<usize>> {
        let data = self.data_view_data(view)?;
        Ok(data.byte_bounds().map(|(_, len)| len))
    }

    /// `DataView.prototype.get*`: explicit byte order, never platform
    /// defaulted.
    pub fn data_view_get(
        &mut self,
        view: &JsValue,
        kind: super::TypedArrayKind,
        byte_offset: usize,
        order: ByteOrder,
    ) -> JsResult {
        let data = self.data_view_data(view)?;
        if data.buffer.is_detached() {
            return Err(self.create_type_error("Cannot perform get on a detached ArrayBuffer"));
        }
        let (view_start, view_len) = match data.byte_bounds() {
            Some(b) => b,
            None => {
                return Err(self.create_range_error("DataView is outside the bounds of its buffer"));
            }
        };
        let size = kind.bytes_per_element();
        if byte_offset + size > view_len {
            return Err(self.create_range_error("offset is outside the bounds of the DataView"));
        }
        let bytes = match data.buffer.read(view_start + byte_offset, size) {
            Some(b) => b,
            None => {
                return Err(self.create_range_error("offset is outside the bounds of the DataView"));
            }
        };
        Ok(super::typed_array::raw_bytes_to_value(kind, &bytes, order))
    }

    /// `DataView.prototype.set*`. The value is coerced before the bounds
    /// check so user coercion hooks observe one consistent ordering.
    pub fn data_view_set(
        &mut self,
        view: &JsValue,
        kind: super::TypedArrayKind,
        byte_offset: usize,
        value: &JsValue,
        order: ByteOrder,
    ) -> JsResult<()> {
        let data = self.data_view_data(view)?;
        let bytes = super::typed_array::value_to_raw_bytes(self, kind, value, order)?;
        if data.buffer.is_detached() {
            return Err(self.create_type_error("Cannot perform set on a detached ArrayBuffer"));
        }
        let (view_start, view_len) = match data.byte_bounds() {
            Some(b) => b,
            None => {
                return Err(self.create_range_error("DataView is outside the bounds of its buffer"));
            }
        };
        if byte_offset + bytes.len() > view_len
            || !data.buffer.write(view_start + byte_offset, &bytes)
        {
            return Err(self.create_range_error("offset is outside the bounds of the DataView"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TypedArrayKind;

    #[test]
    fn resizable_buffer_round_trip() {
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(8, Some(16)).unwrap();
        assert_eq!(realm.buffer_byte_length(&buf).unwrap(), 8);

        realm.resize_array_buffer(&buf, 16).unwrap();
        assert_eq!(realm.buffer_byte_length(&buf).unwrap(), 16);
        realm.resize_array_buffer(&buf, 4).unwrap();
        assert_eq!(realm.buffer_byte_length(&buf).unwrap(), 4);

        let err = realm.resize_array_buffer(&buf, 32).unwrap_err();
        assert!(realm.format_error(&err).starts_with("RangeError"));
    }

    #[test]
    fn fixed_buffer_refuses_resize() {
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(8, None).unwrap();
        assert!(realm.resize_array_buffer(&buf, 4).is_err());
    }

    #[test]
    fn detach_zeroes_length_and_blocks_views() {
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(8, None).unwrap();
        let view = realm.create_data_view(&buf, 0, Some(8)).unwrap();

        realm.detach_array_buffer(&buf).unwrap();
        assert!(realm.is_detached(&buf).unwrap());
        assert_eq!(realm.buffer_byte_length(&buf).unwrap(), 0);
        let err = realm
            .data_view_get(&view, TypedArrayKind::Uint8, 0, ByteOrder::LittleEndian)
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("TypeError"));
    }

    #[test]
    fn data_view_endianness() {
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(4, None).unwrap();
        let view = realm.create_data_view(&buf, 0, None).unwrap();

        realm
            .data_view_set(
                &view,
                TypedArrayKind::Uint16,
                0,
                &JsValue::Number(0x1234 as f64),
                ByteOrder::BigEndian,
            )
            .unwrap();
        let le = realm
            .data_view_get(&view, TypedArrayKind::Uint16, 0, ByteOrder::LittleEndian)
            .unwrap();
        assert!(matches!(le, JsValue::Number(n) if n == 0x3412 as f64));
    }

    #[test]
    fn length_tracking_data_view_follows_resize() {
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(8, Some(16)).unwrap();
        let view = realm.create_data_view(&buf, 4, None).unwrap();
        assert_eq!(realm.data_view_byte_length(&view).unwrap(), Some(4));

        realm.resize_array_buffer(&buf, 16).unwrap();
        assert_eq!(realm.data_view_byte_length(&view).unwrap(), Some(12));

        // Shrink below the offset: the view is out of bounds, not an error
        // until accessed.
        realm.resize_array_buffer(&buf, 2).unwrap();
        assert_eq!(realm.data_view_byte_length(&view).unwrap(), None);
        let err = realm
            .data_view_get(&view, TypedArrayKind::Uint8, 0, ByteOrder::LittleEndian)
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("RangeError"));

        // Growing back restores visibility without reallocation.
        realm.resize_array_buffer(&buf, 8).unwrap();
        assert_eq!(realm.data_view_byte_length(&view).unwrap(), Some(4));
    }

    #[test]
    fn transfer_moves_and_detaches() {
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(4, None).unwrap();
        let view = realm.create_data_view(&buf, 0, None).unwrap();
        realm
            .data_view_set(
                &view,
                TypedArrayKind::Uint8,
                0,
                &JsValue::Number(7.0),
                ByteOrder::LittleEndian,
            )
            .unwrap();

        let moved = realm.transfer_array_buffer(&buf, Some(8)).unwrap();
        assert!(realm.is_detached(&buf).unwrap());
        assert_eq!(realm.buffer_byte_length(&moved).unwrap(), 8);
        let moved_view = realm.create_data_view(&moved, 0, None).unwrap();
        let v = realm
            .data_view_get(&moved_view, TypedArrayKind::Uint8, 0, ByteOrder::LittleEndian)
            .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 7.0));
    }

    #[test]
    fn shared_buffer_grows_only() {
        let mut realm = Realm::new();
        let buf = realm.create_shared_array_buffer(4, Some(8)).unwrap();
        realm.grow_shared_array_buffer(&buf, 8).unwrap();
        assert_eq!(realm.buffer_byte_length(&buf).unwrap(), 8);
        assert!(realm.grow_shared_array_buffer(&buf, 4).is_err());
        assert!(realm.detach_array_buffer(&buf).is_err());
    }
}
