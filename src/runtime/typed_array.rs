//! Integer-indexed (typed array) exotic objects.
//!
//! A view never caches its bounds: every access recomputes them against the
//! buffer's current byte length, so resizing the underlying buffer makes
//! views go out of bounds and come back without any registry of dependents.

use super::buffer::{BufferStorage, ByteOrder};
use super::{Exotic, JsObjectData, JsResult, PropertyDescriptor, Realm};
use crate::types::{JsBigInt, JsValue, PropertyKey, number_ops};
use num_bigint::{BigInt, Sign};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayKind {
    pub fn bytes_per_element(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }

    pub fn is_bigint(self) -> bool {
        matches!(self, TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64)
    }

    /// The integer kinds `Atomics` operations accept.
    pub(crate) fn is_integer(self) -> bool {
        !matches!(self, TypedArrayKind::Float32 | TypedArrayKind::Float64)
            && self != TypedArrayKind::Uint8Clamped
    }

    pub fn name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::BigInt64 => "BigInt64Array",
            TypedArrayKind::BigUint64 => "BigUint64Array",
        }
    }
}

/// Shared shape for typed arrays and DataViews. `length` counts elements
/// for a typed array and bytes for a DataView; `None` means the view
/// tracks the buffer's tail.
#[derive(Debug, Clone)]
pub(crate) struct ViewData {
    pub(crate) buffer: Rc<BufferStorage>,
    pub(crate) buffer_id: u64,
    pub(crate) kind: TypedArrayKind,
    pub(crate) byte_offset: usize,
    pub(crate) length: Option<usize>,
}

impl ViewData {
    pub(crate) fn for_data_view(
        buffer: Rc<BufferStorage>,
        buffer_id: u64,
        byte_offset: usize,
        byte_length: Option<usize>,
    ) -> Self {
        Self {
            buffer,
            buffer_id,
            kind: TypedArrayKind::Uint8,
            byte_offset,
            length: byte_length,
        }
    }

    /// DataView bounds: (absolute byte start, byte length), `None` when the
    /// view does not fit the buffer's current size.
    pub(crate) fn byte_bounds(&self) -> Option<(usize, usize)> {
        if self.buffer.is_detached() {
            return None;
        }
        let buffer_len = self.buffer.byte_length();
        if self.byte_offset > buffer_len {
            return None;
        }
        match self.length {
            Some(len) if self.byte_offset + len <= buffer_len => Some((self.byte_offset, len)),
            Some(_) => None,
            None => Some((self.byte_offset, buffer_len - self.byte_offset)),
        }
    }

    /// Typed-array bounds: (absolute byte start, element count).
    pub(crate) fn element_bounds(&self) -> Option<(usize, usize)> {
        if self.buffer.is_detached() {
            return None;
        }
        let size = self.kind.bytes_per_element();
        let buffer_len = self.buffer.byte_length();
        if self.byte_offset > buffer_len {
            return None;
        }
        match self.length {
            Some(count) if self.byte_offset + count * size <= buffer_len => {
                Some((self.byte_offset, count))
            }
            Some(_) => None,
            None => Some((self.byte_offset, (buffer_len - self.byte_offset) / size)),
        }
    }
}

// ---- raw element codec -----------------------------------------------

fn bigint_to_u64_wrapping(v: &BigInt) -> u64 {
    let (sign, digits) = v.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    if sign == Sign::Minus { low.wrapping_neg() } else { low }
}

fn clamp_to_uint8(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let floor = n.floor();
    let frac = n - floor;
    // Ties round to even.
    if frac < 0.5 {
        floor as u8
    } else if frac > 0.5 {
        floor as u8 + 1
    } else if (floor as u8) % 2 == 0 {
        floor as u8
    } else {
        floor as u8 + 1
    }
}

pub(crate) fn number_to_raw_bytes(kind: TypedArrayKind, n: f64, order: ByteOrder) -> Vec<u8> {
    let le = order == ByteOrder::LittleEndian;
    macro_rules! bytes {
        ($v:expr) => {
            if le {
                $v.to_le_bytes().to_vec()
            } else {
                $v.to_be_bytes().to_vec()
            }
        };
    }
    match kind {
        TypedArrayKind::Int8 => bytes!(number_ops::to_int32(n) as i8),
        TypedArrayKind::Uint8 => bytes!(number_ops::to_uint32(n) as u8),
        TypedArrayKind::Uint8Clamped => bytes!(clamp_to_uint8(n)),
        TypedArrayKind::Int16 => bytes!(number_ops::to_int32(n) as i16),
        TypedArrayKind::Uint16 => bytes!(number_ops::to_uint32(n) as u16),
        TypedArrayKind::Int32 => bytes!(number_ops::to_int32(n)),
        TypedArrayKind::Uint32 => bytes!(number_ops::to_uint32(n)),
        TypedArrayKind::Float32 => bytes!(n as f32),
        TypedArrayKind::Float64 => bytes!(n),
        TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => unreachable!(),
    }
}

pub(crate) fn bigint_to_raw_bytes(kind: TypedArrayKind, v: &BigInt, order: ByteOrder) -> Vec<u8> {
    let wrapped = bigint_to_u64_wrapping(v);
    let le = order == ByteOrder::LittleEndian;
    match kind {
        TypedArrayKind::BigInt64 => {
            let v = wrapped as i64;
            if le { v.to_le_bytes().to_vec() } else { v.to_be_bytes().to_vec() }
        }
        TypedArrayKind::BigUint64 => {
            if le {
                wrapped.to_le_bytes().to_vec()
            } else {
                wrapped.to_be_bytes().to_vec()
            }
        }
        _ => unreachable!(),
    }
}

/// Coerce a language value to the raw bytes of one element. Runs arbitrary
/// user code through `valueOf`, so callers must re-validate bounds after.
pub(crate) fn value_to_raw_bytes(
    realm: &mut Realm,
    kind: TypedArrayKind,
    value: &JsValue,
    order: ByteOrder,
) -> JsResult<Vec<u8>> {
    if kind.is_bigint() {
        let v = realm.to_bigint(value)?;
        Ok(bigint_to_raw_bytes(kind, &v, order))
    } else {
        let n = realm.to_number(value)?;
        Ok(number_to_raw_bytes(kind, n, order))
    }
}

pub(crate) fn raw_bytes_to_value(kind: TypedArrayKind, bytes: &[u8], order: ByteOrder) -> JsValue {
    let le = order == ByteOrder::LittleEndian;
    macro_rules! read {
        ($ty:ty) => {{
            let mut buf = [0u8; size_of::<$ty>()];
            buf.copy_from_slice(bytes);
            if le {
                <$ty>::from_le_bytes(buf)
            } else {
                <$ty>::from_be_bytes(buf)
            }
        }};
    }
    match kind {
        TypedArrayKind::Int8 => JsValue::Number(read!(i8) as f64),
        TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => JsValue::Number(read!(u8) as f64),
        TypedArrayKind::Int16 => JsValue::Number(read!(i16) as f64),
        TypedArrayKind::Uint16 => JsValue::Number(read!(u16) as f64),
        TypedArrayKind::Int32 => JsValue::Number(read!(i32) as f64),
        TypedArrayKind::Uint32 => JsValue::Number(read!(u32) as f64),
        TypedArrayKind::Float32 => JsValue::Number(read!(f32) as f64),
        TypedArrayKind::Float64 => JsValue::Number(read!(f64)),
        TypedArrayKind::BigInt64 => JsValue::BigInt(JsBigInt {
            value: BigInt::from(read!(i64)),
        }),
        TypedArrayKind::BigUint64 => JsValue::BigInt(JsBigInt {
            value: BigInt::from(read!(u64)),
        }),
    }
}

/// Element order inside a typed array is always the platform's natural
/// one; the explicit-endianness path is DataView's alone.
pub(crate) const NATIVE: ByteOrder = if cfg!(target_endian = "big") {
    ByteOrder::BigEndian
} else {
    ByteOrder::LittleEndian
};

// A canonical numeric string that is not an array index ("-0", "1.5",
// "NaN") still addresses an element slot and always misses.
fn canonical_numeric_miss(key: &PropertyKey) -> bool {
    let PropertyKey::String(s) = key else {
        return false;
    };
    let text = s.to_rust_string();
    if text == "-0" || text == "NaN" || text == "Infinity" || text == "-Infinity" {
        return true;
    }
    match text.parse::<f64>() {
        Ok(n) => format!("{n}") == text,
        Err(_) => false,
    }
}

impl Realm {
    /// `new Int32Array(buffer, byteOffset, length)` and friends. An
    /// omitted length over a resizable buffer yields a length-tracking
    /// view.
    pub fn create_typed_array(
        &mut self,
        kind: TypedArrayKind,
        buffer: &JsValue,
        byte_offset: usize,
        length: Option<usize>,
    ) -> JsResult {
        let buffer_id = self.expect_object(buffer, kind.name())?;
        let storage = match self.buffer_storage(buffer_id) {
            Some(s) => s,
            None => return Err(self.create_type_error("first argument must be an ArrayBuffer")),
        };
        let size = kind.bytes_per_element();
        if byte_offset % size != 0 {
            return Err(self.create_range_error(&format!(
                "start offset of {} should be a multiple of {size}",
                kind.name()
            )));
        }
        if storage.is_detached() {
            return Err(
                self.create_type_error("Cannot construct a typed array on a detached buffer")
            );
        }
        let buffer_len = storage.byte_length();
        let length = match length {
            Some(count) => {
                if byte_offset + count * size > buffer_len {
                    return Err(
                        self.create_range_error("typed array length exceeds the buffer")
                    );
                }
                Some(count)
            }
            None if storage.max_byte_length().is_some() => None,
            None => {
                if byte_offset > buffer_len || (buffer_len - byte_offset) % size != 0 {
                    return Err(self.create_range_error(&format!(
                        "buffer length for {} should be a multiple of {size}",
                        kind.name()
                    )));
                }
                Some((buffer_len - byte_offset) / size)
            }
        };
        let mut data = JsObjectData::new();
        data.class_name = kind.name().to_string();
        data.prototype = self.intrinsics.typed_array_prototype;
        data.exotic = Exotic::TypedArray(ViewData {
            buffer: storage,
            buffer_id,
            kind,
            byte_offset,
            length,
        });
        let id = self.allocate_raw(data);
        Ok(JsValue::object(id))
    }

    /// `new Int32Array(length)`: a fresh fixed buffer of the right size.
    pub fn create_typed_array_with_length(
        &mut self,
        kind: TypedArrayKind,
        length: usize,
    ) -> JsResult {
        let buffer = self.create_array_buffer(length * kind.bytes_per_element(), None)?;
        self.create_typed_array(kind, &buffer, 0, Some(length))
    }

    pub(crate) fn typed_array_view(&self, id: u64) -> Option<ViewData> {
        let obj = self.get_object(id)?;
        let b = obj.borrow();
        match &b.exotic {
            Exotic::TypedArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn typed_array_view_of(&mut self, ta: &JsValue) -> JsResult<ViewData> {
        let id = self.expect_object(ta, "typed array operation")?;
        match self.typed_array_view(id) {
            Some(v) => Ok(v),
            None => Err(self.create_type_error("value is not a typed array")),
        }
    }

    /// Current element count; 0 while the view is out of bounds or its
    /// buffer is detached.
    pub fn typed_array_length(&mut self, ta: &JsValue) -> JsResult<usize> {
        let view = self.typed_array_view_of(ta)?;
        Ok(view.element_bounds().map(|(_, count)| count).unwrap_or(0))
    }

    pub fn typed_array_kind(&mut self, ta: &JsValue) -> JsResult<TypedArrayKind> {
        Ok(self.typed_array_view_of(ta)?.kind)
    }

    pub fn typed_array_byte_offset(&mut self, ta: &JsValue) -> JsResult<usize> {
        Ok(self.typed_array_view_of(ta)?.byte_offset)
    }

    /// Whether the view currently fits its buffer.
    pub fn typed_array_in_bounds(&mut self, ta: &JsValue) -> JsResult<bool> {
        Ok(self.typed_array_view_of(ta)?.element_bounds().is_some())
    }

    pub(crate) fn typed_array_visible_length(&self, id: u64) -> usize {
        self.typed_array_view(id)
            .and_then(|v| v.element_bounds())
            .map(|(_, count)| count)
            .unwrap_or(0)
    }

    fn element_read(view: &ViewData, index: usize) -> Option<JsValue> {
        let (start, count) = view.element_bounds()?;
        if index >= count {
            return None;
        }
        let size = view.kind.bytes_per_element();
        let bytes = view.buffer.read(start + index * size, size)?;
        Some(raw_bytes_to_value(view.kind, &bytes, NATIVE))
    }

    /// Write pre-coerced raw bytes; silently drops the write when the slot
    /// is gone.
    fn element_write_raw(view: &ViewData, index: usize, bytes: &[u8]) {
        if let Some((start, count)) = view.element_bounds()
            && index < count
        {
            let size = view.kind.bytes_per_element();
            view.buffer.write(start + index * size, bytes);
        }
    }

    // ---- internal methods ----------------------------------------------

    pub(crate) fn typed_array_get(
        &mut self,
        id: u64,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> JsResult {
        if let Some(view) = self.typed_array_view(id) {
            if let Some(index) = key.as_index() {
                return Ok(
                    Self::element_read(&view, index as usize).unwrap_or(JsValue::Undefined)
                );
            }
            if canonical_numeric_miss(key) {
                return Ok(JsValue::Undefined);
            }
        }
        self.ordinary_get(id, key, receiver)
    }

    // §10.4.5.5: the value is coerced before the index is checked, so a
    // coercion hook that resizes the buffer leads to a dropped write, not
    // an error and not memory corruption.
    pub(crate) fn typed_array_set(
        &mut self,
        id: u64,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        if let Some(view) = self.typed_array_view(id) {
            if let Some(index) = key.as_index() {
                if receiver.object_id() != Some(id) {
                    return self.ordinary_set(id, key, value, receiver);
                }
                let bytes = value_to_raw_bytes(self, view.kind, &value, NATIVE)?;
                Self::element_write_raw(&view, index as usize, &bytes);
                return Ok(true);
            }
            if canonical_numeric_miss(key) {
                return Ok(true);
            }
        }
        self.ordinary_set(id, key, value, receiver)
    }

    pub(crate) fn typed_array_get_own_property(
        &self,
        id: u64,
        key: &PropertyKey,
    ) -> Option<PropertyDescriptor> {
        if let Some(view) = self.typed_array_view(id) {
            if let Some(index) = key.as_index() {
                return Self::element_read(&view, index as usize)
                    .map(|v| PropertyDescriptor::data(v, true, true, true));
            }
            if canonical_numeric_miss(key) {
                return None;
            }
        }
        self.ordinary_get_own_property(id, key)
    }

    pub(crate) fn typed_array_define_own_property(
        &mut self,
        id: u64,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<bool> {
        let view = match self.typed_array_view(id) {
            Some(v) => v,
            None => return Ok(false),
        };
        if let Some(index) = key.as_index() {
            let in_bounds = view
                .element_bounds()
                .is_some_and(|(_, count)| (index as usize) < count);
            if !in_bounds {
                return Ok(false);
            }
            if desc.is_accessor_descriptor()
                || desc.configurable == Some(false)
                || desc.enumerable == Some(false)
                || desc.writable == Some(false)
            {
                return Ok(false);
            }
            if let Some(value) = &desc.value {
                let bytes = value_to_raw_bytes(self, view.kind, value, NATIVE)?;
                Self::element_write_raw(&view, index as usize, &bytes);
            }
            return Ok(true);
        }
        if canonical_numeric_miss(&key) {
            return Ok(false);
        }
        Ok(self.ordinary_define_own_property(id, key, desc))
    }

    pub(crate) fn typed_array_delete(&mut self, id: u64, key: &PropertyKey) -> bool {
        if let Some(view) = self.typed_array_view(id) {
            if let Some(index) = key.as_index() {
                let in_bounds = view
                    .element_bounds()
                    .is_some_and(|(_, count)| (index as usize) < count);
                return !in_bounds;
            }
            if canonical_numeric_miss(key) {
                return true;
            }
        }
        self.ordinary_delete(id, key)
    }

    pub(crate) fn typed_array_own_keys(&self, id: u64) -> Vec<PropertyKey> {
        let count = self.typed_array_visible_length(id) as u32;
        let mut keys: Vec<PropertyKey> = (0..count).map(PropertyKey::index).collect();
        keys.extend(self.ordinary_own_keys(id));
        keys
    }

    // ---- prototype-level operations ------------------------------------

    /// `%TypedArray%.prototype.set(arrayLike, offset)`. The length check
    /// happens once up front; after that each element is coerced in order
    /// and writes that no longer fit are dropped while coercion continues.
    pub fn typed_array_set_from_array_like(
        &mut self,
        ta: &JsValue,
        source: &JsValue,
        offset: usize,
    ) -> JsResult<()> {
        let view = self.typed_array_view_of(ta)?;
        let target_len = view.element_bounds().map(|(_, c)| c).unwrap_or(0);

        let source_id = self.expect_object(source, "set source")?;
        let len_val = self.object_get(source_id, &PropertyKey::string("length"), source)?;
        let source_len = self.to_index(&len_val)?;

        if offset + source_len > target_len {
            return Err(self.create_range_error("offset is out of bounds"));
        }
        for k in 0..source_len {
            let element = self.object_get(source_id, &PropertyKey::index(k as u32), source)?;
            // Coercion may run user code that resizes or detaches the
            // buffer; the write below re-validates and drops silently.
            let bytes = value_to_raw_bytes(self, view.kind, &element, NATIVE)?;
            Self::element_write_raw(&view, offset + k, &bytes);
        }
        Ok(())
    }

    /// `%TypedArray%.prototype.fill(value, start, end)`.
    pub fn typed_array_fill(
        &mut self,
        ta: &JsValue,
        value: &JsValue,
        start: isize,
        end: Option<isize>,
    ) -> JsResult<()> {
        let view = self.typed_array_view_of(ta)?;
        let bytes = value_to_raw_bytes(self, view.kind, value, NATIVE)?;
        // Revalidate after coercion; a vanished view is an error here.
        let (_, len) = match view.element_bounds() {
            Some(b) => b,
            None => {
                return Err(
                    self.create_type_error("typed array is out of bounds of its buffer")
                );
            }
        };
        let from = clamp_relative(start, len);
        let to = end.map(|e| clamp_relative(e, len)).unwrap_or(len);
        for index in from..to {
            Self::element_write_raw(&view, index, &bytes);
        }
        Ok(())
    }

    /// `%TypedArray%.prototype.copyWithin(target, start, end)`.
    pub fn typed_array_copy_within(
        &mut self,
        ta: &JsValue,
        target: isize,
        start: isize,
        end: Option<isize>,
    ) -> JsResult<()> {
        let view = self.typed_array_view_of(ta)?;
        let (byte_start, len) = match view.element_bounds() {
            Some(b) => b,
            None => {
                return Err(
                    self.create_type_error("typed array is out of bounds of its buffer")
                );
            }
        };
        let size = view.kind.bytes_per_element();
        let to = clamp_relative(target, len);
        let from = clamp_relative(start, len);
        let until = end.map(|e| clamp_relative(e, len)).unwrap_or(len);
        let count = until.saturating_sub(from).min(len - to);
        if count == 0 {
            return Ok(());
        }
        if let Some(chunk) = view.buffer.read(byte_start + from * size, count * size) {
            view.buffer.write(byte_start + to * size, &chunk);
        }
        Ok(())
    }

    /// `%TypedArray%.prototype.subarray`: a new view over the same buffer.
    /// Length-tracking views with an open end stay length-tracking.
    pub fn typed_array_subarray(
        &mut self,
        ta: &JsValue,
        begin: isize,
        end: Option<isize>,
    ) -> JsResult {
        let view = self.typed_array_view_of(ta)?;
        let len = view.element_bounds().map(|(_, c)| c).unwrap_or(0);
        let size = view.kind.bytes_per_element();
        let from = clamp_relative(begin, len);
        let byte_offset = view.byte_offset + from * size;
        let buffer = JsValue::object(view.buffer_id);
        match (end, view.length) {
            (None, None) => self.create_typed_array(view.kind, &buffer, byte_offset, None),
            _ => {
                let until = end.map(|e| clamp_relative(e, len)).unwrap_or(len);
                let count = until.saturating_sub(from);
                self.create_typed_array(view.kind, &buffer, byte_offset, Some(count))
            }
        }
    }

    /// `%TypedArray%.prototype.slice`: a copy into a fresh buffer.
    pub fn typed_array_slice(
        &mut self,
        ta: &JsValue,
        start: isize,
        end: Option<isize>,
    ) -> JsResult {
        let view = self.typed_array_view_of(ta)?;
        let (byte_start, len) = match view.element_bounds() {
            Some(b) => b,
            None => {
                return Err(
                    self.create_type_error("typed array is out of bounds of its buffer")
                );
            }
        };
        let size = view.kind.bytes_per_element();
        let from = clamp_relative(start, len);
        let until = end.map(|e| clamp_relative(e, len)).unwrap_or(len);
        let count = until.saturating_sub(from);
        let result = self.create_typed_array_with_length(view.kind, count)?;
        if count > 0 {
            let result_view = self.typed_array_view_of(&result)?;
            if let Some(chunk) = view.buffer.read(byte_start + from * size, count * size) {
                result_view.buffer.write(result_view.byte_offset, &chunk);
            }
        }
        Ok(result)
    }
}

/// Relative index semantics shared by fill, copyWithin, subarray, slice:
/// negatives count back from the end, then clamp to [0, len].
fn clamp_relative(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}
