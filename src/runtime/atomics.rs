//! Atomics: sequentially consistent read-modify-write over integer typed
//! arrays, plus wait/notify on shared buffers.
//!
//! Atomicity comes from the shared buffer's data mutex; an RMW holds it
//! across the read-compute-write. The waiter table and condvar live next
//! to the bytes in `SharedBytes`, so agents on different threads rendezvous
//! through the same storage they are waiting on. Lock order is always data
//! before waiters, which is what makes the sleep race-free: a waiter
//! registers while still holding the data lock, so no store-then-notify can
//! slip between its value check and its registration.

use super::buffer::{SharedBytes, WaiterEntry};
use super::typed_array::{self, NATIVE, ViewData};
use super::{JsResult, Realm, TypedArrayKind};
use crate::types::JsValue;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Ok,
    NotEqual,
    TimedOut,
}

impl WaitOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitOutcome::Ok => "ok",
            WaitOutcome::NotEqual => "not-equal",
            WaitOutcome::TimedOut => "timed-out",
        }
    }
}

/// A registered `Atomics.waitAsync` sleeper, settled from `run_jobs`.
pub(crate) struct PendingWait {
    pub(crate) shared: Arc<SharedBytes>,
    pub(crate) waiter_id: u64,
    pub(crate) deadline: Option<Instant>,
    pub(crate) callback: JsValue,
}

// Sign-aware integer view of one element, wide enough for every kind.
fn load_int(kind: TypedArrayKind, bytes: &[u8]) -> i128 {
    match typed_array::raw_bytes_to_value(kind, bytes, NATIVE) {
        JsValue::Number(n) => n as i128,
        JsValue::BigInt(b) => {
            let (sign, digits) = b.value.to_u64_digits();
            let low = digits.first().copied().unwrap_or(0);
            if sign == num_bigint::Sign::Minus {
                -(low as i128)
            } else {
                low as i128
            }
        }
        _ => 0,
    }
}

fn store_int(kind: TypedArrayKind, value: i128) -> Vec<u8> {
    let truncated = value as u64;
    match kind.bytes_per_element() {
        1 => vec![truncated as u8],
        2 => (truncated as u16).to_ne_bytes().to_vec(),
        4 => (truncated as u32).to_ne_bytes().to_vec(),
        _ => truncated.to_ne_bytes().to_vec(),
    }
}

impl Realm {
    fn validate_integer_typed_array(
        &mut self,
        ta: &JsValue,
        waitable_only: bool,
    ) -> JsResult<ViewData> {
        let id = self.expect_object(ta, "Atomics operation")?;
        let view = match self.typed_array_view(id) {
            Some(v) => v,
            None => return Err(self.create_type_error("value is not a typed array")),
        };
        if waitable_only {
            if !matches!(view.kind, TypedArrayKind::Int32 | TypedArrayKind::BigInt64) {
                return Err(self.create_type_error(
                    "typed array must be an Int32Array or BigInt64Array",
                ));
            }
            if !view.buffer.is_shared() {
                return Err(
                    self.create_type_error("typed array must be backed by a SharedArrayBuffer")
                );
            }
        } else if !view.kind.is_integer() {
            return Err(self.create_type_error("invalid typed array type for this operation"));
        }
        Ok(view)
    }

    fn waitable_shared(&mut self, view: &ViewData) -> JsResult<Arc<SharedBytes>> {
        match view.buffer.shared() {
            Some(s) => Ok(s.clone()),
            None => Err(
                self.create_type_error("typed array must be backed by a SharedArrayBuffer")
            ),
        }
    }

    /// Bounds check after all coercions have run. Detachment is a
    /// TypeError, a bad index a RangeError.
    fn atomic_byte_address(&mut self, view: &ViewData, index: usize) -> JsResult<usize> {
        if view.buffer.is_detached() {
            return Err(
                self.create_type_error("Cannot perform Atomics operation on a detached buffer")
            );
        }
        let (start, count) = match view.element_bounds() {
            Some(b) => b,
            None => {
                return Err(
                    self.create_type_error("typed array is out of bounds of its buffer")
                );
            }
        };
        if index >= count {
            return Err(self.create_range_error("index out of range"));
        }
        Ok(start + index * view.kind.bytes_per_element())
    }

    /// One sequentially consistent read-compute-write. For shared storage
    /// the data mutex is held across the whole step.
    fn atomic_rmw(
        &mut self,
        ta: &JsValue,
        index: &JsValue,
        value: &JsValue,
        op: impl Fn(i128, i128) -> i128,
    ) -> JsResult {
        let view = self.validate_integer_typed_array(ta, false)?;
        // Coercions may run user code; the address is validated afterward.
        let operand_bytes = typed_array::value_to_raw_bytes(self, view.kind, value, NATIVE)?;
        let operand = load_int(view.kind, &operand_bytes);
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        let size = view.kind.bytes_per_element();

        let old_bytes = if let Some(shared) = view.buffer.shared() {
            let mut data = shared.data.lock();
            let old = data[addr..addr + size].to_vec();
            let new_bytes = store_int(view.kind, op(load_int(view.kind, &old), operand));
            data[addr..addr + size].copy_from_slice(&new_bytes);
            old
        } else {
            let old = view.buffer.read(addr, size).unwrap_or_else(|| vec![0; size]);
            let new_bytes = store_int(view.kind, op(load_int(view.kind, &old), operand));
            view.buffer.write(addr, &new_bytes);
            old
        };
        Ok(typed_array::raw_bytes_to_value(view.kind, &old_bytes, NATIVE))
    }

    pub fn atomics_add(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        self.atomic_rmw(ta, index, value, |a, b| a.wrapping_add(b))
    }

    pub fn atomics_sub(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        self.atomic_rmw(ta, index, value, |a, b| a.wrapping_sub(b))
    }

    pub fn atomics_and(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        self.atomic_rmw(ta, index, value, |a, b| a & b)
    }

    pub fn atomics_or(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        self.atomic_rmw(ta, index, value, |a, b| a | b)
    }

    pub fn atomics_xor(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        self.atomic_rmw(ta, index, value, |a, b| a ^ b)
    }

    pub fn atomics_exchange(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        self.atomic_rmw(ta, index, value, |_, b| b)
    }

    pub fn atomics_load(&mut self, ta: &JsValue, index: &JsValue) -> JsResult {
        let view = self.validate_integer_typed_array(ta, false)?;
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        let size = view.kind.bytes_per_element();
        let bytes = if let Some(shared) = view.buffer.shared() {
            let data = shared.data.lock();
            data[addr..addr + size].to_vec()
        } else {
            view.buffer.read(addr, size).unwrap_or_else(|| vec![0; size])
        };
        Ok(typed_array::raw_bytes_to_value(view.kind, &bytes, NATIVE))
    }

    /// Returns the coerced stored value, as `Atomics.store` does.
    pub fn atomics_store(&mut self, ta: &JsValue, index: &JsValue, value: &JsValue) -> JsResult {
        let view = self.validate_integer_typed_array(ta, false)?;
        let bytes = typed_array::value_to_raw_bytes(self, view.kind, value, NATIVE)?;
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        if let Some(shared) = view.buffer.shared() {
            let mut data = shared.data.lock();
            data[addr..addr + bytes.len()].copy_from_slice(&bytes);
        } else {
            view.buffer.write(addr, &bytes);
        }
        Ok(typed_array::raw_bytes_to_value(view.kind, &bytes, NATIVE))
    }

    pub fn atomics_compare_exchange(
        &mut self,
        ta: &JsValue,
        index: &JsValue,
        expected: &JsValue,
        replacement: &JsValue,
    ) -> JsResult {
        let view = self.validate_integer_typed_array(ta, false)?;
        let expected_bytes = typed_array::value_to_raw_bytes(self, view.kind, expected, NATIVE)?;
        let replacement_bytes =
            typed_array::value_to_raw_bytes(self, view.kind, replacement, NATIVE)?;
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        let size = view.kind.bytes_per_element();

        let old_bytes = if let Some(shared) = view.buffer.shared() {
            let mut data = shared.data.lock();
            let old = data[addr..addr + size].to_vec();
            if old == expected_bytes {
                data[addr..addr + size].copy_from_slice(&replacement_bytes);
            }
            old
        } else {
            let old = view.buffer.read(addr, size).unwrap_or_else(|| vec![0; size]);
            if old == expected_bytes {
                view.buffer.write(addr, &replacement_bytes);
            }
            old
        };
        Ok(typed_array::raw_bytes_to_value(view.kind, &old_bytes, NATIVE))
    }

    /// `Atomics.isLockFree`: element sizes the platform handles without a
    /// fallback lock.
    pub fn atomics_is_lock_free(&self, byte_size: usize) -> bool {
        matches!(byte_size, 1 | 2 | 4 | 8)
    }

    /// `Atomics.wait`: block this agent until notified, the timeout runs
    /// out, or the slot no longer holds the expected value at check time.
    pub fn atomics_wait(
        &mut self,
        ta: &JsValue,
        index: &JsValue,
        expected: &JsValue,
        timeout: Option<Duration>,
    ) -> JsResult<WaitOutcome> {
        if !self.can_block {
            return Err(self.create_type_error("Atomics.wait cannot be called in this agent"));
        }
        let view = self.validate_integer_typed_array(ta, true)?;
        let expected_bytes = typed_array::value_to_raw_bytes(self, view.kind, expected, NATIVE)?;
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        let size = view.kind.bytes_per_element();
        let shared = self.waitable_shared(&view)?;

        let data = shared.data.lock();
        if data[addr..addr + size] != expected_bytes[..] {
            return Ok(WaitOutcome::NotEqual);
        }
        // Register before releasing the data lock; see the module note on
        // lock order.
        let mut waiters = shared.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.entries.push(WaiterEntry {
            id,
            addr,
            woken: false,
        });
        drop(data);

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(pos) = waiters.entries.iter().position(|e| e.id == id) {
                if waiters.entries[pos].woken {
                    waiters.entries.remove(pos);
                    return Ok(WaitOutcome::Ok);
                }
            } else {
                return Ok(WaitOutcome::Ok);
            }
            match deadline {
                Some(deadline) => {
                    if shared.condvar.wait_until(&mut waiters, deadline).timed_out() {
                        if let Some(pos) = waiters.entries.iter().position(|e| e.id == id) {
                            let woken = waiters.entries[pos].woken;
                            waiters.entries.remove(pos);
                            return Ok(if woken {
                                WaitOutcome::Ok
                            } else {
                                WaitOutcome::TimedOut
                            });
                        }
                        return Ok(WaitOutcome::Ok);
                    }
                }
                None => {
                    shared.condvar.wait(&mut waiters);
                }
            }
        }
    }

    /// `Atomics.notify`: wake up to `count` waiters parked on the slot.
    /// Works from any agent holding the shared buffer; returns how many
    /// were woken.
    pub fn atomics_notify(
        &mut self,
        ta: &JsValue,
        index: &JsValue,
        count: Option<usize>,
    ) -> JsResult<usize> {
        let view = self.validate_integer_typed_array(ta, true)?;
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        let shared = self.waitable_shared(&view)?;

        let mut remaining = count.unwrap_or(usize::MAX);
        let mut woken = 0;
        {
            let mut waiters = shared.waiters.lock();
            for entry in waiters.entries.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if entry.addr == addr && !entry.woken {
                    entry.woken = true;
                    woken += 1;
                    remaining -= 1;
                }
            }
        }
        if woken > 0 {
            shared.condvar.notify_all();
        }
        Ok(woken)
    }

    /// `Atomics.waitAsync`: never blocks. Immediate outcomes come back as
    /// `Some`; otherwise the callback fires with "ok" or "timed-out"
    /// during a later `run_jobs` turn.
    pub fn atomics_wait_async(
        &mut self,
        ta: &JsValue,
        index: &JsValue,
        expected: &JsValue,
        timeout: Option<Duration>,
        callback: JsValue,
    ) -> JsResult<Option<WaitOutcome>> {
        if !self.is_callable(&callback) {
            return Err(self.create_type_error("callback must be callable"));
        }
        let view = self.validate_integer_typed_array(ta, true)?;
        let expected_bytes = typed_array::value_to_raw_bytes(self, view.kind, expected, NATIVE)?;
        let index = self.to_index(index)?;
        let addr = self.atomic_byte_address(&view, index)?;
        let size = view.kind.bytes_per_element();
        let shared = self.waitable_shared(&view)?;

        let data = shared.data.lock();
        if data[addr..addr + size] != expected_bytes[..] {
            return Ok(Some(WaitOutcome::NotEqual));
        }
        if timeout == Some(Duration::ZERO) {
            return Ok(Some(WaitOutcome::TimedOut));
        }
        let waiter_id = {
            let mut waiters = shared.waiters.lock();
            let id = waiters.next_id;
            waiters.next_id += 1;
            waiters.entries.push(WaiterEntry {
                id,
                addr,
                woken: false,
            });
            id
        };
        drop(data);

        self.pending_waits.push(PendingWait {
            shared,
            waiter_id,
            deadline: timeout.map(|t| Instant::now() + t),
            callback,
        });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsBigInt, PropertyKey};

    fn num(v: &JsValue) -> f64 {
        match v {
            JsValue::Number(n) => *n,
            other => panic!("expected number, got {other}"),
        }
    }

    #[test]
    fn rmw_returns_old_value() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::Int32, 2)
            .unwrap();
        let zero = JsValue::Number(0.0);

        let old = realm.atomics_add(&ta, &zero, &JsValue::Number(5.0)).unwrap();
        assert_eq!(num(&old), 0.0);
        let old = realm.atomics_sub(&ta, &zero, &JsValue::Number(2.0)).unwrap();
        assert_eq!(num(&old), 5.0);
        assert_eq!(num(&realm.atomics_load(&ta, &zero).unwrap()), 3.0);

        let old = realm
            .atomics_exchange(&ta, &zero, &JsValue::Number(10.0))
            .unwrap();
        assert_eq!(num(&old), 3.0);
    }

    #[test]
    fn compare_exchange_only_on_match() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::Int32, 1)
            .unwrap();
        let zero = JsValue::Number(0.0);
        realm
            .atomics_store(&ta, &zero, &JsValue::Number(7.0))
            .unwrap();

        // Mismatched expectation leaves the slot alone.
        realm
            .atomics_compare_exchange(&ta, &zero, &JsValue::Number(1.0), &JsValue::Number(9.0))
            .unwrap();
        assert_eq!(num(&realm.atomics_load(&ta, &zero).unwrap()), 7.0);

        realm
            .atomics_compare_exchange(&ta, &zero, &JsValue::Number(7.0), &JsValue::Number(9.0))
            .unwrap();
        assert_eq!(num(&realm.atomics_load(&ta, &zero).unwrap()), 9.0);
    }

    #[test]
    fn wrapping_matches_element_width() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::Uint8, 1)
            .unwrap();
        let zero = JsValue::Number(0.0);
        realm
            .atomics_store(&ta, &zero, &JsValue::Number(250.0))
            .unwrap();
        realm.atomics_add(&ta, &zero, &JsValue::Number(10.0)).unwrap();
        assert_eq!(num(&realm.atomics_load(&ta, &zero).unwrap()), 4.0);
    }

    #[test]
    fn float_kinds_rejected() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::Float64, 1)
            .unwrap();
        let err = realm
            .atomics_load(&ta, &JsValue::Number(0.0))
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("TypeError"));
    }

    #[test]
    fn bigint64_atomics() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::BigInt64, 1)
            .unwrap();
        let zero = JsValue::Number(0.0);
        let big = |n: i64| {
            JsValue::BigInt(JsBigInt {
                value: num_bigint::BigInt::from(n),
            })
        };
        realm.atomics_store(&ta, &zero, &big(-3)).unwrap();
        realm.atomics_add(&ta, &zero, &big(5)).unwrap();
        let v = realm.atomics_load(&ta, &zero).unwrap();
        assert!(matches!(v, JsValue::BigInt(ref b) if b.value == num_bigint::BigInt::from(2)));
    }

    #[test]
    fn out_of_range_index_is_range_error() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::Int32, 1)
            .unwrap();
        let err = realm
            .atomics_load(&ta, &JsValue::Number(4.0))
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("RangeError"));
    }

    #[test]
    fn wait_requires_shared_buffer() {
        let mut realm = Realm::new();
        let ta = realm
            .create_typed_array_with_length(TypedArrayKind::Int32, 1)
            .unwrap();
        let err = realm
            .atomics_wait(&ta, &JsValue::Number(0.0), &JsValue::Number(0.0), None)
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("TypeError"));
    }

    #[test]
    fn wait_not_equal_and_timeout() {
        let mut realm = Realm::new();
        let buf = realm.create_shared_array_buffer(8, None).unwrap();
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();

        let outcome = realm
            .atomics_wait(&ta, &JsValue::Number(0.0), &JsValue::Number(1.0), None)
            .unwrap();
        assert_eq!(outcome, WaitOutcome::NotEqual);

        let outcome = realm
            .atomics_wait(
                &ta,
                &JsValue::Number(0.0),
                &JsValue::Number(0.0),
                Some(Duration::from_millis(5)),
            )
            .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn non_blocking_agent_cannot_wait() {
        let mut realm = Realm::with_can_block(false);
        let buf = realm.create_shared_array_buffer(8, None).unwrap();
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();
        let err = realm
            .atomics_wait(&ta, &JsValue::Number(0.0), &JsValue::Number(0.0), None)
            .unwrap_err();
        assert!(realm.format_error(&err).contains("cannot be called"));
    }

    #[test]
    fn notify_with_no_waiters_returns_zero() {
        let mut realm = Realm::new();
        let buf = realm.create_shared_array_buffer(8, None).unwrap();
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();
        let woken = realm
            .atomics_notify(&ta, &JsValue::Number(0.0), None)
            .unwrap();
        assert_eq!(woken, 0);
    }

    #[test]
    fn shrinking_index_coercion_hits_recheck() {
        // An index whose valueOf resizes the buffer: the address check runs
        // after coercion and sees the new bounds.
        use crate::runtime::JsFunction;
        let mut realm = Realm::new();
        let buf = realm.create_array_buffer(16, Some(16)).unwrap();
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();

        let buf_for_hook = buf.clone();
        let evil = realm.create_object();
        let hook = realm.create_function(JsFunction::native("valueOf", 0, move |realm, _, _| {
            realm.resize_array_buffer(&buf_for_hook, 4)?;
            Ok(JsValue::Number(3.0))
        }));
        realm
            .set(&evil, &PropertyKey::string("valueOf"), hook)
            .unwrap();

        let err = realm
            .atomics_store(&ta, &evil, &JsValue::Number(1.0))
            .unwrap_err();
        assert!(realm.format_error(&err).starts_with("RangeError"));
    }
}
