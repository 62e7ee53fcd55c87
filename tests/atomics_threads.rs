//! Cross-agent atomics: two realms on separate threads sharing one
//! `SharedBytes` allocation, coordinating through wait/notify.

use std::thread;
use std::time::{Duration, Instant};

use jsrt::{JsBigInt, JsValue, Realm, TypedArrayKind, WaitOutcome};

fn big(n: i64) -> JsValue {
    JsValue::BigInt(JsBigInt {
        value: num_bigint::BigInt::from(n),
    })
}

#[test]
fn stores_in_one_agent_are_visible_in_another() {
    let mut realm = Realm::new();
    let buf = realm.create_shared_array_buffer(16, None).unwrap();
    let ta = realm
        .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
        .unwrap();
    realm
        .atomics_store(&ta, &JsValue::Number(1.0), &JsValue::Number(-7.0))
        .unwrap();

    let shared = realm.share_buffer(&buf).unwrap();
    let observed = thread::spawn(move || {
        let mut realm = Realm::new();
        let buf = realm.adopt_shared_bytes(shared);
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();
        realm
            .atomics_load(&ta, &JsValue::Number(1.0))
            .unwrap()
    })
    .join()
    .unwrap();

    assert!(matches!(observed, JsValue::Number(n) if n == -7.0));
}

#[test]
fn wait_parks_until_notified_from_another_agent() {
    let mut realm = Realm::new();
    let buf = realm.create_shared_array_buffer(16, None).unwrap();
    let ta = realm
        .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
        .unwrap();
    let shared = realm.share_buffer(&buf).unwrap();

    let waiter = thread::spawn(move || {
        let mut realm = Realm::with_can_block(true);
        let buf = realm.adopt_shared_bytes(shared);
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();
        realm
            .atomics_wait(
                &ta,
                &JsValue::Number(0.0),
                &JsValue::Number(0.0),
                Some(Duration::from_secs(10)),
            )
            .unwrap()
    });

    // Keep notifying until the waiter has actually parked; notify reports
    // how many it woke, so zero means it has not registered yet.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let woken = realm
            .atomics_notify(&ta, &JsValue::Number(0.0), None)
            .unwrap();
        if woken == 1 {
            break;
        }
        assert!(Instant::now() < deadline, "waiter never registered");
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(waiter.join().unwrap(), WaitOutcome::Ok);
}

#[test]
fn wait_observes_a_racing_store_as_not_equal() {
    let mut realm = Realm::new();
    let buf = realm.create_shared_array_buffer(8, None).unwrap();
    let ta = realm
        .create_typed_array(TypedArrayKind::BigInt64, &buf, 0, None)
        .unwrap();
    let shared = realm.share_buffer(&buf).unwrap();

    // The store lands before the waiter checks, so the value comparison
    // fails and the wait returns immediately.
    realm
        .atomics_store(&ta, &JsValue::Number(0.0), &big(5))
        .unwrap();

    let outcome = thread::spawn(move || {
        let mut realm = Realm::with_can_block(true);
        let buf = realm.adopt_shared_bytes(shared);
        let ta = realm
            .create_typed_array(TypedArrayKind::BigInt64, &buf, 0, None)
            .unwrap();
        realm
            .atomics_wait(&ta, &JsValue::Number(0.0), &big(0), None)
            .unwrap()
    })
    .join()
    .unwrap();

    assert_eq!(outcome, WaitOutcome::NotEqual);
}

#[test]
fn wait_times_out_when_nobody_notifies() {
    let mut realm = Realm::with_can_block(true);
    let buf = realm.create_shared_array_buffer(16, None).unwrap();
    let ta = realm
        .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
        .unwrap();
    let outcome = realm
        .atomics_wait(
            &ta,
            &JsValue::Number(0.0),
            &JsValue::Number(0.0),
            Some(Duration::from_millis(10)),
        )
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
}

#[test]
fn rmw_operations_from_two_agents_never_lose_updates() {
    let mut realm = Realm::new();
    let buf = realm.create_shared_array_buffer(4, None).unwrap();
    let ta = realm
        .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
        .unwrap();
    let shared = realm.share_buffer(&buf).unwrap();

    const PER_AGENT: usize = 1000;
    let other = thread::spawn(move || {
        let mut realm = Realm::new();
        let buf = realm.adopt_shared_bytes(shared);
        let ta = realm
            .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
            .unwrap();
        for _ in 0..PER_AGENT {
            realm
                .atomics_add(&ta, &JsValue::Number(0.0), &JsValue::Number(1.0))
                .unwrap();
        }
    });
    for _ in 0..PER_AGENT {
        realm
            .atomics_add(&ta, &JsValue::Number(0.0), &JsValue::Number(1.0))
            .unwrap();
    }
    other.join().unwrap();

    let total = realm.atomics_load(&ta, &JsValue::Number(0.0)).unwrap();
    assert!(matches!(total, JsValue::Number(n) if n == (2 * PER_AGENT) as f64));
}
