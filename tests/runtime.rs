//! Cross-module scenarios: integrity levels over exotic objects, typed
//! array writes racing buffer resizes through coercion hooks, and weak
//! cleanup driven by explicit collection.

use jsrt::{
    IntegrityLevel, JsFunction, JsValue, PropertyDescriptor, PropertyKey, Realm, TypedArrayKind,
};

#[test]
fn freeze_is_all_or_nothing() {
    let mut realm = Realm::new();

    // An ordinary object with a mix of data and accessor properties.
    let obj = realm.create_object();
    realm
        .set(&obj, &PropertyKey::string("x"), JsValue::Number(1.0))
        .unwrap();
    let getter = realm.create_function(JsFunction::native("get", 0, |_, _, _| {
        Ok(JsValue::Number(2.0))
    }));
    realm
        .define_property(
            &obj,
            PropertyKey::string("computed"),
            PropertyDescriptor::accessor(Some(getter), None, true, true),
        )
        .unwrap();

    realm.freeze(&obj).unwrap();
    assert!(realm.is_frozen(&obj).unwrap());
    assert!(!realm
        .set(&obj, &PropertyKey::string("x"), JsValue::Number(9.0))
        .unwrap());
    assert!(!realm
        .set(&obj, &PropertyKey::string("new"), JsValue::Number(1.0))
        .unwrap());
    // The accessor still fires; freezing pins attributes, not behavior.
    let v = realm.get(&obj, &PropertyKey::string("computed")).unwrap();
    assert!(matches!(v, JsValue::Number(n) if n == 2.0));

    // A typed array with live elements cannot be frozen, and the failed
    // attempt must leave it untouched.
    let ta = realm
        .create_typed_array_with_length(TypedArrayKind::Uint8, 2)
        .unwrap();
    assert!(realm.freeze(&ta).is_err());
    assert!(realm.is_extensible(&ta).unwrap());
    assert!(realm
        .set(&ta, &PropertyKey::index(0), JsValue::Number(7.0))
        .unwrap());

    // A zero-length one freezes fine.
    let empty = realm
        .create_typed_array_with_length(TypedArrayKind::Uint8, 0)
        .unwrap();
    realm.freeze(&empty).unwrap();
    assert!(realm.is_frozen(&empty).unwrap());
}

#[test]
fn seal_keeps_writes_but_pins_the_shape() {
    let mut realm = Realm::new();
    let arr = realm.create_array(vec![JsValue::Number(1.0), JsValue::Number(2.0)]);
    realm.seal(&arr).unwrap();

    assert!(realm.is_sealed(&arr).unwrap());
    assert!(!realm.is_frozen(&arr).unwrap());
    // Existing elements stay writable.
    assert!(realm
        .set(&arr, &PropertyKey::index(0), JsValue::Number(9.0))
        .unwrap());
    // But the shape is pinned: no deletes, no new keys.
    assert!(!realm.delete_property(&arr, &PropertyKey::index(0)).unwrap());
    assert!(!realm
        .set(&arr, &PropertyKey::index(5), JsValue::Number(1.0))
        .unwrap());
    assert_eq!(
        realm.set_integrity_level(&arr, IntegrityLevel::Sealed).unwrap(),
        true
    );
}

#[test]
fn typed_array_set_keeps_coercing_after_a_shrink() {
    let mut realm = Realm::new();
    let buf = realm.create_array_buffer(16, Some(16)).unwrap();
    let ta = realm
        .create_typed_array(TypedArrayKind::Int32, &buf, 0, None)
        .unwrap();

    let coerced = realm.create_array(vec![]);

    // Source: [10, 11, evil, trailing] where evil's valueOf shrinks the
    // buffer to two elements mid-copy.
    let source = realm.create_object();
    realm
        .set(&source, &PropertyKey::string("length"), JsValue::Number(4.0))
        .unwrap();
    realm
        .set(&source, &PropertyKey::index(0), JsValue::Number(10.0))
        .unwrap();
    realm
        .set(&source, &PropertyKey::index(1), JsValue::Number(11.0))
        .unwrap();

    let buf_clone = buf.clone();
    let coerced_clone = coerced.clone();
    let evil = realm.create_object();
    let evil_hook = realm.create_function(JsFunction::native("valueOf", 0, move |realm, _, _| {
        let n = realm.array_length(&coerced_clone);
        realm.set(&coerced_clone, &PropertyKey::index(n), JsValue::string("evil"))?;
        realm.resize_array_buffer(&buf_clone, 8)?;
        Ok(JsValue::Number(12.0))
    }));
    realm
        .set(&evil, &PropertyKey::string("valueOf"), evil_hook)
        .unwrap();
    realm.set(&source, &PropertyKey::index(2), evil).unwrap();

    let coerced_clone = coerced.clone();
    let trailing = realm.create_object();
    let trailing_hook =
        realm.create_function(JsFunction::native("valueOf", 0, move |realm, _, _| {
            let n = realm.array_length(&coerced_clone);
            realm.set(
                &coerced_clone,
                &PropertyKey::index(n),
                JsValue::string("trailing"),
            )?;
            Ok(JsValue::Number(13.0))
        }));
    realm
        .set(&trailing, &PropertyKey::string("valueOf"), trailing_hook)
        .unwrap();
    realm.set(&source, &PropertyKey::index(3), trailing).unwrap();

    realm
        .typed_array_set_from_array_like(&ta, &source, 0)
        .unwrap();

    // Both hooks ran, in order, even though their writes were dropped.
    assert_eq!(realm.array_length(&coerced), 2);
    // The writes before the shrink landed; the ones after fell away.
    let v0 = realm.get(&ta, &PropertyKey::index(0)).unwrap();
    assert!(matches!(v0, JsValue::Number(n) if n == 10.0));
    let v1 = realm.get(&ta, &PropertyKey::index(1)).unwrap();
    assert!(matches!(v1, JsValue::Number(n) if n == 11.0));
    assert_eq!(realm.typed_array_length(&ta).unwrap(), 2);
    let v2 = realm.get(&ta, &PropertyKey::index(2)).unwrap();
    assert!(v2.is_undefined());
}

#[test]
fn reentrant_cleanup_some_fires_each_cell_once() {
    let mut realm = Realm::new();
    let log = realm.create_array(vec![]);
    realm.root(log.clone());

    let log_clone = log.clone();
    let logger = realm.create_function(JsFunction::native("logger", 1, move |realm, _, args| {
        let n = realm.array_length(&log_clone);
        realm.set(
            &log_clone,
            &PropertyKey::index(n),
            args.first().cloned().unwrap_or(JsValue::Undefined),
        )?;
        Ok(JsValue::Undefined)
    }));
    let registry = realm.create_finalization_registry(&logger).unwrap();
    realm.root(registry.clone());

    for name in ["one", "two"] {
        let target = realm.create_object();
        realm
            .registry_register(&registry, &target, JsValue::string(name), None)
            .unwrap();
    }
    realm.collect_garbage();

    // A callback that drains the registry again from inside itself; the
    // inner drain falls back to the registry's own logging callback.
    let log_clone = log.clone();
    let registry_clone = registry.clone();
    let reentrant = realm.create_function(JsFunction::native("cb", 1, move |realm, _, args| {
        let n = realm.array_length(&log_clone);
        realm.set(
            &log_clone,
            &PropertyKey::index(n),
            args.first().cloned().unwrap_or(JsValue::Undefined),
        )?;
        realm.registry_cleanup_some(&registry_clone, None)?;
        Ok(JsValue::Undefined)
    }));
    realm
        .registry_cleanup_some(&registry, Some(&reentrant))
        .unwrap();

    assert_eq!(realm.array_length(&log), 2);

    // The queued cleanup job finds nothing left to do.
    realm.run_jobs();
    assert!(realm.take_unhandled_errors().is_empty());
    assert_eq!(realm.array_length(&log), 2);
}

#[test]
fn proxy_over_frozen_target_stays_honest() {
    let mut realm = Realm::new();
    let target = realm.create_object();
    realm
        .set(&target, &PropertyKey::string("x"), JsValue::Number(1.0))
        .unwrap();
    realm.freeze(&target).unwrap();

    let handler = realm.create_object();
    let lie = realm.create_function(JsFunction::native("get", 3, |_, _, _| {
        Ok(JsValue::Number(999.0))
    }));
    realm.set(&handler, &PropertyKey::string("get"), lie).unwrap();
    let proxy = realm.create_proxy(&target, &handler).unwrap();

    let err = realm.get(&proxy, &PropertyKey::string("x")).unwrap_err();
    assert!(realm.format_error(&err).starts_with("TypeError"));
}

#[test]
fn weak_ref_lifecycle_through_collection() {
    let mut realm = Realm::new();
    let target = realm.create_object();
    realm.root(target.clone());
    let wr = realm.create_weak_ref(&target).unwrap();
    realm.root(wr.clone());

    assert!(realm.weak_ref_deref(&wr).unwrap().is_object());

    realm.unroot(&target);
    drop(target);
    // The deref pinned the target until the end of the turn; collecting
    // before the turn boundary must not clear it.
    realm.collect_garbage();
    assert!(realm.weak_ref_deref(&wr).unwrap().is_object());

    realm.run_jobs();
    realm.collect_garbage();
    assert!(realm.weak_ref_deref(&wr).unwrap().is_undefined());
}
