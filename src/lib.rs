//! An ECMAScript object and memory runtime core: ordinary and exotic
//! objects over a property table, proxies with full invariant enforcement,
//! resizable array buffers with lazily-bounds-checked views, atomics with
//! cross-agent wait/notify, weak references with an explicit mark-sweep
//! collector, and a job queue tying the turns together.
//!
//! There is no parser and no evaluator here; the embedder drives a
//! [`Realm`] directly through the reflection-shaped API and supplies
//! native functions for every callable.
//!
//! ```
//! use jsrt::{JsValue, PropertyKey, Realm};
//!
//! let mut realm = Realm::new();
//! let obj = realm.create_object();
//! realm
//!     .set(&obj, &PropertyKey::string("answer"), JsValue::Number(42.0))
//!     .unwrap();
//! realm.freeze(&obj).unwrap();
//! assert!(!realm
//!     .set(&obj, &PropertyKey::string("answer"), JsValue::Number(0.0))
//!     .unwrap());
//! ```

pub mod runtime;
pub mod types;

pub use runtime::{
    BindingSlot, ByteOrder, ElementsKind, IntegrityLevel, JsFunction, JsResult,
    PropertyDescriptor, PropertyTable, Realm, SharedBytes, TypedArrayKind, WaitOutcome,
};
pub use types::{
    JsBigInt, JsString, JsSymbol, JsValue, PropertyKey, WellKnownSymbol,
};
