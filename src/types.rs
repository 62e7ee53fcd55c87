use std::fmt;
use std::hash::{Hash, Hasher};

/// A language value. Objects are arena handles owned by a `Realm`
/// (`crate::runtime::Realm`); everything else is self-contained.
#[derive(Clone, Debug)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
    Symbol(JsSymbol),
    BigInt(JsBigInt),
    Object(JsObject),
}

// UTF-16 code unit string per spec §6.1.4
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JsString {
    pub code_units: Vec<u16>,
}

impl JsString {
    pub fn from_str(s: &str) -> Self {
        Self {
            code_units: s.encode_utf16().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code_units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.code_units.len()
    }

    pub fn to_rust_string(&self) -> String {
        String::from_utf16_lossy(&self.code_units)
    }

    pub fn code_unit_at(&self, index: usize) -> Option<u16> {
        self.code_units.get(index).copied()
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}

/// A unique, unforgeable token. Identity is the `id`; the description is
/// purely diagnostic. Well-known symbols occupy the low fixed ids so that
/// every Realm mints structurally identical ones.
#[derive(Clone, Debug)]
pub struct JsSymbol {
    pub id: u64,
    pub description: Option<JsString>,
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// Well-known symbols (§6.1.5.1). Each has a fixed id shared by all Realms;
// user symbols start above FIRST_USER_SYMBOL_ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellKnownSymbol {
    Iterator,
    ToStringTag,
    Species,
    HasInstance,
    IsConcatSpreadable,
    ToPrimitive,
    Unscopables,
}

pub const FIRST_USER_SYMBOL_ID: u64 = 64;

impl WellKnownSymbol {
    pub fn fixed_id(self) -> u64 {
        match self {
            WellKnownSymbol::Iterator => 1,
            WellKnownSymbol::ToStringTag => 2,
            WellKnownSymbol::Species => 3,
            WellKnownSymbol::HasInstance => 4,
            WellKnownSymbol::IsConcatSpreadable => 5,
            WellKnownSymbol::ToPrimitive => 6,
            WellKnownSymbol::Unscopables => 7,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            WellKnownSymbol::Iterator => "Symbol.iterator",
            WellKnownSymbol::ToStringTag => "Symbol.toStringTag",
            WellKnownSymbol::Species => "Symbol.species",
            WellKnownSymbol::HasInstance => "Symbol.hasInstance",
            WellKnownSymbol::IsConcatSpreadable => "Symbol.isConcatSpreadable",
            WellKnownSymbol::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbol::Unscopables => "Symbol.unscopables",
        }
    }

    pub fn to_symbol(self) -> JsSymbol {
        JsSymbol {
            id: self.fixed_id(),
            description: Some(JsString::from_str(self.description())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JsBigInt {
    pub value: num_bigint::BigInt,
}

/// Handle into a Realm's object arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JsObject {
    pub id: u64,
}

/// A property key: canonical array index, string, or symbol. String keys
/// whose text is a canonical array index are normalized to `Index` at
/// construction so the two spellings can never coexist in one table and
/// the spec enumeration order falls out of a three-bucket sort.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Index(u32),
    String(JsString),
    Symbol(JsSymbol),
}

// Largest valid array index is 2^32 - 2 (length caps at 2^32 - 1).
pub const MAX_ARRAY_INDEX: u32 = u32::MAX - 1;

impl PropertyKey {
    pub fn string(s: &str) -> Self {
        match canonical_array_index(s) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(JsString::from_str(s)),
        }
    }

    pub fn from_js_string(s: JsString) -> Self {
        match canonical_array_index(&s.to_rust_string()) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(s),
        }
    }

    pub fn index(i: u32) -> Self {
        PropertyKey::Index(i)
    }

    pub fn symbol(s: JsSymbol) -> Self {
        PropertyKey::Symbol(s)
    }

    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, PropertyKey::Symbol(_))
    }

    /// The key as a value, for passing to trap functions.
    pub fn to_value(&self) -> JsValue {
        match self {
            PropertyKey::Index(i) => JsValue::String(JsString::from_str(&i.to_string())),
            PropertyKey::String(s) => JsValue::String(s.clone()),
            PropertyKey::Symbol(s) => JsValue::Symbol(s.clone()),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Index(i) => write!(f, "{i}"),
            PropertyKey::String(s) => write!(f, "{s}"),
            PropertyKey::Symbol(s) => match &s.description {
                Some(d) => write!(f, "Symbol({d})"),
                None => write!(f, "Symbol()"),
            },
        }
    }
}

// CanonicalNumericIndexString restricted to array indices: decimal digits,
// no leading zero (except "0" itself), value <= 2^32 - 2.
fn canonical_array_index(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 10 {
        return None;
    }
    if s == "0" {
        return Some(0);
    }
    let bytes = s.as_bytes();
    if bytes[0] == b'0' || !bytes.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = s.parse().ok()?;
    if n <= MAX_ARRAY_INDEX as u64 {
        Some(n as u32)
    } else {
        None
    }
}

impl JsValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsValue::Null)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn object_id(&self) -> Option<u64> {
        match self {
            JsValue::Object(o) => Some(o.id),
            _ => None,
        }
    }

    pub fn object(id: u64) -> JsValue {
        JsValue::Object(JsObject { id })
    }

    pub fn string(s: &str) -> JsValue {
        JsValue::String(JsString::from_str(s))
    }
}

// §6.1.6.1 — the Number operations the object model relies on.
pub mod number_ops {
    pub fn same_value(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        if x == 0.0 && y == 0.0 {
            return x.is_sign_positive() == y.is_sign_positive();
        }
        x == y
    }

    pub fn same_value_zero(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        x == y
    }

    pub fn equal(x: f64, y: f64) -> bool {
        if x.is_nan() || y.is_nan() {
            return false;
        }
        x == y
    }

    // §7.1.5 ToIntegerOrInfinity
    pub fn to_integer_or_infinity(n: f64) -> f64 {
        if n.is_nan() || n == 0.0 {
            0.0
        } else if n.is_infinite() {
            n
        } else {
            n.trunc()
        }
    }

    // §7.1.6 ToInt32
    pub fn to_int32(x: f64) -> i32 {
        if x.is_nan() || x.is_infinite() || x == 0.0 {
            return 0;
        }
        let int_val = x.trunc();
        (int_val as i64 as u32) as i32
    }

    // §7.1.7 ToUint32
    pub fn to_uint32(x: f64) -> u32 {
        if x.is_nan() || x.is_infinite() || x == 0.0 {
            return 0;
        }
        let int_val = x.trunc();
        int_val as i64 as u32
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{b}"),
            JsValue::Number(n) => write!(f, "{n}"),
            JsValue::String(s) => write!(f, "{s}"),
            JsValue::Symbol(s) => {
                if let Some(desc) = &s.description {
                    write!(f, "Symbol({desc})")
                } else {
                    write!(f, "Symbol()")
                }
            }
            JsValue::BigInt(b) => write!(f, "{}n", b.value),
            JsValue::Object(_) => write!(f, "[object Object]"),
        }
    }
}
