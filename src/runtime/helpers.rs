use super::{JsResult, Realm};
use crate::types::{JsValue, PropertyKey, number_ops};

// §7.1.3 ToBoolean
pub(crate) fn to_boolean(val: &JsValue) -> bool {
    match val {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
        JsValue::String(s) => !s.is_empty(),
        JsValue::BigInt(b) => b.value.sign() != num_bigint::Sign::NoSign,
        JsValue::Symbol(_) | JsValue::Object(_) => true,
    }
}

pub(crate) fn strict_equality(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Undefined, JsValue::Undefined) => true,
        (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::equal(*a, *b),
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::Symbol(a), JsValue::Symbol(b)) => a.id == b.id,
        (JsValue::BigInt(a), JsValue::BigInt(b)) => a.value == b.value,
        (JsValue::Object(a), JsValue::Object(b)) => a.id == b.id,
        _ => false,
    }
}

// §7.2.10 SameValue
pub(crate) fn same_value(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equality(left, right),
    }
}

impl Realm {
    /// §7.1.1 ToPrimitive with number hint, restricted to the `valueOf` /
    /// `toString` protocol. This is the hook through which user coercion
    /// callbacks re-enter the runtime mid-operation.
    pub(crate) fn to_primitive(&mut self, val: &JsValue) -> JsResult {
        let id = match val {
            JsValue::Object(o) => o.id,
            _ => return Ok(val.clone()),
        };
        for method in ["valueOf", "toString"] {
            let f = self.object_get(id, &PropertyKey::string(method), val)?;
            if self.is_callable(&f) {
                let result = self.call(&f, val, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(self.create_type_error("Cannot convert object to primitive value"))
    }

    // §7.1.4 ToNumber
    pub(crate) fn to_number(&mut self, val: &JsValue) -> JsResult<f64> {
        let prim = self.to_primitive(val)?;
        match &prim {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(*b as u8 as f64),
            JsValue::Number(n) => Ok(*n),
            JsValue::String(s) => {
                let text = s.to_rust_string();
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(0.0)
                } else {
                    Ok(trimmed.parse::<f64>().unwrap_or(f64::NAN))
                }
            }
            JsValue::Symbol(_) => Err(self.create_type_error("Cannot convert a Symbol to a number")),
            JsValue::BigInt(_) => Err(self.create_type_error("Cannot convert a BigInt to a number")),
            JsValue::Object(_) => Ok(f64::NAN),
        }
    }

    // §7.1.13 ToBigInt, restricted to what typed arrays need.
    pub(crate) fn to_bigint(&mut self, val: &JsValue) -> JsResult<num_bigint::BigInt> {
        let prim = self.to_primitive(val)?;
        match &prim {
            JsValue::BigInt(b) => Ok(b.value.clone()),
            JsValue::Boolean(b) => Ok(num_bigint::BigInt::from(*b as u8)),
            _ => Err(self.create_type_error("Cannot convert value to a BigInt")),
        }
    }

    // §7.1.22 ToIndex
    pub(crate) fn to_index(&mut self, val: &JsValue) -> JsResult<usize> {
        if val.is_undefined() {
            return Ok(0);
        }
        let n = self.to_number(val)?;
        let int = number_ops::to_integer_or_infinity(n);
        if int < 0.0 || int > 9007199254740991.0 {
            return Err(self.create_range_error("index out of allowed range"));
        }
        Ok(int as usize)
    }

    /// §6.2.6.5 ToPropertyDescriptor: read a descriptor-shaped object.
    pub(crate) fn to_property_descriptor(
        &mut self,
        val: &JsValue,
    ) -> JsResult<super::PropertyDescriptor> {
        let id = self.expect_object(val, "ToPropertyDescriptor")?;
        let mut desc = super::PropertyDescriptor::default();
        for (field, key) in [
            ("value", PropertyKey::string("value")),
            ("writable", PropertyKey::string("writable")),
            ("get", PropertyKey::string("get")),
            ("set", PropertyKey::string("set")),
            ("enumerable", PropertyKey::string("enumerable")),
            ("configurable", PropertyKey::string("configurable")),
        ] {
            if !self.object_has_property(id, &key)? {
                continue;
            }
            let v = self.object_get(id, &key, val)?;
            match field {
                "value" => desc.value = Some(v),
                "writable" => desc.writable = Some(to_boolean(&v)),
                "enumerable" => desc.enumerable = Some(to_boolean(&v)),
                "configurable" => desc.configurable = Some(to_boolean(&v)),
                "get" | "set" => {
                    if !v.is_undefined() && !self.is_callable(&v) {
                        return Err(
                            self.create_type_error("Getter/setter must be callable or undefined")
                        );
                    }
                    if field == "get" {
                        desc.get = Some(v);
                    } else {
                        desc.set = Some(v);
                    }
                }
                _ => {}
            }
        }
        if desc.is_accessor_descriptor() && desc.is_data_descriptor() {
            return Err(self.create_type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        Ok(desc)
    }

    /// §6.2.6.4 FromPropertyDescriptor: descriptor as a plain object, for
    /// handing to trap functions.
    pub(crate) fn from_property_descriptor(&mut self, desc: &super::PropertyDescriptor) -> JsValue {
        let result = self.create_object();
        let id = result.object_id().unwrap_or_default();
        if let Some(obj) = self.get_object(id) {
            let mut b = obj.borrow_mut();
            if let Some(ref v) = desc.value {
                b.table.insert(
                    PropertyKey::string("value"),
                    super::PropertyDescriptor::data_default(v.clone()),
                );
            }
            if let Some(w) = desc.writable {
                b.table.insert(
                    PropertyKey::string("writable"),
                    super::PropertyDescriptor::data_default(JsValue::Boolean(w)),
                );
            }
            if let Some(ref g) = desc.get {
                b.table.insert(
                    PropertyKey::string("get"),
                    super::PropertyDescriptor::data_default(g.clone()),
                );
            }
            if let Some(ref s) = desc.set {
                b.table.insert(
                    PropertyKey::string("set"),
                    super::PropertyDescriptor::data_default(s.clone()),
                );
            }
            if let Some(e) = desc.enumerable {
                b.table.insert(
                    PropertyKey::string("enumerable"),
                    super::PropertyDescriptor::data_default(JsValue::Boolean(e)),
                );
            }
            if let Some(c) = desc.configurable {
                b.table.insert(
                    PropertyKey::string("configurable"),
                    super::PropertyDescriptor::data_default(JsValue::Boolean(c)),
                );
            }
        }
        result
    }

    /// Keys a trap hands back (ownKeys results, argument lists) arrive as
    /// values; only strings and symbols are acceptable.
    pub(crate) fn to_property_key(&mut self, val: &JsValue) -> JsResult<PropertyKey> {
        match val {
            JsValue::String(s) => Ok(PropertyKey::from_js_string(s.clone())),
            JsValue::Symbol(s) => Ok(PropertyKey::Symbol(s.clone())),
            _ => Err(self.create_type_error("property key must be a String or Symbol")),
        }
    }
}
