//! Runtime-typed option values.
//!
//! Client options arrive as a string-keyed bag of loosely typed values. Every
//! `Value` knows its exact `ValueType`, whose `Display` form is the D-Bus type
//! signature (`s`, `b`, `ay`, `a(sa(us))`, ...). Arrays carry their element
//! type so that an empty array still has an exact signature.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// String-keyed option dictionary (`a{sv}` on the wire).
///
/// Uses `BTreeMap` for deterministic iteration order.
pub type VarDict = BTreeMap<String, Value>;

/// Static type of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Byte,
    U32,
    Str,
    /// Boxed value of any type (`v`).
    Variant,
    Array(Box<ValueType>),
    Struct(Vec<ValueType>),
    /// String-keyed dictionary of variants (`a{sv}`).
    Dict,
}

impl ValueType {
    /// Shorthand for `ValueType::Array(Box::new(element))`.
    #[must_use]
    pub fn array_of(element: ValueType) -> Self {
        Self::Array(Box::new(element))
    }

    /// `ay`, the raw byte-string type used for filesystem paths.
    #[must_use]
    pub fn byte_string() -> Self {
        Self::array_of(Self::Byte)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("b"),
            Self::Byte => f.write_str("y"),
            Self::U32 => f.write_str("u"),
            Self::Str => f.write_str("s"),
            Self::Variant => f.write_str("v"),
            Self::Array(element) => write!(f, "a{element}"),
            Self::Struct(fields) => {
                f.write_str("(")?;
                for field in fields {
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
            Self::Dict => f.write_str("a{sv}"),
        }
    }
}

/// Error returned when assembling a typed array from mismatched items.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("array of {expected} cannot hold item {index} of type {found}")]
pub struct ArrayTypeError {
    pub expected: String,
    pub found: String,
    pub index: usize,
}

/// A single runtime-typed value.
///
/// Deserialized arrays go through [`Value::array`], so an array read from
/// untrusted input always holds items of its declared element type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedValue")]
pub enum Value {
    Bool(bool),
    Byte(u8),
    U32(u32),
    Str(String),
    Variant(Box<Value>),
    /// Homogeneous array. Construct through [`Value::array`] so the element
    /// type is checked against every item.
    Array { element: ValueType, items: Vec<Value> },
    Struct(Vec<Value>),
    Dict(VarDict),
}

/// Wire shape of [`Value`] before array items are checked.
#[derive(Deserialize)]
#[serde(rename = "Value")]
enum UncheckedValue {
    Bool(bool),
    Byte(u8),
    U32(u32),
    Str(String),
    Variant(Box<Value>),
    Array { element: ValueType, items: Vec<Value> },
    Struct(Vec<Value>),
    Dict(VarDict),
}

impl TryFrom<UncheckedValue> for Value {
    type Error = ArrayTypeError;

    fn try_from(raw: UncheckedValue) -> Result<Self, Self::Error> {
        Ok(match raw {
            UncheckedValue::Bool(b) => Self::Bool(b),
            UncheckedValue::Byte(b) => Self::Byte(b),
            UncheckedValue::U32(n) => Self::U32(n),
            UncheckedValue::Str(s) => Self::Str(s),
            UncheckedValue::Variant(inner) => Self::Variant(inner),
            UncheckedValue::Array { element, items } => Self::array(element, items)?,
            UncheckedValue::Struct(fields) => Self::Struct(fields),
            UncheckedValue::Dict(entries) => Self::Dict(entries),
        })
    }
}

impl Value {
    /// Builds a typed array, rejecting any item whose type is not `element`.
    ///
    /// # Errors
    ///
    /// Returns `ArrayTypeError` naming the first mismatching item.
    pub fn array(element: ValueType, items: Vec<Value>) -> Result<Self, ArrayTypeError> {
        if let Some((index, item)) = items
            .iter()
            .enumerate()
            .find(|(_, item)| item.value_type() != element)
        {
            return Err(ArrayTypeError {
                expected: element.to_string(),
                found: item.value_type().to_string(),
                index,
            });
        }
        Ok(Self::Array { element, items })
    }

    /// Builds an `as` array.
    #[must_use]
    pub fn str_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array {
            element: ValueType::Str,
            items: items.into_iter().map(|s| Self::Str(s.into())).collect(),
        }
    }

    /// Builds an `ay` byte string. A trailing NUL is appended, matching how
    /// paths travel on the bus.
    #[must_use]
    pub fn byte_string(bytes: &[u8]) -> Self {
        let mut items: Vec<Value> = bytes.iter().copied().map(Self::Byte).collect();
        items.push(Self::Byte(0));
        Self::Array {
            element: ValueType::Byte,
            items,
        }
    }

    /// Returns the exact runtime type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Byte(_) => ValueType::Byte,
            Self::U32(_) => ValueType::U32,
            Self::Str(_) => ValueType::Str,
            Self::Variant(_) => ValueType::Variant,
            Self::Array { element, .. } => ValueType::array_of(element.clone()),
            Self::Struct(fields) => ValueType::Struct(fields.iter().map(Self::value_type).collect()),
            Self::Dict(_) => ValueType::Dict,
        }
    }

    /// Whether every array nested in this value holds only items of its
    /// declared element type.
    ///
    /// Always true for values built through [`Value::array`] or
    /// deserialized; a hand-written `Value::Array` literal may break it.
    #[must_use]
    pub fn is_well_typed(&self) -> bool {
        match self {
            Self::Bool(_) | Self::Byte(_) | Self::U32(_) | Self::Str(_) => true,
            Self::Variant(inner) => inner.is_well_typed(),
            Self::Array { element, items } => items
                .iter()
                .all(|item| &item.value_type() == element && item.is_well_typed()),
            Self::Struct(fields) => fields.iter().all(Self::is_well_typed),
            Self::Dict(entries) => entries.values().all(Self::is_well_typed),
        }
    }

    /// Type signature of this value, e.g. `a(sa(us))`.
    #[must_use]
    pub fn signature(&self) -> String {
        self.value_type().to_string()
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Items of an array value, regardless of element type.
    #[must_use]
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Self::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_fields(&self) -> Option<&[Value]> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::U32(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_type() -> ValueType {
        ValueType::array_of(ValueType::Struct(vec![
            ValueType::Str,
            ValueType::array_of(ValueType::Struct(vec![ValueType::U32, ValueType::Str])),
        ]))
    }

    #[test]
    fn signatures_match_wire_notation() {
        assert_eq!(ValueType::Str.to_string(), "s");
        assert_eq!(ValueType::byte_string().to_string(), "ay");
        assert_eq!(filter_type().to_string(), "a(sa(us))");
        assert_eq!(ValueType::Dict.to_string(), "a{sv}");
    }

    #[test]
    fn empty_array_keeps_element_type() {
        let empty = Value::array(ValueType::Str, Vec::new()).unwrap();
        assert_eq!(empty.signature(), "as");
    }

    #[test]
    fn struct_signature_is_derived_from_fields() {
        let rule = Value::Struct(vec![Value::U32(0), Value::from("*.txt")]);
        assert_eq!(rule.signature(), "(us)");
    }

    #[test]
    fn array_rejects_mismatched_item() {
        let err = Value::array(ValueType::Str, vec![Value::from("a"), Value::U32(1)]).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.expected, "s");
        assert_eq!(err.found, "u");
    }

    #[test]
    fn byte_string_is_nul_terminated() {
        let path = Value::byte_string(b"/tmp");
        assert_eq!(path.signature(), "ay");
        assert_eq!(path.as_items().unwrap().len(), 5);
        assert_eq!(path.as_items().unwrap().last(), Some(&Value::Byte(0)));
    }

    #[test]
    fn accessors_are_type_exact() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::U32(1).as_bool(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::from("x").as_items().is_none());
    }

    #[test]
    fn deserialized_arrays_are_checked() {
        let ok: Value =
            serde_json::from_str(r#"{"Array":{"element":"Str","items":[{"Str":"a"}]}}"#).unwrap();
        assert_eq!(ok, Value::str_array(["a"]));

        let nested = r#"{"Variant":{"Array":{"element":"Byte","items":[{"U32":7}]}}}"#;
        let err = serde_json::from_str::<Value>(nested).unwrap_err();
        assert!(err.to_string().contains("array of y cannot hold item 0 of type u"));
    }

    #[test]
    fn array_literal_with_wrong_items_is_not_well_typed() {
        assert!(Value::byte_string(b"/tmp").is_well_typed());
        let forged = Value::Struct(vec![Value::Array {
            element: ValueType::Byte,
            items: vec![Value::from("x")],
        }]);
        assert!(!forged.is_well_typed());
        assert_eq!(forged.signature(), "(ay)");
    }
}
