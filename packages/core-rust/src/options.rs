//! Typed views of the structured file chooser options.
//!
//! Filters and choices travel as nested structs inside the option bag. These
//! types give them names and convert them to and from their wire `Value`
//! form. Conversion *from* a value only checks shape; semantic checks live in
//! [`crate::validate`].

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueType};

/// Kind of a single filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    /// Shell-style glob such as `*.txt`.
    Glob,
    /// Content type such as `image/png`.
    Mime,
}

impl RuleKind {
    /// Wire discriminant: 0 for glob, 1 for mime.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Glob => 0,
            Self::Mime => 1,
        }
    }
}

impl TryFrom<u32> for RuleKind {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Glob),
            1 => Ok(Self::Mime),
            other => Err(other),
        }
    }
}

/// One `(kind, pattern)` rule of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub kind: RuleKind,
    pub pattern: String,
}

/// A named group of rules, e.g. `("Text files", [(glob, "*.txt")])`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    pub rules: Vec<FilterRule>,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn glob(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(FilterRule {
            kind: RuleKind::Glob,
            pattern: pattern.into(),
        });
        self
    }

    #[must_use]
    pub fn mime(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(FilterRule {
            kind: RuleKind::Mime,
            pattern: pattern.into(),
        });
        self
    }
}

/// One selectable sub-option of an enumerated choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
}

/// A labelled choice shown next to the file list.
///
/// With no `options` the choice is a boolean toggle and `current` is one of
/// `""`, `"true"` or `"false"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSpec {
    pub id: String,
    pub label: String,
    pub options: Vec<ChoiceOption>,
    pub current: String,
}

impl ChoiceSpec {
    pub fn toggle(id: impl Into<String>, label: impl Into<String>, current: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            options: Vec::new(),
            current: current.into(),
        }
    }

    #[must_use]
    pub fn option(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push(ChoiceOption {
            id: id.into(),
            label: label.into(),
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

fn rule_type() -> ValueType {
    ValueType::Struct(vec![ValueType::U32, ValueType::Str])
}

fn filter_type() -> ValueType {
    ValueType::Struct(vec![ValueType::Str, ValueType::array_of(rule_type())])
}

fn pair_type() -> ValueType {
    ValueType::Struct(vec![ValueType::Str, ValueType::Str])
}

fn choice_type() -> ValueType {
    ValueType::Struct(vec![
        ValueType::Str,
        ValueType::Str,
        ValueType::array_of(pair_type()),
        ValueType::Str,
    ])
}

/// `a(sa(us))`
#[must_use]
pub fn filters_type() -> ValueType {
    ValueType::array_of(filter_type())
}

/// `a(ssa(ss)s)`
#[must_use]
pub fn choices_type() -> ValueType {
    ValueType::array_of(choice_type())
}

/// `a(ss)`: the backend's answer to the choices, as `(id, selected)` pairs.
#[must_use]
pub fn selected_choices_type() -> ValueType {
    ValueType::array_of(pair_type())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl FilterRule {
    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U32(self.kind.as_u32()),
            Value::Str(self.pattern.clone()),
        ])
    }
}

impl FilterSpec {
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::Str(self.name.clone()),
            Value::Array {
                element: rule_type(),
                items: self.rules.iter().map(FilterRule::to_value).collect(),
            },
        ])
    }
}

impl ChoiceSpec {
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::Str(self.id.clone()),
            Value::Str(self.label.clone()),
            Value::Array {
                element: pair_type(),
                items: self
                    .options
                    .iter()
                    .map(|o| Value::Struct(vec![Value::Str(o.id.clone()), Value::Str(o.label.clone())]))
                    .collect(),
            },
            Value::Str(self.current.clone()),
        ])
    }
}

/// Encodes filters as an `a(sa(us))` value.
#[must_use]
pub fn filters_value(filters: &[FilterSpec]) -> Value {
    Value::Array {
        element: filter_type(),
        items: filters.iter().map(FilterSpec::to_value).collect(),
    }
}

/// Encodes choices as an `a(ssa(ss)s)` value.
#[must_use]
pub fn choices_value(choices: &[ChoiceSpec]) -> Value {
    Value::Array {
        element: choice_type(),
        items: choices.iter().map(ChoiceSpec::to_value).collect(),
    }
}

// ---------------------------------------------------------------------------
// Shape decoding
// ---------------------------------------------------------------------------

/// Raw filter rule as found on the wire, before the kind is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawRule<'a> {
    pub kind: u32,
    pub pattern: &'a str,
}

/// Raw filter as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawFilter<'a> {
    pub name: &'a str,
    pub rules: Vec<RawRule<'a>>,
}

/// Raw choice as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawChoice<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub options: Vec<(&'a str, &'a str)>,
    pub current: &'a str,
}

fn str_pair(value: &Value) -> Option<(&str, &str)> {
    match value.as_fields()? {
        [a, b] => Some((a.as_str()?, b.as_str()?)),
        _ => None,
    }
}

pub(crate) fn decode_filter(value: &Value) -> Option<RawFilter<'_>> {
    let [name, rules] = value.as_fields()? else {
        return None;
    };
    let rules = rules
        .as_items()?
        .iter()
        .map(|rule| match rule.as_fields()? {
            [kind, pattern] => Some(RawRule {
                kind: kind.as_u32()?,
                pattern: pattern.as_str()?,
            }),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(RawFilter {
        name: name.as_str()?,
        rules,
    })
}

pub(crate) fn decode_choice(value: &Value) -> Option<RawChoice<'_>> {
    let [id, label, options, current] = value.as_fields()? else {
        return None;
    };
    let options = options
        .as_items()?
        .iter()
        .map(str_pair)
        .collect::<Option<Vec<_>>>()?;
    Some(RawChoice {
        id: id.as_str()?,
        label: label.as_str()?,
        options,
        current: current.as_str()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_encode_with_wire_signature() {
        let value = filters_value(&[FilterSpec::new("Text files").glob("*.txt")]);
        assert_eq!(value.signature(), "a(sa(us))");
        assert_eq!(value.value_type(), filters_type());
    }

    #[test]
    fn empty_filter_list_still_has_signature() {
        assert_eq!(filters_value(&[]).signature(), "a(sa(us))");
        assert_eq!(choices_value(&[]).signature(), "a(ssa(ss)s)");
    }

    #[test]
    fn choice_encodes_with_wire_signature() {
        let choice = ChoiceSpec::toggle("encoding", "Encoding", "utf8")
            .option("utf8", "Unicode (UTF-8)")
            .option("latin15", "Western");
        assert_eq!(choices_value(&[choice]).signature(), "a(ssa(ss)s)");
    }

    #[test]
    fn rule_kind_from_wire() {
        assert_eq!(RuleKind::try_from(0), Ok(RuleKind::Glob));
        assert_eq!(RuleKind::try_from(1), Ok(RuleKind::Mime));
        assert_eq!(RuleKind::try_from(7), Err(7));
    }

    #[test]
    fn decode_filter_reads_rules_in_order() {
        let spec = FilterSpec::new("Images").mime("image/png").glob("*.jpg");
        let value = spec.to_value();
        let raw = decode_filter(&value).unwrap();
        assert_eq!(raw.name, "Images");
        assert_eq!(
            raw.rules,
            vec![
                RawRule { kind: 1, pattern: "image/png" },
                RawRule { kind: 0, pattern: "*.jpg" },
            ]
        );
    }

    #[test]
    fn decode_choice_rejects_wrong_shape() {
        let not_a_choice = Value::Struct(vec![Value::from("id"), Value::from("label")]);
        assert!(decode_choice(&not_a_choice).is_none());
    }
}
