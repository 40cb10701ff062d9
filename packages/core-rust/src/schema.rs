//! Static option allow-lists and the projection that applies them.
//!
//! Projection is the only path by which client options reach the backend:
//! an entry survives only if its key is listed for the operation *and* its
//! runtime type signature matches the listed one exactly.

use tracing::debug;

use crate::value::VarDict;

/// One allow-listed option: key plus expected type signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionKey {
    pub key: &'static str,
    pub signature: &'static str,
}

impl OptionKey {
    const fn new(key: &'static str, signature: &'static str) -> Self {
        Self { key, signature }
    }
}

/// Options forwarded to the backend for `OpenFile`.
pub const OPEN_FILE_OPTIONS: &[OptionKey] = &[
    OptionKey::new("accept_label", "s"),
    OptionKey::new("modal", "b"),
    OptionKey::new("multiple", "b"),
    OptionKey::new("filters", "a(sa(us))"),
    OptionKey::new("choices", "a(ssa(ss)s)"),
];

/// Options forwarded to the backend for `SaveFile`.
pub const SAVE_FILE_OPTIONS: &[OptionKey] = &[
    OptionKey::new("accept_label", "s"),
    OptionKey::new("modal", "b"),
    OptionKey::new("filters", "a(sa(us))"),
    OptionKey::new("current_name", "s"),
    OptionKey::new("current_folder", "ay"),
    OptionKey::new("current_file", "ay"),
    OptionKey::new("choices", "a(ssa(ss)s)"),
];

/// Copies the allow-listed, correctly typed entries of `options`.
///
/// Unknown keys, known keys with the wrong type, and arrays holding items
/// of another type than declared are dropped without error. The output
/// never holds more entries than `schema`.
#[must_use]
pub fn project_options(options: &VarDict, schema: &[OptionKey]) -> VarDict {
    let mut projected = VarDict::new();

    for entry in schema {
        let Some(value) = options.get(entry.key) else {
            continue;
        };
        let found = value.signature();
        if found != entry.signature {
            debug!(
                key = entry.key,
                expected = entry.signature,
                found = %found,
                "dropping option with unexpected type"
            );
        } else if !value.is_well_typed() {
            debug!(key = entry.key, "dropping option with mistyped array items");
        } else {
            projected.insert(entry.key.to_string(), value.clone());
        }
    }

    for key in options.keys() {
        if !schema.iter().any(|entry| entry.key == key) {
            debug!(key = %key, "dropping unknown option");
        }
    }

    projected
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::options::{filters_value, FilterSpec};
    use crate::value::{Value, ValueType};

    fn dict(entries: Vec<(&str, Value)>) -> VarDict {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn keeps_allow_listed_entries_with_matching_types() {
        let options = dict(vec![
            ("accept_label", Value::from("_Open")),
            ("modal", Value::Bool(false)),
            ("multiple", Value::Bool(true)),
            ("filters", filters_value(&[FilterSpec::new("Text").glob("*.txt")])),
        ]);
        assert_eq!(project_options(&options, OPEN_FILE_OPTIONS), options);
    }

    #[test]
    fn drops_unknown_keys() {
        let options = dict(vec![
            ("modal", Value::Bool(true)),
            ("handle_token", Value::from("t1")),
            ("exec", Value::from("/bin/sh")),
        ]);
        let projected = project_options(&options, OPEN_FILE_OPTIONS);
        assert_eq!(projected, dict(vec![("modal", Value::Bool(true))]));
    }

    #[test]
    fn drops_known_keys_with_wrong_type() {
        let options = dict(vec![
            ("modal", Value::from("yes")),
            ("multiple", Value::U32(1)),
            ("accept_label", Value::from("Pick")),
        ]);
        let projected = project_options(&options, OPEN_FILE_OPTIONS);
        assert_eq!(projected, dict(vec![("accept_label", Value::from("Pick"))]));
    }

    #[test]
    fn multiple_is_not_a_save_option() {
        let options = dict(vec![("multiple", Value::Bool(true))]);
        assert!(project_options(&options, SAVE_FILE_OPTIONS).is_empty());
    }

    #[test]
    fn save_paths_must_be_byte_strings() {
        let options = dict(vec![
            ("current_folder", Value::byte_string(b"/home/user/Documents")),
            ("current_file", Value::from("/home/user/notes.txt")),
            ("current_name", Value::from("notes.txt")),
        ]);
        let projected = project_options(&options, SAVE_FILE_OPTIONS);
        assert!(projected.contains_key("current_folder"));
        assert!(projected.contains_key("current_name"));
        assert!(!projected.contains_key("current_file"));
    }

    #[test]
    fn mistyped_byte_string_is_never_forwarded() {
        let raw = r#"{"current_folder":{"Array":{"element":"Byte","items":[{"Str":"../../etc/shadow"}]}}}"#;
        assert!(serde_json::from_str::<VarDict>(raw).is_err());

        let options = dict(vec![
            (
                "current_folder",
                Value::Array {
                    element: ValueType::Byte,
                    items: vec![Value::from("../../etc/shadow")],
                },
            ),
            ("current_name", Value::from("notes.txt")),
        ]);
        let projected = project_options(&options, SAVE_FILE_OPTIONS);
        assert_eq!(projected, dict(vec![("current_name", Value::from("notes.txt"))]));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<u32>().prop_map(Value::U32),
            "[a-z]{0,6}".prop_map(Value::Str),
            any::<u8>().prop_map(Value::Byte),
        ];
        leaf.prop_recursive(2, 8, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Struct),
                prop::collection::vec(any::<u8>(), 0..4).prop_map(|b| Value::byte_string(&b)),
                prop::collection::vec("[a-z]{0,3}", 0..3).prop_map(|v: Vec<String>| Value::str_array(v)),
                inner.prop_map(|v| Value::Variant(Box::new(v))),
            ]
        })
    }

    fn arb_key() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(vec![
                "accept_label",
                "modal",
                "multiple",
                "filters",
                "choices",
                "current_name",
                "current_folder",
                "current_file",
            ])
            .prop_map(str::to_string),
            "[a-z_]{1,12}",
        ]
    }

    proptest! {
        #[test]
        fn projection_keeps_exactly_matching_entries(
            options in prop::collection::btree_map(arb_key(), arb_value(), 0..10),
            save in any::<bool>(),
        ) {
            let schema = if save { SAVE_FILE_OPTIONS } else { OPEN_FILE_OPTIONS };
            let projected = project_options(&options, schema);

            prop_assert!(projected.len() <= schema.len());
            for (key, value) in &options {
                let allowed = schema
                    .iter()
                    .any(|e| e.key == key && e.signature == value.signature());
                prop_assert_eq!(projected.get(key), allowed.then_some(value));
            }
            for key in projected.keys() {
                prop_assert!(options.contains_key(key));
            }
        }
    }

    #[test]
    fn schema_signatures_match_value_types() {
        let filters = crate::options::filters_type().to_string();
        let choices = crate::options::choices_type().to_string();
        let folder = ValueType::byte_string().to_string();
        for schema in [OPEN_FILE_OPTIONS, SAVE_FILE_OPTIONS] {
            for entry in schema {
                match entry.key {
                    "filters" => assert_eq!(entry.signature, filters),
                    "choices" => assert_eq!(entry.signature, choices),
                    "current_folder" | "current_file" => assert_eq!(entry.signature, folder),
                    _ => {}
                }
            }
        }
    }
}
