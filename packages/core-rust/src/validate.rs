//! Validation of untrusted `filters` and `choices` options.
//!
//! Each check stops at the first bad entry. Error messages are built inside
//! out: the innermost check names the problem ("name is empty") and every
//! enclosing level prefixes its own context, giving messages such as
//! `invalid filters: invalid filter: name is empty`.

use crate::options::{
    choices_type, decode_choice, decode_filter, filters_type, ChoiceOption, ChoiceSpec,
    FilterRule, FilterSpec, RuleKind,
};
use crate::value::{Value, ValueType, VarDict};

/// Option key carrying filters.
pub const FILTERS_KEY: &str = "filters";
/// Option key carrying choices.
pub const CHOICES_KEY: &str = "choices";

/// Current-selection values allowed for a choice without sub-options.
const TOGGLE_STATES: [&str; 3] = ["", "true", "false"];

/// An invalid-argument condition raised while checking client options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Prepends `context: ` to the message.
    #[must_use]
    pub fn prefixed(self, context: &str) -> Self {
        Self {
            message: format!("{context}: {}", self.message),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn check_value_type(key: &str, value: &Value, expected: &ValueType) -> Result<(), ValidationError> {
    let found = value.value_type();
    if &found == expected {
        return Ok(());
    }
    Err(ValidationError::new(format!(
        "expected type for key {key} is {expected}, found {found}"
    )))
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn check_filter(value: &Value) -> Result<FilterSpec, ValidationError> {
    let raw = decode_filter(value).ok_or_else(|| ValidationError::new("malformed filter"))?;

    if raw.name.is_empty() {
        return Err(ValidationError::new("name is empty"));
    }
    if raw.rules.is_empty() {
        return Err(ValidationError::new("no filters"));
    }

    let mut rules = Vec::with_capacity(raw.rules.len());
    for rule in raw.rules {
        let kind = RuleKind::try_from(rule.kind)
            .map_err(|kind| ValidationError::new(format!("invalid filter type: {kind}")))?;
        if rule.pattern.is_empty() {
            return Err(ValidationError::new(match kind {
                RuleKind::Glob => "invalid glob pattern",
                RuleKind::Mime => "invalid content type",
            }));
        }
        rules.push(FilterRule {
            kind,
            pattern: rule.pattern.to_string(),
        });
    }

    Ok(FilterSpec {
        name: raw.name.to_string(),
        rules,
    })
}

/// Checks a `filters` value and returns the decoded filters.
///
/// # Errors
///
/// Returns `ValidationError` if the value is not `a(sa(us))`, the list is
/// empty, or any filter is invalid. Per-filter errors are prefixed with
/// `invalid filter`.
pub fn check_filters(value: &Value) -> Result<Vec<FilterSpec>, ValidationError> {
    check_value_type(FILTERS_KEY, value, &filters_type())?;

    let items = value.as_items().unwrap_or_default();
    if items.is_empty() {
        return Err(ValidationError::new("filter list is empty"));
    }

    items
        .iter()
        .map(|filter| check_filter(filter).map_err(|e| e.prefixed("invalid filter")))
        .collect()
}

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

fn check_choice(value: &Value) -> Result<ChoiceSpec, ValidationError> {
    let raw = decode_choice(value).ok_or_else(|| ValidationError::new("malformed choice"))?;

    if raw.id.is_empty() {
        return Err(ValidationError::new("id is empty"));
    }
    if raw.label.is_empty() {
        return Err(ValidationError::new("label is empty"));
    }

    let bad_current = || ValidationError::new(format!("bad current option: {}", raw.current));

    if raw.options.is_empty() {
        if !TOGGLE_STATES.contains(&raw.current) {
            return Err(bad_current());
        }
    } else {
        let mut seen_current = false;
        for (id, label) in &raw.options {
            if id.is_empty() {
                return Err(ValidationError::new("option id is empty"));
            }
            if label.is_empty() {
                return Err(ValidationError::new("option label is empty"));
            }
            seen_current |= *id == raw.current;
        }
        if !seen_current && !raw.current.is_empty() {
            return Err(bad_current());
        }
    }

    Ok(ChoiceSpec {
        id: raw.id.to_string(),
        label: raw.label.to_string(),
        options: raw
            .options
            .iter()
            .map(|(id, label)| ChoiceOption {
                id: (*id).to_string(),
                label: (*label).to_string(),
            })
            .collect(),
        current: raw.current.to_string(),
    })
}

/// Checks a `choices` value and returns the decoded choices.
///
/// An empty list is accepted.
///
/// # Errors
///
/// Returns `ValidationError` if the value is not `a(ssa(ss)s)` or any choice
/// is invalid. Per-choice errors are prefixed with `invalid choice`.
pub fn check_choices(value: &Value) -> Result<Vec<ChoiceSpec>, ValidationError> {
    check_value_type(CHOICES_KEY, value, &choices_type())?;

    value
        .as_items()
        .unwrap_or_default()
        .iter()
        .map(|choice| check_choice(choice).map_err(|e| e.prefixed("invalid choice")))
        .collect()
}

/// Checks the `filters` and `choices` entries of a client option bag.
///
/// Absent keys are not an error.
///
/// # Errors
///
/// Returns the first `ValidationError`, prefixed with `invalid filters` or
/// `invalid choices`.
pub fn validate_options(options: &VarDict) -> Result<(), ValidationError> {
    if let Some(filters) = options.get(FILTERS_KEY) {
        check_filters(filters).map_err(|e| e.prefixed("invalid filters"))?;
    }
    if let Some(choices) = options.get(CHOICES_KEY) {
        check_choices(choices).map_err(|e| e.prefixed("invalid choices"))?;
    }
    Ok(())
}
