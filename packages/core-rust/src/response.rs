//! Terminal response delivered to the client when a request finishes.

use serde::{Deserialize, Serialize};

use crate::value::{Value, VarDict};

/// Outcome code carried by the `Response` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    /// The user made a selection.
    Success,
    /// The user dismissed the dialog.
    Cancelled,
    /// The interaction ended some other way, including backend failure.
    Other,
    /// A code outside the known set, passed through as the backend sent it.
    Unrecognized(u32),
}

impl ResponseCode {
    /// Maps a raw backend code. Unknown values are kept verbatim.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::Cancelled,
            2 => Self::Other,
            other => Self::Unrecognized(other),
        }
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Cancelled => 1,
            Self::Other => 2,
            Self::Unrecognized(raw) => raw,
        }
    }
}

/// Result set of a finished request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Sandbox-safe URIs, in the order the backend returned them.
    pub uris: Vec<String>,
    /// The backend's `choices` answer, copied through untouched.
    pub choices: Option<Value>,
}

impl ResponsePayload {
    /// Renders the payload as the `a{sv}` results dictionary.
    #[must_use]
    pub fn to_vardict(&self) -> VarDict {
        let mut results = VarDict::new();
        if let Some(choices) = &self.choices {
            results.insert("choices".to_string(), choices.clone());
        }
        results.insert("uris".to_string(), Value::str_array(self.uris.iter().cloned()));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_codes_round_trip_known_values() {
        for code in [ResponseCode::Success, ResponseCode::Cancelled, ResponseCode::Other] {
            assert_eq!(ResponseCode::from_raw(code.as_u32()), code);
        }
        assert_eq!(ResponseCode::from_raw(42), ResponseCode::Unrecognized(42));
        assert_eq!(ResponseCode::from_raw(42).as_u32(), 42);
    }

    #[test]
    fn empty_payload_still_carries_uris() {
        let results = ResponsePayload::default().to_vardict();
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("uris").map(Value::signature).as_deref(), Some("as"));
    }

    #[test]
    fn payload_serializes_to_json() {
        let payload = ResponsePayload {
            uris: vec!["file:///doc/1/a.txt".to_string()],
            choices: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["uris"][0], "file:///doc/1/a.txt");
        assert!(json["choices"].is_null());
    }
}
