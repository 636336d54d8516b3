//! Run description documents.
//!
//! Every run row stores a JSON description of the form
//!
//! ```json
//! {"version": 0, "interdependencies": {"paramspecs": [...]}}
//! ```
//!
//! The `interdependencies` entry describes how the run's parameters depend on
//! each other. It is opaque here: it is copied verbatim (key order preserved),
//! never interpreted.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppResult, DaqError};

/// Description version written for documents that carry no version of their own.
pub const DEFAULT_DESCRIPTION_VERSION: i64 = 0;

/// Parsed run description.
///
/// Field order is the serialization order: `version` always comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescription {
    /// Description schema tag
    pub version: i64,
    /// Serialized parameter dependency set
    pub interdependencies: Value,
}

impl RunDescription {
    /// Description of a run without any recorded parameters.
    pub fn empty() -> Self {
        Self {
            version: DEFAULT_DESCRIPTION_VERSION,
            interdependencies: empty_interdependencies(),
        }
    }
}

/// Serialization of an empty dependency set.
pub fn empty_interdependencies() -> Value {
    serde_json::json!({ "paramspecs": [] })
}

/// Decode a raw description column value.
///
/// `None` (a NULL column on legacy rows) decodes to [`RunDescription::empty`].
pub fn decode(raw: Option<&str>) -> AppResult<RunDescription> {
    let Some(raw) = raw else {
        return Ok(RunDescription::empty());
    };

    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| DaqError::MalformedDocument(format!("invalid JSON: {e}")))?;
    let Value::Object(mut fields) = parsed else {
        return Err(DaqError::MalformedDocument(
            "description is not a JSON object".to_string(),
        ));
    };

    let interdependencies = fields.remove("interdependencies").ok_or_else(|| {
        DaqError::MalformedDocument("missing 'interdependencies' entry".to_string())
    })?;

    // A version that is not an integer carries no progression information.
    let version = match fields.get("version") {
        None => DEFAULT_DESCRIPTION_VERSION,
        Some(v) => v.as_i64().unwrap_or_else(|| {
            debug!("ignoring non-integer description version {}", v);
            DEFAULT_DESCRIPTION_VERSION
        }),
    };

    Ok(RunDescription {
        version,
        interdependencies,
    })
}

/// Encode a description, `version` first.
pub fn encode(description: &RunDescription) -> AppResult<String> {
    Ok(serde_json::to_string(description)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_none_gives_empty_document() {
        let desc = decode(None).unwrap();
        assert_eq!(desc.version, 0);
        assert_eq!(
            encode(&desc).unwrap(),
            r#"{"version":0,"interdependencies":{"paramspecs":[]}}"#
        );
    }

    #[test]
    fn test_version_becomes_first_key() {
        let raw = r#"{"interdependencies":{"paramspecs":[{"name":"x"}]},"extra":1}"#;
        let encoded = encode(&decode(Some(raw)).unwrap()).unwrap();
        assert_eq!(
            encoded,
            r#"{"version":0,"interdependencies":{"paramspecs":[{"name":"x"}]}}"#
        );
    }

    #[test]
    fn test_interdependencies_key_order_is_preserved() {
        let raw = r#"{"interdependencies":{"zeta":1,"alpha":{"b":2,"a":1}}}"#;
        let encoded = encode(&decode(Some(raw)).unwrap()).unwrap();
        assert_eq!(
            encoded,
            r#"{"version":0,"interdependencies":{"zeta":1,"alpha":{"b":2,"a":1}}}"#
        );
    }

    #[test]
    fn test_existing_version_is_kept() {
        let raw = r#"{"interdependencies":{"paramspecs":[]},"version":1}"#;
        assert_eq!(decode(Some(raw)).unwrap().version, 1);
    }

    #[test]
    fn test_non_integer_version_falls_back_to_default() {
        for raw in [
            r#"{"version":"1","interdependencies":{"paramspecs":[]}}"#,
            r#"{"version":1.0,"interdependencies":{"paramspecs":[]}}"#,
            r#"{"version":null,"interdependencies":{"paramspecs":[]}}"#,
        ] {
            let desc = decode(Some(raw)).unwrap();
            assert_eq!(
                encode(&desc).unwrap(),
                r#"{"version":0,"interdependencies":{"paramspecs":[]}}"#
            );
        }
    }

    #[test]
    fn test_missing_interdependencies_is_malformed() {
        let err = decode(Some(r#"{"version":0}"#)).unwrap_err();
        assert!(matches!(err, DaqError::MalformedDocument(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            decode(Some("{not json")),
            Err(DaqError::MalformedDocument(_))
        ));
        assert!(matches!(
            decode(Some("[1, 2]")),
            Err(DaqError::MalformedDocument(_))
        ));
    }
}
