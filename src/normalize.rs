//! Converts untrusted upstream payloads into a [`NormalizedReport`].
//!
//! The upstream answers with loosely-typed JSON whose recognized shapes are:
//!
//! ```json
//! { "List": { "<db>": { "Data": [ { "Email": "..." }, "..." ] } } }
//! { "Error code": "<message>" }
//! ```
//!
//! Anything else must be tolerated. The checks run as an ordered decision
//! sequence; each later step assumes the earlier ones did not match:
//!
//! 1. top level is not an object → [`ReportError::Malformed`]
//! 2. `"Error code"` present → [`ReportError::UpstreamReported`]
//! 3. `"List"` missing or empty → [`ReportError::NoData`]
//! 4. walk `"List"` in upstream order, one [`DatabaseGroup`] per key
//!
//! A bad database or entry never aborts its siblings.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ReportError;
use crate::models::{DatabaseGroup, Entry, NormalizedReport, RawPayload};

/// Key carrying an upstream-side error message.
pub const ERROR_KEY: &str = "Error code";
/// Key carrying the per-database result map.
pub const LIST_KEY: &str = "List";
/// Key carrying a database's records.
pub const DATA_KEY: &str = "Data";

/// Fixed display-name substitutions, matched case-insensitively.
///
/// `1win` is a rebranded dataset name; every other key is shown verbatim.
pub const DATABASE_ALIASES: &[(&str, &str)] = &[("1win", "Smarty Sunny")];

/// Builds a report from a decoded payload.
pub fn normalize(payload: RawPayload) -> Result<NormalizedReport, ReportError> {
    let mut root = match payload {
        Value::Object(map) => map,
        _ => return Err(ReportError::Malformed),
    };

    if let Some(reported) = root.get(ERROR_KEY) {
        return Err(ReportError::UpstreamReported(error_text(reported)));
    }

    let list = match root.remove(LIST_KEY) {
        Some(Value::Object(list)) if !list.is_empty() => list,
        _ => return Err(ReportError::NoData),
    };

    let databases = list
        .into_iter()
        .map(|(key, content)| normalize_database(&key, content))
        .collect();

    Ok(NormalizedReport { databases })
}

/// Resolves the user-facing name of a database key.
pub fn display_name(key: &str) -> String {
    DATABASE_ALIASES
        .iter()
        .find(|(alias, _)| key.eq_ignore_ascii_case(alias))
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| key.to_string())
}

fn normalize_database(key: &str, content: Value) -> DatabaseGroup {
    let display_name = display_name(key);
    let entries = match data_list(content) {
        Some(items) => items.into_iter().map(Entry::from_value).collect(),
        None => {
            debug!(database = %key, "database has no usable Data list");
            Vec::new()
        }
    };
    DatabaseGroup {
        display_name,
        entries,
    }
}

/// Extracts a non-empty `"Data"` array, or `None` for every other shape.
fn data_list(content: Value) -> Option<Vec<Value>> {
    let mut content: Map<String, Value> = match content {
        Value::Object(map) => map,
        _ => return None,
    };
    match content.remove(DATA_KEY) {
        Some(Value::Array(items)) if !items.is_empty() => Some(items),
        _ => None,
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(report: &NormalizedReport) -> Vec<&str> {
        report
            .databases
            .iter()
            .map(|db| db.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert_eq!(normalize(json!([1, 2])), Err(ReportError::Malformed));
        assert_eq!(normalize(json!("text")), Err(ReportError::Malformed));
        assert_eq!(normalize(Value::Null), Err(ReportError::Malformed));
    }

    #[test]
    fn test_error_code_short_circuits() {
        let payload = json!({
            "Error code": "bad token",
            "List": {"db": {"Data": [{"a": 1}]}}
        });
        assert_eq!(
            normalize(payload),
            Err(ReportError::UpstreamReported("bad token".to_string()))
        );
    }

    #[test]
    fn test_error_code_non_string() {
        assert_eq!(
            normalize(json!({"Error code": 401})),
            Err(ReportError::UpstreamReported("401".to_string()))
        );
        assert_eq!(
            normalize(json!({"Error code": null})),
            Err(ReportError::UpstreamReported("null".to_string()))
        );
    }

    #[test]
    fn test_no_data_variants() {
        for payload in [
            json!({}),
            json!({"List": {}}),
            json!({"List": null}),
            json!({"List": []}),
            json!({"List": ""}),
            json!({"List": false}),
            json!({"List": [ {"db": 1} ]}),
            json!({"NumOfResults": 0}),
        ] {
            assert_eq!(normalize(payload.clone()), Err(ReportError::NoData), "{}", payload);
        }
    }

    #[test]
    fn test_preserves_database_order() {
        let payload: Value = serde_json::from_str(
            r#"{"List": {"zeta": {"Data": [1]}, "alpha": {"Data": [2]}, "mid": {"Data": [3]}}}"#,
        )
        .unwrap();
        let report = normalize(payload).unwrap();
        assert_eq!(names(&report), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_alias_is_case_insensitive() {
        for key in ["1win", "1WIN", "1Win", "1wIn"] {
            assert_eq!(display_name(key), "Smarty Sunny");
        }
        assert_eq!(display_name("1win2"), "1win2");
        assert_eq!(display_name("Facebook"), "Facebook");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn test_empty_data_shapes_yield_empty_groups() {
        let payload = json!({"List": {
            "empty": {"Data": []},
            "null": {"Data": null},
            "absent": {"InfoLeak": "x"},
            "string": {"Data": "oops"},
            "scalar": 42,
            "ok": {"Data": [{"Name": "Bob"}]}
        }});
        let report = normalize(payload).unwrap();
        assert_eq!(
            names(&report),
            vec!["empty", "null", "absent", "string", "scalar", "ok"]
        );
        for db in &report.databases[..5] {
            assert!(db.entries.is_empty(), "{} should be empty", db.display_name);
        }
        assert_eq!(report.databases[5].entries.len(), 1);
    }

    #[test]
    fn test_mixed_entries_are_coerced() {
        let payload = json!({"List": {"db": {"Data": [
            {"Email": "a@example.com"},
            "bare string",
            7,
            null,
            [1, 2]
        ]}}});
        let report = normalize(payload).unwrap();
        let entries = &report.databases[0].entries;
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].fields["Email"], json!("a@example.com"));
        assert_eq!(entries[1].fields["value"], json!("bare string"));
        assert_eq!(entries[2].fields["value"], json!(7));
        assert_eq!(entries[3].fields["value"], Value::Null);
        assert_eq!(entries[4].fields["value"], json!([1, 2]));
        assert_eq!(report.entry_count(), 5);
    }
}
