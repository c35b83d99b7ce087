//! Shared deterministic types for extraction logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.
//!
//! Upstream documents are untrusted: a field of the wrong shape (including
//! `null`) is read as absent instead of rejecting the whole document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One unit of upstream output, tagged with the producing role's free-text name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledFragment {
    /// Free-text name of the role that produced the fragment.
    #[serde(rename = "agent", default, deserialize_with = "lenient_or_default")]
    pub role_label: String,
    /// Raw generator output.
    #[serde(rename = "raw", default, deserialize_with = "lenient_or_default")]
    pub raw_text: String,
    /// Already-structured output, when the generator produced one.
    #[serde(
        rename = "json_dict",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured: Option<Map<String, Value>>,
}

impl LabeledFragment {
    pub fn new(role_label: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            role_label: role_label.into(),
            raw_text: raw_text.into(),
            structured: None,
        }
    }
}

/// Upstream generation roles whose payloads the pipeline recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    HighLevelDesign,
    DetailedDesign,
    CodeStructure,
    DeliveryPlan,
}

impl Role {
    /// Evaluation order used when assigning a label to a role.
    pub const ORDERED: [Role; 4] = [
        Role::HighLevelDesign,
        Role::DetailedDesign,
        Role::CodeStructure,
        Role::DeliveryPlan,
    ];

    /// Lowercase label keywords; any substring hit assigns the role.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Role::HighLevelDesign => &["high-level design", "hld"],
            Role::DetailedDesign => &["detailed design", "dd"],
            Role::CodeStructure => &["code structure", "architect", "structure"],
            Role::DeliveryPlan => &[
                "jira",
                "delivery planner",
                "project organizer",
                "epic",
                "story",
            ],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::HighLevelDesign => "hld",
            Role::DetailedDesign => "dd",
            Role::CodeStructure => "code_structure",
            Role::DeliveryPlan => "jira",
        }
    }
}

/// Output of an upstream planning run, as handed to metadata extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningRun {
    /// Run-level status reported by the orchestrator (e.g. `success`).
    #[serde(deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub config: Option<RunConfig>,
    /// One fragment per generation task, in execution order. Entries that are
    /// not objects are skipped.
    #[serde(deserialize_with = "lenient_items")]
    pub tasks_output: Vec<LabeledFragment>,
}

impl PlanningRun {
    pub fn app_name(&self) -> Option<&str> {
        self.config.as_ref()?.app_name.as_deref()
    }
}

/// The subset of run configuration the extractor reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    #[serde(deserialize_with = "lenient")]
    pub app_name: Option<String>,
}

/// Deserialize `T`, reading a value of the wrong shape as `None`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Like [`lenient`], falling back to `T::default()`.
pub(crate) fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// A list whose unreadable entries are dropped; anything but a list is empty.
pub(crate) fn lenient_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Vec<Value> = lenient_or_default(deserializer)?;
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fields_read_as_empty() {
        let run: PlanningRun = serde_json::from_str(
            r#"{"status": null, "config": {"app_name": null}, "tasks_output": [
                {"agent": null, "raw": "x"},
                {"agent": "Jira", "raw": null, "json_dict": null}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(run.status, None);
        assert_eq!(run.app_name(), None);
        assert_eq!(run.tasks_output[0], LabeledFragment::new("", "x"));
        assert_eq!(run.tasks_output[1], LabeledFragment::new("Jira", ""));
    }

    #[test]
    fn non_object_structured_output_is_ignored() {
        let fragment: LabeledFragment =
            serde_json::from_str(r#"{"agent": "HLD", "raw": "{}", "json_dict": "oops"}"#)
                .expect("parse");
        assert_eq!(fragment.structured, None);

        let fragment: LabeledFragment =
            serde_json::from_str(r#"{"agent": "HLD", "json_dict": {"hl_doc_id": "h1"}}"#)
                .expect("parse");
        assert!(fragment.structured.is_some());
    }

    #[test]
    fn misshapen_sections_are_dropped() {
        let run: PlanningRun = serde_json::from_str(
            r#"{"status": 7, "config": "none", "tasks_output": ["text", {"agent": "DD", "raw": 3}]}"#,
        )
        .expect("parse");
        assert_eq!(run.status, None);
        assert_eq!(run.config, None);
        assert_eq!(run.tasks_output, vec![LabeledFragment::new("DD", "")]);

        let run: PlanningRun = serde_json::from_str(r#"{"tasks_output": null}"#).expect("parse");
        assert!(run.tasks_output.is_empty());
    }
}
