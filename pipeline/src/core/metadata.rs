//! Assembly of the planning metadata document.
//!
//! Each role contributes an optional sub-object. A sub-object may carry its own
//! `error` describing a partial recovery; that never changes the run status.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::classifier::select_role;
use crate::core::enrich::{
    EPICS_CREATED_COUNT, IMPLEMENTATION_PLAN, IMPLEMENTATION_PLAN_STR, JIRA_PROJECT_KEY,
    STORIES_CREATED_COUNT, clean_code_structure, code_structure_from_fragments, enrich,
    has_code_structure_fields, resolve_fragment_payload,
};
use crate::core::types::{LabeledFragment, PlanningRun, Role};

/// Persisted summary of a planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningMetadata {
    pub status: Option<String>,
    pub app_name: Option<String>,
    /// RFC 3339 timestamp of extraction.
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hld: Option<HldRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dd: Option<DdRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_structure: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira: Option<DeliveryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HldRecord {
    pub folder_id: Option<String>,
    pub folder_name: Option<String>,
    pub hl_doc_id: Option<String>,
    pub hl_doc_name: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdRecord {
    pub detailed_doc_id: Option<String>,
    pub detailed_doc_name: Option<String>,
    pub folder_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub jira_project_key: Option<String>,
    #[serde(default)]
    pub implementation_plan: Vec<String>,
    pub implementation_plan_str: Option<String>,
    pub epics_created_count: Option<u64>,
    pub stories_created_count: Option<u64>,
    pub error: Option<String>,
}

/// Build the metadata document for `run`, stamped with `now`.
pub fn build_metadata(run: &PlanningRun, now: DateTime<Utc>) -> PlanningMetadata {
    let fragments = run.tasks_output.as_slice();
    PlanningMetadata {
        status: run.status.clone(),
        app_name: run.app_name().map(str::to_string),
        last_updated: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        hld: hld_record(fragments),
        dd: dd_record(fragments),
        code_structure: code_structure_record(fragments),
        jira: delivery_record(fragments),
    }
}

fn role_payload(fragments: &[LabeledFragment], role: Role) -> Option<Map<String, Value>> {
    let fragment = select_role(fragments, role)?;
    debug!(role = role.label(), label = %fragment.role_label, "selected fragment");
    Some(resolve_fragment_payload(fragment))
}

fn hld_record(fragments: &[LabeledFragment]) -> Option<HldRecord> {
    let payload = role_payload(fragments, Role::HighLevelDesign).filter(|p| !p.is_empty())?;
    Some(HldRecord {
        folder_id: text_field(&payload, "folder_id"),
        folder_name: text_field(&payload, "folder_name"),
        hl_doc_id: text_field(&payload, "hl_doc_id"),
        hl_doc_name: text_field(&payload, "hl_doc_name"),
        error: text_field(&payload, "error"),
    })
}

fn dd_record(fragments: &[LabeledFragment]) -> Option<DdRecord> {
    let payload = role_payload(fragments, Role::DetailedDesign)?;
    if !payload.contains_key("detailed_doc_id") && !payload.contains_key("error") {
        return None;
    }
    Some(DdRecord {
        detailed_doc_id: text_field(&payload, "detailed_doc_id"),
        detailed_doc_name: text_field(&payload, "detailed_doc_name"),
        folder_id: text_field(&payload, "folder_id"),
        error: text_field(&payload, "error"),
    })
}

fn code_structure_record(fragments: &[LabeledFragment]) -> Option<Map<String, Value>> {
    let payload = role_payload(fragments, Role::CodeStructure).unwrap_or_default();
    if has_code_structure_fields(&payload) {
        let cleaned = clean_code_structure(&payload);
        return (!cleaned.is_empty()).then_some(cleaned);
    }
    code_structure_from_fragments(fragments)
}

fn delivery_record(fragments: &[LabeledFragment]) -> Option<DeliveryRecord> {
    let fragment = select_role(fragments, Role::DeliveryPlan)?;
    let payload = resolve_fragment_payload(fragment);
    if payload.is_empty() {
        return None;
    }

    let enriched = enrich(Role::DeliveryPlan, payload, &fragment.raw_text).payload;
    let relevant = [
        JIRA_PROJECT_KEY,
        IMPLEMENTATION_PLAN,
        IMPLEMENTATION_PLAN_STR,
        EPICS_CREATED_COUNT,
        STORIES_CREATED_COUNT,
        "error",
    ];
    if !relevant.iter().any(|key| enriched.contains_key(*key)) {
        return None;
    }

    Some(DeliveryRecord {
        jira_project_key: text_field(&enriched, JIRA_PROJECT_KEY),
        implementation_plan: enriched
            .get(IMPLEMENTATION_PLAN)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(value_text).collect())
            .unwrap_or_default(),
        implementation_plan_str: text_field(&enriched, IMPLEMENTATION_PLAN_STR),
        epics_created_count: enriched.get(EPICS_CREATED_COUNT).and_then(Value::as_u64),
        stories_created_count: enriched.get(STORIES_CREATED_COUNT).and_then(Value::as_u64),
        error: text_field(&enriched, "error"),
    })
}

fn text_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(value_text)
}

/// Render a JSON value as text; `null` has no text.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
