//! Post-hoc recovery of missing payload fields.
//!
//! Role payloads recovered by [`parse_payload`] are often sparse: generators
//! truncate, wrap the answer in an outer explanation, or emit a list where an
//! object was expected. Enrichment re-reads the raw text with narrower
//! strategies and fills only what is missing. Nothing here fails; fields that
//! cannot be recovered are left absent and noted.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::fence::last_fenced_block;
use crate::core::payload::{
    EXCERPT_CHARS, ExtractedPayload, head_chars, parse_object, parse_payload,
};
use crate::core::scanner::balanced_spans;
use crate::core::types::{LabeledFragment, Role};

pub const IMPLEMENTATION_PLAN: &str = "implementation_plan";
pub const IMPLEMENTATION_PLAN_STR: &str = "implementation_plan_str";
pub const JIRA_PROJECT_KEY: &str = "jira_project_key";
pub const EPICS_CREATED_COUNT: &str = "epics_created_count";
pub const STORIES_CREATED_COUNT: &str = "stories_created_count";

const DELIVERY_FIELDS: [&str; 4] = [
    IMPLEMENTATION_PLAN,
    JIRA_PROJECT_KEY,
    EPICS_CREATED_COUNT,
    STORIES_CREATED_COUNT,
];

/// Keys that make a payload look like a code-structure answer.
pub const CODE_STRUCTURE_FIELDS: [&str; 5] = ["root", "tree", "files", "assumptions", "error"];

const CODE_STRUCTURE_INDICATORS: [&str; 5] = ["app_name", "root", "tree", "files", "assumptions"];
const RAW_CONTENT_CHARS: usize = 1000;

static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:[^"\\]|\\.)*""#).expect("string literal regex"));

/// Payload after enrichment, with notes on what could not be recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub payload: Map<String, Value>,
    pub notes: Vec<String>,
}

/// A list-valued field recovered by text search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListExtraction {
    /// Every quoted string literal inside the array.
    Items(Vec<String>),
    /// The raw inner span, when it held no quoted strings.
    Raw(String),
}

/// Turn a fragment into an object payload for its role.
///
/// Structured output wins when present. Otherwise the raw text is parsed; a
/// recovered array yields its last object, and failures become an object with
/// an `error` and a `raw_excerpt` so partial results stay representable.
pub fn resolve_fragment_payload(fragment: &LabeledFragment) -> Map<String, Value> {
    if let Some(structured) = fragment.structured.as_ref().filter(|map| !map.is_empty()) {
        return structured.clone();
    }

    match parse_payload(&fragment.raw_text) {
        ExtractedPayload::Object(map) => map,
        ExtractedPayload::Array(items) => items
            .into_iter()
            .rev()
            .find_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_else(|| error_payload("Parsed list without dicts")),
        ExtractedPayload::Failure(failure) => {
            let mut map =
                error_payload(&format!("Could not parse task JSON: {}", failure.reason));
            map.insert(
                "raw_excerpt".to_string(),
                Value::String(head_chars(&fragment.raw_text, EXCERPT_CHARS).to_string()),
            );
            map
        }
    }
}

/// Fill missing required fields of `payload` for `role` from `raw`.
///
/// Only the delivery plan has required fields; other roles pass through.
pub fn enrich(role: Role, payload: Map<String, Value>, raw: &str) -> Enrichment {
    match role {
        Role::DeliveryPlan => enrich_delivery_plan(payload, raw),
        _ => Enrichment {
            payload,
            notes: Vec::new(),
        },
    }
}

/// Recover delivery-plan fields from the raw planner output.
///
/// Tactics escalate: merge the last object found in `raw`, then search for
/// the plan array by name, then search for the scalar fields by name.
pub fn enrich_delivery_plan(mut payload: Map<String, Value>, raw: &str) -> Enrichment {
    let mut notes = Vec::new();

    let has_delivery_field = DELIVERY_FIELDS.iter().any(|key| payload.contains_key(*key));
    if has_delivery_field && is_present(&payload, IMPLEMENTATION_PLAN) {
        return Enrichment { payload, notes };
    }
    if raw.trim().is_empty() {
        notes.push("no raw text to enrich from".to_string());
        return Enrichment { payload, notes };
    }

    if let Some(fresh) = last_object_text(raw).and_then(parse_object) {
        merge_fresh(&mut payload, fresh);
    }

    if !is_present(&payload, IMPLEMENTATION_PLAN) {
        match extract_string_list(raw, IMPLEMENTATION_PLAN) {
            Some(ListExtraction::Items(items)) => {
                payload.insert(
                    IMPLEMENTATION_PLAN.to_string(),
                    Value::Array(items.into_iter().map(Value::String).collect()),
                );
            }
            Some(ListExtraction::Raw(inner)) => {
                payload.insert(IMPLEMENTATION_PLAN_STR.to_string(), Value::String(inner));
            }
            None => notes.push(format!("{IMPLEMENTATION_PLAN} not found")),
        }
    }

    if !is_present(&payload, JIRA_PROJECT_KEY) {
        match quoted_field(raw, JIRA_PROJECT_KEY) {
            Some(key) => {
                payload.insert(JIRA_PROJECT_KEY.to_string(), Value::String(key));
            }
            None => notes.push(format!("{JIRA_PROJECT_KEY} not found")),
        }
    }

    for field in [EPICS_CREATED_COUNT, STORIES_CREATED_COUNT] {
        if payload.get(field).is_some_and(|value| !value.is_null()) {
            continue;
        }
        match integer_field(raw, field) {
            Some(count) => {
                payload.insert(field.to_string(), Value::from(count));
            }
            None => notes.push(format!("{field} not found")),
        }
    }

    let recovered = [
        IMPLEMENTATION_PLAN,
        IMPLEMENTATION_PLAN_STR,
        JIRA_PROJECT_KEY,
        EPICS_CREATED_COUNT,
        STORIES_CREATED_COUNT,
    ]
    .iter()
    .any(|key| is_present(&payload, key));
    if !recovered {
        payload
            .entry("error")
            .or_insert_with(|| Value::String("Could not extract Jira payload".to_string()));
    }

    for note in &notes {
        debug!(note = %note, "delivery plan enrichment");
    }
    Enrichment { payload, notes }
}

/// Merge `fresh` into `existing`.
///
/// Non-empty existing values are kept. Non-empty fresh values replace empty or
/// missing ones, and empty fresh values only fill keys that are missing.
pub fn merge_fresh(existing: &mut Map<String, Value>, fresh: Map<String, Value>) {
    for (key, value) in fresh {
        match existing.get(&key) {
            Some(current) if !is_empty_value(current) => {}
            Some(_) if is_empty_value(&value) => {}
            _ => {
                existing.insert(key, value);
            }
        }
    }
}

/// Locate `"field": [ ... ]` in `raw` and pull its string elements.
pub fn extract_string_list(raw: &str, field: &str) -> Option<ListExtraction> {
    let pattern = format!(r#"(?i)"{}"\s*:\s*\["#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    let found = re.find(raw)?;
    let rest = &raw[found.end() - 1..];

    let inner = match balanced_spans(rest, '[', ']').next() {
        Some(span) => &span.text[1..span.text.len() - 1],
        None => {
            let close = rest[1..].find(']')?;
            &rest[1..=close]
        }
    };

    let items: Vec<String> = STRING_LITERAL_RE
        .find_iter(inner)
        .map(|literal| decode_literal(literal.as_str()))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if !items.is_empty() {
        return Some(ListExtraction::Items(items));
    }

    let inner = inner.trim();
    (!inner.is_empty()).then(|| ListExtraction::Raw(inner.to_string()))
}

/// Recover a code-structure payload from any fragment's raw text.
///
/// Used when the code-structure role produced nothing usable. Returns a
/// normalized payload, an error record holding the raw content when indicators
/// exist but nothing parses, or `None` when no fragment mentions the fields.
pub fn code_structure_from_fragments(fragments: &[LabeledFragment]) -> Option<Map<String, Value>> {
    for fragment in fragments {
        let raw = &fragment.raw_text;
        let folded = raw.to_lowercase();
        if !CODE_STRUCTURE_INDICATORS
            .iter()
            .any(|indicator| folded.contains(indicator))
        {
            continue;
        }

        if let ExtractedPayload::Object(parsed) = parse_payload(raw) {
            if looks_like_code_structure(&parsed) {
                return Some(normalize_code_structure(&parsed));
            }
        }

        if raw.contains("app_name") && raw.contains("tree") {
            let spans: Vec<_> = balanced_spans(raw, '{', '}').collect();
            let recovered = spans
                .iter()
                .rev()
                .filter_map(|span| parse_object(span.text))
                .find(looks_like_code_structure);
            if let Some(parsed) = recovered {
                return Some(normalize_code_structure(&parsed));
            }

            let mut record = error_payload("Could not parse JSON, saved raw content");
            record.insert(
                "raw_content".to_string(),
                Value::String(head_chars(raw, RAW_CONTENT_CHARS).to_string()),
            );
            record.insert(
                "raw_source".to_string(),
                Value::String("fallback_raw".to_string()),
            );
            return Some(record);
        }
    }
    None
}

/// Keep only the non-empty code-structure fields, unescaping the `tree` text.
pub fn clean_code_structure(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();
    for key in ["app_name", "root", "tree", "files", "assumptions", "error"] {
        let Some(value) = payload.get(key) else {
            continue;
        };
        if is_empty_value(value) {
            continue;
        }
        cleaned.insert(key.to_string(), unescape_tree(key, value));
    }
    cleaned
}

pub fn has_code_structure_fields(payload: &Map<String, Value>) -> bool {
    CODE_STRUCTURE_FIELDS
        .iter()
        .any(|key| payload.contains_key(*key))
}

/// Whether `value` counts as empty for merge and presence checks.
///
/// `null`, `""`, `[]` and `{}` are empty. Numbers and booleans never are, so a
/// count of zero is a real answer.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn is_present(payload: &Map<String, Value>, key: &str) -> bool {
    payload.get(key).is_some_and(|value| !is_empty_value(value))
}

fn error_payload(message: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("error".to_string(), Value::String(message.to_string()));
    map
}

/// Text of the last fenced block, else of the last balanced `{}` span.
fn last_object_text(raw: &str) -> Option<&str> {
    let text = raw.trim();
    if let Some(block) = last_fenced_block(text) {
        return Some(block);
    }
    balanced_spans(text, '{', '}').last().map(|span| span.text.trim())
}

fn quoted_field(raw: &str, field: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*"([^"]+)""#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().to_string())
}

fn integer_field(raw: &str, field: &str) -> Option<u64> {
    let pattern = format!(r#""{}"\s*:\s*(\d+)"#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|value| value.as_str().parse().ok())
}

fn decode_literal(literal: &str) -> String {
    serde_json::from_str::<String>(literal)
        .unwrap_or_else(|_| literal[1..literal.len() - 1].to_string())
}

fn looks_like_code_structure(payload: &Map<String, Value>) -> bool {
    CODE_STRUCTURE_INDICATORS
        .iter()
        .any(|key| payload.contains_key(*key))
}

fn normalize_code_structure(parsed: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = clean_code_structure(parsed);
    for key in ["files", "assumptions"] {
        normalized
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
    }
    normalized
}

fn unescape_tree(key: &str, value: &Value) -> Value {
    match value {
        Value::String(tree) if key == "tree" => Value::String(tree.replace("\\n", "\n")),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn plan_is_recovered_from_prose() {
        let raw = r#"I created the epics. "implementation_plan": ["step1","step2"] and that's it."#;
        let enriched = enrich(Role::DeliveryPlan, Map::new(), raw);
        assert_eq!(
            enriched.payload.get(IMPLEMENTATION_PLAN),
            Some(&json!(["step1", "step2"]))
        );
    }

    #[test]
    fn complete_payload_is_left_alone() {
        let payload = map(json!({"implementation_plan": ["a"], "jira_project_key": "K"}));
        let enriched = enrich_delivery_plan(payload.clone(), "{\"jira_project_key\": \"OTHER\"}");
        assert_eq!(enriched.payload, payload);
        assert!(enriched.notes.is_empty());
    }

    #[test]
    fn missing_plan_is_noted_not_raised() {
        let raw = "Done!\n```json\n{\"jira_project_key\":\"ABC\",\"epics_created_count\":2}\n```";
        let payload = map(json!({"jira_project_key": "ABC", "epics_created_count": 2}));
        let enriched = enrich_delivery_plan(payload, raw);
        assert!(!enriched.payload.contains_key(IMPLEMENTATION_PLAN));
        assert!(!enriched.payload.contains_key("error"));
        assert!(
            enriched
                .notes
                .contains(&"implementation_plan not found".to_string())
        );
    }

    #[test]
    fn fresh_object_fills_empty_fields_only() {
        let payload = map(json!({"jira_project_key": "KEEP", "implementation_plan": []}));
        let raw = r#"{"jira_project_key": "NEW", "implementation_plan": ["x"], "stories_created_count": 3}"#;
        let enriched = enrich_delivery_plan(payload, raw);
        assert_eq!(enriched.payload.get(JIRA_PROJECT_KEY), Some(&json!("KEEP")));
        assert_eq!(
            enriched.payload.get(IMPLEMENTATION_PLAN),
            Some(&json!(["x"]))
        );
        assert_eq!(
            enriched.payload.get(STORIES_CREATED_COUNT),
            Some(&json!(3))
        );
    }

    #[test]
    fn plan_without_strings_is_kept_as_text() {
        let raw = r#"broken output "implementation_plan": [ step one, step two ] "#;
        let enriched = enrich_delivery_plan(Map::new(), raw);
        assert!(!enriched.payload.contains_key(IMPLEMENTATION_PLAN));
        assert_eq!(
            enriched.payload.get(IMPLEMENTATION_PLAN_STR),
            Some(&json!("step one, step two"))
        );
    }

    #[test]
    fn scalar_fields_are_recovered_by_name() {
        let raw = r#"truncated: {"jira_project_key": "WOR", "epics_created_count": 1, "stories_created_count": 4"#;
        let enriched = enrich_delivery_plan(map(json!({"error": "Parsed list without dicts"})), raw);
        assert_eq!(enriched.payload.get(JIRA_PROJECT_KEY), Some(&json!("WOR")));
        assert_eq!(enriched.payload.get(EPICS_CREATED_COUNT), Some(&json!(1)));
        assert_eq!(enriched.payload.get(STORIES_CREATED_COUNT), Some(&json!(4)));
    }

    #[test]
    fn nothing_recovered_sets_error() {
        let enriched = enrich_delivery_plan(Map::new(), "the planner gave up");
        assert_eq!(
            enriched.payload.get("error"),
            Some(&json!("Could not extract Jira payload"))
        );
    }

    #[test]
    fn other_roles_pass_through() {
        let payload = map(json!({"hl_doc_id": "1"}));
        let enriched = enrich(Role::HighLevelDesign, payload.clone(), "anything");
        assert_eq!(enriched.payload, payload);
    }

    #[test]
    fn string_list_honors_brackets_inside_strings() {
        let raw = r#""implementation_plan": ["wire [api]", "ship \"v1\""]"#;
        assert_eq!(
            extract_string_list(raw, IMPLEMENTATION_PLAN),
            Some(ListExtraction::Items(vec![
                "wire [api]".to_string(),
                "ship \"v1\"".to_string()
            ]))
        );
    }

    #[test]
    fn string_list_survives_unclosed_outer_text() {
        let raw = r#"{"implementation_plan": ["a", "b"], "note": "oops"#;
        assert_eq!(
            extract_string_list(raw, IMPLEMENTATION_PLAN),
            Some(ListExtraction::Items(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn merge_keeps_existing_non_empty_values() {
        let mut existing = map(json!({"a": "keep", "b": "", "c": null}));
        merge_fresh(&mut existing, map(json!({"a": "new", "b": "fill", "c": "", "d": []})));
        assert_eq!(
            existing,
            map(json!({"a": "keep", "b": "fill", "c": null, "d": []}))
        );
    }

    #[test]
    fn fragment_list_payload_yields_last_object() {
        let fragment = LabeledFragment::new("Jira", "```json\n[{\"a\": 1}, \"x\", {\"b\": 2}]\n```");
        assert_eq!(resolve_fragment_payload(&fragment), map(json!({"b": 2})));
    }

    #[test]
    fn fragment_list_without_objects_is_an_error_payload() {
        let fragment = LabeledFragment::new("Jira", r#"["one", "two"]"#);
        assert_eq!(
            resolve_fragment_payload(&fragment),
            map(json!({"error": "Parsed list without dicts"}))
        );
    }

    #[test]
    fn fragment_structured_output_wins() {
        let mut fragment = LabeledFragment::new("HLD", "{\"hl_doc_id\": \"raw\"}");
        fragment.structured = Some(map(json!({"hl_doc_id": "structured"})));
        assert_eq!(
            resolve_fragment_payload(&fragment),
            map(json!({"hl_doc_id": "structured"}))
        );
    }

    #[test]
    fn fragment_parse_failure_keeps_excerpt() {
        let fragment = LabeledFragment::new("HLD", "no json at all");
        let payload = resolve_fragment_payload(&fragment);
        assert!(
            payload
                .get("error")
                .and_then(Value::as_str)
                .is_some_and(|err| err.starts_with("Could not parse task JSON"))
        );
        assert_eq!(payload.get("raw_excerpt"), Some(&json!("no json at all")));
    }

    #[test]
    fn code_structure_recovered_from_any_fragment() {
        let fragments = vec![
            LabeledFragment::new("Copy Editor", "nothing relevant"),
            LabeledFragment::new(
                "Reviewer",
                r#"{"app_name": "App", "root": "App", "tree": "App/\\nREADME.md"}"#,
            ),
        ];
        let recovered = code_structure_from_fragments(&fragments).expect("recovered");
        assert_eq!(recovered.get("tree"), Some(&json!("App/\nREADME.md")));
        assert_eq!(recovered.get("files"), Some(&json!([])));
        assert_eq!(recovered.get("assumptions"), Some(&json!([])));
    }

    #[test]
    fn code_structure_unparseable_keeps_raw_content() {
        let fragments = vec![LabeledFragment::new(
            "Reviewer",
            "app_name: App, tree: App/ (not json)",
        )];
        let recovered = code_structure_from_fragments(&fragments).expect("recovered");
        assert_eq!(
            recovered.get("error"),
            Some(&json!("Could not parse JSON, saved raw content"))
        );
        assert_eq!(recovered.get("raw_source"), Some(&json!("fallback_raw")));
    }

    #[test]
    fn code_structure_absent_when_no_indicators() {
        let fragments = vec![LabeledFragment::new("Copy Editor", "hello")];
        assert!(code_structure_from_fragments(&fragments).is_none());
    }

    #[test]
    fn clean_code_structure_drops_empty_fields() {
        let payload = map(json!({"root": "App", "tree": "", "files": [], "assumptions": ["py"], "extra": 1}));
        assert_eq!(
            clean_code_structure(&payload),
            map(json!({"root": "App", "assumptions": ["py"]}))
        );
    }
}
