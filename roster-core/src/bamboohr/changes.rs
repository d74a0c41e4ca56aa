//! Normalization of the "changed employees" feed
//!
//! BambooHR answers with XML by default but some accounts and proxies hand
//! back JSON. Both shapes collapse into one [`ChangePage`].

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

use super::attribute;
use crate::api::{ApiError, ChangeAction, ChangePage, ChangeRecord, Result};

/// Parse a change-feed response body, picking the decoder from the content type.
///
/// `since` is the watermark that was requested; it becomes the new watermark
/// when the feed does not report one.
pub fn parse_change_feed(
    endpoint: &str,
    content_type: &str,
    body: &str,
    since: &str,
) -> Result<ChangePage> {
    let lowered = content_type.to_ascii_lowercase();

    if lowered.contains("xml") || body.trim_start().starts_with("<?xml") {
        return parse_xml(body, since);
    }

    if lowered.contains("json") {
        return parse_json(body, since);
    }

    Err(ApiError::UnexpectedContentType {
        endpoint: endpoint.to_string(),
        content_type: content_type.to_string(),
    })
}

fn parse_xml(body: &str, since: &str) -> Result<ChangePage> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut seen_root = false;
    let mut latest = None;
    let mut records = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if !seen_root {
                    seen_root = true;
                    latest = non_empty(attribute(&e, b"latest")?)
                        .or(non_empty(attribute(&e, b"lastChanged")?));
                }

                if e.local_name().as_ref() != b"employee" {
                    continue;
                }

                let id = attribute(&e, b"id")?.unwrap_or_default();
                let id = id.trim();
                if id.is_empty() {
                    continue;
                }

                let action = attribute(&e, b"action")?.unwrap_or_default();
                let changed_at = attribute(&e, b"lastChanged")?.unwrap_or_default();
                records.push(ChangeRecord::new(id, ChangeAction::parse(&action), changed_at));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(ApiError::Xml("change feed has no root element".to_string()));
    }

    Ok(ChangePage::new(records, latest.unwrap_or_else(|| since.to_string())))
}

fn parse_json(body: &str, since: &str) -> Result<ChangePage> {
    let payload: Value = serde_json::from_str(body)?;
    let Value::Object(payload) = payload else {
        return Err(ApiError::UnrecognizedShape(format!(
            "change feed JSON is {}, expected an object",
            kind(&payload)
        )));
    };

    let list = ["employees", "changes"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| is_truthy(value));

    let records = match list {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| change_from_json(item, None))
            .collect(),
        // Keyed by employee id. Sorted so re-fetches of the same watermark
        // come back in the same order.
        Some(Value::Object(entries)) => {
            let mut keyed: Vec<(&String, &Value)> = entries.iter().collect();
            keyed.sort_by(|a, b| a.0.cmp(b.0));
            keyed
                .into_iter()
                .filter_map(|(key, item)| change_from_json(item, Some(key)))
                .collect()
        }
        Some(other) => {
            return Err(ApiError::UnrecognizedShape(format!(
                "change list is {}, expected an array or object",
                kind(other)
            )))
        }
    };

    let latest = ["latest", "lastChanged"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .filter_map(scalar_string)
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| since.to_string());

    Ok(ChangePage::new(records, latest))
}

fn change_from_json(item: &Value, key: Option<&str>) -> Option<ChangeRecord> {
    let fields = item.as_object();

    let id = fields
        .and_then(|f| f.get("id"))
        .and_then(scalar_string)
        .filter(|id| !id.trim().is_empty())
        .or_else(|| key.map(str::to_string))?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }

    let action = fields
        .and_then(|f| f.get("action"))
        .and_then(scalar_string)
        .unwrap_or_default();
    let changed_at = fields
        .and_then(|f| f.get("lastChanged"))
        .and_then(scalar_string)
        .unwrap_or_default();

    Some(ChangeRecord::new(id, ChangeAction::parse(&action), changed_at))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://acme.bamboohr.com/api/v1/employees/changed";
    const SINCE: &str = "2024-01-01T00:00:00Z";

    #[test]
    fn test_xml_feed() {
        let body = r#"<?xml version="1.0"?>
<employees latest="2024-02-01T00:00:00+00:00">
  <employee id="10" action="Updated" lastChanged="2024-01-15T10:00:00+00:00"/>
  <employee id="11" action="Deleted" lastChanged="2024-01-16T10:00:00+00:00"/>
  <employee id="  " action="Updated" lastChanged="2024-01-17T10:00:00+00:00"/>
  <employee id="12" lastChanged="2024-01-18T10:00:00+00:00"></employee>
</employees>"#;

        let page = parse_change_feed(ENDPOINT, "application/xml", body, SINCE).unwrap();

        assert_eq!(page.latest, "2024-02-01T00:00:00+00:00");
        let ids: Vec<_> = page.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["10", "11", "12"]);
        assert_eq!(page.records[1].action, ChangeAction::Deleted);
        assert_eq!(page.records[2].action, ChangeAction::Updated);
        assert_eq!(page.records[0].changed_at, "2024-01-15T10:00:00+00:00");
    }

    #[test]
    fn test_xml_sniffed_without_content_type() {
        let body = r#"<?xml version="1.0"?><employees lastChanged="2024-03-01T00:00:00Z"></employees>"#;

        let page = parse_change_feed(ENDPOINT, "", body, SINCE).unwrap();

        assert_eq!(page.total(), 0);
        assert_eq!(page.latest, "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_xml_without_latest_keeps_since() {
        let body = r#"<employees><employee id="1" action="Updated"/></employees>"#;

        let page = parse_change_feed(ENDPOINT, "text/xml; charset=utf-8", body, SINCE).unwrap();

        assert_eq!(page.latest, SINCE);
        assert_eq!(page.total(), 1);
    }

    #[test]
    fn test_json_array_feed() {
        let body = r#"{
            "employees": [
                {"id": "7", "action": "Updated", "lastChanged": "2024-01-02T00:00:00Z"},
                {"id": 8, "action": "Deleted", "lastChanged": "2024-01-03T00:00:00Z"},
                {"action": "Updated"}
            ],
            "latest": "2024-02-01T00:00:00Z"
        }"#;

        let page = parse_change_feed(ENDPOINT, "application/json", body, SINCE).unwrap();

        assert_eq!(page.latest, "2024-02-01T00:00:00Z");
        assert_eq!(page.total(), 2);
        assert_eq!(page.records[1].external_id, "8");
        assert_eq!(page.records[1].action, ChangeAction::Deleted);
    }

    #[test]
    fn test_json_keyed_feed_is_ordered_by_id() {
        let body = r#"{
            "employees": {
                "20": {"id": "20", "action": "Updated", "lastChanged": "2024-01-02T00:00:00Z"},
                "3": {"action": "Deleted"},
                "13": {"action": "Inserted", "lastChanged": "2024-01-03T00:00:00Z"}
            },
            "lastChanged": "2024-02-02T00:00:00Z"
        }"#;

        let page = parse_change_feed(ENDPOINT, "application/json", body, SINCE).unwrap();

        let ids: Vec<_> = page.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["13", "20", "3"]);
        assert_eq!(page.latest, "2024-02-02T00:00:00Z");
    }

    #[test]
    fn test_json_changes_key_and_missing_latest() {
        let body = r#"{"employees": [], "changes": [{"id": "5"}]}"#;

        let page = parse_change_feed(ENDPOINT, "application/json", body, SINCE).unwrap();

        assert_eq!(page.total(), 1);
        assert_eq!(page.latest, SINCE);
    }

    #[test]
    fn test_json_with_unusable_change_list() {
        let body = r#"{"employees": "nope"}"#;

        let result = parse_change_feed(ENDPOINT, "application/json", body, SINCE);

        assert!(matches!(result, Err(ApiError::UnrecognizedShape(_))));
    }

    #[test]
    fn test_unexpected_content_type_is_fatal() {
        let result = parse_change_feed(ENDPOINT, "text/html", "<html></html>", SINCE);

        match result {
            Err(ApiError::UnexpectedContentType { content_type, .. }) => {
                assert_eq!(content_type, "text/html");
            }
            other => panic!("Expected UnexpectedContentType, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_xml_body_is_an_error() {
        let result = parse_change_feed(ENDPOINT, "application/xml", "", SINCE);
        assert!(matches!(result, Err(ApiError::Xml(_))));
    }
}
