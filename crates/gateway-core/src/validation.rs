//! Schema validation for inbound completion requests.
//!
//! The validator walks the raw JSON payload once, collecting every violation
//! with its field path, and only builds a [`CompletionRequest`] when the
//! payload is clean. It never touches shared state.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::request::{
    ChatMessage, CompletionRequest, ContentPart, ImageDetail, ImageUrl, MessageContent,
    MessageRole, DEFAULT_TEMPERATURE,
};

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path to the offending field (e.g. `messages.0.role`)
    pub path: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldViolation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Structured validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", summarize(.violations))]
pub struct ValidationError {
    /// Every violated field, in document order
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Paths of the violated fields
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.path.as_str()).collect()
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| {
            if v.path.is_empty() {
                v.message.clone()
            } else {
                format!("{}: {}", v.path, v.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse and type-check a raw request body.
pub fn validate_completion_request(body: &[u8]) -> Result<CompletionRequest, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ValidationError {
        violations: vec![FieldViolation::new("", format!("Invalid JSON: {e}"))],
    })?;

    validate_value(&value)
}

/// Type-check an already parsed JSON payload.
pub fn validate_value(value: &Value) -> Result<CompletionRequest, ValidationError> {
    let mut violations = Vec::new();

    let Some(root) = value.as_object() else {
        return Err(ValidationError {
            violations: vec![FieldViolation::new("", "Expected object")],
        });
    };

    let model = match root.get("model") {
        Some(Value::String(model)) => Some(model.clone()),
        Some(other) => {
            violations.push(expected("model", "string", other));
            None
        }
        None => {
            violations.push(FieldViolation::new("model", "Required"));
            None
        }
    };

    let messages = match root.get("messages") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| parse_message(&format!("messages.{i}"), item, &mut violations))
                .collect::<Vec<_>>(),
        ),
        Some(other) => {
            violations.push(expected("messages", "array", other));
            None
        }
        None => {
            violations.push(FieldViolation::new("messages", "Required"));
            None
        }
    };

    let max_tokens = match root.get("max_tokens") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => Some(n),
            None => {
                violations.push(FieldViolation::new(
                    "max_tokens",
                    "Expected a non-negative integer",
                ));
                None
            }
        },
        Some(other) => {
            violations.push(expected("max_tokens", "number", other));
            None
        }
    };

    let temperature = match root.get("temperature") {
        None | Some(Value::Null) => DEFAULT_TEMPERATURE,
        Some(value) => coerce_number(value).unwrap_or_else(|| {
            violations.push(FieldViolation::new(
                "temperature",
                "Expected number, received nan",
            ));
            DEFAULT_TEMPERATURE
        }),
    };

    let stream = match root.get("stream") {
        None => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(other) => {
            violations.push(expected("stream", "boolean", other));
            None
        }
    };

    match (model, messages) {
        (Some(model), Some(messages)) if violations.is_empty() => Ok(CompletionRequest {
            model,
            messages,
            max_tokens,
            temperature,
            stream,
        }),
        _ => Err(ValidationError { violations }),
    }
}

fn parse_message(
    path: &str,
    value: &Value,
    violations: &mut Vec<FieldViolation>,
) -> Option<ChatMessage> {
    let Some(object) = value.as_object() else {
        violations.push(expected(path, "object", value));
        return None;
    };

    let role_path = format!("{path}.role");
    let role = match object.get("role") {
        Some(Value::String(role)) => MessageRole::parse(role).or_else(|| {
            violations.push(FieldViolation::new(
                role_path,
                format!(
                    "Invalid enum value. Expected {}, received '{role}'",
                    quoted_list(&MessageRole::ALL)
                ),
            ));
            None
        }),
        Some(other) => {
            violations.push(expected(&role_path, "string", other));
            None
        }
        None => {
            violations.push(FieldViolation::new(role_path, "Required"));
            None
        }
    };

    let content_path = format!("{path}.content");
    let content = match object.get("content") {
        Some(Value::String(text)) => Some(MessageContent::Text(text.clone())),
        Some(Value::Array(parts)) => {
            let before = violations.len();
            let parsed: Vec<ContentPart> = parts
                .iter()
                .enumerate()
                .filter_map(|(i, part)| parse_part(&format!("{content_path}.{i}"), part, violations))
                .collect();
            (violations.len() == before).then_some(MessageContent::Parts(parsed))
        }
        Some(other) => {
            violations.push(expected(&content_path, "string or array", other));
            None
        }
        None => {
            violations.push(FieldViolation::new(content_path, "Required"));
            None
        }
    };

    Some(ChatMessage {
        role: role?,
        content: content?,
    })
}

fn parse_part(path: &str, value: &Value, violations: &mut Vec<FieldViolation>) -> Option<ContentPart> {
    let Some(object) = value.as_object() else {
        violations.push(expected(path, "object", value));
        return None;
    };

    match object.get("type").and_then(Value::as_str) {
        Some("text") => {
            reject_field(path, object, "image_url", "text", violations);
            match object.get("text") {
                Some(Value::String(text)) => Some(ContentPart::Text { text: text.clone() }),
                Some(other) => {
                    violations.push(expected(&format!("{path}.text"), "string", other));
                    None
                }
                None => {
                    violations.push(FieldViolation::new(format!("{path}.text"), "Required"));
                    None
                }
            }
        }
        Some("image_url") => {
            reject_field(path, object, "text", "image_url", violations);
            let image_path = format!("{path}.image_url");
            match object.get("image_url") {
                Some(Value::Object(image)) => parse_image_url(&image_path, image, violations)
                    .map(|image_url| ContentPart::ImageUrl { image_url }),
                Some(other) => {
                    violations.push(expected(&image_path, "object", other));
                    None
                }
                None => {
                    violations.push(FieldViolation::new(image_path, "Required"));
                    None
                }
            }
        }
        _ => {
            violations.push(FieldViolation::new(
                format!("{path}.type"),
                "Invalid discriminator value. Expected 'text' | 'image_url'",
            ));
            None
        }
    }
}

fn parse_image_url(
    path: &str,
    image: &Map<String, Value>,
    violations: &mut Vec<FieldViolation>,
) -> Option<ImageUrl> {
    let url = match image.get("url") {
        Some(Value::String(url)) => Some(url.clone()),
        Some(other) => {
            violations.push(expected(&format!("{path}.url"), "string", other));
            None
        }
        None => {
            violations.push(FieldViolation::new(format!("{path}.url"), "Required"));
            None
        }
    };

    let detail = match image.get("detail") {
        None => Ok(None),
        Some(Value::String(detail)) => ImageDetail::parse(detail).map(Some).ok_or(()),
        Some(_) => Err(()),
    };
    let detail = detail
        .map_err(|()| {
            violations.push(FieldViolation::new(
                format!("{path}.detail"),
                format!("Invalid enum value. Expected {}", quoted_list(&ImageDetail::ALL)),
            ));
        })
        .ok()?;

    Some(ImageUrl { url: url?, detail })
}

/// Content parts must not carry the other variant's payload.
fn reject_field(
    path: &str,
    object: &Map<String, Value>,
    field: &str,
    tag: &str,
    violations: &mut Vec<FieldViolation>,
) {
    if object.contains_key(field) {
        violations.push(FieldViolation::new(
            format!("{path}.{field}"),
            format!("Unexpected field for content part of type '{tag}'"),
        ));
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn expected(path: &str, kind: &str, received: &Value) -> FieldViolation {
    FieldViolation::new(
        path,
        format!("Expected {kind}, received {}", json_type(received)),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn quoted_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(value: &Value) -> Result<CompletionRequest, ValidationError> {
        validate_value(value)
    }

    #[test]
    fn test_minimal_request() {
        let request = validate(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hello"}]
        }))
        .expect("valid request");

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 1);
        assert!((request.temperature - DEFAULT_TEMPERATURE).abs() < f64::EPSILON);
        assert_eq!(request.stream, None);
        assert_eq!(request.max_tokens, None);
    }

    #[test]
    fn test_string_and_text_part_content_are_equivalent() {
        let plain = validate(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hello"}]
        }))
        .expect("string content");
        let parts = validate(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hello"}]}]
        }))
        .expect("part content");

        assert_eq!(
            plain.messages[0].content.to_parts(),
            parts.messages[0].content.to_parts()
        );
    }

    #[test]
    fn test_empty_messages_allowed() {
        let request = validate(&json!({"model": "m", "messages": []})).expect("valid");
        assert!(request.messages.is_empty());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = validate(&json!({
            "model": "m",
            "messages": [{"role": "tool", "content": "x"}]
        }))
        .unwrap_err();

        assert_eq!(err.paths(), vec!["messages.0.role"]);
        assert!(err.to_string().contains("'developer'"));
    }

    #[test]
    fn test_cross_tag_fields_rejected() {
        let err = validate(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [{"type": "text", "text": "hi", "image_url": {"url": "x"}}]
            }]
        }))
        .unwrap_err();

        assert_eq!(err.paths(), vec!["messages.0.content.0.image_url"]);
    }

    #[test]
    fn test_image_part_with_detail() {
        let request = validate(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this?"},
                    {"type": "image_url", "image_url": {"url": "https://x/y.png", "detail": "high"}}
                ]
            }]
        }))
        .expect("valid");

        let parts = request.messages[0].content.to_parts();
        assert_eq!(
            parts[1],
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://x/y.png".to_string(),
                    detail: Some(ImageDetail::High),
                }
            }
        );
    }

    #[test]
    fn test_bad_detail_and_unknown_tag() {
        let err = validate(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": "u", "detail": "ultra"}},
                    {"type": "audio", "data": "..."}
                ]
            }]
        }))
        .unwrap_err();

        assert_eq!(
            err.paths(),
            vec![
                "messages.0.content.0.image_url.detail",
                "messages.0.content.1.type"
            ]
        );
    }

    #[test]
    fn test_all_violations_reported() {
        let err = validate(&json!({
            "messages": "nope",
            "stream": "yes",
            "max_tokens": -3
        }))
        .unwrap_err();

        assert_eq!(err.paths(), vec!["model", "messages", "max_tokens", "stream"]);
    }

    #[test]
    fn test_temperature_coercion() {
        let request = validate(&json!({
            "model": "m",
            "messages": [],
            "temperature": "0.7",
            "max_tokens": null
        }))
        .expect("valid");
        assert!((request.temperature - 0.7).abs() < f64::EPSILON);

        let err = validate(&json!({"model": "m", "messages": [], "temperature": "hot"})).unwrap_err();
        assert_eq!(err.paths(), vec!["temperature"]);
    }

    #[test]
    fn test_invalid_json_body() {
        let err = validate_completion_request(b"{not json").unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].message.starts_with("Invalid JSON"));
    }
}
