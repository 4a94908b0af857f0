//! Sanitized projection of jobs for outbound webhook payloads.
//!
//! Webhook receivers never see the raw job: body-like strings are cut to
//! [`MAX_BODY_CHARS`], credential fields become [`REDACTED`], and header and
//! intent lists are reduced to their key names. Applying the projection to
//! its own output changes nothing.

use serde_json::{Map, Value};

use clypr_bridge_protocol::DispatchJob;

/// Longest body-like string forwarded to a webhook.
pub const MAX_BODY_CHARS: usize = 200;

/// Replacement for credential values.
pub const REDACTED: &str = "REDACTED";

const BODY_KEYS: &[&str] = &["body", "text", "message", "description"];
const KEY_LIST_KEYS: &[&str] = &["headers", "intents"];
const SECRET_KEYS: &[&str] = &[
    "password",
    "pass",
    "secret",
    "token",
    "apikey",
    "authorization",
    "auth",
    "authtype",
    "bottoken",
    "bearertoken",
    "smtppass",
    "credentials",
    "privatekey",
];

/// Whether a field name denotes a credential.
pub fn is_secret_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    SECRET_KEYS.contains(&normalized.as_str())
}

/// Sanitized JSON projection of a job.
pub fn sanitize_job(job: &DispatchJob) -> Value {
    match serde_json::to_value(job) {
        Ok(value) => sanitize_value(&value),
        Err(_) => Value::Null,
    }
}

/// Sanitize an arbitrary JSON value.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

fn sanitize_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), sanitize_field(key, value)))
        .collect()
}

fn sanitize_field(key: &str, value: &Value) -> Value {
    if KEY_LIST_KEYS.contains(&key) {
        return key_names(value);
    }
    if is_secret_key(key) {
        return match value {
            Value::Null => Value::Null,
            _ => Value::String(REDACTED.to_string()),
        };
    }
    match value {
        Value::String(s) if BODY_KEYS.contains(&key) => Value::String(truncate(s)),
        other => sanitize_value(other),
    }
}

/// Reduce a key/value list (pairs, entries or object) to its keys.
fn key_names(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(key) => Some(Value::String(key.clone())),
                    Value::Array(pair) => pair.first().filter(|k| k.is_string()).cloned(),
                    Value::Object(entry) => entry.get("key").filter(|k| k.is_string()).cloned(),
                    _ => None,
                })
                .collect(),
        ),
        Value::Object(map) => Value::Array(map.keys().cloned().map(Value::String).collect()),
        _ => Value::Array(Vec::new()),
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_BODY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(body: &str, config: Value) -> DispatchJob {
        serde_json::from_value(json!({
            "id": 1,
            "messageType": "alert",
            "channelType": "webhook",
            "content": {"title": "t", "body": body, "metadata": [["k", "v"]]},
            "intents": [["intentType", "notify"], ["token", "secret-token"]],
            "channelConfig": config,
        }))
        .unwrap()
    }

    #[test]
    fn truncates_body_to_limit() {
        let long = "é".repeat(500);
        let out = sanitize_job(&job(&long, Value::Null));
        let body = out["content"]["body"].as_str().unwrap();
        assert_eq!(body.chars().count(), MAX_BODY_CHARS);
    }

    #[test]
    fn redacts_credentials_and_reduces_lists() {
        let out = sanitize_job(&job(
            "hello",
            json!({"webhook": {
                "url": "https://example.com/hook",
                "headers": [["X-Api-Key", "k"], ["X-Trace", "1"]],
                "authType": {"basic": {"username": "svc", "password": "hunter2"}}
            }}),
        ));

        let webhook = &out["channelConfig"]["webhook"];
        assert_eq!(webhook["url"], "https://example.com/hook");
        assert_eq!(webhook["headers"], json!(["X-Api-Key", "X-Trace"]));
        assert_eq!(webhook["authType"], json!(REDACTED));
        assert_eq!(out["intents"], json!(["intentType", "token"]));
        assert_eq!(out["content"]["body"], "hello");
        assert!(!out.to_string().contains("hunter2"));
        assert!(!out.to_string().contains("secret-token"));
    }

    #[test]
    fn redacts_email_password() {
        let out = sanitize_job(&job(
            "x",
            json!({"email": {"smtpHost": "smtp.example.com", "password": "pw", "username": "u"}}),
        ));
        assert_eq!(out["channelConfig"]["email"]["password"], REDACTED);
        assert_eq!(out["channelConfig"]["email"]["username"], "u");
    }

    #[test]
    fn sanitizing_twice_is_a_no_op() {
        let jobs = [
            job(&"x".repeat(450), json!({"webhook": {"headers": {"A": "1"}}})),
            job(
                "short",
                json!({"webhook": {"authType": {"bearer": {"token": "t"}}}}),
            ),
            job("", json!({"telegram": {"chatId": 5}})),
        ];
        for j in &jobs {
            let once = sanitize_job(j);
            assert_eq!(sanitize_value(&once), once);
        }
    }

    #[test]
    fn key_names_accepts_every_list_shape() {
        assert_eq!(key_names(&json!([["a", "1"]])), json!(["a"]));
        assert_eq!(key_names(&json!([{"key": "a", "value": "1"}])), json!(["a"]));
        assert_eq!(key_names(&json!({"a": "1"})), json!(["a"]));
        assert_eq!(key_names(&json!(["a"])), json!(["a"]));
        assert_eq!(key_names(&json!(null)), json!([]));
    }

    #[test]
    fn secret_key_matching_ignores_case_and_separators() {
        assert!(is_secret_key("apiKey"));
        assert!(is_secret_key("API_KEY"));
        assert!(is_secret_key("bot-token"));
        assert!(!is_secret_key("title"));
    }
}
