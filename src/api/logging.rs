use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

use crate::util::{env_flag, env_non_empty};

const DEFAULT_LOG_PATH: &str = "/tmp/maskstudio-debug.log";
const DEBUG_PAYLOAD_ENV: &str = "MASKSTUDIO_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "MASKSTUDIO_LOG_PATH";

pub fn debug_payload_enabled() -> bool {
    env_flag(DEBUG_PAYLOAD_ENV).unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let redacted = redact_inline_data(payload);
    let formatted_payload = serde_json::to_string_pretty(&redacted)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "MASKSTUDIO DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n"
    );
    emit_log_message(&message);
}

pub fn emit_sse_parse_error(json_data: &str, parse_error: &serde_json::Error) {
    let message = format!("MASKSTUDIO ERROR sse_parse_failed error={parse_error}\ndata:\n{json_data}\n");
    emit_log_message(&message);
}

pub fn emit_stream_failure(session: u64, error: &str) {
    let message = format!("MASKSTUDIO ERROR chat_stream_failed session={session} error={error}\n");
    emit_log_message(&message);
}

pub fn emit_decode_failure(image_id: u64, error: &str) {
    let message = format!("MASKSTUDIO ERROR image_decode_failed image={image_id} error={error}\n");
    emit_log_message(&message);
}

pub fn emit_request_failure(operation: &str, error: &anyhow::Error) {
    let message = format!("MASKSTUDIO ERROR {operation}_failed error={error:#}\n");
    emit_log_message(&message);
}

/// Replaces base64 image payloads with their length so debug dumps stay readable.
fn redact_inline_data(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let redacted = match (key.as_str(), inner) {
                        ("data", Value::String(data)) => {
                            Value::String(format!("<{} base64 chars>", data.len()))
                        }
                        _ => redact_inline_data(inner),
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_inline_data).collect()),
        other => other.clone(),
    }
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    env_non_empty(LOG_PATH_ENV).or_else(|| {
        if std::io::stderr().is_terminal() {
            Some(DEFAULT_LOG_PATH.to_string())
        } else {
            None
        }
    })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debug_payload_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_PAYLOAD_ENV, "1");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "TRUE");
        assert!(debug_payload_enabled());
        std::env::remove_var(DEBUG_PAYLOAD_ENV);
        assert!(!debug_payload_enabled());
    }

    #[test]
    fn test_resolve_log_path_uses_env_override() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(LOG_PATH_ENV, "/tmp/test-maskstudio.log");
        assert_eq!(
            resolve_log_path().as_deref(),
            Some("/tmp/test-maskstudio.log")
        );
        std::env::remove_var(LOG_PATH_ENV);
    }

    #[test]
    fn test_stream_failure_is_appended_to_log_file() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.log");
        std::env::set_var(LOG_PATH_ENV, &path);
        emit_stream_failure(7, "connection reset");
        std::env::remove_var(LOG_PATH_ENV);

        let logged = std::fs::read_to_string(&path).unwrap();
        assert!(logged.contains("chat_stream_failed session=7 error=connection reset"));
    }

    #[test]
    fn test_redact_inline_data_hides_image_payloads() {
        let payload = json!({
            "contents": [{"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "AAAA"}},
                {"text": "make it red"}
            ]}]
        });
        let redacted = redact_inline_data(&payload);
        assert_eq!(
            redacted["contents"][0]["parts"][0]["inlineData"]["data"],
            json!("<4 base64 chars>")
        );
        assert_eq!(redacted["contents"][0]["parts"][1]["text"], json!("make it red"));
    }
}
