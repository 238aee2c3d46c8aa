//! Traffic logging for LLM API calls
//!
//! Emits request/response summaries as tracing events under the
//! `llm::traffic` target. Content is truncated to avoid leaking private data
//! in logs.

use tracing::{debug, warn};

/// Maximum characters to log for content (to protect privacy)
const MAX_CONTENT_LOG_CHARS: usize = 200;

/// Truncate a string for logging, adding ellipsis if truncated
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars total)", truncated, char_count)
    }
}

fn summarize(value: &impl serde::Serialize) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "<serialization error>".to_string());
    truncate_for_log(&json, MAX_CONTENT_LOG_CHARS)
}

pub fn log_request(model: &str, request: &impl serde::Serialize) {
    debug!(target: "llm::traffic", model, summary = %summarize(request), "REQUEST");
}

pub fn log_response(model: &str, response: &impl serde::Serialize) {
    debug!(target: "llm::traffic", model, summary = %summarize(response), "RESPONSE");
}

pub fn log_stream_start(model: &str, request: &impl serde::Serialize) {
    debug!(target: "llm::traffic", model, summary = %summarize(request), "STREAM_START");
}

pub fn log_error(model: &str, error: &str) {
    warn!(target: "llm::traffic", model, error, "ERROR");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_kept() {
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    #[test]
    fn long_content_reports_total_length() {
        let long = "x".repeat(250);
        let out = truncate_for_log(&long, MAX_CONTENT_LOG_CHARS);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.ends_with("... (250 chars total)"));
    }
}
