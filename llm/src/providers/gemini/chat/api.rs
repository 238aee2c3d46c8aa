use serde::{Deserialize, Serialize};

use crate::{ChatChunk, ChatRequest, ChatResponse, WebSource};

type Extra = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    User,
    Model,
}

impl From<crate::Role> for Role {
    fn from(value: crate::Role) -> Self {
        match value {
            crate::Role::User => Role::User,
            crate::Role::Model => Role::Model,
        }
    }
}

impl From<Role> for crate::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::User => crate::Role::User,
            Role::Model => crate::Role::Model,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thought: Option<bool>,

    // Inline data, function calls, thought signatures, ...
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

impl Part {
    pub fn new_text(text: String) -> Self {
        Part {
            text: Some(text),
            thought: None,
            extra: Extra::new(),
        }
    }

    fn answer_text(&self) -> Option<&str> {
        if self.thought == Some(true) {
            return None;
        }
        self.text.as_deref()
    }
}

// Gemini representation of messages.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<Role>,

    #[serde(default)]
    pub(crate) parts: Vec<Part>,
}

impl From<&crate::ChatMessage> for Content {
    fn from(msg: &crate::ChatMessage) -> Self {
        Content {
            role: Some(msg.role.into()),
            parts: vec![Part::new_text(msg.content.clone())],
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct GoogleSearch {}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Tool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) google_search: Option<GoogleSearch>,
}

impl Tool {
    pub fn google_search() -> Self {
        Tool {
            google_search: Some(GoogleSearch::default()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) response_modalities: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) tools: Vec<Tool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) generation_config: Option<GenerationConfig>,
}

impl From<&ChatRequest> for GenerateContentRequest {
    fn from(request: &ChatRequest) -> Self {
        let tools = if request.options.web_search {
            vec![Tool::google_search()]
        } else {
            vec![]
        };

        GenerateContentRequest {
            contents: request.messages.iter().map(Content::from).collect(),
            tools,
            generation_config: Some(GenerationConfig {
                temperature: Some(request.options.temperature),
                response_modalities: request.options.response_modalities.clone(),
            }),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct WebChunk {
    #[serde(default)]
    pub(crate) uri: Option<String>,

    #[serde(default)]
    pub(crate) title: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct GroundingChunk {
    #[serde(default)]
    pub(crate) web: Option<WebChunk>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroundingMetadata {
    #[serde(default)]
    pub(crate) grounding_chunks: Vec<GroundingChunk>,

    // Search entry point, grounding supports, web search queries.
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub(crate) content: Option<Content>,

    #[serde(default)]
    pub(crate) grounding_metadata: Option<GroundingMetadata>,

    #[serde(flatten)]
    pub(crate) extra: Extra,
}

/// Error object sent instead of a response body, also inside an SSE stream
/// whose HTTP status was already 200.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub(crate) code: Option<u16>,

    #[serde(default)]
    pub(crate) message: String,

    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gemini API error")?;
        if let Some(code) = self.code {
            write!(f, " {}", code)?;
        }
        if let Some(status) = &self.status {
            write!(f, " {}", status)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<ApiError>,

    #[serde(flatten)]
    pub(crate) extra: Extra,
}

impl GenerateContentResponse {
    /// Turn an embedded `error` object into an `Err`.
    pub(crate) fn into_result(self) -> anyhow::Result<Self> {
        match self.error {
            Some(error) => Err(anyhow::anyhow!("{}", error)),
            None => Ok(self),
        }
    }

    /// Answer text of the first candidate, `None` if it carries no text part.
    pub(crate) fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let mut texts = parts.iter().filter_map(Part::answer_text).peekable();
        texts.peek()?;
        Some(texts.collect())
    }

    /// Web references of the first candidate that have both a uri and a title.
    pub(crate) fn sources(&self) -> Vec<WebSource> {
        let Some(metadata) = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
        else {
            return vec![];
        };

        metadata
            .grounding_chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| match (web.uri.as_deref(), web.title.as_deref()) {
                (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                    Some(WebSource::new(uri, title))
                }
                _ => None,
            })
            .collect()
    }
}

impl From<GenerateContentResponse> for ChatResponse {
    fn from(response: GenerateContentResponse) -> Self {
        ChatResponse {
            text: response.text(),
            sources: response.sources(),
        }
    }
}

impl From<GenerateContentResponse> for ChatChunk {
    fn from(response: GenerateContentResponse) -> Self {
        ChatChunk {
            text: response.text(),
            sources: response.sources(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatMessage, GenerationOptions};

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest::with_options(
            vec![
                ChatMessage::model("Welcome"),
                ChatMessage::user("best coffee in India"),
            ],
            GenerationOptions::default(),
        );
        let json = serde_json::to_value(GenerateContentRequest::from(&request)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [
                    {"role": "model", "parts": [{"text": "Welcome"}]},
                    {"role": "user", "parts": [{"text": "best coffee in India"}]}
                ],
                "tools": [{"googleSearch": {}}],
                "generationConfig": {"temperature": 0.7, "responseModalities": ["TEXT"]}
            })
        );
    }

    #[test]
    fn test_plain_prompt_has_no_tools() {
        let request = ChatRequest::prompt("Hello!");
        let json = serde_json::to_value(GenerateContentRequest::from(&request)).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_response_text_and_sources() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"text": "thinking...", "thought": true},
                        {"text": "Blue Tokai "},
                        {"text": "is popular."}
                    ]},
                    "finishReason": "STOP",
                    "groundingMetadata": {
                        "webSearchQueries": ["best coffee in India"],
                        "groundingChunks": [
                            {"web": {"uri": "https://a.example", "title": "a.example"}},
                            {"web": {"uri": "https://b.example"}},
                            {"retrievedContext": {"uri": "gs://x"}}
                        ]
                    }
                }],
                "usageMetadata": {"totalTokenCount": 42}
            }"#,
        )
        .unwrap();

        let response = ChatResponse::from(response);
        assert_eq!(response.text.as_deref(), Some("Blue Tokai is popular."));
        assert_eq!(
            response.sources,
            vec![WebSource::new("https://a.example", "a.example")]
        );
    }

    #[test]
    fn test_chunk_without_candidates_or_text() {
        let chunk: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#).unwrap();
        let chunk = ChatChunk::from(chunk);
        assert_eq!(chunk.text, None);
        assert!(chunk.sources.is_empty());

        let chunk: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "STOP"}]}"#).unwrap();
        assert_eq!(chunk.text(), None);
    }

    #[test]
    fn test_embedded_error_becomes_err() {
        let event: GenerateContentResponse = serde_json::from_str(
            r#"{"error": {"code": 500, "status": "INTERNAL",
                "message": "An internal error has occurred."}}"#,
        )
        .unwrap();
        let err = event.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Gemini API error 500 INTERNAL: An internal error has occurred."
        );

        let ok: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(ok.into_result().is_ok());
    }
}
