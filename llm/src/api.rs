use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// A role-tagged text message as sent upstream.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// A web reference the model used to ground its answer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct WebSource {
    pub uri: String,
    pub title: String,
}

impl WebSource {
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        WebSource {
            uri: uri.into(),
            title: title.into(),
        }
    }
}

/// Fixed generation configuration sent with every request.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,

    /// Enables the web-search grounding tool.
    pub web_search: bool,

    pub response_modalities: Vec<String>,
}

impl GenerationOptions {
    pub fn with_temperature(temperature: f64) -> Self {
        GenerationOptions {
            temperature,
            ..Default::default()
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            temperature: 0.7,
            web_search: true,
            response_modalities: vec!["TEXT".to_string()],
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub options: GenerationOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        ChatRequest {
            messages,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(messages: Vec<ChatMessage>, options: GenerationOptions) -> Self {
        ChatRequest { messages, options }
    }

    /// Plain prompt without grounding, as used by connectivity checks.
    pub fn prompt(text: impl Into<String>) -> Self {
        ChatRequest {
            messages: vec![ChatMessage::user(text)],
            options: GenerationOptions {
                web_search: false,
                ..Default::default()
            },
        }
    }
}

/// A complete, non-streamed response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ChatResponse {
    /// `None` when the upstream produced no text at all.
    pub text: Option<String>,
    pub sources: Vec<WebSource>,
}

impl ChatResponse {
    pub fn get_text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// One streamed fragment: a text delta and/or grounding references.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ChatChunk {
    pub text: Option<String>,
    pub sources: Vec<WebSource>,
}

impl ChatChunk {
    pub fn text(text: impl Into<String>) -> Self {
        ChatChunk {
            text: Some(text.into()),
            sources: vec![],
        }
    }

    pub fn sources(sources: Vec<WebSource>) -> Self {
        ChatChunk { text: None, sources }
    }

    /// Text delta carried by this fragment, if it is non-empty.
    pub fn delta(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}
