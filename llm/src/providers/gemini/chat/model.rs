use super::api::{GenerateContentRequest, GenerateContentResponse};
use crate::client::Client;
use crate::traffic_log;
use crate::{ChatChunk, ChatModel, ChatRequest, ChatResponse, ChatStream};
use async_trait::async_trait;
use futures::StreamExt;

pub struct GeminiChatModel {
    client: Client,
    base_url: String,
    model_name: String,
}

impl GeminiChatModel {
    pub fn new(client: Client, base_url: String, model_name: String) -> Self {
        GeminiChatModel {
            client,
            base_url,
            model_name,
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model_name);

        let api_request = GenerateContentRequest::from(request);
        traffic_log::log_request(&self.model_name, &api_request);

        match self
            .client
            .post::<_, _, GenerateContentResponse>(url, &api_request)
            .await
            .and_then(GenerateContentResponse::into_result)
        {
            Ok(response) => {
                traffic_log::log_response(&self.model_name, &response);
                Ok(response.into())
            }
            Err(e) => {
                traffic_log::log_error(&self.model_name, &e.to_string());
                Err(e)
            }
        }
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model_name
        );

        let api_request = GenerateContentRequest::from(request);
        traffic_log::log_stream_start(&self.model_name, &api_request);

        let streamed_response = self
            .client
            .post_stream(url, &api_request, |line: &str| line.strip_prefix("data: "))
            .await
            .inspect_err(|e| traffic_log::log_error(&self.model_name, &e.to_string()))?;

        let model_name = self.model_name.clone();
        Ok(Box::pin(streamed_response.map(
            move |chunk: anyhow::Result<GenerateContentResponse>| {
                chunk
                    .and_then(GenerateContentResponse::into_result)
                    .map(ChatChunk::from)
                    .inspect_err(|e| traffic_log::log_error(&model_name, &e.to_string()))
            },
        )))
    }
}
