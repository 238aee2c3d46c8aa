use futures::stream::Stream;
use futures::{
    StreamExt,
    stream::{self},
};
use reqwest::header::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt::Debug, pin::Pin};
use tracing::{Level, event, instrument, warn};

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
}

pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Line buffer carried across byte chunks of a streamed body.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
    failed: bool,
}

impl LineBuffer {
    /// Append `chunk` and parse every line completed by it.
    ///
    /// Bytes after the last newline stay buffered until the next chunk, so
    /// events (and multi-byte characters) split across chunks are reassembled.
    fn drain<T, F>(&mut self, chunk: &[u8], process: &F) -> Vec<anyhow::Result<T>>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> Option<&str>,
    {
        self.pending.extend_from_slice(chunk);

        let mut events = vec![];
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]);
            start = end + 1;

            let Some(payload) = process(line.trim_end_matches('\r')) else {
                continue;
            };
            if payload.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(payload) {
                Ok(event) => events.push(Ok(event)),
                Err(e) => warn!(error = %e, line = payload, "Failed to parse streamed line"),
            }
        }
        self.pending.drain(..start);
        events
    }
}

impl Client {
    pub fn with_headers(headers: HeaderMap) -> anyhow::Result<Self> {
        Ok(Client {
            client: reqwest::Client::builder().default_headers(headers).build()?,
        })
    }

    #[instrument(level = "trace", skip(self, request))]
    pub async fn post<U, S, T>(&self, url: U, request: &S) -> anyhow::Result<T>
    where
        U: reqwest::IntoUrl + std::fmt::Debug,
        S: Serialize + Sized,
        T: DeserializeOwned,
    {
        let response = self.client.post(url).json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(anyhow::anyhow!(
                "Request failed with status {}: {}",
                status,
                error_body
            ));
        }
        let text = response.text().await?;
        event!(Level::TRACE, response = text);

        Ok(serde_json::from_str::<T>(&text)?)
    }

    /// POST `request` and stream the response body back as parsed events.
    ///
    /// `process` maps a raw line to its JSON payload (or `None` to skip it).
    /// A transport error is yielded once as an `Err` item and ends the stream.
    #[instrument(level = "trace", skip(self, request, process))]
    pub async fn post_stream<U, S, F, T>(
        &self,
        url: U,
        request: &S,
        process: F,
    ) -> anyhow::Result<BoxedStream<anyhow::Result<T>>>
    where
        U: reqwest::IntoUrl + Debug,
        S: Serialize + Sized,
        T: DeserializeOwned + Send + 'static,
        F: Fn(&str) -> Option<&str> + 'static + Send,
    {
        let response = self.client.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(anyhow::anyhow!(
                "Request failed with status {}: {}",
                status,
                error_body
            ));
        }

        Ok(parse_lines(response.bytes_stream(), process))
    }
}

fn parse_lines<B, E, F, T>(bytes: B, process: F) -> BoxedStream<anyhow::Result<T>>
where
    B: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    F: Fn(&str) -> Option<&str> + 'static + Send,
{
    let events = bytes.scan(LineBuffer::default(), move |buffer, chunk| {
        if buffer.failed {
            return futures::future::ready(None);
        }
        let events = match chunk {
            Ok(chunk) => buffer.drain(&chunk, &process),
            Err(e) => {
                buffer.failed = true;
                vec![Err(anyhow::Error::new(e).context("Error reading response stream"))]
            }
        };
        futures::future::ready(Some(events))
    });

    Box::pin(events.flat_map(stream::iter))
}
