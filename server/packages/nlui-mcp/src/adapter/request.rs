use std::collections::VecDeque;
use std::fmt;
use std::io;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{AdapterError, RequestStream};

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Text(String),
    Bytes(Bytes),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    Data(Bytes),
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Bytes),
    End,
    Pending,
}

type Listener = Box<dyn FnMut(&RequestEvent) + Send>;

/// Readable stand-in for an inbound request, pre-filled with the whole body.
pub struct PseudoRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    chunks: VecDeque<Bytes>,
    ended: bool,
    end_delivered: bool,
    listeners: Vec<Listener>,
}

impl fmt::Debug for PseudoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PseudoRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("buffered_chunks", &self.chunks.len())
            .field("ended", &self.ended)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl PseudoRequest {
    pub fn build(
        method: Method,
        url: impl Into<String>,
        headers: HeaderMap,
        body: RequestBody,
    ) -> Self {
        let mut request = Self {
            method,
            url: url.into(),
            headers,
            chunks: VecDeque::new(),
            ended: false,
            end_delivered: false,
            listeners: Vec::new(),
        };

        let chunk = match body {
            RequestBody::Empty => None,
            RequestBody::Text(text) => Some(Bytes::from(text)),
            RequestBody::Bytes(bytes) => Some(bytes),
            RequestBody::Json(value) => Some(Bytes::from(value.to_string())),
        };
        // Fresh stream: neither push can hit the ended state.
        if let Some(chunk) = chunk {
            let _ = request.push(Some(chunk));
        }
        let _ = request.push(None);

        tracing::trace!(
            method = %request.method,
            url = %request.url,
            bytes = request.chunks.iter().map(Bytes::len).sum::<usize>(),
            "pseudo request built"
        );
        request
    }

    /// Appends a chunk, or ends the stream with `None`. Only one end is
    /// accepted.
    pub fn push(&mut self, chunk: Option<Bytes>) -> Result<(), AdapterError> {
        if self.ended {
            return Err(AdapterError::PushAfterEnd);
        }
        match chunk {
            Some(chunk) if chunk.is_empty() => {}
            Some(chunk) => {
                if self.listeners.is_empty() {
                    self.chunks.push_back(chunk);
                } else {
                    self.emit(&RequestEvent::Data(chunk));
                }
            }
            None => {
                self.ended = true;
                if !self.listeners.is_empty() && self.chunks.is_empty() {
                    self.deliver_end();
                }
            }
        }
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn emit(&mut self, event: &RequestEvent) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }

    fn deliver_end(&mut self) {
        if !self.end_delivered {
            self.end_delivered = true;
            self.emit(&RequestEvent::End);
        }
    }

    fn flow(&mut self) {
        while let Some(chunk) = self.chunks.pop_front() {
            self.emit(&RequestEvent::Data(chunk));
        }
        if self.ended {
            self.deliver_end();
        }
    }
}

impl RequestStream for PseudoRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn read(&mut self) -> ReadOutcome {
        if let Some(chunk) = self.chunks.pop_front() {
            return ReadOutcome::Data(chunk);
        }
        if self.ended {
            self.deliver_end();
            return ReadOutcome::End;
        }
        ReadOutcome::Pending
    }

    fn subscribe(&mut self, listener: Box<dyn FnMut(&RequestEvent) + Send>) {
        self.listeners.push(listener);
        self.flow();
    }

    fn pipe<'a, W>(&'a mut self, dst: &'a mut W) -> BoxFuture<'a, io::Result<u64>>
    where
        W: AsyncWrite + Unpin + Send,
    {
        async move {
            let mut written = 0u64;
            while let ReadOutcome::Data(chunk) = self.read() {
                dst.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            dst.flush().await?;
            Ok(written)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    fn post(body: RequestBody) -> PseudoRequest {
        PseudoRequest::build(Method::POST, "/mcp", HeaderMap::new(), body)
    }

    #[test]
    fn text_body_is_read_then_ends() {
        let mut request = post(RequestBody::Text("hello".to_string()));
        assert_eq!(request.read(), ReadOutcome::Data(Bytes::from("hello")));
        assert_eq!(request.read(), ReadOutcome::End);
        assert_eq!(request.read(), ReadOutcome::End);
    }

    #[test]
    fn json_body_is_reserialized() {
        let mut request = post(RequestBody::Json(json!({"jsonrpc": "2.0", "id": 1})));
        let body = request.read_to_end();
        let parsed: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(parsed, json!({"jsonrpc": "2.0", "id": 1}));
    }

    #[test]
    fn empty_body_only_ends() {
        let mut request = post(RequestBody::Empty);
        assert!(request.is_ended());
        assert_eq!(request.read(), ReadOutcome::End);
    }

    #[test]
    fn push_after_end_is_rejected() {
        let mut request = post(RequestBody::Empty);
        assert!(matches!(
            request.push(Some(Bytes::from("late"))),
            Err(AdapterError::PushAfterEnd)
        ));
        assert!(matches!(request.push(None), Err(AdapterError::PushAfterEnd)));
    }

    #[test]
    fn subscriber_sees_data_then_single_end() {
        let mut request = post(RequestBody::Bytes(Bytes::from_static(b"abc")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        request.subscribe(Box::new(move |event| {
            sink.lock().expect("events").push(event.clone());
        }));
        assert_eq!(request.read(), ReadOutcome::End);

        let seen = seen.lock().expect("events");
        assert_eq!(
            *seen,
            vec![RequestEvent::Data(Bytes::from_static(b"abc")), RequestEvent::End]
        );
    }

    #[tokio::test]
    async fn pipe_copies_body() {
        let mut request = post(RequestBody::Text("{\"a\":1}".to_string()));
        let mut out: Vec<u8> = Vec::new();
        let written = request.pipe(&mut out).await.expect("pipe");
        assert_eq!(written, 7);
        assert_eq!(out, b"{\"a\":1}");
        assert_eq!(request.read(), ReadOutcome::End);
    }
}
