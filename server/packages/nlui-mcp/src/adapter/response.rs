use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response, StatusCode};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{AbortSignal, AdapterError, ResponseSink};

#[derive(Debug, Clone)]
pub enum ResponseChunk {
    Text(String),
    Binary(Bytes),
}

impl From<&str> for ResponseChunk {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ResponseChunk {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Bytes> for ResponseChunk {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for ResponseChunk {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

/// Status and headers captured by the first header flush.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

type CloseListener = Box<dyn FnOnce() + Send>;

struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    headers_sent: bool,
    closed: bool,
    should_close: bool,
    buffered: Vec<Bytes>,
    controller: Option<mpsc::UnboundedSender<Bytes>>,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    close_listeners: Vec<CloseListener>,
    close_emitted: bool,
}

impl ResponseState {
    fn new(head_tx: oneshot::Sender<ResponseHead>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            headers_sent: false,
            closed: false,
            should_close: false,
            buffered: Vec::new(),
            controller: None,
            head_tx: Some(head_tx),
            close_listeners: Vec::new(),
            close_emitted: false,
        }
    }

    fn write_head(&mut self, status: StatusCode, headers: Option<HeaderMap>) {
        self.status = status;
        if let Some(headers) = headers {
            self.headers = headers;
        }
        self.headers_sent = true;
        // Only the first flush resolves; later calls just update tracking.
        if let Some(tx) = self.head_tx.take() {
            let _ = tx.send(ResponseHead {
                status: self.status,
                headers: self.headers.clone(),
            });
        }
    }

    fn enqueue(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        match &self.controller {
            Some(controller) => {
                if controller.send(chunk).is_err() {
                    tracing::debug!("response body receiver dropped; chunk discarded");
                }
            }
            None => self.buffered.push(chunk),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        if self.controller.take().is_none() {
            self.should_close = true;
        }
    }

    /// Body controller start: drain the buffer and honour an earlier end.
    fn start(&mut self, controller: mpsc::UnboundedSender<Bytes>) {
        for chunk in self.buffered.drain(..) {
            let _ = controller.send(chunk);
        }
        if !self.should_close {
            self.controller = Some(controller);
        }
    }
}

/// Runs when the last handler-held [`PseudoResponse`] is dropped.
struct HandlerRelease {
    state: Weak<Mutex<ResponseState>>,
}

impl Drop for HandlerRelease {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        if !state.headers_sent {
            state.head_tx.take();
            return;
        }
        if !state.closed {
            tracing::debug!("response handler released without end; closing body");
            state.close();
        }
    }
}

/// Writable stand-in for a server response. Cheap to clone; every clone
/// drives the same underlying state.
#[derive(Clone)]
pub struct PseudoResponse {
    state: Arc<Mutex<ResponseState>>,
    _release: Arc<HandlerRelease>,
}

impl fmt::Debug for PseudoResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("PseudoResponse")
            .field("status", &state.status)
            .field("headers_sent", &state.headers_sent)
            .field("closed", &state.closed)
            .field("buffered_chunks", &state.buffered.len())
            .finish()
    }
}

fn lock(state: &Mutex<ResponseState>) -> MutexGuard<'_, ResponseState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_status(status: u16) -> Result<StatusCode, AdapterError> {
    StatusCode::from_u16(status).map_err(|_| AdapterError::InvalidStatus(status))
}

impl PseudoResponse {
    fn new(state: &Arc<Mutex<ResponseState>>) -> Self {
        Self {
            state: Arc::clone(state),
            _release: Arc::new(HandlerRelease {
                state: Arc::downgrade(state),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn write_text(&self, text: String) -> Result<(), AdapterError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(AdapterError::WriteAfterEnd);
        }
        if !state.headers_sent {
            let status = state.status;
            state.write_head(status, None);
        }
        state.enqueue(Bytes::from(text));
        Ok(())
    }
}

fn emit_close(state: &Mutex<ResponseState>) {
    let listeners = {
        let mut state = lock(state);
        if state.close_emitted {
            return;
        }
        state.close_emitted = true;
        std::mem::take(&mut state.close_listeners)
    };
    tracing::debug!(listeners = listeners.len(), "response aborted; notifying close listeners");
    for listener in listeners {
        listener();
    }
}

impl ResponseSink for PseudoResponse {
    fn write_head(&self, status: u16, headers: Option<HeaderMap>) -> Result<(), AdapterError> {
        let status = parse_status(status)?;
        lock(&self.state).write_head(status, headers);
        Ok(())
    }

    fn status_code(&self) -> u16 {
        lock(&self.state).status.as_u16()
    }

    /// Tracked for later reads; does not alter a head that was already sent.
    fn set_status_code(&self, status: u16) -> Result<(), AdapterError> {
        let status = parse_status(status)?;
        lock(&self.state).status = status;
        Ok(())
    }

    fn headers_sent(&self) -> bool {
        lock(&self.state).headers_sent
    }

    fn write(&self, chunk: ResponseChunk) -> Result<bool, AdapterError> {
        match chunk {
            ResponseChunk::Text(text) => {
                self.write_text(text)?;
                Ok(true)
            }
            ResponseChunk::Binary(_) => Err(AdapterError::BinaryChunk),
        }
    }

    fn end(&self, chunk: Option<ResponseChunk>) -> Result<(), AdapterError> {
        if let Some(chunk) = chunk {
            self.write(chunk)?;
        }
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(());
        }
        if !state.headers_sent {
            let status = state.status;
            state.write_head(status, None);
        }
        state.close();
        Ok(())
    }

    fn on_close(&self, listener: Box<dyn FnOnce() + Send>) {
        lock(&self.state).close_listeners.push(listener);
    }
}

/// Runs `handler` against a fresh [`PseudoResponse`] and resolves to a real
/// HTTP response as soon as the handler flushes headers. The handler runs
/// on its own task and may keep writing after this resolves; the body
/// stream ends on `end()` or when the last handle is dropped.
pub async fn build<F, Fut>(signal: AbortSignal, handler: F) -> Result<Response<Body>, AdapterError>
where
    F: FnOnce(PseudoResponse) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (head_tx, head_rx) = oneshot::channel();
    let state = Arc::new(Mutex::new(ResponseState::new(head_tx)));

    let watched = Arc::downgrade(&state);
    tokio::spawn(async move {
        if signal.fired().await {
            if let Some(state) = watched.upgrade() {
                emit_close(&state);
            }
        }
    });

    tokio::spawn(handler(PseudoResponse::new(&state)));

    let head = head_rx.await.map_err(|_| AdapterError::HeadersNeverSent)?;

    let (controller, rx) = mpsc::unbounded_channel();
    lock(&state).start(controller);

    let body = Body::from_stream(UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    Ok(response)
}
