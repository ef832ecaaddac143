//! Adapters that let a stream-oriented protocol engine run on top of a
//! single HTTP request/response pair.
//!
//! The engine only ever sees the two traits below. [`request::PseudoRequest`]
//! and [`response::PseudoResponse`] implement them on buffered state, and
//! [`events::decode`] turns whatever the engine wrote back into structured
//! events for the outer transport.

use std::io;

use axum::http::{HeaderMap, Method};
use futures::future::BoxFuture;
use nlui_error::NluiError;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;

pub mod events;
pub mod request;
pub mod response;

pub use events::{decode, DecodedEvents, NormalizedEvent};
pub use request::{PseudoRequest, ReadOutcome, RequestBody, RequestEvent};
pub use response::{PseudoResponse, ResponseChunk, ResponseHead};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("binary chunks are not supported; write text")]
    BinaryChunk,
    #[error("explicit encoding `{0}` is not supported")]
    UnsupportedEncoding(String),
    #[error("status message in write_head is not supported")]
    StatusMessage,
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
    #[error("write after end")]
    WriteAfterEnd,
    #[error("push after end of stream")]
    PushAfterEnd,
    #[error("handler finished without writing response headers")]
    HeadersNeverSent,
}

impl From<AdapterError> for NluiError {
    fn from(value: AdapterError) -> Self {
        NluiError::AdapterProtocol {
            message: value.to_string(),
        }
    }
}

/// Read side the protocol engine consumes.
pub trait RequestStream: Send {
    fn method(&self) -> &Method;
    fn url(&self) -> &str;
    fn headers(&self) -> &HeaderMap;

    /// Next buffered chunk, end-of-stream, or nothing yet.
    fn read(&mut self) -> ReadOutcome;

    /// Registers a listener and switches the stream to flowing mode: every
    /// chunk not yet consumed is delivered as [`RequestEvent::Data`],
    /// followed by a single [`RequestEvent::End`].
    fn subscribe(&mut self, listener: Box<dyn FnMut(&RequestEvent) + Send>);

    /// Copies the remaining body into `dst`, returning the byte count.
    fn pipe<'a, W>(&'a mut self, dst: &'a mut W) -> BoxFuture<'a, io::Result<u64>>
    where
        W: AsyncWrite + Unpin + Send;

    fn read_to_end(&mut self) -> Vec<u8> {
        let mut body = Vec::new();
        while let ReadOutcome::Data(chunk) = self.read() {
            body.extend_from_slice(&chunk);
        }
        body
    }
}

/// Write side the protocol engine drives.
pub trait ResponseSink: Send + Sync {
    fn write_head(&self, status: u16, headers: Option<HeaderMap>) -> Result<(), AdapterError>;

    /// Reason phrases cannot be carried through the adapter.
    fn write_head_with_message(
        &self,
        _status: u16,
        _message: &str,
        _headers: Option<HeaderMap>,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::StatusMessage)
    }

    fn status_code(&self) -> u16;
    fn set_status_code(&self, status: u16) -> Result<(), AdapterError>;
    fn headers_sent(&self) -> bool;

    fn write(&self, chunk: ResponseChunk) -> Result<bool, AdapterError>;

    fn write_encoded(&self, _chunk: ResponseChunk, encoding: &str) -> Result<bool, AdapterError> {
        Err(AdapterError::UnsupportedEncoding(encoding.to_string()))
    }

    fn end(&self, chunk: Option<ResponseChunk>) -> Result<(), AdapterError>;

    /// Called once if the client goes away. Listeners must not hold a clone
    /// of the response, or it is never released.
    fn on_close(&self, listener: Box<dyn FnOnce() + Send>);
}

/// Fires the paired [`AbortSignal`] when dropped, unless disarmed first.
#[derive(Debug)]
pub struct AbortGuard {
    tx: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
pub struct AbortSignal {
    rx: oneshot::Receiver<()>,
}

pub fn abort_pair() -> (AbortGuard, AbortSignal) {
    let (tx, rx) = oneshot::channel();
    (AbortGuard { tx: Some(tx) }, AbortSignal { rx })
}

impl AbortGuard {
    pub fn abort(self) {
        drop(self);
    }

    pub fn disarm(mut self) {
        self.tx.take();
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl AbortSignal {
    /// A signal that resolves immediately without firing.
    pub fn never() -> Self {
        let (guard, signal) = abort_pair();
        guard.disarm();
        signal
    }

    /// Resolves to `true` if aborted, `false` once the guard was disarmed.
    pub async fn fired(self) -> bool {
        self.rx.await.is_ok()
    }
}
