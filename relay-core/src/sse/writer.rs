//! Framed SSE event emission on a persistent connection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::{RelayError, Result, ResourceError};

/// A single server-sent event.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        SseEvent { data: data.into(), ..Default::default() }
    }

    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        self.event = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry_ms(mut self, retry_ms: u64) -> Self {
        self.retry_ms = Some(retry_ms);
        self
    }

    /// Render this event into the exact wire format.
    fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(name) = &self.event {
            out.push_str("event: ");
            out.push_str(name);
            out.push('\n');
        }
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(retry) = self.retry_ms {
            out.push_str("retry: ");
            out.push_str(&retry.to_string());
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    fn validate(&self) -> Result<()> {
        let invalid = |s: &str| s.contains('\0') || s.contains('\r');
        if invalid(&self.data)
            || self.event.as_deref().is_some_and(invalid)
            || self.id.as_deref().is_some_and(invalid)
        {
            return Err(RelayError::Resource(ResourceError::InvalidEventData));
        }
        Ok(())
    }
}

/// Chunks handed from the writer to the connection's write queue.
pub(crate) enum WriteCommand {
    Chunk(bytes::Bytes),
    Close,
}

/// Emits framed SSE events on a connection that has transitioned to
/// `Streaming` state.
///
/// Constructed by the connection layer and handed to the stream handler by
/// value; the handler keeps it for the lifetime of the stream (or drops it
/// to implicitly close). `Clone`-able so the connection layer can keep a
/// second handle for its own automatic keep-alive timer alongside the one
/// handed to the handler — both share the same channel and back-pressure
/// counters, and only the handler-owned clone's `Drop` is meant to close
/// the stream.
#[derive(Clone)]
pub struct SseWriter {
    tx: UnboundedSender<WriteCommand>,
    queued_bytes: Arc<AtomicUsize>,
    watermark: usize,
    peer_closed: Arc<AtomicBool>,
    closed: bool,
}

impl SseWriter {
    pub(crate) fn new(
        tx: UnboundedSender<WriteCommand>,
        queued_bytes: Arc<AtomicUsize>,
        watermark: usize,
        peer_closed: Arc<AtomicBool>,
    ) -> Self {
        SseWriter { tx, queued_bytes, watermark, peer_closed, closed: false }
    }

    fn enqueue(&self, chunk: String) -> Result<()> {
        if self.closed {
            return Err(RelayError::Resource(ResourceError::ConnectionClosed));
        }
        if self.peer_closed.load(Ordering::Acquire) {
            return Err(RelayError::Resource(ResourceError::ConnectionClosed));
        }
        let len = chunk.len();
        // Back-pressure check: refuse once the queue is
        // already over watermark. Draining below the low-water mark
        // (handled by the connection write loop) re-enables sends.
        if self.queued_bytes.load(Ordering::Acquire) > self.watermark {
            return Err(RelayError::Resource(ResourceError::Backpressure));
        }
        self.queued_bytes.fetch_add(len, Ordering::AcqRel);
        self.tx
            .send(WriteCommand::Chunk(bytes::Bytes::from(chunk)))
            .map_err(|_| RelayError::Resource(ResourceError::ConnectionClosed))
    }

    /// `send_event`.
    pub fn send_event(&self, event: SseEvent) -> Result<()> {
        event.validate()?;
        self.enqueue(event.encode())
    }

    /// `send_comment`.
    pub fn send_comment(&self, text: &str) -> Result<()> {
        if text.contains('\0') || text.contains('\r') || text.contains('\n') {
            return Err(RelayError::Resource(ResourceError::InvalidEventData));
        }
        self.enqueue(format!(": {text}\n\n"))
    }

    /// `send_keep_alive`: `: keep-alive\n\n` comment, normally
    /// invoked by a timer registered through [`crate::sse::SchedulerHandle`]
    /// rather than called directly by handler code.
    pub fn send_keep_alive(&self) -> Result<()> {
        self.enqueue(": keep-alive\n\n".to_string())
    }

    /// Close semantics: flush remaining bytes (handled by the
    /// connection once it sees `WriteCommand::Close`), then the connection
    /// returns the `Event` to the pool and transitions to `Draining`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.tx.send(WriteCommand::Close);
    }
}

impl Drop for SseWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_exact_wire_format() {
        let event = SseEvent::data("a\nb").with_event("msg").with_id("1");
        assert_eq!(event.encode(), "event: msg\nid: 1\ndata: a\ndata: b\n\n");
    }

    #[test]
    fn rejects_lone_cr_or_nul() {
        let bad = SseEvent::data("a\rb");
        assert!(bad.validate().is_err());
        let bad2 = SseEvent::data("a\0b");
        assert!(bad2.validate().is_err());
    }

    #[tokio::test]
    async fn backpressure_then_drain_reenables_sends() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let peer_closed = Arc::new(AtomicBool::new(false));
        let writer = SseWriter::new(tx, queued.clone(), 10, peer_closed);

        queued.store(11, Ordering::Release);
        let err = writer.send_event(SseEvent::data("x")).unwrap_err();
        assert!(matches!(err, RelayError::Resource(ResourceError::Backpressure)));

        queued.store(0, Ordering::Release);
        writer.send_event(SseEvent::data("x")).unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
