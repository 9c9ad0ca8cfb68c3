//! Connection state machine states and the write queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::sse::WriteCommand;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Reading,
    Dispatching,
    WritingResponse,
    Streaming,
    Draining,
    Closed,
}

/// FIFO write queue shared between the connection's write loop and any
/// [`crate::sse::SseWriter`] attached to it.
///
/// Bytes leave in enqueue order. `queued_bytes` tracks
/// outstanding bytes so the SSE writer can compare against the
/// back-pressure watermark without touching the channel itself.
pub struct WriteQueue {
    tx: UnboundedSender<WriteCommand>,
    rx: UnboundedReceiver<WriteCommand>,
    pub queued_bytes: Arc<AtomicUsize>,
    pub peer_closed: Arc<AtomicBool>,
    watermark: usize,
}

impl WriteQueue {
    pub fn new(watermark: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        WriteQueue {
            tx,
            rx,
            queued_bytes: Arc::new(AtomicUsize::new(0)),
            peer_closed: Arc::new(AtomicBool::new(false)),
            watermark,
        }
    }

    pub fn sender(&self) -> UnboundedSender<WriteCommand> {
        self.tx.clone()
    }

    pub fn queued_bytes_handle(&self) -> Arc<AtomicUsize> {
        self.queued_bytes.clone()
    }

    pub fn peer_closed_handle(&self) -> Arc<AtomicBool> {
        self.peer_closed.clone()
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    pub fn enqueue(&self, chunk: bytes::Bytes) {
        self.queued_bytes.fetch_add(chunk.len(), Ordering::AcqRel);
        let _ = self.tx.send(WriteCommand::Chunk(chunk));
    }

    /// Receive the next queued chunk, decrementing `queued_bytes` once it
    /// has actually been handed to the caller for writing. Returns `None`
    /// once every sender (including any attached `SseWriter`) has been
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<WriteCommand> {
        let cmd = self.rx.recv().await;
        if let Some(WriteCommand::Chunk(chunk)) = &cmd {
            self.queued_bytes.fetch_sub(chunk.len(), Ordering::AcqRel);
        }
        cmd
    }

    pub fn try_recv(&mut self) -> Option<WriteCommand> {
        let cmd = self.rx.try_recv().ok();
        if let Some(WriteCommand::Chunk(chunk)) = &cmd {
            self.queued_bytes.fetch_sub(chunk.len(), Ordering::AcqRel);
        }
        cmd
    }
}
