//! Streaming output for handlers that write their own body.
//!
//! Writes are buffered until `flush`; flushed chunks go to the transport
//! through an unbounded channel. The dispatcher flushes once more after the
//! handler returns. Clones share the same stream, so a handler may hand a
//! clone to a background task and keep writing after it returned.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::mpsc;

/// The sink was closed or the reader went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sink is closed")]
pub struct SinkClosed;

struct SinkState {
    buffer: BytesMut,
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
}

/// A chunked byte sink.
#[derive(Clone)]
pub struct Sink {
    state: Arc<Mutex<SinkState>>,
}

impl Sink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(SinkState {
                buffer: BytesMut::new(),
                tx: Some(tx),
                rx: Some(rx),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes to the pending chunk.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<(), SinkClosed> {
        let mut state = self.lock();
        if state.tx.is_none() {
            return Err(SinkClosed);
        }
        state.buffer.extend_from_slice(data.as_ref());
        Ok(())
    }

    /// Send the pending chunk to the reader.
    pub fn flush(&self) -> Result<(), SinkClosed> {
        let mut state = self.lock();
        Self::flush_locked(&mut state)
    }

    fn flush_locked(state: &mut SinkState) -> Result<(), SinkClosed> {
        let Some(tx) = state.tx.as_ref() else {
            return Err(SinkClosed);
        };
        if state.buffer.is_empty() {
            return Ok(());
        }
        let chunk = state.buffer.split().freeze();
        tx.send(chunk).map_err(|_| SinkClosed)
    }

    /// Flush and end the stream. Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.lock();
        let _ = Self::flush_locked(&mut state);
        state.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().tx.is_none()
    }

    /// Take the reading half. Only the first call gets it.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.lock().rx.take()
    }

    /// Chunks as a body stream; empty if the receiver was already taken.
    ///
    /// The stream ends once every clone of the sink is closed or dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let rx = self.take_receiver();
        drop(self);
        stream::unfold(rx, |rx| async move {
            let mut rx = rx?;
            let chunk = rx.recv().await?;
            Some((Ok(chunk), Some(rx)))
        })
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Sink")
            .field("buffered", &state.buffer.len())
            .field("closed", &state.tx.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_write_flush_close() {
        let sink = Sink::new();
        sink.write("hello ").unwrap();
        sink.write(b"world").unwrap();
        sink.flush().unwrap();
        sink.write("!").unwrap();
        sink.close();

        let chunks: Vec<Bytes> = sink
            .clone()
            .into_stream()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from("hello world"), Bytes::from("!")]);
    }

    #[test]
    fn test_write_after_close_fails() {
        let sink = Sink::new();
        sink.close();
        assert!(sink.is_closed());
        assert_eq!(sink.write("x"), Err(SinkClosed));
        assert_eq!(sink.flush(), Err(SinkClosed));
    }

    #[tokio::test]
    async fn test_writer_on_background_task() {
        let sink = Sink::new();
        let writer = sink.clone();
        let task = tokio::spawn(async move {
            for i in 0..3 {
                writer.write(format!("{};", i)).unwrap();
                writer.flush().unwrap();
            }
            writer.close();
        });

        let body: Vec<u8> = sink
            .into_stream()
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await;
        task.await.unwrap();
        assert_eq!(body, b"0;1;2;");
    }
}
