use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, stream};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    codec::encode_event,
    error::{PipelineError, Result},
    event::ReportEvent,
};

/// Destination of report events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Fails with [`PipelineError::ClientDisconnected`] once
    /// nobody is listening any more.
    async fn emit(&self, event: ReportEvent) -> Result<()>;

    /// Resolves when the receiving side has gone away.
    async fn closed(&self);
}

/// Sink that encodes each event to an NDJSON line and hands it to a channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

/// Create a connected sink and the byte stream it feeds.
///
/// Each item of the stream is exactly one encoded event, which keeps HTTP body
/// frames aligned with event boundaries. Dropping the stream closes the sink.
pub fn event_channel(
    capacity: usize,
) -> (
    ChannelSink,
    impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static,
) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (Ok(line), rx))
    });
    (ChannelSink { tx }, body)
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: ReportEvent) -> Result<()> {
        let line = encode_event(&event)?;
        debug!(kind = event.kind(), bytes = line.len(), "Emitting report event");
        self.tx
            .send(line)
            .await
            .map_err(|_| PipelineError::ClientDisconnected)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}
