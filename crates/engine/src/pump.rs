// crates/engine/src/pump.rs
//! The read loop shared by both stream kinds.
//!
//! Suspension points are: waiting for the transport to answer, waiting for
//! the next chunk, and waiting for a throttle deadline. Cancellation is
//! checked first at every one of them.

use async_trait::async_trait;
use futures_util::StreamExt;
use genstream_core::{FrameDecoder, Framing};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::manager::StreamOutcome;
use crate::throttle::sleep_until;
use crate::transport::Transport;

/// What the loop should do after a frame.
#[derive(Debug)]
pub enum Flow {
    Continue,
    Stop(StreamOutcome),
}

/// Applies decoded frames for one stream and owns its throttles.
#[async_trait]
pub trait StreamSink: Send {
    fn on_frame(&mut self, frame: &str) -> Flow;

    /// Earliest pending throttle deadline, if any.
    fn next_deadline(&self) -> Option<Instant>;

    /// Run whichever throttled flushes are due.
    async fn on_deadline(&mut self);

    /// Record a failure that ended the stream; returns the message to report.
    fn on_failure(&mut self, error: &StreamError) -> String;

    /// Final flush. Runs exactly once, for every outcome.
    async fn finish(&mut self, outcome: &StreamOutcome);
}

/// Open `url`, feed every frame to `sink` until a terminal event, failure,
/// end of body or cancellation, then run the final flush.
pub async fn drive<S: StreamSink>(
    transport: &dyn Transport,
    url: &str,
    body: &Value,
    framing: Framing,
    token: &CancellationToken,
    sink: &mut S,
) -> StreamOutcome {
    let outcome = read_until_done(transport, url, body, framing, token, sink).await;
    sink.finish(&outcome).await;
    outcome
}

async fn read_until_done<S: StreamSink>(
    transport: &dyn Transport,
    url: &str,
    request: &Value,
    framing: Framing,
    token: &CancellationToken,
    sink: &mut S,
) -> StreamOutcome {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return StreamOutcome::Cancelled,
        opened = transport.open(url, request) => opened,
    };
    let mut body = match opened {
        Ok(body) => body,
        Err(e) => return failed(sink, StreamError::Transport(e)),
    };

    let mut decoder = FrameDecoder::new(framing);
    loop {
        let deadline = sink.next_deadline();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let dropped = decoder.discard();
                debug!(url, dropped_bytes = dropped, "stream cancelled");
                return StreamOutcome::Cancelled;
            }
            _ = sleep_until(deadline) => sink.on_deadline().await,
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    for frame in decoder.push(&bytes) {
                        if let Flow::Stop(outcome) = sink.on_frame(&frame) {
                            return outcome;
                        }
                    }
                }
                Some(Err(e)) => return failed(sink, StreamError::Transport(e)),
                None => break,
            },
        }
    }

    // Trailing data without a final delimiter is processed once.
    for frame in decoder.finish() {
        if let Flow::Stop(outcome) = sink.on_frame(&frame) {
            return outcome;
        }
    }
    failed(sink, StreamError::Incomplete)
}

fn failed<S: StreamSink>(sink: &mut S, error: StreamError) -> StreamOutcome {
    warn!(error = %error, "stream failed");
    StreamOutcome::Failed(sink.on_failure(&error))
}
