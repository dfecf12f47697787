//! Request/response exchange over one socket.
//!
//! Each socket runs one read loop for its lifetime. Request envelopes are
//! processed on their own task and answered on the same socket; response
//! envelopes complete the matching [`send`] through the notifier. A read or
//! decode failure closes the socket and ends the loop. Reconnecting is the
//! dialing side's job.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;

use funcie_core::{Message, ProxyError, Response, Result, ResultExt};

use super::connection::{Connection, Frame, FrameStream};
use super::envelope::{Envelope, EnvelopeKind};
use crate::dispatch::MessageProcessor;
use crate::transport::ResponseNotifier;

/// Write `message` as a request and wait up to its TTL for the response.
pub async fn send(conn: &dyn Connection, notifier: &ResponseNotifier, message: &Message) -> Result<Response> {
    let envelope = Envelope::request(message)?;
    conn.write(&envelope)
        .await
        .with_context(|| format!("send message {}", message.id))?;
    notifier.wait_for_response(&message.id, message.ttl).await
}

/// Spawn the read loop for `conn`.
pub fn serve_connection(
    conn: Arc<dyn Connection>,
    frames: FrameStream,
    processor: Arc<dyn MessageProcessor>,
    notifier: Arc<ResponseNotifier>,
) -> JoinHandle<()> {
    tokio::spawn(read_loop(conn, frames, processor, notifier))
}

async fn read_loop(
    conn: Arc<dyn Connection>,
    mut frames: FrameStream,
    processor: Arc<dyn MessageProcessor>,
    notifier: Arc<ResponseNotifier>,
) {
    tracing::debug!(connection = %conn.id(), "read loop started");
    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(Frame::Text(text)) => text,
            Ok(Frame::Other) => continue,
            Ok(Frame::Close) => break,
            Err(e) => {
                tracing::warn!(connection = %conn.id(), error = %e, "read failed");
                conn.close("read error").await;
                break;
            }
        };

        if let Err(e) = dispatch_envelope(&conn, &text, &processor, &notifier) {
            tracing::warn!(connection = %conn.id(), error = %e, "invalid envelope");
            conn.close("invalid envelope").await;
            break;
        }
    }
    tracing::debug!(connection = %conn.id(), "read loop finished");
}

fn dispatch_envelope(
    conn: &Arc<dyn Connection>,
    text: &str,
    processor: &Arc<dyn MessageProcessor>,
    notifier: &ResponseNotifier,
) -> Result<()> {
    let envelope = Envelope::parse(text)?;
    match envelope.kind {
        EnvelopeKind::Response => {
            let resp = envelope.decode_response()?;
            tracing::debug!(connection = %conn.id(), message_id = %resp.id, "response received");
            notifier.notify(resp);
        }
        EnvelopeKind::Request => {
            let message = envelope.decode_message()?;
            tokio::spawn(answer(Arc::clone(conn), Arc::clone(processor), message));
        }
    }
    Ok(())
}

async fn answer(conn: Arc<dyn Connection>, processor: Arc<dyn MessageProcessor>, message: Message) {
    let id = message.id.clone();
    let application = message.application.clone();
    let resp = match processor.process_message(message).await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(application = %application, message_id = %id, error = %err, "processing failed");
            Response::failure(id.clone(), ProxyError::from_error(&err))
        }
    };

    let written = match Envelope::response(&resp) {
        Ok(envelope) => conn.write(&envelope).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        tracing::warn!(application = %application, message_id = %id, error = %e, "failed to write response");
    }
}
