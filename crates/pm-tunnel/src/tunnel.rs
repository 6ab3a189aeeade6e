//! Multiplexed tunnel over one framed stream
//!
//! All outbound frames funnel through one unbounded queue drained by a
//! single writer task, so session payloads and control messages are written
//! to the stream whole and in submission order. Inbound frames are decoded
//! by a reader pump and dispatched synchronously to the session registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use pm_core::SessionError;
use pm_protocol::{Frame, FrameCodec, TunnelMessage};

use crate::manager::SessionManager;
use crate::session::Session;

/// Which end of the tunnel this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelRole {
    /// Accepts client connections and originates sessions
    Local,
    /// Mirrors sessions and connects upstream targets
    Server,
}

impl std::fmt::Display for TunnelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunnelRole::Local => write!(f, "local"),
            TunnelRole::Server => write!(f, "server"),
        }
    }
}

struct TunnelInner {
    role: TunnelRole,
    outbound: mpsc::UnboundedSender<Frame>,
    /// Held until `start` hands it to the writer task
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    manager: SessionManager,
    cancel: CancellationToken,
    disconnected: AtomicBool,
}

/// Handle to one multiplexed tunnel; cheap to clone
#[derive(Clone)]
pub struct Tunnel {
    inner: Arc<TunnelInner>,
}

impl Tunnel {
    /// Create a tunnel for the given role, not yet bound to a stream
    pub fn new(role: TunnelRole) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(TunnelInner {
                role,
                outbound,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                manager: SessionManager::new(),
                cancel: CancellationToken::new(),
                disconnected: AtomicBool::new(false),
            }),
        }
    }

    /// Which end of the tunnel this is
    pub fn role(&self) -> TunnelRole {
        self.inner.role
    }

    /// Session registry for this tunnel
    pub fn manager(&self) -> &SessionManager {
        &self.inner.manager
    }

    /// Whether the tunnel has been torn down
    pub fn is_disconnected(&self) -> bool {
        self.inner.disconnected.load(Ordering::Acquire)
    }

    /// Resolves once the tunnel has been torn down
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Bind the tunnel to a stream and spawn its reader and writer tasks.
    ///
    /// The stream is typically a finished TLS session; tests use in-memory
    /// duplex pipes or plain TCP.
    pub fn start<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut outbound_rx = self
            .inner
            .outbound_rx
            .lock()
            .expect("tunnel state lock poisoned")
            .take()
            .expect("tunnel started twice");

        let (read_half, write_half) = tokio::io::split(stream);
        let mut framed_read = FramedRead::new(read_half, FrameCodec::new());
        let mut framed_write = FramedWrite::new(write_half, FrameCodec::new());

        let tunnel = self.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = tunnel.inner.cancel.cancelled() => break,
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                if let Err(e) = framed_write.send(frame).await {
                    if !tunnel.is_disconnected() {
                        error!(role = %tunnel.role(), "tunnel write failed: {}", e);
                        tunnel.disconnect();
                    }
                    break;
                }
            }
        });

        let tunnel = self.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = tunnel.inner.cancel.cancelled() => break,
                    next = framed_read.next() => next,
                };
                match next {
                    Some(Ok(frame)) => tunnel.dispatch(frame),
                    Some(Err(e)) => {
                        error!(role = %tunnel.role(), "tunnel stream corrupt: {}", e);
                        tunnel.disconnect();
                        break;
                    }
                    None => {
                        info!(role = %tunnel.role(), "tunnel closed by peer");
                        tunnel.disconnect();
                        break;
                    }
                }
            }
        });
    }

    /// Queue a frame for the tunnel's writer task
    pub fn send(&self, frame: Frame) -> Result<(), SessionError> {
        if self.is_disconnected() {
            return Err(SessionError::TunnelClosed);
        }
        self.inner
            .outbound
            .send(frame)
            .map_err(|_| SessionError::TunnelClosed)
    }

    fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Session(pkg) => match self.manager().get(pkg.session_id) {
                Some(session) => session.deliver(pkg.data),
                // Late frames for a destroyed session are expected
                None => debug!(id = %pkg.session_id, "dropping frame for unknown session"),
            },
            Frame::Control(TunnelMessage::NewSession(request)) => match self.role() {
                TunnelRole::Server => {
                    let id = request.session_id;
                    debug!(id = %id, target = %request.target, "peer requested new session");
                    let session = Session::server(self.clone(), request);
                    if !self.manager().insert_and_start(session) {
                        // Reusing a live id would cross-wire two sessions
                        error!(id = %id, "protocol violation: duplicate session id");
                        self.disconnect();
                    }
                }
                TunnelRole::Local => {
                    // Only the Local end originates sessions
                    error!("protocol violation: NewSession received on local end");
                    self.disconnect();
                }
            },
            Frame::Control(TunnelMessage::SessionDestroy(id)) => {
                if let Some(session) = self.manager().get(id) {
                    session.destroy(false);
                } else {
                    debug!(id = %id, "destroy for unknown session");
                }
            }
        }
    }

    /// Tear the tunnel down and cascade destruction to every session.
    ///
    /// One-shot; later callers return immediately. Sessions destroyed here
    /// skip peer notification, the stream is already gone.
    pub fn disconnect(&self) {
        if self.inner.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(role = %self.role(), sessions = self.manager().len(), "tunnel disconnecting");
        self.inner.cancel.cancel();
        // Snapshot first; destroy removes entries from the registry
        for session in self.manager().snapshot() {
            session.destroy(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pm_protocol::SessionId;

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let tunnel = Tunnel::new(TunnelRole::Local);
        tunnel.disconnect();
        let result = tunnel.send(Frame::session(SessionId::new(1), Bytes::new()));
        assert!(matches!(result, Err(SessionError::TunnelClosed)));
    }

    #[tokio::test]
    async fn test_disconnect_is_one_shot() {
        let tunnel = Tunnel::new(TunnelRole::Server);
        tunnel.disconnect();
        assert!(tunnel.is_disconnected());
        tunnel.disconnect();
        tunnel.closed().await;
    }

    #[tokio::test]
    async fn test_destroy_for_unknown_session_is_harmless() {
        let tunnel = Tunnel::new(TunnelRole::Local);
        tunnel.dispatch(Frame::session_destroy(SessionId::new(404)));
        assert!(!tunnel.is_disconnected());
    }

    #[tokio::test]
    async fn test_session_frame_for_unknown_session_is_dropped() {
        let tunnel = Tunnel::new(TunnelRole::Server);
        tunnel.dispatch(Frame::session(SessionId::new(404), Bytes::from_static(b"x")));
        assert!(!tunnel.is_disconnected());
    }
}
