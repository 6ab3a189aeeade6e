//! One proxied session
//!
//! A session owns one client-facing or upstream socket and shuttles bytes
//! between it and the tunnel. Writes toward the socket go through a single
//! writer task fed by an unbounded queue, so concurrent frame deliveries
//! never interleave mid-buffer. Teardown is a one-shot atomic exchange;
//! whichever caller wins it removes the session from the registry and, when
//! asked, notifies the peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use pm_core::{ProxyError, SessionError};
use pm_protocol::{Frame, NewSessionRequest, ProtoType, SessionId, CHUNK_SIZE};

use crate::tunnel::Tunnel;

/// Socket half a session still has to set up when `start` runs
enum Launch {
    /// Local side: an accepted client connection plus the request to mirror
    Local {
        stream: TcpStream,
        request: NewSessionRequest,
    },
    /// Server side: the upstream target still needs connecting
    Server { request: NewSessionRequest },
}

struct SessionState {
    launch: Option<Launch>,
    write_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
}

/// One proxied connection multiplexed over a tunnel
pub struct Session {
    id: SessionId,
    proto: ProtoType,
    tunnel: Tunnel,
    /// Set once forwarding loops are live; cleared on destroy so socket
    /// errors after teardown are classified as expected
    running: AtomicBool,
    /// One-shot destroy guard, independent of `running` so a session can be
    /// torn down before forwarding ever starts
    destroyed: AtomicBool,
    cancel: CancellationToken,
    write_tx: mpsc::UnboundedSender<Bytes>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a Local-side session for an accepted client connection.
    ///
    /// Allocates a session id from the tunnel's registry; the peer adopts
    /// the same id when it mirrors the session.
    pub fn local(
        tunnel: Tunnel,
        stream: TcpStream,
        proto: ProtoType,
        target: pm_protocol::Address,
    ) -> Arc<Self> {
        let id = tunnel.manager().allocate_id();
        let request = NewSessionRequest {
            session_id: id,
            proto,
            target,
        };
        Self::build(id, proto, tunnel, Launch::Local { stream, request })
    }

    /// Create a Server-side session mirroring a peer's NewSession request
    pub fn server(tunnel: Tunnel, request: NewSessionRequest) -> Arc<Self> {
        let id = request.session_id;
        let proto = request.proto;
        Self::build(id, proto, tunnel, Launch::Server { request })
    }

    fn build(id: SessionId, proto: ProtoType, tunnel: Tunnel, launch: Launch) -> Arc<Self> {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id,
            proto,
            tunnel,
            running: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            write_tx,
            state: Mutex::new(SessionState {
                launch: Some(launch),
                write_rx: Some(write_rx),
            }),
        })
    }

    /// Session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Transport protocol of the proxied connection
    pub fn proto(&self) -> ProtoType {
        self.proto
    }

    /// Whether forwarding loops are live
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the session has been torn down
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Bring the session up.
    ///
    /// Local side announces itself to the peer, Server side connects the
    /// upstream socket. Either way the forwarding loops are spawned before
    /// this returns.
    pub async fn start(self: &Arc<Self>) -> Result<(), ProxyError> {
        let launch = self
            .state
            .lock()
            .expect("session state lock poisoned")
            .launch
            .take()
            .ok_or(SessionError::AlreadyStarted)?;

        // A racing destroy may have won while we were queued to start
        if self.is_destroyed() {
            debug!(id = %self.id, "session destroyed before start");
            return Ok(());
        }

        match launch {
            Launch::Local { stream, request } => {
                self.tunnel.send(Frame::new_session(request))?;
                self.start_tcp(stream);
            }
            Launch::Server { request } => {
                let addr = pm_core::resolve::resolve_target(&request.target).await?;
                match request.proto {
                    ProtoType::Tcp => {
                        let stream = TcpStream::connect(addr).await.map_err(|source| {
                            SessionError::UpstreamConnect {
                                target: request.target.to_string(),
                                source,
                            }
                        })?;
                        self.start_tcp(stream);
                    }
                    ProtoType::Udp => {
                        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                        let socket = UdpSocket::bind(bind_addr).await?;
                        socket.connect(addr).await.map_err(|source| {
                            SessionError::UpstreamConnect {
                                target: request.target.to_string(),
                                source,
                            }
                        })?;
                        self.start_udp(socket);
                    }
                }
            }
        }
        Ok(())
    }

    /// Flag forwarding as live, unless a destroy raced in after the check
    /// in `start`. Storing before re-checking means any interleaving with
    /// `destroy` (which sets `destroyed` first, then clears `running`)
    /// leaves a destroyed session with `running == false`.
    fn mark_running(&self) {
        self.running.store(true, Ordering::Release);
        if self.is_destroyed() {
            self.running.store(false, Ordering::Release);
        }
    }

    fn take_write_rx(&self) -> mpsc::UnboundedReceiver<Bytes> {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .write_rx
            .take()
            .expect("write receiver taken twice")
    }

    fn start_tcp(self: &Arc<Self>, stream: TcpStream) {
        let mut write_rx = self.take_write_rx();
        self.mark_running();
        let (mut read_half, mut write_half) = stream.into_split();

        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    result = read_half.read(&mut buf) => match result {
                        Ok(0) => {
                            debug!(id = %session.id, "socket closed by peer");
                            session.destroy(true);
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            if session.is_running() {
                                debug!(id = %session.id, "socket read error: {}", e);
                                session.destroy(true);
                            }
                            break;
                        }
                    },
                };
                trace!(id = %session.id, bytes = n, "socket -> tunnel");
                let frame = Frame::session(session.id, Bytes::copy_from_slice(&buf[..n]));
                if session.tunnel.send(frame).is_err() {
                    session.destroy(false);
                    break;
                }
            }
        });

        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let data = tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    data = write_rx.recv() => match data {
                        Some(data) => data,
                        None => break,
                    },
                };
                trace!(id = %session.id, bytes = data.len(), "tunnel -> socket");
                if let Err(e) = write_half.write_all(&data).await {
                    if session.is_running() {
                        debug!(id = %session.id, "socket write error: {}", e);
                        session.destroy(true);
                    }
                    break;
                }
            }
        });
    }

    fn start_udp(self: &Arc<Self>, socket: UdpSocket) {
        let mut write_rx = self.take_write_rx();
        self.mark_running();
        let socket = Arc::new(socket);

        let session = Arc::clone(self);
        let recv_socket = Arc::clone(&socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    result = recv_socket.recv(&mut buf) => match result {
                        Ok(n) => n,
                        Err(e) => {
                            if session.is_running() {
                                debug!(id = %session.id, "udp recv error: {}", e);
                                session.destroy(true);
                            }
                            break;
                        }
                    },
                };
                trace!(id = %session.id, bytes = n, "socket -> tunnel");
                let frame = Frame::session(session.id, Bytes::copy_from_slice(&buf[..n]));
                if session.tunnel.send(frame).is_err() {
                    session.destroy(false);
                    break;
                }
            }
        });

        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let data = tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    data = write_rx.recv() => match data {
                        Some(data) => data,
                        None => break,
                    },
                };
                trace!(id = %session.id, bytes = data.len(), "tunnel -> socket");
                if let Err(e) = socket.send(&data).await {
                    if session.is_running() {
                        debug!(id = %session.id, "udp send error: {}", e);
                        session.destroy(true);
                    }
                    break;
                }
            }
        });
    }

    /// Queue bytes received from the tunnel for the socket writer.
    ///
    /// Gated on the destroy flag rather than `running`, so frames arriving
    /// while the upstream connect is still in flight are buffered instead of
    /// dropped.
    pub fn deliver(&self, data: Bytes) {
        if self.is_destroyed() {
            trace!(id = %self.id, "dropping delivery to destroyed session");
            return;
        }
        let _ = self.write_tx.send(data);
    }

    /// Tear the session down.
    ///
    /// Only the first caller proceeds; winning the registry removal decides
    /// who gets to notify the peer. The notification send is allowed to
    /// fail, the tunnel may already be gone.
    pub fn destroy(&self, notify_peer: bool) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();
        if self.tunnel.manager().remove(self.id) && notify_peer {
            if self.tunnel.send(Frame::session_destroy(self.id)).is_err() {
                warn!(id = %self.id, "peer destroy notification lost, tunnel closed");
            }
        }
        debug!(id = %self.id, "session destroyed");
    }
}
