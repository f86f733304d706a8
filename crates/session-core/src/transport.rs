//! UDP transport for SIP signaling.
//!
//! One socket carries every dialog. A receive task parses each datagram and
//! forwards the message on a channel; datagrams that fail to parse are
//! logged and dropped without reaching the coordinator.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use switchboard_sip_core::types::Message;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, SessionError};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const MAX_DATAGRAM: usize = 65_535;

/// Events produced by the receive loop
#[derive(Debug)]
pub enum TransportEvent {
    MessageReceived { message: Message, source: SocketAddr },
    Closed,
}

/// Shared handle to the signaling socket
#[derive(Clone)]
pub struct SipTransport {
    inner: Arc<Inner>,
}

struct Inner {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    closed: AtomicBool,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl SipTransport {
    /// Bind `addr` and start receiving
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SessionError::transport(format!("failed to bind {}: {}", addr, e)))?;
        let local_addr = socket.local_addr()?;
        info!("SIP UDP transport bound to {}", local_addr);

        let transport = SipTransport {
            inner: Arc::new(Inner {
                socket: Arc::new(socket),
                local_addr,
                closed: AtomicBool::new(false),
                receive_task: Mutex::new(None),
            }),
        };
        let task = transport.spawn_receive_loop(events_tx);
        *transport.inner.receive_task.lock() = Some(task);
        Ok((transport, events_rx))
    }

    fn spawn_receive_loop(&self, events_tx: mpsc::Sender<TransportEvent>) -> JoinHandle<()> {
        let socket = self.inner.socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, source) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP port unreachable surfaces here on some platforms
                        debug!("error receiving SIP datagram: {}", e);
                        continue;
                    }
                };
                let data = &buf[..len];
                if data.iter().all(|b| b.is_ascii_whitespace()) {
                    trace!(%source, "keep-alive datagram");
                    continue;
                }
                match switchboard_sip_core::parse_message(data) {
                    Ok(message) => {
                        trace!(%source, bytes = len, "received SIP message");
                        let event = TransportEvent::MessageReceived { message, source };
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%source, error = %e, "dropping malformed SIP message");
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Closed).await;
            info!("SIP receive loop terminated");
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub async fn send(&self, message: impl Into<Message>, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::transport("transport closed"));
        }
        let message = message.into();
        let bytes = message.to_bytes();
        match &message {
            Message::Request(req) => debug!(method = %req.method, %destination, bytes = bytes.len(), "sending SIP request"),
            Message::Response(resp) => debug!(status = resp.status.as_u16(), %destination, bytes = bytes.len(), "sending SIP response"),
        }
        self.inner.socket.send_to(&bytes, destination).await.map_err(|e| {
            error!(%destination, error = %e, "failed to send SIP message");
            SessionError::transport(e)
        })?;
        Ok(())
    }

    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::Relaxed) {
            if let Some(task) = self.inner.receive_task.lock().take() {
                task.abort();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SipTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SipTransport({})", self.inner.local_addr)
    }
}
