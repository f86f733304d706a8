//! Signaling timers.
//!
//! Every timer is a spawned task that posts an [`Internal`] event back to
//! the coordinator loop when it fires. The returned [`TimerGuard`] cancels
//! the task when dropped, so clearing a field on the call entry is enough
//! to stop a retransmission or a timeout.

use std::net::SocketAddr;
use std::time::Duration;

use switchboard_sip_core::types::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::events::Internal;
use crate::transport::SipTransport;

/// RFC 3261 T1
pub const T1: Duration = Duration::from_millis(500);
/// RFC 3261 T2
pub const T2: Duration = Duration::from_secs(4);
/// INVITE client transaction timeout (Timer B, 64*T1)
pub const TIMER_B: Duration = Duration::from_secs(32);

/// Aborts its timer task on drop
#[derive(Debug)]
pub(crate) struct TimerGuard(JoinHandle<()>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resend `message` with exponential backoff starting at T1 and capped at
/// T2. Once `timeout` elapses without the guard being dropped, `on_timeout`
/// is posted to the coordinator.
pub(crate) fn retransmit(
    transport: SipTransport,
    message: Message,
    destination: SocketAddr,
    timeout: Duration,
    internal_tx: mpsc::UnboundedSender<Internal>,
    on_timeout: Internal,
) -> TimerGuard {
    TimerGuard(tokio::spawn(async move {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut interval = T1;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let wake = (now + interval).min(deadline);
            tokio::time::sleep_until(wake).await;
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            trace!(%destination, ?interval, "retransmitting");
            if transport.send(message.clone(), destination).await.is_err() {
                break;
            }
            interval = (interval * 2).min(T2);
        }
        debug!(%destination, ?timeout, "retransmission timer expired");
        let _ = internal_tx.send(on_timeout);
    }))
}

/// Post `event` after `delay`
pub(crate) fn after(delay: Duration, internal_tx: mpsc::UnboundedSender<Internal>, event: Internal) -> TimerGuard {
    TimerGuard(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = internal_tx.send(event);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_sip_core::types::{Response, StatusCode};
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn retransmits_until_timeout() {
        let (transport, _rx) = SipTransport::bind("127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _guard = retransmit(
            transport,
            Response::new(StatusCode::Ok).into(),
            peer.local_addr().unwrap(),
            Duration::from_millis(1200),
            tx,
            Internal::AckTimeout {
                call_id: "c1".into(),
            },
        );

        // resent at 500 ms; the next one would land after the deadline
        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(std::str::from_utf8(&buf[..len]).unwrap().starts_with("SIP/2.0 200"));

        let fired = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await.unwrap();
        assert!(matches!(fired, Some(Internal::AckTimeout { call_id }) if call_id == "c1"));
    }

    #[tokio::test]
    async fn dropping_the_guard_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let guard = after(
            Duration::from_millis(50),
            tx,
            Internal::NoAnswer {
                call_id: "c1".into(),
            },
        );
        drop(guard);
        let waited = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        // the sender was dropped with the task, so the channel closes empty
        assert!(matches!(waited, Ok(None)));
    }
}
