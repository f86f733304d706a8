//! RTP port allocation.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::net::UdpSocket;
use tracing::{debug, error};

use crate::error::SocketError;

/// Hands out bound UDP sockets on even ports of a range, round-robin.
///
/// Allocation starts at a random slot.
/// Ports that fail to bind are skipped; the odd neighbour is left for
/// RTCP even though the relay multiplexes it. A range starting at 0 binds
/// ephemeral ports instead.
#[derive(Debug)]
pub struct PortAllocator {
    ip: IpAddr,
    start: u16,
    end: u16,
    next: AtomicU32,
}

impl PortAllocator {
    pub fn new(ip: IpAddr, start: u16, end: u16) -> Self {
        Self {
            ip,
            start,
            end,
            next: AtomicU32::new(rand::random()),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    fn first_even(&self) -> u32 {
        let start = self.start as u32;
        start + (start & 1)
    }

    /// Number of even ports in the range
    pub fn capacity(&self) -> u32 {
        let first = self.first_even();
        let end = self.end as u32;
        if first > end {
            0
        } else {
            (end - first) / 2 + 1
        }
    }

    /// Bind the next free even port
    pub async fn allocate(&self) -> Result<UdpSocket, SocketError> {
        if self.start == 0 {
            let addr = SocketAddr::new(self.ip, 0);
            return UdpSocket::bind(addr)
                .await
                .map_err(|source| SocketError::Bind { addr, source });
        }

        let slots = self.capacity();
        for _ in 0..slots {
            let slot = self.next.fetch_add(1, Ordering::Relaxed) % slots;
            let port = (self.first_even() + slot * 2) as u16;
            let addr = SocketAddr::new(self.ip, port);
            match UdpSocket::bind(addr).await {
                Ok(socket) => {
                    debug!(%addr, "allocated RTP port");
                    return Ok(socket);
                }
                Err(e) => debug!(%addr, error = %e, "RTP port unavailable, trying next"),
            }
        }

        error!(ip = %self.ip, start = self.start, end = self.end, "RTP port range exhausted");
        Err(SocketError::PortRangeExhausted {
            ip: self.ip,
            start: self.start,
            end: self.end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn capacity_counts_even_ports() {
        assert_eq!(PortAllocator::new(LOCALHOST, 10000, 10010).capacity(), 6);
        assert_eq!(PortAllocator::new(LOCALHOST, 10001, 10003).capacity(), 1);
        assert_eq!(PortAllocator::new(LOCALHOST, 10001, 10001).capacity(), 0);
    }

    #[tokio::test]
    async fn allocates_even_ports_round_robin() {
        let probe = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let base = probe.local_addr().unwrap().port() & !1;
        drop(probe);
        let alloc = PortAllocator::new(LOCALHOST, base, base.saturating_add(40));
        let first = alloc.allocate().await.unwrap();
        let second = alloc.allocate().await.unwrap();
        let (p1, p2) = (first.local_addr().unwrap().port(), second.local_addr().unwrap().port());
        assert_eq!(p1 % 2, 0);
        assert_eq!(p2 % 2, 0);
        assert_ne!(p1, p2);
        assert!((base..=base + 40).contains(&p1));
    }

    #[tokio::test]
    async fn busy_range_is_exhausted() {
        let holder = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let port = holder.local_addr().unwrap().port();
        let alloc = PortAllocator::new(LOCALHOST, port, port);
        match alloc.allocate().await {
            Err(SocketError::PortRangeExhausted { start, end, .. }) => {
                assert_eq!((start, end), (port, port));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|s| s.local_addr())),
        }
    }

    #[tokio::test]
    async fn zero_start_binds_ephemeral() {
        let alloc = PortAllocator::new(LOCALHOST, 0, 0);
        let socket = alloc.allocate().await.unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }
}
