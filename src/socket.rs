//! Datagram transport abstraction.
//!
//! [`Transport`] is everything the protocol needs from the network: send one
//! datagram to the peer, receive the next one.  No ordering, no delivery
//! guarantee.  All methods take `&self` so the sender's two workers can
//! share one transport.
//!
//! [`UdpTransport`] is the real implementation.  Like the legacy peers it
//! uses two sockets per side: one bound to the local inbound port, and one
//! ephemeral socket for outbound datagrams.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

use crate::error::TransferError;

/// An unreliable, unordered datagram channel to a single peer.
pub trait Transport: Send + Sync {
    /// Send `datagram` to the peer as one message.
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait for the next datagram and copy it into `buf`, returning its
    /// length.  Oversized datagrams are truncated to `buf.len()`.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct UdpTransport {
    inbound: UdpSocket,
    outbound: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Bind the inbound socket to `listen` and send everything to `peer`.
    pub async fn bind(listen: SocketAddr, peer: SocketAddr) -> Result<Self, TransferError> {
        let inbound = UdpSocket::bind(listen)
            .await
            .map_err(|source| TransferError::Bind {
                addr: listen,
                source,
            })?;
        Self::with_inbound(inbound, peer).await
    }

    /// Wrap an already-bound inbound socket; the outbound socket gets an
    /// ephemeral port.
    pub async fn with_inbound(inbound: UdpSocket, peer: SocketAddr) -> Result<Self, TransferError> {
        let any = match peer.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let addr = SocketAddr::new(any, 0);
        let outbound = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransferError::Bind { addr, source })?;
        Ok(Self {
            inbound,
            outbound,
            peer,
        })
    }

    /// Address the inbound socket is bound to (with the OS-assigned port).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inbound.local_addr()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        self.outbound.send_to(datagram, self.peer).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, _from) = self.inbound.recv_from(buf).await?;
        Ok(n)
    }
}
