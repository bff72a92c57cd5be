use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::debug;

use super::{Checker, ProbeOutcome, elapsed_ms};
use crate::models::{ProtocolConfig, Transport};

/// Payload of the best-effort UDP datagram
const UDP_PROBE_PAYLOAD: &[u8] = b"ping";

/// Raw transport probe: TCP connect or a single UDP datagram
pub struct DirectChecker {
    tcp_timeout: Duration,
    udp_timeout: Duration,
}

impl DirectChecker {
    pub fn new(tcp_timeout: Duration, udp_timeout: Duration) -> Self {
        Self { tcp_timeout, udp_timeout }
    }

    /// Connected with latency if the handshake completes in time
    pub async fn check_tcp(&self, host: &str, port: u16) -> ProbeOutcome {
        let start = Instant::now();

        match timeout(self.tcp_timeout, TcpStream::connect((host, port))).await {
            Err(_) => ProbeOutcome::disconnected(format!(
                "TCP connection timeout after {}s",
                self.tcp_timeout.as_secs_f32()
            )),
            Ok(Err(e)) => ProbeOutcome::disconnected(format!("TCP connection failed: {}", e)),
            Ok(Ok(stream)) => {
                let latency = elapsed_ms(start);
                drop(stream);
                ProbeOutcome::connected(Some(latency))
            }
        }
    }

    /// Best-effort UDP reachability
    ///
    /// A datagram that leaves without a socket error counts as reachable.
    /// Latency is reported only when something answers within the timeout.
    pub async fn check_udp(&self, host: &str, port: u16) -> ProbeOutcome {
        let target = match timeout(self.udp_timeout, lookup_host((host, port))).await {
            Err(_) => return ProbeOutcome::disconnected("UDP address resolution timed out"),
            Ok(Err(e)) => {
                return ProbeOutcome::disconnected(format!("UDP address resolution failed: {}", e));
            }
            Ok(Ok(mut addrs)) => match addrs.next() {
                Some(addr) => addr,
                None => {
                    return ProbeOutcome::disconnected(format!("no address found for {}", host));
                }
            },
        };

        let local: SocketAddr = if target.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let socket = match UdpSocket::bind(local).await {
            Ok(socket) => socket,
            Err(e) => return ProbeOutcome::disconnected(format!("UDP socket error: {}", e)),
        };

        let start = Instant::now();
        if let Err(e) = socket.send_to(UDP_PROBE_PAYLOAD, target).await {
            return ProbeOutcome::disconnected(format!("UDP send failed: {}", e));
        }

        let mut buf = [0u8; 512];
        match timeout(self.udp_timeout, socket.recv_from(&mut buf)).await {
            Ok(Ok(_)) => ProbeOutcome::connected(Some(elapsed_ms(start))),
            Ok(Err(e)) => {
                debug!(%target, "UDP receive error treated as no reply: {}", e);
                ProbeOutcome::connected(None)
            }
            Err(_) => ProbeOutcome::connected(None),
        }
    }
}

#[async_trait::async_trait]
impl Checker for DirectChecker {
    async fn check(&self, config: &ProtocolConfig) -> ProbeOutcome {
        match config.transport {
            Transport::Tcp => self.check_tcp(&config.host, config.port).await,
            Transport::Udp => self.check_udp(&config.host, config.port).await,
        }
    }
}
