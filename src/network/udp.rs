use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::{NetworkError, Transport, MAX_DATAGRAM};
use crate::raft::NodeId;

/// Maps node ids onto `host:base_port + id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub host: IpAddr,
    pub base_port: u16,
}

impl PortMap {
    pub fn new(host: &str, base_port: u16) -> Result<Self, NetworkError> {
        let host = host
            .parse()
            .map_err(|_| NetworkError::AddressError(format!("invalid host: {host}")))?;
        Ok(Self { host, base_port })
    }

    pub fn address_of(&self, id: NodeId) -> Result<SocketAddr, NetworkError> {
        let port = u16::try_from(id)
            .ok()
            .and_then(|id| self.base_port.checked_add(id))
            .ok_or_else(|| {
                NetworkError::AddressError(format!(
                    "node {id} has no port above base {}",
                    self.base_port
                ))
            })?;
        Ok(SocketAddr::new(self.host, port))
    }
}

pub struct UdpTransport {
    id: NodeId,
    ports: PortMap,
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(id: NodeId, ports: PortMap) -> Result<Self, NetworkError> {
        let addr = ports.address_of(id)?;
        let socket = UdpSocket::bind(addr).await?;
        debug!("Node {id} listening on udp://{addr}");
        Ok(Self { id, ports, socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn send(
        &self,
        to: NodeId,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), NetworkError>> + Send {
        async move {
            let addr = self.ports.address_of(to)?;
            self.socket.send_to(payload, addr).await?;
            Ok(())
        }
    }

    fn recv(
        &self,
        wait: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, NetworkError>> + Send {
        async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            match timeout(wait, self.socket.recv_from(&mut buf)).await {
                Err(_) => Ok(None),
                Ok(Ok((len, _from))) => {
                    buf.truncate(len);
                    Ok(Some(buf))
                }
                Ok(Err(e)) => Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_map_adds_id_to_base() {
        let ports = PortMap::new("127.0.0.1", 5000).expect("ports");
        assert_eq!(
            ports.address_of(2).expect("addr"),
            "127.0.0.1:5002".parse::<SocketAddr>().expect("literal")
        );
    }

    #[test]
    fn port_map_rejects_overflow_and_bad_host() {
        let ports = PortMap::new("127.0.0.1", 65530).expect("ports");
        assert!(ports.address_of(10).is_err());
        assert!(ports.address_of(u64::MAX).is_err());
        assert!(PortMap::new("not-a-host", 5000).is_err());
    }

    #[tokio::test]
    async fn datagrams_reach_the_addressed_node() {
        // Random high base so parallel test runs rarely collide.
        let base = 30000 + rand::random_range(0u16..2000) * 2;
        let ports = PortMap::new("127.0.0.1", base).expect("ports");
        let a = UdpTransport::bind(0, ports).await.expect("bind 0");
        let b = UdpTransport::bind(1, ports).await.expect("bind 1");

        a.send(1, b"HEARTBEAT|1|0").await.expect("send");
        let got = b
            .recv(Duration::from_secs(2))
            .await
            .expect("recv")
            .expect("datagram");
        assert_eq!(got, b"HEARTBEAT|1|0".to_vec());
    }

    #[tokio::test]
    async fn recv_times_out_with_none() {
        let base = 34000 + rand::random_range(0u16..2000) * 2;
        let ports = PortMap::new("127.0.0.1", base).expect("ports");
        let a = UdpTransport::bind(0, ports).await.expect("bind");
        let got = a.recv(Duration::from_millis(20)).await.expect("recv");
        assert!(got.is_none());
    }
}
