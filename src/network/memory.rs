use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{NetworkError, Transport};
use crate::raft::NodeId;

#[derive(Default)]
struct Inner {
    mailboxes: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Vec<u8>>>>,
    isolated: Mutex<HashSet<NodeId>>,
    loss: Mutex<f64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process stand-in for a datagram network.
///
/// Delivery is lossy on request: a fixed loss probability applies to every
/// datagram, and isolated nodes neither send nor receive anything.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Inner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss(probability: f64) -> Self {
        let network = Self::new();
        network.set_loss(probability);
        network
    }

    /// Registers `id` and returns its endpoint. Re-registering replaces the
    /// previous endpoint's mailbox.
    pub fn endpoint(&self, id: NodeId) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.mailboxes).insert(id, tx);
        MemoryTransport {
            id,
            inner: Arc::clone(&self.inner),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Cuts `id` off from every other node until [`heal`](Self::heal).
    pub fn isolate(&self, id: NodeId) {
        lock(&self.inner.isolated).insert(id);
    }

    pub fn heal(&self, id: NodeId) {
        lock(&self.inner.isolated).remove(&id);
    }

    pub fn set_loss(&self, probability: f64) {
        *lock(&self.inner.loss) = probability.clamp(0.0, 1.0);
    }
}

pub struct MemoryTransport {
    id: NodeId,
    inner: Arc<Inner>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    fn deliver(&self, to: NodeId, payload: &[u8]) -> Result<(), NetworkError> {
        let mailbox = lock(&self.inner.mailboxes)
            .get(&to)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(to))?;

        {
            let isolated = lock(&self.inner.isolated);
            if isolated.contains(&self.id) || isolated.contains(&to) {
                return Ok(());
            }
        }

        let loss = *lock(&self.inner.loss);
        if loss > 0.0 && rand::random_bool(loss) {
            return Ok(());
        }

        // A closed mailbox behaves like a dead host: the datagram just vanishes.
        let _ = mailbox.send(payload.to_vec());
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn send(
        &self,
        to: NodeId,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), NetworkError>> + Send {
        let result = self.deliver(to, payload);
        async move { result }
    }

    fn recv(
        &self,
        wait: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, NetworkError>> + Send {
        async move {
            let mut rx = self.rx.lock().await;
            match timeout(wait, rx.recv()).await {
                Err(_) => Ok(None),
                Ok(Some(payload)) => Ok(Some(payload)),
                Ok(None) => Err(NetworkError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_registered_endpoint() {
        let net = MemoryNetwork::new();
        let a = net.endpoint(0);
        let b = net.endpoint(1);

        a.send(1, b"VOTE|1|0|True").await.expect("send");
        let got = b.recv(Duration::from_millis(100)).await.expect("recv");
        assert_eq!(got, Some(b"VOTE|1|0|True".to_vec()));
        assert_eq!(b.local_id(), 1);
    }

    #[tokio::test]
    async fn unknown_peer_is_an_error() {
        let net = MemoryNetwork::new();
        let a = net.endpoint(0);
        assert!(matches!(
            a.send(7, b"x").await,
            Err(NetworkError::UnknownPeer(7))
        ));
    }

    #[tokio::test]
    async fn isolated_nodes_lose_traffic_until_healed() {
        let net = MemoryNetwork::new();
        let a = net.endpoint(0);
        let b = net.endpoint(1);

        net.isolate(1);
        a.send(1, b"one").await.expect("send");
        b.send(0, b"two").await.expect("send");
        assert_eq!(b.recv(Duration::from_millis(20)).await.expect("recv"), None);
        assert_eq!(a.recv(Duration::from_millis(20)).await.expect("recv"), None);

        net.heal(1);
        a.send(1, b"three").await.expect("send");
        assert_eq!(
            b.recv(Duration::from_millis(100)).await.expect("recv"),
            Some(b"three".to_vec())
        );
    }

    #[tokio::test]
    async fn total_loss_drops_everything() {
        let net = MemoryNetwork::with_loss(1.0);
        let a = net.endpoint(0);
        let b = net.endpoint(1);
        for _ in 0..10 {
            a.send(1, b"HEARTBEAT|1|0").await.expect("send");
        }
        assert_eq!(b.recv(Duration::from_millis(20)).await.expect("recv"), None);
    }
}
