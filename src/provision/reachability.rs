// ABOUTME: Network reachability check for freshly provisioned resources.
// ABOUTME: An address being assigned does not mean the host answers yet.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Decides whether a resource's address is accepting connections.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn check(&self, address: &str) -> std::io::Result<bool>;
}

/// Reachable when a TCP connection to a fixed port succeeds.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    port: u16,
    connect_timeout: Duration,
}

impl TcpReachability {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Reachability for TcpReachability {
    async fn check(&self, address: &str) -> std::io::Result<bool> {
        match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((address, self.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => Ok(false),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reachable_when_listener_accepts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let check = TcpReachability::new(port);
        assert!(check.check("127.0.0.1").await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_when_nothing_listens() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let check = TcpReachability::new(port).connect_timeout(Duration::from_millis(500));
        assert!(!check.check("127.0.0.1").await.unwrap());
    }
}
