use crate::error::{Error, Result};
use std::collections::HashMap;
use std::net::TcpListener;

/// Host port bookkeeping for one compilation.
///
/// Ephemeral ports are reserved by keeping the bound listener alive until the
/// allocator is dropped, so nothing else can grab the port between
/// compilation and the moment the tools launch. Dropping the build state
/// releases every listener.
#[derive(Debug, Default)]
pub struct PortAllocator {
    /// Port -> service that claimed it.
    claimed: HashMap<u16, String>,
    listeners: Vec<TcpListener>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a port declared in configuration.
    ///
    /// Two services claiming the same port is an error; the same service
    /// claiming it again is not.
    pub fn claim(&mut self, service: &str, port: u16) -> Result<u16> {
        if port == 0 {
            return Err(Error::PortAllocation(format!(
                "Service '{}' declares port 0; omit the port to get an ephemeral one",
                service
            )));
        }
        match self.claimed.get(&port) {
            Some(owner) if owner != service => Err(Error::PortAllocation(format!(
                "Port {} is declared by both '{}' and '{}'",
                port, owner, service
            ))),
            _ => {
                self.claimed.insert(port, service.to_string());
                Ok(port)
            }
        }
    }

    /// Allocate a random free port on the loopback interface for `service`.
    pub fn allocate(&mut self, service: &str) -> Result<u16> {
        loop {
            let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| {
                Error::PortAllocation(format!("Failed to bind to random port: {}", e))
            })?;
            let port = listener
                .local_addr()
                .map_err(|e| {
                    Error::PortAllocation(format!("Failed to get local address: {}", e))
                })?
                .port();

            // The OS may hand back a port that a later service declares
            // explicitly; it was already claimed only if declared earlier.
            if self.claimed.contains_key(&port) {
                continue;
            }

            self.listeners.push(listener);
            self.claimed.insert(port, service.to_string());
            return Ok(port);
        }
    }

    pub fn owner(&self, port: u16) -> Option<&str> {
        self.claimed.get(&port).map(String::as_str)
    }

    /// Close the reservation sockets. Ports stay recorded.
    pub fn release_listeners(&mut self) {
        let count = self.listeners.len();
        self.listeners.clear();
        if count > 0 {
            tracing::debug!("Released {} reserved port listener(s)", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_reserves_distinct_ports() {
        let mut allocator = PortAllocator::new();
        let a = allocator.allocate("a").unwrap();
        let b = allocator.allocate("b").unwrap();
        assert_ne!(a, b);
        assert_eq!(allocator.owner(a), Some("a"));

        // Reserved while the allocator holds the listener.
        assert!(TcpListener::bind(("127.0.0.1", a)).is_err());
        allocator.release_listeners();
        assert!(TcpListener::bind(("127.0.0.1", a)).is_ok());
    }

    #[test]
    fn test_claim_conflict_between_services() {
        let mut allocator = PortAllocator::new();
        allocator.claim("api", 5080).unwrap();
        allocator.claim("api", 5080).unwrap();
        let err = allocator.claim("web", 5080).unwrap_err();
        assert!(err.to_string().contains("'api'"));
        assert!(err.to_string().contains("'web'"));
    }

    #[test]
    fn test_claim_rejects_zero() {
        let mut allocator = PortAllocator::new();
        assert!(allocator.claim("api", 0).is_err());
    }
}
