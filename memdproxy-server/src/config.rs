//! Proxy configuration.

/// Default port of the proxied protocol.
pub const DEFAULT_PORT: u16 = 11210;

/// Default capacity of each outbound queue.
///
/// Must be at least 1: a handler may issue several `forward`/`reply`
/// actions per invocation, and those are flushed while the writer may be
/// busy. Small on purpose so back-pressure reaches the readers instead of
/// buffering without bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Backend host to dial for every accepted connection.
    pub backend_host: String,
    /// Backend port.
    pub backend_port: u16,
    /// Port to listen on.
    pub listen_port: u16,
    /// Capacity of each per-direction outbound queue.
    pub queue_capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend_host: "127.0.0.1".to_string(),
            backend_port: DEFAULT_PORT,
            listen_port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, host: impl Into<String>, port: u16) -> Self {
        self.backend_host = host.into();
        self.backend_port = port;
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// The backend dial address.
    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::new();
        assert_eq!(config.backend_host, "127.0.0.1");
        assert_eq!(config.backend_port, DEFAULT_PORT);
        assert_eq!(config.listen_port, DEFAULT_PORT);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_builder() {
        let config = ProxyConfig::new()
            .with_backend("memd.internal", 11211)
            .with_listen_port(12000)
            .with_queue_capacity(0);
        assert_eq!(config.backend_addr(), "memd.internal:11211");
        assert_eq!(config.listen_port, 12000);
        // zero-capacity queues can self-deadlock; clamped up
        assert_eq!(config.queue_capacity, 1);
    }
}
