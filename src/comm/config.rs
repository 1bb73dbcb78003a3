use crate::comm::error::CommInitError;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Largest UDP payload deliverable over IPv4
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

/// Comm module configuration
#[derive(Debug, Clone)]
pub struct CommConfig {
    /// Listen address (default: 127.0.0.1)
    pub listen_addr: String,
    /// Listen port (default: 9710)
    pub listen_port: u16,
    /// Maximum payload size in bytes (default: 65536)
    pub max_payload_bytes: usize,
    /// Deduplication table capacity per client (default: 256)
    pub dedup_capacity: usize,
    /// Deduplication entry TTL in seconds (default: 300).
    /// Entries still awaiting their response are never expired.
    pub dedup_ttl_secs: u64,
    /// Interval between dedup table sweeps in seconds (default: 30)
    pub dedup_cleanup_interval_secs: u64,
    /// How long a request may run before the client gets a timeout (default: 900)
    pub response_timeout_secs: u64,
    /// Encoded responses above this size are spilled to a file (default: 65507)
    pub max_response_bytes: usize,
    /// Where spilled responses are written
    pub spill_dir: PathBuf,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9710,
            max_payload_bytes: 65536,
            dedup_capacity: 256,
            dedup_ttl_secs: 300,
            dedup_cleanup_interval_secs: 30,
            response_timeout_secs: 900,
            max_response_bytes: MAX_DATAGRAM_BYTES,
            spill_dir: std::env::temp_dir().join("syshardn-responses"),
        }
    }
}

impl CommConfig {
    /// Returns the socket address to bind to
    pub fn bind_addr(&self) -> Result<SocketAddr, CommInitError> {
        let addr = format!("{}:{}", self.listen_addr, self.listen_port);
        addr.parse()
            .map_err(|e| CommInitError::InvalidAddress(addr, format!("{}", e)))
    }
}
