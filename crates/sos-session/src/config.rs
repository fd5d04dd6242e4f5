//! Transport configuration and timing constants

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Public relay reached directly when no tunnel is running
pub const DEFAULT_RELAY: &str = "relay.dnscloak.net:8899";

/// Default relay port when the host carries none
pub const DEFAULT_RELAY_PORT: u16 = 8899;

/// Local SOCKS5 endpoint exposed by the DNS-tunnel client
pub const SOCKS_ADDR: &str = "127.0.0.1:10800";

/// Poll cadence while connected
pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Reconnection backoff: initial delay in seconds
pub const BACKOFF_INITIAL: f64 = 1.0;

/// Reconnection backoff: ceiling in seconds
pub const BACKOFF_MAX: f64 = 30.0;

/// Reconnection backoff: growth factor per failed attempt
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Queued sends older than this are dropped at drain time
pub const QUEUE_MAX_AGE_SECS: f64 = 300.0;

/// Overall per-request budget
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connect budget
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for the SOCKS5 health probe during bring-up
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Budget for the best-effort leave on shutdown
pub const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Where and how the transport reaches the relay
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Relay hostname (no scheme, no port)
    pub relay_host: String,
    /// Relay port
    pub relay_port: u16,
    /// SOCKS5 proxy `host:port` probed during bring-up
    pub socks_addr: String,
    /// Skip the SOCKS5 probe and connect directly
    pub use_direct: bool,
}

impl TransportConfig {
    /// Config for an explicit relay endpoint
    pub fn new(relay_host: impl Into<String>, relay_port: u16) -> Self {
        Self {
            relay_host: relay_host.into(),
            relay_port,
            socks_addr: SOCKS_ADDR.to_string(),
            use_direct: false,
        }
    }

    /// Resolve from the environment: `SOS_RELAY_HOST` (accepts
    /// `host:port`), `SOS_RELAY_PORT`, and `SOS_USE_DIRECT=1` to bypass
    /// the SOCKS probe.
    pub fn from_env() -> Self {
        let raw = std::env::var("SOS_RELAY_HOST").unwrap_or_else(|_| DEFAULT_RELAY.to_string());
        let (relay_host, relay_port) = split_host_port(&raw);
        let relay_port = relay_port.unwrap_or_else(|| {
            std::env::var("SOS_RELAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_RELAY_PORT)
        });

        Self {
            relay_host,
            relay_port,
            socks_addr: SOCKS_ADDR.to_string(),
            use_direct: std::env::var("SOS_USE_DIRECT").as_deref() == Ok("1"),
        }
    }

    /// Base URL of the relay HTTP surface
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.relay_host, self.relay_port)
    }

    /// SOCKS5 proxy URL for reqwest
    pub fn socks_url(&self) -> String {
        format!("socks5://{}", self.socks_addr)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let (relay_host, relay_port) = split_host_port(DEFAULT_RELAY);
        Self {
            relay_host,
            relay_port: relay_port.unwrap_or(DEFAULT_RELAY_PORT),
            socks_addr: SOCKS_ADDR.to_string(),
            use_direct: false,
        }
    }
}

/// Split a `host:port` string on the last colon; the port is `None` when
/// absent or unparseable
fn split_host_port(raw: &str) -> (String, Option<u16>) {
    match raw.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (raw.to_string(), None),
        },
        None => (raw.to_string(), None),
    }
}

/// Wall-clock seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("relay.dnscloak.net:8899"),
            ("relay.dnscloak.net".to_string(), Some(8899))
        );
        assert_eq!(split_host_port("relay.local"), ("relay.local".to_string(), None));
        assert_eq!(
            split_host_port("relay.local:notaport"),
            ("relay.local:notaport".to_string(), None)
        );
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.relay_host, "relay.dnscloak.net");
        assert_eq!(config.relay_port, 8899);
        assert_eq!(config.base_url(), "http://relay.dnscloak.net:8899");
        assert_eq!(config.socks_url(), "socks5://127.0.0.1:10800");
        assert!(!config.use_direct);
    }

    #[test]
    fn test_explicit_endpoint() {
        let config = TransportConfig::new("127.0.0.1", 9000);
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
    }
}
