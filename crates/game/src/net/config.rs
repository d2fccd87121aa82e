use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Liveness and retransmission timing shared by both ends of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub ping_interval: Duration,
    /// Multiplier applied to `srtt + 4 * rttvar` for the reliable timeout.
    pub timeout_limit: u32,
    pub timeout_min: Duration,
    pub timeout_max: Duration,
    pub fragment_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(500),
            timeout_limit: 32,
            timeout_min: Duration::from_secs(5),
            timeout_max: Duration::from_secs(30),
            fragment_timeout: Duration::from_secs(5),
        }
    }
}

impl TimeoutConfig {
    /// Window after which an unacknowledged reliable frame declares the peer dead.
    pub fn window(&self, srtt_ms: f32, rtt_var_ms: f32) -> Duration {
        let ms = (srtt_ms + 4.0 * rtt_var_ms).max(0.0) * self.timeout_limit as f32;
        Duration::from_micros((ms * 1000.0) as u64).clamp(self.timeout_min, self.timeout_max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub max_peers: usize,
    pub channel_count: u8,
    pub max_packet_size: usize,
    pub handshake_timeout: Duration,
    pub timeouts: TimeoutConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_peers: 16,
            channel_count: 2,
            max_packet_size: 64 * 1024,
            handshake_timeout: Duration::from_secs(5),
            timeouts: TimeoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSessionConfig {
    pub channel_count: u8,
    pub max_packet_size: usize,
    pub connect_timeout: Duration,
    pub connect_retry: Duration,
    pub timeouts: TimeoutConfig,
}

impl Default for ClientSessionConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            max_packet_size: 64 * 1024,
            connect_timeout: Duration::from_secs(5),
            connect_retry: Duration::from_millis(500),
            timeouts: TimeoutConfig::default(),
        }
    }
}
