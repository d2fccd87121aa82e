use serde::{Deserialize, Serialize};

use tether::ClientSessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub name: String,
    /// Inputs sent per second.
    pub send_rate: f32,
    /// Must match the host so predicted paddles move at the same speed.
    pub paddle_speed: f32,
    pub channel_capacity: usize,
    pub session: ClientSessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "player".to_string(),
            send_rate: 30.0,
            paddle_speed: 400.0,
            channel_capacity: 1024,
            session: ClientSessionConfig::default(),
        }
    }
}
