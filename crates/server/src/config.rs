use serde::{Deserialize, Serialize};

use tether::{ArenaConfig, HostConfig, SimulationConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub tick_rate: u16,
    pub max_clients: usize,
    /// State broadcasts per second.
    pub send_rate: f32,
    pub respawn_delay: f32,
    pub paddle_speed: f32,
    /// Capacity of each channel between the simulation and network threads.
    pub channel_capacity: usize,
    pub arena: ArenaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: tether::DEFAULT_TICK_RATE,
            max_clients: 16,
            send_rate: 20.0,
            respawn_delay: 5.0,
            paddle_speed: 400.0,
            channel_capacity: 1024,
            arena: ArenaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            tick_rate: self.tick_rate,
            respawn_delay: self.respawn_delay,
            paddle_speed: self.paddle_speed,
            ..SimulationConfig::default()
        }
    }

    pub fn host(&self) -> HostConfig {
        HostConfig {
            max_peers: self.max_clients,
            ..HostConfig::default()
        }
    }
}
