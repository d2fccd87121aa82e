pub mod client;
pub mod config;
pub mod input;
pub mod prediction;
pub mod replica;

pub use client::{ConnectionState, GameClient};
pub use config::ClientConfig;
pub use input::InputState;
pub use prediction::InputHistory;
pub use replica::{ClientWorld, ReplicaEvent};
