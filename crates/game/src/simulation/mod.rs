pub mod props;
mod tick;
mod timestep;

pub use tick::{Simulation, SimulationConfig, TickEvent};
pub use timestep::FixedTimestep;
